//! Configuration module for loading YAML or TOML config files.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TalkTableError;
use crate::participant::Participant;
use crate::prompts::PromptsConfig;

/// Default config file looked up when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

pub const DEFAULT_MODERATOR_NAME: &str = "MC";
pub const DEFAULT_MODERATOR_MODEL: &str = "gpt-4o-mini";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub topic: String,
    /// Conversation participants. The first two are the debaters.
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub moderator: ModeratorConfig,
    /// Number of rounds. Each round is two debater turns.
    #[serde(default = "default_max_turns", alias = "max_rounds")]
    pub max_turns: u32,
    /// Pause after every debater turn, in seconds.
    #[serde(default = "default_llm_wait_time")]
    pub llm_wait_time: f64,
    #[serde(default)]
    pub show_prompt: bool,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Static model registry. When empty, every participant model is served
    /// by the endpoint taken from the environment.
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Moderator settings. Every field falls back to a built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeratorConfig {
    pub name: Option<String>,
    pub model: Option<String>,
    pub persona: Option<String>,
}

/// One entry of the static model registry.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ModelEntry {
    /// OpenAI-compatible base URL. Defaults to the environment endpoint.
    pub api_base: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Model name sent to the API if it differs from the registry key.
    pub remote_model: Option<String>,
}

fn default_max_turns() -> u32 {
    10
}

fn default_llm_wait_time() -> f64 {
    1.0
}

fn default_db_path() -> PathBuf {
    Path::new("logs").join("conversation.db")
}

impl AppConfig {
    /// Load and validate configuration from a file. Files ending in `.toml`
    /// are parsed as TOML, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TalkTableError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Where the transcript database lives, for commands that only read it.
    ///
    /// `db_override` wins. Otherwise the config file's `db_path` is used, or
    /// the default path when there is no config file. The session fields of
    /// the file are not validated.
    pub fn transcript_path<P: AsRef<Path>>(
        path: P,
        db_override: Option<&Path>,
    ) -> Result<PathBuf, TalkTableError> {
        if let Some(db) = db_override {
            return Ok(db.to_path_buf());
        }
        let path = path.as_ref();
        if !path.exists() {
            return Ok(default_db_path());
        }
        Ok(Self::read(path)?.db_path)
    }

    /// Parse a config file without validating it.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, TalkTableError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TalkTableError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| TalkTableError::Config(format!("Failed to read config: {}", e)))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            Self::parse_toml(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    /// Parse and validate YAML content.
    pub fn from_yaml_str(content: &str) -> Result<Self, TalkTableError> {
        let config = Self::parse_yaml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, TalkTableError> {
        let config = Self::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(content: &str) -> Result<Self, TalkTableError> {
        serde_yaml::from_str(content)
            .map_err(|e| TalkTableError::Config(format!("Failed to parse config: {}", e)))
    }

    fn parse_toml(content: &str) -> Result<Self, TalkTableError> {
        toml::from_str(content)
            .map_err(|e| TalkTableError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Check the required fields and their ranges.
    pub fn validate(&self) -> Result<(), TalkTableError> {
        if self.topic.trim().is_empty() {
            return Err(TalkTableError::Config("'topic' is not set".to_string()));
        }

        if self.participants.len() < 2 {
            return Err(TalkTableError::InvalidParticipantCount {
                min: 2,
                actual: self.participants.len(),
            });
        }

        let moderator = self.moderator();
        let mut names = HashSet::new();
        for p in self.participants.iter().chain(std::iter::once(&moderator)) {
            if p.name.trim().is_empty() {
                return Err(TalkTableError::Config(
                    "every participant needs a 'name'".to_string(),
                ));
            }
            if p.model.trim().is_empty() {
                return Err(TalkTableError::Config(format!(
                    "participant '{}' has no 'model'",
                    p.name
                )));
            }
            if !names.insert(p.name.as_str()) {
                return Err(TalkTableError::Config(format!(
                    "participant name '{}' is used more than once",
                    p.name
                )));
            }
        }

        if self.max_turns == 0 {
            return Err(TalkTableError::Config(
                "'max_turns' must be a positive integer".to_string(),
            ));
        }

        if !self.llm_wait_time.is_finite() || self.llm_wait_time < 0.0 {
            return Err(TalkTableError::Config(format!(
                "'llm_wait_time' must be a non-negative number of seconds, got {}",
                self.llm_wait_time
            )));
        }

        Ok(())
    }

    /// Apply command line overrides. A topic flag replaces the configured
    /// topic; the show-prompt flag can only switch prompt display on.
    pub fn apply_overrides(&mut self, topic: Option<String>, show_prompt: bool) {
        if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
            self.topic = topic;
        }
        if show_prompt {
            self.show_prompt = true;
        }
    }

    /// The moderator, with defaults filled in.
    pub fn moderator(&self) -> Participant {
        Participant {
            name: self
                .moderator
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_MODERATOR_NAME.to_string()),
            model: self
                .moderator
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODERATOR_MODEL.to_string()),
            persona: self
                .moderator
                .persona
                .clone()
                .unwrap_or_else(|| DEFAULT_MODERATOR_PERSONA.to_string()),
        }
    }

    pub fn inter_turn_delay(&self) -> Duration {
        Duration::from_secs_f64(self.llm_wait_time)
    }
}

const DEFAULT_MODERATOR_PERSONA: &str = r#"You are {name}, the host of a conversation between two speakers.

TOPIC: {topic}

YOUR ROLE:
- Introduce the topic and the speakers
- Open each round and hand the floor to the next speaker
- Summarize both positions fairly at the end of each round
- Never take sides and never argue a position yourself

SPEAKING STYLE:
- Short, warm and neutral
- Speak directly to the audience
- Do NOT include stage directions or markdown formatting
"#;
