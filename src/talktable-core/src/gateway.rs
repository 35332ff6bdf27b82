//! Model gateway: resolves model ids to endpoints and invokes them.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::TalkTableError;

/// Lazy, finite, non-restartable sequence of response fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TalkTableError>> + Send>>;

/// What a model returns for one invocation.
pub enum ModelReply {
    Text(String),
    Stream(FragmentStream),
}

impl std::fmt::Debug for ModelReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelReply::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ModelReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One call to a participant's model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub model_id: String,
    /// System persona, already rendered.
    pub persona: String,
    pub prompt: String,
    /// Extra material placed ahead of the prompt.
    pub context_fragments: Vec<String>,
}

/// Capability that turns a request into model output.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Fails with [`TalkTableError::ModelLookup`] if the model id is unknown
    /// and [`TalkTableError::ModelInvocation`] if generation fails.
    async fn invoke(&self, request: &InvocationRequest) -> Result<ModelReply, TalkTableError>;
}

/// Where a model id is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub api_base: String,
    pub api_key: String,
    /// Model name sent to the API.
    pub remote_model: String,
}

/// Static mapping from model ids to endpoints, filled once at startup.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    endpoints: BTreeMap<String, Endpoint>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model_id: impl Into<String>, endpoint: Endpoint) {
        self.endpoints.insert(model_id.into(), endpoint);
    }

    pub fn resolve(&self, model_id: &str) -> Result<&Endpoint, TalkTableError> {
        self.endpoints.get(model_id).ok_or_else(|| {
            let known = self.endpoints.keys().cloned().collect::<Vec<_>>().join(", ");
            TalkTableError::lookup(
                model_id,
                format!("not registered (known models: {})", known),
            )
        })
    }

    /// Build the registry from the `models` config section. Without one,
    /// every model named by a participant or the moderator is served by the
    /// default endpoint. `env` looks up API key variables.
    pub fn from_config<F>(
        config: &AppConfig,
        default_api_base: &str,
        default_api_key: &str,
        env: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();

        if config.models.is_empty() {
            let moderator = config.moderator();
            for p in config.participants.iter().chain(std::iter::once(&moderator)) {
                registry.register(
                    &p.model,
                    Endpoint {
                        api_base: default_api_base.to_string(),
                        api_key: default_api_key.to_string(),
                        remote_model: p.model.clone(),
                    },
                );
            }
            return registry;
        }

        for (model_id, entry) in &config.models {
            let api_key = match &entry.api_key_env {
                Some(var) => env(var).unwrap_or_else(|| {
                    warn!(model = %model_id, var = %var, "API key variable not set");
                    String::new()
                }),
                None => default_api_key.to_string(),
            };
            registry.register(
                model_id,
                Endpoint {
                    api_base: entry
                        .api_base
                        .clone()
                        .unwrap_or_else(|| default_api_base.to_string()),
                    api_key,
                    remote_model: entry.remote_model.clone().unwrap_or_else(|| model_id.clone()),
                },
            );
        }
        registry
    }
}

/// Gateway backed by OpenAI-compatible chat completion streaming.
pub struct OpenAiGateway {
    registry: ModelRegistry,
    http_client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiGateway {
    pub fn new(registry: ModelRegistry) -> Result<Self, TalkTableError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TalkTableError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            registry,
            http_client,
            max_retries: 3,
        })
    }

    fn build_messages(request: &InvocationRequest) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = Vec::new();

        if !request.persona.trim().is_empty() {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: request.persona.clone().into(),
                    name: None,
                },
            ));
        }

        let mut user_content = String::new();
        for fragment in &request.context_fragments {
            user_content.push_str(fragment);
            user_content.push_str("\n\n");
        }
        user_content.push_str(&request.prompt);

        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: user_content.into(),
                name: None,
            },
        ));

        messages
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn invoke(&self, request: &InvocationRequest) -> Result<ModelReply, TalkTableError> {
        let endpoint = self.registry.resolve(&request.model_id)?;

        let config = OpenAIConfig::new()
            .with_api_key(&endpoint.api_key)
            .with_api_base(&endpoint.api_base);
        let client = Client::with_config(config).with_http_client(self.http_client.clone());

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&endpoint.remote_model)
            .messages(Self::build_messages(request))
            .stream(true)
            .build()
            .map_err(|e| TalkTableError::invocation(&request.model_id, e))?;

        debug!(model = %request.model_id, remote = %endpoint.remote_model, "opening completion stream");

        // Exponential backoff on stream creation: 1s, 2s
        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match client.chat().create_stream(chat_request.clone()).await {
                Ok(stream) => {
                    let model = request.model_id.clone();
                    let fragments = stream.filter_map(move |item| {
                        let model = model.clone();
                        async move {
                            match item {
                                Ok(chunk) => {
                                    let text: String = chunk
                                        .choices
                                        .into_iter()
                                        .filter_map(|choice| choice.delta.content)
                                        .collect();
                                    (!text.is_empty()).then_some(Ok(text))
                                }
                                Err(e) => Some(Err(TalkTableError::invocation(model, e))),
                            }
                        }
                    });
                    return Ok(ModelReply::Stream(Box::pin(fragments)));
                }
                Err(e) => {
                    warn!(model = %request.model_id, attempt = attempt + 1, error = %e, "failed to open completion stream");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => TalkTableError::invocation(&request.model_id, e),
            None => TalkTableError::invocation(&request.model_id, "unknown API error after retries"),
        })
    }
}
