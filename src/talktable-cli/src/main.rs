//! TalkTable CLI - moderated LLM conversations
//!
//! A command-line tool that lets two language models talk about a topic while
//! a third one moderates, streaming every turn to the terminal and logging
//! the transcript to SQLite.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use talktable_core::config::DEFAULT_CONFIG_PATH;
use talktable_core::{
    AppConfig, CtrlCSignal, DisplaySink, InterruptController, ModelRegistry, OpenAiGateway,
    OperatorChoice, OperatorPrompt, Seat, Session, SessionReport, SessionStatus, SqliteStore,
    TalkEvent, TalkTableError, TurnScheduler,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "talktable",
    version,
    about = "Watch two LLMs talk about a topic, with a third one moderating",
    long_about = "Runs a moderated, turn-based conversation between language models using OpenAI-compatible APIs and logs the transcript to SQLite."
)]
struct Cli {
    /// Path to the config file (YAML, or TOML with a .toml extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: PathBuf,

    /// Conversation topic (overrides the config file)
    #[arg(short, long, value_name = "TOPIC")]
    topic: Option<String>,

    /// Print each turn's prompt before the response
    #[arg(short = 'p', long)]
    show_prompt: bool,

    /// SQLite database path (overrides the config file)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print a stored transcript instead of starting a session
    #[arg(long, value_name = "SESSION_ID", conflicts_with = "list")]
    replay: Option<String>,

    /// Print the replayed transcript as JSON
    #[arg(long, requires = "replay")]
    json: bool,

    /// List stored sessions
    #[arg(long)]
    list: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32, TalkTableError> {
    if cli.list || cli.replay.is_some() {
        let db_path = AppConfig::transcript_path(&cli.config, cli.db.as_deref())?;
        let store = SqliteStore::open(&db_path)?;
        info!(db = %db_path.display(), "transcript database opened");

        match &cli.replay {
            Some(session_id) => print_transcript(&store, session_id, cli.json)?,
            None => print_sessions(&store)?,
        }
        return Ok(0);
    }

    let mut config = AppConfig::read(&cli.config)?;
    config.apply_overrides(cli.topic.clone(), cli.show_prompt);
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    config.validate()?;

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    info!(db = %config.db_path.display(), "transcript database ready");

    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    let registry = ModelRegistry::from_config(&config, &api_base, &api_key, |var| env::var(var).ok());
    let gateway = Arc::new(OpenAiGateway::new(registry)?);

    let session = Session::from_config(&config)?;
    print_header(&session);

    let sink = Arc::new(ConsoleSink::new(&session));
    let interrupts = InterruptController::new(Arc::new(CtrlCSignal), Arc::new(StdinOperator));
    let mut scheduler = TurnScheduler::new(session, gateway, store, sink, interrupts)
        .with_prompts(config.prompts.clone());

    let report = scheduler.run().await;
    print_footer(&report);

    Ok(report.exit_code())
}

fn print_header(session: &Session) {
    let [a, b] = session.debaters();
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  TalkTable".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Session:".bold(), session.id().dimmed());
    println!("{} {}", "Topic:".bold(), session.topic().bright_white());
    println!();
    println!("{}", "Participants:".bold());
    println!("  A. {} - using {}", a.name.cyan(), a.model.dimmed());
    println!("  B. {} - using {}", b.name.magenta(), b.model.dimmed());
    println!(
        "  Moderator: {} - using {}",
        session.moderator().name.yellow(),
        session.moderator().model.dimmed()
    );
    println!("{} {}", "Rounds:".bold(), session.max_rounds());
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

fn print_footer(report: &SessionReport) {
    let line = "═".repeat(70);
    println!();
    match report.status {
        SessionStatus::Completed => {
            println!("{}", line.bright_blue());
            println!("{}", "  Session completed.".bright_green().bold());
        }
        SessionStatus::AbortedByUser | SessionStatus::AbortedByError => {
            println!("{}", line.red());
            println!(
                "{}",
                format!("  Session {}.", report.status.display_name())
                    .red()
                    .bold()
            );
            if let Some(e) = &report.error {
                println!("  {}", e.to_string().red());
            }
        }
    }
    println!("  Session ID: {}", report.session_id);
    println!("  Turns completed: {}", report.turns_completed);
    println!("{}", line.bright_blue());
    println!();
}

fn print_sessions(store: &SqliteStore) -> Result<(), TalkTableError> {
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("{}", "No stored sessions.".dimmed());
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {}  ({} vs {})",
            s.session_id.dimmed(),
            s.topic.bright_white(),
            s.debater_a_name.cyan(),
            s.debater_b_name.magenta()
        );
    }
    Ok(())
}

fn print_transcript(store: &SqliteStore, session_id: &str, json: bool) -> Result<(), TalkTableError> {
    let turns = store.fetch_turns(session_id)?;
    if json {
        let out = serde_json::to_string_pretty(&turns).map_err(io::Error::other)?;
        println!("{}", out);
        return Ok(());
    }
    if turns.is_empty() {
        println!("{}", format!("No turns stored for session {}.", session_id).dimmed());
        return Ok(());
    }
    for turn in turns {
        let speaker = if turn.is_moderator {
            turn.speaker_name.yellow().bold()
        } else {
            turn.speaker_name.cyan().bold()
        };
        println!(
            "{} {} {}",
            format!("[turn {}]", turn.turn_number).dimmed(),
            speaker,
            format!("({})", turn.model_id).dimmed()
        );
        println!("{}", turn.response);
        println!();
    }
    Ok(())
}

/// Streams turns to stdout with per-speaker colours.
struct ConsoleSink {
    debater_a: String,
    debater_b: String,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    fn new(session: &Session) -> Self {
        let [a, b] = session.debaters();
        Self {
            debater_a: a.name.clone(),
            debater_b: b.name.clone(),
            spinner: Mutex::new(None),
        }
    }

    fn colorize(&self, speaker: &str, text: &str) -> colored::ColoredString {
        if speaker == self.debater_a {
            text.cyan()
        } else if speaker == self.debater_b {
            text.magenta()
        } else {
            text.yellow()
        }
    }

    fn start_spinner(&self, speaker: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{} is thinking...", speaker));
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(pb);
        }
    }

    fn stop_spinner(&self) {
        if let Some(pb) = self.spinner.lock().ok().and_then(|mut slot| slot.take()) {
            pb.finish_and_clear();
        }
    }
}

impl DisplaySink for ConsoleSink {
    fn write_fragment(&self, speaker: &str, fragment: &str) {
        self.stop_spinner();
        print!("{}", self.colorize(speaker, fragment));
        let _ = io::stdout().flush();
    }

    fn on_event(&self, event: TalkEvent) {
        match event {
            TalkEvent::TurnStart {
                label,
                speaker,
                model,
                seat,
                prompt,
                ..
            } => {
                println!();
                let marker = if seat == Seat::Moderator { "📢" } else { "▶" };
                println!(
                    "{} {} {} {}",
                    marker,
                    self.colorize(&speaker, &speaker).bold(),
                    format!("({})", model).dimmed(),
                    format!("[{}]", label).dimmed()
                );
                if let Some(prompt) = prompt {
                    println!("{} {}", "Prompt:".dimmed().bold(), prompt.dimmed());
                }
                self.start_spinner(&speaker);
            }
            TalkEvent::TurnEnd { .. } => {
                self.stop_spinner();
                println!();
            }
            TalkEvent::Interrupted { speaker } => {
                self.stop_spinner();
                println!();
                println!("{}", format!("⏸ {} was interrupted.", speaker).yellow());
            }
            TalkEvent::Retrying { speaker, attempt } => {
                println!(
                    "{}",
                    format!("↻ Retrying {} (attempt {})", speaker, attempt).yellow()
                );
                self.start_spinner(&speaker);
            }
            TalkEvent::TurnFailed { speaker, error } => {
                self.stop_spinner();
                println!();
                eprintln!("{} {}: {}", "Turn failed:".red().bold(), speaker, error);
            }
        }
    }
}

/// Asks the operator on stdin whether to stop or continue after Ctrl-C.
struct StdinOperator;

#[async_trait]
impl OperatorPrompt for StdinOperator {
    async fn ask_stop_or_continue(&self) -> Result<OperatorChoice, TalkTableError> {
        loop {
            print!(
                "{} ",
                "Stop the session or continue this turn? [s]top / [c]ontinue:"
                    .yellow()
                    .bold()
            );
            io::stdout().flush()?;

            let (read, line) = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                io::stdin().read_line(&mut line).map(|n| (n, line))
            })
            .await
            .map_err(io::Error::other)??;

            // EOF on stdin: nobody can answer, so stop.
            if read == 0 {
                return Ok(OperatorChoice::Stop);
            }
            match parse_choice(&line) {
                Some(choice) => return Ok(choice),
                None => println!("{}", "Please answer 's' or 'c'.".dimmed()),
            }
        }
    }
}

fn parse_choice(input: &str) -> Option<OperatorChoice> {
    match input.trim().to_lowercase().as_str() {
        "s" | "stop" | "q" | "quit" => Some(OperatorChoice::Stop),
        "c" | "continue" | "r" | "retry" => Some(OperatorChoice::Continue),
        _ => None,
    }
}
