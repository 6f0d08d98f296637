//! Tabletalk CLI - conversational record store assistant
//!
//! A REPL over the tabletalk-core session controller: messages are routed
//! between direct answers and record-store capabilities, with streaming
//! output for direct replies.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use tabletalk_core::adapter::create_adapter;
use tabletalk_core::gate;
use tabletalk_core::session::persistence::{self, SavedSession};
use tabletalk_core::{
    AgentConfig, CapabilityRegistry, ProviderKind, RecordStore, SessionController, TurnReply,
    register_store_capabilities,
};

#[derive(Parser)]
#[command(name = "tabletalk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Conversational assistant over a structured record store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// LLM provider (openai, anthropic, gemini, groq, deepseek, ollama)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (defaults to the provider's default)
    #[arg(short, long)]
    model: Option<String>,

    /// Resume a saved session by id
    #[arg(long)]
    resume: Option<String>,

    /// Disable streaming output
    #[arg(long)]
    no_stream: bool,

    /// Execute a single message and exit
    #[arg(long)]
    one_shot: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat mode (the default)
    Chat,

    /// Show available capabilities
    Capabilities,

    /// Show the effective configuration
    Config,

    /// List saved sessions
    Sessions,
}

fn parse_provider(provider: &str) -> ProviderKind {
    provider.parse::<ProviderKind>().unwrap_or_else(|_| {
        eprintln!("Warning: unknown provider '{provider}', defaulting to OpenAI");
        ProviderKind::OpenAI
    })
}

fn load_config(cli: &Cli) -> anyhow::Result<AgentConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => AgentConfig::default_path()?,
    };
    let mut config = AgentConfig::load(&path)?;
    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }
    Ok(config)
}

fn build_controller(config: &AgentConfig) -> SessionController {
    let store = Arc::new(RecordStore::new());
    let mut registry = CapabilityRegistry::new();
    register_store_capabilities(&mut registry, store);

    let provider = parse_provider(&config.provider);
    let mut adapter = create_adapter(provider, config.api_key.as_deref(), config.model.as_deref());
    if config.enable_peek {
        if let Some(peek_model) = &config.peek_model {
            adapter = adapter.with_peek_model(peek_model);
        }
    }
    if config.enable_presentation {
        if let Some(presentation_model) = &config.presentation_model {
            adapter = adapter.with_presentation_model(presentation_model);
        }
    }

    SessionController::new(Arc::new(adapter), Arc::new(registry), config.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Warn level by default so logs don't interfere with the prompt
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "info,tabletalk_core=debug"
        } else {
            "warn"
        })
        .init();

    let config = load_config(&cli)?;

    match &cli.command {
        Some(Commands::Capabilities) => {
            let store = Arc::new(RecordStore::new());
            let mut registry = CapabilityRegistry::new();
            register_store_capabilities(&mut registry, store);
            for spec in registry.list() {
                println!("{}  {}", style(&spec.name).cyan().bold(), spec.description);
            }
            Ok(())
        }
        Some(Commands::Config) => {
            println!("{}", render_config(&config)?);
            Ok(())
        }
        Some(Commands::Sessions) => {
            let dir = persistence::sessions_dir()?;
            let sessions = persistence::list(&dir)?;
            if sessions.is_empty() {
                println!("No saved sessions.");
            }
            for saved in sessions {
                println!(
                    "{}  {} messages, updated {}",
                    style(&saved.id).cyan(),
                    saved.messages.len(),
                    saved.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Some(Commands::Chat) | None => run_chat(&cli, config).await,
    }
}

fn render_config(config: &AgentConfig) -> anyhow::Result<String> {
    // Shown, not written; redact the key
    let mut preview = config.clone();
    if preview.api_key.is_some() {
        preview.api_key = Some("<set>".to_string());
    }
    serde_json::to_value(&preview)
        .context("serialize config")
        .map(|v| serde_json::to_string_pretty(&v).unwrap_or_default())
}

async fn run_chat(cli: &Cli, config: AgentConfig) -> anyhow::Result<()> {
    let mut controller = build_controller(&config);

    if let Some(id) = &cli.resume {
        let dir = persistence::sessions_dir()?;
        let saved = persistence::load(&dir, id)
            .with_context(|| format!("load session '{id}'"))?;
        let session = saved.into_session()?;
        println!(
            "{}",
            style(format!("Resumed session {id} ({} messages)", session.len())).dim()
        );
        controller.attach_session(session);
        // Re-show the question the session was waiting on when it was saved
        if let Some(pending) = &controller.session().pending_confirmation {
            println!("{}", style(gate::render_prompt(pending)).yellow());
        }
    }

    if let Some(message) = &cli.one_shot {
        return run_one_turn(&mut controller, message, cli.no_stream).await;
    }

    println!(
        "{}",
        style("Tabletalk - type a message, 'reset' to start over, 'exit' to quit").dim()
    );

    let mut editor = DefaultEditor::new()?;
    let session_id = cli
        .resume
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                let _ = editor.add_history_entry(&line);
                if let Err(e) = run_one_turn(&mut controller, &line, cli.no_stream).await {
                    eprintln!("{}", style(format!("error: {e}")).red());
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    // Persist the transcript so --resume can pick it up later
    if controller.session().turns > 0 {
        let dir = persistence::sessions_dir()?;
        let saved = SavedSession::from_session(&session_id, controller.session());
        persistence::save(&dir, &saved)?;
        println!("{}", style(format!("Session saved as {session_id}")).dim());
    }

    Ok(())
}

async fn run_one_turn(
    controller: &mut SessionController,
    message: &str,
    no_stream: bool,
) -> anyhow::Result<()> {
    if no_stream {
        let reply = controller.submit(message).await?;
        print_reply(&reply);
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
    });

    let result = controller.submit_streaming(message, tx).await;
    let _ = printer.await;
    println!();

    match result {
        Ok(TurnReply::ConfirmationPrompt(_)) => {
            println!("{}", style("(waiting for your yes/no)").yellow().dim());
            Ok(())
        }
        Ok(TurnReply::Answer(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn print_reply(reply: &TurnReply) {
    match reply {
        TurnReply::Answer(text) => println!("{text}"),
        TurnReply::ConfirmationPrompt(text) => {
            println!("{}", style(text).yellow());
        }
    }
}
