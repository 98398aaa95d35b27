//! bdi-chat CLI: talk to BDI agents in plain language.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use bdi_interpreter::config::{AgentEntry, Settings};
use bdi_interpreter::interpreter::{Interpreter, InterpreterService, Outcome};
use bdi_interpreter::llm::{LanguageModel, OllamaClient, ScriptedModel};
use bdi_interpreter::message::{Content, Force, Message, StdoutDispatch};
use bdi_interpreter::term::{parse_term, parse_trigger};

#[derive(Parser)]
#[command(name = "bdi-chat", version, about = "Semantic interpreter between chat and BDI agents")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Agent knowledge to load, as NAME=PATH to an AgentSpeak file. Repeatable.
    #[arg(long = "agent", global = true, value_parser = parse_agent)]
    agents: Vec<AgentEntry>,

    /// Use the deterministic offline model instead of Ollama.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the agents and print the embedding index.
    Index,

    /// Translate one sentence into an agent message.
    Translate {
        /// The chat line; `@name` mentions choose the receivers.
        sentence: String,
    },

    /// Render one agent message as prose.
    Render {
        /// Agent that sent the message.
        #[arg(long)]
        sender: String,

        /// Illocutionary force (tell, achieve, askOne, askAll, askHow).
        #[arg(long, default_value = "tell")]
        force: String,

        /// Message content: a term, or a trigger such as `+!deliver(pizza)`.
        content: String,
    },

    /// Read chat lines from stdin until EOF.
    Chat,
}

fn parse_agent(s: &str) -> std::result::Result<AgentEntry, String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got \"{s}\""))?;
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=PATH, got \"{s}\""));
    }
    Ok(AgentEntry {
        name: name.to_string(),
        source: PathBuf::from(path),
    })
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ureq=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.agents.extend(cli.agents);

    let model: Arc<dyn LanguageModel> = if cli.offline {
        tracing::info!("using the offline scripted model");
        Arc::new(ScriptedModel::offline())
    } else {
        let mut client = OllamaClient::connect(settings.ollama.clone())?;
        client.ensure_models()?;
        Arc::new(client)
    };

    let interp = Interpreter::new(
        settings.interpreter.clone(),
        model,
        Arc::new(StdoutDispatch),
    );

    // Rendering needs no agent knowledge.
    if let Commands::Render {
        sender,
        force,
        content,
    } = &cli.command
    {
        let force: Force = force.parse()?;
        let content: Content = if content.starts_with(['+', '-']) {
            parse_trigger(content)?.into()
        } else {
            parse_term(content)?.into()
        };
        let message = Message::new(sender.as_str(), force, content);
        println!("{message}");
        println!("{}", interp.handle_incoming(&message));
        return Ok(());
    }

    for (name, knowledge) in settings.load_agents()? {
        interp.ingest(&name, &knowledge)?;
    }

    match cli.command {
        Commands::Index => {
            print!("{}", interp.space().describe());
        }

        Commands::Translate { sentence } => {
            let outcome = interp.handle_chat_line(&sentence)?;
            print_outcome(&outcome);
        }

        Commands::Chat => {
            let service = InterpreterService::new(interp);
            run_chat(&service)?;
        }

        Commands::Render { .. } => {}
    }

    Ok(())
}

fn run_chat(service: &InterpreterService) -> Result<()> {
    let agents = service.interpreter().space().agents();
    println!("Known agents: {}", agents.join(", "));
    println!("Address agents with @name. /index shows the index, /quit exits.");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush().into_diagnostic()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).into_diagnostic()? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/index" => {
                print!("{}", service.interpreter().space().describe());
                continue;
            }
            _ => {}
        }

        match service.handle_chat_line(line.to_string()).wait() {
            Some(Ok(outcome)) => print_outcome(&outcome),
            Some(Err(e)) => return Err(e.into()),
            None => tracing::error!("interpreter worker exited without an answer"),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Sent { receivers, message } => {
            if receivers.is_empty() {
                println!("broadcast: {message}");
            } else {
                println!("sent to {}: {message}", receivers.join(", "));
            }
        }
        Outcome::Partial {
            receivers,
            unresolved,
            message,
        } => {
            println!("sent to {}: {message}", receivers.join(", "));
            println!("unknown agents: {}", unresolved.join(", "));
        }
        Outcome::Rejected { reason } => println!("not sent: {reason}"),
        Outcome::Dropped => {}
    }
}
