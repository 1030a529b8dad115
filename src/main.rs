use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use handsfree::command::CommandSource;
use handsfree::config::DEFAULT_CONFIG_PATHS;
use handsfree::guard::CommandGuard;
use handsfree::voice::{ChannelVoiceListener, PhraseSender, VoiceCommandMapper};
use handsfree::{AppOrchestrator, Config, logging};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(name = "handsfree", about = "Gesture and voice driven pointer control")]
struct Cli {
    /// Config file (defaults to the first of config/handsfree.toml,
    /// config/handsfree.local.toml, handsfree.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the controller (default)
    Run {
        /// Record actions instead of moving the real pointer
        #[arg(long)]
        dry_run: bool,
        /// Skip face authentication
        #[arg(long)]
        no_auth: bool,
        /// Disable voice input
        #[arg(long)]
        no_voice: bool,
    },
    /// Write the default config file
    InitConfig { path: Option<PathBuf> },
    /// Show which command a phrase maps to and whether it would be allowed
    Map { phrase: String },
    /// List voice phrases in match order
    Commands,
}

enum Shutdown {
    Signal,
    InputClosed,
}

#[hotpath::main]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run {
        dry_run: false,
        no_auth: false,
        no_voice: false,
    }) {
        Command::Run {
            dry_run,
            no_auth,
            no_voice,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if no_auth {
                config.auth.enabled = false;
            }
            if no_voice {
                config.voice.enabled = false;
            }
            run(config, dry_run)
        }
        Command::InitConfig { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            init_config(&path)
        }
        Command::Map { phrase } => {
            let config = load_config(cli.config.as_deref())?;
            map_phrase(&config, &phrase);
            Ok(())
        }
        Command::Commands => {
            let config = load_config(cli.config.as_deref())?;
            for rule in VoiceCommandMapper::with_custom(&config.voice).rules() {
                println!("{:<24} {}", rule.command, rule.examples.join(" | "));
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Config::load().context("loading default config"),
    }
}

fn run(config: Config, dry_run: bool) -> anyhow::Result<()> {
    logging::init(&config.logging).context("initializing logging")?;

    let voice_enabled = config.voice.enabled;
    let listener = Arc::new(ChannelVoiceListener::new(&config.voice));
    let phrases = listener.sender();

    let app = Arc::new(
        AppOrchestrator::builder(config)
            .dry_run(dry_run)
            .voice_listener(listener)
            .build()
            .context("building orchestrator")?,
    );

    let (shutdown_tx, shutdown_rx) = flume::bounded::<Shutdown>(2);
    let signal_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(Shutdown::Signal);
    })?;

    app.start().context("starting")?;
    println!(
        "handsfree running{} (Ctrl+C to stop)",
        if dry_run { " [dry run]" } else { "" }
    );

    if voice_enabled {
        println!("Type phrases such as \"scroll up\" or \"volume down\"; EOF stops.");
        thread::spawn(move || feed_stdin(phrases, shutdown_tx));
    }

    match shutdown_rx.recv() {
        Ok(Shutdown::Signal) | Err(_) => println!("\nStopping..."),
        Ok(Shutdown::InputClosed) => println!("Input closed, stopping..."),
    }
    app.stop();

    let state = app.state();
    let metrics = app.metrics();
    println!(
        "Uptime {:.1}s, {} executed, {} blocked, {} errors",
        state.uptime_seconds, metrics.command_count, metrics.blocked_command_count, metrics.errors
    );
    Ok(())
}

/// Typed lines stand in for a speech transcriber
fn feed_stdin(phrases: PhraseSender, shutdown: flume::Sender<Shutdown>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if phrases.say(line).is_err() {
            break;
        }
    }
    let _ = shutdown.try_send(Shutdown::InputClosed);
}

fn init_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, Config::default().to_toml()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn map_phrase(config: &Config, phrase: &str) {
    let mapper = VoiceCommandMapper::with_custom(&config.voice);
    let Some(command) = mapper.to_command(phrase) else {
        println!("no match");
        return;
    };
    let verdict = CommandGuard::new(&config.security).validate(&command);
    let payload = serde_json::to_string(&command.payload).unwrap_or_default();
    println!("{} {} (source: {})", command.name, payload, CommandSource::Voice);
    if verdict.accepted {
        println!("allowed");
    } else {
        println!("blocked: {}", verdict.reason);
    }
}
