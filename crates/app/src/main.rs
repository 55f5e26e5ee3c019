mod control;
mod settings_store;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use hearing_assist_core::{AppConfig, AudioSettings, HearingError, PipelineController};
use tracing_subscriber::EnvFilter;

use control::{Command, Flow, Session, HELP};
use settings_store::SettingsStore;

fn main() -> hearing_assist_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            settings,
            sample_rate,
            latency_ms,
        } => run(&settings, sample_rate, latency_ms),
        Commands::InitSettings { path, force } => init_settings(&path, force),
    }
}

fn run(
    settings_path: &Path,
    sample_rate: Option<u32>,
    latency_ms: Option<u32>,
) -> hearing_assist_core::Result<()> {
    let mut config = AppConfig::default();
    if let Some(rate) = sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(latency) = latency_ms {
        config.audio.latency_ms = latency;
    }
    tracing::info!(?config, settings = %settings_path.display(), "starting hearing assist");

    let store = SettingsStore::new(settings_path);
    let settings = store.load()?;
    let controller = PipelineController::with_config(&config.audio);
    let mut session = Session::new(controller, settings, store);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    // The microphone stays closed until the user confirms headphones are on.
    writeln!(
        out,
        "Put on headphones to avoid feedback, then type `start`. Type `help` for commands."
    )?;
    out.flush()?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                writeln!(out, "{err}. Type `help` for commands.")?;
                continue;
            }
        };
        match session.execute(command, &mut out) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => {
                tracing::error!(%err, "command failed");
                writeln!(out, "error: {err}")?;
            }
        }
        out.flush()?;
    }

    tracing::info!(
        running = session.controller().is_running(),
        settings = %session.settings(),
        "shutting down"
    );
    Ok(())
}

fn init_settings(path: &Path, force: bool) -> hearing_assist_core::Result<()> {
    let store = SettingsStore::new(path);
    if store.exists() && !force {
        return Err(HearingError::msg(format!(
            "{} already exists, pass --force to overwrite",
            path.display()
        )));
    }
    store.save(&AudioSettings::default())?;
    println!("wrote default settings to {}", path.display());
    println!("{HELP}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time hearing assistance through headphones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture the microphone, equalise it and play it back live.
    Run {
        /// Settings file to load on startup and write on `save`.
        #[arg(short, long, default_value = "hearing-assist.json")]
        settings: PathBuf,
        /// Sample rate requested from the microphone.
        #[arg(long)]
        sample_rate: Option<u32>,
        /// Capture buffer depth in milliseconds.
        #[arg(long)]
        latency_ms: Option<u32>,
    },
    /// Write the default settings to a file.
    InitSettings {
        /// Destination of the settings file.
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}
