// src/main.rs - Command line entry point for the door controller
use clap::{Parser, Subcommand};
use pulse_gate::config::{self, Config};
use pulse_gate::hardware::driver_from_config;
use pulse_gate::motion::{ControllerSettings, MotionController};
use pulse_gate::web;
use std::path::PathBuf;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Journaled gate/door motor controller
#[derive(Parser, Debug)]
#[command(name = "pulse-gate", about = "Drive a pulse-counted door motor with a crash-safe status journal.")]
struct Cli {
    /// Path to a TOML config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the journal file
    #[arg(long)]
    journal_filename: Option<PathBuf>,

    /// Override the number of pulses to open
    #[arg(long)]
    open_pulses: Option<u32>,

    /// Override the number of pulses to close
    #[arg(long)]
    close_pulses: Option<u32>,

    /// Maximum motor runtime per operation, in seconds
    #[arg(long)]
    max_time: Option<u64>,

    /// Fake all motor/GPIO interactions; the journal is still updated
    #[arg(long)]
    fake: bool,

    /// Resume any prior journaled action before taking new action
    #[arg(long)]
    resume: bool,

    /// Verbose logging for debugging
    #[arg(long)]
    debug: bool,

    /// Address for the web API (serve only)
    #[arg(long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Open the door from `closed`
    Open,
    /// Close the door from `open`
    Close,
    /// Print the journaled status
    Status,
    /// Resume an interrupted opening/closing
    Resume,
    /// Serve the HTTP API
    Serve,
}

impl Cli {
    fn build_config(&self) -> Result<Config, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => Config::default(),
        };
        if let Some(path) = &self.journal_filename {
            config.controller.journal_path = path.clone();
        }
        if let Some(pulses) = self.open_pulses {
            config.controller.open_pulses = pulses;
        }
        if let Some(pulses) = self.close_pulses {
            config.controller.close_pulses = pulses;
        }
        if let Some(secs) = self.max_time {
            config.controller.max_time_secs = secs;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        config.driver.simulated |= self.fake;
        config.controller.resume_on_start |= self.resume;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = cli.build_config().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        Box::new(e) as BoxError
    })?;

    let driver = driver_from_config(&config)?;
    let controller = Arc::new(MotionController::new(ControllerSettings::from(&config), driver)?);

    if config.controller.resume_on_start {
        let worker = controller.clone();
        tokio::task::spawn_blocking(move || worker.resume_on_start()).await?;
    }

    match cli.command {
        Commands::Status => println!("{}", controller.status()),
        Commands::Serve => web::serve(controller, &config.server.bind).await?,
        Commands::Resume => {
            let worker = controller.clone();
            let outcome = tokio::task::spawn_blocking(move || worker.resume_outcome()).await??;
            println!("{}", controller.status());
            match outcome {
                None => tracing::info!("No interrupted action was resumed"),
                Some(result) if !result.is_success() => std::process::exit(1),
                Some(_) => {}
            }
        }
        command @ (Commands::Open | Commands::Close) => {
            let worker = controller.clone();
            let result = tokio::task::spawn_blocking(move || match command {
                Commands::Open => worker.open(),
                _ => worker.close(),
            })
            .await??;
            println!("{:?}: {}", result, controller.status());
            if !result.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
