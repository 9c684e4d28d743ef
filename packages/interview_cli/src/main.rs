use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use interview_session::UserRole;

mod cli;
mod config;

use crate::config::InterviewConfig;

#[derive(Parser)]
#[command(name = "interview")]
#[command(about = "Terminal client for interview simulation sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.interview)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Server origin, overriding config.toml (e.g. https://interview.example.org)
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the patients available for an interview
    Patients,
    /// Register and start a new interview session
    Chat(ChatArgs),
    /// Reconnect to a session the server still holds
    Resume(ResumeArgs),
    /// Show past sessions, or the transcript of one
    Logs(LogsArgs),
}

#[derive(Args)]
struct ChatArgs {
    /// Display name
    #[arg(long)]
    name: String,

    /// interviewer, patient, evaluator or observer
    #[arg(long)]
    role: UserRole,

    /// Patient scenario to interview
    #[arg(long)]
    patient: Option<String>,
}

#[derive(Args)]
struct ResumeArgs {
    /// Session to resume (defaults to the last active session)
    #[arg(long)]
    session: Option<String>,
}

#[derive(Args)]
struct LogsArgs {
    /// Print the transcript of this session instead of the session list
    #[arg(long)]
    session: Option<String>,
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "interview=debug,interview_session=debug,info"
    } else {
        "interview=info,interview_session=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = InterviewConfig::new(cli.data_dir)?;
    if let Some(origin) = cli.origin {
        config.file.server.origin = origin;
    }

    match cli.command {
        Commands::Patients => cli::patients_command(&config).await,
        Commands::Chat(args) => {
            cli::chat_command(&config, args.name, args.role, args.patient).await
        }
        Commands::Resume(args) => cli::resume_command(&config, args.session).await,
        Commands::Logs(args) => cli::logs_command(&config, args.session.as_deref()).await,
    }
}
