//! Claude Session Tail - follow and inspect Claude Code session logs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_session_tail::config::{ConfigError, ConfigLoader, TailConfig};
use claude_session_tail::display;
use claude_session_tail::session::{SessionError, SessionLoader};
use claude_session_tail::watcher::layout::{self, ClaudePaths};
use claude_session_tail::watcher::{LogWatcher, RecordParser, WatchTarget, WatcherError};

#[derive(Parser)]
#[command(
    name = "claude-session-tail",
    about = "Follow and inspect Claude Code session logs",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProjectArg {
    /// Project working directory. Defaults to the current directory.
    #[arg(short, long)]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream records of a session as they are written.
    Watch {
        /// Session to follow. Without it, the newest session of the project.
        #[arg(short, long, conflicts_with = "dir")]
        session: Option<String>,
        #[command(flatten)]
        project: ProjectArg,
        /// Follow the first session created in this directory from now on.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
        /// Do not truncate long values.
        #[arg(long)]
        raw: bool,
    },
    /// Print the aggregates of a session.
    Show {
        session: String,
        #[command(flatten)]
        project: ProjectArg,
    },
    /// List sessions, newest first.
    List {
        /// Only sessions of this project.
        #[arg(short, long)]
        project: Option<PathBuf>,
        /// Maximum number of sessions to print.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
    #[error("no session found in {0}")]
    NoSession(PathBuf),
    #[error("could not determine current directory: {0}")]
    CurrentDir(std::io::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<TailConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::with_path(path).load(),
        None => ConfigLoader::new().load(),
    }
}

fn project_path(arg: Option<PathBuf>) -> Result<PathBuf, AppError> {
    match arg {
        Some(path) => Ok(path),
        None => std::env::current_dir().map_err(AppError::CurrentDir),
    }
}

async fn resolve_target(
    paths: &ClaudePaths,
    session: Option<String>,
    project: Option<PathBuf>,
    dir: Option<PathBuf>,
) -> Result<WatchTarget, AppError> {
    if let Some(dir) = dir {
        return Ok(WatchTarget::directory_from_now(dir));
    }

    let project_dir = paths.project_dir(&project_path(project)?);
    let session_id = match session {
        Some(id) => id,
        None => layout::find_latest_session(&project_dir)
            .await
            .as_deref()
            .and_then(layout::classify)
            .and_then(|kind| match kind {
                layout::LogFileKind::Main { session_id } => Some(session_id),
                layout::LogFileKind::Agent { .. } => None,
            })
            .ok_or_else(|| AppError::NoSession(project_dir.clone()))?,
    };

    Ok(WatchTarget::Session {
        project_dir,
        session_id,
    })
}

async fn watch(
    config: &TailConfig,
    paths: &ClaudePaths,
    target: WatchTarget,
    json: bool,
    raw: bool,
) -> Result<(), AppError> {
    let mut watcher = LogWatcher::new(
        target,
        config.watch.clone(),
        RecordParser::new(config.parser.clone()),
    );
    let mut records = watcher.subscribe();
    let mut errors = watcher.start()?;
    tracing::info!(root = %paths.root().display(), "Watching session logs");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            error = errors.recv() => {
                if let Some(error) = error {
                    tracing::warn!(error = %error, "Watcher error");
                }
            }
            record = records.recv() => match record {
                Ok(watched) if json => match serde_json::to_string(&watched.record) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize record"),
                },
                Ok(watched) => display::print_record(&watched, raw),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Output fell behind, records dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    watcher.stop();
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(cli.config)?;
    let paths = config.paths().ok_or(SessionError::NoHomeDirectory)?;

    match cli.command {
        Commands::Watch {
            session,
            project,
            dir,
            json,
            raw,
        } => {
            let target = resolve_target(&paths, session, project.project, dir).await?;
            watch(&config, &paths, target, json, raw).await
        }
        Commands::Show { session, project } => {
            let project = project_path(project.project)?;
            let loader = SessionLoader::new(paths, RecordParser::new(config.parser));
            let session = loader.load(&project, &session).await?;
            display::print_session_summary(&session);
            Ok(())
        }
        Commands::List { project, limit } => {
            let mut sessions = layout::list_sessions(&paths, project.as_deref()).await;
            if let Some(limit) = limit {
                sessions.truncate(limit);
            }
            display::print_session_list(&sessions);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
