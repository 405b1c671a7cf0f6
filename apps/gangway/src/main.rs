use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::debug;

use gangway::client::input::InputMode;
use gangway::client::terminal::{ClientError, ClientOptions, TerminalClient};
use gangway::client::tui::{self, Launch};
use gangway::config::Config;
use gangway::session::{ConsoleConfig, SessionError, SessionManager, TerminalOptions};
use gangway::telemetry::logging::{self as logctl, LogConfig, LogLevel};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    let _log_guard = logctl::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    debug!(log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let config = Config::from_env();

    match cli.command {
        Command::Attach(args) => handle_attach(&cli.console, &config, args).await,
        Command::Resume(args) => handle_resume(&cli.console, &config, args).await,
        Command::Sessions(args) => handle_sessions(&cli.console, &config, args).await,
        Command::Kill(args) => handle_kill(&cli.console, &config, args).await,
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "gangway",
    about = "Open an interactive shell into a running workload via the ops console",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "GANGWAY_CONSOLE",
        default_value = "http://127.0.0.1:8000",
        help = "Base URL for the ops console API"
    )]
    console: String,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "GANGWAY_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "GANGWAY_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    file: Option<PathBuf>,
}

impl LoggingArgs {
    fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a terminal session into a workload and attach to it
    Attach(AttachArgs),
    /// Attach to an existing session by id
    Resume(ResumeArgs),
    /// List the active terminal sessions of a workload
    Sessions(SessionsArgs),
    /// Delete a terminal session
    Kill(KillArgs),
}

#[derive(Args, Debug)]
struct AttachArgs {
    #[arg(value_name = "TARGET", help = "Job or workload to open a shell into")]
    target: String,

    #[arg(
        long,
        env = "GANGWAY_NAMESPACE",
        default_value = "default",
        help = "Namespace the workload runs in"
    )]
    namespace: String,

    #[arg(
        long,
        default_value = gangway::session::DEFAULT_SHELL,
        help = "Shell launched inside the workload container"
    )]
    shell: String,

    #[command(flatten)]
    terminal: TerminalArgs,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    #[arg(value_name = "SESSION_ID", help = "Session id from a persisted link")]
    session_id: String,

    #[command(flatten)]
    terminal: TerminalArgs,
}

#[derive(Args, Debug, Clone)]
struct TerminalArgs {
    #[arg(
        long = "mode",
        value_enum,
        default_value_t = InputMode::Cooked,
        help = "Input handling: cooked buffers a line until Enter, raw streams every key"
    )]
    mode: InputMode,

    #[arg(
        long = "connect-timeout",
        value_name = "SECONDS",
        help = "Seconds to wait for the terminal websocket before giving up"
    )]
    connect_timeout: Option<u64>,
}

impl TerminalArgs {
    fn to_options(&self, config: &Config) -> ClientOptions {
        ClientOptions {
            mode: self.mode,
            connect_timeout: self
                .connect_timeout
                .map(Duration::from_secs)
                .unwrap_or(config.connect_timeout),
            resume_grace: config.resume_grace,
        }
    }
}

#[derive(Args, Debug)]
struct SessionsArgs {
    #[arg(value_name = "TARGET", help = "Workload whose sessions to list")]
    target: String,
}

#[derive(Args, Debug)]
struct KillArgs {
    #[arg(value_name = "SESSION_ID", help = "Session to delete")]
    session_id: String,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("logging initialization failed: {0}")]
    Logging(String),
}

fn session_manager(console: &str, config: &Config) -> Result<SessionManager, SessionError> {
    let console_config =
        ConsoleConfig::new(console)?.with_deploy_prefix(config.deploy_prefix.clone());
    SessionManager::new(console_config)
}

async fn handle_attach(console: &str, config: &Config, args: AttachArgs) -> Result<(), CliError> {
    let manager = session_manager(console, config)?;
    let client = TerminalClient::new(manager, args.terminal.to_options(config));
    let launch = Launch::Create {
        target: args.target,
        namespace: args.namespace,
        options: TerminalOptions { shell: args.shell },
    };
    tui::run(client, launch).await?;
    Ok(())
}

async fn handle_resume(console: &str, config: &Config, args: ResumeArgs) -> Result<(), CliError> {
    let manager = session_manager(console, config)?;
    let client = TerminalClient::new(manager, args.terminal.to_options(config));
    let launch = Launch::Resume {
        session_id: args.session_id,
    };
    tui::run(client, launch).await?;
    Ok(())
}

async fn handle_sessions(
    console: &str,
    config: &Config,
    args: SessionsArgs,
) -> Result<(), CliError> {
    let manager = session_manager(console, config)?;
    let sessions = manager.list(&args.target).await?;
    if sessions.is_empty() {
        println!("no active terminal sessions for {}", args.target);
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  pod={}  container={}  created={}",
            session.session_id,
            session.pod_name.as_deref().unwrap_or("-"),
            session.container_name.as_deref().unwrap_or("-"),
            session.created_at.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn handle_kill(console: &str, config: &Config, args: KillArgs) -> Result<(), CliError> {
    let manager = session_manager(console, config)?;
    manager.delete(&args.session_id).await?;
    println!("session {} deleted", args.session_id);
    Ok(())
}
