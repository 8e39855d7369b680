//! CLI entry point for `cuckoolyse`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use cuckoolyse::config::{self, Config, ConfigSource};
use cuckoolyse::pipeline::{self, Pipeline};
use cuckoolyse::sandbox::CuckooClient;
use cuckoolyse::unpack::{ArchiveUnpacker, NoUnpack};

/// Extract attachments from an email and submit unseen ones to a Cuckoo sandbox.
///
/// Reads one message from FILE, or from standard input when FILE is omitted.
#[derive(Parser)]
#[command(name = "cuckoolyse", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Email file to process (default: standard input)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Configuration file (overrides $CUCKOOLYSE_CONFIG and the default location)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Sandbox REST API base URL
    #[arg(long, env = "CUCKOOLYSE_URL", value_name = "URL")]
    url: Option<String>,

    /// Prefix prepended to submitted filenames
    #[arg(long)]
    prefix: Option<String>,

    /// Submit archives as-is instead of their members
    #[arg(long)]
    no_unpack: bool,

    /// Exit with status 0 even if some attachments failed
    #[arg(long)]
    exit_zero: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let (mut config, source) = match cli.config {
        Some(ref path) => (
            config::load_config_from(path)?,
            ConfigSource::File(path.clone()),
        ),
        None => config::load_config(),
    };
    if let Some(url) = cli.url.clone() {
        config.sandbox.url = url;
    }
    if let Some(prefix) = cli.prefix.clone() {
        config.sandbox.prefix = prefix;
    }
    if cli.no_unpack {
        config.unpack.enabled = false;
    }

    // Configure logging: stderr + log file
    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);
    source.log();

    let any_failed = cmd_process(cli.file.as_deref(), &config)?;
    if any_failed && !cli.exit_zero {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Set up tracing with optional stderr output and file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = config
        .logging
        .stderr
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    // Try to set up file logging
    let log_path = config::log_file_path(config);
    let log_dir = log_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_appender = match log_path.file_name() {
        Some(name) if std::fs::create_dir_all(&log_dir).is_ok() => {
            tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::NEVER)
                .filename_prefix(name.to_string_lossy())
                .build(&log_dir)
                .ok()
        }
        _ => None,
    };
    // Fall back to stderr only when the log file cannot be opened
    let file_layer = file_appender.map(|appender| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(appender)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<ExitCode> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "cuckoolyse", &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<ExitCode> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(ExitCode::SUCCESS)
}

/// Read one email and push its attachments through the sandbox.
///
/// Returns `true` if any attachment failed.
fn cmd_process(file: Option<&Path>, config: &Config) -> anyhow::Result<bool> {
    let raw = match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("cannot read email from {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .context("cannot read email from standard input")?;
            buf
        }
    };

    let message = cuckoolyse::parser::mime::parse_email(&raw)?;
    let client = CuckooClient::new(&config.sandbox)?;

    let reports = if config.unpack.enabled {
        Pipeline::new(config, client, ArchiveUnpacker::new(&config.unpack)).process(&message)
    } else {
        Pipeline::new(config, client, NoUnpack).process(&message)
    };

    Ok(pipeline::any_failed(&reports))
}
