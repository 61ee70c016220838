//! Tapline - capture proxy for generative-AI API traffic.
//!
//! This is the main binary. It loads the config, starts the MITM proxy in the
//! background and reads operator commands from stdin until `quit`.

use std::net::SocketAddr;
use std::panic;
use std::path::PathBuf;

use clap::Parser;
use directories::ProjectDirs;
use tapline_app::{Console, Overrides, HELP};
use tapline_core::{Mode, Settings};
use tapline_proxy::{CaManager, Pipeline, ProxyConfig, ProxyServer};
use tokio::io::BufReader;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tapline - capture proxy for generative-AI API traffic
#[derive(Parser, Debug)]
#[command(name = "tapline", version, about)]
struct Args {
    /// Path to the JSON config file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Listen port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Capture root directory (overrides the config file)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Directory holding the root CA certificate and key
    #[arg(long)]
    ca_dir: Option<PathBuf>,

    /// Start in mock mode
    #[arg(long)]
    mock: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            base_log_dir: self.log_dir.clone(),
        }
    }
}

/// Get the application log directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "tapline", "Tapline").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging to the console and a daily rolling file.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tapline={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("tapline")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                // Console output goes to stderr so it does not interleave
                // with command replies on stdout.
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("PANIC: {}", panic_info);
        default_hook(panic_info);
    }));

    tracing::info!("Starting Tapline...");
    tracing::debug!("Args: {:?}", args);

    let overrides = args.overrides();
    let settings = overrides.apply(Settings::load_or_default(&args.config));
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid settings: {}", e))?;
    let port = settings.port;

    let pipeline = Pipeline::from_settings(settings);
    if args.mock {
        pipeline.set_mode(Mode::Mock);
    }
    let capture_dir = pipeline.rotate();
    tracing::info!("Capturing into {:?}", capture_dir.path);

    let ca_manager = match &args.ca_dir {
        Some(dir) => CaManager::new(dir),
        None => CaManager::with_default_dir()?,
    };
    let config = ProxyConfig {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        ca_manager,
    };
    let server = ProxyServer::new(config, pipeline.clone())?;
    let ca_cert_path = server.ca_cert_path();
    let handle = server.start()?;

    println!("Tapline listening on {}", handle.addr());
    println!("Trust the CA certificate at {}", ca_cert_path.display());
    println!("{}", pipeline.status());
    println!("{}", HELP);

    let console = Console::new(pipeline, &args.config, overrides);
    if let Err(e) = console
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
    {
        tracing::error!("Console error: {}", e);
    }

    handle.stop().await;
    tracing::info!("Tapline shutting down");
    Ok(())
}
