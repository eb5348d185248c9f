use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lintdock::config::ManagerConfig;
use lintdock::manager::EngineManager;
use lintdock::pipeline::HttpPipeline;
use lintdock::runtime::DockerRuntime;
use lintdock::server::build_router;
use lintdock::VERSION;

/// Engine manager and request dispatcher for containerized analysis engines
#[derive(Parser, Debug)]
#[command(name = "lintdock", version, about)]
struct CliArgs {
    /// Path to the manager configuration file
    #[arg(long, short = 'c', value_name = "FILE", default_value = "lintdock.yaml")]
    config: PathBuf,

    /// Address to serve the dispatcher on
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    log_level: Option<String>,

    #[arg(short = 'v', long, help = "Increase verbosity")]
    verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("lintdock v{} starting", VERSION);

    let config = ManagerConfig::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    let runtime = DockerRuntime::connect().context("connecting to container runtime")?;

    let mut manager = EngineManager::new(config, Arc::new(runtime));
    if let Err(err) = manager.start().await {
        // No automatic rollback or retry; the supervisor restarts us and the
        // next start converges from whatever state this one left.
        error!(error = %err, "engine manager failed to start");
        return Err(err.into());
    }

    let pipeline = HttpPipeline::new(manager.engines().values().cloned().collect());
    let router = build_router(manager.engines(), manager.ui_engine(), Arc::new(pipeline));

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding to {}", args.listen))?;
    info!("listening on http://{}", args.listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("shutting down; stopping engines");
    if let Err(err) = manager.stop().await {
        error!(error = %err, "engine teardown failed during shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn init_logging_from_args(args: &CliArgs) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str =
                std::env::var("LINTDOCK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();

        if std::env::var("RUST_LOG").is_err() {
            filter = filter
                .add_directive(format!("lintdock={}", level).parse().unwrap())
                .add_directive("h2=warn".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("bollard=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap());
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
