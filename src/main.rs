mod api;
mod cli;
mod config;
mod error;
mod logging;
mod pool;
mod registry;
mod runner;
mod service;
mod state_machine;
mod task;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Command};
use config::ServiceConfig;
use service::JobService;

/// How often `run` polls its job.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ServiceConfig::load(cli.config.as_deref())?;

    // Request handling and job orchestration share one cooperative thread;
    // task callables run on the runtime's blocking threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(execute(cli.command, config));

    // Timed-out tasks cannot be interrupted; do not let them hold the
    // process open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn execute(command: Command, mut config: ServiceConfig) -> Result<()> {
    match command {
        Command::Serve { bind, workers } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.validate()?;
            serve(config).await
        }
        Command::Run { target, timeout } => run_once(config, &target, timeout).await,
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let service = Arc::new(JobService::from_config(&config));
    let app = api::router(Arc::clone(&service), &config.cors_origin)?;

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %addr,
        workers = config.workers,
        cors_origin = %config.cors_origin,
        scanner = %config.task.program,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown(config.shutdown_grace()).await;
    info!("server shutdown complete");
    Ok(())
}

async fn run_once(config: ServiceConfig, target: &str, timeout: Option<u64>) -> Result<()> {
    let service = JobService::from_config(&config);
    let id = match timeout {
        Some(secs) => service.submit_with_limit(target, Duration::from_secs(secs))?,
        None => service.submit(target)?,
    };

    let record = loop {
        let record = service.query(&id)?;
        if record.status.is_terminal() {
            break record;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    println!("{}", serde_json::to_string_pretty(&record)?);
    if record.status != state_machine::JobStatus::Done {
        bail!("job {id} {}", record.status);
    }
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
