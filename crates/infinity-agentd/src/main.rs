use std::{borrow::Cow, sync::Arc};

use anyhow::{Context, anyhow};
use clap::Parser;
use infinity_api::{ControlPlaneAdapter, HttpApi};
use infinity_core::{ControlPlane, InfinityConfig};
use infinity_exec::launcher::WORKER_PAYLOAD;
use infinity_observe::logger_init;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod cli;
use cli::{Cli, Command, RunArgs};

const SHUTDOWN_CALLER: &str = "infinityd";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    logger_init(&args.logger_config())?;

    let config = args.infinity_config();
    config.validate().map_err(|e| anyhow!(e))?;

    let payload: Cow<'static, [u8]> = match &args.worker_binary {
        Some(path) => Cow::Owned(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("read worker binary {}", path.display()))?,
        ),
        None => Cow::Borrowed(WORKER_PAYLOAD),
    };

    let plane = Arc::new(
        ControlPlane::start(config.clone(), payload)
            .await
            .context("start control plane")?,
    );
    info!(version = %config.version, "supervisor started");

    let served = serve(&config, Arc::clone(&plane)).await;
    plane.shutdown(SHUTDOWN_CALLER).await;
    info!("supervisor stopped");
    served
}

async fn serve(config: &InfinityConfig, plane: Arc<ControlPlane>) -> anyhow::Result<()> {
    let router = HttpApi::new(Arc::new(ControlPlaneAdapter::new(plane))).router();

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind control surface to {addr}"))?;
    info!(%addr, "control surface listening");

    infinity_api::axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control surface failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
