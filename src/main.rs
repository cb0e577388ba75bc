use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use tinykeep::config::Cli;
use tinykeep::engine::Engine;
use tinykeep::persistence::PersistenceConfig;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let persistence =
        PersistenceConfig::new(cli.snapshot_path.clone(), cli.snapshot_path_is_absolute)?;
    let engine = Arc::new(Engine::new(persistence, cli.reload)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.workers)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let listener = TcpListener::bind(("0.0.0.0", cli.port)).await?;
        log::info!("listening on port {}", cli.port);

        tokio::select! {
            _ = tinykeep::server::serve(listener, engine) => {}
            _ = shutdown_signal() => {
                log::info!("shutdown signal received");
            }
        }
        anyhow::Ok(())
    })
}

/// Waits for either Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
