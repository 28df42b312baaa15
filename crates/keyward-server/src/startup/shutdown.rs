//! Graceful shutdown handling for Keyward server

use std::future::Future;

use actix_web::dev::Server;
use tracing::{error, info};

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Run `server` until it stops on its own or `shutdown` resolves
///
/// On shutdown the server stops accepting connections and in-flight
/// requests are allowed to finish.
pub async fn serve_until<F>(server: Server, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let handle = server.handle();
    let mut task = actix_web::rt::spawn(server);

    tokio::select! {
        joined = &mut task => return joined.map_err(std::io::Error::other)?,
        _ = shutdown => {}
    }

    info!("Stopping HTTP server, waiting for in-flight requests...");
    handle.stop(true).await;
    task.await.map_err(std::io::Error::other)??;

    info!("Shutdown complete");
    Ok(())
}
