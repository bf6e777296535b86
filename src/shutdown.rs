//! Graceful shutdown helpers.
//!
//! Binaries wait for SIGINT/SIGTERM, stop accepting new work, and give
//! in-flight tasks a bounded grace window before exiting.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wait for SIGINT or SIGTERM.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received interrupt");
    }

    Ok(())
}

/// Wait for background tasks to finish, up to the grace window. Tasks still
/// running when the window closes are abandoned; the process is exiting
/// anyway.
pub async fn drain(tasks: Vec<JoinHandle<()>>, grace: Duration) {
    let all = async {
        for task in tasks {
            let _ = task.await;
        }
    };

    if tokio::time::timeout(grace, all).await.is_err() {
        warn!(grace_secs = grace.as_secs(), "Grace window elapsed with tasks still running");
    }
}
