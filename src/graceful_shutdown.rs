//! Graceful shutdown coordinator (§5), adapted from this shape to drive the listener set
//! (UDP/TCP/debug-HTTP) instead of the teacher's resolver/cache-save sequence: one cancellation
//! signal, broadcast to every listener, each of which has its own graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{error, info, warn};

type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

/// Broadcasts one cancellation signal to every registered listener and waits (with a timeout)
/// for each to report it has stopped.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<ShutdownComponent>>>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub async fn register_component<F, Fut>(&self, name: String, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name,
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };
        self.components.lock().await.push(component);
    }

    /// Signals shutdown, then joins every registered listener task in parallel (§5).
    pub async fn shutdown(&self) -> ShutdownResult {
        info!("initiating graceful shutdown");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("failed to broadcast shutdown signal: {e}");
        }

        let components = self.components.lock().await;
        let mut handles = Vec::new();
        for component in components.iter() {
            info!(component = %component.name, "shutting down listener");
            handles.push((component.name.clone(), (component.shutdown_fn)()));
        }

        for (name, handle) in handles {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => info!(component = %name, "listener shut down cleanly"),
                Ok(Ok(Err(e))) => error!(component = %name, error = %e, "listener shutdown reported an error"),
                Ok(Err(e)) => error!(component = %name, error = %e, "listener shutdown task panicked"),
                Err(_) => warn!(component = %name, "listener shutdown timed out"),
            }
        }

        info!("graceful shutdown complete");
        Ok(())
    }
}
