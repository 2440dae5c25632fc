use crate::router::build_router;
use crate::sweeper::spawn_sweeper;
use anyhow::{Context, Result};
use convo_rs_config::{ServerConfig, SweepConfig};
use convo_rs_memory::MemoryManager;
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// HTTP server for the memory service plus its background sweeper.
pub struct MemoryServer {
    server: ServerConfig,
    sweep: SweepConfig,
    manager: Arc<MemoryManager>,
}

impl MemoryServer {
    pub fn new(server: ServerConfig, sweep: SweepConfig, manager: Arc<MemoryManager>) -> Self {
        Self {
            server,
            sweep,
            manager,
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let local = listener.local_addr().context("listener has no local address")?;
        info!("memory service listening on {local}");

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = spawn_sweeper(
            self.manager.clone(),
            Duration::from_secs(self.sweep.interval_secs),
            stop_rx,
        );

        let app = build_router(self.manager);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("memory service shutting down");
            })
            .await
            .context("http server failed");

        let _ = stop_tx.send(true);
        if let Some(handle) = sweeper
            && let Err(err) = handle.await
        {
            warn!("expiry sweeper ended abnormally: {err}");
        }
        served
    }
}
