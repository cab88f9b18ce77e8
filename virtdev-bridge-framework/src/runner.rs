//! Process lifecycle: logging, the shared bus session and shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use virtdev_common::{LoggingConfig, connect, init_tracing};

use crate::config::BridgeConfig;
use crate::error::Result;

/// Owns what every device instance of the process shares.
///
/// - the tracing subscriber
/// - one Zenoh session
/// - the shutdown broadcast, raised on Ctrl+C or SIGTERM
///
/// ```ignore
/// let runner = BridgeRunner::new("zenoh-bridge-mqtt", settings, &logging).await?;
/// let reports = runner
///     .run_until_signal(supervisor.run(entries))
///     .await;
/// runner.close().await;
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    name: String,
    config: C,
    session: Arc<zenoh::Session>,
    /// `true` once shutdown was requested.
    shutdown: watch::Sender<bool>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Install logging, then open the bus session.
    pub async fn new(name: impl Into<String>, config: C, logging: &LoggingConfig) -> Result<Self> {
        init_tracing(logging)?;

        let name = name.into();
        tracing::info!(
            bridge = %name,
            version = env!("CARGO_PKG_VERSION"),
            key_prefix = %config.key_prefix(),
            "Starting bridge"
        );

        let session = Arc::new(connect(config.zenoh()).await?);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            name,
            config,
            session,
            shutdown,
        })
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Receiver that observes the shutdown broadcast.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Broadcast shutdown to every receiver.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Drive `work` to completion, broadcasting shutdown on the first signal.
    ///
    /// After a signal `work` keeps running so it can wind down its instances.
    pub async fn run_until_signal<F: Future>(&self, work: F) -> F::Output {
        tokio::pin!(work);

        tokio::select! {
            out = &mut work => return out,
            _ = shutdown_signal() => {
                tracing::info!(bridge = %self.name, "Received shutdown signal");
                self.request_shutdown();
            }
        }

        work.await
    }

    /// Close the Zenoh session.
    pub async fn close(self) {
        self.request_shutdown();

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Error closing Zenoh session");
        }

        tracing::info!(bridge = %self.name, "Bridge stopped");
    }
}

/// Resolve when Ctrl+C (or SIGTERM on unix) is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
