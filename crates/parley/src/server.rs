//! `ParleyServer` builder and server loop.
//!
//! This is the entry point for running a Parley server. It ties together
//! all the layers: transport → coordinator actor → per-connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use parley_transport::{Transport, TransportError, WebSocketTransport};

use crate::actor::{CoordinatorHandle, spawn_coordinator};
use crate::handler::handle_connection;
use crate::ParleyError;

/// Default liveness sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`.
    pub bind_addr: String,
    /// How often clients are probed. A client that has not answered the
    /// previous probe when the next one is due is disconnected.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use parley::ParleyServer;
///
/// # async fn run() -> Result<(), parley::ParleyError> {
/// let server = ParleyServer::builder()
///     .bind("0.0.0.0:8080")
///     .sweep_interval(Duration::from_secs(30))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParleyServerBuilder {
    config: ServerConfig,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the liveness sweep period. Zero is raised to one millisecond.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Binds the listener and starts the coordinator.
    pub async fn build(self) -> Result<ParleyServer, ParleyError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let sweep_interval = self.config.sweep_interval.max(Duration::from_millis(1));
        let coordinator = spawn_coordinator(sweep_interval);

        Ok(ParleyServer {
            transport,
            coordinator,
        })
    }
}

/// A bound Parley server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParleyServer {
    transport: WebSocketTransport,
    coordinator: CoordinatorHandle,
}

impl ParleyServer {
    /// Creates a new builder.
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the coordinator, for stats or an orderly stop.
    pub fn coordinator(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    /// Runs the server accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ParleyError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server accept loop until `shutdown` resolves.
    ///
    /// Accepts incoming connections and spawns a handler task for each;
    /// the WebSocket upgrade runs inside that task. On shutdown the
    /// transport stops accepting and the coordinator is stopped.
    /// Connections already open are left to their handlers.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ParleyError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Parley server running");
        tokio::pin!(shutdown);
        let mut stopping = false;

        loop {
            let accepted = tokio::select! {
                accepted = self.transport.accept() => Some(accepted),
                _ = &mut shutdown, if !stopping => None,
            };
            let Some(accepted) = accepted else {
                stopping = true;
                self.transport.shutdown().await?;
                continue;
            };

            match accepted {
                Ok(pending) => {
                    let coordinator = self.coordinator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, coordinator).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(TransportError::Shutdown) => {
                    tracing::info!("transport shut down, stopping accept loop");
                    let _ = self.coordinator.shutdown().await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
