//! Coordinator actor: a single Tokio task that owns the [`Coordinator`].
//!
//! Connection handlers never touch client or session state directly. They
//! send a [`CoordinatorEvent`] through a [`CoordinatorHandle`], and the
//! actor applies events one at a time, so every transition sees a
//! consistent view of both registries. The liveness sweep runs in the
//! same loop on a timer.

use std::time::Duration;

use parley_protocol::ClientId;
use parley_session::OutboundSender;
use parley_transport::{ConnectionId, HandshakeInfo};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::coordinator::{Coordinator, CoordinatorStats};
use crate::ParleyError;

/// Capacity of the event channel. Handlers wait when it is full.
pub const EVENT_CHANNEL_SIZE: usize = 1024;

/// Everything a connection handler can tell the coordinator.
pub(crate) enum CoordinatorEvent {
    /// A connection finished its transport handshake.
    Connected {
        conn_id: ConnectionId,
        handshake: HandshakeInfo,
        outbound: OutboundSender,
        reply: oneshot::Sender<ClientId>,
    },

    /// A text or binary frame arrived.
    Message {
        client_id: ClientId,
        conn_id: ConnectionId,
        data: Vec<u8>,
    },

    /// A liveness probe was answered.
    Pong {
        client_id: ClientId,
        conn_id: ConnectionId,
    },

    /// The transport closed.
    Closed {
        client_id: ClientId,
        conn_id: ConnectionId,
    },

    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },

    /// Stop the actor.
    Shutdown,
}

/// Handle to the running coordinator.
///
/// Cheap to clone: it's an `mpsc::Sender` wrapper. Every connection
/// handler holds one.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Registers a new connection and returns the client id it was given.
    ///
    /// The handshake message is already queued on `outbound` when this
    /// returns.
    pub async fn connect(
        &self,
        conn_id: ConnectionId,
        handshake: HandshakeInfo,
        outbound: OutboundSender,
    ) -> Result<ClientId, ParleyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorEvent::Connected {
            conn_id,
            handshake,
            outbound,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| ParleyError::CoordinatorUnavailable)
    }

    /// Delivers an inbound frame (fire-and-forget).
    pub async fn message(
        &self,
        client_id: ClientId,
        conn_id: ConnectionId,
        data: Vec<u8>,
    ) -> Result<(), ParleyError> {
        self.send(CoordinatorEvent::Message {
            client_id,
            conn_id,
            data,
        })
        .await
    }

    pub async fn pong(
        &self,
        client_id: ClientId,
        conn_id: ConnectionId,
    ) -> Result<(), ParleyError> {
        self.send(CoordinatorEvent::Pong { client_id, conn_id }).await
    }

    /// Reports a closed transport.
    pub async fn closed(
        &self,
        client_id: ClientId,
        conn_id: ConnectionId,
    ) -> Result<(), ParleyError> {
        self.send(CoordinatorEvent::Closed { client_id, conn_id })
            .await
    }

    /// Current registry sizes.
    pub async fn stats(&self) -> Result<CoordinatorStats, ParleyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorEvent::Stats { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| ParleyError::CoordinatorUnavailable)
    }

    /// Tells the coordinator to stop.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        self.send(CoordinatorEvent::Shutdown).await
    }

    async fn send(&self, event: CoordinatorEvent) -> Result<(), ParleyError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ParleyError::CoordinatorUnavailable)
    }
}

/// The actor state. Runs inside a Tokio task.
struct CoordinatorActor {
    coordinator: Coordinator,
    receiver: mpsc::Receiver<CoordinatorEvent>,
    sweep_interval: Duration,
}

impl CoordinatorActor {
    /// Processes events until shutdown or until every handle is dropped.
    async fn run(mut self) {
        tracing::info!(
            sweep_interval_ms = self.sweep_interval.as_millis() as u64,
            "coordinator started"
        );

        // First sweep one full period after start, not immediately.
        let mut sweep = time::interval_at(
            Instant::now() + self.sweep_interval,
            self.sweep_interval,
        );

        loop {
            tokio::select! {
                event = self.receiver.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle(event) {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    let terminated = self.coordinator.sweep();
                    if !terminated.is_empty() {
                        tracing::warn!(
                            count = terminated.len(),
                            ids = ?terminated,
                            "terminated unresponsive clients"
                        );
                    }
                }
            }
        }

        tracing::info!("coordinator stopped");
    }

    /// Applies one event. Returns `false` when the actor should stop.
    fn handle(&mut self, event: CoordinatorEvent) -> bool {
        match event {
            CoordinatorEvent::Connected {
                conn_id,
                handshake,
                outbound,
                reply,
            } => {
                let client_id =
                    self.coordinator.connect(conn_id, &handshake, outbound);
                let _ = reply.send(client_id);
            }
            CoordinatorEvent::Message {
                client_id,
                conn_id,
                data,
            } => {
                self.coordinator.dispatch(&client_id, conn_id, &data);
            }
            CoordinatorEvent::Pong { client_id, conn_id } => {
                self.coordinator.mark_alive(&client_id, conn_id);
            }
            CoordinatorEvent::Closed { client_id, conn_id } => {
                self.coordinator.disconnect(&client_id, conn_id);
            }
            CoordinatorEvent::Stats { reply } => {
                let _ = reply.send(self.coordinator.stats());
            }
            CoordinatorEvent::Shutdown => return false,
        }
        true
    }
}

/// Spawns the coordinator task and returns a handle to it.
///
/// `sweep_interval` is both the probe period and the grace a client has to
/// answer a probe.
pub fn spawn_coordinator(sweep_interval: Duration) -> CoordinatorHandle {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

    let actor = CoordinatorActor {
        coordinator: Coordinator::new(),
        receiver: rx,
        sweep_interval,
    };

    tokio::spawn(actor.run());

    CoordinatorHandle { sender: tx }
}
