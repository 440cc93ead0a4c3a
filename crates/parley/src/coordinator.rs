//! The coordinator: the session state machine.
//!
//! Owns the client and session registries and applies every transition
//! to them. It is plain synchronous code; the serialization that keeps it
//! consistent comes from the actor in [`crate::actor`], which is the only
//! thing that ever holds a `Coordinator`.
//!
//! ```text
//!                 newSession                joinSession (by B)
//!   unbound ───────────────→ initiator-of(S) ────────────────→ initiator-with-peer(S)
//!      ↑                          │                                   │
//!      └──── destroySession ──────┴────────── leaveSession (B) ───────┘
//! ```
//!
//! Transport closes go through [`Coordinator::disconnect`]: a closing peer
//! vacates its slot, a closing initiator keeps its slot so the same client
//! id can reclaim it, and a session with nobody left is destroyed.

use parley_protocol::{
    ClientId, ClientMessage, ErrorCode, GameConfig, Inbound, JsonCodec,
    ServerMessage, SessionId,
};
use parley_session::{
    ClientHandle, ClientRegistry, OutboundSender, Role, SessionError,
    SessionRegistry,
};
use parley_transport::{ConnectionId, HandshakeInfo};
use tracing::{debug, info, warn};

/// Registry sizes, for monitoring and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorStats {
    pub clients: usize,
    pub sessions: usize,
}

/// Owns all client and session state.
#[derive(Debug, Default)]
pub struct Coordinator {
    clients: ClientRegistry,
    sessions: SessionRegistry,
    codec: JsonCodec,
}

impl Coordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            clients: self.clients.len(),
            sessions: self.sessions.len(),
        }
    }

    // =====================================================================
    // Connection lifecycle
    // =====================================================================

    /// Registers a freshly accepted connection and sends its handshake.
    ///
    /// If the client presented an id that is still registered to an older
    /// connection, that connection is released as if it had closed and is
    /// then terminated.
    pub fn connect(
        &mut self,
        conn_id: ConnectionId,
        handshake: &HandshakeInfo,
        outbound: OutboundSender,
    ) -> ClientId {
        let client_id = ClientRegistry::assign_id(handshake.client_id.as_deref());
        let handle = ClientHandle::new(
            client_id.clone(),
            conn_id,
            handshake.remote_addr.clone(),
            outbound,
        );
        handle.send(
            &self.codec,
            &ServerMessage::Handshake {
                client_id: client_id.clone(),
            },
        );

        let previous = self.clients.get(&client_id).map(ClientHandle::conn_id);
        if let Some(previous) = previous {
            if let Some(mut stale) = self.release(&client_id, previous) {
                stale.terminate("superseded by a newer connection");
            }
        }

        info!(
            %client_id,
            %conn_id,
            addr = handshake.remote_addr.as_deref().unwrap_or("unknown"),
            reconnect = handshake.client_id.is_some(),
            "client connected"
        );
        self.clients.register(handle);
        client_id
    }

    /// Handles a transport close.
    ///
    /// Ignored when `conn_id` is not the client's current connection: that
    /// connection was already superseded and released.
    pub fn disconnect(&mut self, client_id: &ClientId, conn_id: ConnectionId) {
        if self.release(client_id, conn_id).is_some() {
            info!(%client_id, %conn_id, "client disconnected");
        } else {
            debug!(%client_id, %conn_id, "close from a stale connection ignored");
        }
    }

    /// Records a pong.
    pub fn mark_alive(&mut self, client_id: &ClientId, conn_id: ConnectionId) {
        if let Some(handle) = self
            .clients
            .get_mut(client_id)
            .filter(|h| h.conn_id() == conn_id)
        {
            handle.mark_alive();
        }
    }

    /// One pass of the liveness sweep.
    ///
    /// Every client that did not answer the previous probe is terminated
    /// and released; every other client is probed again. Returns the
    /// terminated client ids.
    pub fn sweep(&mut self) -> Vec<ClientId> {
        let mut unresponsive = Vec::new();
        for handle in self.clients.iter_mut() {
            if handle.is_alive() {
                handle.probe_liveness();
            } else {
                unresponsive.push(handle.key());
            }
        }

        let mut terminated = Vec::with_capacity(unresponsive.len());
        for key in unresponsive {
            if let Some(mut handle) = self.release(&key.client_id, key.conn_id) {
                handle.terminate("liveness probe unanswered");
                terminated.push(key.client_id);
            }
        }
        terminated
    }

    /// Unregisters a connection and detaches it from its session.
    ///
    /// Shared by transport close, supersede and sweep termination.
    fn release(
        &mut self,
        client_id: &ClientId,
        conn_id: ConnectionId,
    ) -> Option<ClientHandle> {
        let mut handle = self.clients.remove(client_id, conn_id)?;
        handle.mark_dead();

        let Some(session_id) = handle.unbind() else {
            return Some(handle);
        };
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Some(handle);
        };
        let Some(role) = session.role_of(client_id) else {
            return Some(handle);
        };

        if role == Role::Peer {
            session.clear_peer();
        }
        if let Some(other) = session.slot(role.other()).and_then(|k| self.clients.resolve(k)) {
            other.send(&self.codec, &ServerMessage::PeerDisconnected {});
        }

        let anyone_left = session.occupants().any(|(_, k)| self.clients.is_present(k));
        if !anyone_left {
            debug!(%session_id, "last occupant gone");
            self.teardown(&session_id, None);
        }
        Some(handle)
    }

    // =====================================================================
    // Message dispatch
    // =====================================================================

    /// Handles one inbound message from a client's current connection.
    ///
    /// Malformed input is answered with `invalidRequest`; refused requests
    /// with their error code. Nothing here closes the connection.
    pub fn dispatch(&mut self, client_id: &ClientId, conn_id: ConnectionId, data: &[u8]) {
        let current = self
            .clients
            .get(client_id)
            .is_some_and(|h| h.conn_id() == conn_id);
        if !current {
            debug!(%client_id, %conn_id, "message from a stale connection dropped");
            return;
        }

        let result = match Inbound::decode(&self.codec, data) {
            Ok(Inbound::Relay(raw)) => self.relay(client_id, raw),
            Ok(Inbound::Control(msg)) => self.apply(client_id, msg),
            Err(e) => {
                debug!(%client_id, error = %e, "invalid request");
                self.reply(
                    client_id,
                    &ServerMessage::error(ErrorCode::InvalidRequest, Some(e.to_string())),
                );
                return;
            }
        };

        if let Err(e) = result {
            debug!(%client_id, error = %e, "request refused");
            self.reply(client_id, &ServerMessage::error(e.code(), Some(e.to_string())));
        }
    }

    fn apply(&mut self, client_id: &ClientId, msg: ClientMessage) -> Result<(), SessionError> {
        match msg {
            ClientMessage::NewSession { config } => {
                self.new_session(client_id, config);
                Ok(())
            }
            ClientMessage::JoinSession { session_id } => self.join_session(client_id, session_id),
            ClientMessage::LeaveSession {} => {
                self.leave_session(client_id);
                Ok(())
            }
            ClientMessage::DestroySession {} => {
                self.destroy_session(client_id);
                Ok(())
            }
        }
    }

    fn reply(&self, client_id: &ClientId, msg: &ServerMessage) {
        if let Some(handle) = self.clients.get(client_id) {
            handle.send(&self.codec, msg);
        }
    }

    // =====================================================================
    // Session transitions
    // =====================================================================

    /// Opens a session with `client_id` as initiator.
    ///
    /// A client that is already in a session leaves it first, so asking
    /// for a new session never strands the old one.
    pub(crate) fn new_session(
        &mut self,
        client_id: &ClientId,
        config: GameConfig,
    ) -> Option<SessionId> {
        if let Some(previous) = self.clients.get(client_id)?.session().cloned() {
            debug!(%client_id, session_id = %previous, "leaving previous session first");
            self.leave_session(client_id);
        }

        let key = self.clients.get(client_id)?.key();
        let session_id = self.sessions.create(key, config).id().clone();

        let handle = self.clients.get_mut(client_id)?;
        handle.bind(session_id.clone());
        handle.send(
            &self.codec,
            &ServerMessage::SessionCreated {
                session_id: session_id.clone(),
            },
        );
        Some(session_id)
    }

    /// Puts `client_id` into an existing session.
    ///
    /// The initiator's own client id reclaims the initiator slot; anyone
    /// else takes the peer slot if it is free.
    pub(crate) fn join_session(
        &mut self,
        client_id: &ClientId,
        session_id: SessionId,
    ) -> Result<(), SessionError> {
        let Some(handle) = self.clients.get(client_id) else {
            return Ok(());
        };
        if let Some(bound) = handle.session() {
            if *bound != session_id {
                return Err(SessionError::AlreadyBound(bound.clone()));
            }
        }
        let key = handle.key();

        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

        let role = match session.role_of(client_id) {
            Some(Role::Initiator) => {
                if *session.initiator() != key {
                    info!(%session_id, %client_id, "initiator reconnected");
                    session.replace_initiator(key);
                }
                Role::Initiator
            }
            Some(Role::Peer) => {
                session.set_peer(key);
                Role::Peer
            }
            None if session.peer().is_some() => {
                return Err(SessionError::Full(session_id));
            }
            None => {
                session.set_peer(key);
                Role::Peer
            }
        };

        if let Some(handle) = self.clients.get_mut(client_id) {
            handle.bind(session_id.clone());
        }
        info!(%session_id, %client_id, %role, "joined session");

        // A reclaimed session with nobody in the peer slot is back to
        // waiting for a peer.
        if session.peer().is_none() {
            if let Some(handle) = self.clients.get(client_id) {
                handle.send(
                    &self.codec,
                    &ServerMessage::SessionCreated {
                        session_id: session_id.clone(),
                    },
                );
            }
            return Ok(());
        }

        for (role, key) in session.occupants() {
            if let Some(occupant) = self.clients.resolve(key) {
                occupant.send(
                    &self.codec,
                    &ServerMessage::SessionJoined {
                        session_id: session_id.clone(),
                        config: session.config_for(role),
                    },
                );
            }
        }
        Ok(())
    }

    /// Takes `client_id` out of its session.
    ///
    /// For the initiator this is the same as destroying the session.
    pub(crate) fn leave_session(&mut self, client_id: &ClientId) {
        let Some(session_id) = self
            .clients
            .get(client_id)
            .and_then(|h| h.session().cloned())
        else {
            return;
        };

        let is_peer = self
            .sessions
            .get(&session_id)
            .and_then(|s| s.role_of(client_id))
            == Some(Role::Peer);
        if !is_peer {
            self.destroy_session(client_id);
            return;
        }

        if let Some(handle) = self.clients.get_mut(client_id) {
            handle.unbind();
        }
        info!(%session_id, %client_id, "peer left session");

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.clear_peer();
        match self.clients.resolve(session.initiator()) {
            Some(initiator) => {
                initiator.send(&self.codec, &ServerMessage::PeerDisconnected {});
            }
            None => {
                debug!(%session_id, "initiator already gone");
                self.teardown(&session_id, Some(client_id));
            }
        }
    }

    /// Destroys the session `client_id` is in, telling the other side.
    pub(crate) fn destroy_session(&mut self, client_id: &ClientId) {
        let Some(session_id) = self
            .clients
            .get(client_id)
            .and_then(|h| h.session().cloned())
        else {
            return;
        };
        self.teardown(&session_id, Some(client_id));
    }

    /// Removes a session and unbinds everyone in it. Every registered
    /// occupant other than `requested_by` is sent `sessionDestroyed`.
    fn teardown(&mut self, session_id: &SessionId, requested_by: Option<&ClientId>) {
        let Some(session) = self.sessions.remove(session_id) else {
            return;
        };
        for (_, key) in session.occupants() {
            let Some(occupant) = self.clients.resolve_mut(key) else {
                continue;
            };
            if occupant.session() == Some(session_id) {
                occupant.unbind();
            }
            if Some(occupant.id()) != requested_by {
                occupant.send(&self.codec, &ServerMessage::SessionDestroyed {});
            }
        }
    }

    /// Forwards a relay message, verbatim, to the other occupant.
    pub(crate) fn relay(&mut self, client_id: &ClientId, raw: Vec<u8>) -> Result<(), SessionError> {
        let Some(handle) = self.clients.get(client_id) else {
            return Ok(());
        };
        let session_id = handle.session().ok_or(SessionError::NoSession)?;
        let session = self.sessions.get(session_id).ok_or_else(|| {
            warn!(%client_id, %session_id, "bound to a session that no longer exists");
            SessionError::NoSession
        })?;
        let role = session.role_of(client_id).ok_or(SessionError::NoSession)?;

        let counterpart = session
            .slot(role.other())
            .and_then(|k| self.clients.resolve(k))
            .ok_or_else(|| SessionError::NoPeer(session_id.clone()))?;

        counterpart.send_raw(raw);
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
