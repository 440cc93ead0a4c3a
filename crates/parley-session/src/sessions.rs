//! The session registry: every live session, keyed by its code.
//!
//! # Concurrency note
//!
//! Plain `HashMap`, no locking. The registry is owned by the coordinator
//! task and only ever touched from there.

use std::collections::HashMap;

use parley_protocol::{GameConfig, SessionId};
use rand::Rng;

use crate::{ConnectionKey, Session};

/// Smallest session code. Codes never start with a zero.
pub const MIN_SESSION_CODE: u32 = 100_000;

/// One past the largest session code.
pub const MAX_SESSION_CODE: u32 = 1_000_000;

/// All live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a session under a fresh random code.
    pub fn create(&mut self, initiator: ConnectionKey, config: GameConfig) -> &Session {
        let mut rng = rand::rng();
        self.create_with(initiator, config, || {
            rng.random_range(MIN_SESSION_CODE..MAX_SESSION_CODE)
        })
    }

    /// Like [`create`](Self::create), drawing candidate codes from `draw`.
    pub fn create_with(
        &mut self,
        initiator: ConnectionKey,
        config: GameConfig,
        draw: impl FnMut() -> u32,
    ) -> &Session {
        let id = self.next_free_id(draw);
        tracing::info!(session_id = %id, initiator = %initiator, "session created");
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id, initiator, config))
    }

    /// Draws codes until one isn't taken.
    ///
    /// Terminates as long as `draw` eventually produces a free code; with
    /// 900 000 codes and a handful of live sessions a redraw is rare.
    fn next_free_id(&self, mut draw: impl FnMut() -> u32) -> SessionId {
        loop {
            let id = SessionId::from(format!("{:06}", draw()));
            if !self.sessions.contains_key(&id) {
                return id;
            }
            tracing::debug!(session_id = %id, "session code collision, redrawing");
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Unregisters a session, returning it.
    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(id);
        if removed.is_some() {
            tracing::info!(session_id = %id, "session destroyed");
        }
        removed
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::ClientId;
    use parley_transport::ConnectionId;

    fn key(client: &str) -> ConnectionKey {
        ConnectionKey {
            client_id: ClientId::from(client),
            conn_id: ConnectionId::new(1),
        }
    }

    #[test]
    fn test_create_generates_six_digit_code() {
        let mut registry = SessionRegistry::new();

        let id = registry.create(key("alice"), GameConfig::default()).id().clone();

        assert_eq!(id.as_str().len(), 6);
        assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));
        assert_ne!(id.as_str().as_bytes()[0], b'0');
        assert!(registry.contains(&id));
    }

    #[test]
    fn test_create_many_sessions_ids_are_unique() {
        let mut registry = SessionRegistry::new();

        for i in 0..500 {
            registry.create(key(&format!("c-{i}")), GameConfig::default());
        }

        // Every create landed under its own code.
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn test_create_with_redraws_on_collision() {
        let mut registry = SessionRegistry::new();
        registry.create_with(key("alice"), GameConfig::default(), || 111_111);

        let mut draws = [111_111, 111_111, 222_222].into_iter();
        let id = registry
            .create_with(key("bob"), GameConfig::default(), || draws.next().unwrap())
            .id()
            .clone();

        assert_eq!(id, SessionId::from("222222"));
        assert_eq!(registry.len(), 2);
        // The first session was not overwritten.
        assert_eq!(
            registry.get(&SessionId::from("111111")).unwrap().initiator(),
            &key("alice")
        );
    }

    #[test]
    fn test_remove_unregisters_session() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(key("alice"), GameConfig::default()).id().clone();

        let removed = registry.remove(&id).expect("session should exist");

        assert_eq!(removed.id(), &id);
        assert!(registry.is_empty());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get(&SessionId::from("999999")).is_none());
    }
}
