//! Session types: the pairing of an initiator and an optional peer.
//!
//! A session is what two players meet in. It records:
//! - WHICH code identifies it (`SessionId`)
//! - WHO created it (the initiator slot, always filled)
//! - WHO joined it (the peer slot, filled once someone joins)
//! - WHAT game setup was chosen (`GameConfig`, opaque to the server)
//!
//! Slots hold [`ConnectionKey`]s, never handles. Resolving a key goes
//! through the client registry, so a session can't keep a dead connection
//! alive or point at one that was replaced.

use std::fmt;

use parley_protocol::{ClientId, GameConfig, SessionId};

use crate::ConnectionKey;

/// Which slot a client occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Created the session. The session lives and dies with this slot.
    Initiator,
    /// Joined an existing session.
    Peer,
}

impl Role {
    /// The slot on the other side of the board.
    pub fn other(self) -> Self {
        match self {
            Self::Initiator => Self::Peer,
            Self::Peer => Self::Initiator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Peer => f.write_str("peer"),
        }
    }
}

/// A peer session.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    initiator: ConnectionKey,
    peer: Option<ConnectionKey>,
    config: GameConfig,
}

impl Session {
    /// Creates a session with only its initiator.
    pub fn new(id: SessionId, initiator: ConnectionKey, config: GameConfig) -> Self {
        Self {
            id,
            initiator,
            peer: None,
            config,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn initiator(&self) -> &ConnectionKey {
        &self.initiator
    }

    pub fn peer(&self) -> Option<&ConnectionKey> {
        self.peer.as_ref()
    }

    /// Returns the key in the given slot.
    pub fn slot(&self, role: Role) -> Option<&ConnectionKey> {
        match role {
            Role::Initiator => Some(&self.initiator),
            Role::Peer => self.peer.as_ref(),
        }
    }

    /// Which slot carries this client id, if any.
    ///
    /// Matches on the client id alone so a reconnecting client (same id,
    /// new connection) is still recognised.
    pub fn role_of(&self, client_id: &ClientId) -> Option<Role> {
        if self.initiator.client_id == *client_id {
            Some(Role::Initiator)
        } else if self.peer.as_ref().is_some_and(|p| p.client_id == *client_id) {
            Some(Role::Peer)
        } else {
            None
        }
    }

    /// Points the initiator slot at a new connection of the same client.
    pub fn replace_initiator(&mut self, key: ConnectionKey) {
        debug_assert_eq!(key.client_id, self.initiator.client_id);
        self.initiator = key;
    }

    pub fn set_peer(&mut self, key: ConnectionKey) {
        self.peer = Some(key);
    }

    /// Empties the peer slot, returning who was in it.
    pub fn clear_peer(&mut self) -> Option<ConnectionKey> {
        self.peer.take()
    }

    /// Both slot keys, initiator first.
    pub fn occupants(&self) -> impl Iterator<Item = (Role, &ConnectionKey)> {
        std::iter::once((Role::Initiator, &self.initiator))
            .chain(self.peer.iter().map(|p| (Role::Peer, p)))
    }

    /// The game config as the occupant of `role` should see it.
    ///
    /// The initiator chose the config from its own side; the peer gets
    /// the opposite colour.
    pub fn config_for(&self, role: Role) -> GameConfig {
        match role {
            Role::Initiator => self.config.clone(),
            Role::Peer => self.config.mirrored(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_transport::ConnectionId;

    fn key(client: &str, conn: u64) -> ConnectionKey {
        ConnectionKey {
            client_id: ClientId::from(client),
            conn_id: ConnectionId::new(conn),
        }
    }

    fn session() -> Session {
        Session::new(
            SessionId::from("123456"),
            key("alice", 1),
            GameConfig {
                play_as_white: true,
                ..GameConfig::default()
            },
        )
    }

    #[test]
    fn test_new_session_has_only_initiator() {
        let s = session();
        assert_eq!(s.initiator(), &key("alice", 1));
        assert!(s.peer().is_none());
        assert_eq!(s.occupants().count(), 1);
    }

    #[test]
    fn test_role_of_matches_client_id_across_connections() {
        let mut s = session();
        s.set_peer(key("bob", 2));

        assert_eq!(s.role_of(&ClientId::from("alice")), Some(Role::Initiator));
        assert_eq!(s.role_of(&ClientId::from("bob")), Some(Role::Peer));
        assert_eq!(s.role_of(&ClientId::from("carol")), None);
    }

    #[test]
    fn test_replace_initiator_keeps_peer() {
        let mut s = session();
        s.set_peer(key("bob", 2));

        s.replace_initiator(key("alice", 9));

        assert_eq!(s.initiator(), &key("alice", 9));
        assert_eq!(s.peer(), Some(&key("bob", 2)));
    }

    #[test]
    fn test_clear_peer_returns_previous_occupant() {
        let mut s = session();
        s.set_peer(key("bob", 2));

        assert_eq!(s.clear_peer(), Some(key("bob", 2)));
        assert!(s.peer().is_none());
        assert_eq!(s.clear_peer(), None);
    }

    #[test]
    fn test_config_for_mirrors_side_for_peer() {
        let s = session();
        assert!(s.config_for(Role::Initiator).play_as_white);
        assert!(!s.config_for(Role::Peer).play_as_white);
    }

    #[test]
    fn test_slot_and_other() {
        let mut s = session();
        assert!(s.slot(Role::Peer).is_none());
        s.set_peer(key("bob", 2));
        assert_eq!(s.slot(Role::Initiator.other()), Some(&key("bob", 2)));
        assert_eq!(Role::Peer.other(), Role::Initiator);
    }
}
