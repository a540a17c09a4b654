//! Role markers.
//!
//! Hosts and clients share one transport with unrelated traffic, so every
//! batch is stamped with the sender's role. An endpoint only reads batches
//! stamped with the opposite role.

use std::fmt;

/// Key holding the role marker in the batch encoding.
pub const CHANNEL_KEY: &str = "bridge";

/// Batch marker for traffic sent by a host.
pub const HOST_MARKER: &str = "BRHOST#2";

/// Batch marker for traffic sent by a client.
pub const CLIENT_MARKER: &str = "BRCLIENT#2";

/// Legacy string prefix for traffic sent by a host.
pub const HOST_LEGACY_PREFIX: &str = "BRHOST#";

/// Legacy string prefix for traffic sent by a client.
pub const CLIENT_LEGACY_PREFIX: &str = "BRCLIENT#";

/// Which side of the protocol produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Serves requests and broadcasts events.
    Host,
    /// Issues requests and listens for events.
    Client,
}

impl Role {
    /// Marker value stored under [`CHANNEL_KEY`].
    pub fn marker(self) -> &'static str {
        match self {
            Role::Host => HOST_MARKER,
            Role::Client => CLIENT_MARKER,
        }
    }

    /// Prefix of the legacy string encoding.
    pub fn legacy_prefix(self) -> &'static str {
        match self {
            Role::Host => HOST_LEGACY_PREFIX,
            Role::Client => CLIENT_LEGACY_PREFIX,
        }
    }

    /// The role whose traffic this role consumes.
    pub fn peer(self) -> Role {
        match self {
            Role::Host => Role::Client,
            Role::Client => Role::Host,
        }
    }

    /// Returns the role stamped by `marker`, if it is one of ours.
    pub fn from_marker(marker: &str) -> Option<Role> {
        match marker {
            HOST_MARKER => Some(Role::Host),
            CLIENT_MARKER => Some(Role::Client),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Client => f.write_str("client"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_is_opposite_role() {
        assert_eq!(Role::Host.peer(), Role::Client);
        assert_eq!(Role::Client.peer(), Role::Host);
    }

    #[test]
    fn markers_resolve_back_to_roles() {
        assert_eq!(Role::from_marker(Role::Host.marker()), Some(Role::Host));
        assert_eq!(Role::from_marker(Role::Client.marker()), Some(Role::Client));
        assert_eq!(Role::from_marker("BRHOST#1"), None);
    }

    #[test]
    fn legacy_prefixes_do_not_overlap() {
        // "BRHOST#" must never be mistaken for a client prefix and vice versa.
        assert!(!HOST_LEGACY_PREFIX.starts_with(CLIENT_LEGACY_PREFIX));
        assert!(!CLIENT_LEGACY_PREFIX.starts_with(HOST_LEGACY_PREFIX));
    }
}
