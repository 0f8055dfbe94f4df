//! # Destination directory: the account's live view of servers and channels.
//!
//! The directory is a synchronous lookup over the remote service's cache. It is
//! consulted on every initialization (to resolve channel ids) and at send time
//! (to evaluate channel patterns and filter delivery reports).

use std::fmt;

use crate::groups::ServerPattern;

/// Identifier of a remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub u64);

/// Identifier of a channel (delivery destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of channel; items deliver to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    Voice,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Text => f.write_str("text"),
            ChannelKind::Voice => f.write_str("voice"),
        }
    }
}

/// A server as seen by the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
}

/// A channel inside a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub server: ServerId,
}

/// Live lookup of servers and channels.
///
/// Implementations are expected to answer from a local cache; none of these
/// methods should block on the network.
pub trait Directory: Send + Sync + 'static {
    /// All servers the account is currently a member of.
    fn servers(&self) -> Vec<Server>;

    /// Channels of `server`, optionally restricted to one kind.
    fn channels(&self, server: ServerId, kind: Option<ChannelKind>) -> Vec<Channel>;

    /// Looks up a channel by id.
    fn channel(&self, id: ChannelId) -> Option<Channel>;

    /// Looks up a server by id.
    fn server(&self, id: ServerId) -> Option<Server> {
        self.servers().into_iter().find(|s| s.id == id)
    }

    /// Servers whose name satisfies the include/exclude rule of `pattern`.
    fn matching_servers(&self, pattern: &ServerPattern) -> Vec<Server> {
        self.servers()
            .into_iter()
            .filter(|s| pattern.matches(&s.name))
            .collect()
    }
}
