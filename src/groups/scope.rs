//! # Group scopes: which servers a group currently covers.
//!
//! A fixed [`Group`](crate::Group) covers exactly one server. An
//! [`AutoGroup`](crate::AutoGroup) covers every server whose name matches its
//! [`ServerPattern`], re-evaluated on every call. With
//! [`OverlapPolicy::FirstMatchWins`] a server matched by several auto groups is
//! claimed by the one registered first.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::collab::{Directory, Server, ServerId};
use crate::core::OverlapPolicy;
use crate::groups::{GroupId, ServerPattern};

/// Live view of the servers a group covers.
pub(crate) trait Scope: Send + Sync {
    /// Servers covered right now.
    fn servers(&self) -> Vec<Server>;

    /// True if `server` is covered right now.
    fn contains(&self, server: ServerId) -> bool;
}

pub(crate) struct FixedScope {
    server: ServerId,
    directory: Arc<dyn Directory>,
}

impl FixedScope {
    pub(crate) fn new(server: ServerId, directory: Arc<dyn Directory>) -> Self {
        Self { server, directory }
    }
}

impl Scope for FixedScope {
    fn servers(&self) -> Vec<Server> {
        self.directory.server(self.server).into_iter().collect()
    }

    fn contains(&self, server: ServerId) -> bool {
        server == self.server
    }
}

/// Auto group patterns in registration order.
#[derive(Default)]
pub(crate) struct PatternRegistry {
    entries: RwLock<Vec<(GroupId, ServerPattern)>>,
}

impl PatternRegistry {
    /// Registers or replaces `owner`'s pattern; replacing keeps the original position.
    pub(crate) fn register(&self, owner: GroupId, pattern: ServerPattern) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(id, _)| *id == owner) {
            Some(entry) => entry.1 = pattern,
            None => entries.push((owner, pattern)),
        }
    }

    pub(crate) fn unregister(&self, owner: GroupId) {
        self.entries.write().retain(|(id, _)| *id != owner);
    }

    /// Earliest registered group whose pattern matches `name`.
    pub(crate) fn first_match(&self, name: &str) -> Option<GroupId> {
        self.entries
            .read()
            .iter()
            .find(|(_, p)| p.matches(name))
            .map(|(id, _)| *id)
    }
}

pub(crate) struct PatternScope {
    owner: GroupId,
    pattern: ServerPattern,
    directory: Arc<dyn Directory>,
    registry: Arc<PatternRegistry>,
    overlap: OverlapPolicy,
}

impl PatternScope {
    pub(crate) fn new(
        owner: GroupId,
        pattern: ServerPattern,
        directory: Arc<dyn Directory>,
        registry: Arc<PatternRegistry>,
        overlap: OverlapPolicy,
    ) -> Self {
        Self {
            owner,
            pattern,
            directory,
            registry,
            overlap,
        }
    }

    fn claims(&self, server: &Server) -> bool {
        match self.overlap {
            OverlapPolicy::Duplicate => true,
            OverlapPolicy::FirstMatchWins => self
                .registry
                .first_match(&server.name)
                .is_none_or(|first| first == self.owner),
        }
    }
}

impl Scope for PatternScope {
    fn servers(&self) -> Vec<Server> {
        self.directory
            .matching_servers(&self.pattern)
            .into_iter()
            .filter(|s| self.claims(s))
            .collect()
    }

    fn contains(&self, server: ServerId) -> bool {
        self.directory
            .server(server)
            .is_some_and(|s| self.pattern.matches(&s.name) && self.claims(&s))
    }
}
