//! Groups: item owners bound to a set of servers.
//!
//! ## Contents
//! - [`Group`] one fixed server
//! - [`AutoGroup`] every server whose name matches a [`ServerPattern`], plus optional auto-join
//! - [`GroupRef`] either flavour, as stored by the [`Engine`](crate::Engine)
//!
//! ## Quick wiring
//! ```text
//! Engine::add_group(group) ──► GroupAdded ──► group.initialize()
//!                                              ├─ validate (server visible / patterns compile)
//!                                              ├─ register item listeners (owner = group id)
//!                                              ├─ adopt configured items (failures are logged)
//!                                              └─ arm removal timer / join timer
//! group.update(params) ──► GroupUpdated ──► close ─► start(merged) ─┬─ Ok
//!                                                                   └─ Err ─► start(previous), Reconfiguration
//! ```

mod auto_group;
mod group;
pub(crate) mod pattern;
mod removed;
pub(crate) mod scope;
mod shared;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use auto_group::{AutoGroup, AutoGroupUpdate};
pub use group::{Group, GroupUpdate};
pub use pattern::ServerPattern;

use crate::core::EngineContext;
use crate::error::EngineError;
use crate::items::SendableItem;

static GROUP_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u64);

impl GroupId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        GroupId(GROUP_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to either group flavour.
#[derive(Clone)]
pub enum GroupRef {
    Fixed(Arc<Group>),
    Auto(Arc<AutoGroup>),
}

impl GroupRef {
    pub fn id(&self) -> GroupId {
        match self {
            GroupRef::Fixed(g) => g.id(),
            GroupRef::Auto(g) => g.id(),
        }
    }

    /// Initialized items of the group.
    pub fn items(&self) -> Vec<Arc<SendableItem>> {
        match self {
            GroupRef::Fixed(g) => g.items(),
            GroupRef::Auto(g) => g.items(),
        }
    }

    pub fn as_fixed(&self) -> Option<&Arc<Group>> {
        match self {
            GroupRef::Fixed(g) => Some(g),
            GroupRef::Auto(_) => None,
        }
    }

    pub fn as_auto(&self) -> Option<&Arc<AutoGroup>> {
        match self {
            GroupRef::Auto(g) => Some(g),
            GroupRef::Fixed(_) => None,
        }
    }

    pub(crate) fn attach(&self, ctx: &Arc<EngineContext>) {
        match self {
            GroupRef::Fixed(g) => g.attach(ctx),
            GroupRef::Auto(g) => g.attach(ctx),
        }
    }

    pub(crate) fn initialize(&self) -> Result<(), EngineError> {
        match self {
            GroupRef::Fixed(g) => g.initialize(),
            GroupRef::Auto(g) => g.initialize(),
        }
    }

    pub(crate) async fn close(&self) {
        match self {
            GroupRef::Fixed(g) => g.close().await,
            GroupRef::Auto(g) => g.close().await,
        }
    }

    pub(crate) fn abort(&self) {
        match self {
            GroupRef::Fixed(g) => g.abort(),
            GroupRef::Auto(g) => g.abort(),
        }
    }
}

impl fmt::Debug for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRef::Fixed(g) => f.debug_tuple("Fixed").field(&g.id()).finish(),
            GroupRef::Auto(g) => f.debug_tuple("Auto").field(&g.id()).finish(),
        }
    }
}

impl From<Group> for GroupRef {
    fn from(g: Group) -> Self {
        GroupRef::Fixed(Arc::new(g))
    }
}

impl From<Arc<Group>> for GroupRef {
    fn from(g: Arc<Group>) -> Self {
        GroupRef::Fixed(g)
    }
}

impl From<AutoGroup> for GroupRef {
    fn from(g: AutoGroup) -> Self {
        GroupRef::Auto(Arc::new(g))
    }
}

impl From<Arc<AutoGroup>> for GroupRef {
    fn from(g: Arc<AutoGroup>) -> Self {
        GroupRef::Auto(g)
    }
}

/// Update parameters carried by a `GroupUpdated` event.
#[derive(Clone)]
pub(crate) enum UpdateRequest {
    Group(Arc<GroupUpdate>),
    Auto(Arc<AutoGroupUpdate>),
}
