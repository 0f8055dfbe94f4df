//! # Discovery: finding and joining new servers.
//!
//! Used by [`AutoGroup`](crate::AutoGroup) when a discovery source is configured.
//! The source produces candidates lazily; the auto group pulls one per join tick.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::collab::ServerId;
use crate::error::DiscoveryError;

/// A server offered by a discovery source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub id: ServerId,
    pub join_url: String,
}

/// Source of candidate servers plus the automation that joins them.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// Starts a fresh cursor over candidate servers.
    fn candidates(&self) -> BoxStream<'static, Candidate>;

    /// Joins `candidate`. Jitter and browser timeouts are handled here.
    async fn join(&self, candidate: &Candidate) -> Result<(), DiscoveryError>;

    /// Maximum number of servers to join from this source (`None` = unlimited).
    fn limit(&self) -> Option<usize> {
        None
    }

    /// Releases automation resources.
    async fn close(&self) {}
}
