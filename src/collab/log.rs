//! # Log sink and the built-in tracing writer.
//!
//! After each send, a group with logging enabled hands one [`DeliveryReport`] per
//! matching server to its [`LogSink`]. Saving is fire-and-forget: a failing sink is
//! reported through `tracing` and never retried.
//!
//! [`TracingSink`] is a minimal sink that writes reports as `tracing` events.
//! Use it for demos or when no audit store is wired up.
//!
//! ## Example output
//! ```text
//! INFO relaycast: delivery server="alpha" server_id=1 item=3 kind=text ok=2 failed=0
//! WARN relaycast: delivery failed server="alpha" item=3 channel=12 reason="permission denied: 403"
//! ```

use async_trait::async_trait;

use crate::collab::ServerId;
use crate::items::DeliveryReport;

/// Error type returned by sinks.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Identifies the server a report was filtered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerContext {
    pub id: ServerId,
    pub name: String,
}

/// Identifies the account that performed the delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorContext {
    pub name: String,
    pub id: u64,
}

/// Persists delivery reports.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    /// Saves one report for one server.
    async fn save(
        &self,
        server: &ServerContext,
        report: &DeliveryReport,
        author: &AuthorContext,
    ) -> Result<(), SinkError>;
}

/// Sink that writes reports through `tracing`.
#[derive(Default)]
pub struct TracingSink;

impl TracingSink {
    /// Construct a new [`TracingSink`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogSink for TracingSink {
    async fn save(
        &self,
        server: &ServerContext,
        report: &DeliveryReport,
        author: &AuthorContext,
    ) -> Result<(), SinkError> {
        tracing::info!(
            server = %server.name,
            server_id = %server.id,
            author = %author.name,
            item = %report.item,
            kind = %report.kind,
            ok = report.successful.len(),
            failed = report.failed.len(),
            "delivery"
        );
        for failed in &report.failed {
            tracing::warn!(
                server = %server.name,
                item = %report.item,
                channel = %failed.channel.id,
                reason = %failed.reason,
                "delivery failed"
            );
        }
        Ok(())
    }
}
