//! Error types used by the relaycast engine and its collaborators.
//!
//! This module defines the error enums surfaced by the runtime:
//!
//! - [`ValidationError`] — bad configuration detected while initializing an item or group.
//! - [`DeliveryFailure`] — per-destination failure reported by the transport.
//! - [`DiscoveryError`] — failure while joining a discovered server.
//! - [`EngineError`] — errors returned to callers of the public API.
//! - [`RuntimeError`] — errors raised by the owning process loop.
//!
//! Delivery and discovery failures are absorbed into state transitions (pruning, logging)
//! and never escape a group. Validation and reconfiguration failures reach the caller.

use std::time::Duration;

use thiserror::Error;

use crate::collab::{ChannelId, ChannelKind, ServerId};
use crate::items::ItemId;

/// # Configuration rejected during `initialize` or `update`.
///
/// Fatal to the triggering operation only; the object stays usable.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Destination exists but is not of the kind the item delivers to.
    #[error("channel {channel} is a {found} channel, expected {expected}")]
    WrongChannelKind {
        channel: ChannelId,
        expected: ChannelKind,
        found: ChannelKind,
    },

    /// Destination belongs to a server the owning group does not cover.
    #[error("channel {channel} belongs to server {server}, which is outside the owning group")]
    ForeignChannel { channel: ChannelId, server: ServerId },

    /// No destination could be resolved.
    #[error("no valid destinations were given to item {item}")]
    NoDestinations { item: ItemId },

    /// Fixed group points at a server the account cannot see.
    #[error("server {0} is not visible in the directory")]
    UnknownServer(ServerId),

    /// Include/exclude pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Randomized period with `start >= end`.
    #[error("invalid period: start {start:?} must be below end {end:?}")]
    InvalidPeriod { start: Duration, end: Duration },

    /// Item is already owned by another group.
    #[error("item {item} is already owned by another group")]
    AlreadyOwned { item: ItemId },

    /// Groups expire by time only; a send count makes no sense for them.
    #[error("groups cannot be removed after a number of sends")]
    CountedGroupLifetime,
}

/// # Per-destination delivery failure, classified by the transport.
///
/// Permanent failures (`PermissionDenied`, `NotFound`) remove the destination from the
/// item for good. Everything else is retried on the next cycle.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The account lacks permission to deliver into the destination.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The destination no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else (rate limits, timeouts, connection resets).
    #[error("delivery failed: {0}")]
    Other(String),
}

impl DeliveryFailure {
    /// Indicates whether the destination should be pruned.
    ///
    /// # Example
    /// ```
    /// use relaycast::DeliveryFailure;
    ///
    /// assert!(DeliveryFailure::NotFound("gone".into()).is_permanent());
    /// assert!(!DeliveryFailure::Other("slow".into()).is_permanent());
    /// ```
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DeliveryFailure::PermissionDenied(_) | DeliveryFailure::NotFound(_)
        )
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryFailure::PermissionDenied(_) => "delivery_permission_denied",
            DeliveryFailure::NotFound(_) => "delivery_not_found",
            DeliveryFailure::Other(_) => "delivery_failed",
        }
    }
}

/// # Failure while joining a discovered server.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The join link could not be obtained from the listing.
    #[error("fetching the join link failed")]
    LinkUnavailable,

    /// The automation reported an error.
    #[error("join failed: {0}")]
    JoinFailed(String),

    /// The automation reported success but the directory never saw the server.
    #[error("no error during join, but server {0} is not visible")]
    NotVisible(ServerId),
}

/// # Errors returned to callers of the public API.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Update failed and the previous configuration was restored.
    #[error("update failed, previous configuration restored: {source}")]
    Reconfiguration {
        #[source]
        source: Box<EngineError>,
    },

    /// Item is not owned by the group it was removed from.
    #[error("item {0} is not owned by this group")]
    ItemNotFound(ItemId),

    /// No group with this id is registered.
    #[error("group {0} is not registered")]
    GroupNotFound(crate::groups::GroupId),

    /// Object has not been added to an engine yet.
    #[error("object is not attached to an engine")]
    Detached,

    /// The event bus was closed before dispatch completed.
    #[error("event bus closed")]
    BusClosed,

    /// A listener panicked during dispatch.
    #[error("listener panicked: {0}")]
    ListenerPanicked(String),
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use relaycast::EngineError;
    ///
    /// assert_eq!(EngineError::BusClosed.as_label(), "bus_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_failed",
            EngineError::Reconfiguration { .. } => "reconfiguration_failed",
            EngineError::ItemNotFound(_) => "item_not_found",
            EngineError::GroupNotFound(_) => "group_not_found",
            EngineError::Detached => "detached",
            EngineError::BusClosed => "bus_closed",
            EngineError::ListenerPanicked(_) => "listener_panicked",
        }
    }

    /// Wraps an error raised while re-initializing with new parameters.
    pub(crate) fn reconfiguration(source: EngineError) -> Self {
        EngineError::Reconfiguration {
            source: Box::new(source),
        }
    }

    /// Returns the validation error behind this one, looking through reconfiguration.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            EngineError::Validation(v) => Some(v),
            EngineError::Reconfiguration { source } => source.validation(),
            _ => None,
        }
    }
}

/// # Errors produced by the owning process loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// OS signal handlers could not be installed.
    #[error("failed to install shutdown signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}
