//! # Events dispatched through the bus.
//!
//! The [`EventKind`] enum classifies events across two categories:
//! - **Item events**: timer fired, item added, item removed
//! - **Group events**: group added, updated, removed, join tick
//!
//! The [`Event`] struct carries the owner the event targets plus optional payloads.
//! Listeners filter on `owner` with a predicate, so one bus serves every group.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events of one kind are dispatched in emission order; see [`EventBus`](crate::EventBus).
//!
//! ## Example
//! ```rust
//! use relaycast::{Event, EventKind, GroupId};
//!
//! let ev = Event::new(EventKind::GroupJoinTick).with_owner(GroupId::next());
//! assert_eq!(ev.kind, EventKind::GroupJoinTick);
//! assert!(ev.owner.is_some());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::groups::{GroupId, GroupRef, UpdateRequest};
use crate::items::{ItemId, SendableItem};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of bus events. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Item events ===
    /// An item's timer fired; its owner should deliver it.
    ///
    /// Sets: `owner`, `item`, tick token (private)
    ItemReady,

    /// Request to initialize and adopt an item.
    ///
    /// Sets: `owner`, `item`
    ItemAdded,

    /// Request to drop an item (explicit, or because it exhausted its lifetime).
    ///
    /// Sets: `owner`, `item`
    ItemRemoved,

    // === Group events ===
    /// Request to initialize and register a group with the engine.
    ///
    /// Sets: `owner`, group handle (private)
    GroupAdded,

    /// Request to re-initialize a group with new parameters.
    ///
    /// Sets: `owner`, update parameters (private)
    GroupUpdated,

    /// Request to close and unregister a group.
    ///
    /// Sets: `owner`
    GroupRemoved,

    /// An auto group's join timer fired.
    ///
    /// Sets: `owner`
    GroupJoinTick,
}

/// Bus event with optional payloads.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other fields are set depending on the [`EventKind`]
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Group the event is addressed to.
    pub owner: Option<GroupId>,
    /// Item the event concerns.
    pub item: Option<Arc<SendableItem>>,

    /// Timer arm token (ItemReady only).
    pub(crate) tick: Option<u64>,
    /// Group handle (GroupAdded only).
    pub(crate) group: Option<GroupRef>,
    /// New parameters (GroupUpdated only).
    pub(crate) update: Option<UpdateRequest>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            owner: None,
            item: None,
            tick: None,
            group: None,
            update: None,
        }
    }

    /// Addresses the event to a group.
    #[inline]
    pub fn with_owner(mut self, owner: GroupId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Attaches an item.
    #[inline]
    pub fn with_item(mut self, item: Arc<SendableItem>) -> Self {
        self.item = Some(item);
        self
    }

    /// Id of the attached item, if any.
    #[inline]
    pub fn item_id(&self) -> Option<ItemId> {
        self.item.as_ref().map(|i| i.id())
    }

    /// True if the event is addressed to `owner`.
    #[inline]
    pub fn is_for(&self, owner: GroupId) -> bool {
        self.owner == Some(owner)
    }

    #[inline]
    pub(crate) fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    #[inline]
    pub(crate) fn with_group(mut self, group: GroupRef) -> Self {
        self.group = Some(group);
        self
    }

    #[inline]
    pub(crate) fn with_update(mut self, update: UpdateRequest) -> Self {
        self.update = Some(update);
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("seq", &self.seq)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("item", &self.item_id())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}
