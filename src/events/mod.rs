//! Bus events: types, dispatcher and timers.
//!
//! This module groups the event **data model**, the **bus** every component
//! coordinates through, and the **timer** primitive used to schedule future emits.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payloads
//! - [`EventBus`] listener registry plus single dispatch worker
//! - [`TimerHandle`] cancellable one-shot timer
//!
//! ## Quick reference
//! - **Emitters**: `Engine` (group add/remove), `Group`/`AutoGroup` (item add/remove,
//!   update, removal of exhausted items), timers (item ready, join tick, group expiry).
//! - **Listeners**: `Engine` (GroupAdded/GroupRemoved), every initialized group
//!   (ItemReady/ItemAdded/ItemRemoved/GroupUpdated, plus GroupJoinTick for auto groups).

mod bus;
mod event;
pub(crate) mod timer;

pub use bus::{Callback, EmitHandle, EventBus, ListenerId, ListenerResult, Predicate};
pub use event::{Event, EventKind};
pub use timer::TimerHandle;
