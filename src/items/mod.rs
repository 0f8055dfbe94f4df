//! Sendable items.
//!
//! This module groups what describes **what** is delivered, **where** it goes,
//! and the state machine that decides **when**.
//!
//! ## Contents
//! - [`ItemSpec`] / [`ItemUpdate`] configuration and live changes
//! - [`ContentSource`], [`Payload`], [`Audio`] what gets delivered
//! - [`Destinations`], [`DestinationRef`], [`ChannelPattern`] where it goes
//! - [`SendableItem`] per-item timer and destination bookkeeping
//! - [`DeliveryReport`] outcome of one send, handed to the log sink
//!
//! ## Quick wiring
//! ```text
//! ItemSpec ──► SendableItem::new ──► Group::add_item ──► initialize(binding) ──► timer armed
//!                                                                                  │
//!                     owning group ◄── ItemReady ◄─────────────────────────────────┘
//!                         └─► send(transport, session) ──► DeliveryReport ──► LogSink
//! ```

mod content;
mod destination;
mod item;
pub(crate) mod report;
mod spec;

pub use content::{Audio, ContentSource, DEFAULT_VOLUME, Payload, Producer};
pub use destination::{ChannelPattern, DestinationRef, Destinations};
pub(crate) use item::Binding;
pub use item::{ItemId, ItemPhase, SendableItem};
pub use report::{ChannelRecord, DeliveryReport, FailedRecord};
pub use spec::{ItemSpec, ItemUpdate};
