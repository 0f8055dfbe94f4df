//! # relaycast
//!
//! **Relaycast** schedules periodic broadcasts of messages into chat channels.
//!
//! Items (text or audio payloads with a period and a destination list) are owned
//! by groups. A group is bound either to one server ([`Group`]) or to every
//! server whose name matches a pattern ([`AutoGroup`]). All coordination goes
//! through a single [`EventBus`]; the [`Engine`] registers groups on it and
//! tears them down on shutdown.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ SendableItem │   │ SendableItem │   │ SendableItem │
//!     │ (timer #1)   │   │ (timer #2)   │   │ (timer #3)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ ItemReady        │ ItemReady        │ ItemReady
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus (single dispatch worker, listeners in registration order)│
//! └──────┬──────────────────────────────┬─────────────────────┬───────┘
//!        ▼                              ▼                     ▼
//!  ┌────────────┐                ┌──────────────┐       ┌────────────┐
//!  │   Group    │                │  AutoGroup   │       │   Engine   │
//!  │ one server │                │ name pattern │       │ GroupAdded │
//!  └─────┬──────┘                │ + join loop  │       │GroupRemoved│
//!        │                       └──────┬───────┘       └────────────┘
//!        │ send lock (one send per group at a time)
//!        ▼                              ▼
//!   Transport::send ──► DeliveryReport ──► LogSink::save (per server)
//! ```
//!
//! ### Item lifecycle
//! ```text
//! Uninitialized ──initialize──► Ready ──timer──► Sending ──finish──► Ready
//!       ▲                         │                                   │
//!       └──────────close──────────┴──────── lifetime exhausted ───────┴──► ItemRemoved
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                       |
//! |-------------------|----------------------------------------------------------|------------------------------------------|
//! | **Items**         | Content, period, destinations, removal rules.            | [`SendableItem`], [`ItemSpec`]           |
//! | **Groups**        | Ownership, serialized delivery, live reconfiguration.    | [`Group`], [`AutoGroup`]                 |
//! | **Events**        | Ordered, re-entrant bus with filtered listeners.         | [`EventBus`], [`Event`], [`EventKind`]   |
//! | **Collaborators** | Chat platform integration points.                        | [`Transport`], [`Directory`], [`LogSink`]|
//! | **Errors**        | Typed validation, delivery and engine errors.            | [`EngineError`], [`ValidationError`]     |
//! | **Configuration** | Global settings and defaults.                            | [`Config`]                               |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relaycast::{
//!     ChannelId, Config, Destinations, Directory, Engine, Group, ItemSpec, Period, RemoveAfter,
//!     SendableItem, ServerId, Transport,
//! };
//!
//! async fn schedule(
//!     transport: Arc<dyn Transport>,
//!     directory: Arc<dyn Directory>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(Config::default(), transport, directory).build();
//!
//!     let item = SendableItem::new(
//!         ItemSpec::text(
//!             "Daily reminder",
//!             Period::new(Some(Duration::from_secs(10)), Duration::from_secs(20))?,
//!             Destinations::fixed([ChannelId(10), ChannelId(11)]),
//!         )
//!         .with_remove_after(RemoveAfter::Sends(5)),
//!     );
//!
//!     let group = Arc::new(Group::new(ServerId(1)).with_logging(true));
//!     engine.add_group(group.clone()).await?;
//!     group.add_item(item).await?;
//!
//!     engine.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```
mod collab;
mod core;
mod error;
mod events;
mod groups;
mod items;
mod policies;

// ---- Public re-exports ----

pub use collab::{
    AuthorContext, Candidate, Channel, ChannelId, ChannelKind, Directory, Discovery, LogSink,
    Server, ServerContext, ServerId, Session, SinkError, TracingSink, Transport,
};
pub use core::{Config, Engine, EngineBuilder, OverlapPolicy};
pub use error::{DeliveryFailure, DiscoveryError, EngineError, RuntimeError, ValidationError};
pub use events::{
    Callback, EmitHandle, Event, EventBus, EventKind, ListenerId, ListenerResult, Predicate,
    TimerHandle,
};
pub use groups::{AutoGroup, AutoGroupUpdate, Group, GroupId, GroupRef, GroupUpdate, ServerPattern};
pub use items::{
    Audio, ChannelPattern, ChannelRecord, ContentSource, DEFAULT_VOLUME, DeliveryReport,
    DestinationRef, Destinations, FailedRecord, ItemId, ItemPhase, ItemSpec, ItemUpdate, Payload,
    Producer, SendableItem,
};
pub use policies::{Lifetime, Period, RemoveAfter};
