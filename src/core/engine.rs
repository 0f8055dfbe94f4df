//! # Engine: owns the bus and the registered groups.
//!
//! The [`Engine`] is the owner-facing runtime. It is built with
//! [`EngineBuilder`](crate::EngineBuilder), listens for `GroupAdded`/`GroupRemoved`
//! on its bus and keeps the list of initialized groups.
//!
//! ## Architecture
//! ```text
//! add_group(g) ──► attach(ctx) ──► emit(GroupAdded) ──► on_group_added
//!                                                         ├─ g.initialize()?  (error → caller)
//!                                                         └─ groups.push(g)
//! remove_group(id) ─┐
//! group expiry ─────┴──► emit(GroupRemoved) ──► on_group_removed
//!                                                ├─ not registered → GroupNotFound
//!                                                └─ groups.remove + g.close()
//! close() ──► remove listeners ─► close every group ─► bus.close()
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relaycast::{
//!     Channel, ChannelId, ChannelKind, Config, DeliveryFailure, Destinations, Directory, Engine,
//!     Group, ItemSpec, Payload, Period, SendableItem, Server, ServerId, Session, Transport,
//! };
//!
//! struct Stdout;
//!
//! #[async_trait::async_trait]
//! impl Transport for Stdout {
//!     async fn send(&self, _: &mut Session, ch: &Channel, p: &Payload) -> Result<(), DeliveryFailure> {
//!         println!("{} <- {:?}", ch.name, p);
//!         Ok(())
//!     }
//! }
//!
//! struct OneChannel;
//!
//! impl Directory for OneChannel {
//!     fn servers(&self) -> Vec<Server> {
//!         vec![Server { id: ServerId(1), name: "home".into() }]
//!     }
//!     fn channels(&self, _: ServerId, _: Option<ChannelKind>) -> Vec<Channel> {
//!         self.channel(ChannelId(10)).into_iter().collect()
//!     }
//!     fn channel(&self, id: ChannelId) -> Option<Channel> {
//!         (id == ChannelId(10)).then(|| Channel {
//!             id, name: "general".into(), kind: ChannelKind::Text, server: ServerId(1),
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(Config::default(), Arc::new(Stdout), Arc::new(OneChannel)).build();
//!
//!     let item = SendableItem::new(ItemSpec::text(
//!         "hello",
//!         Period::fixed(Duration::from_secs(5)),
//!         Destinations::fixed([ChannelId(10)]),
//!     ));
//!     engine.add_group(Group::new(ServerId(1)).with_items(vec![item])).await?;
//!
//!     engine.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::collab::{AuthorContext, Directory, LogSink, Transport};
use crate::core::builder::EngineBuilder;
use crate::core::{Config, shutdown};
use crate::error::{EngineError, RuntimeError};
use crate::events::{EmitHandle, Event, EventBus, EventKind, ListenerId};
use crate::groups::scope::PatternRegistry;
use crate::groups::{GroupId, GroupRef};

/// Everything a group needs from the engine it is attached to.
pub(crate) struct EngineContext {
    pub(crate) bus: EventBus,
    pub(crate) cfg: Config,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) author: AuthorContext,
    pub(crate) patterns: Arc<PatternRegistry>,
}

/// Owner-facing runtime.
pub struct Engine {
    ctx: Arc<EngineContext>,
    groups: RwLock<Vec<GroupRef>>,
    listeners: Mutex<Vec<(EventKind, ListenerId)>>,
    closed: AtomicBool,
}

impl Engine {
    /// Starts building an engine.
    pub fn builder(
        cfg: Config,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
    ) -> EngineBuilder {
        EngineBuilder::new(cfg, transport, directory)
    }

    pub(crate) fn new_internal(ctx: EngineContext) -> Arc<Self> {
        let engine = Arc::new(Self {
            ctx: Arc::new(ctx),
            groups: RwLock::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        engine.listen();
        engine
    }

    fn listen(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let added = self.ctx.bus.add_listener(
            EventKind::GroupAdded,
            move |ev| {
                let engine = weak.upgrade();
                async move {
                    match engine {
                        Some(engine) => engine.on_group_added(&ev),
                        None => Ok(()),
                    }
                }
            },
            None,
        );

        let weak = Arc::downgrade(self);
        let removed = self.ctx.bus.add_listener(
            EventKind::GroupRemoved,
            move |ev| {
                let engine = weak.upgrade();
                async move {
                    match engine {
                        Some(engine) => engine.on_group_removed(&ev).await,
                        None => Ok(()),
                    }
                }
            },
            None,
        );

        self.listeners.lock().extend([
            (EventKind::GroupAdded, added),
            (EventKind::GroupRemoved, removed),
        ]);
    }

    fn on_group_added(&self, ev: &Event) -> Result<(), EngineError> {
        let Some(group) = &ev.group else {
            return Ok(());
        };
        if self.group(group.id()).is_some() {
            tracing::debug!(group = %group.id(), "group already registered");
            return Ok(());
        }
        group.initialize()?;
        self.groups.write().push(group.clone());
        Ok(())
    }

    async fn on_group_removed(&self, ev: &Event) -> Result<(), EngineError> {
        let Some(id) = ev.owner else {
            return Ok(());
        };
        let group = {
            let mut groups = self.groups.write();
            let pos = groups
                .iter()
                .position(|g| g.id() == id)
                .ok_or(EngineError::GroupNotFound(id))?;
            groups.remove(pos)
        };
        tracing::info!(group = %id, "removing group");
        group.close().await;
        Ok(())
    }

    /// Adds and initializes `group`. Await the handle to learn whether it initialized.
    pub fn add_group(&self, group: impl Into<GroupRef>) -> EmitHandle {
        if self.is_closed() {
            return EmitHandle::ready(Err(EngineError::BusClosed));
        }
        let group = group.into();
        group.attach(&self.ctx);
        self.ctx.bus.emit(
            Event::new(EventKind::GroupAdded)
                .with_owner(group.id())
                .with_group(group),
        )
    }

    /// Closes and unregisters a group.
    pub fn remove_group(&self, id: GroupId) -> EmitHandle {
        self.ctx
            .bus
            .emit(Event::new(EventKind::GroupRemoved).with_owner(id))
    }

    /// Looks up a registered group.
    pub fn group(&self, id: GroupId) -> Option<GroupRef> {
        self.groups.read().iter().find(|g| g.id() == id).cloned()
    }

    /// Registered groups in registration order.
    pub fn groups(&self) -> Vec<GroupRef> {
        self.groups.read().clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn config(&self) -> &Config {
        &self.ctx.cfg
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every group, then the bus. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for (kind, id) in listeners {
            self.ctx.bus.remove_listener(kind, id);
        }

        let groups = std::mem::take(&mut *self.groups.write());
        for group in &groups {
            group.close().await;
        }
        self.ctx.bus.close().await;
        tracing::info!(groups = groups.len(), "engine closed");
    }

    /// Waits for a termination signal, then closes.
    pub async fn run_until_shutdown(&self) -> Result<(), RuntimeError> {
        shutdown::wait_for_shutdown_signal().await?;
        tracing::info!("shutdown signal received");
        self.close().await;
        Ok(())
    }
}

impl Drop for Engine {
    /// Stops timers, listeners and the bus worker if [`Engine::close`] was never awaited.
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let groups = std::mem::take(self.groups.get_mut());
        for group in &groups {
            group.abort();
        }
        self.ctx.bus.shutdown();
        tracing::warn!(groups = groups.len(), "engine dropped without close");
    }
}
