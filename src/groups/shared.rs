//! # Shared group runtime.
//!
//! [`GroupCore`] is the part of [`Group`](crate::Group) and
//! [`AutoGroup`](crate::AutoGroup) that does not depend on how servers are chosen.
//! It owns the items, the send lock, the tracked delivery tasks and the listeners
//! the group registered on the bus.
//!
//! ## Architecture
//! ```text
//! Bus ──► listeners (predicate: ev.owner == group id)
//!          ├─► ItemAdded   → adopt(item)      initialize + push, undo removed-buffer entry
//!          ├─► ItemRemoved → drop_item(item)  pop + push to removed buffer + close
//!          └─► ItemReady   → tick current? → tracker.spawn(advertise)
//!                                              ├─ lock send_lock (or exit on cancel)
//!                                              ├─ check_state? → emit ItemRemoved
//!                                              ├─ item.send(transport, session)
//!                                              ├─ log report per covered server
//!                                              └─ exhausted? → emit ItemRemoved, else rearm
//! ```
//!
//! ## Rules
//! - Items of one group never send concurrently (one send lock per group).
//! - Tracked tasks never await bus handles; they emit and drop.
//! - `close()` order: listeners → timers → tracked tasks → items and session.
//!   Tasks still waiting for the send lock exit; a send already running finishes.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::collab::{ChannelId, ServerContext, Session};
use crate::core::EngineContext;
use crate::error::EngineError;
use crate::events::{Event, EventKind, ListenerId, ListenerResult, Predicate, TimerHandle};
use crate::events::timer::until;
use crate::groups::GroupId;
use crate::groups::removed::RemovedBuffer;
use crate::groups::scope::Scope;
use crate::items::{Binding, DeliveryReport, SendableItem};
use crate::policies::Lifetime;

pub(crate) struct GroupCore {
    id: GroupId,
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) send_lock: Arc<tokio::sync::Mutex<Session>>,
    items: RwLock<Vec<Arc<SendableItem>>>,
    removed: Mutex<RemovedBuffer>,
    listeners: Mutex<Vec<(EventKind, ListenerId)>>,
    tracker: TaskTracker,
    run: Mutex<CancellationToken>,
    scope: RwLock<Option<Arc<dyn Scope>>>,
    logging: AtomicBool,
    expiry_timer: Mutex<Option<TimerHandle>>,
    join_timer: Mutex<Option<TimerHandle>>,
}

impl GroupCore {
    pub(crate) fn new(id: GroupId, ctx: Arc<EngineContext>, removal_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            ctx,
            send_lock: Arc::new(tokio::sync::Mutex::new(Session::new())),
            items: RwLock::new(Vec::new()),
            removed: Mutex::new(RemovedBuffer::new(removal_capacity)),
            listeners: Mutex::new(Vec::new()),
            tracker: TaskTracker::new(),
            run: Mutex::new(CancellationToken::new()),
            scope: RwLock::new(None),
            logging: AtomicBool::new(false),
            expiry_timer: Mutex::new(None),
            join_timer: Mutex::new(None),
        })
    }

    pub(crate) fn set_scope(&self, scope: Arc<dyn Scope>) {
        *self.scope.write() = Some(scope);
    }

    pub(crate) fn set_logging(&self, logging: bool) {
        self.logging.store(logging, Ordering::Relaxed);
    }

    pub(crate) fn resize_removed(&self, capacity: usize) {
        self.removed.lock().resize(capacity);
    }

    pub(crate) fn items(&self) -> Vec<Arc<SendableItem>> {
        self.items.read().clone()
    }

    pub(crate) fn removed_items(&self) -> Vec<Arc<SendableItem>> {
        self.removed.lock().snapshot()
    }

    /// True while the group's listeners are registered.
    pub(crate) fn is_open(&self) -> bool {
        !self.listeners.lock().is_empty()
    }

    /// Registers a listener filtered to events addressed to this group.
    pub(crate) fn listen<F, Fut>(&self, kind: EventKind, callback: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        let owner = self.id;
        let predicate: Predicate = Arc::new(move |ev: &Event| ev.is_for(owner));
        let id = self.ctx.bus.add_listener(kind, callback, Some(predicate));
        self.listeners.lock().push((kind, id));
    }

    /// Removes every listener of `kind` this group registered.
    pub(crate) fn unlisten(&self, kind: EventKind) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|(k, id)| {
            if *k == kind {
                self.ctx.bus.remove_listener(*k, *id);
                false
            } else {
                true
            }
        });
    }

    /// Registers the item listeners shared by every group flavour.
    pub(crate) fn open(self: &Arc<Self>) {
        let me = Arc::clone(self);
        self.listen(EventKind::ItemReady, move |ev| {
            me.on_ready(&ev);
            future::ready(Ok(()))
        });

        let me = Arc::clone(self);
        self.listen(EventKind::ItemAdded, move |ev| {
            let result = match &ev.item {
                Some(item) => me.adopt(item),
                None => Ok(()),
            };
            future::ready(result)
        });

        let me = Arc::clone(self);
        self.listen(EventKind::ItemRemoved, move |ev| {
            let me = Arc::clone(&me);
            async move {
                match &ev.item {
                    Some(item) => me.drop_item(item).await,
                    None => Ok(()),
                }
            }
        });
    }

    fn binding(&self) -> Result<Binding, EngineError> {
        let scope = self.scope.read().clone().ok_or(EngineError::Detached)?;
        Ok(Binding {
            bus: self.ctx.bus.clone(),
            owner: self.id,
            send_lock: Arc::clone(&self.send_lock),
            scope,
            directory: Arc::clone(&self.ctx.directory),
        })
    }

    /// Initializes `item` and takes ownership of it.
    pub(crate) fn adopt(&self, item: &Arc<SendableItem>) -> Result<(), EngineError> {
        if self.items.read().iter().any(|i| i.id() == item.id()) {
            tracing::debug!(group = %self.id, item = %item.id(), "item already in group");
            return Ok(());
        }
        item.initialize(self.binding()?)?;
        self.items.write().push(Arc::clone(item));
        self.removed.lock().take(item.id());
        tracing::debug!(group = %self.id, item = %item.id(), "item added");
        Ok(())
    }

    /// Removes `item`, remembers it in the removed buffer and closes it.
    pub(crate) async fn drop_item(&self, item: &Arc<SendableItem>) -> Result<(), EngineError> {
        let removed = {
            let mut items = self.items.write();
            let pos = items
                .iter()
                .position(|i| i.id() == item.id())
                .ok_or(EngineError::ItemNotFound(item.id()))?;
            items.remove(pos)
        };
        tracing::info!(group = %self.id, item = %removed.id(), "removing item");
        self.removed.lock().push(Arc::clone(&removed));
        removed.close().await;
        Ok(())
    }

    fn on_ready(self: &Arc<Self>, ev: &Event) {
        let (Some(item), Some(tick)) = (ev.item.clone(), ev.tick) else {
            return;
        };
        if !item.is_current(tick) {
            tracing::debug!(group = %self.id, item = %item.id(), tick, "stale timer tick ignored");
            return;
        }
        let token = self.run.lock().clone();
        let lock = Arc::clone(&self.send_lock);
        let me = Arc::clone(self);
        self.tracker.spawn(async move {
            // Waiting for the lock is cancellable; a send that started runs to the end.
            let session = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                session = lock.lock_owned() => session,
            };
            me.advertise(session, item, tick).await;
        });
    }

    /// Spawns `fut` on the tracker; it is dropped as soon as the group closes.
    pub(crate) fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.run.lock().clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    async fn advertise(
        self: Arc<Self>,
        mut session: OwnedMutexGuard<Session>,
        item: Arc<SendableItem>,
        tick: u64,
    ) {
        if !item.begin_send(tick) {
            return;
        }
        if item.check_state() {
            self.emit_removal(item);
            return;
        }

        if let Some(report) = item.send(self.ctx.transport.as_ref(), &mut session).await {
            tracing::debug!(
                group = %self.id,
                item = %item.id(),
                ok = report.successful.len(),
                failed = report.failed.len(),
                "item sent"
            );
            if self.logging.load(Ordering::Relaxed) {
                self.log_report(&report).await;
            }
        }

        if item.finish_send() {
            self.emit_removal(item);
        }
    }

    /// Saves one filtered report per covered server.
    async fn log_report(&self, report: &DeliveryReport) {
        let Some(scope) = self.scope.read().clone() else {
            return;
        };
        for server in scope.servers() {
            let present: HashSet<ChannelId> = self
                .ctx
                .directory
                .channels(server.id, None)
                .iter()
                .map(|c| c.id)
                .collect();
            let Some(filtered) = report.restricted_to(&present) else {
                continue;
            };
            let ctx = ServerContext {
                id: server.id,
                name: server.name,
            };
            if let Err(e) = self.ctx.sink.save(&ctx, &filtered, &self.ctx.author).await {
                tracing::warn!(group = %self.id, server = %ctx.id, error = %e, "saving delivery log failed");
            }
        }
    }

    fn emit_removal(&self, item: Arc<SendableItem>) {
        tracing::debug!(group = %self.id, item = %item.id(), "item exhausted");
        drop(
            self.ctx
                .bus
                .emit(Event::new(EventKind::ItemRemoved).with_owner(self.id).with_item(item)),
        );
    }

    /// Arms the group removal timer for a deadline lifetime.
    pub(crate) fn arm_expiry(&self, lifetime: Lifetime) {
        let timer = lifetime.deadline().map(|at| {
            self.ctx.bus.call_at(
                until(at),
                Event::new(EventKind::GroupRemoved).with_owner(self.id),
            )
        });
        *self.expiry_timer.lock() = timer;
    }

    /// Arms the next auto-join tick.
    pub(crate) fn arm_join(&self, delay: std::time::Duration) {
        let timer = self.ctx.bus.call_at(
            delay,
            Event::new(EventKind::GroupJoinTick).with_owner(self.id),
        );
        *self.join_timer.lock() = Some(timer);
    }

    /// Synchronous teardown for an engine dropped without `close()`.
    ///
    /// Cancels instead of waiting: a send already running still finishes, but its
    /// item is detached and never re-arms.
    pub(crate) fn abort(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for (kind, id) in listeners {
            self.ctx.bus.remove_listener(kind, id);
        }
        for timer in [self.expiry_timer.lock().take(), self.join_timer.lock().take()]
            .into_iter()
            .flatten()
        {
            timer.cancel();
        }
        self.run.lock().cancel();
        self.tracker.close();

        let items = std::mem::take(&mut *self.items.write());
        for item in &items {
            item.abort();
        }
        tracing::debug!(group = %self.id, items = items.len(), "group aborted");
    }

    /// Tears everything down and returns the items that were initialized.
    ///
    /// The group can be started again afterwards.
    pub(crate) async fn close(&self) -> Vec<Arc<SendableItem>> {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for (kind, id) in listeners {
            self.ctx.bus.remove_listener(kind, id);
        }

        let timers = [
            self.expiry_timer.lock().take(),
            self.join_timer.lock().take(),
        ];
        for timer in timers.into_iter().flatten() {
            timer.close().await;
        }

        let token = std::mem::replace(&mut *self.run.lock(), CancellationToken::new());
        token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        let mut session = self.send_lock.lock().await;
        let items = std::mem::take(&mut *self.items.write());
        for item in &items {
            item.close().await;
        }
        self.ctx.transport.release(&mut session).await;
        tracing::debug!(group = %self.id, items = items.len(), "group closed");
        items
    }
}
