//! # Auto group: items delivered into every server matching a name pattern.
//!
//! The set of covered servers is re-evaluated on every send, so servers the account
//! joins or leaves are picked up without reconfiguration.
//!
//! With a [`Discovery`] source the group also grows its own server set: every
//! `join_interval` it pulls one candidate and joins it if the name matches.
//!
//! ## Join loop
//! ```text
//! GroupJoinTick ──► cursor retired? / join_count == limit? / member of ≥ max_servers?
//!                     └─ yes → remove GroupJoinTick listener, stop
//!                   next candidate
//!                     └─ exhausted → retire cursor, stop
//!                   name matches include/exclude?
//!                     └─ no → skip
//!                   already a member? → join_count += 1
//!                   join → wait join_settle → visible? → join_count += 1
//!                                                └─ no → logged, not counted
//!                   schedule next tick after join_interval
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::{Mutex, RwLock};

use crate::collab::{Candidate, Discovery};
use crate::core::EngineContext;
use crate::error::{DiscoveryError, EngineError};
use crate::events::{EmitHandle, Event, EventKind};
use crate::groups::shared::GroupCore;
use crate::groups::group::group_lifetime;
use crate::groups::scope::PatternScope;
use crate::groups::{GroupId, ServerPattern, UpdateRequest};
use crate::items::SendableItem;
use crate::policies::RemoveAfter;

#[derive(Clone)]
struct AutoGroupConfig {
    include: String,
    exclude: Option<String>,
    logging: bool,
    remove_after: Option<RemoveAfter>,
    items: Vec<Arc<SendableItem>>,
    removal_buffer_length: Option<usize>,
}

/// Parameters for [`AutoGroup::update`]. `None` keeps the current value.
#[derive(Clone, Default)]
pub struct AutoGroupUpdate {
    pub include: Option<String>,
    /// `Some(None)` clears the exclude pattern.
    pub exclude: Option<Option<String>>,
    pub logging: Option<bool>,
    /// `Some(None)` clears the removal rule.
    pub remove_after: Option<Option<RemoveAfter>>,
    /// Replaces the item list; defaults to the currently initialized items.
    pub items: Option<Vec<Arc<SendableItem>>>,
    pub removal_buffer_length: Option<usize>,
}

impl AutoGroupUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_include(mut self, include: impl Into<String>) -> Self {
        self.include = Some(include.into());
        self
    }

    pub fn with_exclude(mut self, exclude: Option<String>) -> Self {
        self.exclude = Some(exclude);
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn with_remove_after(mut self, remove_after: RemoveAfter) -> Self {
        self.remove_after = Some(Some(remove_after));
        self
    }

    /// Keeps the group until it is removed explicitly.
    pub fn without_remove_after(mut self) -> Self {
        self.remove_after = Some(None);
        self
    }

    pub fn with_items(mut self, items: Vec<Arc<SendableItem>>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_removal_buffer_length(mut self, len: usize) -> Self {
        self.removal_buffer_length = Some(len);
        self
    }
}

enum Cursor {
    /// Not started yet (or no discovery source).
    Idle,
    Active(BoxStream<'static, Candidate>),
    /// Every candidate was tried.
    Retired,
}

/// Group covering every server whose name matches a pattern.
pub struct AutoGroup {
    id: GroupId,
    config: Mutex<AutoGroupConfig>,
    pattern: RwLock<Option<ServerPattern>>,
    discovery: Option<Arc<dyn Discovery>>,
    cursor: tokio::sync::Mutex<Cursor>,
    join_count: AtomicUsize,
    core: OnceLock<Arc<GroupCore>>,
}

impl AutoGroup {
    /// Creates a detached auto group. Patterns are compiled when the group is added.
    pub fn new(include: impl Into<String>) -> Self {
        Self {
            id: GroupId::next(),
            config: Mutex::new(AutoGroupConfig {
                include: include.into(),
                exclude: None,
                logging: false,
                remove_after: None,
                items: Vec::new(),
                removal_buffer_length: None,
            }),
            pattern: RwLock::new(None),
            discovery: None,
            cursor: tokio::sync::Mutex::new(Cursor::Idle),
            join_count: AtomicUsize::new(0),
            core: OnceLock::new(),
        }
    }

    pub fn with_exclude(self, exclude: impl Into<String>) -> Self {
        self.config.lock().exclude = Some(exclude.into());
        self
    }

    pub fn with_items(self, items: Vec<Arc<SendableItem>>) -> Self {
        self.config.lock().items = items;
        self
    }

    pub fn with_logging(self, logging: bool) -> Self {
        self.config.lock().logging = logging;
        self
    }

    /// Removes the whole group automatically (time-based rules only).
    pub fn with_remove_after(self, remove_after: RemoveAfter) -> Self {
        self.config.lock().remove_after = Some(remove_after);
        self
    }

    /// Overrides [`Config::removal_buffer_length`](crate::Config::removal_buffer_length).
    pub fn with_removal_buffer_length(self, len: usize) -> Self {
        self.config.lock().removal_buffer_length = Some(len);
        self
    }

    /// Joins new servers from `discovery`.
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Compiled pattern, once the group started.
    pub fn pattern(&self) -> Option<ServerPattern> {
        self.pattern.read().clone()
    }

    pub fn logging(&self) -> bool {
        self.config.lock().logging
    }

    /// Servers joined (or found already joined) through discovery.
    pub fn join_count(&self) -> usize {
        self.join_count.load(Ordering::Relaxed)
    }

    /// Initialized items, in adoption order.
    pub fn items(&self) -> Vec<Arc<SendableItem>> {
        self.core.get().map(|c| c.items()).unwrap_or_default()
    }

    /// Recently removed items, oldest first.
    pub fn removed_items(&self) -> Vec<Arc<SendableItem>> {
        self.core.get().map(|c| c.removed_items()).unwrap_or_default()
    }

    /// Adds `item`. Await the handle to learn whether it initialized.
    pub fn add_item(&self, item: Arc<SendableItem>) -> EmitHandle {
        let Some(core) = self.core.get() else {
            return EmitHandle::ready(Err(EngineError::Detached));
        };
        if !core.is_open() {
            self.config.lock().items.push(item);
            return EmitHandle::ready(Ok(()));
        }
        core.ctx.bus.emit(
            Event::new(EventKind::ItemAdded)
                .with_owner(self.id)
                .with_item(item),
        )
    }

    /// Removes `item`. Fails with [`EngineError::ItemNotFound`] if the group does not own it.
    pub fn remove_item(&self, item: &Arc<SendableItem>) -> EmitHandle {
        let Some(core) = self.core.get() else {
            return EmitHandle::ready(Err(EngineError::Detached));
        };
        core.ctx.bus.emit(
            Event::new(EventKind::ItemRemoved)
                .with_owner(self.id)
                .with_item(Arc::clone(item)),
        )
    }

    /// Re-initializes with new parameters; on failure the previous ones are restored.
    ///
    /// The discovery cursor and the join count survive updates.
    pub fn update(&self, update: AutoGroupUpdate) -> EmitHandle {
        let Some(core) = self.core.get() else {
            return EmitHandle::ready(Err(EngineError::Detached));
        };
        core.ctx.bus.emit(
            Event::new(EventKind::GroupUpdated)
                .with_owner(self.id)
                .with_update(UpdateRequest::Auto(Arc::new(update))),
        )
    }

    pub(crate) fn attach(&self, ctx: &Arc<EngineContext>) {
        let removal = ctx.cfg.removal_buffer_length;
        self.core
            .get_or_init(|| GroupCore::new(self.id, Arc::clone(ctx), removal));
    }

    fn core(&self) -> Result<&Arc<GroupCore>, EngineError> {
        self.core.get().ok_or(EngineError::Detached)
    }

    pub(crate) fn initialize(self: &Arc<Self>) -> Result<(), EngineError> {
        let core = self.core()?;
        let cfg = self.config.lock().clone();
        self.start(core, cfg)
    }

    fn start(
        self: &Arc<Self>,
        core: &Arc<GroupCore>,
        mut cfg: AutoGroupConfig,
    ) -> Result<(), EngineError> {
        let pattern = ServerPattern::new(&cfg.include, cfg.exclude.as_deref())?;
        let lifetime = group_lifetime(cfg.remove_after)?;
        let ctx = &core.ctx;

        ctx.patterns.register(self.id, pattern.clone());
        core.set_scope(Arc::new(PatternScope::new(
            self.id,
            pattern.clone(),
            Arc::clone(&ctx.directory),
            Arc::clone(&ctx.patterns),
            ctx.cfg.overlap,
        )));
        *self.pattern.write() = Some(pattern);
        core.resize_removed(
            cfg.removal_buffer_length
                .unwrap_or(ctx.cfg.removal_buffer_length),
        );
        core.set_logging(cfg.logging);
        core.open();

        let weak: Weak<Self> = Arc::downgrade(self);
        core.listen(EventKind::GroupUpdated, move |ev| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(group) => group.on_update(&ev).await,
                    None => Ok(()),
                }
            }
        });

        for item in &cfg.items {
            if let Err(e) = core.adopt(item) {
                tracing::warn!(group = %self.id, item = %item.id(), error = %e, "unable to initialize item");
            }
        }
        core.arm_expiry(lifetime);
        self.start_joining(core);

        cfg.remove_after = lifetime.as_request();
        cfg.items.clear();
        *self.config.lock() = cfg;
        tracing::info!(group = %self.id, "auto group started");
        Ok(())
    }

    /// Opens the discovery cursor on first start and schedules the first join tick.
    fn start_joining(self: &Arc<Self>, core: &Arc<GroupCore>) {
        let Some(discovery) = &self.discovery else {
            return;
        };
        // No join step can hold the cursor here: the group's tasks are stopped.
        let Ok(mut cursor) = self.cursor.try_lock() else {
            return;
        };
        if matches!(*cursor, Cursor::Idle) {
            *cursor = Cursor::Active(discovery.candidates());
        }
        if !matches!(*cursor, Cursor::Active(_)) {
            return;
        }
        drop(cursor);

        let weak: Weak<Self> = Arc::downgrade(self);
        core.listen(EventKind::GroupJoinTick, move |_ev| {
            if let Some(group) = weak.upgrade() {
                if let Some(core) = group.core.get() {
                    let core = Arc::clone(core);
                    core.spawn(async move { group.join_step().await });
                }
            }
            futures::future::ready(Ok(()))
        });
        core.arm_join(core.ctx.cfg.join_interval);
    }

    /// One iteration of the join loop.
    async fn join_step(self: Arc<Self>) {
        let (Some(discovery), Some(core)) = (self.discovery.clone(), self.core.get().cloned())
        else {
            return;
        };
        let _session = core.send_lock.lock().await;
        let mut cursor = self.cursor.lock().await;

        let at_limit = discovery
            .limit()
            .is_some_and(|limit| self.join_count() >= limit);
        let at_cap = core
            .ctx
            .cfg
            .server_limit()
            .is_some_and(|cap| core.ctx.directory.servers().len() >= cap);

        let stream = match &mut *cursor {
            Cursor::Active(stream) if !at_limit && !at_cap => stream,
            _ => {
                tracing::info!(group = %self.id, joined = self.join_count(), "auto-join finished");
                core.unlisten(EventKind::GroupJoinTick);
                return;
            }
        };

        let next = stream.next().await;
        let Some(candidate) = next else {
            tracing::info!(group = %self.id, "iterated through all candidates, stopping auto-join");
            *cursor = Cursor::Retired;
            core.unlisten(EventKind::GroupJoinTick);
            discovery.close().await;
            return;
        };
        drop(cursor);

        self.try_join(&core, discovery.as_ref(), &candidate).await;
        core.arm_join(core.ctx.cfg.join_interval);
    }

    async fn try_join(&self, core: &GroupCore, discovery: &dyn Discovery, candidate: &Candidate) {
        let matches = self
            .pattern()
            .is_some_and(|p| p.matches(&candidate.name));
        if !matches {
            tracing::debug!(group = %self.id, candidate = %candidate.name, "candidate does not match, skipping");
            return;
        }

        let directory = &core.ctx.directory;
        if directory.server(candidate.id).is_some() {
            self.join_count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let result = match discovery.join(candidate).await {
            Ok(()) => {
                tokio::time::sleep(core.ctx.cfg.join_settle).await;
                if directory.server(candidate.id).is_some() {
                    Ok(())
                } else {
                    Err(DiscoveryError::NotVisible(candidate.id))
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                let joined = self.join_count.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(group = %self.id, server = %candidate.name, joined, "joined server");
            }
            Err(e) => {
                tracing::error!(group = %self.id, server = %candidate.name, error = %e, "joining server failed");
            }
        }
    }

    async fn on_update(self: &Arc<Self>, ev: &Event) -> Result<(), EngineError> {
        let Some(UpdateRequest::Auto(update)) = &ev.update else {
            return Ok(());
        };
        let core = Arc::clone(self.core()?);

        let items = core.close().await;
        let mut previous = self.config.lock().clone();
        previous.items = items.clone();

        let merged = AutoGroupConfig {
            include: update
                .include
                .clone()
                .unwrap_or_else(|| previous.include.clone()),
            exclude: update
                .exclude
                .clone()
                .unwrap_or_else(|| previous.exclude.clone()),
            logging: update.logging.unwrap_or(previous.logging),
            remove_after: update.remove_after.unwrap_or(previous.remove_after),
            items: update.items.clone().unwrap_or(items),
            removal_buffer_length: update
                .removal_buffer_length
                .or(previous.removal_buffer_length),
        };

        match self.start(&core, merged) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(group = %self.id, error = %e, "update failed, restoring previous configuration");
                if let Err(restore) = self.start(&core, previous) {
                    tracing::error!(group = %self.id, error = %restore, "restoring previous configuration failed");
                }
                Err(EngineError::reconfiguration(e))
            }
        }
    }

    pub(crate) async fn close(&self) {
        let Some(core) = self.core.get() else {
            return;
        };
        let items = core.close().await;
        self.config.lock().items = items;
        core.ctx.patterns.unregister(self.id);
        if let Some(discovery) = &self.discovery {
            discovery.close().await;
        }
    }

    /// Stops the group without waiting. Discovery is left to its own drop.
    pub(crate) fn abort(&self) {
        if let Some(core) = self.core.get() {
            core.abort();
            core.ctx.patterns.unregister(self.id);
        }
    }
}
