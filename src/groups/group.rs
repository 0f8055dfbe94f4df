//! # Fixed group: items delivered into one known server.

use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::collab::ServerId;
use crate::core::EngineContext;
use crate::error::{EngineError, ValidationError};
use crate::events::{EmitHandle, Event, EventKind};
use crate::groups::shared::GroupCore;
use crate::groups::scope::FixedScope;
use crate::groups::{GroupId, UpdateRequest};
use crate::items::SendableItem;
use crate::policies::{Lifetime, RemoveAfter};

/// Converts a group removal request; groups only expire by time.
pub(crate) fn group_lifetime(req: Option<RemoveAfter>) -> Result<Lifetime, ValidationError> {
    match req {
        Some(RemoveAfter::Sends(_)) => Err(ValidationError::CountedGroupLifetime),
        other => Ok(Lifetime::from_request(other, SystemTime::now())),
    }
}

#[derive(Clone)]
struct GroupConfig {
    server: ServerId,
    logging: bool,
    remove_after: Option<RemoveAfter>,
    items: Vec<Arc<SendableItem>>,
}

/// Parameters for [`Group::update`]. `None` keeps the current value.
#[derive(Clone, Default)]
pub struct GroupUpdate {
    pub server: Option<ServerId>,
    pub logging: Option<bool>,
    /// `Some(None)` clears the removal rule.
    pub remove_after: Option<Option<RemoveAfter>>,
    /// Replaces the item list; defaults to the currently initialized items.
    pub items: Option<Vec<Arc<SendableItem>>>,
}

impl GroupUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server: ServerId) -> Self {
        self.server = Some(server);
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
}

/// Group bound to one server.
///
/// ## Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use relaycast::{ChannelId, Destinations, Group, ItemSpec, Period, SendableItem, ServerId};
///
/// let item = SendableItem::new(ItemSpec::text(
///     "hello",
///     Period::fixed(Duration::from_secs(60)),
///     Destinations::fixed([ChannelId(10)]),
/// ));
/// let group = Arc::new(Group::new(ServerId(1)).with_items(vec![item]).with_logging(true));
/// // engine.add_group(group.clone()).await?;
/// ```
pub struct Group {
    id: GroupId,
    config: Mutex<GroupConfig>,
    core: OnceLock<Arc<GroupCore>>,
}

impl Group {
    /// Creates a detached group for `server`.
    pub fn new(server: ServerId) -> Self {
        Self {
            id: GroupId::next(),
            config: Mutex::new(GroupConfig {
                server,
                logging: false,
                remove_after: None,
                items: Vec::new(),
            }),
            core: OnceLock::new(),
        }
    }

    /// Items initialized when the group is added to an engine.
    pub fn with_items(self, items: Vec<Arc<SendableItem>>) -> Self {
        self.config.lock().items = items;
        self
    }

    /// Enables per-send delivery logging.
    pub fn with_logging(self, logging: bool) -> Self {
        self.config.lock().logging = logging;
        self
    }

    /// Removes the whole group automatically (time-based rules only).
    pub fn with_remove_after(self, remove_after: RemoveAfter) -> Self {
        self.config.lock().remove_after = Some(remove_after);
        self
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn server(&self) -> ServerId {
        self.config.lock().server
    }

    pub fn logging(&self) -> bool {
        self.config.lock().logging
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
    pub fn update(&self, update: GroupUpdate) -> EmitHandle {
        let Some(core) = self.core.get() else {
            return EmitHandle::ready(Err(EngineError::Detached));
        };
        core.ctx.bus.emit(
            Event::new(EventKind::GroupUpdated)
                .with_owner(self.id)
                .with_update(UpdateRequest::Group(Arc::new(update))),
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

    /// Validates `cfg`, then registers listeners and adopts items.
    fn start(self: &Arc<Self>, core: &Arc<GroupCore>, mut cfg: GroupConfig) -> Result<(), EngineError> {
        if core.ctx.directory.server(cfg.server).is_none() {
            return Err(ValidationError::UnknownServer(cfg.server).into());
        }
        let lifetime = group_lifetime(cfg.remove_after)?;

        core.set_scope(Arc::new(FixedScope::new(
            cfg.server,
            Arc::clone(&core.ctx.directory),
        )));
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

        cfg.remove_after = lifetime.as_request();
        cfg.items.clear();
        *self.config.lock() = cfg;
        tracing::info!(group = %self.id, server = %self.server(), "group started");
        Ok(())
    }

    async fn on_update(self: &Arc<Self>, ev: &Event) -> Result<(), EngineError> {
        let Some(UpdateRequest::Group(update)) = &ev.update else {
            return Ok(());
        };
        let core = Arc::clone(self.core()?);

        let items = core.close().await;
        let mut previous = self.config.lock().clone();
        previous.items = items.clone();

        let merged = GroupConfig {
            server: update.server.unwrap_or(previous.server),
            logging: update.logging.unwrap_or(previous.logging),
            remove_after: update.remove_after.unwrap_or(previous.remove_after),
            items: update.items.clone().unwrap_or(items),
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
        if let Some(core) = self.core.get() {
            let items = core.close().await;
            // Keep the items so the group can be added again.
            self.config.lock().items = items;
        }
    }

    pub(crate) fn abort(&self) {
        if let Some(core) = self.core.get() {
            core.abort();
        }
    }
}
