//! # Sendable item: the per-item send-timing state machine.
//!
//! A [`SendableItem`] owns its timer and its resolved destinations. Its owning group
//! drives it through the phases below; the item never talks to the transport on its own.
//!
//! ## Architecture
//! ```text
//! Uninitialized ──initialize──► Ready ──timer──► ItemReady ──group──► Sending
//!                                 ▲                                     │
//!                                 └──────────── rearm(period.sample) ◄──┤
//!                                                                       │ check_state()
//!                                 Closed ◄──────── ItemRemoved ◄────────┘
//! ```
//!
//! ## Rules
//! - Every arm bumps a tick counter; an `ItemReady` carrying an older tick is stale.
//! - `check_state()` is true iff the fixed destination list is empty, the counted
//!   lifetime reached zero, or the deadline passed.
//! - Only permanent delivery failures shrink the destination list.
//! - `update()` holds the owner's send lock, so it never overlaps a send.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::collab::{Channel, ChannelId, Directory, Session, Transport};
use crate::error::{EngineError, ValidationError};
use crate::events::{Event, EventBus, EventKind, TimerHandle};
use crate::groups::GroupId;
use crate::groups::scope::Scope;
use crate::items::report::{ChannelRecord, DeliveryReport, FailedRecord};
use crate::items::{DestinationRef, Destinations, ItemSpec, ItemUpdate};
use crate::policies::Lifetime;

static ITEM_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub(crate) fn next() -> Self {
        ItemId(ITEM_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    /// Created, not yet adopted by a group.
    Uninitialized,
    /// Timer armed.
    Ready,
    /// Delivery in progress.
    Sending,
    /// Timer cancelled; removed from its group.
    Closed,
}

/// What an item needs from its owning group.
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) bus: EventBus,
    pub(crate) owner: GroupId,
    pub(crate) send_lock: Arc<tokio::sync::Mutex<Session>>,
    pub(crate) scope: Arc<dyn Scope>,
    pub(crate) directory: Arc<dyn Directory>,
}

struct Inner {
    spec: ItemSpec,
    phase: ItemPhase,
    owner: Option<GroupId>,
    channels: Vec<Channel>,
    pruned: HashSet<ChannelId>,
    lifetime: Lifetime,
    timer: Option<TimerHandle>,
    tick: u64,
    binding: Option<Binding>,
}

impl Inner {
    fn is_fixed(&self) -> bool {
        matches!(self.spec.destinations(), Destinations::Fixed(_))
    }

    fn exhausted(&self) -> bool {
        (self.is_fixed() && self.channels.is_empty())
            || self.lifetime.expired(SystemTime::now())
    }

    /// Current configuration with pruning and remaining lifetime folded in.
    fn folded(&self) -> ItemSpec {
        let mut spec = self.spec.clone();
        if self.is_fixed() {
            spec.set_destinations(Destinations::Fixed(
                self.channels
                    .iter()
                    .cloned()
                    .map(DestinationRef::Resolved)
                    .collect(),
            ));
        }
        spec.set_remove_after(self.lifetime.as_request());
        spec.set_start_in(spec.period().sample());
        spec
    }

    fn initialized(&self) -> bool {
        matches!(self.phase, ItemPhase::Ready | ItemPhase::Sending)
    }
}

/// Periodically delivered content item.
///
/// Create it with [`SendableItem::new`], then hand it to a group with
/// [`Group::add_item`](crate::Group::add_item) or
/// [`AutoGroup::add_item`](crate::AutoGroup::add_item).
pub struct SendableItem {
    id: ItemId,
    inner: Mutex<Inner>,
}

impl SendableItem {
    /// Creates an uninitialized item.
    pub fn new(spec: ItemSpec) -> Arc<Self> {
        Arc::new(Self {
            id: ItemId::next(),
            inner: Mutex::new(Inner {
                spec,
                phase: ItemPhase::Uninitialized,
                owner: None,
                channels: Vec::new(),
                pruned: HashSet::new(),
                lifetime: Lifetime::Unlimited,
                timer: None,
                tick: 0,
                binding: None,
            }),
        })
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn phase(&self) -> ItemPhase {
        self.inner.lock().phase
    }

    /// Group that adopted this item, if any.
    pub fn owner(&self) -> Option<GroupId> {
        self.inner.lock().owner
    }

    /// Current configuration, including destinations pruned so far and the remaining lifetime.
    pub fn spec(&self) -> ItemSpec {
        let inner = self.inner.lock();
        if inner.initialized() {
            inner.folded()
        } else {
            inner.spec.clone()
        }
    }

    /// Resolved fixed destinations (empty for pattern destinations).
    pub fn destinations(&self) -> Vec<Channel> {
        self.inner.lock().channels.clone()
    }

    /// Channels permanently excluded from pattern destinations.
    pub fn pruned(&self) -> Vec<ChannelId> {
        let mut out: Vec<_> = self.inner.lock().pruned.iter().copied().collect();
        out.sort_unstable();
        out
    }

    pub fn remaining(&self) -> Lifetime {
        self.inner.lock().lifetime
    }

    /// True if the item should be removed from its group.
    pub fn check_state(&self) -> bool {
        self.inner.lock().exhausted()
    }

    /// Initializes against `binding` and arms the first send after `start_in`.
    pub(crate) fn initialize(self: &Arc<Self>, binding: Binding) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if let Some(owner) = inner.owner {
            if owner != binding.owner {
                return Err(ValidationError::AlreadyOwned { item: self.id }.into());
            }
        }
        let spec = inner.spec.clone();
        self.apply(&mut inner, spec, binding)
    }

    /// Validates `spec`, and on success makes it current and arms the timer.
    ///
    /// Leaves `inner` untouched on failure.
    fn apply(
        self: &Arc<Self>,
        inner: &mut Inner,
        spec: ItemSpec,
        binding: Binding,
    ) -> Result<(), EngineError> {
        let channels = self.resolve(&spec, &binding)?;
        let now = SystemTime::now();

        inner.lifetime = Lifetime::from_request(spec.remove_after(), now);
        inner.channels = channels;
        inner.owner = Some(binding.owner);
        inner.binding = Some(binding);
        inner.phase = ItemPhase::Ready;
        let start_in = spec.start_in();
        inner.spec = spec;
        self.arm(inner, start_in);
        Ok(())
    }

    /// Resolves and validates fixed destinations.
    fn resolve(&self, spec: &ItemSpec, binding: &Binding) -> Result<Vec<Channel>, ValidationError> {
        spec.period().validate()?;

        let refs = match spec.destinations() {
            Destinations::Matching(_) => return Ok(Vec::new()),
            Destinations::Fixed(refs) => refs,
        };

        let mut out: Vec<Channel> = Vec::with_capacity(refs.len());
        for r in refs {
            let channel = match r {
                DestinationRef::Resolved(ch) => ch.clone(),
                DestinationRef::Unresolved(id) => match binding.directory.channel(*id) {
                    Some(ch) => ch,
                    None => {
                        tracing::warn!(item = %self.id, channel = %id, "channel not found, dropping destination");
                        continue;
                    }
                },
            };

            if channel.kind != spec.kind() {
                return Err(ValidationError::WrongChannelKind {
                    channel: channel.id,
                    expected: spec.kind(),
                    found: channel.kind,
                });
            }
            if !binding.scope.contains(channel.server) {
                return Err(ValidationError::ForeignChannel {
                    channel: channel.id,
                    server: channel.server,
                });
            }
            if !out.iter().any(|c| c.id == channel.id) {
                out.push(channel);
            }
        }

        if out.is_empty() {
            return Err(ValidationError::NoDestinations { item: self.id });
        }
        Ok(out)
    }

    /// Arms the timer; any previous timer and tick become stale.
    fn arm(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        inner.tick += 1;
        if let Some(old) = inner.timer.take() {
            old.cancel();
        }
        let Some(binding) = &inner.binding else {
            return;
        };
        let event = Event::new(EventKind::ItemReady)
            .with_owner(binding.owner)
            .with_item(Arc::clone(self))
            .with_tick(inner.tick);
        inner.timer = Some(binding.bus.call_at(delay, event));
    }

    /// True if `tick` belongs to the currently armed timer.
    pub(crate) fn is_current(&self, tick: u64) -> bool {
        let inner = self.inner.lock();
        inner.phase == ItemPhase::Ready && inner.tick == tick
    }

    /// Moves `Ready → Sending` if `tick` is still current.
    pub(crate) fn begin_send(&self, tick: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase != ItemPhase::Ready || inner.tick != tick {
            return false;
        }
        inner.phase = ItemPhase::Sending;
        true
    }

    /// Delivers to every current destination.
    ///
    /// Returns `None` when the content source had nothing to send. The session is
    /// released after every destination.
    pub(crate) async fn send(
        &self,
        transport: &dyn Transport,
        session: &mut Session,
    ) -> Option<DeliveryReport> {
        let (content, kind, targets) = {
            let inner = self.inner.lock();
            let binding = inner.binding.as_ref()?;
            let kind = inner.spec.kind();
            let targets: Vec<Channel> = match inner.spec.destinations() {
                Destinations::Fixed(_) => inner.channels.clone(),
                Destinations::Matching(pattern) => binding
                    .scope
                    .servers()
                    .iter()
                    .flat_map(|s| binding.directory.channels(s.id, Some(kind)))
                    .filter(|c| pattern.matches(&c.name) && !inner.pruned.contains(&c.id))
                    .collect(),
            };
            (inner.spec.content().clone(), kind, targets)
        };

        let Some(payload) = content.produce() else {
            tracing::debug!(item = %self.id, "content not ready, skipping cycle");
            return None;
        };
        if payload.kind() != kind {
            tracing::warn!(item = %self.id, expected = %kind, found = %payload.kind(), "payload does not fit channel kind, skipping cycle");
            return None;
        }

        let mut report = DeliveryReport {
            item: self.id,
            kind,
            payload,
            successful: Vec::new(),
            failed: Vec::new(),
        };
        for channel in &targets {
            match transport.send(session, channel, &report.payload).await {
                Ok(()) => report.successful.push(ChannelRecord::from(channel)),
                Err(reason) => {
                    tracing::debug!(item = %self.id, channel = %channel.id, reason = reason.as_label(), "delivery failed");
                    report.failed.push(FailedRecord {
                        channel: ChannelRecord::from(channel),
                        reason,
                    });
                }
            }
            transport.release(session).await;
        }

        let mut inner = self.inner.lock();
        let fixed = inner.is_fixed();
        for failed in report.failed.iter().filter(|f| f.reason.is_permanent()) {
            tracing::warn!(item = %self.id, channel = %failed.channel.id, reason = %failed.reason, "removing destination");
            if fixed {
                inner.channels.retain(|c| c.id != failed.channel.id);
            } else {
                inner.pruned.insert(failed.channel.id);
            }
        }
        inner.lifetime.record_send();
        Some(report)
    }

    /// Ends a send. Returns `true` if the item is exhausted and must be removed;
    /// otherwise re-arms with a fresh period sample.
    pub(crate) fn finish_send(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase != ItemPhase::Sending {
            return false;
        }
        if inner.exhausted() {
            return true;
        }
        inner.phase = ItemPhase::Ready;
        let delay = inner.spec.period().sample();
        self.arm(&mut inner, delay);
        false
    }

    /// Cancels the timer and detaches from the group.
    ///
    /// Pruned destinations and the remaining lifetime are kept, so re-initializing
    /// continues where the item left off.
    pub(crate) async fn close(&self) {
        if let Some(timer) = self.detach() {
            timer.close().await;
        }
    }

    /// Same as [`close`](Self::close) without waiting for the timer task.
    pub(crate) fn abort(&self) {
        if let Some(timer) = self.detach() {
            timer.cancel();
        }
    }

    fn detach(&self) -> Option<TimerHandle> {
        let mut inner = self.inner.lock();
        if inner.initialized() {
            inner.spec = inner.folded();
        }
        inner.phase = ItemPhase::Closed;
        inner.tick += 1;
        inner.binding = None;
        inner.timer.take()
    }

    /// Changes parameters of a live item.
    ///
    /// Waits for the owning group's send lock, so it never overlaps a send. Fields
    /// left `None` keep their current values (including destinations pruned so far
    /// and the remaining lifetime); `start_in` defaults to zero.
    ///
    /// On failure the previous configuration is restored (armed with a fresh period
    /// sample) and [`EngineError::Reconfiguration`] is returned.
    pub async fn update(self: &Arc<Self>, update: ItemUpdate) -> Result<(), EngineError> {
        let binding = self
            .inner
            .lock()
            .binding
            .clone()
            .ok_or(EngineError::Detached)?;
        let _session = binding.send_lock.lock().await;

        let timer = {
            let mut inner = self.inner.lock();
            if inner.binding.is_none() {
                return Err(EngineError::Detached);
            }
            inner.tick += 1;
            inner.timer.take()
        };
        if let Some(timer) = timer {
            timer.close().await;
        }

        let mut inner = self.inner.lock();
        let Some(binding) = inner.binding.clone() else {
            return Err(EngineError::Detached);
        };
        let previous = inner.folded();
        let merged = previous.merged(update);

        match self.apply(&mut inner, merged, binding.clone()) {
            Ok(()) => {
                tracing::debug!(item = %self.id, "item updated");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(item = %self.id, error = %e, "update failed, restoring previous configuration");
                if let Err(restore) = self.apply(&mut inner, previous, binding) {
                    tracing::error!(item = %self.id, error = %restore, "restoring previous configuration failed");
                    inner.phase = ItemPhase::Uninitialized;
                }
                Err(EngineError::reconfiguration(e))
            }
        }
    }
}

impl fmt::Debug for SendableItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SendableItem")
            .field("id", &self.id)
            .field("phase", &inner.phase)
            .field("kind", &inner.spec.kind())
            .field("destinations", &inner.channels.len())
            .finish_non_exhaustive()
    }
}
