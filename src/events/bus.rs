//! # Event bus: filtered listeners and a single dispatch worker.
//!
//! [`EventBus`] keeps a registry of listeners keyed by [`EventKind`]. Each listener is a
//! `(callback, optional predicate)` pair. Emitting an event queues it; one worker task
//! takes events off the queue and runs every matching listener in registration order.
//!
//! ## Architecture
//! ```text
//! Emitters (many):                      Worker (one):
//!   Group  ──┐
//!   Item   ──┼── emit(Event) ──► [queue] ──► dispatch pass
//!   Timer  ──┤                               ├─ snapshot listeners[kind]
//!   Engine ──┘                               ├─ predicate(&event)? → callback(event).await
//!                                            └─ first Err stops the pass
//!                                                   │
//!                         EmitHandle.await ◄────────┘ (Ok / first Err)
//! ```
//!
//! ## Rules
//! - **One pass at a time**: passes never overlap, so list mutations done by listeners
//!   are serialized.
//! - **Stable snapshot**: listeners added or removed during a pass do not change who
//!   runs in that pass.
//! - **Re-entrancy**: a listener may emit. If it awaits the handle, the nested pass runs
//!   inline (no deadlock); if it drops the handle, the event is queued behind the
//!   current pass.
//! - **Panic isolation**: a panicking listener fails its pass with
//!   [`EngineError::ListenerPanicked`]; the worker keeps going.
//! - **Close**: pending handles resolve to [`EngineError::BusClosed`].

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::event::{Event, EventKind};
use super::timer::{self, TimerHandle};
use crate::error::EngineError;

/// Outcome of one listener call or one dispatch pass.
pub type ListenerResult = Result<(), EngineError>;

/// Listener callback. Receives the shared event and returns a boxed future.
pub type Callback = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ListenerResult> + Send + Sync>;

/// Listener predicate over the emitted event.
pub type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    callback: Callback,
    predicate: Option<Predicate>,
}

struct Dispatch {
    event: Arc<Event>,
    done: Option<oneshot::Sender<ListenerResult>>,
}

tokio::task_local! {
    /// Set while a dispatch pass is running on the current task.
    static IN_DISPATCH: ();
}

fn in_dispatch() -> bool {
    IN_DISPATCH.try_with(|_| ()).is_ok()
}

struct Shared {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
    next_id: AtomicU64,
    tx: mpsc::UnboundedSender<Dispatch>,
    token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Runs one dispatch pass over a snapshot of the listeners for `event.kind`.
    async fn dispatch(&self, event: Arc<Event>) -> ListenerResult {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        for listener in snapshot {
            if let Some(predicate) = &listener.predicate {
                if !predicate(&event) {
                    continue;
                }
            }

            let callback = Arc::clone(&listener.callback);
            let ev = Arc::clone(&event);
            let call = AssertUnwindSafe(async move { callback(ev).await }).catch_unwind();
            match call.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(kind = ?event.kind, seq = event.seq, error = %e, "listener failed");
                    return Err(e);
                }
                Err(panic) => {
                    let info = panic_message(panic.as_ref());
                    tracing::error!(kind = ?event.kind, seq = event.seq, listener = ?listener.id, %info, "listener panicked");
                    return Err(EngineError::ListenerPanicked(info));
                }
            }
        }
        Ok(())
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Process-wide publish/subscribe hub.
///
/// Cheap to clone; all clones share one registry and one worker.
/// Must be created inside a Tokio runtime (the worker is spawned on construction).
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    /// Creates a bus and spawns its dispatch worker.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let shared = Arc::new(Shared {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tx,
            token: token.clone(),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(Self::run(Arc::downgrade(&shared), rx, token));
        *shared.worker.lock() = Some(worker);
        Self { shared }
    }

    /// Dispatch worker: one pass at a time, until closed or every bus handle is gone.
    async fn run(
        shared: Weak<Shared>,
        mut rx: mpsc::UnboundedReceiver<Dispatch>,
        token: CancellationToken,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = rx.recv() => next,
            };
            let Some(Dispatch { event, done }) = next else {
                break;
            };
            let Some(shared) = shared.upgrade() else {
                break;
            };

            let result = IN_DISPATCH.scope((), shared.dispatch(event)).await;
            drop(shared);

            if let Some(done) = done {
                let _ = done.send(result);
            }
        }
        tracing::debug!("event bus worker stopped");
    }

    /// Registers `callback` under `kind`, optionally filtered by `predicate`.
    ///
    /// Listeners of one kind run in registration order.
    pub fn add_listener<F, Fut>(
        &self,
        kind: EventKind,
        callback: F,
        predicate: Option<Predicate>,
    ) -> ListenerId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        let id = ListenerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback = Arc::new(move |ev| Box::pin(callback(ev)));
        self.shared
            .listeners
            .write()
            .entry(kind)
            .or_default()
            .push(Listener {
                id,
                callback,
                predicate,
            });
        id
    }

    /// Removes a listener. Returns `false` (and does nothing) if it was not registered.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        before != list.len()
    }

    /// Number of listeners registered under `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared
            .listeners
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Emits `event`. Await the returned handle to wait for the dispatch pass.
    pub fn emit(&self, event: Event) -> EmitHandle {
        let event = Arc::new(event);
        if in_dispatch() {
            return EmitHandle {
                state: HandleState::Inline {
                    shared: Arc::clone(&self.shared),
                    event: Some(event),
                },
            };
        }
        self.enqueue(event)
    }

    fn enqueue(&self, event: Arc<Event>) -> EmitHandle {
        if self.shared.token.is_cancelled() {
            return EmitHandle::ready(Err(EngineError::BusClosed));
        }
        let (tx, rx) = oneshot::channel();
        let dispatch = Dispatch {
            event,
            done: Some(tx),
        };
        match self.shared.tx.send(dispatch) {
            Ok(()) => EmitHandle {
                state: HandleState::Queued(rx),
            },
            Err(_) => EmitHandle::ready(Err(EngineError::BusClosed)),
        }
    }

    /// Emits `event` after `delay`. Cancelling the handle first means it is never emitted.
    pub fn call_at(&self, delay: Duration, event: Event) -> TimerHandle {
        let bus = self.clone();
        timer::call_at(delay, move || async move {
            let _ = bus.emit(event);
        })
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Cancels the worker and drops every listener without waiting.
    ///
    /// Later emits fail with [`EngineError::BusClosed`].
    pub(crate) fn shutdown(&self) {
        self.shared.token.cancel();
        self.shared.listeners.write().clear();
    }

    /// Stops the worker and drops every listener.
    ///
    /// Pending handles resolve to [`EngineError::BusClosed`].
    pub async fn close(&self) {
        self.shutdown();

        let worker = self.shared.worker.lock().take();
        if let Some(worker) = worker {
            if in_dispatch() {
                // Called from a listener: the worker is this task.
                return;
            }
            let _ = worker.await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

enum HandleState {
    Queued(oneshot::Receiver<ListenerResult>),
    Inline {
        shared: Arc<Shared>,
        event: Option<Arc<Event>>,
    },
    Ready(Option<ListenerResult>),
}

/// Completion handle returned by [`EventBus::emit`].
///
/// `.await` it to learn when the dispatch pass finished and whether a listener failed.
/// Dropping it is fine: the event is still dispatched.
pub struct EmitHandle {
    state: HandleState,
}

impl EmitHandle {
    /// A handle that is already resolved.
    pub(crate) fn ready(result: ListenerResult) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }
}

impl IntoFuture for EmitHandle {
    type Output = ListenerResult;
    type IntoFuture = BoxFuture<'static, ListenerResult>;

    fn into_future(mut self) -> Self::IntoFuture {
        let state = std::mem::replace(&mut self.state, HandleState::Ready(None));
        match state {
            HandleState::Queued(rx) => {
                Box::pin(async move { rx.await.unwrap_or(Err(EngineError::BusClosed)) })
            }
            HandleState::Inline {
                shared,
                event: Some(event),
            } => Box::pin(async move { shared.dispatch(event).await }),
            HandleState::Inline { event: None, .. } => Box::pin(async { Ok(()) }),
            HandleState::Ready(result) => {
                let result = result.unwrap_or(Ok(()));
                Box::pin(async move { result })
            }
        }
    }
}

impl Drop for EmitHandle {
    fn drop(&mut self) {
        if let HandleState::Inline { shared, event } = &mut self.state {
            if let Some(event) = event.take() {
                let _ = shared.tx.send(Dispatch { event, done: None });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupId;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> impl Fn(Arc<Event>) -> BoxFuture<'static, ListenerResult> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_ev| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(tag);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_listener(EventKind::ItemAdded, recorder(&log, "a"), None);
        bus.add_listener(EventKind::ItemAdded, recorder(&log, "b"), None);
        bus.add_listener(EventKind::ItemRemoved, recorder(&log, "x"), None);

        bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap();
        assert_eq!(*log.lock(), vec!["a", "b"]);
        bus.close().await;
    }

    #[tokio::test]
    async fn predicate_filters_by_owner() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mine = GroupId::next();
        let pred: Predicate = Arc::new(move |ev: &Event| ev.is_for(mine));
        bus.add_listener(EventKind::GroupRemoved, recorder(&log, "mine"), Some(pred));

        bus.emit(Event::new(EventKind::GroupRemoved).with_owner(GroupId::next()))
            .await
            .unwrap();
        assert!(log.lock().is_empty());

        bus.emit(Event::new(EventKind::GroupRemoved).with_owner(mine))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["mine"]);
        bus.close().await;
    }

    #[tokio::test]
    async fn remove_unknown_listener_is_noop() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = bus.add_listener(EventKind::ItemAdded, recorder(&log, "a"), None);

        assert!(!bus.remove_listener(EventKind::ItemRemoved, id));
        assert!(bus.remove_listener(EventKind::ItemAdded, id));
        assert!(!bus.remove_listener(EventKind::ItemAdded, id));
        assert_eq!(bus.listener_count(EventKind::ItemAdded), 0);
        bus.close().await;
    }

    #[tokio::test]
    async fn first_error_stops_the_pass() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_listener(
            EventKind::ItemAdded,
            |_ev| async { Err::<(), _>(EngineError::Detached) },
            None,
        );
        bus.add_listener(EventKind::ItemAdded, recorder(&log, "after"), None);

        let err = bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap_err();
        assert!(matches!(err, EngineError::Detached));
        assert!(log.lock().is_empty());
        bus.close().await;
    }

    #[tokio::test]
    async fn snapshot_ignores_listeners_added_mid_pass() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_bus = bus.clone();
        let inner_log = Arc::clone(&log);
        bus.add_listener(
            EventKind::ItemAdded,
            move |_ev| {
                let bus = inner_bus.clone();
                let log = Arc::clone(&inner_log);
                async move {
                    bus.add_listener(EventKind::ItemAdded, recorder(&log, "late"), None);
                    log.lock().push("first");
                    Ok(())
                }
            },
            None,
        );

        bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap();
        assert_eq!(*log.lock(), vec!["first"]);
        bus.close().await;
    }

    #[tokio::test]
    async fn nested_emit_awaited_inside_listener_does_not_deadlock() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_listener(EventKind::ItemRemoved, recorder(&log, "removed"), None);

        let inner_bus = bus.clone();
        let inner_log = Arc::clone(&log);
        bus.add_listener(
            EventKind::ItemAdded,
            move |_ev| {
                let bus = inner_bus.clone();
                let log = Arc::clone(&inner_log);
                async move {
                    bus.emit(Event::new(EventKind::ItemRemoved)).await?;
                    log.lock().push("added");
                    Ok(())
                }
            },
            None,
        );

        bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap();
        assert_eq!(*log.lock(), vec!["removed", "added"]);
        bus.close().await;
    }

    #[tokio::test]
    async fn dropped_nested_emit_is_queued() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_listener(EventKind::ItemRemoved, recorder(&log, "removed"), None);

        let inner_bus = bus.clone();
        let inner_log = Arc::clone(&log);
        bus.add_listener(
            EventKind::ItemAdded,
            move |_ev| {
                let bus = inner_bus.clone();
                let log = Arc::clone(&inner_log);
                async move {
                    drop(bus.emit(Event::new(EventKind::ItemRemoved)));
                    log.lock().push("added");
                    Ok(())
                }
            },
            None,
        );

        bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap();
        // The queued event runs in its own pass, after the current one.
        bus.emit(Event::new(EventKind::GroupAdded)).await.unwrap();
        assert_eq!(*log.lock(), vec!["added", "removed"]);
        bus.close().await;
    }

    #[tokio::test]
    async fn panicking_listener_is_isolated() {
        let bus = EventBus::new();
        bus.add_listener(
            EventKind::ItemAdded,
            |ev: Arc<Event>| async move {
                if ev.seq < u64::MAX {
                    panic!("boom");
                }
                Ok(())
            },
            None,
        );

        let err = bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap_err();
        assert!(matches!(err, EngineError::ListenerPanicked(ref m) if m == "boom"));

        // Worker survived.
        bus.emit(Event::new(EventKind::ItemRemoved)).await.unwrap();
        bus.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn call_at_cancelled_never_emits() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_listener(EventKind::GroupJoinTick, recorder(&log, "tick"), None);

        let timer = bus.call_at(Duration::from_secs(45), Event::new(EventKind::GroupJoinTick));
        tokio::time::sleep(Duration::from_secs(10)).await;
        timer.close().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap();
        assert!(log.lock().is_empty());

        let _timer = bus.call_at(Duration::from_secs(45), Event::new(EventKind::GroupJoinTick));
        tokio::time::sleep(Duration::from_secs(46)).await;
        bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap();
        assert_eq!(*log.lock(), vec!["tick"]);
        bus.close().await;
    }

    #[tokio::test]
    async fn emit_after_close_fails() {
        let bus = EventBus::new();
        bus.close().await;
        let err = bus.emit(Event::new(EventKind::ItemAdded)).await.unwrap_err();
        assert!(matches!(err, EngineError::BusClosed));
        assert!(bus.is_closed());
    }
}
