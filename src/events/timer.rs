//! # Cancellable one-shot timers.
//!
//! [`call_at`] spawns a task that sleeps and then runs a callback. The returned
//! [`TimerHandle`] is owned by whoever armed the timer.
//!
//! ## Rules
//! - Cancelling before the deadline guarantees the callback never runs.
//! - Dropping the handle cancels the timer.
//! - [`TimerHandle::close`] cancels and then waits for the timer task, so a callback
//!   that already started has finished when `close` returns.

use std::future::Future;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to an armed timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Cancels the timer without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the callback ran or the timer was cancelled and exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Cancels the timer and waits for its task to exit.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Runs `f` once `delay` has elapsed, unless cancelled first.
pub fn call_at<F, Fut>(delay: Duration, f: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let join = tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancelled.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if !cancelled.is_cancelled() {
                    f().await;
                }
            }
        }
    });

    TimerHandle {
        token,
        join: Some(join),
    }
}

/// Delay from now until `deadline` (zero if it already passed).
pub fn until(deadline: SystemTime) -> Duration {
    deadline
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let timer = call_at(Duration::from_secs(5), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_never_runs() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let timer = call_at(Duration::from_secs(1), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        timer.close().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        drop(call_at(Duration::from_secs(1), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn until_past_deadline_is_zero() {
        let past = SystemTime::now() - Duration::from_secs(60);
        assert_eq!(until(past), Duration::ZERO);
    }
}
