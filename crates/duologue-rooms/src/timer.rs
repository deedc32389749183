//! Cancellable delayed callbacks keyed by session ID.
//!
//! One arm per key: scheduling a key again cancels the previous arm first.
//! Each arm carries a generation number; a fired or cancelled task only
//! removes its own generation from the table, so it can never clobber a
//! newer arm under the same key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use duologue_core::SessionId;

struct Armed {
    token: CancellationToken,
    generation: u64,
}

/// Schedules at most one delayed callback per session.
pub struct TimerService {
    entries: Mutex<HashMap<SessionId, Armed>>,
    next_generation: AtomicU64,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Arm a delayed callback for the key, cancelling any prior arm.
    ///
    /// The entry is removed before the callback runs, so the callback may
    /// re-arm the same key.
    pub fn schedule<F>(self: &Arc<Self>, key: SessionId, after: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.entries.lock();
            if let Some(prior) = entries.insert(
                key.clone(),
                Armed {
                    token: token.clone(),
                    generation,
                },
            ) {
                prior.token.cancel();
                debug!(session_id = %key, "replaced prior timer arm");
            }
        }

        let service = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(session_id = %key, "timer cancelled");
                }
                () = tokio::time::sleep(after) => {
                    let still_current = {
                        let mut entries = service.entries.lock();
                        match entries.get(&key) {
                            Some(armed) if armed.generation == generation => {
                                let _ = entries.remove(&key);
                                true
                            }
                            _ => false,
                        }
                    };
                    if still_current {
                        debug!(session_id = %key, "timer fired");
                        callback.await;
                    }
                }
            }
        }));
    }

    /// Cancel the arm for a key, if any. Idempotent.
    pub fn cancel(&self, key: &SessionId) {
        if let Some(armed) = self.entries.lock().remove(key) {
            armed.token.cancel();
            debug!(session_id = %key, "timer cancelled by caller");
        }
    }

    /// Whether a key currently has an arm.
    pub fn is_armed(&self, key: &SessionId) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of armed keys.
    pub fn armed_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fired_probe() -> (mpsc::UnboundedSender<&'static str>, mpsc::UnboundedReceiver<&'static str>) {
        mpsc::unbounded_channel()
    }

    async fn expect_fire(rx: &mut mpsc::UnboundedReceiver<&'static str>) -> &'static str {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer should have fired")
            .expect("probe channel closed")
    }

    #[tokio::test]
    async fn fires_after_duration() {
        let timers = Arc::new(TimerService::new());
        let (tx, mut rx) = fired_probe();
        let key = SessionId::from("sess_1");
        timers.schedule(key.clone(), Duration::from_millis(20), async move {
            let _ = tx.send("fired");
        });
        assert!(timers.is_armed(&key));
        assert_eq!(expect_fire(&mut rx).await, "fired");
        assert!(!timers.is_armed(&key));
    }

    #[tokio::test]
    async fn cancel_prevents_fire() {
        let timers = Arc::new(TimerService::new());
        let (tx, mut rx) = fired_probe();
        let key = SessionId::from("sess_1");
        timers.schedule(key.clone(), Duration::from_millis(20), async move {
            let _ = tx.send("fired");
        });
        timers.cancel(&key);
        assert!(!timers.is_armed(&key));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let timers = Arc::new(TimerService::new());
        let key = SessionId::from("sess_1");
        timers.cancel(&key);
        timers.schedule(key.clone(), Duration::from_millis(10), async {});
        timers.cancel(&key);
        timers.cancel(&key);
    }

    #[tokio::test]
    async fn reschedule_replaces_prior_arm() {
        let timers = Arc::new(TimerService::new());
        let (tx, mut rx) = fired_probe();
        let key = SessionId::from("sess_1");

        let tx_old = tx.clone();
        timers.schedule(key.clone(), Duration::from_millis(20), async move {
            let _ = tx_old.send("old");
        });
        timers.schedule(key.clone(), Duration::from_millis(40), async move {
            let _ = tx.send("new");
        });

        assert_eq!(expect_fire(&mut rx).await, "new");
        // The replaced arm never fires.
        assert!(rx.try_recv().is_err());
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test]
    async fn callback_can_rearm_same_key() {
        let timers = Arc::new(TimerService::new());
        let (tx, mut rx) = fired_probe();
        let key = SessionId::from("sess_1");

        let timers_inner = Arc::clone(&timers);
        let key_inner = key.clone();
        timers.schedule(key.clone(), Duration::from_millis(10), async move {
            let tx2 = tx.clone();
            let _ = tx.send("first");
            timers_inner.schedule(key_inner, Duration::from_millis(10), async move {
                let _ = tx2.send("second");
            });
        });

        assert_eq!(expect_fire(&mut rx).await, "first");
        assert_eq!(expect_fire(&mut rx).await, "second");
    }

    #[tokio::test]
    async fn independent_keys_do_not_interfere() {
        let timers = Arc::new(TimerService::new());
        let (tx, mut rx) = fired_probe();
        let tx2 = tx.clone();
        timers.schedule(SessionId::from("sess_1"), Duration::from_millis(15), async move {
            let _ = tx.send("one");
        });
        timers.schedule(SessionId::from("sess_2"), Duration::from_millis(15), async move {
            let _ = tx2.send("two");
        });
        assert_eq!(timers.armed_count(), 2);

        let mut seen = vec![expect_fire(&mut rx).await, expect_fire(&mut rx).await];
        seen.sort_unstable();
        assert_eq!(seen, vec!["one", "two"]);
    }
}
