//! One-shot proactive refresh timer.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Time to wait before refreshing a session that expires at `expires_at`,
/// firing `lead` ahead of expiry. `None` means refresh now.
pub fn refresh_delay(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    lead: Duration,
) -> Option<Duration> {
    let remaining = (expires_at - now).to_std().ok()?;
    remaining.checked_sub(lead).filter(|delay| !delay.is_zero())
}

struct ArmedRefresh {
    generation: u64,
    fires_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Holds at most one pending refresh timer.
///
/// Arming replaces the previous timer; disarming or dropping the scheduler
/// aborts it. A timer that fires detaches itself before running its task,
/// so the task may re-arm the scheduler without cancelling itself.
pub struct RefreshScheduler {
    lead: Duration,
    slot: Arc<Mutex<Option<ArmedRefresh>>>,
    generation: AtomicU64,
}

impl RefreshScheduler {
    pub fn new(lead: Duration) -> Self {
        Self {
            lead,
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn lead(&self) -> Duration {
        self.lead
    }

    /// Schedule `task` to run `lead` before `expires_at`, replacing any
    /// pending timer. Returns the delay used (`None` when firing
    /// immediately), or `None` without scheduling when called outside a
    /// Tokio runtime.
    pub fn arm<F, Fut>(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>, task: F) -> Option<Duration>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, refresh timer not armed");
            return None;
        };

        let delay = refresh_delay(expires_at, now, self.lead);
        let fires_at = delay
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d)
            .unwrap_or(now);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = Arc::clone(&self.slot);

        let mut armed = self.slot.lock();
        if let Some(previous) = armed.take() {
            previous.handle.abort();
        }

        let handle = runtime.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            {
                let mut armed = slot.lock();
                match armed.as_ref() {
                    Some(current) if current.generation == generation => {
                        armed.take();
                    }
                    // Replaced while waking up
                    _ => return,
                }
            }
            task().await;
        });

        *armed = Some(ArmedRefresh {
            generation,
            fires_at,
            handle,
        });

        debug!(
            delay_ms = delay.map(|d| d.as_millis() as u64).unwrap_or(0),
            fires_at = %fires_at.to_rfc3339(),
            "Refresh timer armed"
        );
        delay
    }

    /// Cancel the pending timer, if any.
    pub fn disarm(&self) {
        if let Some(armed) = self.slot.lock().take() {
            armed.handle.abort();
            debug!("Refresh timer disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// When the pending timer fires.
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().as_ref().map(|armed| armed.fires_at)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(armed) = self.slot.lock().take() {
            armed.handle.abort();
        }
    }
}
