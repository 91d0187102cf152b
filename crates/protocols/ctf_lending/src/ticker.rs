//! Periodic background tasks
//!
//! A `Ticker` owns at most one spawned task. Starting a running ticker is a
//! no-op, stopping aborts the task, and dropping the ticker stops it.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants::display;
use crate::state::{unix_now, AppStore};

pub struct Ticker {
    name: &'static str,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            task: Mutex::new(None),
        }
    }

    /// Spawn the tick loop unless one is already running.
    ///
    /// The first call to `on_tick` happens one period after start. Returns
    /// whether a new task was spawned.
    pub fn start<F>(&self, mut on_tick: F) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let period = self.period;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval's first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                on_tick();
            }
        }));
        tracing::debug!(ticker = self.name, "Ticker started");
        true
    }

    /// Abort the tick loop. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        match task.take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!(ticker = self.name, "Ticker stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

/// Re-computes "time since deposit" once per second
pub struct ElapsedClock {
    store: AppStore,
    ticker: Ticker,
}

impl ElapsedClock {
    pub fn new(store: AppStore) -> Self {
        Self {
            store,
            ticker: Ticker::new(
                "elapsed",
                Duration::from_secs(display::ELAPSED_TICK_SECS),
            ),
        }
    }

    pub fn start(&self) {
        self.refresh();
        let store = self.store.clone();
        self.ticker.start(move || refresh_elapsed(&store));
    }

    pub fn stop(&self) {
        self.ticker.stop();
        self.store.update(|s| s.elapsed_secs = None);
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    fn refresh(&self) {
        refresh_elapsed(&self.store);
    }
}

fn refresh_elapsed(store: &AppStore) {
    let now = unix_now();
    store.update(|s| {
        s.elapsed_secs = s
            .position
            .deposit_timestamp
            .map(|since| now.saturating_sub(since));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let ticker = Ticker::new("test", Duration::from_secs(1));
        let count = Arc::new(AtomicU32::new(0));

        let c = count.clone();
        assert!(ticker.start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = count.clone();
        assert!(!ticker.start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let ticker = Ticker::new("test", Duration::from_secs(1));
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        ticker.start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(ticker.stop());
        assert!(!ticker.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!ticker.stop());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let ticker = Ticker::new("test", Duration::from_secs(1));
        assert!(ticker.start(|| {}));
        ticker.stop();
        assert!(ticker.start(|| {}));
        assert!(ticker.is_running());
    }

    #[tokio::test]
    async fn test_elapsed_clock_tracks_deposit() {
        let store = AppStore::new();
        store.update(|s| s.position.deposit_timestamp = Some(unix_now() - 90));

        let clock = ElapsedClock::new(store.clone());
        clock.start();
        let elapsed = store.snapshot().elapsed_secs.unwrap();
        assert!((90..100).contains(&elapsed));

        clock.stop();
        assert!(!clock.is_running());
        assert!(store.snapshot().elapsed_secs.is_none());
    }
}
