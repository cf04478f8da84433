use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::SessionStore;

struct RunningReaper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodically evicts sessions idle past the store's ceiling.
pub struct SessionReaper {
    store: Arc<SessionStore>,
    interval: Duration,
    max_idle: Duration,
    running: Mutex<Option<RunningReaper>>,
}

impl SessionReaper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        let max_idle = store.settings().max_idle;
        Self { store, interval, max_idle, running: Mutex::new(None) }
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Runs one eviction pass immediately.
    pub async fn sweep(&self) -> usize {
        sweep_once(&self.store, self.max_idle).await
    }

    /// Starts the periodic task. Returns false when it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return false;
        }

        let (shutdown, mut stopped) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let period = self.interval;
        let max_idle = self.max_idle;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_once(&store, max_idle).await;
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        info!(
            event_name = "session.reaper.started",
            correlation_id = "bootstrap",
            interval_secs = period.as_secs(),
            max_idle_secs = max_idle.as_secs(),
            "session reaper started"
        );
        *running = Some(RunningReaper { shutdown, task });
        true
    }

    /// Stops the periodic task and waits for it to finish. Returns false when it was not running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(running) = running else {
            return false;
        };
        let _ = running.shutdown.send(true);
        let _ = running.task.await;
        info!(
            event_name = "session.reaper.stopped",
            correlation_id = "shutdown",
            "session reaper stopped"
        );
        true
    }
}

async fn sweep_once(store: &SessionStore, max_idle: Duration) -> usize {
    let evicted = store.evict_idle(max_idle).await;
    let remaining = store.len().await;
    info!(
        event_name = "session.reaper.sweep",
        correlation_id = "reaper",
        evicted,
        remaining,
        "session sweep completed"
    );
    evicted
}
