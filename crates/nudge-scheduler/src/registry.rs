//! Trigger Registry — named recurring timers that run async handlers.
//!
//! Each trigger owns one tokio timer task. Every firing spawns the handler
//! as its own task, so handlers can overlap the next firing and survive
//! re-registration: replacing a trigger aborts the timer, not in-flight work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use nudge_core::Result;
use tokio::task::JoinHandle;

use crate::cron::CronSchedule;

/// Async handler invoked on every firing.
pub type TriggerHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a `TriggerHandler`.
pub fn handler<F, Fut>(f: F) -> TriggerHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// When a trigger fires.
#[derive(Debug, Clone)]
pub enum Cadence {
    /// Fixed period, first firing one period after registration.
    Interval(Duration),
    /// Cron expression, evaluated in UTC.
    Cron(CronSchedule),
}

impl Cadence {
    pub fn cron(expression: &str) -> Result<Self> {
        Ok(Cadence::Cron(CronSchedule::parse(expression)?))
    }

    /// Delay until the next firing; `None` when the cadence never fires again.
    fn next_delay(&self) -> Option<Duration> {
        match self {
            Cadence::Interval(period) => Some(*period),
            Cadence::Cron(schedule) => {
                let now = Utc::now();
                let next = schedule.next_after(now)?;
                (next - now).to_std().ok()
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Cadence::Interval(period) => format!("every {}s", period.as_secs()),
            Cadence::Cron(schedule) => format!("cron '{}'", schedule.expression()),
        }
    }
}

/// What a firing does while the previous handler is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Overlap {
    /// Run concurrently.
    #[default]
    Allow,
    /// Drop this firing.
    Skip,
}

struct Trigger {
    timer: JoinHandle<()>,
    fired: Arc<AtomicU64>,
}

/// At most one active timer per name.
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: Mutex<HashMap<String, Trigger>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a trigger. Must be called inside a tokio runtime.
    /// Returns true when an existing trigger of the same name was replaced.
    pub fn register(
        &self,
        name: &str,
        cadence: Cadence,
        overlap: Overlap,
        handler: TriggerHandler,
    ) -> bool {
        let fired = Arc::new(AtomicU64::new(0));
        let description = cadence.describe();
        let timer = tokio::spawn(run_timer(
            name.to_string(),
            cadence,
            overlap,
            handler,
            fired.clone(),
        ));

        let mut triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        let replaced = match triggers.insert(name.to_string(), Trigger { timer, fired }) {
            Some(previous) => {
                previous.timer.abort();
                true
            }
            None => false,
        };
        if replaced {
            tracing::info!("⏰ Trigger replaced: '{}' ({})", name, description);
        } else {
            tracing::info!("⏰ Trigger registered: '{}' ({})", name, description);
        }
        replaced
    }

    /// Stop and remove a trigger. In-flight handlers finish on their own.
    pub fn unregister(&self, name: &str) -> bool {
        let mut triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        match triggers.remove(name) {
            Some(trigger) => {
                trigger.timer.abort();
                tracing::info!("⏹️ Trigger removed: '{}'", name);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        let triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        triggers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = triggers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Firings so far, including skipped ones.
    pub fn fire_count(&self, name: &str) -> Option<u64> {
        let triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        triggers.get(name).map(|t| t.fired.load(Ordering::Relaxed))
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        let mut triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        for (_, trigger) in triggers.drain() {
            trigger.timer.abort();
        }
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears the running flag even if the handler panics.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_timer(
    name: String,
    cadence: Cadence,
    overlap: Overlap,
    handler: TriggerHandler,
    fired: Arc<AtomicU64>,
) {
    let running = Arc::new(AtomicBool::new(false));
    loop {
        let Some(delay) = cadence.next_delay() else {
            tracing::warn!("⚠️ Trigger '{}' has no future firing, stopping", name);
            return;
        };
        tokio::time::sleep(delay).await;
        fired.fetch_add(1, Ordering::Relaxed);

        match overlap {
            Overlap::Allow => {
                tokio::spawn(handler());
            }
            Overlap::Skip => {
                if running.swap(true, Ordering::AcqRel) {
                    tracing::debug!("Trigger '{}' still running, firing skipped", name);
                    continue;
                }
                let guard = RunningGuard(running.clone());
                let work = handler();
                tokio::spawn(async move {
                    let _guard = guard;
                    work.await;
                });
            }
        }
    }
}
