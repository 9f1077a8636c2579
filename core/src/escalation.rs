//! Per-alert escalation deadlines.
//!
//! Each armed alert gets one tokio task that sleeps for the delay and
//! then runs the check it was armed with. Deadlines are tracked by
//! alert id so they can be cancelled one by one (acknowledge/resolve)
//! or all at once (monitoring stopped).
//!
//! A deadline that fires after its alert was acknowledged, resolved or
//! pruned is harmless: the check re-reads the store before acting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::{runtime::Handle, task::JoinHandle};

struct Deadline {
    generation: u64,
    handle:     JoinHandle<()>,
}

#[derive(Default)]
struct Pending {
    deadlines:       HashMap<String, Deadline>,
    next_generation: u64,
}

pub struct EscalationScheduler {
    delay:   Duration,
    runtime: Handle,
    pending: Arc<Mutex<Pending>>,
}

impl EscalationScheduler {
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `check` once the delay elapses, unless cancelled first.
    /// Arming an id that is already pending replaces its deadline.
    pub fn arm<F>(&self, alert_id: &str, check: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let key = alert_id.to_string();
        let pending = Arc::clone(&self.pending);

        // Held across spawn so the task cannot look itself up before
        // its entry exists.
        let mut guard = self.pending.lock();
        let generation = guard.next_generation;
        guard.next_generation += 1;

        let task_key = key.clone();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = {
                let mut pending = pending.lock();
                match pending.deadlines.get(&task_key) {
                    Some(d) if d.generation == generation => {
                        pending.deadlines.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if still_armed {
                check();
            }
        });

        if let Some(previous) = guard.deadlines.insert(key, Deadline { generation, handle }) {
            previous.handle.abort();
        }
        log::debug!("escalation armed for {alert_id} in {delay:?}");
    }

    /// Returns false if nothing was pending for `alert_id`.
    pub fn cancel(&self, alert_id: &str) -> bool {
        match self.pending.lock().deadlines.remove(alert_id) {
            Some(deadline) => {
                deadline.handle.abort();
                log::debug!("escalation cancelled for {alert_id}");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending deadline. Returns how many were pending.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Deadline> = self
            .pending
            .lock()
            .deadlines
            .drain()
            .map(|(_, d)| d)
            .collect();
        for deadline in &drained {
            deadline.handle.abort();
        }
        drained.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().deadlines.len()
    }

    pub fn is_pending(&self, alert_id: &str) -> bool {
        self.pending.lock().deadlines.contains_key(alert_id)
    }
}
