//! The alert engine: the monitoring loop and the public API.
//!
//! PIPELINE (fixed, never reordered):
//!   1. RuleEngine.evaluate(event, thresholds snapshot)
//!   2. AlertFactory.build for each draft, in rule-priority order
//!   3. AlertStore.admit
//!   4. Notifier.publish(new_alert)
//!   5. EscalationScheduler.arm, critical alerts only
//!
//! LOCKING:
//!   - thresholds:  RwLock; evaluation clones a snapshot up front.
//!   - state:       one Mutex over the store and the rule engine's
//!                  activity window. Every mutation goes through it.
//!   - Notifier delivery happens after `state` is released, so a
//!     subscriber may call straight back into the engine.
//!
//! The engine is an explicit instance. Clone the handle to share it;
//! the ticker and escalation tasks only hold weak references, so the
//! engine shuts down once the last handle is dropped.

use crate::{
    alert::{Alert, AlertDraft, AlertFactory, Severity},
    clock::{Clock, SystemClock},
    config::{EngineConfig, ThresholdConfig, ThresholdUpdate},
    error::{AlertError, AlertResult},
    escalation::EscalationScheduler,
    event::{Notification, Topic},
    feed::EventSource,
    notifier::{Notifier, SubscriptionId},
    rules::{self, RuleEngine},
    stats::{compute_stats, AlertStats},
    store::AlertStore,
    transaction::TransactionEvent,
};
use chrono::Duration as ChronoDuration;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringState {
    Stopped,
    Running,
}

struct PipelineState {
    store: AlertStore,
    rules: RuleEngine,
}

struct EngineInner {
    tick_interval: Duration,
    thresholds:    RwLock<ThresholdConfig>,
    state:         Mutex<PipelineState>,
    notifier:      Notifier,
    escalations:   EscalationScheduler,
    clock:         Arc<dyn Clock>,
    source:        Mutex<Option<Box<dyn EventSource>>>,
    feed_healthy:  AtomicBool,
    ticker:        Mutex<Option<JoinHandle<()>>>,
    runtime:       Handle,
}

#[derive(Clone)]
pub struct AlertEngine {
    inner: Arc<EngineInner>,
}

// ── Construction ─────────────────────────────────────────────────────────────

pub struct AlertEngineBuilder {
    config: EngineConfig,
    clock:  Arc<dyn Clock>,
    source: Option<Box<dyn EventSource>>,
}

impl AlertEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(mut self, source: Box<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Must be called from inside a tokio runtime.
    pub fn build(self) -> AlertResult<AlertEngine> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| AlertError::RuntimeUnavailable)?;
        let retention = ChronoDuration::from_std(self.config.retention).map_err(|_| {
            AlertError::InvalidConfig {
                field:  "retention",
                reason: "out of range".into(),
            }
        })?;

        let inner = EngineInner {
            tick_interval: self.config.tick_interval,
            thresholds:    RwLock::new(self.config.thresholds),
            state:         Mutex::new(PipelineState {
                store: AlertStore::new(retention, self.config.history_capacity),
                rules: RuleEngine::new(),
            }),
            notifier:      Notifier::new(),
            escalations:   EscalationScheduler::new(self.config.escalation_delay, runtime.clone()),
            clock:         self.clock,
            source:        Mutex::new(self.source),
            feed_healthy:  AtomicBool::new(true),
            ticker:        Mutex::new(None),
            runtime,
        };
        Ok(AlertEngine { inner: Arc::new(inner) })
    }
}

impl AlertEngine {
    pub fn builder() -> AlertEngineBuilder {
        AlertEngineBuilder {
            config: EngineConfig::default(),
            clock:  Arc::new(SystemClock),
            source: None,
        }
    }

    /// Wall clock, no event source: events arrive through `ingest`.
    pub fn new(config: EngineConfig) -> AlertResult<Self> {
        Self::builder().config(config).build()
    }

    // ── Monitoring loop ────────────────────────────────────────

    /// stopped → running. A no-op when already running.
    pub fn start_monitoring(&self) {
        {
            let mut ticker = self.inner.ticker.lock();
            if ticker.is_some() {
                log::debug!("start_monitoring: already running");
                return;
            }
            let weak = Arc::downgrade(&self.inner);
            *ticker = Some(self.inner.runtime.spawn(run_ticker(weak, self.inner.tick_interval)));
        }
        let at = self.inner.clock.now();
        log::info!("Monitoring started (tick every {:?})", self.inner.tick_interval);
        self.inner.notifier.publish(&Notification::MonitoringStarted { at });
    }

    /// running → stopped. Cancels the ticker and every pending
    /// escalation. A no-op when already stopped.
    pub fn stop_monitoring(&self) {
        let ticker = self.inner.ticker.lock().take();
        let Some(ticker) = ticker else {
            log::debug!("stop_monitoring: already stopped");
            return;
        };
        ticker.abort();
        let cancelled = self.inner.escalations.cancel_all();
        let at = self.inner.clock.now();
        log::info!("Monitoring stopped ({cancelled} pending escalations cancelled)");
        self.inner.notifier.publish(&Notification::MonitoringStopped { at });
    }

    pub fn monitoring_state(&self) -> MonitoringState {
        if self.inner.ticker.lock().is_some() {
            MonitoringState::Running
        } else {
            MonitoringState::Stopped
        }
    }

    /// Run one tick by hand: poll the source, evaluate, prune.
    pub fn tick(&self) -> AlertResult<Vec<Alert>> {
        self.inner.run_tick()
    }

    // ── Ingestion ──────────────────────────────────────────────

    /// Feed one event through the pipeline now. Works whether or not
    /// the ticker is running. Returns the alerts it created.
    pub fn ingest(&self, event: &TransactionEvent) -> AlertResult<Vec<Alert>> {
        self.inner.process(event)
    }

    // ── Thresholds ─────────────────────────────────────────────

    /// Merge a partial update. Invalid values leave the current
    /// thresholds untouched.
    pub fn update_thresholds(&self, update: ThresholdUpdate) -> AlertResult<ThresholdConfig> {
        let updated = {
            let mut thresholds = self.inner.thresholds.write();
            let merged = thresholds.merged(update)?;
            *thresholds = merged.clone();
            merged
        };
        log::info!(
            "Thresholds updated: amount={} risk={} velocity={}/{:?}",
            updated.transaction_amount,
            updated.risk_score,
            updated.velocity_threshold,
            updated.velocity_window
        );
        self.inner.notifier.publish(&Notification::ThresholdsUpdated {
            thresholds: updated.clone(),
        });
        Ok(updated)
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.inner.thresholds.read().clone()
    }

    // ── Lifecycle ──────────────────────────────────────────────

    pub fn acknowledge_alert(&self, id: &str, actor: &str) -> AlertResult<Alert> {
        let now = self.inner.clock.now();
        let alert = self.inner.state.lock().store.acknowledge(id, actor, now)?;
        self.inner.escalations.cancel(id);
        log::info!("Alert {id} acknowledged by {actor}");
        self.inner.notifier.publish(&Notification::AlertAcknowledged {
            alert: alert.clone(),
        });
        Ok(alert)
    }

    pub fn resolve_alert(&self, id: &str, actor: &str) -> AlertResult<Alert> {
        let now = self.inner.clock.now();
        let alert = self.inner.state.lock().store.resolve(id, actor, now)?;
        self.inner.escalations.cancel(id);
        log::info!("Alert {id} resolved by {actor}");
        self.inner.notifier.publish(&Notification::AlertResolved {
            alert: alert.clone(),
        });
        Ok(alert)
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn get_alert(&self, id: &str) -> Option<Alert> {
        self.inner.state.lock().store.get(id).cloned()
    }

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.inner.state.lock().store.active_alerts()
    }

    /// The `limit` newest open alerts.
    pub fn get_latest_active(&self, limit: usize) -> Vec<Alert> {
        self.inner.state.lock().store.latest_active(limit)
    }

    /// The `limit` newest alerts, newest first.
    pub fn get_alert_history(&self, limit: usize) -> Vec<Alert> {
        self.inner.state.lock().store.history(limit)
    }

    pub fn get_alert_stats(&self) -> AlertStats {
        let history = self.inner.state.lock().store.snapshot();
        compute_stats(&history, self.inner.clock.now())
    }

    pub fn pending_escalations(&self) -> usize {
        self.inner.escalations.pending_count()
    }

    // ── Subscriptions ──────────────────────────────────────────

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(topic, id)
    }
}

// ── Internals ────────────────────────────────────────────────────────────────

async fn run_ticker(engine: Weak<EngineInner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(inner) = engine.upgrade() else {
            log::debug!("engine dropped, ticker exiting");
            break;
        };
        if let Err(e) = inner.run_tick() {
            log::warn!("Monitoring tick failed: {e}");
        }
    }
}

impl EngineInner {
    fn process(self: &Arc<Self>, event: &TransactionEvent) -> AlertResult<Vec<Alert>> {
        let thresholds = self.thresholds.read().clone();
        let admitted = {
            let mut state = self.state.lock();
            let drafts = state.rules.evaluate(event, &thresholds)?;
            self.admit_locked(&mut state, drafts)
        };
        self.announce(&admitted);
        Ok(admitted)
    }

    /// Build and admit drafts in the order given. The caller holds
    /// the state lock and announces afterwards.
    fn admit_locked(&self, state: &mut PipelineState, drafts: Vec<AlertDraft>) -> Vec<Alert> {
        if drafts.is_empty() {
            return Vec::new();
        }
        let now = self.clock.now();
        drafts
            .into_iter()
            .map(|draft| {
                let alert = AlertFactory::build(draft, now);
                state.store.admit(alert.clone());
                alert
            })
            .collect()
    }

    fn announce(self: &Arc<Self>, admitted: &[Alert]) {
        for alert in admitted {
            log::warn!(
                "New {} alert {}: {} [{}]",
                alert.severity,
                alert.id,
                alert.title,
                alert.alert_type
            );
            self.notifier.publish(&Notification::NewAlert {
                alert: alert.clone(),
            });
            if alert.severity == Severity::Critical {
                self.arm_escalation(alert);
            }
        }
    }

    fn arm_escalation(self: &Arc<Self>, alert: &Alert) {
        let weak = Arc::downgrade(self);
        let id = alert.id.clone();
        self.escalations.arm(&alert.id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.escalate(&id);
            }
        });
    }

    fn escalate(&self, id: &str) {
        let now = self.clock.now();
        let escalated = self.state.lock().store.escalate(id, now);
        match escalated {
            Some(alert) => {
                log::warn!(
                    "Alert {id} escalated: unacknowledged after {:?}",
                    self.escalations.delay()
                );
                self.notifier.publish(&Notification::AlertEscalated { alert });
            }
            None => log::debug!("escalation check for {id}: nothing to do"),
        }
    }

    fn run_tick(self: &Arc<Self>) -> AlertResult<Vec<Alert>> {
        let now = self.clock.now();
        let polled = {
            let mut source = self.source.lock();
            source
                .as_mut()
                .map(|s| (s.name().to_string(), s.poll(now)))
        };

        let mut created = Vec::new();
        match polled {
            None => {}
            Some((_, Ok(events))) => {
                if !self.feed_healthy.swap(true, Ordering::SeqCst) {
                    log::info!("Event source recovered");
                }
                for event in &events {
                    match self.process(event) {
                        Ok(alerts) => created.extend(alerts),
                        Err(e) => log::warn!("Skipping transaction {}: {e}", event.id),
                    }
                }
            }
            Some((name, Err(e))) => {
                if self.feed_healthy.swap(false, Ordering::SeqCst) {
                    log::error!("Event source {name} failed: {e}");
                    let draft = rules::connection_issue_draft(&name, &e.to_string());
                    let admitted = {
                        let mut state = self.state.lock();
                        self.admit_locked(&mut state, vec![draft])
                    };
                    self.announce(&admitted);
                    created.extend(admitted);
                } else {
                    log::debug!("Event source {name} still down: {e}");
                }
            }
        }

        let horizon = {
            let window = self.thresholds.read().velocity_window;
            rules::activity_horizon(ChronoDuration::from_std(window).map_err(anyhow::Error::from)?)
        };
        let mut state = self.state.lock();
        state.store.prune_history(now);
        state.rules.sweep(now, horizon);
        Ok(created)
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
        self.escalations.cancel_all();
    }
}
