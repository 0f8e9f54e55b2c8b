//! Per-node reconciler
//!
//! Drains one node's event queues: waits out the event's prewait, runs the
//! planned commands against the node's call engine, and kicks off a
//! firewall pass when the event class calls for one. Firewall passes run one
//! at a time and each renders the state current when it starts. Command
//! failures are logged and counted; they never stop later commands or later
//! events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::commands::plan_commands;
use super::errors::{EventsError, EventsResult};
use super::event::{ChangeEvent, EventClass};
use crate::engine::{CallEngine, CommandOutcome};
use crate::firewall::{Firewall, FirewallResult, FirewallState};
use crate::observability::{log_event_with_fields, Event};
use crate::registry::Registry;
use crate::store::keys;

/// Timing knobs of one reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Upper bound on one blocking pop
    pub queue_timeout: Duration,
    /// Pause after a fault
    pub fault_backoff: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            queue_timeout: Duration::from_secs(5),
            fault_backoff: Duration::from_secs(5),
        }
    }
}

/// What handling one event did
#[derive(Debug)]
pub struct Handled {
    pub outcomes: Vec<CommandOutcome>,
    /// Engine could not be reached; no command ran
    pub unreachable: bool,
    pub firewall: Option<JoinHandle<FirewallResult<()>>>,
}

pub struct Reconciler {
    nodeid: String,
    registry: Arc<Registry>,
    engine: Arc<dyn CallEngine>,
    firewall: Option<Arc<dyn Firewall>>,
    queues: Vec<String>,
    settings: ReconcilerSettings,
    firewall_pass: Arc<Mutex<()>>,
}

impl Reconciler {
    pub fn new(
        nodeid: impl Into<String>,
        registry: Arc<Registry>,
        engine: Arc<dyn CallEngine>,
        firewall: Option<Arc<dyn Firewall>>,
        settings: ReconcilerSettings,
    ) -> Self {
        let nodeid = nodeid.into();
        let queues = EventClass::ALL
            .iter()
            .map(|class| keys::event_queue(keys::CALL_ENGINE, class.as_str(), &nodeid))
            .collect();
        Self {
            nodeid,
            registry,
            engine,
            firewall,
            queues,
            settings,
            firewall_pass: Arc::new(Mutex::new(())),
        }
    }

    pub fn nodeid(&self) -> &str {
        &self.nodeid
    }

    pub fn settings(&self) -> ReconcilerSettings {
        self.settings
    }

    /// Queues drained, in priority order
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Wait for one event and handle it. `Ok(None)` when the wait timed out.
    pub async fn run_once(&self) -> EventsResult<Option<Handled>> {
        let popped = self
            .registry
            .store()
            .blocking_pop(&self.queues, self.settings.queue_timeout)
            .await?;
        let Some((queue, payload)) = popped else {
            return Ok(None);
        };
        let event = ChangeEvent::from_payload(&payload).map_err(|e| EventsError::Decode {
            queue: queue.clone(),
            reason: e.to_string(),
        })?;
        log_event_with_fields(
            Event::EventReceived,
            &[
                ("action", event.action.as_str()),
                ("class", event.class.as_str()),
                ("nodeid", &self.nodeid),
                ("prewait", &event.prewait.to_string()),
                ("requestid", &event.requestid.to_string()),
            ],
        );
        if event.prewait > 0 {
            sleep(Duration::from_secs(event.prewait)).await;
        }
        Ok(Some(self.handle(&event).await))
    }

    /// Run the commands for `event`; best effort, never fails
    pub async fn handle(&self, event: &ChangeEvent) -> Handled {
        let commands = plan_commands(event);
        let metrics = self.registry.metrics();
        let requestid = event.requestid.to_string();
        let mut outcomes = Vec::new();
        let mut unreachable = false;

        if !commands.is_empty() {
            match self.engine.run(&commands).await {
                Ok(results) => outcomes = results,
                Err(err) => {
                    unreachable = true;
                    for _ in &commands {
                        metrics.record_command(false);
                    }
                    log_event_with_fields(
                        Event::EngineUnreachable,
                        &[
                            ("code", err.code()),
                            ("nodeid", &self.nodeid),
                            ("reason", &err.to_string()),
                            ("requestid", &requestid),
                        ],
                    );
                }
            }
        }
        for outcome in &outcomes {
            metrics.record_command(outcome.success);
            if !outcome.success {
                log_event_with_fields(
                    Event::EngineCommandFailed,
                    &[
                        ("command", &outcome.command.to_string()),
                        ("nodeid", &self.nodeid),
                        ("reply", &outcome.reply),
                        ("requestid", &requestid),
                    ],
                );
            }
        }

        let firewall = if event.class.triggers_firewall() {
            self.spawn_firewall_pass(requestid.clone())
        } else {
            None
        };

        metrics.increment_events_reconciled();
        let failed = outcomes.iter().filter(|o| !o.success).count();
        log_event_with_fields(
            Event::ReconcileComplete,
            &[
                ("action", event.action.as_str()),
                ("class", event.class.as_str()),
                ("commands", &commands.len().to_string()),
                ("failed", &failed.to_string()),
                ("nodeid", &self.nodeid),
                ("requestid", &requestid),
            ],
        );
        Handled {
            outcomes,
            unreachable,
            firewall,
        }
    }

    fn spawn_firewall_pass(&self, requestid: String) -> Option<JoinHandle<FirewallResult<()>>> {
        let firewall = self.firewall.clone()?;
        let registry = self.registry.clone();
        let nodeid = self.nodeid.clone();
        let pass = self.firewall_pass.clone();
        Some(tokio::spawn(async move {
            let _pass = pass.lock().await;
            let result = match FirewallState::load(&registry, &nodeid) {
                Ok(state) => firewall.apply(&nodeid, state.render()).await,
                Err(err) => Err(err),
            };
            registry.metrics().record_firewall(result.is_ok());
            match &result {
                Ok(()) => log_event_with_fields(
                    Event::FirewallApplied,
                    &[("nodeid", &nodeid), ("requestid", &requestid)],
                ),
                Err(err) => log_event_with_fields(
                    Event::FirewallFailed,
                    &[
                        ("code", err.code()),
                        ("nodeid", &nodeid),
                        ("reason", &err.to_string()),
                        ("requestid", &requestid),
                    ],
                ),
            }
            result
        }))
    }

    /// Consume events until `shutdown` flips; faults back off and resume
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.run_once() => result,
            };
            if let Err(err) = result {
                log_event_with_fields(
                    Event::ReconcilerFault,
                    &[
                        ("code", err.code()),
                        ("nodeid", &self.nodeid),
                        ("reason", &err.to_string()),
                    ],
                );
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = sleep(self.settings.fault_backoff) => {}
                }
            }
        }
        log_event_with_fields(Event::ReconcilerStopped, &[("nodeid", &self.nodeid)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::engine::{EngineCommand, RecordingEngine};
    use crate::events::{Action, EventDetail};
    use crate::observability::MetricsRegistry;
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use uuid::Uuid;

    fn registry(store: Arc<MemoryStore>) -> Arc<Registry> {
        Arc::new(
            Registry::open(
                store,
                ClusterConfig::standalone("sbc1"),
                Arc::new(MetricsRegistry::new()),
            )
            .unwrap(),
        )
    }

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings {
            queue_timeout: Duration::from_millis(20),
            fault_backoff: Duration::from_millis(10),
        }
    }

    fn event(class: EventClass, action: Action, id: &str) -> ChangeEvent {
        ChangeEvent {
            class,
            action,
            old_id: Some(id.into()),
            new_id: Some(id.into()),
            detail: EventDetail::None,
            prewait: 0,
            requestid: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_timeout_yields_nothing() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(RecordingEngine::new());
        let reconciler = Reconciler::new("sbc1", registry(store), engine, None, settings());
        assert!(reconciler.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_command_does_not_stop_the_rest() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone());
        let engine = Arc::new(RecordingEngine::new());
        engine.fail_on(&EngineCommand::ProfileRescan("ext".into()));
        let reconciler =
            Reconciler::new("sbc1", registry.clone(), engine.clone(), None, settings());

        let e = event(EventClass::SipProfile, Action::Update, "ext");
        let queue = keys::event_queue(keys::CALL_ENGINE, "sipprofile", "sbc1");
        store.push(&queue, e.to_payload().unwrap()).unwrap();

        let handled = reconciler.run_once().await.unwrap().unwrap();
        assert_eq!(handled.outcomes.len(), 2);
        assert!(!handled.outcomes[0].success);
        assert!(handled.outcomes[1].success);
        assert_eq!(engine.commands().len(), 2);
        let snapshot = registry.metrics().snapshot();
        assert_eq!(snapshot.commands_failed, 1);
        assert_eq!(snapshot.commands_succeeded, 1);
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_logged_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(RecordingEngine::new());
        engine.set_unreachable(true);
        let reconciler = Reconciler::new("sbc1", registry(store), engine, None, settings());
        let handled = reconciler
            .handle(&event(EventClass::Inbound, Action::Create, "peer"))
            .await;
        assert!(handled.unreachable);
        assert!(handled.outcomes.is_empty());
    }

    #[derive(Default)]
    struct SlowFirewall {
        in_flight: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
        applied: std::sync::Mutex<Vec<String>>,
    }

    impl Firewall for SlowFirewall {
        fn apply<'a>(
            &'a self,
            _nodeid: &'a str,
            ruleset: String,
        ) -> crate::firewall::FirewallFuture<'a> {
            use std::sync::atomic::Ordering;
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                self.applied.lock().unwrap().push(ruleset);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_firewall_passes_run_one_at_a_time() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store);
        let engine = Arc::new(RecordingEngine::new());
        let firewall = Arc::new(SlowFirewall::default());
        let reconciler = Reconciler::new(
            "sbc1",
            registry,
            engine,
            Some(firewall.clone() as Arc<dyn Firewall>),
            settings(),
        );

        let mut passes = Vec::new();
        for _ in 0..3 {
            let handled = reconciler
                .handle(&event(EventClass::Acl, Action::Update, "trusted"))
                .await;
            passes.push(handled.firewall.expect("firewall pass"));
        }
        for pass in passes {
            pass.await.unwrap().unwrap();
        }
        assert_eq!(firewall.applied.lock().unwrap().len(), 3);
        assert_eq!(firewall.peak.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_payload_is_a_fault_and_loop_survives() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(RecordingEngine::new());
        let reconciler = Arc::new(Reconciler::new(
            "sbc1",
            registry(store.clone()),
            engine.clone(),
            None,
            settings(),
        ));
        let queue = keys::event_queue(keys::CALL_ENGINE, "acl", "sbc1");
        store.push(&queue, "not json".into()).unwrap();
        let good = event(EventClass::Acl, Action::Update, "trusted");
        store.push(&queue, good.to_payload().unwrap()).unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(reconciler.clone().run(rx));
        for _ in 0..100 {
            if !engine.commands().is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(engine.commands(), vec![EngineCommand::ReloadAcl]);
    }
}
