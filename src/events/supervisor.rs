//! Reconciler supervision
//!
//! One task per reconciled node. A reconciler that panics is restarted
//! after its fault backoff; all of them stop when the shutdown signal is
//! sent.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::reconciler::Reconciler;
use crate::observability::{log_event_with_fields, Event};

pub struct Supervisor {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn one supervised task per reconciler
    pub fn start(reconcilers: Vec<Arc<Reconciler>>) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let tasks = reconcilers
            .into_iter()
            .map(|reconciler| tokio::spawn(supervise(reconciler, signal.clone())))
            .collect();
        Self { shutdown, tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every reconciler and wait for them to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn supervise(reconciler: Arc<Reconciler>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let task = tokio::spawn(reconciler.clone().run(shutdown.clone()));
        match task.await {
            Ok(()) => return,
            Err(err) if err.is_panic() => {
                log_event_with_fields(
                    Event::ReconcilerRestarted,
                    &[("nodeid", reconciler.nodeid()), ("reason", "panic")],
                );
            }
            Err(_) => return,
        }
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(reconciler.settings().fault_backoff) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::engine::{CallEngine, CommandOutcome, EngineCommand, EngineFuture};
    use crate::events::{Action, ChangeEvent, EventClass, EventDetail, ReconcilerSettings};
    use crate::observability::MetricsRegistry;
    use crate::registry::Registry;
    use crate::store::{keys, MemoryStore, Store};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Panics on its first run, then succeeds
    #[derive(Default)]
    struct FlakyEngine {
        runs: AtomicUsize,
    }

    impl CallEngine for FlakyEngine {
        fn run<'a>(&'a self, commands: &'a [EngineCommand]) -> EngineFuture<'a> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run == 0 {
                panic!("engine client bug");
            }
            let outcomes = commands
                .iter()
                .map(|c| CommandOutcome {
                    command: c.clone(),
                    reply: "+OK".into(),
                    success: true,
                })
                .collect();
            Box::pin(async move { Ok(outcomes) })
        }
    }

    fn push_event(store: &MemoryStore) {
        let event = ChangeEvent {
            class: EventClass::Inbound,
            action: Action::Create,
            old_id: None,
            new_id: Some("peer".into()),
            detail: EventDetail::None,
            prewait: 0,
            requestid: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let queue = keys::event_queue(keys::CALL_ENGINE, "inbound:intcon", "sbc1");
        store.push(&queue, event.to_payload().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_panicking_reconciler_is_restarted() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(
            Registry::open(
                store.clone(),
                ClusterConfig::standalone("sbc1"),
                Arc::new(MetricsRegistry::new()),
            )
            .unwrap(),
        );
        let engine = Arc::new(FlakyEngine::default());
        let reconciler = Arc::new(Reconciler::new(
            "sbc1",
            registry,
            engine.clone(),
            None,
            ReconcilerSettings {
                queue_timeout: Duration::from_millis(20),
                fault_backoff: Duration::from_millis(10),
            },
        ));

        let supervisor = Supervisor::start(vec![reconciler]);
        assert_eq!(supervisor.len(), 1);
        push_event(&store);
        push_event(&store);
        for _ in 0..200 {
            if engine.runs.load(Ordering::SeqCst) >= 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        supervisor.shutdown().await;
        assert!(engine.runs.load(Ordering::SeqCst) >= 2);
    }
}
