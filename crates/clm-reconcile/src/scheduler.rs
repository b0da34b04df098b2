//! Outer reconciliation driver
//!
//! Runs the subreconcilers for one cluster in a fixed order, turns their
//! requeue signals into a [`PassOutcome`] and decides when the next pass
//! should happen.

use crate::choose_removals::ChooseRemovals;
use crate::collaborators::ClusterReconciler;
use crate::context::ReconcileContext;
use crate::error::ReconcileError;
use crate::requeue::{Requeue, Subreconciler};
use crate::update_process_config::UpdateProcessConfig;
use clm_types::ClusterKey;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// How a pass over one cluster ended
#[derive(Debug)]
pub enum PassOutcome {
    /// Every step finished without asking for a retry.
    Converged,

    /// At least one step asked for another pass.
    Requeue {
        message: String,
        delay: Option<Duration>,
        /// Whether backoff may stretch the delay.
        elastic: bool,
    },

    /// A step failed or the pass could not start.
    Failed(ReconcileError),
}

impl PassOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, PassOutcome::Converged)
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassOutcome::Converged => f.write_str("converged"),
            PassOutcome::Requeue { message, .. } => write!(f, "requeue: {}", message),
            PassOutcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Sequences subreconcilers per cluster
pub struct Scheduler {
    reconciler: Arc<ClusterReconciler>,
    steps: Vec<Box<dyn Subreconciler>>,
    attempts: DashMap<ClusterKey, u32>,
}

impl Scheduler {
    /// Scheduler running removal selection followed by config sync.
    pub fn new(reconciler: Arc<ClusterReconciler>) -> Self {
        Self::with_steps(
            reconciler,
            vec![Box::new(ChooseRemovals), Box::new(UpdateProcessConfig)],
        )
    }

    pub fn with_steps(
        reconciler: Arc<ClusterReconciler>,
        steps: Vec<Box<dyn Subreconciler>>,
    ) -> Self {
        Self {
            reconciler,
            steps,
            attempts: DashMap::new(),
        }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Consecutive non-converged passes for a cluster.
    pub fn attempts(&self, key: &ClusterKey) -> u32 {
        self.attempts.get(key).map(|a| *a).unwrap_or(0)
    }

    /// Run every step once against a fresh read of the cluster.
    #[instrument(skip_all, fields(cluster = %key))]
    pub async fn run_pass(&self, ctx: &ReconcileContext, key: &ClusterKey) -> PassOutcome {
        let mut cluster = match ctx.run(self.reconciler.store.get(key)).await {
            Ok(cluster) => cluster,
            Err(err) => {
                error!(error = %err, "Could not read cluster");
                return PassOutcome::Failed(err);
            }
        };

        let mut deferred: Option<(String, Option<Duration>)> = None;

        for step in &self.steps {
            if let Err(err) = ctx.check() {
                return PassOutcome::Failed(err);
            }

            debug!(reconciler = step.name(), "Running subreconciler");
            match step.reconcile(ctx, &self.reconciler, &mut cluster).await {
                None => {}
                Some(Requeue::Error(err)) => {
                    error!(reconciler = step.name(), error = %err, "Subreconciler failed");
                    return PassOutcome::Failed(err);
                }
                Some(Requeue::Retry {
                    message,
                    delay,
                    delayed_requeue: true,
                }) => {
                    info!(reconciler = step.name(), message = %message, "Delaying requeue");
                    deferred = Some(match deferred {
                        // Keep the first message and the longest delay.
                        Some((first, earlier)) => (first, earlier.max(delay)),
                        None => (message, delay),
                    });
                }
                Some(Requeue::Retry {
                    message,
                    delay,
                    delayed_requeue: false,
                }) => {
                    info!(reconciler = step.name(), message = %message, "Requeueing");
                    return PassOutcome::Requeue {
                        message,
                        delay,
                        elastic: false,
                    };
                }
            }
        }

        match deferred {
            Some((message, delay)) => PassOutcome::Requeue {
                message,
                delay,
                elastic: true,
            },
            None => PassOutcome::Converged,
        }
    }

    /// Delay before the next pass, updating the cluster's retry count.
    pub fn next_delay(&self, key: &ClusterKey, outcome: &PassOutcome) -> Duration {
        let config = &self.reconciler.config;
        match outcome {
            PassOutcome::Converged => {
                self.attempts.remove(key);
                config.resync_interval()
            }
            PassOutcome::Failed(_) => config.backoff(self.bump(key)),
            PassOutcome::Requeue {
                delay,
                elastic: true,
                ..
            } => {
                // Backoff is capped; a longer requested delay is kept as is.
                let backoff = config.backoff(self.bump(key));
                delay.unwrap_or_default().max(backoff)
            }
            PassOutcome::Requeue {
                delay,
                elastic: false,
                ..
            } => delay.unwrap_or_else(|| config.min_backoff()),
        }
    }

    fn bump(&self, key: &ClusterKey) -> u32 {
        let mut attempts = self.attempts.entry(key.clone()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        *attempts
    }

    /// Reconcile `key` until `ctx` is cancelled.
    #[instrument(skip_all, fields(cluster = %key))]
    pub async fn drive(&self, ctx: &ReconcileContext, key: &ClusterKey) {
        info!(steps = ?self.step_names(), "Driving cluster");

        loop {
            let pass_ctx = ctx.with_timeout(self.reconciler.config.pass_timeout());
            let outcome = self.run_pass(&pass_ctx, key).await;
            if ctx.is_cancelled() {
                break;
            }

            let delay = self.next_delay(key, &outcome);
            match &outcome {
                PassOutcome::Converged => debug!(next_pass = ?delay, "Cluster converged"),
                PassOutcome::Failed(err) => {
                    warn!(error = %err, next_pass = ?delay, attempt = self.attempts(key), "Pass failed")
                }
                PassOutcome::Requeue { message, .. } => {
                    info!(message = %message, next_pass = ?delay, "Pass requeued")
                }
            }

            if ctx.sleep(delay).await.is_err() {
                break;
            }
        }

        info!("Stopped driving cluster");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushError;
    use crate::memory::InMemoryCollaborators;
    use async_trait::async_trait;
    use clm_types::{Cluster, ClusterSpec, ProcessCounts};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedStep {
        name: &'static str,
        signal: fn() -> Option<Requeue>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedStep {
        fn boxed(
            name: &'static str,
            signal: fn() -> Option<Requeue>,
        ) -> (Box<dyn Subreconciler>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let step = FixedStep {
                name,
                signal,
                calls: calls.clone(),
            };
            (Box::new(step), calls)
        }
    }

    #[async_trait]
    impl Subreconciler for FixedStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn reconcile(
            &self,
            _ctx: &ReconcileContext,
            _reconciler: &ClusterReconciler,
            _cluster: &mut Cluster,
        ) -> Option<Requeue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.signal)()
        }
    }

    fn setup() -> (Arc<ClusterReconciler>, ClusterKey) {
        let collaborators = InMemoryCollaborators::new();
        let key = ClusterKey::new("default", "sample");
        collaborators.store.insert(Cluster::new(
            &key,
            ClusterSpec {
                version: "7.1.25".into(),
                process_counts: ProcessCounts::new(),
            },
        ));
        (Arc::new(collaborators.reconciler()), key)
    }

    #[tokio::test]
    async fn test_default_step_order() {
        let (reconciler, _) = setup();
        let scheduler = Scheduler::new(reconciler);
        assert_eq!(
            scheduler.step_names(),
            vec!["choose_removals", "update_process_config"]
        );
    }

    #[tokio::test]
    async fn test_all_steps_done_converges() {
        let (reconciler, key) = setup();
        let (first, first_calls) = FixedStep::boxed("first", || None);
        let (second, second_calls) = FixedStep::boxed("second", || None);
        let scheduler = Scheduler::with_steps(reconciler, vec![first, second]);

        let outcome = scheduler.run_pass(&ReconcileContext::background(), &key).await;
        assert!(outcome.is_converged());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.next_delay(&key, &outcome), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_error_stops_pass() {
        let (reconciler, key) = setup();
        let (first, _) =
            FixedStep::boxed("first", || Some(Requeue::error(PushError::Rejected("x".into()))));
        let (second, second_calls) = FixedStep::boxed("second", || None);
        let scheduler = Scheduler::with_steps(reconciler, vec![first, second]);

        let outcome = scheduler.run_pass(&ReconcileContext::background(), &key).await;
        assert!(matches!(outcome, PassOutcome::Failed(_)));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delayed_retry_continues() {
        let (reconciler, key) = setup();
        let (first, _) = FixedStep::boxed("first", || {
            Some(Requeue::after("waiting", Duration::from_secs(15), true))
        });
        let (second, second_calls) = FixedStep::boxed("second", || None);
        let scheduler = Scheduler::with_steps(reconciler, vec![first, second]);

        let outcome = scheduler.run_pass(&ReconcileContext::background(), &key).await;
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        match &outcome {
            PassOutcome::Requeue { delay, elastic, .. } => {
                assert_eq!(*delay, Some(Duration::from_secs(15)));
                assert!(*elastic);
            }
            other => panic!("unexpected outcome {}", other),
        }
        assert_eq!(scheduler.next_delay(&key, &outcome), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_long_delayed_retry_is_not_capped() {
        let (reconciler, key) = setup();
        let scheduler = Scheduler::with_steps(reconciler, Vec::new());
        let long_wait = || PassOutcome::Requeue {
            message: "waiting".into(),
            delay: Some(Duration::from_secs(900)),
            elastic: true,
        };

        assert_eq!(scheduler.next_delay(&key, &long_wait()), Duration::from_secs(900));

        // Backoff alone still stops at the cap.
        for _ in 0..12 {
            scheduler.next_delay(&key, &PassOutcome::Failed(ReconcileError::DeadlineExceeded));
        }
        let short_wait = PassOutcome::Requeue {
            message: "waiting".into(),
            delay: Some(Duration::from_secs(15)),
            elastic: true,
        };
        assert_eq!(scheduler.next_delay(&key, &short_wait), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_exact_retry_stops_pass() {
        let (reconciler, key) = setup();
        let (first, _) = FixedStep::boxed("first", || {
            Some(Requeue::after("restart together", Duration::from_secs(15), false))
        });
        let (second, second_calls) = FixedStep::boxed("second", || None);
        let scheduler = Scheduler::with_steps(reconciler, vec![first, second]);

        let outcome = scheduler.run_pass(&ReconcileContext::background(), &key).await;
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.next_delay(&key, &outcome), Duration::from_secs(15));

        let message_only = PassOutcome::Requeue {
            message: "errors".into(),
            delay: None,
            elastic: false,
        };
        assert_eq!(scheduler.next_delay(&key, &message_only), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_backoff_resets_after_convergence() {
        let (reconciler, key) = setup();
        let scheduler = Scheduler::with_steps(reconciler, Vec::new());
        let failed = || PassOutcome::Failed(ReconcileError::DeadlineExceeded);

        assert_eq!(scheduler.next_delay(&key, &failed()), Duration::from_secs(1));
        assert_eq!(scheduler.next_delay(&key, &failed()), Duration::from_secs(2));
        assert_eq!(scheduler.next_delay(&key, &failed()), Duration::from_secs(4));
        assert_eq!(scheduler.attempts(&key), 3);

        scheduler.next_delay(&key, &PassOutcome::Converged);
        assert_eq!(scheduler.attempts(&key), 0);
        assert_eq!(scheduler.next_delay(&key, &failed()), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_missing_cluster_fails() {
        let (reconciler, _) = setup();
        let scheduler = Scheduler::new(reconciler);
        let outcome = scheduler
            .run_pass(&ReconcileContext::background(), &ClusterKey::new("default", "absent"))
            .await;
        assert!(matches!(outcome, PassOutcome::Failed(ReconcileError::Store(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_until_cancelled() {
        let (reconciler, key) = setup();
        let (step, calls) = FixedStep::boxed("only", || None);
        let scheduler = Arc::new(Scheduler::with_steps(reconciler, vec![step]));
        let (handle, ctx) = ReconcileContext::new();

        let task = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.drive(&ctx, &key).await })
        };

        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.cancel();
        task.await.unwrap();

        // Passes at 0s, 60s and 120s.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
