use std::future::Future;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;

/// One component that did not shut down cleanly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{component}: {message}")]
pub struct ComponentFailure {
    pub component: String,
    pub message: String,
}

impl ComponentFailure {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Every failure seen while shutting down, not only the first.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("shutdown finished with {} failure(s){}", .failures.len(), details(.failures))]
pub struct ShutdownError {
    pub failures: Vec<ComponentFailure>,
}

fn details(failures: &[ComponentFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("; {}", failure))
        .collect()
}

impl ShutdownError {
    pub fn single(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failures: vec![ComponentFailure::new(component, message)],
        }
    }

    /// Merge shutdown outcomes into one, keeping every failure.
    pub fn collect<I>(results: I) -> Result<(), ShutdownError>
    where
        I: IntoIterator<Item = Result<(), ShutdownError>>,
    {
        let failures: Vec<ComponentFailure> = results
            .into_iter()
            .filter_map(Result::err)
            .flat_map(|e| e.failures)
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }
}

/// Owner of background maintenance tasks (health checks, expiry purges).
///
/// Tasks share one cancellation signal and are tracked in one join set, so
/// `shut_down` can cancel them all and wait for the last one before connections
/// are closed.
pub struct Supervisor {
    name: String,
    cancel: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
    shutdown_gate: tokio::sync::Mutex<()>,
}

impl Supervisor {
    pub fn new(name: impl Into<String>) -> Self {
        let (cancel, _) = watch::channel(false);

        Self {
            name: name.into(),
            cancel,
            tasks: Mutex::new(JoinSet::new()),
            shutdown_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Number of tasks registered and not yet reaped.
    pub fn active_tasks(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Run `tick` every `period` until the supervisor is shut down.
    ///
    /// The first tick happens one full period after spawning. Must be called from
    /// within a Tokio runtime. Ignored once shutdown has started.
    pub fn spawn_periodic<F, Fut>(&self, task: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            tracing::warn!(
                supervisor = %self.name,
                task,
                "Supervisor already shut down, background task not started"
            );
            return;
        }

        let period = period.max(Duration::from_millis(1));

        self.lock_tasks().spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval yields immediately on the first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => tick().await,
                }
            }

            tracing::debug!(task, "Background task stopped");
        });

        tracing::debug!(
            supervisor = %self.name,
            task,
            period_ms = period.as_millis() as u64,
            "Background task started"
        );
    }

    /// Periodically run `probe`, logging failures without surfacing them.
    pub fn spawn_health_check<F, Fut>(&self, component: &'static str, period: Duration, probe: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.spawn_periodic(component, period, move || {
            let check = probe();
            async move {
                if let Err(e) = check.await {
                    tracing::error!(component, error = %e, "Health check failed");
                }
            }
        });
    }

    /// Cancel every task and wait up to `grace` for all of them to finish.
    ///
    /// Tasks still running after `grace` are aborted and reported, as are tasks
    /// that panicked. Calling this again after completion is a no-op.
    pub async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.shut_down_until(Instant::now() + grace).await
    }

    /// Same as `shut_down`, bounded by an absolute `deadline` so several steps of
    /// one shutdown can share a single budget.
    pub async fn shut_down_until(&self, deadline: Instant) -> Result<(), ShutdownError> {
        let Ok(_gate) = tokio::time::timeout_at(deadline, self.shutdown_gate.lock()).await else {
            return Err(ShutdownError::single(
                self.name.clone(),
                "concurrent shutdown still running at deadline",
            ));
        };

        self.cancel.send_replace(true);
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        if tasks.is_empty() {
            return Ok(());
        }

        tracing::info!(
            supervisor = %self.name,
            tasks = tasks.len(),
            "Stopping background tasks"
        );

        let mut failures = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(e))) => {
                    failures.push(ComponentFailure::new(
                        self.name.clone(),
                        format!("background task failed: {}", e),
                    ));
                }
                Ok(None) => break,
                Err(_) => {
                    failures.push(ComponentFailure::new(
                        self.name.clone(),
                        format!(
                            "{} background task(s) still running at deadline, aborted",
                            tasks.len()
                        ),
                    ));
                    tasks.abort_all();
                    break;
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(supervisor = %self.name, "Background tasks stopped");
            Ok(())
        } else {
            tracing::error!(
                supervisor = %self.name,
                failures = failures.len(),
                "Background tasks did not stop cleanly"
            );
            Err(ShutdownError { failures })
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
