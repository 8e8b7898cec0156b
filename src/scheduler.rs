//! Scheduler lifecycle, pre-start buffering, and the dispatch loop.
//!
//! The [`Scheduler`] moves through three states, in one direction only:
//! `Initial` → `Running` → `Terminated`. Jobs added before [`Scheduler::start`]
//! accumulate in a FIFO buffer with no fire time computed; `start` drains the
//! buffer into the time-ordered store and spawns a background dispatch loop.
//! [`Scheduler::stop`] hands the loop a one-shot cancellation and waits for it
//! to exit before the scheduler is marked terminated.
//!
//! Three independent read-write locks guard the state, the buffer, and the
//! store, so adding and removing jobs never serializes against the loop's
//! per-second churn. The loop itself only ever touches the store lock.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

use crate::errors::CronflowError;
use crate::job::{Job, JobKey};
use crate::store::JobStore;
use crate::Result;

/// Scheduler lifecycle state. Transitions are unidirectional and absorbing:
/// a terminated scheduler is inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, not yet started; added jobs are buffered.
    Initial,
    /// The dispatch loop is live; added jobs are scheduled immediately.
    Running,
    /// Stopped; every further add/remove fails.
    Terminated,
}

/// Configuration options for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long the dispatch loop sleeps between checks while the store is
    /// empty. Lower values pick up newly added jobs sooner. Default: 500ms
    pub idle_check_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            idle_check_interval: Duration::from_millis(500),
        }
    }
}

struct DispatchHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// An in-process recurring-job scheduler.
///
/// Callers register async callbacks under a cron expression and an identity
/// token; once started, the scheduler fires each job at its next matching
/// instant, recomputes the following occurrence, and reinserts it.
///
/// # Examples
///
/// ```no_run
/// use cronflow::Scheduler;
///
/// #[tokio::main]
/// async fn main() -> cronflow::Result<()> {
///     let scheduler = Scheduler::new();
///
///     scheduler.add("*/10 * * * * *", "heartbeat", || async {
///         println!("still alive");
///         Ok(())
///     }).await?;
///
///     scheduler.start().await;
///     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
///     scheduler.stop().await;
///     Ok(())
/// }
/// ```
pub struct Scheduler {
    /// Lifecycle state; add/remove only need read access.
    state: RwLock<State>,
    /// Jobs registered before start, in registration order.
    pending: RwLock<VecDeque<Job>>,
    /// Time-ordered job store shared with the dispatch loop.
    store: Arc<RwLock<JobStore>>,
    /// Cancellation handle of the running dispatch loop.
    dispatch: Mutex<Option<DispatchHandle>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler in the `Initial` state with default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Scheduler {
            state: RwLock::new(State::Initial),
            pending: RwLock::new(VecDeque::new()),
            store: Arc::new(RwLock::new(JobStore::new())),
            dispatch: Mutex::new(None),
            config,
        }
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> State {
        *self.state.read().await
    }

    /// Registers a job under `expression` and a caller-chosen identity token.
    ///
    /// Before [`start`](Self::start) the job is buffered with no fire time;
    /// while running it is scheduled for its next occurrence immediately.
    /// The `(expression, identity)` pair is the removal key, so pick tokens
    /// that are stable across registrations of the same logical task.
    ///
    /// # Errors
    ///
    /// [`CronflowError::Terminated`] after [`stop`](Self::stop),
    /// [`CronflowError::InvalidExpression`] on a parse failure (or, while
    /// running, an expression with no occurrence within the search horizon),
    /// [`CronflowError::UnresolvableIdentity`] on a blank identity token.
    pub async fn add<F, Fut>(
        &self,
        expression: &str,
        identity: impl Into<String>,
        callback: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let state = self.state.read().await;
        match *state {
            State::Terminated => Err(CronflowError::Terminated),
            State::Initial => {
                let job = Job::new(expression, identity, callback)?;
                debug!("buffering job {} until start", job.key);
                self.pending.write().await.push_back(job);
                Ok(())
            }
            State::Running => {
                let mut job = Job::new(expression, identity, callback)?;
                let at = job.recompute_next_fire(Utc::now())?;
                debug!("scheduling job {} for {}", job.key, at);
                self.store.write().await.insert(at, job);
                Ok(())
            }
        }
    }

    /// Removes one job registered under `(expression, identity)`.
    ///
    /// Absence of a match is success. Before start this scans the buffer for
    /// the first matching entry; while running it resolves the stored bucket
    /// through the identity index, so removal works even after the job's
    /// originally scheduled instant has passed.
    ///
    /// # Errors
    ///
    /// [`CronflowError::Terminated`] after stop,
    /// [`CronflowError::UnresolvableIdentity`] on a blank identity token.
    pub async fn remove(&self, expression: &str, identity: &str) -> Result<()> {
        if identity.trim().is_empty() {
            return Err(CronflowError::UnresolvableIdentity(
                "identity token is empty".to_string(),
            ));
        }

        let state = self.state.read().await;
        match *state {
            State::Terminated => Err(CronflowError::Terminated),
            State::Initial => {
                let mut pending = self.pending.write().await;
                if let Some(pos) = pending
                    .iter()
                    .position(|job| job.key.expression == expression && job.key.identity == identity)
                {
                    pending.remove(pos);
                    debug!("removed buffered job {:?}/{:?}", expression, identity);
                }
                Ok(())
            }
            State::Running => {
                let key = JobKey::new(expression, identity);
                if self.store.write().await.remove_job(&key)? {
                    debug!("removed scheduled job {}", key);
                }
                Ok(())
            }
        }
    }

    /// Starts the scheduler: drains the pre-start buffer into the store and
    /// spawns the background dispatch loop.
    ///
    /// A no-op unless the scheduler is in the `Initial` state, so calling it
    /// twice is harmless. The state write lock is held across the whole
    /// buffer drain, so no concurrent `add` can race the transition.
    pub async fn start(&self) {
        let mut state = self.state.write().await;
        if *state != State::Initial {
            return;
        }
        *state = State::Running;

        let drained: Vec<Job> = self.pending.write().await.drain(..).collect();
        {
            let mut store = self.store.write().await;
            let now = Utc::now();
            for mut job in drained {
                match job.recompute_next_fire(now) {
                    Ok(at) => store.insert(at, job),
                    // parsed fine, but no occurrence inside the horizon
                    Err(e) => error!("dropping job {}: {}", job.key, e),
                }
            }
        }

        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(Self::dispatch_loop(
            Arc::clone(&self.store),
            self.config.clone(),
            cancelled,
        ));
        *self.dispatch.lock().await = Some(DispatchHandle { cancel, task });

        info!("scheduler started");
    }

    /// Stops the scheduler and waits for the dispatch loop to exit.
    ///
    /// A no-op once terminated. From `Running` this sends the one-shot
    /// cancellation and blocks until the loop acknowledges by exiting, so no
    /// job fires after `stop` returns. From `Initial` the buffered jobs are
    /// discarded and the loop is never started.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        match *state {
            State::Terminated => {}
            State::Running => {
                if let Some(handle) = self.dispatch.lock().await.take() {
                    // ignore a send failure: the loop can only have exited
                    // because its sender half was dropped with us
                    let _ = handle.cancel.send(());
                    if let Err(e) = handle.task.await {
                        warn!("dispatch loop ended abnormally: {}", e);
                    }
                }
                *state = State::Terminated;
                info!("scheduler stopped");
            }
            State::Initial => {
                self.pending.write().await.clear();
                *state = State::Terminated;
                info!("scheduler stopped before start; buffered jobs discarded");
            }
        }
    }

    /// The background loop: sleep until the earliest bucket is due, fire
    /// every job in it as its own task, reschedule each for its next
    /// occurrence, and repeat until cancelled.
    async fn dispatch_loop(
        store: Arc<RwLock<JobStore>>,
        config: SchedulerConfig,
        mut cancelled: oneshot::Receiver<()>,
    ) {
        loop {
            let due = {
                let store = store.read().await;
                store
                    .peek_min()
                    .map(|at| (at, store.find_exact(at).map_or(0, |bucket| bucket.len())))
            };
            let wait = match due {
                Some((at, pending)) => {
                    trace!("next bucket at {} holds {} job(s)", at, pending);
                    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
                }
                None => config.idle_check_interval,
            };

            tokio::select! {
                _ = time::sleep(wait) => {
                    let Some((at, _)) = due else { continue };
                    let mut store = store.write().await;
                    // the bucket may have been emptied by a remove while we slept
                    let Some(jobs) = store.take_bucket(at) else { continue };
                    debug!("firing {} job(s) scheduled for {}", jobs.len(), at);

                    let now = Utc::now();
                    for mut job in jobs {
                        let callback = Arc::clone(&job.callback);
                        let key = job.key.clone();
                        tokio::spawn(async move {
                            if let Err(e) = callback().await {
                                error!("job {} failed: {}", key, e);
                            }
                        });

                        match job.recompute_next_fire(now) {
                            Ok(next) => store.insert(next, job),
                            Err(e) => error!("dropping job {}: {}", job.key, e),
                        }
                    }
                }
                _ = &mut cancelled => {
                    store.write().await.clear();
                    info!("dispatch loop cancelled");
                    return;
                }
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(state) = self.state.try_read() {
            if *state == State::Running {
                warn!("scheduler dropped while still running");
            }
        }
    }
}
