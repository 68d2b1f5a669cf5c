use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::executor::ProbeExecutor;
use super::transition::{TransitionKind, classify};
use super::types::{CheckInterval, MonitorStatus, MonitorTarget, ProbeResult, TargetId};
use crate::config::EngineConfig;
use crate::database::TargetStore;
use crate::error::EngineError;
use crate::notifications::{Notifier, StatusChange};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Upper bound on probes in flight across all targets
    pub max_concurrent_probes: usize,
    /// How long `stop` waits for in-flight probes before abandoning them
    pub shutdown_timeout: Duration,
    /// Shortest interval currently accepted for new targets
    pub min_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_probes: 64,
            shutdown_timeout: Duration::from_secs(10),
            min_interval: Duration::from_secs(10),
        }
    }
}

impl From<&EngineConfig> for SchedulerOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrent_probes: config.max_concurrent_probes,
            shutdown_timeout: config.shutdown_timeout(),
            min_interval: config.min_interval(),
        }
    }
}

/// Point-in-time view of one schedule entry
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTarget {
    pub target_id: TargetId,
    pub interval: CheckInterval,
    pub next_fire: Instant,
}

/// Monitoring scheduler - keeps one timer per target and feeds due probes
/// through a bounded worker pool.
///
/// Each target's timer waits for its own probe to finish before computing
/// the next fire time (`fire + interval`, or now if that moment already
/// passed), so a target never has two probes in flight and slow probes do
/// not build a backlog.
#[derive(Clone)]
pub struct MonitoringScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    worker: Arc<ProbeWorker>,
    options: SchedulerOptions,
    state: Mutex<State>,
}

struct State {
    lifecycle: Lifecycle,
    entries: HashMap<TargetId, ScheduleEntry>,
}

enum Lifecycle {
    Idle,
    Running(Runtime),
    Stopped,
}

/// Channels and trackers that exist while the scheduler runs
struct Runtime {
    queue: mpsc::UnboundedSender<ProbeJob>,
    /// Parent of every entry's cancellation token
    shutdown: CancellationToken,
    /// Interrupts probes still running once the drain window closes
    abandon: CancellationToken,
    /// Timers and the dispatch loop
    control: TaskTracker,
    workers: TaskTracker,
}

struct ScheduleEntry {
    definition: watch::Sender<MonitorTarget>,
    next_fire: watch::Receiver<Instant>,
    /// Stops the timer; child of the runtime's shutdown token
    cancel: CancellationToken,
    /// Set only by `unregister`; results of retired entries are discarded
    retired: CancellationToken,
    /// Held by a worker while it commits a result for this target
    commit: Arc<Mutex<()>>,
}

struct ProbeJob {
    target: MonitorTarget,
    previous: MonitorStatus,
    retired: CancellationToken,
    commit: Arc<Mutex<()>>,
    /// Receives the committed status; dropped when nothing was committed
    reply: oneshot::Sender<MonitorStatus>,
}

impl MonitoringScheduler {
    pub fn new(
        store: Arc<dyn TargetStore>,
        executor: Arc<ProbeExecutor>,
        notifier: Arc<dyn Notifier>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                worker: Arc::new(ProbeWorker { store, executor, notifier }),
                options,
                state: Mutex::new(State { lifecycle: Lifecycle::Idle, entries: HashMap::new() }),
            }),
        }
    }

    /// Load every persisted target and schedule it with an immediate first fire.
    ///
    /// Returns the number of scheduled targets. A scheduler can only be
    /// started once.
    pub async fn start(&self) -> Result<usize, EngineError> {
        let mut guard = self.inner.state.lock().await;
        if !matches!(guard.lifecycle, Lifecycle::Idle) {
            return Err(EngineError::AlreadyStarted);
        }

        let targets = self
            .inner
            .worker
            .store
            .list_targets()
            .await
            .map_err(EngineError::StartupLoadFailure)?;

        let runtime = Runtime::launch(self.inner.worker.clone(), self.inner.options.max_concurrent_probes);
        let now = Instant::now();
        let probe_timeout = self.inner.worker.executor.timeout();
        let state = &mut *guard;

        for target in targets {
            if !target.interval.is_valid() {
                warn!(target_id = %target.id, "Skipping stored target with zero interval");
                continue;
            }
            if state.entries.contains_key(&target.id) {
                warn!(target_id = %target.id, "Skipping duplicate stored target");
                continue;
            }
            if below_minimum(target.interval.as_duration(), self.inner.options.min_interval, probe_timeout) {
                warn!(
                    target_id = %target.id,
                    interval = %target.interval,
                    min_interval = ?self.inner.options.min_interval,
                    probe_timeout = ?probe_timeout,
                    "Stored target interval is below the configured minimum"
                );
            }
            let id = target.id;
            state.entries.insert(id, runtime.spawn_entry(target, now));
        }

        let scheduled = state.entries.len();
        state.lifecycle = Lifecycle::Running(runtime);
        info!(targets = scheduled, "Monitoring scheduler started");
        Ok(scheduled)
    }

    /// Schedule a new target. Its first probe fires immediately.
    pub async fn register(&self, target: MonitorTarget) -> Result<(), EngineError> {
        if !target.interval.is_valid() {
            return Err(EngineError::InvalidInterval);
        }

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Lifecycle::Running(runtime) = &state.lifecycle else {
            return Err(EngineError::NotRunning);
        };
        if state.entries.contains_key(&target.id) {
            return Err(EngineError::AlreadyScheduled(target.id));
        }

        let id = target.id;
        debug!(target_id = %id, endpoint = %target.endpoint(), interval = %target.interval, "Registering target");
        state.entries.insert(id, runtime.spawn_entry(target, Instant::now()));
        Ok(())
    }

    /// Change a target's interval. The currently pending fire is kept; the
    /// new interval applies from the next computed fire time onward.
    pub async fn reschedule(&self, target_id: TargetId, interval: CheckInterval) -> Result<(), EngineError> {
        if !interval.is_valid() {
            return Err(EngineError::InvalidInterval);
        }

        self.with_entry(target_id, |entry| {
            entry.definition.send_modify(|target| target.interval = interval);
        })
        .await?;

        info!(target_id = %target_id, interval = %interval, "Rescheduled target");
        Ok(())
    }

    /// Replace a target's probe definition (protocol, url, interval).
    ///
    /// Takes effect at the next fire; the pending fire time does not move.
    pub async fn retarget(&self, target: MonitorTarget) -> Result<(), EngineError> {
        if !target.interval.is_valid() {
            return Err(EngineError::InvalidInterval);
        }

        let target_id = target.id;
        self.with_entry(target_id, move |entry| {
            entry.definition.send_modify(|current| {
                current.protocol = target.protocol;
                current.url = target.url;
                current.interval = target.interval;
            });
        })
        .await?;

        info!(target_id = %target_id, "Updated target definition");
        Ok(())
    }

    /// Remove a target from the schedule.
    ///
    /// The pending timer is cancelled before this returns, and a probe
    /// already in flight is discarded. If a result for the target is being
    /// committed right now, this waits for that commit so that nothing is
    /// written for the target afterwards. Returns `false` for unknown ids.
    pub async fn unregister(&self, target_id: TargetId) -> bool {
        let entry = self.inner.state.lock().await.entries.remove(&target_id);
        let Some(entry) = entry else {
            debug!(target_id = %target_id, "Unregister for unscheduled target ignored");
            return false;
        };

        entry.retired.cancel();
        entry.cancel.cancel();
        let _settled = entry.commit.lock().await;
        info!(target_id = %target_id, "Unregistered target");
        true
    }

    /// Stop scheduling, wait up to the shutdown timeout for in-flight probes,
    /// then abandon whatever is still running.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let runtime = {
            let mut state = self.inner.state.lock().await;
            match std::mem::replace(&mut state.lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(runtime) => {
                    state.entries.clear();
                    runtime
                }
                other => {
                    state.lifecycle = other;
                    return Err(EngineError::NotRunning);
                }
            }
        };

        runtime.shutdown.cancel();
        runtime.control.close();
        runtime.workers.close();

        let in_flight = runtime.workers.len();
        let drained = tokio::time::timeout(self.inner.options.shutdown_timeout, async {
            runtime.control.wait().await;
            runtime.workers.wait().await;
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                remaining = runtime.workers.len(),
                "Shutdown timeout elapsed, abandoning in-flight probes"
            );
            runtime.abandon.cancel();
            runtime.workers.wait().await;
        }

        info!(in_flight, "Monitoring scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.inner.state.lock().await.lifecycle, Lifecycle::Running(_))
    }

    pub async fn is_scheduled(&self, target_id: TargetId) -> bool {
        self.inner.state.lock().await.entries.contains_key(&target_id)
    }

    /// Snapshot of every live entry
    pub async fn scheduled(&self) -> Vec<ScheduledTarget> {
        let state = self.inner.state.lock().await;
        state
            .entries
            .iter()
            .map(|(id, entry)| ScheduledTarget {
                target_id: *id,
                interval: entry.definition.borrow().interval,
                next_fire: *entry.next_fire.borrow(),
            })
            .collect()
    }

    async fn with_entry<F>(&self, target_id: TargetId, update: F) -> Result<(), EngineError>
    where
        F: FnOnce(&ScheduleEntry),
    {
        let state = self.inner.state.lock().await;
        if !matches!(state.lifecycle, Lifecycle::Running(_)) {
            return Err(EngineError::NotRunning);
        }
        let entry = state.entries.get(&target_id).ok_or(EngineError::NotScheduled(target_id))?;
        update(entry);
        Ok(())
    }
}

impl Runtime {
    fn launch(worker: Arc<ProbeWorker>, max_concurrent_probes: usize) -> Self {
        let (queue, jobs) = mpsc::unbounded_channel();
        let runtime = Self {
            queue,
            shutdown: CancellationToken::new(),
            abandon: CancellationToken::new(),
            control: TaskTracker::new(),
            workers: TaskTracker::new(),
        };

        let limiter = Arc::new(Semaphore::new(max_concurrent_probes.max(1)));
        runtime.control.spawn(dispatch(
            worker,
            jobs,
            limiter,
            runtime.shutdown.clone(),
            runtime.abandon.clone(),
            runtime.workers.clone(),
        ));
        runtime
    }

    fn spawn_entry(&self, target: MonitorTarget, first_fire: Instant) -> ScheduleEntry {
        let last_status = target.status;
        let (definition, definition_rx) = watch::channel(target);
        let (next_fire_tx, next_fire) = watch::channel(first_fire);
        let cancel = self.shutdown.child_token();
        let retired = CancellationToken::new();
        let commit = Arc::new(Mutex::new(()));

        self.control.spawn(run_timer(Timer {
            definition: definition_rx,
            next_fire: next_fire_tx,
            cancel: cancel.clone(),
            retired: retired.clone(),
            commit: commit.clone(),
            queue: self.queue.clone(),
            last_status,
        }));

        ScheduleEntry { definition, next_fire, cancel, retired, commit }
    }
}

struct Timer {
    definition: watch::Receiver<MonitorTarget>,
    next_fire: watch::Sender<Instant>,
    cancel: CancellationToken,
    retired: CancellationToken,
    commit: Arc<Mutex<()>>,
    queue: mpsc::UnboundedSender<ProbeJob>,
    last_status: MonitorStatus,
}

async fn run_timer(mut timer: Timer) {
    let mut fire_at = *timer.next_fire.borrow();

    loop {
        tokio::select! {
            biased;
            _ = timer.cancel.cancelled() => break,
            _ = sleep_until(fire_at) => {}
        }

        let target = timer.definition.borrow().clone();
        let target_id = target.id;
        let (reply, committed) = oneshot::channel();
        let job = ProbeJob {
            target,
            previous: timer.last_status,
            retired: timer.retired.clone(),
            commit: timer.commit.clone(),
            reply,
        };
        if timer.queue.send(job).is_err() {
            break;
        }

        let committed = tokio::select! {
            biased;
            _ = timer.cancel.cancelled() => break,
            committed = committed => committed,
        };
        if let Ok(status) = committed {
            timer.last_status = status;
        }

        let interval = timer.definition.borrow().interval.as_duration();
        fire_at = next_fire_time(fire_at, interval, Instant::now());
        timer.next_fire.send_replace(fire_at);
        debug!(target_id = %target_id, next_in = ?fire_at.saturating_duration_since(Instant::now()), "Probe cycle finished");
    }
}

/// Next fire after a probe that fired at `fired_at` completed at `now`.
///
/// Drift-free while probes are faster than the interval; a probe that ran
/// past its next fire time yields exactly one immediate fire.
pub(crate) fn next_fire_time(fired_at: Instant, interval: Duration, now: Instant) -> Instant {
    let next = fired_at + interval;
    if next < now { now } else { next }
}

/// Stored targets may predate a tightened config; they keep running but are flagged
pub(crate) fn below_minimum(interval: Duration, min_interval: Duration, probe_timeout: Duration) -> bool {
    interval < min_interval || interval <= probe_timeout
}

async fn dispatch(
    worker: Arc<ProbeWorker>,
    mut jobs: mpsc::UnboundedReceiver<ProbeJob>,
    limiter: Arc<Semaphore>,
    shutdown: CancellationToken,
    abandon: CancellationToken,
    workers: TaskTracker,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        if job.retired.is_cancelled() {
            continue;
        }

        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            permit = limiter.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let worker = worker.clone();
        let abandon = abandon.clone();
        workers.spawn(async move {
            let _permit = permit;
            worker.run(job, abandon).await;
        });
    }

    debug!("Probe dispatcher stopped");
}

/// Executes one probe job and commits its outcome
struct ProbeWorker {
    store: Arc<dyn TargetStore>,
    executor: Arc<ProbeExecutor>,
    notifier: Arc<dyn Notifier>,
}

impl ProbeWorker {
    async fn run(&self, job: ProbeJob, abandon: CancellationToken) {
        let ProbeJob { target, previous, retired, commit, reply } = job;
        let timestamp = Utc::now();

        let outcome = tokio::select! {
            biased;
            _ = abandon.cancelled() => {
                warn!(target_id = %target.id, "Abandoned in-flight probe at shutdown");
                return;
            }
            outcome = self.executor.execute(&target) => outcome,
        };

        if retired.is_cancelled() {
            debug!(target_id = %target.id, "Target unregistered during probe, discarding result");
            return;
        }
        let guard = commit.lock().await;
        if retired.is_cancelled() {
            debug!(target_id = %target.id, "Target unregistered during probe, discarding result");
            return;
        }

        let result = ProbeResult::from_outcome(target.id, &outcome, timestamp);
        if let Err(e) = self.store.save_result(&result).await {
            error!(target_id = %target.id, error = %e, "Failed to persist probe result, skipping cycle");
            return;
        }

        let transition = classify(previous, result.status);
        if transition != TransitionKind::None {
            if let Err(e) = self.store.update_status(target.id, result.status).await {
                error!(target_id = %target.id, error = %e, "Failed to update target status");
            }
        }
        drop(guard);
        let _ = reply.send(result.status);

        debug!(
            target_id = %target.id,
            status = %result.status,
            descriptor = %result.descriptor,
            latency_ms = result.latency_ms,
            "Probe completed"
        );

        if transition.should_notify() {
            if transition == TransitionKind::Degraded {
                warn!(target_id = %target.id, endpoint = %target.endpoint(), descriptor = %result.descriptor, "Target went down");
            } else {
                info!(target_id = %target.id, endpoint = %target.endpoint(), "Target recovered");
            }
            let notifier = self.notifier.clone();
            let change = StatusChange { user_id: target.user_id.clone(), target, transition, result };
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&change).await {
                    warn!(target_id = %change.target.id, error = %e, "Failed to deliver status change notification");
                }
            });
        }
    }
}
