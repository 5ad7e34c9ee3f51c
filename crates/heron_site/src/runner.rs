//! SiteRunner — the single consumer thread of a partition's task queue.
//!
//! One dedicated OS thread per partition owns the execution context and
//! pulls tasks one at a time, so the context needs no internal locking.
//!
//! ## States
//! ```text
//! Rejoining ──(base snapshot restored)──▶ ReplayingRejoin ──(log drained)──▶ Running
//! ```
//! - `Running`: pull from the queue and execute; idle-wait when empty.
//! - `Rejoining`: the site has no base state yet. Pulled tasks run through
//!   `run_for_rejoin`, which lets them defer themselves into the task log.
//! - `ReplayingRejoin`: catch-up. Logged tasks are replayed at a ratio of
//!   `replay_ratio` per live pull so the backlog shrinks under load.
//!
//! Usage:
//! ```ignore
//! let runner = SiteRunner::new(config, queue, context, task_log);
//! let handle = runner.start();
//! // ... later ...
//! handle.stop()?;
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use heron_common::config::SiteSectionConfig;
use heron_common::error::{HeronError, HeronResult, SiteError};
use heron_common::shutdown::ShutdownSignal;
use heron_common::types::PartitionId;

use crate::tasker::{SiteContext, SiteTask, SiteTaskerQueue};

/// Durable side-channel for tasks deferred during rejoin.
///
/// The runner drains it front-to-back during `ReplayingRejoin`; ordering of
/// appended tasks must be preserved by implementations.
pub trait TaskLog: Send {
    fn append(&mut self, task: Box<dyn SiteTask>) -> HeronResult<()>;
    fn next_task(&mut self) -> HeronResult<Option<Box<dyn SiteTask>>>;
    fn is_empty(&self) -> bool;
}

/// Lifecycle state of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    Running,
    Rejoining,
    ReplayingRejoin,
}

const STATE_RUNNING: u8 = 0;
const STATE_REJOINING: u8 = 1;
const STATE_REPLAYING: u8 = 2;

impl SiteState {
    fn from_raw(raw: u8) -> SiteState {
        match raw {
            STATE_REJOINING => SiteState::Rejoining,
            STATE_REPLAYING => SiteState::ReplayingRejoin,
            _ => SiteState::Running,
        }
    }

    fn raw(self) -> u8 {
        match self {
            SiteState::Running => STATE_RUNNING,
            SiteState::Rejoining => STATE_REJOINING,
            SiteState::ReplayingRejoin => STATE_REPLAYING,
        }
    }
}

/// Shared control surface for a site's lifecycle state.
///
/// The rejoin coordinator holds a clone and advances the state when the
/// base snapshot has been restored; the runner itself performs the final
/// transition back to `Running` once the task log drains.
#[derive(Clone)]
pub struct SiteControl {
    state: Arc<AtomicU8>,
}

impl SiteControl {
    fn new(initial: SiteState) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(initial.raw())),
        }
    }

    pub fn state(&self) -> SiteState {
        SiteState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Move `Rejoining → ReplayingRejoin`. Returns `false` (and does
    /// nothing) if the site was not in `Rejoining`.
    pub fn begin_replay(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_REJOINING,
                STATE_REPLAYING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Move `ReplayingRejoin → Running`. Runner-internal.
    fn finish_replay(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_REPLAYING,
                STATE_RUNNING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Configuration for a SiteRunner.
#[derive(Debug, Clone)]
pub struct SiteRunnerConfig {
    /// Partition this site executes.
    pub partition: PartitionId,
    /// Wait between empty polls. The queue never blocks; this bounds the
    /// runner's poll cadence when idle.
    pub idle_wait: Duration,
    /// Logged tasks replayed per live pull during catch-up.
    pub replay_ratio: u32,
    /// Queue depth that triggers a backlog warning (0 = never).
    pub queue_warn_depth: usize,
    /// Start in `Rejoining` instead of `Running` (node joined an existing
    /// cluster and awaits a base snapshot).
    pub start_rejoining: bool,
}

impl SiteRunnerConfig {
    /// Build from the `[site]` config section.
    pub fn from_section(partition: PartitionId, section: &SiteSectionConfig) -> Self {
        Self {
            partition,
            idle_wait: Duration::from_millis(section.idle_wait_ms),
            replay_ratio: section.replay_ratio,
            queue_warn_depth: section.queue_warn_depth,
            start_rejoining: false,
        }
    }
}

impl Default for SiteRunnerConfig {
    fn default() -> Self {
        Self::from_section(PartitionId(0), &SiteSectionConfig::default())
    }
}

/// Metrics exposed by a running site.
#[derive(Debug, Default)]
pub struct SiteRunnerMetrics {
    /// Tasks executed on the normal path.
    pub tasks_run: AtomicU64,
    /// Tasks executed through the rejoin path.
    pub tasks_run_for_rejoin: AtomicU64,
    /// Tasks replayed out of the task log.
    pub tasks_replayed: AtomicU64,
    /// Tasks whose `run` returned an error.
    pub task_failures: AtomicU64,
    /// Polls that found the queue empty.
    pub empty_polls: AtomicU64,
    /// Task-log read failures during replay.
    pub task_log_errors: AtomicU64,
}

impl SiteRunnerMetrics {
    pub fn snapshot(&self) -> SiteRunnerMetricsSnapshot {
        SiteRunnerMetricsSnapshot {
            tasks_run: self.tasks_run.load(Ordering::Relaxed),
            tasks_run_for_rejoin: self.tasks_run_for_rejoin.load(Ordering::Relaxed),
            tasks_replayed: self.tasks_replayed.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            task_log_errors: self.task_log_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SiteRunnerMetrics`] for reporting.
#[derive(Debug, Clone)]
pub struct SiteRunnerMetricsSnapshot {
    pub tasks_run: u64,
    pub tasks_run_for_rejoin: u64,
    pub tasks_replayed: u64,
    pub task_failures: u64,
    pub empty_polls: u64,
    pub task_log_errors: u64,
}

/// Handle returned by `SiteRunner::start()`.
pub struct SiteRunnerHandle {
    partition: PartitionId,
    shutdown: ShutdownSignal,
    control: SiteControl,
    metrics: Arc<SiteRunnerMetrics>,
    join_handle: Option<JoinHandle<()>>,
}

impl SiteRunnerHandle {
    /// Signal the site to stop and wait for its thread to exit.
    pub fn stop(mut self) -> HeronResult<()> {
        self.shutdown.shutdown();
        if let Some(handle) = self.join_handle.take() {
            handle
                .join()
                .map_err(|_| SiteError::ThreadFailed(self.partition))?;
        }
        Ok(())
    }

    /// Signal the site to stop without waiting.
    pub fn signal_stop(&self) {
        self.shutdown.shutdown();
    }

    /// Control surface for rejoin-state transitions.
    pub fn control(&self) -> SiteControl {
        self.control.clone()
    }

    pub fn metrics(&self) -> &SiteRunnerMetrics {
        &self.metrics
    }

    pub fn metrics_arc(&self) -> Arc<SiteRunnerMetrics> {
        self.metrics.clone()
    }

    /// Check if the site thread is still alive.
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// The single-threaded execution loop for one partition.
///
/// Owns the execution context outright: the context moves onto the site
/// thread at `start()` and is never shared, which is what lets tasks
/// mutate through it without further synchronization.
pub struct SiteRunner<C: SiteContext + Send + 'static> {
    config: SiteRunnerConfig,
    queue: Arc<SiteTaskerQueue>,
    context: C,
    task_log: Box<dyn TaskLog>,
}

impl<C: SiteContext + Send + 'static> SiteRunner<C> {
    pub fn new(
        config: SiteRunnerConfig,
        queue: Arc<SiteTaskerQueue>,
        context: C,
        task_log: Box<dyn TaskLog>,
    ) -> Self {
        Self {
            config,
            queue,
            context,
            task_log,
        }
    }

    /// Spawn the site thread. Returns a handle for stopping and observing.
    pub fn start(self) -> HeronResult<SiteRunnerHandle> {
        let initial = if self.config.start_rejoining {
            SiteState::Rejoining
        } else {
            SiteState::Running
        };
        let partition = self.config.partition;
        let shutdown = ShutdownSignal::new();
        let control = SiteControl::new(initial);
        let metrics = Arc::new(SiteRunnerMetrics::default());

        let thread_shutdown = shutdown.clone();
        let thread_control = control.clone();
        let thread_metrics = metrics.clone();

        let join_handle = std::thread::Builder::new()
            .name(format!("site-{partition}"))
            .spawn(move || {
                self.run_loop(thread_shutdown, thread_control, thread_metrics);
            })
            .map_err(|e| {
                HeronError::Internal(format!("failed to spawn site thread for {partition}: {e}"))
            })?;

        Ok(SiteRunnerHandle {
            partition,
            shutdown,
            control,
            metrics,
            join_handle: Some(join_handle),
        })
    }

    fn run_loop(
        mut self,
        shutdown: ShutdownSignal,
        control: SiteControl,
        metrics: Arc<SiteRunnerMetrics>,
    ) {
        tracing::info!(
            partition = %self.config.partition,
            state = ?control.state(),
            "site runner starting",
        );

        let mut backlog_warned = false;

        while !shutdown.is_shutdown() {
            self.check_backlog(&mut backlog_warned);

            match control.state() {
                SiteState::Running => {
                    match self.queue.poll() {
                        Some(mut task) => {
                            self.execute(task.as_mut(), &metrics, false);
                        }
                        None => {
                            metrics.empty_polls.fetch_add(1, Ordering::Relaxed);
                            shutdown.wait_timeout(self.config.idle_wait);
                        }
                    }
                }
                SiteState::Rejoining | SiteState::ReplayingRejoin => {
                    let mut did_work = false;

                    if let Some(mut task) = self.queue.poll() {
                        let outcome =
                            task.run_for_rejoin(&mut self.context, self.task_log.as_mut());
                        metrics.tasks_run_for_rejoin.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = outcome {
                            metrics.task_failures.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                partition = %self.config.partition,
                                task = task.name(),
                                error = %e,
                                "site task failed during rejoin",
                            );
                        }
                        did_work = true;
                    }

                    did_work |= self.replay_from_task_log(&control, &metrics);

                    if !did_work {
                        metrics.empty_polls.fetch_add(1, Ordering::Relaxed);
                        shutdown.wait_timeout(self.config.idle_wait);
                    }
                }
            }
        }

        tracing::info!(partition = %self.config.partition, "site runner stopped");
    }

    /// Drain up to `replay_ratio` logged tasks, favoring catch-up over new
    /// arrivals. Returns whether any task was replayed.
    fn replay_from_task_log(
        &mut self,
        control: &SiteControl,
        metrics: &SiteRunnerMetrics,
    ) -> bool {
        if control.state() != SiteState::ReplayingRejoin {
            return false;
        }

        let mut replayed = 0u32;
        while replayed < self.config.replay_ratio {
            match self.task_log.next_task() {
                Ok(Some(mut task)) => {
                    self.execute(task.as_mut(), metrics, true);
                    replayed += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    metrics.task_log_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        partition = %self.config.partition,
                        error = %e,
                        "task log read failed during replay",
                    );
                    break;
                }
            }
        }

        if self.task_log.is_empty() && control.finish_replay() {
            tracing::info!(
                partition = %self.config.partition,
                "rejoin task log drained; resuming normal operation",
            );
        }

        replayed > 0
    }

    fn execute(&mut self, task: &mut dyn SiteTask, metrics: &SiteRunnerMetrics, replay: bool) {
        let result = task.run(&mut self.context);
        if replay {
            metrics.tasks_replayed.fetch_add(1, Ordering::Relaxed);
        } else {
            metrics.tasks_run.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = result {
            metrics.task_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                partition = %self.config.partition,
                task = task.name(),
                error = %e,
                "site task failed",
            );
        }
    }

    fn check_backlog(&self, warned: &mut bool) {
        let warn_depth = self.config.queue_warn_depth;
        if warn_depth == 0 {
            return;
        }
        let depth = self.queue.len();
        if depth >= warn_depth && !*warned {
            *warned = true;
            tracing::warn!(
                partition = %self.config.partition,
                depth,
                "site task queue backlog exceeds warning threshold",
            );
        } else if depth < warn_depth / 2 {
            *warned = false;
        }
    }
}
