//! Site task queue: priority ordering with FIFO tie-break.
//!
//! ## Ordering contract
//! - TSK-1: lower priority value wins; 0 is the most urgent class.
//! - TSK-2: two tasks offered with equal priority are polled in offer order.
//! - TSK-3: `poll` never blocks; idle strategy belongs to the consumer loop.
//!
//! The queue is a pure ordering structure. It knows nothing about task
//! semantics, imposes no capacity bound (backpressure is tracked by the
//! admission layer), and provides no mutual exclusion for task execution —
//! the runner supplies exclusive access to the execution context.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;

use heron_common::error::HeronResult;
use heron_common::types::PartitionId;

use crate::runner::TaskLog;

/// Priority class of a site task. Lower value = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    /// Node-critical control work (catalog swaps, promotion fencing).
    pub const SYSTEM: TaskPriority = TaskPriority(0);
    /// Replicated-stream apply work.
    pub const REPLICATION: TaskPriority = TaskPriority(2);
    /// Regular transaction work.
    pub const TRANSACTION: TaskPriority = TaskPriority(4);
    /// Snapshot scan/write work, yielding to transactions.
    pub const SNAPSHOT: TaskPriority = TaskPriority(6);
    /// Background housekeeping.
    pub const LOWEST: TaskPriority = TaskPriority(u8::MAX);

    pub const DEFAULT: TaskPriority = TaskPriority::TRANSACTION;
}

/// Handle to the partition-local execution engine. The runner passes it to
/// exactly one task at a time; tasks may freely mutate through it.
pub trait SiteContext {
    fn partition(&self) -> PartitionId;
}

/// A unit of work scheduled onto a site.
///
/// Tasks are inert data plus a `run` body. Retry and failure policy belong
/// to whoever produced the task; the site only orders and executes.
pub trait SiteTask: Send {
    /// Execute against the site's context. The runner guarantees exclusive
    /// access for the duration of the call.
    fn run(&mut self, ctx: &mut dyn SiteContext) -> HeronResult<()>;

    /// Execute during rejoin catch-up. Tasks that cannot run before the
    /// base snapshot lands should append a replacement of themselves to
    /// `log` instead; the default executes normally.
    fn run_for_rejoin(
        &mut self,
        ctx: &mut dyn SiteContext,
        _log: &mut dyn TaskLog,
    ) -> HeronResult<()> {
        self.run(ctx)
    }

    fn priority(&self) -> TaskPriority {
        TaskPriority::DEFAULT
    }

    /// Short label for logs and metrics.
    fn name(&self) -> &'static str {
        "site-task"
    }
}

// ---------------------------------------------------------------------------
// SiteTaskerQueue — the ordering structure
// ---------------------------------------------------------------------------

struct QueuedTask {
    priority: TaskPriority,
    // Assigned under the queue lock at offer time; strictly increasing for
    // the lifetime of the queue, which makes (priority, seq) a total order.
    seq: u64,
    task: Box<dyn SiteTask>,
}

impl QueuedTask {
    fn rank(&self) -> (TaskPriority, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // BinaryHeap is a max-heap; invert so the smallest (priority, seq)
    // surfaces first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank().cmp(&self.rank())
    }
}

struct QueueInner {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

/// Multi-producer, single-consumer priority queue feeding one site thread.
///
/// A single mutex guards both the heap and the enqueue counter; it is held
/// only for the insert/remove itself — no task code ever runs under it.
pub struct SiteTaskerQueue {
    inner: Mutex<QueueInner>,
}

impl SiteTaskerQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Enqueue a task at its own priority. Returns whether the insert was
    /// accepted — always `true` today; a bounded variant would refuse here
    /// and the producer must escalate to backpressure handling, never drop.
    pub fn offer(&self, task: Box<dyn SiteTask>) -> bool {
        let priority = task.priority();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(QueuedTask {
            priority,
            seq,
            task,
        });
        true
    }

    /// Remove and return the most urgent, earliest-offered pending task.
    /// Never blocks; returns `None` when nothing is pending.
    pub fn poll(&self) -> Option<Box<dyn SiteTask>> {
        self.inner.lock().heap.pop().map(|queued| queued.task)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }
}

impl Default for SiteTaskerQueue {
    fn default() -> Self {
        Self::new()
    }
}
