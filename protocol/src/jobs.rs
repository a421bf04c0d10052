//! # The Job Queue
//!
//! A typed, prioritized, bounded worker pool for everything the node does
//! off the consensus hot path: ingesting peer traffic, fetching ledgers,
//! rebuilding caches.
//!
//! Each job carries a [`JobType`], and each type maps to a fixed
//! priority. The queue runs jobs on tokio workers gated by a semaphore,
//! so a flood of low-priority ingest can never starve the machine of the
//! permits a consensus tick needs; when the queue is saturated, higher
//! priorities get the next free permit.
//!
//! Jobs are fire-and-forget closures. Anything that needs a result should
//! own a channel; the queue deliberately does not return join handles, so
//! nobody is tempted to block a worker waiting on another worker.

use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info};

/// What a job is, which decides how urgent it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// A driver tick. Nothing outranks it.
    ConsensusTick,
    /// Verify and store an incoming proposal.
    IngestProposal,
    /// Verify and store an incoming validation.
    IngestValidation,
    /// Start or advance a ledger acquisition.
    AcquireLedger,
    /// Process a `LedgerData` reply.
    LedgerData,
    /// Rebuild derived structures after an LCL change.
    UpdateCaches,
    /// Everything else.
    Generic,
}

impl JobType {
    /// Priority, higher runs first.
    pub fn priority(self) -> u8 {
        match self {
            JobType::ConsensusTick => 255,
            JobType::IngestValidation => 200,
            JobType::IngestProposal => 190,
            JobType::AcquireLedger => 150,
            JobType::LedgerData => 140,
            JobType::UpdateCaches => 100,
            JobType::Generic => 50,
        }
    }
}

type JobFn = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    job_type: JobType,
    /// Tie-break so equal priorities run in submission order.
    submitted: u64,
    work: JobFn,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.job_type.priority() == other.job_type.priority()
            && self.submitted == other.submitted
    }
}
impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.job_type
            .priority()
            .cmp(&other.job_type.priority())
            // Earlier submission wins within a priority band.
            .then_with(|| other.submitted.cmp(&self.submitted))
    }
}
impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<QueuedJob>,
    next_serial: u64,
    accepting: bool,
}

/// A bounded, prioritized worker pool on top of tokio.
pub struct JobQueue {
    inner: Arc<Mutex<Inner>>,
    permits: Arc<Semaphore>,
    idle_tx: watch::Sender<usize>,
    idle_rx: watch::Receiver<usize>,
}

impl JobQueue {
    /// A queue running at most `workers` jobs concurrently.
    pub fn new(workers: usize) -> Arc<Self> {
        let (idle_tx, idle_rx) = watch::channel(0usize);
        Arc::new(Self {
            inner: Arc::new(Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_serial: 0,
                accepting: true,
            })),
            permits: Arc::new(Semaphore::new(workers)),
            idle_tx,
            idle_rx,
        })
    }

    /// Submit a job. Returns false if the queue has been stopped.
    pub fn submit(
        self: &Arc<Self>,
        job_type: JobType,
        work: impl FnOnce() + Send + 'static,
    ) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.accepting {
                debug!(?job_type, "job refused: queue stopped");
                return false;
            }
            let serial = inner.next_serial;
            inner.next_serial += 1;
            inner.heap.push(QueuedJob {
                job_type,
                submitted: serial,
                work: Box::new(work),
            });
        }

        // One spawned waiter per submission; the semaphore caps actual
        // concurrency and the heap decides which job a freed permit runs.
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(permit) = queue.permits.clone().acquire_owned().await else {
                return;
            };
            let job = queue.inner.lock().heap.pop();
            if let Some(job) = job {
                (job.work)();
            }
            drop(permit);
            let outstanding = queue.inner.lock().heap.len();
            let _ = queue.idle_tx.send(outstanding);
        });
        true
    }

    /// Jobs waiting for a worker (not counting those running).
    pub fn backlog(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Stop accepting jobs. Already-queued jobs still run.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.accepting {
            inner.accepting = false;
            info!(backlog = inner.heap.len(), "job queue stopped");
        }
    }

    /// Wait until every queued job has drained.
    pub async fn join(&self) {
        let mut rx = self.idle_rx.clone();
        loop {
            if self.inner.lock().heap.is_empty() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
