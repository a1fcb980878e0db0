use crate::shared::logging::EventLog;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_IDLE_WAIT: Duration = Duration::from_millis(200);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct ScheduledJob {
    due: Instant,
    job: Job,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("delayed task queue has stopped")]
    Stopped,
}

/// Cloneable handle for scheduling work on a [`DelayedTaskQueue`].
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: Sender<ScheduledJob>,
    pending: Arc<AtomicUsize>,
}

impl SchedulerHandle {
    /// Runs `job` on the worker thread once `delay` has elapsed. Returns as
    /// soon as the job is queued.
    pub fn schedule(
        &self,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> Result<(), SchedulerError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let scheduled = ScheduledJob {
            due: Instant::now() + delay,
            job: Box::new(job),
        };
        self.sender.send(scheduled).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            SchedulerError::Stopped
        })
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("pending", &self.pending())
            .finish()
    }
}

/// In-memory timer queue on one worker thread. Jobs still waiting when the
/// queue stops, or when the process exits, are dropped without running.
pub struct DelayedTaskQueue {
    handle: SchedulerHandle,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DelayedTaskQueue {
    pub fn start(log: EventLog) -> Self {
        let (sender, receiver) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = {
            let stop = Arc::clone(&stop);
            let pending = Arc::clone(&pending);
            thread::spawn(move || run_worker(receiver, stop, pending, log))
        };
        Self {
            handle: SchedulerHandle { sender, pending },
            stop,
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Blocks until no job is queued or running, or `timeout` passes.
    /// Returns whether the queue drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.handle.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DelayedTaskQueue {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn run_worker(
    receiver: Receiver<ScheduledJob>,
    stop: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    log: EventLog,
) {
    let mut order: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    let mut jobs: HashMap<u64, Job> = HashMap::new();
    let mut next_seq = 0u64;
    let mut senders_alive = true;

    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        while let Some(Reverse((due, seq))) = order.peek().copied() {
            if due > now {
                break;
            }
            order.pop();
            if let Some(job) = jobs.remove(&seq) {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    log.error("scheduler.job_panicked", format!("seq={seq}"));
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        }

        let wait = order
            .peek()
            .map(|Reverse((due, _))| due.saturating_duration_since(Instant::now()))
            .unwrap_or(MAX_IDLE_WAIT)
            .min(MAX_IDLE_WAIT);
        if !senders_alive {
            if order.is_empty() {
                break;
            }
            thread::sleep(wait);
            continue;
        }
        match receiver.recv_timeout(wait) {
            Ok(scheduled) => {
                order.push(Reverse((scheduled.due, next_seq)));
                jobs.insert(next_seq, scheduled.job);
                next_seq += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => senders_alive = false,
        }
    }

    // Jobs still sitting in the channel were counted by `schedule` too.
    let unreceived = receiver.try_iter().count();
    drop(receiver);
    let dropped = jobs.len() + unreceived;
    if dropped > 0 {
        log.warn(
            "scheduler.dropped",
            format!("jobs={dropped} unreceived={unreceived} reason=stopped"),
        );
        pending.fetch_sub(dropped, Ordering::SeqCst);
    }
}
