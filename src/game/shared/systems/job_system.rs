use anyhow::{bail, Context};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use rand::prelude::*;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_WORKER_COUNT: usize = 4;
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// An independent unit of work. Cloning a job clones the handle, not the work.
#[derive(Clone)]
pub struct Job {
    label: Arc<str>,
    work: Arc<dyn Fn() + Send + Sync + 'static>,
}

impl Job {
    pub fn new(label: &str, work: impl Fn() + Send + Sync + 'static) -> Self {
        Job {
            label: Arc::from(label),
            work: Arc::new(work),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn run(&self) {
        (self.work)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("label", &self.label).finish()
    }
}

/// State shared between the scheduler and its workers.
///
/// `outstanding` is incremented under the queue lock on submission and
/// decremented only after a popped job has finished, so it is zero exactly
/// when the queue is empty and no worker is running a job.
#[derive(Default)]
struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    outstanding: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    failed_since_barrier: AtomicUsize,
    destroying: AtomicBool,
}

impl JobQueue {
    fn pop(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    fn execute(&self, job: Job) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| job.run()));
        match result {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                log::error!("Job {} panicked while executing.", job.label());
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.failed_since_barrier.fetch_add(1, Ordering::AcqRel);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

fn worker_loop(queue: Arc<JobQueue>, jitter: Option<Duration>) {
    loop {
        let job = queue.pop();
        match job {
            Some(job) => {
                if let Some(jitter) = jitter {
                    let micros = thread_rng().gen_range(0..=jitter.as_micros() as u64);
                    std::thread::sleep(Duration::from_micros(micros));
                }
                queue.execute(job);
            }
            None => {
                // The queue is drained before a worker exits.
                if queue.destroying.load(Ordering::Acquire) {
                    break;
                }
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }
}

/// A fixed pool of worker threads pulling from one FIFO queue.
///
/// Jobs are fire-and-forget; [`JobScheduler::wait_for_jobs`] is the only
/// ordering point. With no running workers the barrier executes pending jobs
/// on the calling thread.
pub struct JobScheduler {
    queue: Arc<JobQueue>,
    worker_count: usize,
    jitter: Option<Duration>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_COUNT)
    }
}

impl JobScheduler {
    pub fn new(worker_count: usize) -> Self {
        JobScheduler {
            queue: Arc::new(JobQueue::default()),
            worker_count,
            jitter: None,
            workers: vec![],
        }
    }

    /// Makes every worker sleep for a random time up to `jitter` before each
    /// job. Takes effect on the next [`JobScheduler::begin`].
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn begin(&mut self) -> anyhow::Result<()> {
        if self.is_running() {
            log::warn!("Job scheduler is already running.");
            return Ok(());
        }
        self.queue.destroying.store(false, Ordering::Release);
        for index in 0..self.worker_count {
            let queue = self.queue.clone();
            let jitter = self.jitter;
            let worker = std::thread::Builder::new()
                .name(format!("job-worker-{}", index))
                .spawn(move || worker_loop(queue, jitter))
                .with_context(|| format!("Failed to spawn job worker {}.", index))?;
            self.workers.push(worker);
        }
        log::info!("Job scheduler started with {} worker(s).", self.worker_count);
        Ok(())
    }

    pub fn submit(&self, job: Job) {
        let mut jobs = self.queue.jobs.lock();
        jobs.push_back(job);
        self.queue.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Blocks until every job submitted so far has finished.
    ///
    /// Returns an error if any of those jobs panicked; the failure count is
    /// reset so the next barrier only reports new failures.
    pub fn wait_for_jobs(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() {
            while let Some(job) = self.queue.pop() {
                self.queue.execute(job);
            }
        }
        let backoff = Backoff::new();
        while self.queue.outstanding.load(Ordering::Acquire) != 0 {
            if backoff.is_completed() {
                std::thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
        let failed = self.queue.failed_since_barrier.swap(0, Ordering::AcqRel);
        if failed > 0 {
            bail!("{} job(s) panicked since the last barrier.", failed);
        }
        Ok(())
    }

    pub fn end(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.queue.destroying.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Failed to join job worker thread.");
            }
        }
        log::info!("Job scheduler stopped.");
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn outstanding_jobs(&self) -> usize {
        self.queue.outstanding.load(Ordering::Acquire)
    }

    pub fn completed_jobs(&self) -> usize {
        self.queue.completed.load(Ordering::Relaxed)
    }

    pub fn failed_jobs(&self) -> usize {
        self.queue.failed.load(Ordering::Relaxed)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.end();
    }
}
