//! Fixed-size worker pool used to fan simulation phases out across cores.
//!
//! The pool owns `max(1, available_parallelism - 1)` OS threads by default,
//! leaving one core for the main thread and rendering. Jobs are
//! self-contained closures pushed onto a FIFO queue; workers pull one job
//! at a time. The main thread drives a barrier discipline: submit a batch,
//! then block in [`JobPool::wait_all`] until the queue is empty and every
//! in-flight job has finished. On drop the pool stops accepting work,
//! drains everything already queued, and joins its workers, so a clean
//! shutdown never discards submitted jobs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::info;

/// A unit of work executed by one worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    /// Jobs queued or currently executing.
    active: u32,
    running: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signalled when a job is pushed or shutdown begins.
    work_ready: Condvar,
    /// Signalled when `active` returns to zero.
    idle: Condvar,
    jobs_executed: AtomicU32,
}

/// Fixed pool of worker threads with a FIFO queue and a wait-all barrier.
pub struct JobPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl JobPool {
    /// Worker count leaving one core free for the main thread.
    #[must_use]
    pub fn default_worker_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }

    /// Spawn a pool with `worker_count` threads (clamped to at least one).
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                active: 0,
                running: true,
            }),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            jobs_executed: AtomicU32::new(0),
        });

        info!(workers = worker_count, "job pool starting");

        let workers = (0..worker_count)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("outbreak-worker-{i}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Number of worker threads owned by the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job for execution by a worker thread.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.shared.queue.lock().expect("job queue poisoned");
            debug_assert!(queue.running, "submit after shutdown");
            queue.jobs.push_back(Box::new(job));
            queue.active += 1;
        }
        self.shared.work_ready.notify_one();
    }

    /// Block until the queue is empty and every in-flight job has finished.
    pub fn wait_all(&self) {
        let mut queue = self.shared.queue.lock().expect("job queue poisoned");
        while queue.active > 0 {
            queue = self.shared.idle.wait(queue).expect("job queue poisoned");
        }
    }

    /// Jobs executed since the last counter reset.
    #[must_use]
    pub fn jobs_executed(&self) -> u32 {
        self.shared.jobs_executed.load(Ordering::Relaxed)
    }

    /// Reset the executed-jobs counter.
    pub fn reset_job_counter(&self) {
        self.shared.jobs_executed.store(0, Ordering::Relaxed);
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().expect("job queue poisoned");
            queue.running = false;
        }
        self.shared.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("job pool shutdown complete");
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().expect("job queue poisoned");
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if !queue.running {
                    return;
                }
                queue = shared.work_ready.wait(queue).expect("job queue poisoned");
            }
        };

        job();
        shared.jobs_executed.fetch_add(1, Ordering::Relaxed);

        let mut queue = shared.queue.lock().expect("job queue poisoned");
        queue.active -= 1;
        if queue.active == 0 {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn default_worker_count_leaves_a_core_free() {
        assert!(JobPool::default_worker_count() >= 1);
    }

    #[test]
    fn executes_every_submitted_job() {
        let pool = JobPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..64 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_all();
        assert_eq!(counter.load(Ordering::SeqCst), 64);
        assert_eq!(pool.jobs_executed(), 64);
    }

    #[test]
    fn wait_all_is_a_barrier() {
        let pool = JobPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_all();
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn wait_all_on_an_idle_pool_returns_immediately() {
        let pool = JobPool::new(2);
        pool.wait_all();
        assert_eq!(pool.jobs_executed(), 0);
    }

    #[test]
    fn counter_reset_starts_from_zero() {
        let pool = JobPool::new(2);
        for _ in 0..5 {
            pool.submit(|| {});
        }
        pool.wait_all();
        assert_eq!(pool.jobs_executed(), 5);
        pool.reset_job_counter();
        pool.submit(|| {});
        pool.wait_all();
        assert_eq!(pool.jobs_executed(), 1);
    }

    #[test]
    fn single_worker_preserves_fifo_order() {
        let pool = JobPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            let order = Arc::clone(&order);
            pool.submit(move || {
                order.lock().unwrap().push(i);
            });
        }
        pool.wait_all();
        assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn drop_drains_already_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = JobPool::new(1);
            for _ in 0..32 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            // No wait_all: the drop path must drain the queue.
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }
}
