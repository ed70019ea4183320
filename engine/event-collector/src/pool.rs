//! Bounded execution pool for blocking log-client calls
//!
//! A fixed set of OS threads pulls jobs from a shared channel. Admission is
//! gated by an async semaphore sized `workers + queue_capacity`, so a full
//! pool suspends the submitting task instead of blocking its thread. Each job
//! resolves a oneshot signal; a submitter that stops waiting does not cancel
//! the job.

use crate::error::PoolError;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot, Semaphore};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size worker pool
pub struct BlockingPool {
    workers: usize,
    sender: Mutex<Option<Sender<Job>>>,
    slots: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    // Each worker owns a clone of the sender half; `recv` yields None once all have exited
    exited: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl BlockingPool {
    /// Spawn `workers` threads accepting up to `queue_capacity` waiting jobs
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (alive_tx, alive_rx) = mpsc::channel::<()>(1);

        let handles = (0..workers)
            .filter_map(|index| {
                let job_rx = job_rx.clone();
                let alive = alive_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("collector-worker-{index}"))
                    .spawn(move || {
                        let _alive = alive;
                        while let Ok(job) = job_rx.recv() {
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                tracing::warn!("Pool job panicked; worker {} continues", index);
                            }
                        }
                        tracing::debug!("Worker {} exiting", index);
                    });

                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::error!("Failed to spawn pool worker {}: {}", index, e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(
            "Execution pool started with {} workers (queue capacity {})",
            handles.len(),
            queue_capacity
        );

        Self {
            workers: handles.len(),
            sender: Mutex::new(Some(job_tx)),
            slots: Arc::new(Semaphore::new(workers + queue_capacity)),
            pending: Arc::new(AtomicUsize::new(0)),
            handles: Mutex::new(handles),
            exited: tokio::sync::Mutex::new(alive_rx),
        }
    }

    /// Number of live worker threads
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs admitted but not yet completed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Run `f` on a worker and wait for its result
    pub async fn run<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.slots.clone().acquire_owned().await.map_err(|_| PoolError::Closed)?;
        let (done_tx, done_rx) = oneshot::channel();

        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(PoolError::Closed)?;
            // Released once the job ends, even by panic, or is dropped unsent
            let pending = PendingGuard::enter(self.pending.clone());

            let job: Job = Box::new(move || {
                let output = f();
                drop(pending);
                drop(permit);
                // Receiver may be gone if the submitter stopped waiting
                let _ = done_tx.send(output);
            });

            if sender.send(job).is_err() {
                return Err(PoolError::Closed);
            }
        }

        done_rx.await.map_err(|_| PoolError::WorkerLost)
    }

    /// Stop admitting work, finish queued jobs and wait for every worker to exit
    pub async fn drain(&self) {
        self.slots.close();
        let sender = self.sender.lock().take();
        if sender.is_some() {
            tracing::info!("Draining execution pool ({} pending)", self.pending());
        }
        drop(sender);

        {
            let mut exited = self.exited.lock().await;
            while exited.recv().await.is_some() {}
        }

        // All workers have signalled exit, so these joins do not wait
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Pool worker panicked before exit");
            }
        }
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(pending: Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::AcqRel);
        Self(pending)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.slots.close();
        self.sender.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_job_output() {
        let pool = BlockingPool::new(2, 8);
        let value = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.pending(), 0);
        pool.drain().await;
    }

    #[test]
    fn test_run_outside_tokio_runtime() {
        let pool = BlockingPool::new(1, 0);
        let value = tokio_test::block_on(pool.run(|| "done"));
        assert_eq!(value, Ok("done"));
        tokio_test::block_on(pool.drain());
    }

    #[tokio::test]
    async fn test_jobs_run_off_the_caller_thread() {
        let pool = BlockingPool::new(1, 1);
        let name = pool.run(|| thread::current().name().map(str::to_string)).await.unwrap();
        assert_eq!(name.as_deref(), Some("collector-worker-0"));
        pool.drain().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded_by_worker_count() {
        let pool = Arc::new(BlockingPool::new(3, 100));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..30 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        pool.drain().await;
    }

    #[tokio::test]
    async fn test_abandoned_job_still_runs() {
        let pool = Arc::new(BlockingPool::new(1, 4));
        let completed = Arc::new(AtomicUsize::new(0));

        let counter = completed.clone();
        let waiting = tokio::spawn({
            let pool = pool.clone();
            async move {
                pool.run(move || {
                    thread::sleep(Duration::from_millis(50));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        waiting.abort();

        pool.drain().await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = BlockingPool::new(1, 4);

        let lost = pool.run(|| -> i32 { panic!("append exploded") }).await;
        assert_eq!(lost, Err(PoolError::WorkerLost));

        // The only worker survived and picks up the next job
        assert_eq!(pool.run(|| 1).await, Ok(1));
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.workers(), 1);
        pool.drain().await;
    }

    #[tokio::test]
    async fn test_drain_finishes_queued_work_and_rejects_new_work() {
        let pool = Arc::new(BlockingPool::new(2, 16));
        let seen = Arc::new(parking_lot::Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            let seen = seen.clone();
            tasks.push(tokio::spawn(async move {
                pool.run(move || {
                    thread::sleep(Duration::from_millis(2));
                    seen.lock().insert(i);
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        pool.drain().await;
        assert_eq!(seen.lock().len(), 10);
        assert!(pool.is_closed());
        assert_eq!(pool.run(|| ()).await, Err(PoolError::Closed));

        // Second drain is a no-op
        pool.drain().await;
    }
}
