use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of worker threads executing submitted jobs.
///
/// Downloads, tile prefetches and debounced recounts all go through the
/// pool; the composition structures are only ever read from workers, so a
/// long transfer never blocks the rendering consumer. Workers drain the
/// queue and exit when the coordinator is dropped.
pub struct TaskCoordinator {
    job_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskCoordinator {
    /// Create a coordinator with the given number of worker threads.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (job_tx, job_rx) = unbounded::<Job>();

        let workers = (0..worker_count)
            .map(|i| {
                let rx: Receiver<Job> = job_rx.clone();
                thread::Builder::new()
                    .name(format!("mapstore-worker-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                        log::debug!("worker {i} exiting");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            workers,
        }
    }

    /// Create a coordinator with the default pool size (4 workers).
    pub fn with_default_pool() -> Self {
        Self::new(4)
    }

    /// Submit a job for background execution.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.job_tx.as_ref().ok_or(MapError::Cancelled)?;
        tx.send(Box::new(job)).map_err(|_| MapError::Cancelled)
    }

    /// Number of jobs waiting for a free worker.
    pub fn queued_jobs(&self) -> usize {
        self.job_tx.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }
}

impl Drop for TaskCoordinator {
    fn drop(&mut self) {
        // Closing the channel lets each worker finish its queue and exit.
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_submitted_jobs_run() {
        let coordinator = TaskCoordinator::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = counter.clone();
            coordinator
                .submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        // Dropping joins the workers after the queue drains.
        drop(coordinator);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_jobs_run_off_the_submitting_thread() {
        let coordinator = TaskCoordinator::new(1);
        let caller = std::thread::current().id();
        let (tx, rx) = crossbeam_channel::bounded(1);

        coordinator
            .submit(move || {
                let _ = tx.send(std::thread::current().id());
            })
            .unwrap();

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(caller, worker);
    }
}
