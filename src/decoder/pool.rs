//! Bounded pool of decode worker threads
//!
//! Jobs go through a bounded crossbeam channel. Submission never blocks: a
//! full queue is reported back to the caller so the sampling loop keeps its
//! cadence.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::error::{DiscoveryError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct DecodePool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl DecodePool {
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(DiscoveryError::Validation(
                "decode pool needs at least one worker and one queue slot".into(),
            ));
        }

        let (tx, rx) = bounded::<Job>(queue_capacity);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("decode-worker-{}", index))
                .spawn(move || {
                    // Exits once every sender is dropped and the queue drains
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                    debug!("decode worker {} exiting", index);
                })
                .map_err(|e| DiscoveryError::InvalidState(format!("failed to spawn decode worker: {}", e)))?;
            handles.push(handle);
        }

        info!("Decode pool started: {} workers, queue {}", workers, queue_capacity);
        Ok(Self {
            tx: Some(tx),
            workers: handles,
            capacity: queue_capacity,
        })
    }

    /// Queue a job, failing fast with `QueueFull` when saturated
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| DiscoveryError::InvalidState("decode pool is shut down".into()))?;
        match tx.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DiscoveryError::QueueFull(self.capacity)),
            Err(TrySendError::Disconnected(_)) => {
                Err(DiscoveryError::InvalidState("decode workers are gone".into()))
            }
        }
    }

    /// Jobs waiting for a worker
    pub fn pending(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs, let queued jobs finish and join the workers
    pub fn shutdown(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        info!("Decode pool stopped");
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_runs_jobs_and_drains_on_shutdown() {
        let mut pool = DecodePool::new(2, 16).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = done.clone();
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert!(pool.submit(|| {}).is_err());
    }

    #[test]
    fn test_full_queue_rejects() {
        let mut pool = DecodePool::new(1, 1).unwrap();
        let gate = Arc::new(Barrier::new(2));

        // Occupy the single worker
        let g = gate.clone();
        pool.submit(move || {
            g.wait();
        })
        .unwrap();
        // Wait until the worker has taken the first job off the queue
        while pool.pending() > 0 {
            thread::yield_now();
        }
        pool.submit(|| {}).unwrap();
        assert_eq!(pool.submit(|| {}), Err(DiscoveryError::QueueFull(1)));

        gate.wait();
        pool.shutdown();
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(DecodePool::new(0, 4).is_err());
    }
}
