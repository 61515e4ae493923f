//! Bounded-concurrency gate for filesystem work.
//!
//! A fixed pool of worker threads drains a FIFO channel of submitted jobs,
//! so at most `limit` jobs execute at once and excess submissions queue in
//! submission order. A job signals failure through its own captured state
//! (a counter decrement, a sink record); the worker loop itself only runs
//! jobs, so a failing job releases its slot by returning like any other.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::core::errors::{DtpError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded-parallelism dispatcher.
///
/// Known limitation, inherited from the original design: there is no
/// cancellation or timeout, so a job that never returns pins its worker
/// thread forever, permanently reducing effective parallelism by one.
pub struct IoGate {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    submitted: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
}

impl IoGate {
    /// Spawn a gate admitting at most `limit` concurrent jobs.
    pub fn new(limit: usize) -> Result<Self> {
        let limit = limit.max(1);
        let (tx, rx) = unbounded::<Job>();
        let submitted = Arc::new(AtomicU64::new(0));
        let completed = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(limit);
        for index in 0..limit {
            let rx: Receiver<Job> = rx.clone();
            let completed = Arc::clone(&completed);
            let handle = thread::Builder::new()
                .name(format!("dirtop-io-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .map_err(|e| DtpError::Runtime {
                    details: format!("failed to spawn gate worker: {e}"),
                })?;
            workers.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            workers,
            submitted,
            completed,
        })
    }

    /// Enqueue a job. Jobs are admitted strictly in submission order as
    /// workers free up. Never blocks.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = &self.tx {
            // Send only fails after disconnect, i.e. mid-drop.
            let _ = tx.send(Box::new(job));
        }
    }

    /// Jobs submitted over the gate's lifetime.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Jobs that have finished executing.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl Drop for IoGate {
    fn drop(&mut self) {
        // Disconnect the channel; workers drain whatever is still queued,
        // then exit their recv loop.
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
