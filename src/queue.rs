use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Notify;

/// Snapshot of queue activity, derived on demand.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_length: usize,
    pub running_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub total_processed: usize,
    pub max_workers: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("job queue is shut down")]
pub struct QueueClosed;

#[derive(Default)]
struct Counters {
    running: usize,
    completed: usize,
    failed: usize,
    total_processed: usize,
}

/// FIFO ingress to the worker pool with a bounded pending buffer.
///
/// `push` waits while the buffer is full; `pop` waits while it is empty and
/// returns `None` once the queue is closed and drained, which is the workers'
/// signal to exit.
pub struct JobQueue {
    pending: Mutex<VecDeque<String>>,
    capacity: usize,
    worker_count: usize,
    counters: Mutex<Counters>,
    closed: AtomicBool,
    items: Notify,
    space: Notify,
}

impl JobQueue {
    pub fn new(worker_count: usize, capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            worker_count,
            counters: Mutex::new(Counters::default()),
            closed: AtomicBool::new(false),
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Enqueue a submission id, waiting for buffer space if necessary.
    pub async fn push(&self, id: String) -> Result<(), QueueClosed> {
        loop {
            {
                let mut pending = self.pending.lock().unwrap();
                if self.closed.load(Ordering::Acquire) {
                    // Wake the next waiting producer so it can bail out too
                    self.space.notify_one();
                    return Err(QueueClosed);
                }
                if pending.len() < self.capacity {
                    pending.push_back(id);
                    self.items.notify_one();
                    return Ok(());
                }
            }
            self.space.notified().await;
        }
    }

    /// Dequeue the oldest pending id; `None` once closed and drained.
    pub async fn pop(&self) -> Option<String> {
        loop {
            {
                let mut pending = self.pending.lock().unwrap();
                if let Some(id) = pending.pop_front() {
                    self.space.notify_one();
                    return Some(id);
                }
                if self.closed.load(Ordering::Acquire) {
                    // Cascade the wake-up so every idle worker sees the close
                    self.items.notify_one();
                    return None;
                }
            }
            self.items.notified().await;
        }
    }

    /// Close the ingress. Already-buffered submissions are still delivered.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.notify_one();
        self.space.notify_one();
    }

    pub fn job_started(&self) {
        self.counters.lock().unwrap().running += 1;
    }

    pub fn job_finished(&self, succeeded: bool) {
        let mut counters = self.counters.lock().unwrap();
        counters.running = counters.running.saturating_sub(1);
        if succeeded {
            counters.completed += 1;
        } else {
            counters.failed += 1;
        }
        counters.total_processed += 1;
    }

    pub fn stats(&self) -> QueueStats {
        let queue_length = self.pending.lock().unwrap().len();
        let counters = self.counters.lock().unwrap();
        QueueStats {
            queue_length,
            running_jobs: counters.running,
            completed_jobs: counters.completed,
            failed_jobs: counters.failed,
            total_processed: counters.total_processed,
            max_workers: self.worker_count,
        }
    }
}
