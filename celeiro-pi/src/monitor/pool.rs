//! Worker pool
//!
//! A fixed set of worker tasks pulls candidate paths from the shared
//! bounded queue and runs each through the package processor. Failures stay
//! inside the worker; the loop always comes back for the next path.
//!
//! Shutdown is explicit and synchronous: the cancel token stops new
//! dequeues and `shutdown` blocks until every in-flight worker has exited —
//! items already picked up run to completion.

use crate::monitor::PackageProcessor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers over the queue receiver
    pub fn spawn(
        processor: Arc<PackageProcessor>,
        rx: mpsc::Receiver<PathBuf>,
        worker_count: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let processor = Arc::clone(&processor);
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, processor, rx, cancel).await;
            }));
        }

        info!("Worker pool started with {} workers", worker_count);
        Self { cancel, handles }
    }

    /// Stop accepting new work and wait for in-flight workers to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            handle.await.ok();
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    processor: Arc<PackageProcessor>,
    rx: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    cancel: CancellationToken,
) {
    loop {
        // Lock scope: exactly one worker waits on the queue at a time; the
        // guard drops before processing so the others can dequeue
        let path = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                path = rx.recv() => path,
            }
        };

        let Some(path) = path else {
            break;
        };

        debug!(worker = worker_id, path = %path.display(), "Worker picked up path");
        processor.process(&path).await;
    }

    debug!(worker = worker_id, "Worker stopped");
}
