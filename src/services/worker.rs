use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::JobConfig;
use crate::services::job::{CompressionJob, JobOrchestrator};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Job queue is full")]
    QueueFull(Box<CompressionJob>),

    #[error("Job queue is closed")]
    Closed(Box<CompressionJob>),
}

/// Producer side of the job queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<CompressionJob>,
}

impl JobQueue {
    /// Never waits: a full queue rejects the job.
    pub fn submit(&self, job: CompressionJob) -> Result<(), SubmitError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => SubmitError::QueueFull(Box::new(job)),
            mpsc::error::TrySendError::Closed(job) => SubmitError::Closed(Box::new(job)),
        })
    }

    /// Free places in the queue
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }
}

pub struct JobWorker {
    id: usize,
    orchestrator: JobOrchestrator,
    receiver: Arc<Mutex<mpsc::Receiver<CompressionJob>>>,
    shutdown: watch::Receiver<bool>,
}

impl JobWorker {
    pub async fn run(mut self) {
        tracing::info!("🚀 Job worker {} started", self.id);

        loop {
            // Shutdown wins over queued work
            let job = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Job worker {} shutting down", self.id);
                    self.abandon_queued().await;
                    break;
                }
                job = Self::next_job(&self.receiver) => job,
            };

            let Some(job) = job else {
                tracing::info!("Job queue closed, worker {} exiting", self.id);
                break;
            };

            // A job that has started always runs to the end
            self.orchestrator.run(job).await;
        }
    }

    /// Closes the queue and reports every job still waiting in it, so no
    /// accepted job ends without a callback.
    async fn abandon_queued(&self) {
        let pending: Vec<CompressionJob> = {
            let mut receiver = self.receiver.lock().await;
            receiver.close();
            std::iter::from_fn(|| receiver.try_recv().ok()).collect()
        };

        if pending.is_empty() {
            return;
        }

        tracing::warn!(
            "⚠️  Worker {} reporting {} queued job(s) that will not run",
            self.id,
            pending.len()
        );
        for job in pending {
            self.orchestrator.abandon(job).await;
        }
    }

    async fn next_job(receiver: &Mutex<mpsc::Receiver<CompressionJob>>) -> Option<CompressionJob> {
        receiver.lock().await.recv().await
    }
}

pub struct JobWorkerPool;

impl JobWorkerPool {
    /// Spawns `config.workers` workers over a queue of `config.queue_capacity`.
    pub fn start(
        orchestrator: JobOrchestrator,
        config: &JobConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (JobQueue, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..config.workers.max(1))
            .map(|id| {
                let worker = JobWorker {
                    id,
                    orchestrator: orchestrator.clone(),
                    receiver: receiver.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        (JobQueue { sender }, handles)
    }
}
