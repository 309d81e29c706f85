pub mod training;

pub use training::{spawn_training_worker, TrainingJob, TrainingQueue, TrainingWorkerHandle};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Training queue is closed")]
    QueueClosed,
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
