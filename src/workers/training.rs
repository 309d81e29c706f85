use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::adaptive::modeling::ProficiencyEstimator;
use crate::adaptive::types::PerformanceRecord;
use crate::workers::WorkerError;

#[derive(Debug)]
pub struct TrainingJob {
    pub user_id: String,
    pub topic: String,
    pub history: Vec<PerformanceRecord>,
    ack: Option<oneshot::Sender<bool>>,
}

/// Sending half of the training queue. Cloning is cheap and sending never blocks.
#[derive(Debug, Clone)]
pub struct TrainingQueue {
    tx: mpsc::UnboundedSender<TrainingJob>,
}

impl TrainingQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrainingJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn schedule(
        &self,
        user_id: &str,
        topic: &str,
        history: Vec<PerformanceRecord>,
    ) -> Result<(), WorkerError> {
        self.send(TrainingJob {
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            history,
            ack: None,
        })
    }

    /// Like [`schedule`](Self::schedule); the receiver resolves to whether a
    /// model was trained once the worker has processed the job.
    pub fn schedule_with_ack(
        &self,
        user_id: &str,
        topic: &str,
        history: Vec<PerformanceRecord>,
    ) -> Result<oneshot::Receiver<bool>, WorkerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(TrainingJob {
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            history,
            ack: Some(ack_tx),
        })?;
        Ok(ack_rx)
    }

    fn send(&self, job: TrainingJob) -> Result<(), WorkerError> {
        self.tx.send(job).map_err(|_| WorkerError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct TrainingWorkerHandle {
    join: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TrainingWorkerHandle {
    /// Stops the loop after the job in flight, if any. Queued jobs are dropped
    /// and their pending markers cleared.
    pub async fn shutdown(self) -> Result<(), WorkerError> {
        let _ = self.shutdown_tx.send(());
        self.join.await?;
        Ok(())
    }
}

/// Runs training jobs one at a time on the blocking pool. Must be called from
/// within a tokio runtime.
pub fn spawn_training_worker(
    estimator: Arc<ProficiencyEstimator>,
    mut rx: mpsc::UnboundedReceiver<TrainingJob>,
) -> TrainingWorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let join = tokio::spawn(async move {
        info!("Training worker started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Training worker received shutdown signal");
                    break;
                }
                job = rx.recv() => {
                    let Some(job) = job else {
                        info!("Training queue closed");
                        break;
                    };
                    process_job(&estimator, job).await;
                }
            }
        }

        rx.close();
        let mut dropped = 0usize;
        while let Ok(job) = rx.try_recv() {
            estimator.clear_pending(&job.user_id, &job.topic);
            if let Some(ack) = job.ack {
                let _ = ack.send(false);
            }
            dropped += 1;
        }
        info!(dropped, "Training worker stopped");
    });

    TrainingWorkerHandle { join, shutdown_tx }
}

async fn process_job(estimator: &Arc<ProficiencyEstimator>, job: TrainingJob) {
    let TrainingJob {
        user_id,
        topic,
        history,
        ack,
    } = job;
    debug!(user_id = %user_id, topic = %topic, records = history.len(), "Processing training job");

    let est = Arc::clone(estimator);
    let (uid, tpc) = (user_id.clone(), topic.clone());
    let trained = match tokio::task::spawn_blocking(move || est.run_job(&uid, &tpc, &history)).await {
        Ok(trained) => trained,
        Err(e) => {
            error!(error = %e, user_id = %user_id, topic = %topic, "Training task panicked");
            estimator.clear_pending(&user_id, &topic);
            false
        }
    };

    if let Some(ack) = ack {
        let _ = ack.send(trained);
    }
}
