use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::adaptive::config::{ProficiencyConfig, TrainingMode};
use crate::adaptive::error::{AdaptiveError, AdaptiveResult};
use crate::adaptive::modeling::features::ProficiencyFeatures;
use crate::adaptive::modeling::network::ProficiencyNetwork;
use crate::adaptive::types::PerformanceRecord;
use crate::storage::ModelStore;
use crate::workers::TrainingQueue;

type ModelKey = (String, String);

fn model_key(user_id: &str, topic: &str) -> ModelKey {
    (user_id.to_string(), topic.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainOutcome {
    Trained,
    Scheduled,
    NotEnoughData { available: usize, required: usize },
}

/// Per-(user, topic) proficiency regression with a shared untrained fallback.
///
/// Model lookup order on [`predict`](Self::predict): in-memory cache, model
/// store, training from the supplied history, shared default model.
pub struct ProficiencyEstimator {
    config: ProficiencyConfig,
    mode: TrainingMode,
    default_model: Arc<ProficiencyNetwork>,
    models: RwLock<HashMap<ModelKey, Arc<ProficiencyNetwork>>>,
    store: Arc<dyn ModelStore>,
    queue: OnceLock<TrainingQueue>,
    pending: Mutex<HashSet<ModelKey>>,
}

impl ProficiencyEstimator {
    pub fn new(config: ProficiencyConfig, mode: TrainingMode, store: Arc<dyn ModelStore>) -> Self {
        let default_model = Arc::new(ProficiencyNetwork::new(
            config.input_size,
            config.hidden_sizes,
            config.seed,
        ));
        Self {
            config,
            mode,
            default_model,
            models: RwLock::new(HashMap::new()),
            store,
            queue: OnceLock::new(),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &ProficiencyConfig {
        &self.config
    }

    pub fn mode(&self) -> TrainingMode {
        self.mode
    }

    /// Routes background training jobs to `queue`. Only the first call wins.
    pub fn attach_queue(&self, queue: TrainingQueue) -> bool {
        self.queue.set(queue).is_ok()
    }

    pub fn has_model(&self, user_id: &str, topic: &str) -> bool {
        self.models.read().contains_key(&model_key(user_id, topic))
    }

    pub fn is_training_pending(&self, user_id: &str, topic: &str) -> bool {
        self.pending.lock().contains(&model_key(user_id, topic))
    }

    pub fn history(&self, user_id: &str, topic: &str) -> Vec<PerformanceRecord> {
        match self.store.load_history(user_id, topic) {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, user_id = %user_id, topic = %topic, "Failed to load performance history");
                Vec::new()
            }
        }
    }

    /// Proficiency in [0, 1]. Never fails; internal problems yield the neutral prior.
    pub fn predict(
        &self,
        user_id: &str,
        topic: &str,
        current: &PerformanceRecord,
        history: &[PerformanceRecord],
    ) -> f64 {
        let features = ProficiencyFeatures::extract(current, &self.config, Utc::now());
        let model = self.resolve_model(user_id, topic, history);
        let raw = model.predict(features.as_slice());

        if !raw.is_finite() {
            warn!(user_id = %user_id, topic = %topic, "Non-finite proficiency prediction, using neutral prior");
            return self.config.neutral_prediction;
        }

        let proficiency = raw.clamp(0.0, 1.0);
        debug!(user_id = %user_id, topic = %topic, proficiency, "Proficiency predicted");
        proficiency
    }

    /// Cached or persisted model for the pair, without training.
    pub fn model_for(&self, user_id: &str, topic: &str) -> AdaptiveResult<Arc<ProficiencyNetwork>> {
        let key = model_key(user_id, topic);

        if let Some(model) = self.models.read().get(&key) {
            return Ok(Arc::clone(model));
        }

        match self.store.load_model(user_id, topic) {
            Ok(Some(model)) => {
                let model = Arc::new(model);
                self.models.write().insert(key, Arc::clone(&model));
                debug!(user_id = %user_id, topic = %topic, "Loaded persisted proficiency model");
                return Ok(model);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, user_id = %user_id, topic = %topic, "Failed to load persisted model");
            }
        }

        Err(AdaptiveError::ModelUnavailable {
            user_id: user_id.to_string(),
            topic: topic.to_string(),
        })
    }

    fn resolve_model(
        &self,
        user_id: &str,
        topic: &str,
        history: &[PerformanceRecord],
    ) -> Arc<ProficiencyNetwork> {
        if let Ok(model) = self.model_for(user_id, topic) {
            return model;
        }

        if history.len() < self.config.min_training_records {
            debug!(
                user_id = %user_id,
                topic = %topic,
                available = history.len(),
                required = self.config.min_training_records,
                "Not enough history to train, using default model"
            );
            return Arc::clone(&self.default_model);
        }

        let train_inline = match self.mode {
            TrainingMode::Inline => true,
            TrainingMode::Background => !self.schedule_training(user_id, topic, history),
        };

        if train_inline {
            match self.train(user_id, topic, history, None) {
                Ok(model) => return model,
                Err(e) => {
                    warn!(error = %e, user_id = %user_id, topic = %topic, "Training failed, using default model");
                }
            }
        }

        Arc::clone(&self.default_model)
    }

    /// Enqueues a background job. Returns false when no queue is attached or
    /// it has shut down; true when a job was queued or one is already pending.
    pub fn schedule_training(
        &self,
        user_id: &str,
        topic: &str,
        history: &[PerformanceRecord],
    ) -> bool {
        let Some(queue) = self.queue.get() else {
            return false;
        };

        let key = model_key(user_id, topic);
        if queue.is_closed() {
            // markers left by jobs the stopped worker never ran
            if self.pending.lock().remove(&key) {
                debug!(user_id = %user_id, topic = %topic, "Dropped stale training marker");
            }
            return false;
        }
        if !self.pending.lock().insert(key.clone()) {
            return true;
        }

        match queue.schedule(user_id, topic, history.to_vec()) {
            Ok(()) => {
                debug!(user_id = %user_id, topic = %topic, "Proficiency training scheduled");
                true
            }
            Err(e) => {
                self.pending.lock().remove(&key);
                warn!(error = %e, user_id = %user_id, topic = %topic, "Training queue unavailable");
                false
            }
        }
    }

    /// Trains a fresh network on `history`, persists it and replaces the cached
    /// model for the pair.
    ///
    /// Labels come from `known` when given (one per record), otherwise from each
    /// record's `known_proficiency` when every record carries one, otherwise
    /// from [`PerformanceRecord::heuristic_label`].
    pub fn train(
        &self,
        user_id: &str,
        topic: &str,
        history: &[PerformanceRecord],
        known: Option<&[f64]>,
    ) -> AdaptiveResult<Arc<ProficiencyNetwork>> {
        if history.len() < self.config.min_training_records {
            return Err(AdaptiveError::InsufficientData {
                what: "performance records",
                required: self.config.min_training_records,
                available: history.len(),
            });
        }

        let labels = training_labels(history, known)?;
        let now = Utc::now();
        let samples: Vec<(Vec<f64>, f64)> = history
            .iter()
            .zip(labels)
            .map(|(record, label)| {
                (ProficiencyFeatures::extract(record, &self.config, now).to_vec(), label)
            })
            .collect();

        let mut network =
            ProficiencyNetwork::new(self.config.input_size, self.config.hidden_sizes, self.config.seed);
        let loss = network.train(&samples, self.config.epochs, self.config.learning_rate)?;

        if let Err(e) = self.store.save_model(user_id, topic, &network) {
            warn!(error = %e, user_id = %user_id, topic = %topic, "Failed to persist proficiency model");
        }

        let key = model_key(user_id, topic);
        let model = Arc::new(network);
        self.models.write().insert(key.clone(), Arc::clone(&model));
        self.pending.lock().remove(&key);

        info!(
            user_id = %user_id,
            topic = %topic,
            samples = samples.len(),
            loss,
            "Proficiency model trained"
        );
        Ok(model)
    }

    /// Body of a background job. Always clears the pending marker.
    pub(crate) fn run_job(&self, user_id: &str, topic: &str, history: &[PerformanceRecord]) -> bool {
        let trained = match self.train(user_id, topic, history, None) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, user_id = %user_id, topic = %topic, "Background training failed");
                false
            }
        };
        self.clear_pending(user_id, topic);
        trained
    }

    pub(crate) fn clear_pending(&self, user_id: &str, topic: &str) {
        self.pending.lock().remove(&model_key(user_id, topic));
    }

    /// Appends `record` to the stored history and retrains once enough records
    /// exist, inline or through the queue depending on the training mode.
    pub fn record_and_retrain(
        &self,
        user_id: &str,
        topic: &str,
        record: PerformanceRecord,
    ) -> AdaptiveResult<RetrainOutcome> {
        let history = self.store.append_history(user_id, topic, &record)?;
        let required = self.config.min_training_records;

        if history.len() < required {
            debug!(user_id = %user_id, topic = %topic, available = history.len(), "History recorded, not retraining yet");
            return Ok(RetrainOutcome::NotEnoughData {
                available: history.len(),
                required,
            });
        }

        if self.mode == TrainingMode::Background && self.schedule_training(user_id, topic, &history) {
            return Ok(RetrainOutcome::Scheduled);
        }

        self.train(user_id, topic, &history, None)?;
        Ok(RetrainOutcome::Trained)
    }
}

fn training_labels(history: &[PerformanceRecord], known: Option<&[f64]>) -> AdaptiveResult<Vec<f64>> {
    if let Some(known) = known {
        if known.len() != history.len() {
            return Err(AdaptiveError::MalformedInput(format!(
                "{} labels supplied for {} records",
                known.len(),
                history.len()
            )));
        }
        return Ok(known.iter().map(|p| clamp_label(*p)).collect());
    }

    let attached: Option<Vec<f64>> = history.iter().map(|r| r.known_proficiency).collect();
    Ok(match attached {
        Some(labels) => labels.into_iter().map(clamp_label).collect(),
        None => history.iter().map(PerformanceRecord::heuristic_label).collect(),
    })
}

fn clamp_label(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}
