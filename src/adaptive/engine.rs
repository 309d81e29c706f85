use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::adaptive::config::{AdaptiveConfig, TrainingMode};
use crate::adaptive::decision::{grade_answer, ColdStartProfiler, DifficultyAdapter, GradedResponse, Question};
use crate::adaptive::error::{AdaptiveError, AdaptiveResult};
use crate::adaptive::modeling::{ProficiencyEstimator, RetrainOutcome};
use crate::adaptive::recommendation::RecommendationBlender;
use crate::adaptive::taxonomy::DomainTaxonomy;
use crate::adaptive::types::*;
use crate::config::Config;
use crate::storage::{InMemoryStore, ModelStore, ProfileStore, SqliteStore};
use crate::workers::{spawn_training_worker, TrainingQueue, TrainingWorkerHandle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question: Question,
    pub answer: Value,
    /// Seconds.
    pub response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSubmission {
    #[serde(default)]
    pub quiz_id: Option<String>,
    #[serde(default)]
    pub content_id: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    pub answers: Vec<AnsweredQuestion>,
}

#[derive(Debug, Clone)]
pub struct QuizOutcome {
    pub responses: Vec<GradedResponse>,
    pub record: PerformanceRecord,
    /// Percentage, 0-100.
    pub score: f64,
    pub next_difficulty: DifficultyLevel,
    /// `None` when the user has no profile yet.
    pub profile: Option<UserProfile>,
    /// `None` when the record could not be stored.
    pub retrain: Option<RetrainOutcome>,
}

/// Wires the estimator, difficulty adapter, cold-start profiler and
/// recommendation blender over shared stores.
pub struct AdaptiveEngine {
    config: AdaptiveConfig,
    taxonomy: Arc<DomainTaxonomy>,
    estimator: Arc<ProficiencyEstimator>,
    adapter: DifficultyAdapter,
    profiler: Arc<ColdStartProfiler>,
    blender: RecommendationBlender,
}

impl AdaptiveEngine {
    pub fn new(
        config: AdaptiveConfig,
        profiles: Arc<dyn ProfileStore>,
        models: Arc<dyn ModelStore>,
    ) -> Self {
        let taxonomy = Arc::new(DomainTaxonomy::standard());
        let estimator = Arc::new(ProficiencyEstimator::new(
            config.proficiency.clone(),
            config.training_mode,
            models,
        ));
        let adapter = DifficultyAdapter::new(config.difficulty.clone(), Arc::clone(&estimator));
        let profiler = Arc::new(ColdStartProfiler::new(
            config.cold_start.clone(),
            Arc::clone(&taxonomy),
            profiles,
        ));
        let blender = RecommendationBlender::new(config.recommendation.clone(), Arc::clone(&profiler));

        Self {
            config,
            taxonomy,
            estimator,
            adapter,
            profiler,
            blender,
        }
    }

    pub fn in_memory(config: AdaptiveConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::new(config, store.clone(), store)
    }

    pub fn open_sqlite<P: AsRef<Path>>(config: AdaptiveConfig, path: P) -> AdaptiveResult<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        info!(db_path = %store.db_path(), "Profile database opened");
        Ok(Self::new(config, store.clone(), store))
    }

    /// Engine for a host: `ADAPTIVE_*` tuning from the environment, SQLite
    /// when a database path is configured, in-memory otherwise.
    pub fn from_config(host: &Config) -> AdaptiveResult<Self> {
        let mut config = AdaptiveConfig::from_env();
        config.training_mode = host.training_mode;

        match &host.profile_db_path {
            Some(path) => Self::open_sqlite(config, path),
            None => {
                warn!("PROFILE_DB_PATH not set, profiles will not survive a restart");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &Arc<DomainTaxonomy> {
        &self.taxonomy
    }

    pub fn estimator(&self) -> &Arc<ProficiencyEstimator> {
        &self.estimator
    }

    pub fn adapter(&self) -> &DifficultyAdapter {
        &self.adapter
    }

    pub fn profiler(&self) -> &Arc<ColdStartProfiler> {
        &self.profiler
    }

    pub fn blender(&self) -> &RecommendationBlender {
        &self.blender
    }

    /// Spawns the background trainer when running in background mode. Must be
    /// called from within a tokio runtime.
    pub fn start_training_worker(&self) -> Option<TrainingWorkerHandle> {
        if self.config.training_mode != TrainingMode::Background {
            return None;
        }
        let (queue, rx) = TrainingQueue::new();
        if !self.estimator.attach_queue(queue) {
            warn!("Training worker already started");
            return None;
        }
        Some(spawn_training_worker(Arc::clone(&self.estimator), rx))
    }

    pub fn onboard(&self, user_id: &str, background: BackgroundInfo) -> AdaptiveResult<UserProfile> {
        self.profiler.create_profile(user_id, background)
    }

    /// Model proficiency for `current` against the stored history.
    pub fn predict_proficiency(&self, user_id: &str, topic: &str, current: &PerformanceRecord) -> f64 {
        let history = self.estimator.history(user_id, topic);
        self.estimator.predict(user_id, topic, current, &history)
    }

    pub fn next_difficulty(&self, user_id: &str, topic: &str, current: &PerformanceRecord) -> DifficultyLevel {
        let history = self.estimator.history(user_id, topic);
        self.adapter.next_difficulty(user_id, topic, current, &history)
    }

    pub fn recommend(&self, user_id: &str, available: &[ContentItem], n: usize) -> Vec<RecommendationItem> {
        self.blender.recommend(user_id, available, n)
    }

    /// Grades a completed quiz, picks the next difficulty against prior
    /// history, folds the result into the profile, then stores the record and
    /// retrains.
    pub fn submit_quiz(&self, user_id: &str, submission: QuizSubmission) -> AdaptiveResult<QuizOutcome> {
        if submission.answers.is_empty() {
            return Err(AdaptiveError::MalformedInput("quiz has no answers".to_string()));
        }

        let responses: Vec<GradedResponse> = submission
            .answers
            .iter()
            .map(|a| grade_answer(&self.config.difficulty, &a.question, &a.answer, a.response_time))
            .collect();

        let topic = submission.topic.as_str();
        let history = self.estimator.history(user_id, topic);
        let threshold = self.config.difficulty.streak_correct_ratio;
        let prior_streak = history
            .iter()
            .rev()
            .take_while(|r| r.correct_ratio > threshold)
            .count() as u32;

        let mut record = PerformanceRecord::from_responses(&responses, submission.difficulty, 0)
            .with_timestamp(Utc::now());
        if record.correct_ratio > threshold {
            record.streak = prior_streak + 1;
        }

        let score = record.correct_ratio * 100.0;
        let next_difficulty = self.adapter.next_difficulty(user_id, topic, &record, &history);

        let mut result = QuizResult::new(topic, score, submission.difficulty);
        result.quiz_id = submission.quiz_id.clone();
        result.content_id = submission.content_id.clone();
        let profile = match self.profiler.update_profile(user_id, result) {
            Ok(profile) => Some(profile),
            Err(AdaptiveError::ProfileNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let retrain = match self.estimator.record_and_retrain(user_id, topic, record.clone()) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, user_id = %user_id, topic = %topic, "Failed to record performance");
                None
            }
        };

        info!(
            user_id = %user_id,
            topic = %topic,
            score,
            next = %next_difficulty,
            "Quiz submitted"
        );

        Ok(QuizOutcome {
            responses,
            record,
            score,
            next_difficulty,
            profile,
            retrain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::decision::QuestionType;
    use serde_json::json;

    fn engine() -> AdaptiveEngine {
        let config = AdaptiveConfig {
            training_mode: TrainingMode::Inline,
            ..Default::default()
        };
        AdaptiveEngine::in_memory(config)
    }

    fn submission(correct: usize, total: usize) -> QuizSubmission {
        let answers = (0..total)
            .map(|i| AnsweredQuestion {
                question: Question {
                    id: format!("q{i}"),
                    question_type: QuestionType::TrueFalse,
                    answer: json!(true),
                    difficulty: DifficultyLevel::Beginner,
                },
                answer: json!(i < correct),
                response_time: 8.0,
            })
            .collect();
        QuizSubmission {
            quiz_id: None,
            content_id: Some("doc-1".into()),
            topic: "algebra".into(),
            difficulty: DifficultyLevel::Beginner,
            answers,
        }
    }

    #[test]
    fn submit_without_profile_still_grades() {
        let e = engine();
        let outcome = e.submit_quiz("u1", submission(4, 5)).unwrap();
        assert!((outcome.score - 80.0).abs() < 1e-9);
        assert!(outcome.profile.is_none());
        assert_eq!(outcome.record.question_count, 5);
        assert_eq!(outcome.record.streak, 1);
        assert!(matches!(outcome.retrain, Some(RetrainOutcome::NotEnoughData { .. })));
    }

    #[test]
    fn submit_updates_profile_and_trains_on_third_quiz() {
        let e = engine();
        e.onboard("u1", BackgroundInfo::default()).unwrap();
        for _ in 0..2 {
            e.submit_quiz("u1", submission(5, 5)).unwrap();
        }
        let outcome = e.submit_quiz("u1", submission(5, 5)).unwrap();
        assert_eq!(outcome.retrain, Some(RetrainOutcome::Trained));
        assert_eq!(outcome.record.streak, 3);
        let profile = outcome.profile.unwrap();
        assert_eq!(profile.quiz_history.len(), 3);
        assert_eq!(profile.quiz_history[0].content_id.as_deref(), Some("doc-1"));
        assert!(e.estimator().has_model("u1", "algebra"));
    }

    #[test]
    fn empty_quiz_is_rejected() {
        let e = engine();
        let err = e.submit_quiz("u1", submission(0, 0)).unwrap_err();
        assert!(matches!(err, AdaptiveError::MalformedInput(_)));
    }

    #[test]
    fn worker_is_not_started_in_inline_mode() {
        let e = engine();
        assert!(e.start_training_worker().is_none());
    }
}
