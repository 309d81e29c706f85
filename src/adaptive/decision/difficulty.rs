use std::sync::Arc;

use tracing::{debug, info};

use crate::adaptive::config::DifficultyConfig;
use crate::adaptive::modeling::ProficiencyEstimator;
use crate::adaptive::types::{DifficultyLevel, PerformanceRecord};

/// Components of one proficiency estimate, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProficiencyEstimate {
    pub performance_score: f64,
    pub model: f64,
    pub heuristic: f64,
    pub blended: f64,
}

/// Live-quiz difficulty policy: blends model and heuristic proficiency, then
/// applies the ordinal-scaled threshold rule.
pub struct DifficultyAdapter {
    config: DifficultyConfig,
    estimator: Arc<ProficiencyEstimator>,
}

impl DifficultyAdapter {
    pub fn new(config: DifficultyConfig, estimator: Arc<ProficiencyEstimator>) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &DifficultyConfig {
        &self.config
    }

    pub fn estimator(&self) -> &Arc<ProficiencyEstimator> {
        &self.estimator
    }

    /// `0.6*correct + 0.2*max(0, 1 - t/60) + 0.2*confidence`, clamped to [0, 1].
    pub fn performance_score(&self, record: &PerformanceRecord) -> f64 {
        let w = &self.config.performance;
        let correct = finite_unit(record.correct_ratio);
        let confidence = finite_unit(record.confidence_score);
        let time_factor = if record.avg_response_time.is_finite() {
            (1.0 - record.avg_response_time / self.config.max_response_time_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };

        (w.correctness * correct + w.speed * time_factor + w.confidence * confidence).clamp(0.0, 1.0)
    }

    /// Model input for the current attempt: the performance score stands in for
    /// the correct ratio, and streak, question volume and pace come from history.
    pub fn derive_model_input(
        &self,
        performance_score: f64,
        difficulty: DifficultyLevel,
        history: &[PerformanceRecord],
    ) -> PerformanceRecord {
        let mut input = PerformanceRecord {
            correct_ratio: performance_score,
            difficulty,
            ..Default::default()
        };

        if history.is_empty() {
            return input;
        }

        input.streak = history
            .iter()
            .rev()
            .take_while(|r| r.correct_ratio > self.config.streak_correct_ratio)
            .count() as u32;

        let window = self.config.recent_question_window.min(history.len());
        input.question_count = history[history.len() - window..]
            .iter()
            .map(|r| r.question_count)
            .sum();

        input.avg_response_time =
            history.iter().map(|r| r.avg_response_time).sum::<f64>() / history.len() as f64;

        input
    }

    pub fn estimate_proficiency(
        &self,
        user_id: &str,
        topic: &str,
        current: &PerformanceRecord,
        history: &[PerformanceRecord],
    ) -> ProficiencyEstimate {
        let performance_score = self.performance_score(current);
        let input = self.derive_model_input(performance_score, current.difficulty, history);
        let model = self.estimator.predict(user_id, topic, &input, history);
        let heuristic = performance_score * (current.difficulty.ordinal() as f64 / 3.0);
        let blended = (self.config.model_weight * model + self.config.heuristic_weight * heuristic)
            .clamp(0.0, 1.0);

        debug!(
            user_id = %user_id,
            topic = %topic,
            performance_score,
            model,
            heuristic,
            blended,
            "Proficiency estimated"
        );

        ProficiencyEstimate {
            performance_score,
            model,
            heuristic,
            blended,
        }
    }

    pub fn next_difficulty(
        &self,
        user_id: &str,
        topic: &str,
        current: &PerformanceRecord,
        history: &[PerformanceRecord],
    ) -> DifficultyLevel {
        let estimate = self.estimate_proficiency(user_id, topic, current, history);
        let next = self.apply_threshold_rule(estimate.blended, current.difficulty);
        info!(
            user_id = %user_id,
            topic = %topic,
            current = %current.difficulty,
            next = %next,
            proficiency = estimate.blended,
            "Next difficulty computed"
        );
        next
    }

    /// `ordinal * confidence_threshold`. Above 1.0 for intermediate and
    /// advanced, so a clamped proficiency never reaches it there.
    pub fn move_up_threshold(&self, level: DifficultyLevel) -> f64 {
        level.ordinal() as f64 * self.config.confidence_threshold
    }

    pub fn move_down_threshold(&self, level: DifficultyLevel) -> f64 {
        (level.ordinal() as f64 - 1.0) * self.config.confidence_threshold
    }

    /// Up one step when `proficiency >= move_up_threshold`, down one step when
    /// `proficiency < move_down_threshold`, otherwise unchanged.
    pub fn apply_threshold_rule(&self, proficiency: f64, current: DifficultyLevel) -> DifficultyLevel {
        if proficiency >= self.move_up_threshold(current) && current != DifficultyLevel::Advanced {
            current.harder()
        } else if proficiency < self.move_down_threshold(current) && current != DifficultyLevel::Beginner {
            current.easier()
        } else {
            current
        }
    }
}

fn finite_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Confidence for one graded answer: a fixed floor when wrong, otherwise
/// `0.5 + 0.5*min(1, expected/actual)` with `expected = 10s * ordinal`.
pub fn answer_confidence(
    config: &DifficultyConfig,
    is_correct: bool,
    response_time: f64,
    difficulty: DifficultyLevel,
) -> f64 {
    if !is_correct {
        return config.incorrect_confidence;
    }
    let expected = config.expected_secs_per_ordinal * difficulty.ordinal() as f64;
    let actual = if response_time.is_finite() {
        response_time.max(1.0)
    } else {
        f64::MAX
    };
    0.5 + 0.5 * (expected / actual).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::config::{ProficiencyConfig, TrainingMode};
    use crate::storage::InMemoryStore;

    fn adapter() -> DifficultyAdapter {
        let estimator = Arc::new(ProficiencyEstimator::new(
            ProficiencyConfig::default(),
            TrainingMode::Inline,
            Arc::new(InMemoryStore::new()),
        ));
        DifficultyAdapter::new(DifficultyConfig::default(), estimator)
    }

    #[test]
    fn performance_score_matches_worked_example() {
        let record = PerformanceRecord::new(0.9, 15.0, 0.8, DifficultyLevel::Intermediate);
        assert!((adapter().performance_score(&record) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn slow_answers_contribute_no_speed() {
        let record = PerformanceRecord::new(1.0, 300.0, 1.0, DifficultyLevel::Beginner);
        assert!((adapter().performance_score(&record) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn strong_intermediate_never_moves_up() {
        let a = adapter();
        let record = PerformanceRecord::new(0.9, 15.0, 0.8, DifficultyLevel::Intermediate);
        assert_ne!(a.next_difficulty("u1", "algebra", &record, &[]), DifficultyLevel::Advanced);
        assert!(a.move_up_threshold(DifficultyLevel::Intermediate) > 1.0);
        assert_eq!(a.apply_threshold_rule(1.0, DifficultyLevel::Intermediate), DifficultyLevel::Intermediate);
    }

    #[test]
    fn threshold_rule_boundaries() {
        let a = adapter();
        assert_eq!(a.apply_threshold_rule(0.7, DifficultyLevel::Beginner), DifficultyLevel::Intermediate);
        assert_eq!(a.apply_threshold_rule(0.69, DifficultyLevel::Beginner), DifficultyLevel::Beginner);
        assert_eq!(a.apply_threshold_rule(0.69, DifficultyLevel::Intermediate), DifficultyLevel::Beginner);
        assert_eq!(a.apply_threshold_rule(0.7, DifficultyLevel::Intermediate), DifficultyLevel::Intermediate);
        assert_eq!(a.apply_threshold_rule(1.0, DifficultyLevel::Advanced), DifficultyLevel::Intermediate);
        assert_eq!(a.apply_threshold_rule(0.0, DifficultyLevel::Beginner), DifficultyLevel::Beginner);
    }

    #[test]
    fn model_input_derives_from_history() {
        let a = adapter();
        let history = vec![
            PerformanceRecord::new(0.5, 10.0, 0.5, DifficultyLevel::Beginner).with_question_count(4),
            PerformanceRecord::new(0.8, 20.0, 0.5, DifficultyLevel::Beginner).with_question_count(6),
            PerformanceRecord::new(0.9, 30.0, 0.5, DifficultyLevel::Beginner).with_question_count(8),
            PerformanceRecord::new(0.75, 40.0, 0.5, DifficultyLevel::Beginner).with_question_count(10),
        ];
        let input = a.derive_model_input(0.6, DifficultyLevel::Beginner, &history);
        assert_eq!(input.correct_ratio, 0.6);
        assert_eq!(input.streak, 3);
        assert_eq!(input.question_count, 24);
        assert!((input.avg_response_time - 25.0).abs() < 1e-9);
        assert!(input.timestamp.is_none());
    }

    #[test]
    fn answer_confidence_follows_pace() {
        let c = DifficultyConfig::default();
        assert_eq!(answer_confidence(&c, false, 1.0, DifficultyLevel::Advanced), 0.2);
        assert_eq!(answer_confidence(&c, true, 5.0, DifficultyLevel::Beginner), 1.0);
        assert!((answer_confidence(&c, true, 40.0, DifficultyLevel::Intermediate) - 0.75).abs() < 1e-12);
        assert_eq!(answer_confidence(&c, true, 0.0, DifficultyLevel::Beginner), 1.0);
    }
}
