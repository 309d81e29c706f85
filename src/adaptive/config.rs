use serde::{Deserialize, Serialize};

/// Where per-(user, topic) training runs when `predict` finds no model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    /// Train synchronously inside the read path.
    Inline,
    /// Enqueue a job and serve the default model until it lands.
    #[default]
    Background,
}

impl TrainingMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "inline" | "sync" => Self::Inline,
            _ => Self::Background,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProficiencyConfig {
    pub input_size: usize,
    pub hidden_sizes: [usize; 2],
    pub epochs: usize,
    pub learning_rate: f64,
    pub min_training_records: usize,
    pub neutral_prediction: f64,
    pub max_response_time_secs: f64,
    pub max_question_count: f64,
    pub max_streak: f64,
    pub recency_decay: f64,
    pub default_days_since: f64,
    pub seed: u64,
}

impl Default for ProficiencyConfig {
    fn default() -> Self {
        Self {
            input_size: 8,
            hidden_sizes: [16, 8],
            epochs: 50,
            learning_rate: 0.1,
            min_training_records: 3,
            neutral_prediction: 0.5,
            max_response_time_secs: 60.0,
            max_question_count: 20.0,
            max_streak: 5.0,
            recency_decay: 0.05,
            default_days_since: 30.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceWeights {
    pub correctness: f64,
    pub speed: f64,
    pub confidence: f64,
}

impl Default for PerformanceWeights {
    fn default() -> Self {
        Self {
            correctness: 0.6,
            speed: 0.2,
            confidence: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyConfig {
    pub confidence_threshold: f64,
    pub model_weight: f64,
    pub heuristic_weight: f64,
    pub performance: PerformanceWeights,
    pub max_response_time_secs: f64,
    pub streak_correct_ratio: f64,
    pub recent_question_window: usize,
    pub incorrect_confidence: f64,
    pub expected_secs_per_ordinal: f64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            model_weight: 0.7,
            heuristic_weight: 0.3,
            performance: PerformanceWeights::default(),
            max_response_time_secs: 60.0,
            streak_correct_ratio: 0.7,
            recent_question_window: 3,
            incorrect_confidence: 0.2,
            expected_secs_per_ordinal: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdStartConfig {
    pub initial_confidence: f64,
    pub confidence_step: f64,
    pub max_confidence: f64,
    pub promote_score: f64,
    pub demote_score: f64,
    pub mastery_score: f64,
    pub min_profiles_for_similarity: usize,
    pub similar_user_count: usize,
    pub subtopics_per_domain: usize,
    pub max_recommendations: usize,
    pub top_topics: usize,
    /// Seed for subtopic sampling.
    pub seed: u64,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            initial_confidence: 0.6,
            confidence_step: 0.05,
            max_confidence: 0.95,
            promote_score: 80.0,
            demote_score: 40.0,
            mastery_score: 70.0,
            min_profiles_for_similarity: 5,
            similar_user_count: 5,
            subtopics_per_domain: 2,
            max_recommendations: 10,
            top_topics: 2,
            seed: 11,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub content_based: f64,
    pub collaborative: f64,
    pub performance_based: f64,
    pub recency_based: f64,
    /// Reserved for the diversity pass; never applied to item scores.
    pub diversity: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            content_based: 0.3,
            collaborative: 0.3,
            performance_based: 0.2,
            recency_based: 0.1,
            diversity: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub weights: StrategyWeights,
    pub min_history_for_blending: usize,
    pub recency_window_days: i64,
    pub recency_frequency_cap: usize,
    pub recent_repeat_penalty: f64,
    pub min_recency_score: f64,
    pub improvement_below: f64,
    pub excel_above: f64,
    pub fallback_sample_size: usize,
    pub seed: u64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            weights: StrategyWeights::default(),
            min_history_for_blending: 3,
            recency_window_days: 7,
            recency_frequency_cap: 3,
            recent_repeat_penalty: 0.2,
            min_recency_score: 0.1,
            improvement_below: 70.0,
            excel_above: 85.0,
            fallback_sample_size: 5,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub proficiency: ProficiencyConfig,
    pub difficulty: DifficultyConfig,
    pub cold_start: ColdStartConfig,
    pub recommendation: RecommendationConfig,
    pub training_mode: TrainingMode,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AdaptiveConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_parse("ADAPTIVE_TRAINING_EPOCHS") {
            config.proficiency.epochs = val;
        }
        if let Some(val) = env_parse("ADAPTIVE_LEARNING_RATE") {
            config.proficiency.learning_rate = val;
        }
        if let Some(val) = env_parse("ADAPTIVE_MODEL_SEED") {
            config.proficiency.seed = val;
        }
        if let Some(val) = env_parse("ADAPTIVE_CONFIDENCE_THRESHOLD") {
            config.difficulty.confidence_threshold = val;
        }
        if let Some(val) = env_parse("ADAPTIVE_SIMILAR_USERS") {
            config.cold_start.similar_user_count = val;
        }
        if let Some(val) = env_parse("ADAPTIVE_RECENCY_WINDOW_DAYS") {
            config.recommendation.recency_window_days = val;
        }
        if let Ok(val) = std::env::var("ADAPTIVE_TRAINING_MODE") {
            config.training_mode = TrainingMode::parse(&val);
        }

        config
    }
}
