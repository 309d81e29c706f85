use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    #[default]
    #[serde(alias = "adaptive")]
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// 1, 2 or 3.
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Beginner => 1,
            Self::Intermediate => 2,
            Self::Advanced => 3,
        }
    }

    pub fn harder(&self) -> Self {
        match self {
            Self::Beginner => Self::Intermediate,
            _ => Self::Advanced,
        }
    }

    pub fn easier(&self) -> Self {
        match self {
            Self::Advanced => Self::Intermediate,
            _ => Self::Beginner,
        }
    }

    /// Strict parse; `None` for anything that is not one of the three levels.
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" | "adaptive" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Lenient parse used for malformed input; unknown values become intermediate.
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or_default()
    }

    /// Encoding used by the proficiency feature vector.
    pub fn feature_value(&self) -> f64 {
        match self {
            Self::Beginner => 0.33,
            Self::Intermediate => 0.67,
            Self::Advanced => 1.0,
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_ratio() -> f64 {
    0.5
}

fn default_response_time() -> f64 {
    30.0
}

fn default_question_count() -> u32 {
    5
}

/// Outcome of one quiz attempt on a topic. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    #[serde(default = "default_ratio")]
    pub correct_ratio: f64,
    /// Seconds.
    #[serde(default = "default_response_time")]
    pub avg_response_time: f64,
    #[serde(default = "default_ratio")]
    pub confidence_score: f64,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    /// ISO-8601 / RFC 3339. Kept as text so unparseable values degrade instead of failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default = "default_question_count")]
    pub question_count: u32,
    #[serde(default)]
    pub streak: u32,
    /// Supervised label for training, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_proficiency: Option<f64>,
}

impl Default for PerformanceRecord {
    fn default() -> Self {
        Self {
            correct_ratio: default_ratio(),
            avg_response_time: default_response_time(),
            confidence_score: default_ratio(),
            difficulty: DifficultyLevel::default(),
            timestamp: None,
            question_count: default_question_count(),
            streak: 0,
            known_proficiency: None,
        }
    }
}

impl PerformanceRecord {
    pub fn new(
        correct_ratio: f64,
        avg_response_time: f64,
        confidence_score: f64,
        difficulty: DifficultyLevel,
    ) -> Self {
        Self {
            correct_ratio,
            avg_response_time,
            confidence_score,
            difficulty,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
        self
    }

    pub fn with_question_count(mut self, question_count: u32) -> Self {
        self.question_count = question_count;
        self
    }

    pub fn with_streak(mut self, streak: u32) -> Self {
        self.streak = streak;
        self
    }

    pub fn with_known_proficiency(mut self, proficiency: f64) -> Self {
        self.known_proficiency = Some(proficiency.clamp(0.0, 1.0));
        self
    }

    /// Label used when no known proficiency is attached.
    pub fn heuristic_label(&self) -> f64 {
        let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        unit(self.correct_ratio) * (0.5 + 0.5 * unit(self.confidence_score))
    }
}

/// One completed quiz as remembered by the user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub topic: String,
    /// Percentage, 0-100.
    pub score: f64,
    pub difficulty: DifficultyLevel,
    pub timestamp: DateTime<Utc>,
}

fn default_topic() -> String {
    "general".to_string()
}

/// Input to `update_profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    #[serde(default)]
    pub quiz_id: Option<String>,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuizResult {
    pub fn new(topic: impl Into<String>, score: f64, difficulty: DifficultyLevel) -> Self {
        Self {
            quiz_id: None,
            content_id: None,
            topic: topic.into(),
            score,
            difficulty,
            completed_at: None,
        }
    }

    pub fn with_content(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_quiz_id(mut self, quiz_id: impl Into<String>) -> Self {
        self.quiz_id = Some(quiz_id.into());
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub(crate) fn into_summary(self, now: DateTime<Utc>) -> QuizSummary {
        QuizSummary {
            quiz_id: self.quiz_id,
            content_id: self.content_id,
            topic: self.topic,
            score: self.score,
            difficulty: self.difficulty,
            timestamp: self.completed_at.unwrap_or(now),
        }
    }
}

/// Onboarding answers. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackgroundInfo {
    #[serde(default)]
    pub education_level: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    /// topic or domain -> self-reported difficulty level
    #[serde(default)]
    pub prior_knowledge: BTreeMap<String, String>,
    #[serde(default)]
    pub learning_goals: Vec<String>,
}

impl BackgroundInfo {
    pub fn is_empty(&self) -> bool {
        self.education_level.is_none()
            && self.interests.is_empty()
            && self.prior_knowledge.is_empty()
            && self.learning_goals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Topic,
    Subtopic,
    Mastery,
    Collaborative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecommendation {
    pub kind: RecommendationKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_domain: Option<String>,
    pub difficulty: DifficultyLevel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub background: BackgroundInfo,
    pub base_difficulty: DifficultyLevel,
    pub relevant_domains: BTreeSet<String>,
    /// Keys are always a subset of `relevant_domains`.
    pub domain_difficulties: BTreeMap<String, DifficultyLevel>,
    pub recommendations: Vec<ProfileRecommendation>,
    pub profile_confidence: f64,
    pub quiz_history: Vec<QuizSummary>,
}

impl UserProfile {
    pub fn domain_difficulty(&self, domain: &str) -> Option<DifficultyLevel> {
        self.domain_difficulties.get(domain).copied()
    }
}

/// A recommendable document or quiz source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub content_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
}

impl ContentItem {
    pub fn new(
        content_id: impl Into<String>,
        title: impl Into<String>,
        topic: impl Into<String>,
        difficulty: DifficultyLevel,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            topic: topic.into(),
            difficulty,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.tags.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub content_id: String,
    pub topic: String,
    pub difficulty: DifficultyLevel,
    pub score: f64,
    pub reason: String,
}

impl RecommendationItem {
    pub(crate) fn for_content(item: &ContentItem, score: f64, reason: impl Into<String>) -> Self {
        Self {
            content_id: item.content_id.clone(),
            topic: item.topic.clone(),
            difficulty: item.difficulty,
            score,
            reason: reason.into(),
        }
    }
}
