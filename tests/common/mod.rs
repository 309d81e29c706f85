#![allow(dead_code)]

use std::sync::Arc;

use adaptive_quiz::adaptive::config::{AdaptiveConfig, TrainingMode};
use adaptive_quiz::adaptive::decision::{Question, QuestionType};
use adaptive_quiz::adaptive::engine::{AnsweredQuestion, QuizSubmission};
use adaptive_quiz::adaptive::{ContentItem, DifficultyLevel, PerformanceRecord};
use adaptive_quiz::AdaptiveEngine;
use serde_json::json;

pub fn inline_config() -> AdaptiveConfig {
    AdaptiveConfig {
        training_mode: TrainingMode::Inline,
        ..Default::default()
    }
}

pub fn background_config() -> AdaptiveConfig {
    AdaptiveConfig {
        training_mode: TrainingMode::Background,
        ..Default::default()
    }
}

pub fn inline_engine() -> Arc<AdaptiveEngine> {
    Arc::new(AdaptiveEngine::in_memory(inline_config()))
}

pub fn record(correct_ratio: f64, difficulty: DifficultyLevel) -> PerformanceRecord {
    PerformanceRecord::new(correct_ratio, 20.0, 0.7, difficulty)
}

pub fn catalog() -> Vec<ContentItem> {
    vec![
        ContentItem::new("alg-1", "Linear equations", "algebra", DifficultyLevel::Beginner),
        ContentItem::new("alg-2", "Quadratics", "algebra", DifficultyLevel::Intermediate),
        ContentItem::new("calc-1", "Limits", "calculus", DifficultyLevel::Advanced),
        ContentItem::new("phy-1", "Newtonian forces", "physics", DifficultyLevel::Intermediate),
        ContentItem::new("prog-1", "Intro to Rust", "programming", DifficultyLevel::Beginner),
        ContentItem::new("his-1", "The Roman republic", "history", DifficultyLevel::Beginner),
        ContentItem::new("lit-1", "Reading Homer", "literature", DifficultyLevel::Advanced),
    ]
}

/// A true/false quiz with `correct` of `total` answers right.
pub fn true_false_quiz(topic: &str, difficulty: DifficultyLevel, correct: usize, total: usize) -> QuizSubmission {
    let answers = (0..total)
        .map(|i| AnsweredQuestion {
            question: Question {
                id: format!("{topic}-{i}"),
                question_type: QuestionType::TrueFalse,
                answer: json!(true),
                difficulty,
            },
            answer: json!(i < correct),
            response_time: 12.0,
        })
        .collect();

    QuizSubmission {
        quiz_id: None,
        content_id: None,
        topic: topic.to_string(),
        difficulty,
        answers,
    }
}
