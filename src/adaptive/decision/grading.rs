use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adaptive::config::DifficultyConfig;
use crate::adaptive::decision::difficulty::answer_confidence;
use crate::adaptive::types::{DifficultyLevel, PerformanceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    Descriptive,
    FillBlank,
    Matching,
    Sequence,
    #[serde(other)]
    Unknown,
}

/// A generated question with its expected answer.
///
/// `answer` shape depends on the type: a scalar for multiple-choice and
/// true-false, a string or list of accepted strings for fill-blank, a list of
/// key terms for descriptive, an object of pairs for matching and an array for
/// sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub answer: Value,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResponse {
    pub question_id: String,
    pub is_correct: bool,
    /// Seconds.
    pub response_time: f64,
    pub confidence: f64,
    pub difficulty: DifficultyLevel,
}

pub fn is_answer_correct(question_type: QuestionType, given: &Value, expected: &Value) -> bool {
    match question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse | QuestionType::Sequence => {
            given == expected
        }
        QuestionType::Descriptive => match (expected, given) {
            (Value::Array(terms), Value::String(text)) => {
                let text = text.to_lowercase();
                terms
                    .iter()
                    .all(|t| t.as_str().is_some_and(|t| text.contains(&t.to_lowercase())))
            }
            _ => false,
        },
        QuestionType::FillBlank => {
            let Some(given) = given.as_str() else {
                return false;
            };
            let given = given.to_lowercase();
            match expected {
                Value::Array(accepted) => accepted
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|a| a.to_lowercase() == given),
                Value::String(accepted) => accepted.to_lowercase() == given,
                _ => false,
            }
        }
        QuestionType::Matching => match (expected, given) {
            (Value::Object(pairs), Value::Object(answer)) => {
                pairs.iter().all(|(k, v)| answer.get(k) == Some(v))
            }
            _ => false,
        },
        QuestionType::Unknown => false,
    }
}

pub fn grade_answer(
    config: &DifficultyConfig,
    question: &Question,
    answer: &Value,
    response_time: f64,
) -> GradedResponse {
    let is_correct = is_answer_correct(question.question_type, answer, &question.answer);
    GradedResponse {
        question_id: question.id.clone(),
        is_correct,
        response_time,
        confidence: answer_confidence(config, is_correct, response_time, question.difficulty),
        difficulty: question.difficulty,
    }
}

impl PerformanceRecord {
    /// Aggregates one completed quiz. Empty input gives a zero-correct record
    /// with default pace and confidence.
    pub fn from_responses(responses: &[GradedResponse], difficulty: DifficultyLevel, streak: u32) -> Self {
        let mut record = PerformanceRecord {
            difficulty,
            streak,
            question_count: responses.len() as u32,
            correct_ratio: 0.0,
            ..Default::default()
        };
        if responses.is_empty() {
            return record;
        }

        let n = responses.len() as f64;
        record.correct_ratio = responses.iter().filter(|r| r.is_correct).count() as f64 / n;
        record.avg_response_time = responses.iter().map(|r| r.response_time).sum::<f64>() / n;
        record.confidence_score = responses.iter().map(|r| r.confidence).sum::<f64>() / n;
        record
    }
}
