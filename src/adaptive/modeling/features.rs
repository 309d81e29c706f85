use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::adaptive::config::ProficiencyConfig;
use crate::adaptive::types::PerformanceRecord;

pub const FEATURE_DIM: usize = 8;

/// Deterministic 8-dimensional encoding of a [`PerformanceRecord`]. Every
/// component lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProficiencyFeatures {
    values: [f64; FEATURE_DIM],
}

impl ProficiencyFeatures {
    pub const NAMES: [&'static str; FEATURE_DIM] = [
        "correct_ratio",
        "response_time",
        "confidence",
        "difficulty",
        "recency",
        "question_count",
        "streak",
        "correct_x_confidence",
    ];

    pub fn extract(record: &PerformanceRecord, config: &ProficiencyConfig, now: DateTime<Utc>) -> Self {
        let correct_ratio = unit(record.correct_ratio, 0.5);
        let confidence = unit(record.confidence_score, 0.5);
        let response_time = normalize(record.avg_response_time, config.max_response_time_secs);
        let days = days_since(record.timestamp.as_deref(), now, config.default_days_since);
        let recency = (-config.recency_decay * days).exp().clamp(0.0, 1.0);
        let question_count = normalize(record.question_count as f64, config.max_question_count);
        let streak = normalize(record.streak as f64, config.max_streak);

        Self {
            values: [
                correct_ratio,
                response_time,
                confidence,
                record.difficulty.feature_value(),
                recency,
                question_count,
                streak,
                correct_ratio * confidence,
            ],
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }
}

fn unit(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// `min(cap, max(0, value)) / cap`
fn normalize(value: f64, cap: f64) -> f64 {
    if !value.is_finite() || cap <= 0.0 {
        return 0.0;
    }
    value.clamp(0.0, cap) / cap
}

/// Whole days elapsed since `timestamp`. Missing or unparseable timestamps yield
/// `default_days`; timestamps in the future count as zero.
pub fn days_since(timestamp: Option<&str>, now: DateTime<Utc>, default_days: f64) -> f64 {
    let Some(raw) = timestamp.map(str::trim).filter(|s| !s.is_empty()) else {
        return default_days;
    };

    match parse_timestamp(raw) {
        Some(at) => (now - at).num_days().max(0) as f64,
        None => {
            tracing::warn!(timestamp = %raw, "Unparseable performance timestamp, assuming {default_days} days");
            default_days
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
