use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::adaptive::config::RecommendationConfig;
use crate::adaptive::decision::ColdStartProfiler;
use crate::adaptive::recommendation::tfidf::TfidfModel;
use crate::adaptive::similarity::cosine_similarity;
use crate::adaptive::types::{ContentItem, DifficultyLevel, UserProfile};

/// Everything a strategy may consult for one request.
pub struct StrategyContext<'a> {
    pub profile: &'a UserProfile,
    pub profiler: &'a ColdStartProfiler,
    pub config: &'a RecommendationConfig,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyScore {
    pub content_id: String,
    pub score: f64,
    pub reason: String,
}

impl StrategyScore {
    fn new(item: &ContentItem, score: f64, reason: impl Into<String>) -> Self {
        Self {
            content_id: item.content_id.clone(),
            score,
            reason: reason.into(),
        }
    }
}

/// One independent scoring pass over the available content. Items a strategy
/// leaves out contribute nothing to the blend.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, ctx: &StrategyContext<'_>, available: &[ContentItem]) -> Vec<StrategyScore>;
}

fn sort_desc(scores: &mut [StrategyScore]) {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
}

fn random_fallback(
    rng: &Mutex<ChaCha8Rng>,
    available: &[ContentItem],
    sample_size: usize,
    reason: &str,
) -> Vec<StrategyScore> {
    let mut rng = rng.lock();
    available
        .choose_multiple(&mut *rng, sample_size)
        .map(|item| StrategyScore::new(item, 0.5, reason))
        .collect()
}

// ============================================================
// Content-based
// ============================================================

/// TF-IDF cosine similarity between the user's interests plus quiz topics and
/// each item's title, description and tags.
pub struct ContentBasedStrategy {
    rng: Mutex<ChaCha8Rng>,
}

impl ContentBasedStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl ScoringStrategy for ContentBasedStrategy {
    fn name(&self) -> &'static str {
        "content_based"
    }

    fn score(&self, ctx: &StrategyContext<'_>, available: &[ContentItem]) -> Vec<StrategyScore> {
        let preferences = ctx
            .profile
            .background
            .interests
            .iter()
            .map(String::as_str)
            .chain(ctx.profile.quiz_history.iter().map(|q| q.topic.as_str()))
            .collect::<Vec<_>>()
            .join(" ");

        let sample = ctx.config.fallback_sample_size;
        if preferences.trim().is_empty() {
            debug!(user_id = %ctx.profile.user_id, "No preferences, sampling content at random");
            return random_fallback(&self.rng, available, sample, "Something new to explore");
        }

        let mut documents: Vec<String> = available.iter().map(ContentItem::search_text).collect();
        documents.push(preferences);

        let Some(model) = TfidfModel::fit(&documents) else {
            warn!(user_id = %ctx.profile.user_id, "Empty TF-IDF vocabulary, sampling content at random");
            return random_fallback(&self.rng, available, sample, "Something new to explore");
        };

        let user_vector = documents
            .last()
            .map(|prefs| model.transform(prefs))
            .unwrap_or_default();

        let mut scores: Vec<StrategyScore> = available
            .iter()
            .zip(&documents)
            .map(|(item, text)| {
                let similarity = cosine_similarity(&user_vector, &model.transform(text));
                StrategyScore::new(item, similarity, "Matches your interests")
            })
            .collect();
        sort_desc(&mut scores);
        scores
    }
}

// ============================================================
// Collaborative
// ============================================================

/// Mean of `score * similarity` over similar users' quizzes on each item,
/// scaled to [0, 1].
pub struct CollaborativeStrategy {
    rng: Mutex<ChaCha8Rng>,
    similar_users: usize,
}

impl CollaborativeStrategy {
    pub fn new(seed: u64, similar_users: usize) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            similar_users,
        }
    }
}

impl ScoringStrategy for CollaborativeStrategy {
    fn name(&self) -> &'static str {
        "collaborative"
    }

    fn score(&self, ctx: &StrategyContext<'_>, available: &[ContentItem]) -> Vec<StrategyScore> {
        let similar = ctx.profiler.similar_profiles(ctx.profile, self.similar_users);
        if similar.is_empty() {
            debug!(user_id = %ctx.profile.user_id, "No similar users, sampling content at random");
            return random_fallback(
                &self.rng,
                available,
                ctx.config.fallback_sample_size,
                "Popular with other learners",
            );
        }

        let mut weighted: HashMap<&str, Vec<f64>> = HashMap::new();
        for (peer, profile) in &similar {
            for quiz in &profile.quiz_history {
                if let Some(content_id) = quiz.content_id.as_deref() {
                    weighted
                        .entry(content_id)
                        .or_default()
                        .push(quiz.score * peer.similarity);
                }
            }
        }

        let mut scores: Vec<StrategyScore> = available
            .iter()
            .filter_map(|item| {
                let values = weighted.get(item.content_id.as_str())?;
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                Some(StrategyScore::new(item, mean / 100.0, "Learners like you did well on this"))
            })
            .collect();
        sort_desc(&mut scores);
        scores
    }
}

// ============================================================
// Performance-based
// ============================================================

/// Favors topics that need work, lightly reinforces strong topics, and
/// rewards items at the user's domain difficulty.
pub struct PerformanceStrategy;

impl ScoringStrategy for PerformanceStrategy {
    fn name(&self) -> &'static str {
        "performance_based"
    }

    fn score(&self, ctx: &StrategyContext<'_>, available: &[ContentItem]) -> Vec<StrategyScore> {
        let mut by_topic: HashMap<&str, (f64, usize)> = HashMap::new();
        for quiz in &ctx.profile.quiz_history {
            let entry = by_topic.entry(quiz.topic.as_str()).or_insert((0.0, 0));
            entry.0 += quiz.score;
            entry.1 += 1;
        }
        let averages: HashMap<&str, f64> = by_topic
            .into_iter()
            .map(|(topic, (sum, count))| (topic, sum / count as f64))
            .collect();

        let taxonomy = ctx.profiler.taxonomy();
        let mut scores: Vec<StrategyScore> = available
            .iter()
            .map(|item| {
                let (mut score, reason) = match averages.get(item.topic.as_str()) {
                    Some(avg) if *avg < ctx.config.improvement_below => {
                        (0.8, "This topic needs improvement")
                    }
                    Some(avg) if *avg > ctx.config.excel_above => (0.6, "You excel in this topic"),
                    _ => (0.5, "Fits your current level"),
                };

                let domain = taxonomy.map_topic_to_domain(&item.topic);
                let level = ctx
                    .profile
                    .domain_difficulty(&domain)
                    .unwrap_or(DifficultyLevel::Intermediate);
                if item.difficulty == level {
                    score += 0.1;
                }
                StrategyScore::new(item, score, reason)
            })
            .collect();
        sort_desc(&mut scores);
        scores
    }
}

// ============================================================
// Recency-based
// ============================================================

/// Boosts topics practiced within the recency window and penalizes repeating
/// the exact content.
pub struct RecencyStrategy;

impl ScoringStrategy for RecencyStrategy {
    fn name(&self) -> &'static str {
        "recency_based"
    }

    fn score(&self, ctx: &StrategyContext<'_>, available: &[ContentItem]) -> Vec<StrategyScore> {
        let cutoff = ctx.now - Duration::days(ctx.config.recency_window_days);
        let recent: Vec<_> = ctx
            .profile
            .quiz_history
            .iter()
            .filter(|q| q.timestamp > cutoff)
            .collect();

        let recent_content: HashSet<&str> =
            recent.iter().filter_map(|q| q.content_id.as_deref()).collect();
        let mut topic_counts: HashMap<&str, usize> = HashMap::new();
        for quiz in &recent {
            *topic_counts.entry(quiz.topic.as_str()).or_default() += 1;
        }

        let cap = ctx.config.recency_frequency_cap;
        let mut scores: Vec<StrategyScore> = available
            .iter()
            .map(|item| {
                let mut score = 0.5;
                let mut reason = "Fresh material";

                let frequency = topic_counts.get(item.topic.as_str()).copied().unwrap_or(0);
                if frequency > 0 {
                    score = 0.5 + 0.1 * frequency.min(cap) as f64;
                    reason = "Related to your recent activity";
                }
                if recent_content.contains(item.content_id.as_str()) {
                    score -= ctx.config.recent_repeat_penalty;
                    reason = "You've recently worked with this content";
                }

                StrategyScore::new(item, score.max(ctx.config.min_recency_score), reason)
            })
            .collect();
        sort_desc(&mut scores);
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::config::ColdStartConfig;
    use crate::adaptive::taxonomy::DomainTaxonomy;
    use crate::adaptive::types::{BackgroundInfo, QuizResult};
    use crate::storage::InMemoryStore;
    use std::sync::Arc;

    fn profiler() -> ColdStartProfiler {
        ColdStartProfiler::new(
            ColdStartConfig::default(),
            Arc::new(DomainTaxonomy::standard()),
            Arc::new(InMemoryStore::new()),
        )
    }

    fn seeded(p: &ColdStartProfiler, interests: &[&str], quizzes: &[(&str, Option<&str>, f64, i64)]) -> UserProfile {
        let background = BackgroundInfo {
            education_level: Some("high_school".into()),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        p.create_profile("u1", background).unwrap();
        let mut profile = None;
        for (topic, content, score, days_ago) in quizzes {
            let mut result = QuizResult::new(*topic, *score, DifficultyLevel::Beginner)
                .completed_at(Utc::now() - Duration::days(*days_ago));
            if let Some(content) = content {
                result = result.with_content(*content);
            }
            profile = Some(p.update_profile("u1", result).unwrap());
        }
        profile.unwrap_or_else(|| p.load_profile("u1").unwrap())
    }

    fn catalog() -> Vec<ContentItem> {
        vec![
            ContentItem::new("alg", "Algebra drills", "algebra", DifficultyLevel::Intermediate)
                .with_tags(["equations"]),
            ContentItem::new("bio", "Cell biology", "biology", DifficultyLevel::Beginner),
            ContentItem::new("his", "Roman history", "history", DifficultyLevel::Advanced),
        ]
    }

    fn score_of(scores: &[StrategyScore], id: &str) -> f64 {
        scores.iter().find(|s| s.content_id == id).map(|s| s.score).unwrap()
    }

    #[test]
    fn content_based_ranks_matching_text_first() {
        let p = profiler();
        let profile = seeded(&p, &["algebra"], &[]);
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let scores = ContentBasedStrategy::new(1).score(&ctx, &catalog());
        assert_eq!(scores[0].content_id, "alg");
        assert!(scores[0].score > 0.0);
        assert_eq!(score_of(&scores, "his"), 0.0);
    }

    #[test]
    fn content_based_without_preferences_samples() {
        let p = profiler();
        let profile = seeded(&p, &[], &[]);
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let scores = ContentBasedStrategy::new(1).score(&ctx, &catalog());
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.score == 0.5));
    }

    #[test]
    fn collaborative_without_peers_samples() {
        let p = profiler();
        let profile = seeded(&p, &["algebra"], &[]);
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let scores = CollaborativeStrategy::new(1, 5).score(&ctx, &catalog());
        assert!(scores.iter().all(|s| s.score == 0.5));
    }

    #[test]
    fn collaborative_averages_similarity_weighted_peer_scores() {
        let p = profiler();
        let physics = || BackgroundInfo {
            education_level: Some("graduate".into()),
            interests: vec!["physics".into()],
            ..Default::default()
        };
        for id in ["target", "a", "b", "c", "d", "e"] {
            p.create_profile(id, physics()).unwrap();
        }
        let quizzes = [("a", "phy-1", 80.0), ("b", "phy-1", 60.0), ("b", "phy-1", 70.0), ("c", "phy-2", 90.0)];
        for (peer, content, score) in quizzes {
            p.update_profile(peer, QuizResult::new("physics", score, DifficultyLevel::Beginner).with_content(content))
                .unwrap();
        }

        let similarity: HashMap<String, f64> = p
            .get_similar_users("target", 5)
            .into_iter()
            .map(|s| (s.user_id, s.similarity))
            .collect();
        assert_eq!(similarity.len(), 5);
        let expected_phy1 = (80.0 * similarity["a"] + 60.0 * similarity["b"] + 70.0 * similarity["b"]) / 3.0 / 100.0;
        let expected_phy2 = 90.0 * similarity["c"] / 100.0;

        let profile = p.load_profile("target").unwrap();
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let available = vec![
            ContentItem::new("phy-1", "Kinematics", "physics", DifficultyLevel::Beginner),
            ContentItem::new("phy-2", "Optics", "physics", DifficultyLevel::Intermediate),
            ContentItem::new("phy-3", "Thermodynamics", "physics", DifficultyLevel::Advanced),
        ];
        let scores = CollaborativeStrategy::new(1, 5).score(&ctx, &available);

        assert_eq!(scores.len(), 2);
        assert!((score_of(&scores, "phy-1") - expected_phy1).abs() < 1e-9);
        assert!((score_of(&scores, "phy-2") - expected_phy2).abs() < 1e-9);
        assert!(scores.iter().all(|s| s.content_id != "phy-3"));
    }

    #[test]
    fn content_based_with_only_stop_words_samples() {
        let p = profiler();
        let profile = seeded(&p, &["the"], &[]);
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let available: Vec<ContentItem> = (0..7)
            .map(|i| {
                ContentItem::new(format!("c{i}"), "Of the", "x", DifficultyLevel::Beginner)
                    .with_description("a")
                    .with_tags(["is", "y"])
            })
            .collect();
        let scores = ContentBasedStrategy::new(1).score(&ctx, &available);
        assert_eq!(scores.len(), config.fallback_sample_size.min(available.len()));
        assert!(scores.iter().all(|s| s.score == 0.5));
    }

    #[test]
    fn performance_prefers_weak_topics() {
        let p = profiler();
        let profile = seeded(
            &p,
            &["algebra"],
            &[("biology", None, 50.0, 1), ("history", None, 95.0, 1)],
        );
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let scores = PerformanceStrategy.score(&ctx, &catalog());
        assert!((score_of(&scores, "bio") - 0.8).abs() < 1e-12);
        assert!((score_of(&scores, "his") - 0.6).abs() < 1e-12);
        // algebra -> mathematics at intermediate, matching the item
        assert!((score_of(&scores, "alg") - 0.6).abs() < 1e-12);
    }

    #[test]
    fn recency_boosts_topics_and_penalizes_repeats() {
        let p = profiler();
        let profile = seeded(
            &p,
            &["algebra"],
            &[
                ("algebra", Some("alg"), 70.0, 1),
                ("algebra", None, 70.0, 2),
                ("biology", None, 70.0, 30),
            ],
        );
        let config = RecommendationConfig::default();
        let ctx = StrategyContext { profile: &profile, profiler: &p, config: &config, now: Utc::now() };
        let scores = RecencyStrategy.score(&ctx, &catalog());
        assert!((score_of(&scores, "alg") - 0.5).abs() < 1e-12);
        assert_eq!(score_of(&scores, "bio"), 0.5);
        assert_eq!(score_of(&scores, "his"), 0.5);
    }
}
