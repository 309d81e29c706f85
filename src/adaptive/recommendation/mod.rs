//! Multi-strategy content recommendation.
//!
//! Users without a profile or with fewer than three completed quizzes get the
//! cold-start ranking from [`ColdStartProfiler`]. Everyone else gets the weighted
//! sum of four independent strategies followed by a topic diversity pass.

pub mod diversity;
pub mod strategies;
pub mod tfidf;

pub use diversity::apply_diversity;
pub use strategies::{
    CollaborativeStrategy, ContentBasedStrategy, PerformanceStrategy, RecencyStrategy,
    ScoringStrategy, StrategyContext, StrategyScore,
};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::adaptive::config::RecommendationConfig;
use crate::adaptive::decision::ColdStartProfiler;
use crate::adaptive::types::{ContentItem, RecommendationItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationPath {
    ColdStart,
    Blended,
}

pub struct RecommendationBlender {
    config: RecommendationConfig,
    profiler: Arc<ColdStartProfiler>,
    strategies: Vec<(Arc<dyn ScoringStrategy>, f64)>,
}

impl RecommendationBlender {
    pub fn new(config: RecommendationConfig, profiler: Arc<ColdStartProfiler>) -> Self {
        let w = &config.weights;
        let similar_users = profiler.config().similar_user_count;
        let strategies: Vec<(Arc<dyn ScoringStrategy>, f64)> = vec![
            (Arc::new(ContentBasedStrategy::new(config.seed)), w.content_based),
            (
                Arc::new(CollaborativeStrategy::new(config.seed.wrapping_add(1), similar_users)),
                w.collaborative,
            ),
            (Arc::new(PerformanceStrategy), w.performance_based),
            (Arc::new(RecencyStrategy), w.recency_based),
        ];
        Self::with_strategies(config, profiler, strategies)
    }

    /// Blender over an explicit `(strategy, weight)` list, in blend order.
    pub fn with_strategies(
        config: RecommendationConfig,
        profiler: Arc<ColdStartProfiler>,
        strategies: Vec<(Arc<dyn ScoringStrategy>, f64)>,
    ) -> Self {
        Self {
            config,
            profiler,
            strategies,
        }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    pub fn recommend(&self, user_id: &str, available: &[ContentItem], n: usize) -> Vec<RecommendationItem> {
        self.recommend_with_path(user_id, available, n).0
    }

    pub fn recommend_with_path(
        &self,
        user_id: &str,
        available: &[ContentItem],
        n: usize,
    ) -> (Vec<RecommendationItem>, RecommendationPath) {
        let Some(profile) = self.profiler.load_profile(user_id) else {
            info!(user_id = %user_id, "No profile, using cold-start recommendations");
            let items = self
                .profiler
                .recommend_content_for_new_user(user_id, available, n, &[]);
            return (items, RecommendationPath::ColdStart);
        };

        if profile.quiz_history.len() < self.config.min_history_for_blending {
            info!(
                user_id = %user_id,
                quizzes = profile.quiz_history.len(),
                "Limited history, using cold-start recommendations"
            );
            let items = self.profiler.recommend_content_for_new_user(
                user_id,
                available,
                n,
                &profile.quiz_history,
            );
            return (items, RecommendationPath::ColdStart);
        }

        let ctx = StrategyContext {
            profile: &profile,
            profiler: &self.profiler,
            config: &self.config,
            now: Utc::now(),
        };

        let by_id: HashMap<&str, &ContentItem> =
            available.iter().map(|item| (item.content_id.as_str(), item)).collect();

        // (content_id, blended score, best weighted contribution, reason)
        let mut blended: Vec<(String, f64, f64, String)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (strategy, weight) in &self.strategies {
            let scores = strategy.score(&ctx, available);
            debug!(user_id = %user_id, strategy = strategy.name(), items = scores.len(), "Strategy scored");

            for s in scores {
                let contribution = s.score * weight;
                match positions.get(&s.content_id) {
                    Some(&pos) => {
                        let entry = &mut blended[pos];
                        entry.1 += contribution;
                        if contribution > entry.2 {
                            entry.2 = contribution;
                            entry.3 = s.reason;
                        }
                    }
                    None => {
                        positions.insert(s.content_id.clone(), blended.len());
                        blended.push((s.content_id, contribution, contribution, s.reason));
                    }
                }
            }
        }

        let mut ranked: Vec<RecommendationItem> = blended
            .into_iter()
            .filter_map(|(content_id, score, _, reason)| {
                by_id
                    .get(content_id.as_str())
                    .map(|item| RecommendationItem::for_content(item, score, reason))
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut items = apply_diversity(ranked, n);
        items.truncate(n);

        info!(user_id = %user_id, count = items.len(), "Blended recommendations generated");
        (items, RecommendationPath::Blended)
    }
}
