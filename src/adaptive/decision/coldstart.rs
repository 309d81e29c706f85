use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::adaptive::config::ColdStartConfig;
use crate::adaptive::error::{AdaptiveError, AdaptiveResult};
use crate::adaptive::similarity::cosine_similarity;
use crate::adaptive::taxonomy::{DomainTaxonomy, GENERAL_DOMAIN};
use crate::adaptive::types::{
    BackgroundInfo, ContentItem, DifficultyLevel, ProfileRecommendation, QuizResult, QuizSummary,
    RecommendationItem, RecommendationKind, UserProfile,
};
use crate::storage::ProfileStore;

const DEFAULT_DOMAINS: [&str; 2] = ["mathematics", "science"];

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarUser {
    pub user_id: String,
    pub similarity: f64,
}

/// Education level to starting difficulty. Unknown or missing levels are
/// intermediate.
pub fn education_to_difficulty(education_level: Option<&str>) -> DifficultyLevel {
    match education_level.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("elementary") | Some("middle_school") => DifficultyLevel::Beginner,
        Some("high_school") | Some("undergraduate") => DifficultyLevel::Intermediate,
        Some("graduate") | Some("phd") => DifficultyLevel::Advanced,
        _ => DifficultyLevel::Intermediate,
    }
}

/// Long-term domain difficulty policy: one step up above `promote_score`, one
/// step down below `demote_score`, and only when the quiz was taken at the
/// domain's current difficulty.
pub fn next_domain_difficulty(
    config: &ColdStartConfig,
    current: DifficultyLevel,
    quiz_difficulty: DifficultyLevel,
    score: f64,
) -> DifficultyLevel {
    if quiz_difficulty != current {
        return current;
    }
    if score > config.promote_score {
        current.harder()
    } else if score < config.demote_score {
        current.easier()
    } else {
        current
    }
}

/// Count occurrences keeping first-seen order, then order by count descending.
fn most_common<I>(items: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(name, _)| *name == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Builds and maintains user profiles before (and while) performance history
/// accumulates.
pub struct ColdStartProfiler {
    config: ColdStartConfig,
    taxonomy: Arc<DomainTaxonomy>,
    store: Arc<dyn ProfileStore>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    rng: Mutex<ChaCha8Rng>,
}

impl ColdStartProfiler {
    pub fn new(
        config: ColdStartConfig,
        taxonomy: Arc<DomainTaxonomy>,
        store: Arc<dyn ProfileStore>,
    ) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            taxonomy,
            store,
            user_locks: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &ColdStartConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &Arc<DomainTaxonomy> {
        &self.taxonomy
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock();
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Stored profile, or `None` when absent or unreadable.
    pub fn load_profile(&self, user_id: &str) -> Option<UserProfile> {
        match self.store.load_profile(user_id) {
            Ok(profile) => profile,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Failed to load profile");
                None
            }
        }
    }

    fn persist(&self, profile: &UserProfile) {
        if let Err(e) = self.store.save_profile(profile) {
            error!(error = %e, user_id = %profile.user_id, "Failed to save profile");
        }
    }

    /// Creates the profile for `user_id` from onboarding answers. A profile is
    /// created once: when one already exists it is returned unchanged and
    /// `background` is ignored.
    pub fn create_profile(&self, user_id: &str, background: BackgroundInfo) -> AdaptiveResult<UserProfile> {
        if user_id.trim().is_empty() {
            return Err(AdaptiveError::MalformedInput("empty user id".to_string()));
        }
        if background.is_empty() {
            warn!(user_id = %user_id, "Empty background info, using default domains and difficulty");
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        if let Some(existing) = self.load_profile(user_id) {
            warn!(
                user_id = %user_id,
                quizzes = existing.quiz_history.len(),
                "Profile already exists, keeping it"
            );
            return Ok(existing);
        }

        let base_difficulty = education_to_difficulty(background.education_level.as_deref());
        let relevant_domains = self.identify_relevant_domains(&background);
        let domain_difficulties =
            self.initial_domain_difficulties(user_id, &relevant_domains, &background, base_difficulty);
        let recommendations = self.initial_recommendations(&relevant_domains, &domain_difficulties);

        let profile = UserProfile {
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            background,
            base_difficulty,
            relevant_domains,
            domain_difficulties,
            recommendations,
            profile_confidence: self.config.initial_confidence,
            quiz_history: Vec::new(),
        };

        self.persist(&profile);
        info!(
            user_id = %user_id,
            base_difficulty = %base_difficulty,
            domains = profile.relevant_domains.len(),
            "Profile created"
        );
        Ok(profile)
    }

    /// Domains named by interests, prior-knowledge keys and learning goals.
    /// Unmatched entries contribute "general"; nothing at all yields the defaults.
    pub fn identify_relevant_domains(&self, background: &BackgroundInfo) -> BTreeSet<String> {
        let mut domains: BTreeSet<String> = background
            .interests
            .iter()
            .chain(background.prior_knowledge.keys())
            .chain(background.learning_goals.iter())
            .map(|topic| self.taxonomy.map_topic_to_domain(topic))
            .collect();

        if domains.is_empty() {
            domains = DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect();
        }
        domains
    }

    fn initial_domain_difficulties(
        &self,
        user_id: &str,
        domains: &BTreeSet<String>,
        background: &BackgroundInfo,
        base: DifficultyLevel,
    ) -> BTreeMap<String, DifficultyLevel> {
        domains
            .iter()
            .map(|domain| {
                let reported = background
                    .prior_knowledge
                    .iter()
                    .filter(|(topic, _)| self.taxonomy.names_domain(topic, domain))
                    .find_map(|(topic, level)| match DifficultyLevel::try_parse(level) {
                        Some(level) => Some(level),
                        None => {
                            warn!(
                                user_id = %user_id,
                                topic = %topic,
                                level = %level,
                                "Ignoring unrecognized prior-knowledge level"
                            );
                            None
                        }
                    });
                (domain.clone(), reported.unwrap_or(base))
            })
            .collect()
    }

    fn initial_recommendations(
        &self,
        domains: &BTreeSet<String>,
        difficulties: &BTreeMap<String, DifficultyLevel>,
    ) -> Vec<ProfileRecommendation> {
        let mut rng = self.rng.lock();
        let mut recommendations = Vec::new();

        for domain in domains {
            let difficulty = difficulties.get(domain).copied().unwrap_or_default();
            recommendations.push(ProfileRecommendation {
                kind: RecommendationKind::Topic,
                name: domain.clone(),
                parent_domain: None,
                difficulty,
                reason: format!("Based on your interests and background in {domain}"),
            });

            let subtopics = self.taxonomy.subtopics(domain);
            for subtopic in subtopics.choose_multiple(&mut *rng, self.config.subtopics_per_domain) {
                recommendations.push(ProfileRecommendation {
                    kind: RecommendationKind::Subtopic,
                    name: subtopic.clone(),
                    parent_domain: Some(domain.clone()),
                    difficulty,
                    reason: format!("Specific topic in {domain} that matches your profile"),
                });
            }
        }
        recommendations
    }

    /// Folds a completed quiz into the stored profile. Writers for the same
    /// user are serialized.
    pub fn update_profile(&self, user_id: &str, result: QuizResult) -> AdaptiveResult<UserProfile> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        let Some(mut profile) = self.load_profile(user_id) else {
            warn!(user_id = %user_id, "No profile to update");
            return Err(AdaptiveError::ProfileNotFound(user_id.to_string()));
        };

        let summary = result.into_summary(Utc::now());
        let domain = self.taxonomy.map_topic_to_domain(&summary.topic);

        if let Some(current) = profile.domain_difficulties.get(&domain).copied() {
            let next = next_domain_difficulty(&self.config, current, summary.difficulty, summary.score);
            if next != current {
                info!(
                    user_id = %user_id,
                    domain = %domain,
                    from = %current,
                    to = %next,
                    score = summary.score,
                    "Domain difficulty changed"
                );
                profile.domain_difficulties.insert(domain, next);
            }
        }

        profile.quiz_history.push(summary);
        profile.profile_confidence = (profile.profile_confidence + self.config.confidence_step)
            .min(self.config.max_confidence)
            .max(profile.profile_confidence);
        profile.recommendations = self.generate_recommendations(&profile);

        self.persist(&profile);
        debug!(
            user_id = %user_id,
            quizzes = profile.quiz_history.len(),
            confidence = profile.profile_confidence,
            "Profile updated"
        );
        Ok(profile)
    }

    /// `[difficulty ordinal per domain] ++ [interest indicator per domain]`,
    /// both over the taxonomy's sorted domain names.
    pub fn similarity_vector(&self, profile: &UserProfile) -> Vec<f64> {
        let domains = self.taxonomy.sorted_domain_names();
        // interests count through the taxonomy, so "algebra" marks mathematics
        let interest_domains: HashSet<String> = profile
            .background
            .interests
            .iter()
            .map(|i| self.taxonomy.map_topic_to_domain(i))
            .collect();

        let ordinals = domains.iter().map(|d| {
            profile
                .domain_difficulty(d)
                .unwrap_or(DifficultyLevel::Intermediate)
                .ordinal() as f64
        });
        let interests = domains
            .iter()
            .map(|d| if interest_domains.contains(*d) { 1.0 } else { 0.0 });

        ordinals.chain(interests).collect()
    }

    /// Up to `n` other users by cosine similarity of [`similarity_vector`](Self::similarity_vector).
    /// Empty when the user is unknown or fewer than the minimum profiles exist.
    pub fn get_similar_users(&self, user_id: &str, n: usize) -> Vec<SimilarUser> {
        match self.load_profile(user_id) {
            Some(profile) => self
                .similar_profiles(&profile, n)
                .into_iter()
                .map(|(similar, _)| similar)
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn similar_profiles(&self, target: &UserProfile, n: usize) -> Vec<(SimilarUser, UserProfile)> {
        let profiles = match self.store.list_profiles() {
            Ok(profiles) => profiles,
            Err(e) => {
                error!(error = %e, "Failed to list profiles");
                return Vec::new();
            }
        };

        if profiles.len() < self.config.min_profiles_for_similarity {
            debug!(
                available = profiles.len(),
                required = self.config.min_profiles_for_similarity,
                "Not enough profiles for similarity lookup"
            );
            return Vec::new();
        }

        let target_vector = self.similarity_vector(target);
        let mut scored: Vec<(SimilarUser, UserProfile)> = profiles
            .into_iter()
            .filter(|p| p.user_id != target.user_id)
            .map(|p| {
                let similarity = cosine_similarity(&target_vector, &self.similarity_vector(&p));
                (
                    SimilarUser {
                        user_id: p.user_id.clone(),
                        similarity,
                    },
                    p,
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.similarity.total_cmp(&a.0.similarity));
        scored.truncate(n);
        scored
    }

    /// Topic recommendations for the profile's domains, mastery suggestions for
    /// repeatedly strong topics, then topics similar users did well on.
    pub fn generate_recommendations(&self, profile: &UserProfile) -> Vec<ProfileRecommendation> {
        let mut recommendations =
            self.initial_recommendations(&profile.relevant_domains, &profile.domain_difficulties);

        let difficulty_for = |topic: &str| {
            profile
                .domain_difficulty(&self.taxonomy.map_topic_to_domain(topic))
                .unwrap_or_default()
        };

        let strong_topics = profile
            .quiz_history
            .iter()
            .filter(|q| q.score > self.config.mastery_score)
            .map(|q| q.topic.clone());
        for (topic, count) in most_common(strong_topics).into_iter().take(self.config.top_topics) {
            if count > 1 {
                recommendations.push(ProfileRecommendation {
                    kind: RecommendationKind::Mastery,
                    difficulty: difficulty_for(&topic).harder(),
                    reason: format!("You've shown proficiency in {topic}"),
                    name: topic,
                    parent_domain: None,
                });
            }
        }

        let similar = self.similar_profiles(profile, self.config.similar_user_count);
        let peer_topics = similar.iter().flat_map(|(_, peer)| {
            let strong: BTreeSet<&str> = peer
                .quiz_history
                .iter()
                .filter(|q| q.score > self.config.mastery_score)
                .map(|q| q.topic.as_str())
                .collect();
            // first-seen order within the peer's history
            let mut ordered: Vec<String> = Vec::with_capacity(strong.len());
            for q in &peer.quiz_history {
                if strong.contains(q.topic.as_str()) && !ordered.contains(&q.topic) {
                    ordered.push(q.topic.clone());
                }
            }
            ordered
        });
        for (topic, count) in most_common(peer_topics).into_iter().take(self.config.top_topics) {
            if count >= 2 && !recommendations.iter().any(|r| r.name == topic) {
                recommendations.push(ProfileRecommendation {
                    kind: RecommendationKind::Collaborative,
                    difficulty: difficulty_for(&topic),
                    reason: format!("Similar users performed well in {topic}"),
                    name: topic,
                    parent_domain: None,
                });
            }
        }

        recommendations.truncate(self.config.max_recommendations);
        recommendations
    }

    /// Ranks content for a user without enough history for blending.
    ///
    /// Items in a relevant domain score 1.0, times 1.2 at the domain's
    /// difficulty or 0.8 when harder. When fewer than `n` items are relevant,
    /// the rest are appended at 0.5. Content already completed in
    /// `partial_history` is halved. Users without a profile are ranked against
    /// the default domains at intermediate difficulty rather than getting an
    /// empty list.
    pub fn recommend_content_for_new_user(
        &self,
        user_id: &str,
        available: &[ContentItem],
        n: usize,
        partial_history: &[QuizSummary],
    ) -> Vec<RecommendationItem> {
        let (domains, difficulties) = match self.load_profile(user_id) {
            Some(profile) => (profile.relevant_domains, profile.domain_difficulties),
            None => {
                debug!(user_id = %user_id, "No profile, ranking against default domains");
                let domains: BTreeSet<String> = DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect();
                let difficulties = domains
                    .iter()
                    .map(|d| (d.clone(), DifficultyLevel::Intermediate))
                    .collect();
                (domains, difficulties)
            }
        };

        let completed: HashSet<&str> = partial_history
            .iter()
            .filter_map(|q| q.content_id.as_deref())
            .collect();

        let mut ranked: Vec<RecommendationItem> = Vec::new();
        let mut matched: HashSet<usize> = HashSet::new();

        for (idx, item) in available.iter().enumerate() {
            let domain = self.taxonomy.map_topic_to_domain(&item.topic);
            if !domains.contains(&domain) {
                continue;
            }
            let target = difficulties.get(&domain).copied().unwrap_or_default();
            let mut relevance = 1.0;
            if item.difficulty == target {
                relevance *= 1.2;
            } else if item.difficulty > target {
                relevance *= 0.8;
            }
            matched.insert(idx);
            let reason = if domain == GENERAL_DOMAIN {
                "Matches your general interests".to_string()
            } else {
                format!("Matches your interest in {domain}")
            };
            ranked.push(RecommendationItem::for_content(item, relevance, reason));
        }

        if ranked.len() < n {
            for (idx, item) in available.iter().enumerate() {
                if !matched.contains(&idx) {
                    ranked.push(RecommendationItem::for_content(item, 0.5, "Broadens your coverage"));
                }
            }
        }

        for rec in ranked.iter_mut() {
            if completed.contains(rec.content_id.as_str()) {
                rec.score *= 0.5;
                rec.reason = "You've recently worked with this content".to_string();
            }
        }

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(n);
        ranked
    }
}
