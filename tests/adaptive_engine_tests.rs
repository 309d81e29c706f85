//! End-to-end tests for AdaptiveEngine: onboarding, quiz submission, difficulty
//! adaptation, blended recommendations and background training.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adaptive_quiz::adaptive::config::{ColdStartConfig, RecommendationConfig};
use adaptive_quiz::adaptive::decision::ColdStartProfiler;
use adaptive_quiz::adaptive::modeling::RetrainOutcome;
use adaptive_quiz::adaptive::recommendation::{
    RecommendationBlender, RecommendationPath, ScoringStrategy, StrategyContext, StrategyScore,
};
use adaptive_quiz::adaptive::taxonomy::DomainTaxonomy;
use adaptive_quiz::adaptive::{
    AdaptiveError, BackgroundInfo, ContentItem, DifficultyLevel, PerformanceRecord, QuizResult,
};
use adaptive_quiz::storage::InMemoryStore;
use adaptive_quiz::config::Config;
use adaptive_quiz::AdaptiveEngine;

use common::{background_config, catalog, inline_config, inline_engine, record, true_false_quiz};

struct SpyStrategy {
    calls: Arc<AtomicUsize>,
}

impl ScoringStrategy for SpyStrategy {
    fn name(&self) -> &'static str {
        "spy"
    }

    fn score(&self, _ctx: &StrategyContext<'_>, available: &[ContentItem]) -> Vec<StrategyScore> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        available
            .iter()
            .map(|item| StrategyScore {
                content_id: item.content_id.clone(),
                score: 1.0,
                reason: "spy".to_string(),
            })
            .collect()
    }
}

fn spy_blender() -> (RecommendationBlender, Arc<ColdStartProfiler>, Arc<AtomicUsize>) {
    let profiler = Arc::new(ColdStartProfiler::new(
        ColdStartConfig::default(),
        Arc::new(DomainTaxonomy::standard()),
        Arc::new(InMemoryStore::new()),
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let spy: Arc<dyn ScoringStrategy> = Arc::new(SpyStrategy {
        calls: Arc::clone(&calls),
    });
    let blender = RecommendationBlender::with_strategies(
        RecommendationConfig::default(),
        Arc::clone(&profiler),
        vec![(spy, 1.0)],
    );
    (blender, profiler, calls)
}

// ============================================================================
// Recommendation paths
// ============================================================================

#[test]
fn unknown_user_never_reaches_blending_strategies() {
    let (blender, _, calls) = spy_blender();

    let (items, path) = blender.recommend_with_path("nobody", &catalog(), 4);

    assert_eq!(path, RecommendationPath::ColdStart);
    assert_eq!(items.len(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn thin_history_stays_on_cold_start_then_blends() {
    let (blender, profiler, calls) = spy_blender();
    profiler.create_profile("u1", BackgroundInfo::default()).unwrap();

    for score in [50.0, 60.0] {
        profiler
            .update_profile("u1", QuizResult::new("algebra", score, DifficultyLevel::Intermediate))
            .unwrap();
        blender.recommend("u1", &catalog(), 3);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    profiler
        .update_profile("u1", QuizResult::new("algebra", 70.0, DifficultyLevel::Intermediate))
        .unwrap();
    let (items, path) = blender.recommend_with_path("u1", &catalog(), 3);

    assert_eq!(path, RecommendationPath::Blended);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(items.len() <= 3);
    assert!(items.iter().all(|i| i.reason == "spy"));
}

#[test]
fn cold_start_ranking_prefers_relevant_domains() {
    let engine = inline_engine();
    engine
        .onboard(
            "u1",
            BackgroundInfo {
                education_level: Some("high_school".into()),
                interests: vec!["history".into()],
                ..Default::default()
            },
        )
        .unwrap();

    let items = engine.recommend("u1", &catalog(), 2);

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].content_id, "his-1");
    assert!(items[0].score > items[1].score);
}

#[test]
fn blended_recommendations_are_distinct_and_bounded() {
    let engine = inline_engine();
    engine
        .onboard(
            "u1",
            BackgroundInfo {
                interests: vec!["algebra".into(), "physics".into()],
                ..Default::default()
            },
        )
        .unwrap();
    for correct in [3, 4, 5] {
        engine
            .submit_quiz("u1", true_false_quiz("algebra", DifficultyLevel::Intermediate, correct, 5))
            .unwrap();
    }

    let items = engine.recommend("u1", &catalog(), 4);

    assert_eq!(items.len(), 4);
    let mut ids: Vec<&str> = items.iter().map(|i| i.content_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

// ============================================================================
// Onboarding and profile updates
// ============================================================================

#[test]
fn graduate_programmer_starts_advanced_in_technology() {
    let engine = inline_engine();
    let profile = engine
        .onboard(
            "u1",
            BackgroundInfo {
                education_level: Some("graduate".into()),
                interests: vec!["programming".into()],
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(profile.base_difficulty, DifficultyLevel::Advanced);
    assert!(profile.relevant_domains.contains("technology"));
    assert_eq!(profile.domain_difficulty("technology"), Some(DifficultyLevel::Advanced));
}

#[test]
fn prior_knowledge_overrides_education_level() {
    let engine = inline_engine();
    let mut background = BackgroundInfo {
        education_level: Some("graduate".into()),
        interests: vec!["programming".into()],
        ..Default::default()
    };
    background
        .prior_knowledge
        .insert("programming".into(), "beginner".into());

    let profile = engine.onboard("u1", background).unwrap();

    assert_eq!(profile.domain_difficulty("technology"), Some(DifficultyLevel::Beginner));
}

#[test]
fn strong_quiz_at_current_difficulty_promotes_domain() {
    let engine = inline_engine();
    let background = BackgroundInfo {
        education_level: Some("undergraduate".into()),
        interests: vec!["algebra".into()],
        ..Default::default()
    };
    engine.onboard("at-level", background.clone()).unwrap();
    engine.onboard("off-level", background).unwrap();

    let promoted = engine
        .submit_quiz("at-level", true_false_quiz("algebra", DifficultyLevel::Intermediate, 17, 20))
        .unwrap();
    let unchanged = engine
        .submit_quiz("off-level", true_false_quiz("algebra", DifficultyLevel::Beginner, 17, 20))
        .unwrap();

    assert!((promoted.score - 85.0).abs() < 1e-9);
    assert_eq!(
        promoted.profile.unwrap().domain_difficulty("mathematics"),
        Some(DifficultyLevel::Advanced)
    );
    assert_eq!(
        unchanged.profile.unwrap().domain_difficulty("mathematics"),
        Some(DifficultyLevel::Intermediate)
    );
}

#[test]
fn profile_confidence_saturates() {
    let engine = inline_engine();
    engine.onboard("u1", BackgroundInfo::default()).unwrap();

    let mut last = 0.0;
    for _ in 0..12 {
        let outcome = engine
            .submit_quiz("u1", true_false_quiz("history", DifficultyLevel::Intermediate, 3, 5))
            .unwrap();
        let confidence = outcome.profile.unwrap().profile_confidence;
        assert!(confidence >= last);
        last = confidence;
    }
    assert!((last - 0.95).abs() < 1e-9);
}

#[test]
fn update_for_unknown_user_is_not_found() {
    let engine = inline_engine();
    let err = engine
        .profiler()
        .update_profile("ghost", QuizResult::new("algebra", 90.0, DifficultyLevel::Beginner))
        .unwrap_err();
    assert!(matches!(err, AdaptiveError::ProfileNotFound(id) if id == "ghost"));
}

// ============================================================================
// Difficulty adaptation
// ============================================================================

#[test]
fn strong_intermediate_attempt_is_not_promoted() {
    let engine = inline_engine();
    let current = PerformanceRecord::new(0.9, 15.0, 0.8, DifficultyLevel::Intermediate);

    let estimate = engine
        .adapter()
        .estimate_proficiency("u1", "algebra", &current, &[]);
    let next = engine.next_difficulty("u1", "algebra", &current);

    assert!((estimate.performance_score - 0.85).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&estimate.blended));
    assert_ne!(next, DifficultyLevel::Advanced);
}

#[test]
fn prediction_is_repeatable_for_same_inputs() {
    let engine = inline_engine();
    for ratio in [0.5, 0.7, 0.9] {
        engine
            .estimator()
            .record_and_retrain("u1", "physics", record(ratio, DifficultyLevel::Beginner))
            .unwrap();
    }
    let current = record(0.8, DifficultyLevel::Beginner);

    let a = engine.predict_proficiency("u1", "physics", &current);
    let b = engine.predict_proficiency("u1", "physics", &current);

    assert_eq!(a, b);
    assert!((0.0..=1.0).contains(&a));
}

#[test]
fn difficulty_moves_at_most_one_step() {
    let engine = inline_engine();
    for level in DifficultyLevel::ALL {
        for ratio in [0.0, 0.5, 1.0] {
            let next = engine.next_difficulty("u1", "chemistry", &record(ratio, level));
            let delta = next.ordinal() as i32 - level.ordinal() as i32;
            assert!(delta.abs() <= 1, "{level} -> {next}");
        }
    }
}

#[test]
fn third_submission_trains_inline() {
    let engine = inline_engine();

    let outcomes: Vec<_> = (0..3)
        .map(|_| {
            engine
                .submit_quiz("u1", true_false_quiz("algebra", DifficultyLevel::Beginner, 4, 5))
                .unwrap()
        })
        .collect();

    assert!(matches!(outcomes[0].retrain, Some(RetrainOutcome::NotEnoughData { .. })));
    assert_eq!(outcomes[2].retrain, Some(RetrainOutcome::Trained));
    assert_eq!(outcomes[2].record.streak, 3);
    assert!(engine.estimator().has_model("u1", "algebra"));
}

// ============================================================================
// Background training
// ============================================================================

#[tokio::test]
async fn background_worker_trains_after_submission() {
    let engine = Arc::new(AdaptiveEngine::in_memory(background_config()));
    let handle = engine.start_training_worker().expect("worker should start");
    assert!(engine.start_training_worker().is_none());

    let mut last = None;
    for _ in 0..3 {
        last = engine
            .submit_quiz("u1", true_false_quiz("biology", DifficultyLevel::Beginner, 5, 5))
            .unwrap()
            .retrain;
    }
    assert_eq!(last, Some(RetrainOutcome::Scheduled));

    let estimator = engine.estimator();
    let mut trained = false;
    for _ in 0..200 {
        if estimator.has_model("u1", "biology") && !estimator.is_training_pending("u1", "biology") {
            trained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(trained);

    handle.shutdown().await.unwrap();
}

// ============================================================================
// SQLite persistence
// ============================================================================

#[test]
fn sqlite_engine_keeps_profiles_and_models_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles.db");
    let current = record(0.75, DifficultyLevel::Beginner);

    let before = {
        let engine = AdaptiveEngine::open_sqlite(inline_config(), &path).unwrap();
        engine
            .onboard(
                "u1",
                BackgroundInfo {
                    interests: vec!["spanish".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        for _ in 0..3 {
            engine
                .submit_quiz("u1", true_false_quiz("spanish", DifficultyLevel::Beginner, 4, 5))
                .unwrap();
        }
        engine.predict_proficiency("u1", "spanish", &current)
    };

    let engine = AdaptiveEngine::open_sqlite(inline_config(), &path).unwrap();
    let profile = engine.profiler().load_profile("u1").unwrap();
    assert_eq!(profile.quiz_history.len(), 3);
    assert!(profile.relevant_domains.contains("languages"));
    assert_eq!(engine.estimator().history("u1", "spanish").len(), 3);

    let after = engine.predict_proficiency("u1", "spanish", &current);
    assert!((before - after).abs() < 1e-12);
}

#[test]
fn host_config_selects_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let host = Config {
        profile_db_path: Some(dir.path().join("host.db")),
        training_mode: adaptive_quiz::adaptive::config::TrainingMode::Inline,
        ..Default::default()
    };

    let engine = AdaptiveEngine::from_config(&host).unwrap();
    engine.onboard("u1", BackgroundInfo::default()).unwrap();
    drop(engine);

    let reopened = AdaptiveEngine::from_config(&host).unwrap();
    assert!(reopened.profiler().load_profile("u1").is_some());
    assert!(dir.path().join("host.db").exists());
}
