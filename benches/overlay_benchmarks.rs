//! Benchmarks for overlay composition and feedback ingestion
//!
//! Both paths run per request, so each should stay well under a millisecond
//! beyond the cost of the JSON document reads.

use brewlearn_core::types::{GoalItem, ProtocolSummary, Ratings};
use brewlearn_core::{BrewContext, FeedbackPayload, FlagOverrides, LearningConfig, LearningEngine};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

fn payload(user: &str, session: usize) -> FeedbackPayload {
    FeedbackPayload {
        user_id: Some(user.to_string()),
        session_id: Some(format!("bench-{}", session)),
        goals: vec![GoalItem {
            tags: vec!["body".to_string(), "sweetness".to_string()],
        }],
        ratings: Ratings {
            overall: Some(4.0),
            ..Default::default()
        },
        protocol: ProtocolSummary {
            temperature_c: Some(94.0),
            grind_label: Some("medium-fine".to_string()),
            agitation_overall: Some("high".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Engine with a warmed-up user
fn warm_engine() -> (TempDir, LearningEngine) {
    let dir = TempDir::new().unwrap();
    let engine = LearningEngine::new(LearningConfig::with_data_dir(dir.path())).unwrap();
    for i in 0..10 {
        engine.handle_feedback(&payload("bench-user", i)).unwrap();
    }
    (dir, engine)
}

fn bench_compute_overlays(c: &mut Criterion) {
    let (_dir, engine) = warm_engine();
    let goals = vec!["body".to_string(), "sweetness".to_string()];
    let context = BrewContext {
        process: Some("natural".to_string()),
        roast: Some("medium".to_string()),
        ..Default::default()
    };
    let planner_on = FlagOverrides::from_pairs(&["use_model_planner=true"]).unwrap();

    let mut group = c.benchmark_group("compute_overlays");
    group.bench_function("default_flags", |b| {
        b.iter(|| {
            engine
                .compute_overlays(black_box("bench-user"), black_box(&goals), &context, None)
                .unwrap()
        })
    });
    group.bench_function("with_planner", |b| {
        b.iter(|| {
            engine
                .compute_overlays(
                    black_box("bench-user"),
                    black_box(&goals),
                    &context,
                    Some(&planner_on),
                )
                .unwrap()
        })
    });
    group.finish();
}

fn bench_handle_feedback(c: &mut Criterion) {
    let (_dir, engine) = warm_engine();
    let mut session = 100;

    c.bench_function("handle_feedback_live", |b| {
        b.iter(|| {
            session += 1;
            engine
                .handle_feedback(black_box(&payload("bench-user", session)))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_compute_overlays, bench_handle_feedback);
criterion_main!(benches);
