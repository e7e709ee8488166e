//! End-to-end feedback ingestion and overlay composition

mod common;

use brewlearn_core::{BrewContext, FlagOverrides, VarKey};
use common::{body_payload, create_test_engine, PayloadBuilder};

fn tags(t: &[&str]) -> Vec<String> {
    t.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_warmup_then_learning_goes_live() {
    let (_dir, _clock, engine) = create_test_engine();

    let modes: Vec<String> = (1..=3)
        .map(|i| {
            engine
                .handle_feedback(&body_payload("u1", &format!("s{}", i)))
                .unwrap()
                .learning_state
                .mode
        })
        .collect();
    assert_eq!(modes, vec!["waiting(1/3)", "waiting(2/3)", "ON"]);

    let overlay = engine.edges().overlays_for_goals(&tags(&["body"])).unwrap();
    assert!(overlay.temp_delta > 0.0);
    assert!(overlay.grind_delta > 0.0);
    assert!(overlay.agitation_delta > 0.0);

    let graph = engine.edges().snapshot();
    let temp = &graph.edges["body::temp_delta"];
    assert!((temp.score - 0.024).abs() < 1e-9);
}

#[test]
fn test_warmup_feedback_leaves_edges_untouched() {
    let (_dir, _clock, engine) = create_test_engine();

    let outcome = engine.handle_feedback(&body_payload("u1", "s1")).unwrap();
    assert!(outcome.ok);
    assert!(outcome.stored_path.unwrap().exists());
    assert!(engine.edges().snapshot().edges.is_empty());
    assert!(engine.edges().overlays_for_goals(&tags(&["body"])).is_none());
}

#[test]
fn test_resubmitted_session_is_ignored() {
    let (_dir, _clock, engine) = create_test_engine();

    let outcomes: Vec<_> = [&["body"][..], &["floral"][..], &["floral"][..]]
        .iter()
        .map(|goals| {
            let payload = PayloadBuilder::new("u1", "s1")
                .goals(goals)
                .rating(5.0)
                .protocol(94.0, "coarse", "high")
                .build();
            engine.handle_feedback(&payload).unwrap()
        })
        .collect();

    let modes: Vec<&str> = outcomes.iter().map(|o| o.learning_state.mode.as_str()).collect();
    assert_eq!(modes, vec!["waiting(1/3)"; 3]);
    assert!(outcomes[1].duplicate && outcomes[2].duplicate);
    assert!(outcomes.iter().all(|o| o.goal_tags == tags(&["body"])));
    assert!(engine.edges().snapshot().edges.is_empty());
    assert_eq!(engine.progress("u1").unwrap().sessions, 1);
}

#[test]
fn test_lookalike_user_ids_do_not_share_history() {
    let (_dir, _clock, engine) = create_test_engine();
    engine.handle_feedback(&body_payload("alice.smith", "s1")).unwrap();
    engine.handle_feedback(&body_payload("alice.smith", "s2")).unwrap();

    let fresh = engine.handle_feedback(&body_payload("alice_smith", "s1")).unwrap();
    assert!(!fresh.duplicate);
    assert_eq!(fresh.learning_state.mode, "waiting(1/3)");
    assert_eq!(fresh.profile_history_count, 1);
    assert_eq!(engine.evaluator_state("alice.smith").unwrap().count, 2);
}

#[test]
fn test_missing_session_id_is_rejected() {
    let (_dir, _clock, engine) = create_test_engine();
    let mut payload = body_payload("u1", "s1");
    payload.session_id = None;

    let err = engine.handle_feedback(&payload).unwrap_err();
    assert!(err.is_user_visible());
    assert_eq!(engine.evaluator_state("u1").unwrap().count, 0);
}

#[test]
fn test_negative_feedback_pushes_edges_down() {
    let (_dir, _clock, engine) = create_test_engine();
    for i in 1..=3 {
        let payload = PayloadBuilder::new("u2", &format!("s{}", i))
            .goals(&["Floral"])
            .rating(1.0)
            .protocol(96.0, "medium", "moderate")
            .build();
        engine.handle_feedback(&payload).unwrap();
    }

    let graph = engine.edges().snapshot();
    assert!(graph.edges["floral::temp_delta"].score < 0.0);
    assert!(graph.edges["floral::temp_delta"].neg > 0.0);
}

#[test]
fn test_learned_edges_flow_into_overlay_and_respect_flags() {
    let (_dir, _clock, engine) = create_test_engine();
    for i in 1..=3 {
        engine
            .handle_feedback(&body_payload("u1", &format!("s{}", i)))
            .unwrap();
    }

    let context = BrewContext::default();
    let with_edges = engine
        .compute_overlays("u1", &tags(&["Body"]), &context, None)
        .unwrap();
    assert!(with_edges.trace.edges > 0.0);
    assert!(with_edges.overlay.get(VarKey::TempDelta) > 0.0);

    let off = FlagOverrides::from_pairs(&["use_learned_edges=false"]).unwrap();
    let without = engine
        .compute_overlays("u1", &tags(&["body"]), &context, Some(&off))
        .unwrap();
    assert_eq!(without.trace.edges, 0.0);
}

#[test]
fn test_explanation_is_persisted_per_user() {
    let (_dir, _clock, engine) = create_test_engine();
    let context = BrewContext {
        hint: Some("body".to_string()),
        ..Default::default()
    };

    let result = engine
        .compute_overlays("u1", &tags(&["body"]), &context, None)
        .unwrap();
    assert!(result.explanation.starts_with("Slightly finer & warmer"));

    let saved = engine.load_last_explanation("u1").unwrap().unwrap();
    assert_eq!(saved.text, result.explanation);
    assert!(engine.load_last_explanation("someone-else").unwrap().is_none());
}

#[test]
fn test_progress_tracks_learning_gain() {
    let (_dir, _clock, engine) = create_test_engine();
    for (i, rating) in [2.0, 2.0, 4.0, 4.0].iter().enumerate() {
        let payload = PayloadBuilder::new("u3", &format!("s{}", i))
            .goals(&["clarity"])
            .rating(*rating)
            .build();
        engine.handle_feedback(&payload).unwrap();
    }

    let report = engine.progress("u3").unwrap();
    assert_eq!(report.sessions, 4);
}

#[test]
fn test_global_metrics_and_profile_index() {
    let (_dir, _clock, engine) = create_test_engine();
    for i in 1..=3 {
        let payload = PayloadBuilder::new("u1", &format!("s{}", i))
            .goals(&["floral"])
            .rating(4.0)
            .notes(&["jasmine", "peach"], &["peach"])
            .free_text("a little bitter at the end")
            .build();
        engine.handle_feedback(&payload).unwrap();
    }
    engine
        .handle_feedback(&PayloadBuilder::new("u2", "s1").rating(3.0).build())
        .unwrap();

    let global = engine.global_progress();
    assert_eq!(global.users, 2);
    assert!((global.alignment_rate - 0.5).abs() < 1e-9);
    assert!((global.calibration_hit - 0.5).abs() < 1e-9);
    assert!(global.learning_gain.abs() < 1e-9);

    // Only u1 reached live learning and has a profile
    let entry = engine.profile_index().get("u1").unwrap();
    assert_eq!(entry.history_count, 1);
    assert!(entry.note_sensitivity["peach"] > 0.0);
    assert_eq!(engine.reindex_profiles(None).unwrap(), 1);
    assert!(engine.profile_index().get("u2").is_none());
}
