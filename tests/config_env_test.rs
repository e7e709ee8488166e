//! Layered configuration: defaults, TOML file, environment

use brewlearn_core::LearningConfig;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn clear_env() {
    env::remove_var("BREWLEARN_EVALUATOR__THRESHOLD");
    env::remove_var("BREWLEARN_LEARNING_THRESHOLD");
    env::remove_var("BREWLEARN_EDGES__POSITIVE_RATE");
}

#[test]
#[serial]
fn test_defaults_without_environment() {
    clear_env();
    let config = LearningConfig::load(None).unwrap();
    assert_eq!(config.evaluator.threshold, 3);
    assert_eq!(config.edges.score_clip, 0.75);
    assert_eq!(config.composer.final_cap, 0.3);
}

#[test]
#[serial]
fn test_file_layer_then_environment() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[evaluator]\nthreshold = 5\n\n[edges]\npositive_rate = 0.2").unwrap();

    let from_file = LearningConfig::load(Some(file.path())).unwrap();
    assert_eq!(from_file.evaluator.threshold, 5);
    assert!((from_file.edges.positive_rate - 0.2).abs() < 1e-9);

    env::set_var("BREWLEARN_EVALUATOR__THRESHOLD", "7");
    let from_env = LearningConfig::load(Some(file.path())).unwrap();
    assert_eq!(from_env.evaluator.threshold, 7);
    assert!((from_env.edges.positive_rate - 0.2).abs() < 1e-9);

    clear_env();
}

#[test]
#[serial]
fn test_learning_threshold_shortcut_wins() {
    clear_env();
    env::set_var("BREWLEARN_EVALUATOR__THRESHOLD", "7");
    env::set_var("BREWLEARN_LEARNING_THRESHOLD", "2");

    let config = LearningConfig::load(None).unwrap();
    assert_eq!(config.evaluator.threshold, 2);

    env::set_var("BREWLEARN_LEARNING_THRESHOLD", "soon");
    assert!(LearningConfig::load(None).is_err());

    clear_env();
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_env();
    env::set_var("BREWLEARN_LEARNING_THRESHOLD", "0");
    assert!(LearningConfig::load(None).is_err());
    clear_env();
}
