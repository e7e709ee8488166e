//! The learning engine facade
//!
//! Owns one instance of every learner, wired to a shared [`JsonStore`] and
//! [`SessionStore`], and exposes the operations a recipe service calls:
//! feedback ingestion, overlay composition, and maintenance.

use crate::clock::{Clock, SystemClock};
use crate::config::LearningConfig;
use crate::error::{BrewError, Result};
use crate::learning::{
    composer::{ComposerSources, OverlayComposer},
    explain::{Explanation, ExplanationLog},
    features,
    surrogate::featurize,
    ClipTelemetry, CohortModel, Curriculum, EdgeLearner, Evaluator, EvaluatorState, FlagOverrides,
    FlagResolver, GlobalProgress, Personalizer, PracticeManager, Preferences, ProfileIndex,
    ProgressReport, ProgressTracker, ShadowModel, SurrogatePlanner, WatchdogReport,
};
use crate::maintenance::{
    self, AcceptReport, BackgroundScheduler, DecayJob, DecayReport, Discovery, DiscoveryJob,
    DiscoveryReport, OfflineEvaluator, OfflineReport, PruneJob, PruneReport,
};
use crate::storage::{Appended, FileSessionStore, JsonStore, SessionStore};
use crate::types::{schema_version, BrewContext, FeedbackEvent, FeedbackPayload, OverlayResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluator state as reported back to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStateView {
    pub mode: String,
    pub count: u32,
    pub threshold: u32,
}

impl From<&EvaluatorState> for LearningStateView {
    fn from(state: &EvaluatorState) -> Self {
        Self {
            mode: state.mode.to_string(),
            count: state.count,
            threshold: state.threshold,
        }
    }
}

/// Which learners ran for a feedback event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerSummary {
    pub applied: Vec<String>,
    pub failed: Vec<String>,
    /// Skipped because learning is not live yet
    pub suppressed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub ok: bool,
    pub stored_path: Option<PathBuf>,
    /// The session was already stored; nothing was updated
    #[serde(default)]
    pub duplicate: bool,
    pub sentiment: f64,
    pub nudges_used: crate::types::Overlay,
    pub goal_tags: Vec<String>,
    /// Sessions stored for the user
    pub profile_history_count: u32,
    pub learning_state: LearningStateView,
    pub learners: LearnerSummary,
}

const LEARNERS: [&str; 5] = ["edges", "personalizer", "shadow", "cohort", "surrogate"];

pub struct LearningEngine {
    config: LearningConfig,
    clock: Arc<dyn Clock>,
    sessions: Arc<dyn SessionStore>,
    evaluator: Evaluator,
    flags: FlagResolver,
    edges: Arc<EdgeLearner>,
    personalizer: Arc<Personalizer>,
    shadow: Arc<ShadowModel>,
    cohort: Arc<CohortModel>,
    curriculum: Arc<Curriculum>,
    practice: Arc<PracticeManager>,
    surrogate: Arc<SurrogatePlanner>,
    composer: OverlayComposer,
    telemetry: ClipTelemetry,
    explanations: ExplanationLog,
    progress: ProgressTracker,
    profile_index: ProfileIndex,
    discovery: Arc<Discovery>,
    offline: OfflineEvaluator,
}

impl LearningEngine {
    pub fn new(config: LearningConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LearningConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Arc::new(JsonStore::open(&config.data_dir)?);
        let sessions: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(store.clone()));
        Ok(Self::assemble(config, clock, store, sessions))
    }

    /// Wire the engine around an existing session store
    pub fn with_session_store(
        config: LearningConfig,
        clock: Arc<dyn Clock>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let store = Arc::new(JsonStore::open(&config.data_dir)?);
        Ok(Self::assemble(config, clock, store, sessions))
    }

    fn assemble(
        config: LearningConfig,
        clock: Arc<dyn Clock>,
        store: Arc<JsonStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let edges = Arc::new(EdgeLearner::new(store.clone(), config.edges.clone()));
        let personalizer = Arc::new(Personalizer::new(store.clone(), config.personalizer.clone()));
        let shadow = Arc::new(ShadowModel::new(store.clone(), config.shadow.clone()));
        let cohort = Arc::new(CohortModel::new(store.clone(), &config.cohort));
        let curriculum = Arc::new(Curriculum::new(store.clone(), config.curriculum.clone()));
        let practice = Arc::new(PracticeManager::new(store.clone()));
        let surrogate = Arc::new(SurrogatePlanner::new(store.clone(), config.surrogate.clone()));

        let composer = OverlayComposer::new(
            ComposerSources {
                seed: cohort.clone(),
                edges: edges.clone(),
                personal: personalizer.clone(),
                curriculum: curriculum.clone(),
                practice: practice.clone(),
                shadow: shadow.clone(),
                planner: surrogate.clone(),
            },
            sessions.clone(),
            config.composer.clone(),
            config.cohort.cold_start_sessions,
        );

        Self {
            evaluator: Evaluator::new(store.clone(), config.evaluator.threshold),
            flags: FlagResolver::new(store.clone()),
            telemetry: ClipTelemetry::new(store.clone()),
            explanations: ExplanationLog::new(store.clone()),
            progress: ProgressTracker::new(store.clone()),
            profile_index: ProfileIndex::new(store.clone()),
            discovery: Arc::new(Discovery::new(store, sessions.clone())),
            offline: OfflineEvaluator::new(sessions.clone()),
            config,
            clock,
            sessions,
            edges,
            personalizer,
            shadow,
            cohort,
            curriculum,
            practice,
            surrogate,
            composer,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Ingest one feedback payload
    ///
    /// Only a payload without identity is rejected. Every other failure is
    /// logged and reported in the outcome. A session that is already stored
    /// is left as it was and reported as a duplicate.
    pub fn handle_feedback(&self, payload: &FeedbackPayload) -> Result<FeedbackOutcome> {
        let now = self.clock.now();
        let event = features::to_event(payload, now)?;
        let user_id = event.user_id.as_str();

        let stored_path = match self.sessions.append(&event) {
            Ok(Appended {
                handle,
                created: false,
            }) => return Ok(self.duplicate_outcome(&event, handle)),
            Ok(appended) => Some(appended.handle),
            Err(e) => {
                warn!("Failed to store session {} for {}: {}", event.session_id, user_id, e);
                None
            }
        };

        if let Err(e) = self.progress.record(&event, now) {
            warn!("Failed to record progress for {}: {}", user_id, e);
        }

        let state = self
            .evaluator
            .update_on_feedback(user_id)
            .unwrap_or_else(|e| {
                warn!("Evaluator unavailable for {}, suppressing learners: {}", user_id, e);
                self.current_state(user_id)
            });

        let mut learners = LearnerSummary::default();
        if state.is_live() {
            self.apply_learners(&event, now, &mut learners);
        } else {
            debug!("Learning {} for {}, learners suppressed", state.mode, user_id);
            learners.suppressed = LEARNERS.iter().map(|s| s.to_string()).collect();
        }

        info!(
            "Feedback {} from {}: sentiment {:.2}, {} ({} learners applied)",
            event.session_id,
            user_id,
            event.sentiment,
            state.mode,
            learners.applied.len()
        );

        Ok(FeedbackOutcome {
            ok: true,
            stored_path,
            duplicate: false,
            sentiment: event.sentiment,
            nudges_used: event.nudges,
            goal_tags: event.goal_tags.clone(),
            profile_history_count: self.stored_sessions(user_id),
            learning_state: LearningStateView::from(&state),
            learners,
        })
    }

    /// Outcome for a resubmitted session, reporting the stored event
    fn duplicate_outcome(&self, event: &FeedbackEvent, handle: PathBuf) -> FeedbackOutcome {
        let user_id = event.user_id.as_str();
        info!(
            "Session {} from {} already stored, ignoring resubmission",
            event.session_id, user_id
        );

        let stored = match self.sessions.read(&handle) {
            Ok(Some(stored)) => stored,
            Ok(None) => event.clone(),
            Err(e) => {
                warn!("Failed to read stored session {}: {}", handle.display(), e);
                event.clone()
            }
        };

        FeedbackOutcome {
            ok: true,
            stored_path: Some(handle),
            duplicate: true,
            sentiment: stored.sentiment,
            nudges_used: stored.nudges,
            goal_tags: stored.goal_tags,
            profile_history_count: self.stored_sessions(user_id),
            learning_state: LearningStateView::from(&self.current_state(user_id)),
            learners: LearnerSummary::default(),
        }
    }

    /// Evaluator state without counting anything; OFF when unreadable
    fn current_state(&self, user_id: &str) -> EvaluatorState {
        self.evaluator.state(user_id).unwrap_or_else(|_| EvaluatorState {
            schema_version: schema_version(),
            scope: user_id.to_string(),
            mode: crate::learning::LearningMode::Off,
            count: 0,
            threshold: self.evaluator.threshold(),
        })
    }

    fn stored_sessions(&self, user_id: &str) -> u32 {
        match self.sessions.count_for_user(user_id) {
            Ok(count) => u32::try_from(count).unwrap_or(u32::MAX),
            Err(e) => {
                warn!("Failed to count sessions for {}: {}", user_id, e);
                0
            }
        }
    }

    fn apply_learners(
        &self,
        event: &FeedbackEvent,
        now: chrono::DateTime<chrono::Utc>,
        summary: &mut LearnerSummary,
    ) {
        let user_id = event.user_id.as_str();
        let mut record = |name: &str, result: Result<()>| match result {
            Ok(()) => summary.applied.push(name.to_string()),
            Err(e) => {
                warn!("Learner {} failed for {}: {}", name, user_id, e);
                summary.failed.push(name.to_string());
            }
        };

        record(
            "edges",
            self.edges
                .register_feedback(&event.goal_tags, &event.nudges, event.sentiment, now)
                .map(|_| ()),
        );

        record(
            "personalizer",
            self.personalizer
                .update_from_feedback(
                    user_id,
                    &event.notes_confirmed,
                    &event.notes_missing,
                    &event.goal_tags,
                    event.sentiment,
                    now,
                )
                .map(|profile| {
                    if let Err(e) = self.profile_index.sync(&profile) {
                        warn!("Failed to index profile for {}: {}", user_id, e);
                    }
                }),
        );

        record(
            "shadow",
            self.shadow
                .update(user_id, &event.nudges, event.sentiment)
                .map(|_| ()),
        );

        record(
            "cohort",
            self.cohort
                .update(&event.context, &event.nudges, event.sentiment)
                .map(|_| ()),
        );

        let surrogate_features = featurize(&event.protocol, &event.goal_tags);
        record(
            "surrogate",
            self.surrogate
                .update(user_id, &surrogate_features, event.rating_overall)
                .map(|_| ()),
        );
    }

    /// Compose the bounded overlay for a recipe request
    pub fn compute_overlays(
        &self,
        user_id: &str,
        goal_tags: &[String],
        context: &BrewContext,
        flags_override: Option<&FlagOverrides>,
    ) -> Result<OverlayResult> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(BrewError::MalformedInput("user_id is required".to_string()));
        }

        let now = self.clock.now();
        let mut tags: Vec<String> = Vec::new();
        for tag in goal_tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let flags = self.flags.resolve(Some(user_id), flags_override);
        let result = self.composer.compose(user_id, &flags, context, &tags, now);

        if let Err(e) = self.telemetry.record(result.clipped) {
            warn!("Failed to record clip telemetry: {}", e);
        }

        let explanation = Explanation {
            schema_version: schema_version(),
            user_id: user_id.to_string(),
            text: result.explanation.clone(),
            trace: result.trace,
            overlay: result.overlay,
            clipped: result.clipped,
            created_at: now,
        };
        if let Err(e) = self.explanations.save(&explanation) {
            warn!("Failed to persist explanation for {}: {}", user_id, e);
        }

        Ok(result)
    }

    pub fn load_last_explanation(&self, user_id: &str) -> Result<Option<Explanation>> {
        self.explanations.load_last(user_id)
    }

    /// Decay every edge (`factor` defaults to the configured 0.995)
    pub fn decay(&self, factor: Option<f64>) -> Result<DecayReport> {
        maintenance::decay(&self.edges, factor.unwrap_or(self.config.maintenance.decay_factor))
    }

    pub fn prune(&self, threshold: Option<f64>, top_n: Option<usize>) -> Result<PruneReport> {
        let cfg = &self.config.maintenance;
        maintenance::prune(
            &self.edges,
            threshold.unwrap_or(cfg.prune_threshold),
            top_n.unwrap_or(cfg.prune_top_n),
        )
    }

    pub fn discover(&self, window_days: Option<u32>) -> Result<DiscoveryReport> {
        let cfg = &self.config.maintenance;
        self.discovery.discover(
            window_days.unwrap_or(cfg.window_days),
            cfg.discovery_min_count,
            self.clock.now(),
        )
    }

    pub fn accept_proposal(&self, id: &str) -> Result<AcceptReport> {
        self.discovery.accept(&self.edges, id, self.clock.now())
    }

    pub fn offline_evaluate(&self, window_days: Option<u32>) -> Result<OfflineReport> {
        self.offline.evaluate(
            window_days.unwrap_or(self.config.maintenance.window_days),
            self.clock.now(),
        )
    }

    /// Scheduler with the decay, prune and discovery jobs registered
    pub fn scheduler(&self) -> BackgroundScheduler {
        let cfg = &self.config.maintenance;
        let mut scheduler = BackgroundScheduler::new(cfg.clone());
        scheduler.register_job(Arc::new(DecayJob::new(self.edges.clone(), cfg.decay_factor)));
        scheduler.register_job(Arc::new(PruneJob::new(
            self.edges.clone(),
            cfg.prune_threshold,
            cfg.prune_top_n,
        )));
        scheduler.register_job(Arc::new(DiscoveryJob::new(
            self.discovery.clone(),
            cfg.window_days,
            cfg.discovery_min_count,
        )));
        scheduler
    }

    pub fn evaluator_state(&self, user_id: &str) -> Result<EvaluatorState> {
        self.evaluator.state(user_id)
    }

    pub fn progress(&self, user_id: &str) -> Result<ProgressReport> {
        self.progress.report(user_id)
    }

    /// Cross-user alignment, learning gain and calibration
    pub fn global_progress(&self) -> GlobalProgress {
        self.progress.global()
    }

    /// Re-sync the profile index for the given users, or every stored profile
    pub fn reindex_profiles(&self, user_ids: Option<&[String]>) -> Result<usize> {
        self.profile_index.backfill(user_ids)
    }

    pub fn profile_index(&self) -> &ProfileIndex {
        &self.profile_index
    }

    pub fn watchdog(&self) -> Result<WatchdogReport> {
        self.telemetry.watchdog(self.clock.now())
    }

    pub fn preferences(&self, user_id: &str, top: usize) -> Result<Preferences> {
        self.personalizer.preferences(user_id, self.clock.now(), top)
    }

    pub fn flags(&self) -> &FlagResolver {
        &self.flags
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn practice(&self) -> &PracticeManager {
        &self.practice
    }

    pub fn edges(&self) -> &EdgeLearner {
        &self.edges
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{GoalItem, ProtocolSummary, Ratings};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn engine() -> (TempDir, LearningEngine) {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()));
        let engine =
            LearningEngine::with_clock(LearningConfig::with_data_dir(dir.path()), clock).unwrap();
        (dir, engine)
    }

    fn payload(user: &str, session: &str) -> FeedbackPayload {
        FeedbackPayload {
            user_id: Some(user.to_string()),
            session_id: Some(session.to_string()),
            goals: vec![GoalItem {
                tags: vec!["Body".to_string()],
            }],
            ratings: Ratings {
                overall: Some(5.0),
                ..Default::default()
            },
            protocol: ProtocolSummary {
                temperature_c: Some(94.0),
                grind_label: Some("coarse".to_string()),
                agitation_overall: Some("high".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_identity_is_rejected_before_persistence() {
        let (dir, engine) = engine();
        let mut bad = payload("u1", "s1");
        bad.user_id = None;

        let err = engine.handle_feedback(&bad).unwrap_err();
        assert!(err.is_user_visible());
        assert!(!dir.path().join("history/sessions").exists());
    }

    #[test]
    fn test_learners_suppressed_until_live() {
        let (_dir, engine) = engine();

        let first = engine.handle_feedback(&payload("u1", "s1")).unwrap();
        assert!(first.ok);
        assert!(first.stored_path.is_some());
        assert_eq!(first.learning_state.mode, "waiting(1/3)");
        assert_eq!(first.learners.suppressed.len(), LEARNERS.len());
        assert!(first.learners.applied.is_empty());
        assert_eq!(first.goal_tags, vec!["body".to_string()]);
        assert!((first.sentiment - 1.0).abs() < 1e-9);

        engine.handle_feedback(&payload("u1", "s2")).unwrap();
        let third = engine.handle_feedback(&payload("u1", "s3")).unwrap();
        assert_eq!(third.learning_state.mode, "ON");
        assert_eq!(third.learners.applied.len(), LEARNERS.len());
        assert_eq!(third.profile_history_count, 3);
        assert_eq!(engine.profile_index().get("u1").unwrap().history_count, 1);
    }

    #[test]
    fn test_resubmitted_session_changes_nothing() {
        let (_dir, engine) = engine();
        let first = engine.handle_feedback(&payload("u1", "s1")).unwrap();
        assert!(!first.duplicate);

        let mut floral = payload("u1", "s1");
        floral.goals = vec![GoalItem {
            tags: vec!["floral".to_string()],
        }];
        for _ in 0..2 {
            let again = engine.handle_feedback(&floral).unwrap();
            assert!(again.ok);
            assert!(again.duplicate);
            assert_eq!(again.stored_path, first.stored_path);
            assert_eq!(again.goal_tags, vec!["body".to_string()]);
            assert_eq!(again.learning_state.mode, "waiting(1/3)");
            assert_eq!(again.profile_history_count, 1);
            assert!(again.learners.suppressed.is_empty());
        }

        let stored = engine
            .sessions
            .read(first.stored_path.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.goal_tags, vec!["body".to_string()]);
        assert_eq!(engine.progress("u1").unwrap().sessions, 1);
        assert_eq!(engine.evaluator_state("u1").unwrap().count, 1);
    }

    #[test]
    fn test_lookalike_users_are_tracked_apart() {
        let (_dir, engine) = engine();
        let dotted = engine.handle_feedback(&payload("alice.smith", "s1")).unwrap();
        let underscored = engine.handle_feedback(&payload("alice_smith", "s1")).unwrap();

        assert!(!underscored.duplicate);
        assert_ne!(dotted.stored_path, underscored.stored_path);
        assert_eq!(underscored.learning_state.mode, "waiting(1/3)");
        assert_eq!(underscored.profile_history_count, 1);
        assert_eq!(engine.progress("alice.smith").unwrap().sessions, 1);
    }

    #[test]
    fn test_feedback_updates_progress_metrics() {
        let (_dir, engine) = engine();
        let mut p = payload("u1", "s1");
        p.prediction = Some(crate::types::Prediction {
            predicted_notes: vec!["jasmine".to_string()],
        });
        p.notes_confirmed = vec!["Jasmine".to_string()];
        p.free_text = Some("slightly sour finish".to_string());
        engine.handle_feedback(&p).unwrap();

        let report = engine.progress("u1").unwrap();
        assert_eq!(report.alignment_hits, 1);
        assert_eq!(report.calib_sour, 1);

        let global = engine.global_progress();
        assert_eq!(global.users, 1);
        assert!((global.alignment_rate - 1.0).abs() < 1e-9);
        assert!((global.calibration_hit - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compute_overlays_persists_explanation_and_telemetry() {
        let (_dir, engine) = engine();
        let context = BrewContext {
            hint: Some("clarity".to_string()),
            ..Default::default()
        };

        let result = engine
            .compute_overlays("u1", &["Floral".to_string()], &context, None)
            .unwrap();
        assert!(result.explanation.starts_with("Cooler water"));

        let saved = engine.load_last_explanation("u1").unwrap().unwrap();
        assert_eq!(saved.text, result.explanation);
        assert_eq!(engine.telemetry.counters().total, 1);

        assert!(engine
            .compute_overlays(" ", &[], &context, None)
            .unwrap_err()
            .is_user_visible());
    }
}
