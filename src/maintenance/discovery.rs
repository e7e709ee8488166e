// Association Discovery
//
// Mines recent sessions for goal-tag / variable-direction pairs that
// co-occur more often than chance (PMI). Proposals are persisted for manual
// triage; accepting one nudges the matching global edge.

use super::config::JobConfig;
use super::scheduler::{run_blocking, JobError, JobReport, MaintenanceJob};
use crate::error::{BrewError, Result};
use crate::learning::edges::{edge_key, EdgeLearner};
use crate::storage::{paths, DocPath, JsonStore, SessionStore};
use crate::types::{schema_version, FeedbackEvent, VarKey};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Nudges within this band carry no direction
const DEAD_ZONE: f64 = 0.02;
const MAX_PROPOSALS: usize = 40;
/// Score added to an edge when its proposal is accepted
const ACCEPT_STEP: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "+")]
    Up,
    #[serde(rename = "-")]
    Down,
}

impl Direction {
    fn of(value: f64) -> Option<Self> {
        if value > DEAD_ZONE {
            Some(Direction::Up)
        } else if value < -DEAD_ZONE {
            Some(Direction::Down)
        } else {
            None
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Direction::Up => '+',
            Direction::Down => '-',
        }
    }

    pub fn signum(&self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCounts {
    pub pair: usize,
    pub goal: usize,
    pub variable: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// `goal->variable±`
    pub id: String,
    pub goal: String,
    pub variable: VarKey,
    pub direction: Direction,
    pub pmi: f64,
    pub confidence: f64,
    pub counts: PairCounts,
}

pub fn proposal_id(goal: &str, variable: VarKey, direction: Direction) -> String {
    format!("{}->{}{}", goal, variable.as_str(), direction.symbol())
}

/// Split `goal->variable±` into its parts
pub fn parse_proposal_id(id: &str) -> Result<(String, VarKey, Direction)> {
    let malformed = || BrewError::MalformedInput(format!("unrecognised proposal id '{}'", id));

    let (goal, rest) = id.trim().split_once("->").ok_or_else(malformed)?;
    let direction = match rest.chars().last() {
        Some('+') => Direction::Up,
        Some('-') => Direction::Down,
        _ => return Err(malformed()),
    };
    let variable = VarKey::parse(&rest[..rest.len() - 1]).ok_or_else(malformed)?;
    let goal = goal.trim();
    if goal.is_empty() {
        return Err(malformed());
    }
    Ok((goal.to_string(), variable, direction))
}

/// PMI-ranked proposals from a batch of sessions
pub fn suggest(events: &[FeedbackEvent], min_count: usize) -> Vec<Proposal> {
    let mut pairs: BTreeMap<(String, VarKey, Direction), usize> = BTreeMap::new();
    let mut goals: BTreeMap<String, usize> = BTreeMap::new();
    let mut variables: BTreeMap<(VarKey, Direction), usize> = BTreeMap::new();

    for event in events {
        let signs: Vec<(VarKey, Direction)> = event
            .nudges
            .iter()
            .filter_map(|(var, value)| Direction::of(value).map(|d| (var, d)))
            .collect();
        if event.goal_tags.is_empty() || signs.is_empty() {
            continue;
        }
        for tag in &event.goal_tags {
            *goals.entry(tag.clone()).or_default() += 1;
            for &(var, direction) in &signs {
                *pairs.entry((tag.clone(), var, direction)).or_default() += 1;
                *variables.entry((var, direction)).or_default() += 1;
            }
        }
    }

    let total: usize = goals.values().sum();
    if total == 0 {
        return Vec::new();
    }
    let total = total as f64;

    let mut proposals: Vec<Proposal> = pairs
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|((goal, variable, direction), count)| {
            let goal_count = goals.get(&goal).copied().unwrap_or(0);
            let var_count = variables.get(&(variable, direction)).copied().unwrap_or(0);
            let p_pair = count as f64 / total;
            let p_goal = goal_count as f64 / total;
            let p_var = var_count as f64 / total;
            let pmi = (p_pair / (p_goal * p_var + 1e-9)).log2();
            let confidence = ((pmi / 4.0 + 0.5).clamp(0.0, 0.99) * 1000.0).round() / 1000.0;
            Proposal {
                id: proposal_id(&goal, variable, direction),
                goal,
                variable,
                direction,
                pmi,
                confidence,
                counts: PairCounts {
                    pair: count,
                    goal: goal_count,
                    variable: var_count,
                },
            }
        })
        .collect();

    proposals.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.id.cmp(&b.id))
    });
    proposals.truncate(MAX_PROPOSALS);
    proposals
}

/// Pending proposals awaiting review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingProposals {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub proposals: Vec<Proposal>,
}

impl Default for PendingProposals {
    fn default() -> Self {
        Self {
            schema_version: schema_version(),
            generated_at: None,
            proposals: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub proposals: Vec<Proposal>,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptReport {
    /// Edge key the proposal was merged into
    pub merged: String,
    pub score: f64,
    /// Whether the proposal was still pending
    pub was_pending: bool,
}

pub struct Discovery {
    store: Arc<JsonStore>,
    sessions: Arc<dyn SessionStore>,
}

impl Discovery {
    pub fn new(store: Arc<JsonStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { store, sessions }
    }

    fn pending_doc() -> DocPath {
        DocPath::global(paths::PENDING_PROPOSALS)
    }

    /// Scan the last `window_days` of sessions and persist the proposals
    pub fn discover(
        &self,
        window_days: u32,
        min_count: usize,
        now: DateTime<Utc>,
    ) -> Result<DiscoveryReport> {
        let since = now - Duration::days(i64::from(window_days));
        let events = self.sessions.list(Some(since))?;
        let proposals = suggest(&events, min_count);

        self.store.write(
            &Self::pending_doc(),
            &PendingProposals {
                schema_version: schema_version(),
                generated_at: Some(now),
                proposals: proposals.clone(),
            },
        )?;

        tracing::info!(
            "Discovery proposed {} associations from {} sessions",
            proposals.len(),
            events.len()
        );
        Ok(DiscoveryReport {
            proposals,
            sessions: events.len(),
        })
    }

    pub fn pending(&self) -> PendingProposals {
        self.store
            .read_or(&Self::pending_doc(), PendingProposals::default)
    }

    /// Nudge the edge named by `id` and drop the proposal from the pending list
    pub fn accept(&self, edges: &EdgeLearner, id: &str, now: DateTime<Utc>) -> Result<AcceptReport> {
        let (goal, variable, direction) = parse_proposal_id(id)?;
        let canonical = proposal_id(&goal, variable, direction);

        let score = edges.nudge_edge(&goal, variable, direction.signum() * ACCEPT_STEP, now)?;

        let was_pending = self.store.update(
            &Self::pending_doc(),
            PendingProposals::default,
            |pending| {
                let before = pending.proposals.len();
                pending.proposals.retain(|p| p.id != canonical);
                pending.proposals.len() != before
            },
        )?;

        let merged = edge_key(&goal, variable);
        tracing::info!("Accepted proposal {} into {} (score {:.3})", canonical, merged, score);
        Ok(AcceptReport {
            merged,
            score,
            was_pending,
        })
    }
}

pub struct DiscoveryJob {
    discovery: Arc<Discovery>,
    window_days: u32,
    min_count: usize,
}

impl DiscoveryJob {
    pub fn new(discovery: Arc<Discovery>, window_days: u32, min_count: usize) -> Self {
        Self {
            discovery,
            window_days,
            min_count,
        }
    }
}

#[async_trait]
impl MaintenanceJob for DiscoveryJob {
    fn name(&self) -> &str {
        "discovery"
    }

    async fn run(&self, _config: &JobConfig) -> std::result::Result<JobReport, JobError> {
        let discovery = self.discovery.clone();
        let (window_days, min_count) = (self.window_days, self.min_count);
        run_blocking(move || {
            let started = Instant::now();
            let report = discovery
                .discover(window_days, min_count, Utc::now())
                .map_err(|e| JobError::Execution(e.to_string()))?;
            Ok(JobReport::completed(report.sessions, report.proposals.len(), started))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeConfig;
    use crate::storage::FileSessionStore;
    use crate::types::{Overlay, ProtocolSummary};
    use tempfile::TempDir;

    fn event(session: &str, tags: &[&str], nudges: Overlay) -> FeedbackEvent {
        FeedbackEvent {
            schema_version: schema_version(),
            user_id: "u1".to_string(),
            session_id: session.to_string(),
            goal_tags: tags.iter().map(|s| s.to_string()).collect(),
            sentiment: 1.0,
            nudges,
            notes_confirmed: vec![],
            notes_missing: vec![],
            rating_overall: Some(5.0),
            protocol: ProtocolSummary::default(),
            context: Default::default(),
            decision: None,
            predicted_notes: vec![],
            free_text: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_parse_proposal_id() {
        let (goal, var, dir) = parse_proposal_id("floral->temp_delta-").unwrap();
        assert_eq!(goal, "floral");
        assert_eq!(var, VarKey::TempDelta);
        assert_eq!(dir, Direction::Down);

        assert!(parse_proposal_id("floral->temp_delta").is_err());
        assert!(parse_proposal_id("floral::temp_delta+").is_err());
        assert!(parse_proposal_id("->grind_delta+").is_err());
    }

    #[test]
    fn test_suggest_counts_and_dead_zone() {
        let mut events = Vec::new();
        for i in 0..6 {
            events.push(event(&format!("b{}", i), &["body"], Overlay::new(0.2, 0.01, 0.2)));
            events.push(event(&format!("f{}", i), &["floral"], Overlay::new(-0.2, 0.2, 0.0)));
        }

        let proposals = suggest(&events, 6);
        let ids: Vec<&str> = proposals.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"body->temp_delta+"));
        assert!(ids.contains(&"floral->temp_delta-"));
        // 0.01 falls inside the dead zone
        assert!(!ids.iter().any(|id| id.starts_with("body->grind_delta")));

        let body = proposals.iter().find(|p| p.id == "body->temp_delta+").unwrap();
        assert_eq!(body.counts.pair, 6);
        assert!(body.confidence > 0.5 && body.confidence <= 0.99);

        assert!(suggest(&events, 7).is_empty());
    }

    #[test]
    fn test_discover_then_accept() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        let sessions = Arc::new(FileSessionStore::new(store.clone()));
        for i in 0..6 {
            sessions
                .append(&event(&format!("s{}", i), &["floral"], Overlay::new(-0.3, 0.0, 0.0)))
                .unwrap();
        }

        let discovery = Discovery::new(store.clone(), sessions);
        let report = discovery.discover(30, 6, Utc::now()).unwrap();
        assert_eq!(report.sessions, 6);
        assert_eq!(report.proposals.len(), 1);
        assert_eq!(discovery.pending().proposals.len(), 1);

        let edges = EdgeLearner::new(store, EdgeConfig::default());
        let accepted = discovery
            .accept(&edges, "floral->temp_delta-", Utc::now())
            .unwrap();
        assert_eq!(accepted.merged, "floral::temp_delta");
        assert!((accepted.score + 0.02).abs() < 1e-9);
        assert!(accepted.was_pending);
        assert!(discovery.pending().proposals.is_empty());

        let err = discovery.accept(&edges, "nonsense", Utc::now()).unwrap_err();
        assert!(err.is_user_visible());
    }

    #[test]
    fn test_discovery_job_counts_sessions_and_proposals() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        let sessions = Arc::new(FileSessionStore::new(store.clone()));
        for i in 0..6 {
            sessions
                .append(&event(&format!("s{}", i), &["floral"], Overlay::new(-0.3, 0.0, 0.0)))
                .unwrap();
        }

        let job = DiscoveryJob::new(Arc::new(Discovery::new(store, sessions)), 30, 6);
        let report = tokio_test::block_on(job.run(&JobConfig::every(3600))).unwrap();
        assert_eq!(report.examined, 6);
        assert_eq!(report.changed, 1);
        assert!(report.error.is_none());
    }
}
