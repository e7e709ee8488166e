// Maintenance Module - Out-of-band upkeep of the global edge graph
//
// Components:
// - scheduler: periodic job execution with timeouts and run history
// - decay: multiplicative decay of every edge
// - prune: threshold and top-N-per-goal pruning
// - discovery: PMI association mining with a pending-proposal queue
// - offline_eval: IPS/DR evaluation of logged exploration decisions

pub mod config;
pub mod decay;
pub mod discovery;
pub mod offline_eval;
pub mod prune;
pub mod scheduler;

pub use config::{ConfigError, JobConfig, MaintenanceConfig};
pub use decay::{decay, DecayJob, DecayReport};
pub use discovery::{
    parse_proposal_id, AcceptReport, Direction, Discovery, DiscoveryJob, DiscoveryReport,
    PendingProposals, Proposal,
};
pub use offline_eval::{ArmEstimate, ConfidenceInterval, OfflineEvaluator, OfflineReport};
pub use prune::{prune, PruneJob, PruneReport};
pub use scheduler::{
    run_blocking, BackgroundScheduler, JobError, JobReport, JobRun, JobStatus, MaintenanceJob,
    SchedulerError,
};
