//! The step pipeline: named phases made of sequential steps that share a [`Context`].
//!
//! Every step declares the context slots it reads and writes. [`Pipeline::validate`]
//! checks a selection of steps before anything runs, so a missing producer surfaces as
//! [`PipelineError::StepContract`](crate::error::PipelineError::StepContract) instead of
//! a failure halfway through a deployment.

use futures::future::LocalBoxFuture;

use crate::log::StepLog;

mod context;
mod runner;
mod steps;
mod summary;

pub use context::{Context, TargetState};
pub use runner::Pipeline;
pub use summary::{RunSummary, StepRecord, StepStatus};

/// A group of steps selectable from the command line.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Phase {
    /// Rehearse the deployment on local forks and test it there.
    Fork,
    /// Deploy to the live networks.
    Deploy,
    /// Publish sources to the block explorers.
    Verify,
    /// Check the live deployment.
    Check,
}

impl Phase {
    pub fn steps(self) -> Vec<Step> {
        match self {
            Phase::Fork => steps::fork_steps(),
            Phase::Deploy => steps::deploy_steps(),
            Phase::Verify => steps::verify_steps(),
            Phase::Check => steps::check_steps(),
        }
    }
}

/// A value in the [`Context`] that one step produces for later steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Slot {
    #[strum(to_string = "L1 fork node")]
    L1Fork,
    #[strum(to_string = "L2 fork node")]
    L2Fork,
    #[strum(to_string = "governance executor on forks")]
    ForkGovExecutor,
    #[strum(to_string = "deployment on forks")]
    ForkDeployment,
    #[strum(to_string = "live governance executor")]
    LiveGovExecutor,
    #[strum(to_string = "live deployment")]
    LiveDeployment,
}

impl Slot {
    /// Fork nodes never outlive the phase that spawned them.
    pub fn is_phase_scoped(self) -> bool {
        matches!(self, Slot::L1Fork | Slot::L2Fork)
    }
}

pub type StepAction = for<'a> fn(&'a mut Context, StepLog<'a>) -> LocalBoxFuture<'a, anyhow::Result<()>>;

/// One named unit of work.
#[derive(Clone)]
pub struct Step {
    pub name: &'static str,
    pub phase: Phase,
    pub reads: &'static [Slot],
    pub writes: &'static [Slot],
    /// Slots that are gone once the step has run.
    pub releases: &'static [Slot],
    pub action: StepAction,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("releases", &self.releases)
            .finish()
    }
}
