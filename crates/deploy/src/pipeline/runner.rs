use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::summary::{RunSummary, StepRecord, StepStatus};
use super::{Context, Phase, Slot, Step};
use crate::error::PipelineError;
use crate::log::{LogSink, StepLog};
use crate::settings::ForkCleanup;

const CLEANUP: &str = "Cleanup";

/// An ordered selection of steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Steps of the given phases, in canonical phase order regardless of how they
    /// were listed.
    pub fn for_phases(phases: &[Phase]) -> Self {
        let mut phases = phases.to_vec();
        phases.sort();
        phases.dedup();
        Self::from_steps(phases.into_iter().flat_map(Phase::steps).collect())
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Drop the first `index` steps.
    pub fn start_from(mut self, index: usize) -> Result<Self> {
        anyhow::ensure!(
            index < self.steps.len(),
            "Cannot start from step {index}: only {} steps are selected",
            self.steps.len()
        );
        self.steps.drain(..index);
        Ok(self)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check that every slot a step reads is written by an earlier step.
    ///
    /// Fork node slots are dropped when the phase changes, since the runner stops the
    /// nodes at every phase boundary.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut available: HashSet<Slot> = HashSet::new();
        let mut phase = None;
        for step in &self.steps {
            if phase.is_some_and(|p| p != step.phase) {
                available.retain(|slot| !slot.is_phase_scoped());
            }
            phase = Some(step.phase);

            if let Some(slot) = step.reads.iter().find(|slot| !available.contains(*slot)) {
                return Err(PipelineError::StepContract {
                    step: step.name.to_string(),
                    slot: *slot,
                });
            }
            available.extend(step.writes.iter().copied());
            for slot in step.releases {
                available.remove(slot);
            }
        }
        Ok(())
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// Fork nodes left by a phase are stopped before the next phase starts and at the
    /// end of the run. After a failure they are stopped or left running according to
    /// the configured [`ForkCleanup`] policy.
    pub async fn run(&self, ctx: &mut Context, sink: &dyn LogSink) -> RunSummary {
        let total = self.steps.len();
        let mut records = Vec::with_capacity(total);
        let mut phase = None;

        for (index, step) in self.steps.iter().enumerate() {
            if phase.is_some_and(|p| p != step.phase) && !ctx.forks.is_empty() {
                let log = StepLog::new(CLEANUP, sink);
                if let Err(error) = ctx.forks.shutdown(&log).await {
                    tracing::warn!(error = %error, "Failed to stop fork nodes at phase boundary");
                }
            }
            phase = Some(step.phase);

            sink.step_started(index, total, step.name);
            tracing::debug!(step = step.name, phase = %step.phase, "Running step");
            let started = Instant::now();
            let result = (step.action)(ctx, StepLog::new(step.name, sink)).await;
            let elapsed = started.elapsed();

            if let Err(error) = result {
                records.push(StepRecord::new(step, StepStatus::Failed, elapsed));
                records.extend(
                    self.steps[index + 1..]
                        .iter()
                        .map(|s| StepRecord::new(s, StepStatus::Skipped, Duration::ZERO)),
                );
                release_forks_after_failure(ctx, sink).await;
                return RunSummary {
                    records,
                    error: Some(error.context(format!("Step '{}' failed", step.name))),
                };
            }
            records.push(StepRecord::new(step, StepStatus::Succeeded, elapsed));
        }

        let error = if ctx.forks.is_empty() {
            None
        } else {
            ctx.forks.shutdown(&StepLog::new(CLEANUP, sink)).await.err()
        };
        RunSummary { records, error }
    }
}

async fn release_forks_after_failure(ctx: &mut Context, sink: &dyn LogSink) {
    if ctx.forks.is_empty() {
        return;
    }
    let log = StepLog::new(CLEANUP, sink);
    match ctx.settings.fork.cleanup {
        ForkCleanup::Always => {
            if let Err(error) = ctx.forks.shutdown(&log).await {
                tracing::warn!(error = %error, "Failed to stop fork nodes after failure");
            }
        }
        ForkCleanup::KeepOnFailure => ctx.forks.detach(&log),
    }
}
