use std::time::Duration;

use comfy_table::{Table, presets::UTF8_FULL};

use super::{Phase, Step};

/// Outcome of one step in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StepStatus {
    #[strum(to_string = "ok")]
    Succeeded,
    #[strum(to_string = "failed")]
    Failed,
    #[strum(to_string = "skipped")]
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: &'static str,
    pub phase: Phase,
    pub status: StepStatus,
    pub elapsed: Duration,
}

impl StepRecord {
    pub(super) fn new(step: &Step, status: StepStatus, elapsed: Duration) -> Self {
        Self {
            name: step.name,
            phase: step.phase,
            status,
            elapsed,
        }
    }
}

/// Everything a finished run reports back.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: Vec<StepRecord>,
    /// The error that aborted the run, if any.
    pub error: Option<anyhow::Error>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn total_elapsed(&self) -> Duration {
        self.records.iter().map(|r| r.elapsed).sum()
    }

    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["#", "Step", "Phase", "Status", "Elapsed"]);
        for (index, record) in self.records.iter().enumerate() {
            table.add_row(vec![
                (index + 1).to_string(),
                record.name.to_string(),
                record.phase.to_string(),
                record.status.to_string(),
                format_elapsed(record.elapsed),
            ]);
        }
        table.to_string()
    }

    pub fn into_result(self) -> anyhow::Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}
