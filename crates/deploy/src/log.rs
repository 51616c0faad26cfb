//! Step-scoped logging handed to every pipeline step.

/// Verbosity class of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogKind {
    /// Progress worth showing in the condensed display.
    Milestone,
    /// Subprocess output and other fine-grained detail.
    Detail,
}

/// Destination for everything steps report.
pub trait LogSink: Send + Sync {
    /// Called once before a step's action runs.
    fn step_started(&self, _index: usize, _total: usize, _step: &str) {}

    fn log(&self, step: &str, kind: LogKind, message: &str);
}

/// Sink that forwards every line to `tracing`.
///
/// Milestones are emitted at `debug` and details at `trace`, below the default console
/// level, so a front end can forward to it next to its own output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn step_started(&self, index: usize, total: usize, step: &str) {
        tracing::debug!(step, index = index + 1, total, "Starting step");
    }

    fn log(&self, step: &str, kind: LogKind, message: &str) {
        match kind {
            LogKind::Milestone => tracing::debug!(step, "{message}"),
            LogKind::Detail => tracing::trace!(step, "{message}"),
        }
    }
}

/// Logging handle bound to one step.
#[derive(Clone, Copy)]
pub struct StepLog<'a> {
    step: &'a str,
    sink: &'a dyn LogSink,
}

impl<'a> StepLog<'a> {
    pub fn new(step: &'a str, sink: &'a dyn LogSink) -> Self {
        Self { step, sink }
    }

    pub fn step(&self) -> &str {
        self.step
    }

    pub fn milestone(&self, message: impl AsRef<str>) {
        self.sink.log(self.step, LogKind::Milestone, message.as_ref());
    }

    pub fn detail(&self, message: impl AsRef<str>) {
        self.sink.log(self.step, LogKind::Detail, message.as_ref());
    }
}
