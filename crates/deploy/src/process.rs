//! External command execution with bounded retries and streamed output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::PipelineError;
use crate::log::StepLog;
use crate::projector::EnvProjection;
use crate::settings::{DEFAULT_PROCESS_DELAY_MS, DEFAULT_PROCESS_MAX_TRIES, ProcessSettings};

/// What a command's final failure means for the calling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// The step fails with [`PipelineError::ProcessFailure`].
    Abort,
    /// The failure is logged and the step carries on.
    Ignore,
}

/// A fully described command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    env: EnvProjection,
    on_failure: OnFailure,
    max_tries: u32,
    delay: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, on_failure: OnFailure) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
            env: EnvProjection::default(),
            on_failure,
            max_tries: DEFAULT_PROCESS_MAX_TRIES,
            delay: Duration::from_millis(DEFAULT_PROCESS_DELAY_MS),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = dir.as_ref().to_path_buf();
        self
    }

    /// Layer `env` over the inherited process environment.
    pub fn envs(mut self, env: &EnvProjection) -> Self {
        self.env = std::mem::take(&mut self.env).merge(env.clone());
        self
    }

    pub fn retries(mut self, settings: &ProcessSettings) -> Self {
        self.max_tries = settings.max_tries.max(1);
        self.delay = settings.delay();
        self
    }

    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_failure(&self) -> OnFailure {
        self.on_failure
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env(&self) -> &EnvProjection {
        &self.env
    }

    /// Program and arguments as a single line.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run `spec` until it exits zero or its attempt budget is spent.
///
/// Each attempt streams stdout and stderr line by line into `log` as detail lines. A spawn
/// failure is returned immediately. When every attempt exits non-zero the result depends
/// on [`OnFailure`].
pub async fn run_command(spec: &CommandSpec, log: &StepLog<'_>) -> Result<(), PipelineError> {
    let max_tries = spec.max_tries.max(1);
    let attempt = AtomicU32::new(0);

    let result = (|| {
        let current = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        run_attempt(spec, current, max_tries, log)
    })
    .retry(
        ConstantBuilder::default()
            .with_delay(spec.delay)
            .with_max_times(max_tries.saturating_sub(1) as usize),
    )
    .sleep(tokio::time::sleep)
    .when(|err: &PipelineError| !err.is_fatal())
    .notify(|_: &PipelineError, delay: Duration| {
        let next = attempt.load(Ordering::SeqCst) + 1;
        log.milestone(format!(
            "Retrying command ({next} of {max_tries}) after {}ms...",
            delay.as_millis()
        ));
    })
    .await;

    match result {
        Err(err @ PipelineError::ProcessFailure { .. }) if spec.on_failure == OnFailure::Ignore => {
            tracing::warn!(command = %spec.display(), error = %err, "Ignoring command failure");
            log.milestone(format!("{err}. Continuing."));
            Ok(())
        }
        other => other,
    }
}

async fn run_attempt(
    spec: &CommandSpec,
    attempt: u32,
    max_tries: u32,
    log: &StepLog<'_>,
) -> Result<(), PipelineError> {
    let command = spec.display();
    log.milestone(format!(
        "Run command in {}: {command} (try {attempt} of {max_tries})",
        spec.cwd.display()
    ));

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(spec.env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| PipelineError::Spawn {
            command: command.clone(),
            source,
        })?;

    tokio::join!(
        forward_lines(child.stdout.take(), log),
        forward_lines(child.stderr.take(), log),
    );

    let code = match child.wait().await {
        Ok(status) if status.success() => {
            log.milestone("Command succeeded with exit code 0.");
            return Ok(());
        }
        Ok(status) => {
            let code = status.code();
            log.milestone(format!(
                "Command failed with exit code {}.",
                code.map_or_else(|| status.to_string(), |c| c.to_string())
            ));
            code
        }
        Err(err) => {
            log.milestone(format!("Failed to wait for command: {err}"));
            None
        }
    };

    Err(PipelineError::ProcessFailure {
        command,
        attempts: attempt,
        code,
    })
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, log: &StepLog<'_>) {
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.detail(line);
    }
}
