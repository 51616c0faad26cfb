use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use automaton_deploy::{LogKind, LogSink, TracingSink};
use chrono::{SecondsFormat, Utc};

/// Name of the run log inside the artifact directory.
pub const MAIN_LOG: &str = "main_logs.txt";

const PROGRESS_WIDTH: usize = 120;

/// Console and file output of a run.
///
/// Every line goes to the run log and to `tracing`. The console either gets every line or
/// a single progress line that is rewritten on each milestone.
pub struct RunReporter {
    file: Mutex<File>,
    show_logs: bool,
    progress: Mutex<Progress>,
    tracing: TracingSink,
}

#[derive(Default)]
struct Progress {
    index: usize,
    total: usize,
    step: String,
}

impl RunReporter {
    pub fn create(path: &Path, show_logs: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open run log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            show_logs,
            progress: Mutex::new(Progress::default()),
            tracing: TracingSink,
        })
    }

    /// End the progress line so the summary starts on a fresh one.
    pub fn finish(&self) {
        if !self.show_logs {
            println!();
        }
    }

    fn append(&self, line: &str) {
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(error) = writeln!(file, "{line}") {
            tracing::warn!(error = %error, "Failed to write run log");
        }
    }

    fn render_progress(&self, message: Option<&str>) {
        let Ok(progress) = self.progress.lock() else {
            return;
        };
        let mut line = format!("[{}/{}] {}", progress.index + 1, progress.total, progress.step);
        if let Some(message) = message {
            line.push_str(": ");
            line.push_str(message.lines().next().unwrap_or_default());
        }
        let line: String = line.chars().take(PROGRESS_WIDTH).collect();
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r\x1b[2K{line}");
        let _ = stdout.flush();
    }
}

impl LogSink for RunReporter {
    fn step_started(&self, index: usize, total: usize, step: &str) {
        self.tracing.step_started(index, total, step);
        self.append(&format_line(step, "start", &format!("Step {}/{total}", index + 1)));
        if let Ok(mut progress) = self.progress.lock() {
            *progress = Progress {
                index,
                total,
                step: step.to_string(),
            };
        }
        if self.show_logs {
            println!("==> [{}/{total}] {step}", index + 1);
        } else {
            self.render_progress(None);
        }
    }

    fn log(&self, step: &str, kind: LogKind, message: &str) {
        self.tracing.log(step, kind, message);
        let line = format_line(step, &kind.to_string(), message);
        self.append(&line);
        if self.show_logs {
            println!("{line}");
        } else if kind == LogKind::Milestone {
            self.render_progress(Some(message));
        }
    }
}

fn format_line(step: &str, kind: &str, message: &str) -> String {
    format!(
        "{} [{step}] [{kind}] {message}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_every_line_reaches_the_run_log() {
        let temp_dir = TempDir::new("report").unwrap();
        let path = temp_dir.path().join("artifacts").join(MAIN_LOG);
        let reporter = RunReporter::create(&path, true).unwrap();

        reporter.step_started(0, 2, "Spawn L1 Fork Node");
        reporter.log("Spawn L1 Fork Node", LogKind::Milestone, "Fork node is healthy");
        reporter.log("Spawn L1 Fork Node", LogKind::Detail, "anvil output");

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[Spawn L1 Fork Node] [start] Step 1/2"));
        assert!(lines[1].ends_with("[milestone] Fork node is healthy"));
        assert!(lines[2].contains("[detail] anvil output"));
        assert!(lines[0].contains('T') && lines[0].contains('Z'));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lines_are_forwarded_to_tracing() {
        let temp_dir = TempDir::new("report").unwrap();
        let reporter = RunReporter::create(&temp_dir.path().join(MAIN_LOG), true).unwrap();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            reporter.step_started(1, 4, "Burn L2 Deployer Nonces");
            reporter.log("Burn L2 Deployer Nonces", LogKind::Milestone, "Burned nonce 3");
            reporter.log("Burn L2 Deployer Nonces", LogKind::Detail, "tx 0xabc mined");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Starting step"));
        assert!(output.contains("DEBUG") && output.contains("Burned nonce 3"));
        assert!(output.contains("TRACE") && output.contains("tx 0xabc mined"));
    }

    #[test]
    fn test_run_log_is_appended_across_runs() {
        let temp_dir = TempDir::new("report").unwrap();
        let path = temp_dir.path().join(MAIN_LOG);
        RunReporter::create(&path, true)
            .unwrap()
            .log("a", LogKind::Milestone, "first");
        RunReporter::create(&path, true)
            .unwrap()
            .log("a", LogKind::Milestone, "second");

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
