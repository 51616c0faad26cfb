//! Classified failures that the pipeline reacts to differently.
//!
//! Everything else travels as [`anyhow::Error`] with context attached at the call site.

use std::path::PathBuf;

use crate::pipeline::Slot;

/// Errors the orchestrator and its collaborators need to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An external command kept exiting non-zero until its retry budget ran out.
    #[error("Command failed after {attempts} attempts: {command} (exit code: {})", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ProcessFailure {
        command: String,
        attempts: u32,
        code: Option<i32>,
    },

    /// An external command could not be started at all.
    #[error("Failed to spawn '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted artifact exists but does not parse.
    #[error("Artifact {} is corrupt", path.display())]
    CorruptArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required environment variable {name}")]
    MissingEnv { name: String },

    #[error("Environment variable {name} has an invalid value '{value}'")]
    InvalidEnv { name: String, value: String },

    /// A step would read a context slot that nothing earlier in the plan produces.
    #[error("Step '{step}' reads {slot} but no earlier step in this run writes it")]
    StepContract { step: String, slot: Slot },

    /// A JSON-RPC endpoint answered with an error object.
    #[error("{method} failed on {endpoint}: {message} (code {code})")]
    Rpc {
        endpoint: String,
        method: String,
        code: i64,
        message: String,
    },

    /// A fork node process died while it was being health-checked.
    #[error("Fork node on port {port} exited before becoming healthy ({status})")]
    ForkNodeExited { port: u16, status: String },
}

impl PipelineError {
    /// Whether retrying the operation that produced this error is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::ForkNodeExited { .. })
    }
}
