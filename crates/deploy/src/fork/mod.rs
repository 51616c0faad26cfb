//! Local Anvil forks of the remote L1 and L2 chains.

mod cmd;

use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use url::Url;

pub use cmd::AnvilCmdBuilder;

use crate::env::Env;
use crate::error::PipelineError;
use crate::log::StepLog;
use crate::network::Chain;
use crate::rpc;
use crate::settings::ForkSettings;

/// What to fork and where to expose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkNodeSpec {
    pub chain: Chain,
    pub remote_rpc_url: Url,
    pub chain_id: u64,
    pub port: u16,
    /// File receiving the node's stdout and stderr.
    pub log_file: PathBuf,
}

impl ForkNodeSpec {
    /// Fork of `chain`'s remote endpoint on its configured local port.
    pub fn from_env(chain: Chain, env: &Env, log_file: PathBuf) -> Result<Self, PipelineError> {
        Ok(Self {
            chain,
            remote_rpc_url: chain.remote_rpc_url(env)?,
            chain_id: chain.chain_id(env)?,
            port: chain.local_port(env)?,
            log_file,
        })
    }
}

/// A running fork node.
///
/// Dropping the handle kills the process unless it was [detached](ForkNode::detach).
#[derive(Debug)]
pub struct ForkNode {
    chain: Chain,
    port: u16,
    rpc_url: Url,
    child: Child,
    detached: bool,
}

impl ForkNode {
    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the process and wait for it to exit.
    pub async fn kill(mut self) -> Result<()> {
        self.detached = true;
        self.child
            .kill()
            .await
            .with_context(|| format!("Failed to kill {} fork node on port {}", self.chain, self.port))
    }

    /// Release the handle without stopping the process.
    pub fn detach(mut self) -> Option<u32> {
        self.detached = true;
        self.child.id()
    }
}

impl Drop for ForkNode {
    fn drop(&mut self) {
        if !self.detached {
            let _ = self.child.start_kill();
        }
    }
}

/// Start a fork node and wait until it answers block queries.
///
/// The process gets `settings.warmup()` to boot, then up to `settings.health_attempts`
/// checks spaced by `settings.health_interval()`. A process that exits during the checks
/// fails immediately with [`PipelineError::ForkNodeExited`].
pub async fn spawn_fork_node(
    spec: &ForkNodeSpec,
    settings: &ForkSettings,
    log: &StepLog<'_>,
) -> Result<ForkNode> {
    let args = AnvilCmdBuilder::new(spec.remote_rpc_url.as_str(), spec.chain_id)
        .port(spec.port)
        .build();
    let command = format!("{} {}", settings.binary, args.join(" "));
    log.milestone(format!(
        "Spawning {} fork node on port {}: {command}",
        spec.chain, spec.port
    ));

    if let Some(parent) = spec.log_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let stdout = File::create(&spec.log_file)
        .with_context(|| format!("Failed to create {}", spec.log_file.display()))?;
    let stderr = stdout
        .try_clone()
        .context("Failed to duplicate fork node log handle")?;

    let child = Command::new(&settings.binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|source| PipelineError::Spawn {
            command: command.clone(),
            source,
        })?;

    let rpc_url = Url::parse(&format!("http://localhost:{}", spec.port))
        .context("Failed to build fork node URL")?;
    let mut node = ForkNode {
        chain: spec.chain,
        port: spec.port,
        rpc_url,
        child,
        detached: false,
    };
    tracing::debug!(chain = %spec.chain, pid = ?node.pid(), "Fork node process started");

    tokio::time::sleep(settings.warmup()).await;

    let client = rpc::http_client()?;
    let url = node.rpc_url.to_string();
    let port = spec.port;
    let child = &mut node.child;
    let attempts = rpc::poll_until_ready(
        &format!("{} fork node", spec.chain),
        settings.health_attempts,
        settings.health_interval(),
        || {
            let exited = child.try_wait();
            let client = client.clone();
            let url = url.clone();
            async move {
                match exited {
                    Ok(Some(status)) => {
                        return Err(PipelineError::ForkNodeExited {
                            port,
                            status: status.to_string(),
                        }
                        .into());
                    }
                    Ok(None) => {}
                    Err(e) => return Err(anyhow::Error::from(e).context("Failed to poll fork node")),
                }
                rpc::block_number(&client, &url, "latest").await.map(|_| ())
            }
        },
    )
    .await
    .with_context(|| {
        format!(
            "{} fork node did not become healthy, see {}",
            spec.chain,
            spec.log_file.display()
        )
    })?;

    log.milestone(format!(
        "{} fork node is up at {} (health check {attempts})",
        spec.chain, node.rpc_url
    ));
    Ok(node)
}

/// The fork nodes owned by the current phase.
#[derive(Debug, Default)]
pub struct ForkSet {
    l1: Option<ForkNode>,
    l2: Option<ForkNode>,
}

impl ForkSet {
    /// Track `node`, killing any node previously tracked for the same chain.
    pub fn insert(&mut self, node: ForkNode) {
        let slot = match node.chain() {
            Chain::L1 => &mut self.l1,
            Chain::L2 => &mut self.l2,
        };
        *slot = Some(node);
    }

    pub fn get(&self, chain: Chain) -> Option<&ForkNode> {
        match chain {
            Chain::L1 => self.l1.as_ref(),
            Chain::L2 => self.l2.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.l1.is_none() && self.l2.is_none()
    }

    /// Kill every tracked node. All nodes are attempted even if one fails.
    pub async fn shutdown(&mut self, log: &StepLog<'_>) -> Result<()> {
        let mut first_error = None;
        for node in [self.l1.take(), self.l2.take()].into_iter().flatten() {
            let chain = node.chain();
            let port = node.port();
            match node.kill().await {
                Ok(()) => log.milestone(format!("Stopped {chain} fork node on port {port}")),
                Err(e) => {
                    tracing::warn!(chain = %chain, error = %e, "Failed to stop fork node");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop tracking every node and leave the processes running.
    pub fn detach(&mut self, log: &StepLog<'_>) {
        for node in [self.l1.take(), self.l2.take()].into_iter().flatten() {
            let chain = node.chain();
            let port = node.port();
            let pid = node.detach();
            log.milestone(format!(
                "Leaving {chain} fork node running on port {port} (pid {})",
                pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
            ));
        }
    }
}
