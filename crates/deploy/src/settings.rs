//! Operational settings layered from defaults, an optional TOML file and `AUTOMATON_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default number of attempts for external commands.
pub const DEFAULT_PROCESS_MAX_TRIES: u32 = 3;

/// Default pause between command attempts, in milliseconds.
pub const DEFAULT_PROCESS_DELAY_MS: u64 = 1000;

/// Number of transactions burned on L2 so the deployer's L2 nonce tracks its L1 nonce.
pub const DEFAULT_NONCES_TO_BURN: u64 = 10;

/// Directory holding everything a run produces.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Environment prefix for settings overrides.
pub const SETTINGS_ENV_PREFIX: &str = "AUTOMATON_";

/// All tunables of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub layout: Layout,
    pub process: ProcessSettings,
    pub fork: ForkSettings,
    pub deploy: RetryPolicy,
    pub nonces: NonceSettings,
    pub explorer: ExplorerSettings,
}

impl PipelineSettings {
    /// Layer defaults, then `path` (if given), then `AUTOMATON_*` variables.
    ///
    /// Nested keys use a double underscore, e.g. `AUTOMATON_FORK__WARMUP_SECS=2`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            anyhow::ensure!(
                path.exists(),
                "Settings file {} does not exist",
                path.display()
            );
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load pipeline settings")
    }
}

/// Where the sibling tool checkouts and the artifact directory live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub artifacts_dir: PathBuf,
    pub bridge_repo: PathBuf,
    pub executor_repo: PathBuf,
    pub state_mate_repo: PathBuf,
    pub diffyscan_repo: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            bridge_repo: PathBuf::from("lido-l2-with-steth"),
            executor_repo: PathBuf::from("governance-crosschain-bridges"),
            state_mate_repo: PathBuf::from("state-mate"),
            diffyscan_repo: PathBuf::from("diffyscan"),
        }
    }
}

impl Layout {
    pub fn configs_dir(&self) -> PathBuf {
        self.artifacts_dir.join("configs")
    }

    /// Compiled governance executor artifact produced by the executor repo's build.
    pub fn executor_artifact(&self) -> PathBuf {
        self.executor_repo
            .join("artifacts/contracts/bridges/OptimismBridgeExecutor.sol/OptimismBridgeExecutor.json")
    }

    /// Result file the bridge deploy script writes into its own checkout.
    pub fn bridge_deploy_result(&self) -> PathBuf {
        self.bridge_repo.join("deployResult.json")
    }

    pub fn bridge_l1_deploy_args(&self) -> PathBuf {
        self.bridge_repo.join("l1DeployArgs.json")
    }

    pub fn bridge_l2_deploy_args(&self) -> PathBuf {
        self.bridge_repo.join("l2DeployArgs.json")
    }

    /// Seed configuration state-mate ships for this bridge.
    pub fn state_mate_seed(&self) -> PathBuf {
        self.state_mate_repo
            .join("configs/optimism/automaton.yaml")
    }

    pub fn state_mate_abi_dir(&self) -> PathBuf {
        self.state_mate_repo.join("configs/optimism/abi")
    }

    pub fn diffyscan_templates(&self) -> PathBuf {
        self.diffyscan_repo
            .join("config_samples/optimism/automaton")
    }
}

/// Retry budget for external commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    pub max_tries: u32,
    pub delay_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_PROCESS_MAX_TRIES,
            delay_ms: DEFAULT_PROCESS_DELAY_MS,
        }
    }
}

impl ProcessSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// What happens to running fork nodes when a phase ends.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ForkCleanup {
    /// Kill forks at the end of every phase, successful or not.
    #[default]
    Always,
    /// Leave forks running for inspection when the phase failed.
    KeepOnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkSettings {
    /// Fork node executable.
    pub binary: String,
    pub warmup_secs: u64,
    pub health_attempts: u32,
    pub health_interval_ms: u64,
    pub cleanup: ForkCleanup,
}

impl Default for ForkSettings {
    fn default() -> Self {
        Self {
            binary: "anvil".to_string(),
            warmup_secs: 5,
            health_attempts: 30,
            health_interval_ms: 1000,
            cleanup: ForkCleanup::Always,
        }
    }
}

impl ForkSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

/// Bounded retry with an optional randomized pause, used for contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    /// Add up to half of `delay_ms` of random extra pause.
    pub jitter: bool,
    /// How long one attempt waits for its receipt.
    pub receipt_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            jitter: true,
            receipt_timeout_secs: 120,
        }
    }
}

impl RetryPolicy {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Pause before the attempt following `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.delay_ms.saturating_mul(u64::from(attempt.max(1)));
        let extra = if self.jitter && self.delay_ms > 1 {
            use rand::Rng;
            rand::rng().random_range(0..=self.delay_ms / 2)
        } else {
            0
        };
        Duration::from_millis(base + extra)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonceSettings {
    pub count: u64,
    pub max_tries: u32,
    pub tx_timeout_secs: u64,
}

impl Default for NonceSettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_NONCES_TO_BURN,
            max_tries: 3,
            tx_timeout_secs: 30,
        }
    }
}

impl NonceSettings {
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    pub max_tries: u32,
    pub interval_ms: u64,
    /// Checks of the `finalized` block before verification starts.
    pub finality_checks: u32,
    pub finality_interval_ms: u64,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            max_tries: 3,
            interval_ms: 1000,
            finality_checks: 90,
            finality_interval_ms: 10_000,
        }
    }
}

impl ExplorerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn finality_interval(&self) -> Duration {
        Duration::from_millis(self.finality_interval_ms)
    }
}
