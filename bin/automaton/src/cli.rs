use std::path::PathBuf;

use automaton_deploy::Phase;
use clap::Parser;
use strum::IntoEnumIterator;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "automaton")]
#[command(
    author,
    version,
    about = "Deploy and check the Lido L2 token bridge and its governance executor"
)]
pub struct Cli {
    /// Path to the deployment YAML configuration.
    pub config: PathBuf,

    /// The verbosity level.
    #[arg(short, long, env = "AUTOMATON_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Only rehearse the deployment on local forks.
    #[arg(long, alias = "onlyForkDeploy")]
    pub only_fork_deploy: bool,

    /// Only deploy to the live networks.
    #[arg(long, alias = "onlyDeploy")]
    pub only_deploy: bool,

    /// Only verify the live deployment on the block explorers.
    #[arg(long, alias = "onlyVerify")]
    pub only_verify: bool,

    /// Only check the live deployment.
    #[arg(long, alias = "onlyCheck")]
    pub only_check: bool,

    /// Explicit list of phases to run: fork, deploy, verify, check.
    #[arg(long, value_delimiter = ',')]
    pub phases: Vec<Phase>,

    /// Print every log line instead of the condensed progress line.
    #[arg(long, alias = "showLogs", env = "AUTOMATON_SHOW_LOGS")]
    pub show_logs: bool,

    /// Skip the first N steps of the selected phases.
    #[arg(long, alias = "startFrom", default_value_t = 0)]
    pub start_from: usize,

    /// TOML file with pipeline settings.
    ///
    /// Settings are layered as defaults, then this file, then `AUTOMATON_*` variables.
    #[arg(long, env = "AUTOMATON_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Dotenv file to load instead of searching for `.env`.
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Leave fork nodes running when a step fails.
    #[arg(long, env = "AUTOMATON_KEEP_FORKS_ON_FAILURE")]
    pub keep_forks_on_failure: bool,
}

impl Cli {
    /// The union of every phase flag, in canonical order. No flag selects every phase.
    pub fn selected_phases(&self) -> Vec<Phase> {
        let mut selected = self.phases.clone();
        for (flag, phase) in [
            (self.only_fork_deploy, Phase::Fork),
            (self.only_deploy, Phase::Deploy),
            (self.only_verify, Phase::Verify),
            (self.only_check, Phase::Check),
        ] {
            if flag {
                selected.push(phase);
            }
        }
        if selected.is_empty() {
            return Phase::iter().collect();
        }
        selected.sort();
        selected.dedup();
        selected
    }
}
