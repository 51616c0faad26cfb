//! Chain and target selection: which RPC endpoint and which artifact files a step uses.

use url::Url;

use crate::env::Env;
use crate::error::PipelineError;

/// One side of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Chain {
    L1,
    L2,
}

impl Chain {
    /// Prefix of this chain's environment variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Chain::L1 => "L1",
            Chain::L2 => "L2",
        }
    }

    fn var(self, suffix: &str) -> String {
        format!("{}_{suffix}", self.env_prefix())
    }

    pub fn chain_id(self, env: &Env) -> Result<u64, PipelineError> {
        env.number(&self.var("CHAIN_ID"))
    }

    pub fn local_port(self, env: &Env) -> Result<u16, PipelineError> {
        env.number(&self.var("LOCAL_RPC_PORT"))
    }

    pub fn remote_rpc_url(self, env: &Env) -> Result<Url, PipelineError> {
        env.url(&self.var("REMOTE_RPC_URL"))
    }

    pub fn explorer_token(self, env: &Env) -> Result<String, PipelineError> {
        env.string(&self.var("EXPLORER_TOKEN"))
    }

    pub fn explorer_api_host(self, env: &Env) -> Result<String, PipelineError> {
        env.string(&self.var("BLOCK_EXPLORER_API_HOST"))
    }

    /// Etherscan-compatible API endpoint, `https://<host>/api`.
    pub fn explorer_api_url(self, env: &Env) -> Result<Url, PipelineError> {
        let host = self.explorer_api_host(env)?;
        Url::parse(&format!("https://{host}/api")).map_err(|_| PipelineError::InvalidEnv {
            name: self.var("BLOCK_EXPLORER_API_HOST"),
            value: host,
        })
    }

    pub fn explorer_browser_url(self, env: &Env) -> Result<Url, PipelineError> {
        env.url(&self.var("BLOCK_EXPLORER_BROWSER_URL"))
    }
}

/// Whether a step targets local forks or the live networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NetworkMode {
    Forked,
    Live,
}

impl NetworkMode {
    /// RPC endpoint of `chain` for this mode.
    pub fn rpc_url(self, chain: Chain, env: &Env) -> Result<Url, PipelineError> {
        match self {
            NetworkMode::Forked => localhost_url(chain.local_port(env)?),
            NetworkMode::Live => chain.remote_rpc_url(env),
        }
    }

    pub fn deployment_file(self) -> &'static str {
        match self {
            NetworkMode::Forked => "deploymentResultForkedNetwork.json",
            NetworkMode::Live => "deploymentResultRealNetwork.json",
        }
    }

    pub fn gov_executor_args_file(self) -> &'static str {
        match self {
            NetworkMode::Forked => "l2GovExecutorDeployArgsForked.json",
            NetworkMode::Live => "l2GovExecutorDeployArgs.json",
        }
    }

    pub fn deployment_args_file(self, chain: Chain) -> &'static str {
        match (self, chain) {
            (NetworkMode::Forked, Chain::L1) => "l1DeploymentArgsForked.json",
            (NetworkMode::Forked, Chain::L2) => "l2DeploymentArgsForked.json",
            (NetworkMode::Live, Chain::L1) => "l1DeploymentArgs.json",
            (NetworkMode::Live, Chain::L2) => "l2DeploymentArgs.json",
        }
    }
}

/// Local endpoint the bytecode-diff tool spins its own node on.
pub fn diffyscan_rpc_url(env: &Env) -> Result<Url, PipelineError> {
    localhost_url(env.number("DIFFYSCAN_RPC_PORT")?)
}

fn localhost_url(port: u16) -> Result<Url, PipelineError> {
    let raw = format!("http://localhost:{port}");
    Url::parse(&raw).map_err(|_| PipelineError::InvalidEnv {
        name: "port".to_string(),
        value: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::from_pairs([
            ("L1_LOCAL_RPC_PORT", "8545"),
            ("L2_LOCAL_RPC_PORT", "9545"),
            ("L1_REMOTE_RPC_URL", "https://sepolia.example.org"),
            ("L2_REMOTE_RPC_URL", "https://op-sepolia.example.org"),
            ("L2_BLOCK_EXPLORER_API_HOST", "api-sepolia-optimistic.etherscan.io"),
            ("DIFFYSCAN_RPC_PORT", "7545"),
        ])
    }

    #[test]
    fn test_forked_mode_uses_local_ports() {
        let url = NetworkMode::Forked.rpc_url(Chain::L2, &env()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9545/");
    }

    #[test]
    fn test_live_mode_uses_remote_urls() {
        let url = NetworkMode::Live.rpc_url(Chain::L1, &env()).unwrap();
        assert_eq!(url.host_str(), Some("sepolia.example.org"));
    }

    #[test]
    fn test_artifact_names_differ_per_mode() {
        assert_ne!(
            NetworkMode::Forked.deployment_file(),
            NetworkMode::Live.deployment_file()
        );
        assert_eq!(
            NetworkMode::Live.deployment_args_file(Chain::L2),
            "l2DeploymentArgs.json"
        );
    }

    #[test]
    fn test_explorer_api_url() {
        let url = Chain::L2.explorer_api_url(&env()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api-sepolia-optimistic.etherscan.io/api"
        );
    }

    #[test]
    fn test_diffyscan_url() {
        assert_eq!(
            diffyscan_rpc_url(&env()).unwrap().as_str(),
            "http://localhost:7545/"
        );
    }
}
