//! automaton-deploy - Deployment pipeline for the Lido L2 token bridge and its
//! governance executor.
//!
//! The crate drives a fixed list of steps against forked and live networks: fork nodes
//! are spawned with anvil, the governance executor is deployed directly over JSON-RPC,
//! and the bridge itself, its tests and its post-deployment checks are run through the
//! external toolchains (hardhat scripts, state-mate and diffyscan).

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod env;
pub mod error;
pub mod explorer;
pub mod fork;
pub mod gov_executor;
pub mod log;
pub mod network;
pub mod nonce;
pub mod pipeline;
pub mod process;
pub mod projector;
pub mod rpc;
pub mod settings;
pub mod tools;

pub use artifacts::{ArtifactStore, DeploymentArgs, DeploymentArtifacts};
pub use config::{ConfigDocument, MainConfig};
pub use env::Env;
pub use error::PipelineError;
pub use log::{LogKind, LogSink, StepLog, TracingSink};
pub use network::{Chain, NetworkMode};
pub use pipeline::{Context, Phase, Pipeline, RunSummary, StepRecord, StepStatus};
pub use settings::{ForkCleanup, PipelineSettings};

#[cfg(test)]
pub(crate) mod test_utils {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use url::Url;

    use crate::env::Env;

    /// Environment with every variable the pipeline reads.
    pub(crate) fn full_env() -> Env {
        Env::from_pairs([
            ("L1_REMOTE_RPC_URL", "https://sepolia.example.org/rpc"),
            ("L2_REMOTE_RPC_URL", "https://op-sepolia.example.org/rpc"),
            ("L1_CHAIN_ID", "11155111"),
            ("L2_CHAIN_ID", "11155420"),
            ("L1_LOCAL_RPC_PORT", "8545"),
            ("L2_LOCAL_RPC_PORT", "9545"),
            ("DIFFYSCAN_RPC_PORT", "7545"),
            (
                "DEPLOYER_PRIVATE_KEY",
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            ),
            ("L1_EXPLORER_TOKEN", "l1-token"),
            ("L2_EXPLORER_TOKEN", "l2-token"),
            ("L1_BLOCK_EXPLORER_API_HOST", "api-sepolia.etherscan.io"),
            ("L2_BLOCK_EXPLORER_API_HOST", "api-sepolia-optimistic.etherscan.io"),
            ("L1_BLOCK_EXPLORER_BROWSER_URL", "https://sepolia.etherscan.io"),
            ("L2_BLOCK_EXPLORER_BROWSER_URL", "https://sepolia-optimism.etherscan.io"),
            ("GITHUB_API_TOKEN", "gh-token"),
        ])
    }

    /// Serve `bodies` as JSON responses, one per connection, on a local port.
    pub(crate) async fn serve_json(bodies: Vec<String>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for body in bodies {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut stream).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap()
    }

    async fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..read]);
            let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= end + 4 + content_length {
                return;
            }
        }
    }
}
