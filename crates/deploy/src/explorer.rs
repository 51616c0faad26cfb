//! Block-explorer polling: wait until the explorer knows an address is a contract.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::log::StepLog;

/// Response of the Etherscan-compatible `getsourcecode` action.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCodeResponse {
    pub status: String,
    #[serde(default)]
    pub result: Value,
}

impl SourceCodeResponse {
    /// Whether the explorer reports source code or an ABI for the address.
    pub fn is_contract(&self) -> bool {
        if self.status != "1" {
            return false;
        }
        let Some(first) = self.result.as_array().and_then(|entries| entries.first()) else {
            return false;
        };
        ["SourceCode", "ABI"].iter().any(|key| {
            first
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty())
        })
    }
}

/// Source-code lookup against a block explorer.
pub trait ExplorerApi {
    fn source_code(&self, address: &str) -> impl Future<Output = Result<SourceCodeResponse>> + Send;
}

/// Etherscan-compatible HTTP explorer API.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl EtherscanClient {
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

impl ExplorerApi for EtherscanClient {
    async fn source_code(&self, address: &str) -> Result<SourceCodeResponse> {
        self.client
            .get(self.endpoint.clone())
            .query(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to query block explorer")?
            .json()
            .await
            .context("Failed to parse block explorer response")
    }
}

/// Poll until the explorer identifies `address` as a contract, at most `max_tries` times.
///
/// Never fails: running out of tries is logged and the caller proceeds. Returns whether
/// the address was confirmed.
pub async fn wait_for_contract<A: ExplorerApi>(
    api: &A,
    address: &str,
    max_tries: u32,
    interval: Duration,
    log: &StepLog<'_>,
) -> bool {
    log.milestone(format!(
        "Check address {address} for being contract in block explorer"
    ));

    for _ in 0..max_tries {
        match api.source_code(address).await {
            Ok(response) if response.is_contract() => {
                log.milestone(format!("{address} is identified as a contract."));
                return true;
            }
            Ok(_) => log.milestone(format!(
                "{address} appears to be an EOA. Retrying in {} seconds...",
                interval.as_secs_f64()
            )),
            Err(e) => log.milestone(format!("Error {e:#} checking address {address}")),
        }
        tokio::time::sleep(interval).await;
    }

    tracing::warn!(address, max_tries, "Explorer did not confirm contract");
    log.milestone(format!(
        "{address} could not be confirmed as a contract after {max_tries} attempts."
    ));
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::tests::MemorySink;
    use crate::test_utils::serve_json;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedExplorer {
        responses: Mutex<VecDeque<Result<SourceCodeResponse>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedExplorer {
        fn new(responses: Vec<Result<SourceCodeResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl ExplorerApi for ScriptedExplorer {
        async fn source_code(&self, _address: &str) -> Result<SourceCodeResponse> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(eoa()))
        }
    }

    fn eoa() -> SourceCodeResponse {
        SourceCodeResponse {
            status: "1".to_string(),
            result: json!([{ "SourceCode": "", "ABI": "" }]),
        }
    }

    fn contract() -> SourceCodeResponse {
        SourceCodeResponse {
            status: "1".to_string(),
            result: json!([{ "SourceCode": "contract A {}", "ABI": "[]" }]),
        }
    }

    #[test]
    fn test_contract_detection() {
        assert!(contract().is_contract());
        assert!(!eoa().is_contract());

        let abi_only = SourceCodeResponse {
            status: "1".to_string(),
            result: json!([{ "SourceCode": "", "ABI": "[{}]" }]),
        };
        assert!(abi_only.is_contract());

        let failed = SourceCodeResponse {
            status: "0".to_string(),
            result: json!("Invalid API Key"),
        };
        assert!(!failed.is_contract());
    }

    #[tokio::test]
    async fn test_stops_once_contract_is_seen() {
        let api = ScriptedExplorer::new(vec![Ok(eoa()), Ok(eoa()), Ok(contract())]);
        let sink = MemorySink::default();
        let log = StepLog::new("Verification", &sink);

        let confirmed = wait_for_contract(&api, "0xabc", 10, Duration::ZERO, &log).await;

        assert!(confirmed);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_without_error() {
        let api = ScriptedExplorer::new(vec![Err(anyhow::anyhow!("rate limited"))]);
        let sink = MemorySink::default();
        let log = StepLog::new("Verification", &sink);

        let confirmed = wait_for_contract(&api, "0xabc", 4, Duration::ZERO, &log).await;

        assert!(!confirmed);
        assert_eq!(api.calls(), 4);
        let milestones = sink.messages(crate::log::LogKind::Milestone);
        assert!(milestones.iter().any(|m| m.contains("rate limited")));
        assert!(
            milestones
                .last()
                .is_some_and(|m| m.contains("could not be confirmed"))
        );
    }

    #[tokio::test]
    async fn test_etherscan_client_parses_response() {
        let url = serve_json(vec![
            json!({
                "status": "1",
                "message": "OK",
                "result": [{ "SourceCode": "pragma solidity 0.8.10;", "ABI": "[]" }]
            })
            .to_string(),
        ])
        .await;
        let client = EtherscanClient::new(url, "token").unwrap();

        let response = client.source_code("0xabc").await.unwrap();
        assert!(response.is_contract());
    }
}
