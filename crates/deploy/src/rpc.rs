//! Shared JSON-RPC helpers and bounded readiness polling.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PipelineError;

/// Per-request timeout for node queries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for node queries.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build node query client")
}

#[derive(Deserialize)]
struct Reply<T> {
    result: Option<T>,
    error: Option<ReplyError>,
}

#[derive(Deserialize)]
struct ReplyError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Call `method` on the node at `endpoint`.
///
/// An error object in the reply becomes [`PipelineError::Rpc`].
pub async fn call<T: DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    params: Vec<Value>,
) -> anyhow::Result<T> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let reply: Reply<T> = client
        .post(endpoint)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("{method} to {endpoint} did not go through"))?
        .json()
        .await
        .with_context(|| format!("{method} reply from {endpoint} is not a JSON-RPC reply"))?;

    match reply {
        Reply {
            error: Some(error), ..
        } => Err(PipelineError::Rpc {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            code: error.code,
            message: error.message,
        }
        .into()),
        Reply {
            result: Some(result),
            ..
        } => Ok(result),
        _ => anyhow::bail!("{method} reply from {endpoint} carries no result"),
    }
}

/// Number of the block at `tag` (`latest`, `finalized`, ...).
pub async fn block_number(
    client: &reqwest::Client,
    url: &str,
    tag: &str,
) -> Result<u64, anyhow::Error> {
    let block: Value = call(
        client,
        url,
        "eth_getBlockByNumber",
        vec![Value::from(tag), Value::Bool(false)],
    )
    .await?;
    let number = block
        .get("number")
        .and_then(Value::as_str)
        .with_context(|| format!("Block '{tag}' is unavailable"))?;
    u64::from_str_radix(number.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid block number {number}"))
}

/// Call `check_fn` up to `attempts` times, pausing `interval` after each failure.
///
/// Returns the 1-based attempt that succeeded. Errors classified as fatal by
/// [`PipelineError::is_fatal`] stop the polling immediately. After the last attempt
/// the last error is returned.
///
/// # Arguments
/// * `name` - Name of the service (for error messages)
/// * `attempts` - Maximum number of checks
/// * `interval` - Pause between failed checks
/// * `check_fn` - Function that returns Ok(()) when the service is ready
pub async fn poll_until_ready<F, Fut>(
    name: &str,
    attempts: u32,
    interval: Duration,
    mut check_fn: F,
) -> Result<u32, anyhow::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), anyhow::Error>>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match check_fn().await {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                if e.downcast_ref::<PipelineError>()
                    .is_some_and(PipelineError::is_fatal)
                {
                    return Err(e);
                }
                tracing::trace!(error = %e, service = %name, attempt, "Readiness check failed, retrying...");
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    let error = last_error.unwrap_or_else(|| anyhow::anyhow!("no readiness check ran"));
    Err(error.context(format!(
        "{name} was not ready after {attempts} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::serve_json;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_poll_returns_attempt_of_first_success() {
        let calls = Cell::new(0u32);
        let attempt = poll_until_ready("node", 10, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n >= 4 {
                    Ok(())
                } else {
                    anyhow::bail!("not yet")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(attempt, 4);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_poll_gives_up_with_last_error() {
        let calls = Cell::new(0u32);
        let err = poll_until_ready("node", 5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { anyhow::bail!("failure {n}") }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 5);
        assert_eq!(err.root_cause().to_string(), "failure 5");
    }

    #[tokio::test]
    async fn test_poll_stops_on_fatal_error() {
        let calls = Cell::new(0u32);
        let err = poll_until_ready("node", 5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async {
                Err::<(), anyhow::Error>(
                    PipelineError::ForkNodeExited {
                        port: 8545,
                        status: "exit status: 1".to_string(),
                    }
                    .into(),
                )
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ForkNodeExited { .. })
        ));
    }

    #[tokio::test]
    async fn test_block_number_parses_hex() {
        let url = serve_json(vec![
            r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x1b4","hash":"0x00"}}"#.to_string(),
        ])
        .await;
        let client = http_client().unwrap();
        let number = block_number(&client, url.as_str(), "finalized").await.unwrap();
        assert_eq!(number, 436);
    }

    #[tokio::test]
    async fn test_rpc_error_is_classified() {
        let url = serve_json(vec![
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#
                .to_string(),
        ])
        .await;
        let client = http_client().unwrap();
        let err = block_number(&client, url.as_str(), "latest").await.unwrap_err();
        assert!(err.to_string().contains("header not found"));
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Rpc { method, code, .. }) => {
                assert_eq!(method, "eth_getBlockByNumber");
                assert_eq!(*code, -32000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_null_block_is_unavailable() {
        let url = serve_json(vec![r#"{"jsonrpc":"2.0","id":1,"result":null}"#.to_string()]).await;
        let client = http_client().unwrap();
        let err = block_number(&client, url.as_str(), "finalized").await.unwrap_err();
        assert!(err.to_string().contains("no result"), "{err:#}");
    }
}
