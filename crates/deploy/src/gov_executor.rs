//! Deployment of the L2 governance bridge executor.

use std::path::Path;
use std::str::FromStr;

use alloy_core::primitives::{Address, Bytes, U256};
use alloy_core::sol_types::SolValue;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::artifacts::{DeploymentArgs, read_json};
use crate::chain::ChainClient;
use crate::config::GovBridgeExecutor;
use crate::log::StepLog;
use crate::settings::RetryPolicy;

/// Constructor arguments of the executor, in constructor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorArgs {
    pub ovm_l2_messenger: String,
    pub ethereum_gov_executor: String,
    pub delay: u128,
    pub grace_period: u128,
    pub min_delay: u128,
    pub max_delay: u128,
    pub ovm_guardian: String,
}

impl From<&GovBridgeExecutor> for ExecutorArgs {
    fn from(config: &GovBridgeExecutor) -> Self {
        Self {
            ovm_l2_messenger: config.ovm_l2_messenger.clone(),
            ethereum_gov_executor: config.ethereum_gov_executor.clone(),
            delay: config.delay,
            grace_period: config.grace_period,
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            ovm_guardian: config.ovm_guardian.clone(),
        }
    }
}

impl ExecutorArgs {
    /// ABI-encoded constructor parameters.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let messenger = parse_address("ovmL2Messenger", &self.ovm_l2_messenger)?;
        let counterpart = parse_address("ethereumGovExecutor", &self.ethereum_gov_executor)?;
        let guardian = parse_address("ovmGuiardian", &self.ovm_guardian)?;
        Ok((
            messenger,
            counterpart,
            U256::from(self.delay),
            U256::from(self.grace_period),
            U256::from(self.min_delay),
            U256::from(self.max_delay),
            guardian,
        )
            .abi_encode_params())
    }

    /// Arguments as recorded for verification; integers are kept as decimal strings.
    pub fn to_artifact_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.ovm_l2_messenger.clone()),
            Value::from(self.ethereum_gov_executor.clone()),
            Value::from(self.delay.to_string()),
            Value::from(self.grace_period.to_string()),
            Value::from(self.min_delay.to_string()),
            Value::from(self.max_delay.to_string()),
            Value::from(self.ovm_guardian.clone()),
        ]
    }

    /// Deployment-args record for an executor deployed at `address`.
    pub fn deployment_args(&self, address: Address) -> DeploymentArgs {
        DeploymentArgs::single(address.to_string(), self.to_artifact_args())
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .with_context(|| format!("Invalid address '{value}' for {field}"))
}

#[derive(Deserialize)]
struct CompiledContract {
    bytecode: Bytes,
}

/// Read the creation bytecode from a compiled contract artifact.
pub fn load_bytecode(path: &Path) -> Result<Bytes> {
    let compiled: CompiledContract = read_json(path)
        .with_context(|| format!("Failed to load compiled executor from {}", path.display()))?;
    anyhow::ensure!(
        !compiled.bytecode.is_empty(),
        "Compiled executor at {} has empty bytecode",
        path.display()
    );
    Ok(compiled.bytecode)
}

/// Deploy the executor, retrying failed attempts as `policy` allows.
pub async fn deploy_executor<C: ChainClient>(
    client: &C,
    bytecode: &Bytes,
    args: &ExecutorArgs,
    policy: &RetryPolicy,
    log: &StepLog<'_>,
) -> Result<Address> {
    let mut init_code = bytecode.to_vec();
    init_code.extend(args.encode()?);
    let init_code = Bytes::from(init_code);

    log.milestone(format!(
        "Deploying governance executor from {}",
        client.deployer()
    ));

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match client.deploy(init_code.clone()).await {
            Ok(address) => {
                tracing::info!(address = %address, attempt, "Governance executor deployed");
                log.milestone(format!("Governance executor deployed at {address}"));
                return Ok(address);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                log.milestone(format!(
                    "Deployment attempt {attempt} of {max_attempts} failed: {e:#}. Retrying in {}ms...",
                    delay.as_millis()
                ));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Failed to deploy governance executor after {max_attempts} attempts"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::MockChain;
    use crate::log::tests::MemorySink;
    use std::fs;
    use tempdir::TempDir;

    fn args() -> ExecutorArgs {
        ExecutorArgs {
            ovm_l2_messenger: "0x000000000000000000000000000000000000000a".to_string(),
            ethereum_gov_executor: "0x000000000000000000000000000000000000000b".to_string(),
            delay: 0,
            grace_period: 86400,
            min_delay: 0,
            max_delay: 1,
            ovm_guardian: "0x000000000000000000000000000000000000000c".to_string(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay_ms: 0,
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_encoding_follows_constructor_order() {
        let encoded = args().encode().unwrap();
        assert_eq!(encoded.len(), 7 * 32);
        assert_eq!(encoded[31], 0x0a);
        assert_eq!(encoded[63], 0x0b);
        assert_eq!(&encoded[3 * 32 + 29..4 * 32], &[0x01, 0x51, 0x80]);
        assert_eq!(encoded[5 * 32 + 31], 1);
        assert_eq!(encoded[7 * 32 - 1], 0x0c);
    }

    #[test]
    fn test_invalid_address_names_field() {
        let mut bad = args();
        bad.ovm_guardian = "0x123".to_string();
        let err = bad.encode().unwrap_err();
        assert!(err.to_string().contains("ovmGuiardian"));
    }

    #[test]
    fn test_artifact_args_are_strings_in_order() {
        let recorded = args().to_artifact_args();
        assert_eq!(recorded.len(), 7);
        assert_eq!(recorded[0], Value::from("0x000000000000000000000000000000000000000a"));
        assert_eq!(recorded[3], Value::from("86400"));
        assert_eq!(recorded[6], Value::from("0x000000000000000000000000000000000000000c"));
    }

    #[tokio::test]
    async fn test_deploy_appends_encoded_args() {
        let chain = MockChain::new();
        let sink = MemorySink::default();
        let log = StepLog::new("Deploy Governance Executor", &sink);
        let bytecode = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);

        let address = deploy_executor(&chain, &bytecode, &args(), &policy(), &log)
            .await
            .unwrap();

        assert_ne!(address, Address::ZERO);
        let state = chain.state.lock().unwrap();
        let init_code = &state.deployments[0];
        assert_eq!(&init_code[..4], &[0x60, 0x80, 0x60, 0x40]);
        assert_eq!(&init_code[4..], args().encode().unwrap().as_slice());
    }

    #[tokio::test]
    async fn test_deploy_retries_transient_failures() {
        let chain = MockChain::new();
        chain
            .state
            .lock()
            .unwrap()
            .deploy_failures
            .push_back("connection reset".to_string());
        let sink = MemorySink::default();
        let log = StepLog::new("Deploy Governance Executor", &sink);

        let address = deploy_executor(&chain, &Bytes::from(vec![0x00]), &args(), &policy(), &log)
            .await
            .unwrap();

        assert_ne!(address, Address::ZERO);
        assert_eq!(chain.state.lock().unwrap().deployments.len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_gives_up() {
        let chain = MockChain::new();
        {
            let mut state = chain.state.lock().unwrap();
            for _ in 0..3 {
                state.deploy_failures.push_back("insufficient funds".to_string());
            }
        }
        let sink = MemorySink::default();
        let log = StepLog::new("Deploy Governance Executor", &sink);

        let err = deploy_executor(&chain, &Bytes::from(vec![0x00]), &args(), &policy(), &log)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_deployment_args_record() {
        let address = Address::with_last_byte(0x42);
        let record = args().deployment_args(address);
        let entry = &record.0[&address.to_string()];
        assert_eq!(entry, &args().to_artifact_args());
    }

    #[test]
    fn test_load_bytecode() {
        let temp_dir = TempDir::new("automaton-test").unwrap();
        let path = temp_dir.path().join("OptimismBridgeExecutor.json");
        fs::write(&path, r#"{"abi": [], "bytecode": "0x6080604052"}"#).unwrap();
        assert_eq!(load_bytecode(&path).unwrap().len(), 5);

        fs::write(&path, r#"{"abi": [], "bytecode": "0x"}"#).unwrap();
        assert!(load_bytecode(&path).is_err());
    }
}
