//! Invocations of the external toolchains: the bridge repository's hardhat scripts,
//! state-mate and diffyscan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::artifacts::DeploymentArgs;
use crate::explorer::{ExplorerApi, wait_for_contract};
use crate::log::StepLog;
use crate::network::Chain;
use crate::process::{CommandSpec, OnFailure, run_command};
use crate::projector::EnvProjection;
use crate::rpc;
use crate::settings::{ExplorerSettings, Layout, ProcessSettings};

pub const DEPLOY_SCRIPT: &str = "./scripts/optimism/deploy-automaton.ts";

/// Integration suites of the bridge repository, run in this order.
pub const INTEGRATION_TESTS: [&str; 4] = [
    "bridging-non-rebasable.integration.test.ts",
    "bridging-rebasable.integration.test.ts",
    "op-pusher-pushing-token-rate.integration.test.ts",
    "optimism.integration.test.ts",
];

pub fn deploy_script_command(
    layout: &Layout,
    env: &EnvProjection,
    retries: &ProcessSettings,
) -> CommandSpec {
    CommandSpec::new("ts-node", OnFailure::Abort)
        .args(["--files", DEPLOY_SCRIPT])
        .current_dir(&layout.bridge_repo)
        .envs(env)
        .retries(retries)
}

pub fn integration_test_command(
    layout: &Layout,
    test_file: &str,
    env: &EnvProjection,
    retries: &ProcessSettings,
) -> CommandSpec {
    CommandSpec::new("npx", OnFailure::Abort)
        .args(["hardhat", "test"])
        .arg(format!("./test/integration/{test_file}"))
        .current_dir(&layout.bridge_repo)
        .envs(env)
        .retries(retries)
}

/// `npx hardhat verify`. Verification is advisory, so failures are ignored.
pub fn verify_command(
    repo: &Path,
    chain: Chain,
    address: &str,
    constructor_args: &[serde_json::Value],
    env: &EnvProjection,
    retries: &ProcessSettings,
) -> CommandSpec {
    CommandSpec::new("npx", OnFailure::Ignore)
        .args(["hardhat", "verify", "--network"])
        .arg(chain.to_string())
        .arg(address)
        .args(DeploymentArgs::command_args(constructor_args))
        .current_dir(repo)
        .envs(env)
        .retries(retries)
}

pub fn state_mate_command(
    layout: &Layout,
    config: &Path,
    env: &EnvProjection,
    retries: &ProcessSettings,
) -> CommandSpec {
    CommandSpec::new("yarn", OnFailure::Abort)
        .arg("start")
        .arg(config.display().to_string())
        .current_dir(&layout.state_mate_repo)
        .envs(env)
        .retries(retries)
}

pub fn diffyscan_command(
    layout: &Layout,
    config: &Path,
    binary_comparison: bool,
    env: &EnvProjection,
    retries: &ProcessSettings,
) -> CommandSpec {
    let mut command = CommandSpec::new("diffyscan", OnFailure::Abort)
        .arg(config.display().to_string())
        .arg("--yes");
    if binary_comparison {
        command = command.arg("--enable-binary-comparison");
    }
    command
        .current_dir(&layout.diffyscan_repo)
        .envs(env)
        .retries(retries)
}

/// Absolute form of a generated config, since the tools run from their own checkouts.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve absolute path of {}", path.display()))
}

pub async fn run_deploy_script(
    layout: &Layout,
    env: &EnvProjection,
    retries: &ProcessSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    run_command(&deploy_script_command(layout, env, retries), log).await?;
    Ok(())
}

pub async fn run_integration_tests(
    layout: &Layout,
    env: &EnvProjection,
    retries: &ProcessSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    for test_file in INTEGRATION_TESTS {
        run_command(&integration_test_command(layout, test_file, env, retries), log)
            .await
            .with_context(|| format!("Integration test {test_file} failed"))?;
    }
    Ok(())
}

pub async fn run_state_mate(
    layout: &Layout,
    config: &Path,
    env: &EnvProjection,
    retries: &ProcessSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    let config = absolute(config)?;
    run_command(&state_mate_command(layout, &config, env, retries), log).await?;
    Ok(())
}

pub async fn run_diffyscan(
    layout: &Layout,
    config: &Path,
    env: &EnvProjection,
    retries: &ProcessSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    let config = absolute(config)?;
    run_command(&diffyscan_command(layout, &config, true, env, retries), log).await?;
    Ok(())
}

/// Verify every contract of a deployment-args record on `chain`'s explorer.
///
/// Each address is first polled on the explorer until it shows up as a contract; the
/// verify command runs either way.
#[allow(clippy::too_many_arguments)]
pub async fn verify_contracts<A: ExplorerApi>(
    repo: &Path,
    chain: Chain,
    deployment_args: &DeploymentArgs,
    explorer: &A,
    explorer_settings: &ExplorerSettings,
    env: &EnvProjection,
    retries: &ProcessSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    for (address, constructor_args) in &deployment_args.0 {
        wait_for_contract(
            explorer,
            address,
            explorer_settings.max_tries,
            explorer_settings.interval(),
            log,
        )
        .await;
        let command = verify_command(repo, chain, address, constructor_args, env, retries);
        run_command(&command, log).await?;
    }
    Ok(())
}

/// Wait until `block` is at or below the chain's `finalized` head.
pub async fn wait_for_finalization(
    rpc_url: &str,
    block: u64,
    settings: &ExplorerSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    let client = rpc::http_client()?;
    rpc::poll_until_ready(
        &format!("Finalization of block {block}"),
        settings.finality_checks,
        settings.finality_interval(),
        || {
            let client = client.clone();
            async move {
                let finalized = rpc::block_number(&client, rpc_url, "finalized").await?;
                log.milestone(format!(
                    "Waiting for block {block} to be finalized. Current finalized block: {finalized}"
                ));
                anyhow::ensure!(block <= finalized, "Block {block} isn't finalized yet");
                Ok(())
            }
        },
    )
    .await?;
    log.milestone(format!("Block {block} is finalized"));
    Ok(())
}
