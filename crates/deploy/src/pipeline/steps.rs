//! The concrete steps of every phase.

use alloy_core::primitives::Address;
use anyhow::{Context as _, Result};
use futures::future::LocalBoxFuture;
use std::str::FromStr;
use std::time::Duration;

use super::{Context, Phase, Slot, Step};
use crate::artifacts::{DeploymentArgs, DeploymentArtifacts, ScriptDeploymentResult, read_json};
use crate::chain::{AlloyChainClient, ChainClient};
use crate::explorer::EtherscanClient;
use crate::fork::{ForkNodeSpec, spawn_fork_node};
use crate::gov_executor::{ExecutorArgs, deploy_executor, load_bytecode};
use crate::log::StepLog;
use crate::network::{Chain, NetworkMode};
use crate::nonce::burn_nonces;
use crate::projector::{
    EnvProjection, bridge_deploy_env, diffyscan_env, integration_test_env, state_mate_env,
    verification_env, write_diffyscan_configs, write_state_mate_config,
};
use crate::tools;

const FORKS: &[Slot] = &[Slot::L1Fork, Slot::L2Fork];
const L2_FORK: &[Slot] = &[Slot::L2Fork];

pub(super) fn fork_steps() -> Vec<Step> {
    vec![
        Step {
            name: "Spawn L1 Fork Node",
            phase: Phase::Fork,
            reads: &[],
            writes: &[Slot::L1Fork],
            releases: &[],
            action: |ctx, log| Box::pin(spawn_fork(ctx, Chain::L1, "l1ForkOutput.txt", log)),
        },
        Step {
            name: "Spawn L2 Fork Node",
            phase: Phase::Fork,
            reads: &[],
            writes: &[Slot::L2Fork],
            releases: &[],
            action: |ctx, log| Box::pin(spawn_fork(ctx, Chain::L2, "l2ForkOutput.txt", log)),
        },
        Step {
            name: "Burn L2 Deployer Nonces",
            phase: Phase::Fork,
            reads: L2_FORK,
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(burn_l2_nonces(ctx, NetworkMode::Forked, log)),
        },
        Step {
            name: "Deploy Governance Executor",
            phase: Phase::Fork,
            reads: L2_FORK,
            writes: &[Slot::ForkGovExecutor],
            releases: &[],
            action: |ctx, log| Box::pin(deploy_gov_executor(ctx, NetworkMode::Forked, log)),
        },
        Step {
            name: "Run Deploy Script",
            phase: Phase::Fork,
            reads: &[Slot::L1Fork, Slot::L2Fork, Slot::ForkGovExecutor],
            writes: &[Slot::ForkDeployment],
            releases: &[],
            action: |ctx, log| Box::pin(run_deploy_script(ctx, NetworkMode::Forked, log)),
        },
        Step {
            name: "State-Mate",
            phase: Phase::Fork,
            reads: &[Slot::L1Fork, Slot::L2Fork, Slot::ForkDeployment],
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(state_mate(ctx, NetworkMode::Forked, log)),
        },
        Step {
            name: "Run Integration Tests",
            phase: Phase::Fork,
            reads: &[
                Slot::L1Fork,
                Slot::L2Fork,
                Slot::ForkGovExecutor,
                Slot::ForkDeployment,
            ],
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(integration_tests(ctx, NetworkMode::Forked, log)),
        },
        Step {
            name: "Kill Forks",
            phase: Phase::Fork,
            reads: &[],
            writes: &[],
            releases: FORKS,
            action: kill_forks,
        },
    ]
}

pub(super) fn deploy_steps() -> Vec<Step> {
    vec![
        Step {
            name: "Burn L2 Deployer Nonces",
            phase: Phase::Deploy,
            reads: &[],
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(burn_l2_nonces(ctx, NetworkMode::Live, log)),
        },
        Step {
            name: "Deploy Governance Executor",
            phase: Phase::Deploy,
            reads: &[],
            writes: &[Slot::LiveGovExecutor],
            releases: &[],
            action: |ctx, log| Box::pin(deploy_gov_executor(ctx, NetworkMode::Live, log)),
        },
        Step {
            name: "Run Deploy Script",
            phase: Phase::Deploy,
            reads: &[Slot::LiveGovExecutor],
            writes: &[Slot::LiveDeployment],
            releases: &[],
            action: |ctx, log| Box::pin(run_deploy_script(ctx, NetworkMode::Live, log)),
        },
    ]
}

pub(super) fn verify_steps() -> Vec<Step> {
    vec![Step {
        name: "Verification",
        phase: Phase::Verify,
        reads: &[],
        writes: &[],
        releases: &[],
        action: |ctx, log| Box::pin(verification(ctx, log)),
    }]
}

pub(super) fn check_steps() -> Vec<Step> {
    vec![
        Step {
            name: "Load Live Deployment",
            phase: Phase::Check,
            reads: &[],
            writes: &[Slot::LiveGovExecutor, Slot::LiveDeployment],
            releases: &[],
            action: |ctx, log| Box::pin(load_live_deployment(ctx, log)),
        },
        Step {
            name: "State-Mate",
            phase: Phase::Check,
            reads: &[Slot::LiveDeployment],
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(state_mate(ctx, NetworkMode::Live, log)),
        },
        Step {
            name: "Diffyscan",
            phase: Phase::Check,
            reads: &[Slot::LiveDeployment],
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(diffyscan(ctx, log)),
        },
        Step {
            name: "Integration Tests On Fresh Forks",
            phase: Phase::Check,
            reads: &[Slot::LiveGovExecutor, Slot::LiveDeployment],
            writes: &[],
            releases: &[],
            action: |ctx, log| Box::pin(integration_tests_on_fresh_forks(ctx, log)),
        },
    ]
}

async fn spawn_fork(
    ctx: &mut Context,
    chain: Chain,
    log_file: &str,
    log: StepLog<'_>,
) -> Result<()> {
    let spec = ForkNodeSpec::from_env(chain, &ctx.env, ctx.store.path(log_file))?;
    let node = spawn_fork_node(&spec, &ctx.settings.fork, &log).await?;
    ctx.forks.insert(node);
    Ok(())
}

fn kill_forks<'a>(ctx: &'a mut Context, log: StepLog<'a>) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move { ctx.forks.shutdown(&log).await })
}

fn connect_l2(
    ctx: &Context,
    mode: NetworkMode,
    receipt_timeout: Duration,
) -> Result<AlloyChainClient> {
    let rpc_url = mode.rpc_url(Chain::L2, &ctx.env)?;
    let private_key = ctx.env.string("DEPLOYER_PRIVATE_KEY")?;
    AlloyChainClient::connect(&rpc_url, &private_key, receipt_timeout)
}

async fn burn_l2_nonces(ctx: &mut Context, mode: NetworkMode, log: StepLog<'_>) -> Result<()> {
    let client = connect_l2(ctx, mode, ctx.settings.nonces.tx_timeout())?;
    burn_nonces(&client, &ctx.settings.nonces, &log).await
}

async fn deploy_gov_executor(
    ctx: &mut Context,
    mode: NetworkMode,
    log: StepLog<'_>,
) -> Result<()> {
    let client = connect_l2(ctx, mode, ctx.settings.deploy.receipt_timeout())?;
    deploy_gov_executor_with(ctx, mode, &client, &log).await
}

/// Deploy the executor through `client` and record it for `mode`.
async fn deploy_gov_executor_with<C: ChainClient>(
    ctx: &mut Context,
    mode: NetworkMode,
    client: &C,
    log: &StepLog<'_>,
) -> Result<()> {
    let bytecode = load_bytecode(&ctx.settings.layout.executor_artifact())?;
    let args = ExecutorArgs::from(&ctx.config.parsed.deploy_parameters.l2.gov_bridge_executor);

    let address = deploy_executor(client, &bytecode, &args, &ctx.settings.deploy, log).await?;
    ctx.store
        .save(mode.gov_executor_args_file(), &args.deployment_args(address))?;
    ctx.target_mut(mode).gov_executor = Some(address);
    Ok(())
}

async fn run_deploy_script(ctx: &mut Context, mode: NetworkMode, log: StepLog<'_>) -> Result<()> {
    let gov_executor = ctx.gov_executor(mode, log.step())?.to_string();
    let env = bridge_deploy_env(
        &ctx.config.parsed.deploy_parameters,
        &gov_executor,
        mode,
        &ctx.env,
    )?;
    let layout = &ctx.settings.layout;
    tools::run_deploy_script(layout, &env, &ctx.settings.process, &log).await?;

    let script: ScriptDeploymentResult = read_json(&layout.bridge_deploy_result())
        .context("Deploy script did not leave a readable result")?;
    let deployment = DeploymentArtifacts::merged_from_script(script, &gov_executor);
    ctx.store.save(mode.deployment_file(), &deployment)?;
    ctx.store
        .import(&layout.bridge_l1_deploy_args(), mode.deployment_args_file(Chain::L1))?;
    ctx.store
        .import(&layout.bridge_l2_deploy_args(), mode.deployment_args_file(Chain::L2))?;
    log.milestone(format!(
        "Saved deployment to {}",
        ctx.store.path(mode.deployment_file()).display()
    ));

    ctx.target_mut(mode).deployment = Some(deployment);
    Ok(())
}

async fn state_mate(ctx: &mut Context, mode: NetworkMode, log: StepLog<'_>) -> Result<()> {
    let deployment = ctx.deployment(mode, log.step())?;
    let l2_chain_id = Chain::L2.chain_id(&ctx.env)?;
    let config = write_state_mate_config(&ctx.settings.layout, &ctx.config, deployment, l2_chain_id)?;
    let env = state_mate_env(
        &mode.rpc_url(Chain::L1, &ctx.env)?,
        &mode.rpc_url(Chain::L2, &ctx.env)?,
    );
    tools::run_state_mate(&ctx.settings.layout, &config, &env, &ctx.settings.process, &log).await
}

fn integration_env(ctx: &Context, mode: NetworkMode, step: &str) -> Result<EnvProjection> {
    let gov_executor = ctx.gov_executor(mode, step)?.to_string();
    let deployment = ctx.deployment(mode, step)?;
    let deploy_env = bridge_deploy_env(
        &ctx.config.parsed.deploy_parameters,
        &gov_executor,
        mode,
        &ctx.env,
    )?;
    let testing = integration_test_env(&ctx.config.parsed.testing_parameters, &gov_executor, deployment);
    Ok(deploy_env.merge(testing))
}

async fn integration_tests(ctx: &mut Context, mode: NetworkMode, log: StepLog<'_>) -> Result<()> {
    let env = integration_env(ctx, mode, log.step())?;
    tools::run_integration_tests(&ctx.settings.layout, &env, &ctx.settings.process, &log).await
}

async fn integration_tests_on_fresh_forks(ctx: &mut Context, log: StepLog<'_>) -> Result<()> {
    let env = integration_env(ctx, NetworkMode::Live, log.step())?;
    spawn_fork(ctx, Chain::L1, "l1ForkAfterDeployOutput.txt", log).await?;
    spawn_fork(ctx, Chain::L2, "l2ForkAfterDeployOutput.txt", log).await?;
    tools::run_integration_tests(&ctx.settings.layout, &env, &ctx.settings.process, &log).await?;
    ctx.forks.shutdown(&log).await
}

async fn load_live_deployment(ctx: &mut Context, log: StepLog<'_>) -> Result<()> {
    let file = NetworkMode::Live.deployment_file();
    let deployment: DeploymentArtifacts = ctx.store.load(file)?;
    anyhow::ensure!(
        !deployment.l2.gov_bridge_executor.is_empty(),
        "{} holds no live deployment, run the deploy phase first",
        ctx.store.path(file).display()
    );
    let gov_executor = Address::from_str(&deployment.l2.gov_bridge_executor)
        .with_context(|| format!("Invalid governance executor address in {file}"))?;
    log.milestone(format!(
        "Loaded live deployment: L1 bridge {}, L2 bridge {}, governance executor {gov_executor}",
        deployment.l1.bridge_proxy_address, deployment.l2.token_bridge_proxy_address
    ));

    ctx.live.gov_executor = Some(gov_executor);
    ctx.live.deployment = Some(deployment);
    Ok(())
}

async fn diffyscan(ctx: &mut Context, log: StepLog<'_>) -> Result<()> {
    let deployment = ctx.deployment(NetworkMode::Live, log.step())?;
    let executor = ExecutorArgs::from(&ctx.config.parsed.deploy_parameters.l2.gov_bridge_executor);
    let configs = write_diffyscan_configs(&ctx.settings.layout, deployment, &executor)?;
    for (target, config) in configs {
        log.milestone(format!("Comparing {target} bytecode"));
        let env = diffyscan_env(target.chain(), &ctx.env)?;
        tools::run_diffyscan(&ctx.settings.layout, &config, &env, &ctx.settings.process, &log)
            .await
            .with_context(|| format!("Diffyscan failed for {target}"))?;
    }
    Ok(())
}

async fn verification(ctx: &mut Context, log: StepLog<'_>) -> Result<()> {
    let store = &ctx.store;
    let settings = &ctx.settings;
    let live = NetworkMode::Live;

    let deployment: DeploymentArtifacts = store.load_existing(live.deployment_file())?;
    for (chain, block) in [
        (Chain::L1, deployment.l1.last_block_number),
        (Chain::L2, deployment.l2.last_block_number),
    ] {
        if block > 0 {
            let rpc_url = chain.remote_rpc_url(&ctx.env)?;
            tools::wait_for_finalization(rpc_url.as_str(), block, &settings.explorer, &log)
                .await
                .with_context(|| format!("{chain} deployment block was not finalized"))?;
        }
    }

    let env = verification_env(&ctx.env)?;
    let targets = [
        (&settings.layout.bridge_repo, Chain::L1, live.deployment_args_file(Chain::L1)),
        (&settings.layout.bridge_repo, Chain::L2, live.deployment_args_file(Chain::L2)),
        (&settings.layout.executor_repo, Chain::L2, live.gov_executor_args_file()),
    ];
    for (repo, chain, args_file) in targets {
        let args: DeploymentArgs = store.load_existing(args_file)?;
        log.milestone(format!("Verifying {} contracts from {args_file}", args.0.len()));
        let explorer = EtherscanClient::new(chain.explorer_api_url(&ctx.env)?, chain.explorer_token(&ctx.env)?)?;
        tools::verify_contracts(
            repo,
            chain,
            &args,
            &explorer,
            &settings.explorer,
            &env,
            &settings.process,
            &log,
        )
        .await?;
    }
    Ok(())
}
