//! Environment for the bridge repository's deploy script, integration tests and
//! verification tasks.

use anyhow::Result;

use super::{EnvProjection, bracket_list};
use crate::artifacts::DeploymentArtifacts;
use crate::config::{DeployParameters, TestingParameters};
use crate::env::Env;
use crate::network::{Chain, NetworkMode};

/// Variables the deploy script reads. `gov_executor` becomes the admin of every L2
/// contract and joins each L2 enabler/disabler list.
pub fn bridge_deploy_env(
    params: &DeployParameters,
    gov_executor: &str,
    mode: NetworkMode,
    env: &Env,
) -> Result<EnvProjection> {
    let l1 = &params.l1;
    let l2 = &params.l2;
    let with_executor = |list: &[String]| {
        bracket_list(
            list.iter()
                .map(String::as_str)
                .chain(std::iter::once(gov_executor)),
        )
    };

    let mut projection = explorer_env(env)?;
    projection.insert("FORKING", (mode == NetworkMode::Forked).to_string());
    projection.insert("L1_DEPLOYER_PRIVATE_KEY", env.string("DEPLOYER_PRIVATE_KEY")?);
    projection.insert("L2_DEPLOYER_PRIVATE_KEY", env.string("DEPLOYER_PRIVATE_KEY")?);

    // L1
    projection.insert("L1_CROSSDOMAIN_MESSENGER", &l1.token_bridge.messenger);
    projection.insert("L1_PROXY_ADMIN", &l1.proxy_admin);
    projection.insert("L1_NON_REBASABLE_TOKEN", &l1.token_bridge.l1_non_rebasable_token);
    projection.insert("L1_REBASABLE_TOKEN", &l1.token_bridge.l1_rebasable_token);
    projection.insert("ACCOUNTING_ORACLE", &l1.token_bridge.accounting_oracle);
    projection.insert(
        "L2_GAS_LIMIT_FOR_PUSHING_TOKEN_RATE",
        l1.op_stack_token_rate_pusher
            .l2_gas_limit_for_pushing_token_rate
            .to_string(),
    );
    projection.insert("L1_BRIDGE_ADMIN", &l1.token_bridge.bridge_admin);
    projection.insert("L1_DEPOSITS_ENABLED", l1.token_bridge.deposits_enabled.to_string());
    projection.insert(
        "L1_WITHDRAWALS_ENABLED",
        l1.token_bridge.withdrawals_enabled.to_string(),
    );
    projection.insert("L1_DEPOSITS_ENABLERS", bracket_list(&l1.token_bridge.deposits_enablers));
    projection.insert("L1_DEPOSITS_DISABLERS", bracket_list(&l1.token_bridge.deposits_disablers));
    projection.insert(
        "L1_WITHDRAWALS_ENABLERS",
        bracket_list(&l1.token_bridge.withdrawals_enablers),
    );
    projection.insert(
        "L1_WITHDRAWALS_DISABLERS",
        bracket_list(&l1.token_bridge.withdrawals_disablers),
    );

    // L2
    let oracle = &l2.token_rate_oracle;
    projection.insert("L2_CROSSDOMAIN_MESSENGER", &l2.token_bridge.messenger);
    projection.insert("L2_PROXY_ADMIN", gov_executor);
    projection.insert("TOKEN_RATE_ORACLE_ADMIN", gov_executor);
    projection.insert("TOKEN_RATE_UPDATE_ENABLED", oracle.update_enabled.to_string());
    projection.insert("TOKEN_RATE_UPDATE_ENABLERS", with_executor(&oracle.update_enablers));
    projection.insert("TOKEN_RATE_UPDATE_DISABLERS", with_executor(&oracle.update_disablers));
    projection.insert(
        "TOKEN_RATE_OUTDATED_DELAY",
        oracle.token_rate_outdated_delay.to_string(),
    );
    projection.insert(
        "MAX_ALLOWED_L2_TO_L1_CLOCK_LAG",
        oracle.max_allowed_l2_to_l1_clock_lag.to_string(),
    );
    projection.insert(
        "MAX_ALLOWED_TOKEN_RATE_DEVIATION_PER_DAY_BP",
        oracle.max_allowed_token_rate_deviation_per_day_bp.to_string(),
    );
    projection.insert(
        "OLDEST_RATE_ALLOWED_IN_PAUSE_TIME_SPAN",
        oracle.oldest_rate_allowed_in_pause_time_span.to_string(),
    );
    projection.insert(
        "MIN_TIME_BETWEEN_TOKEN_RATE_UPDATES",
        oracle.min_time_between_token_rate_updates.to_string(),
    );
    projection.insert(
        "INITIAL_TOKEN_RATE_VALUE",
        oracle.initial_token_rate_value.to_string(),
    );
    projection.insert(
        "INITIAL_TOKEN_RATE_L1_TIMESTAMP",
        oracle.initial_token_rate_l1_timestamp.to_string(),
    );

    for (prefix, token) in [
        ("L2_TOKEN_NON_REBASABLE", &l2.non_rebasable_token),
        ("L2_TOKEN_REBASABLE", &l2.rebasable_token),
    ] {
        projection.insert(format!("{prefix}_NAME"), &token.name);
        projection.insert(format!("{prefix}_SYMBOL"), &token.symbol);
        projection.insert(
            format!("{prefix}_SIGNING_DOMAIN_VERSION"),
            token.signing_domain_version.to_string(),
        );
    }

    let bridge = &l2.token_bridge;
    projection.insert("L2_BRIDGE_ADMIN", gov_executor);
    projection.insert("L2_DEPOSITS_ENABLED", bridge.deposits_enabled.to_string());
    projection.insert("L2_WITHDRAWALS_ENABLED", bridge.withdrawals_enabled.to_string());
    projection.insert("L2_DEPOSITS_ENABLERS", with_executor(&bridge.deposits_enablers));
    projection.insert("L2_DEPOSITS_DISABLERS", with_executor(&bridge.deposits_disablers));
    projection.insert("L2_WITHDRAWALS_ENABLERS", with_executor(&bridge.withdrawals_enablers));
    projection.insert("L2_WITHDRAWALS_DISABLERS", with_executor(&bridge.withdrawals_disablers));

    projection.insert("L2_DEPLOY_SKIP_PROMPTS", "1");
    Ok(projection)
}

/// `TESTING_*` variables pointing the integration tests at a deployment.
pub fn integration_test_env(
    testing: &TestingParameters,
    gov_executor: &str,
    deployed: &DeploymentArtifacts,
) -> EnvProjection {
    EnvProjection::from_pairs([
        ("TESTING_USE_DEPLOYED_CONTRACTS", "true"),
        ("TESTING_OPT_L1_LIDO", testing.lido.as_str()),
        ("TESTING_OPT_L1_REBASABLE_TOKEN", testing.l1_rebasable_token.as_str()),
        (
            "TESTING_OPT_L1_NON_REBASABLE_TOKEN",
            testing.l1_non_rebasable_token.as_str(),
        ),
        ("TESTING_OPT_L1_ACCOUNTING_ORACLE", testing.accounting_oracle.as_str()),
        ("TESTING_L1_TOKENS_HOLDER", testing.l1_tokens_holder.as_str()),
        ("TESTING_OPT_GOV_BRIDGE_EXECUTOR", gov_executor),
        (
            "TESTING_OPT_L1_ERC20_TOKEN_BRIDGE",
            deployed.l1.bridge_proxy_address.as_str(),
        ),
        ("TESTING_OPT_L1_TOKEN_RATE_NOTIFIER", testing.token_rate_notifier.as_str()),
        (
            "TESTING_OPT_L1_OP_STACK_TOKEN_RATE_PUSHER",
            deployed.l1.op_stack_token_rate_pusher_impl_address.as_str(),
        ),
        (
            "TESTING_OPT_L2_TOKEN_RATE_ORACLE",
            deployed.l2.token_rate_oracle_proxy_address.as_str(),
        ),
        (
            "TESTING_OPT_L2_NON_REBASABLE_TOKEN",
            deployed.l2.token_proxy_address.as_str(),
        ),
        (
            "TESTING_OPT_L2_REBASABLE_TOKEN",
            deployed.l2.token_rebasable_proxy_address.as_str(),
        ),
        (
            "TESTING_OPT_L2_ERC20_TOKEN_BRIDGE",
            deployed.l2.token_bridge_proxy_address.as_str(),
        ),
    ])
}

/// Hardhat network and explorer settings for `npx hardhat verify` in either repository.
pub fn verification_env(env: &Env) -> Result<EnvProjection> {
    explorer_env(env)
}

/// Remote RPCs, chain ids and explorer endpoints of both chains.
fn explorer_env(env: &Env) -> Result<EnvProjection> {
    let mut projection = EnvProjection::default();
    for chain in [Chain::L1, Chain::L2] {
        let prefix = chain.env_prefix();
        projection.insert(
            format!("{prefix}_BLOCK_EXPLORER_API_KEY"),
            chain.explorer_token(env)?,
        );
        projection.insert(
            format!("{prefix}_BLOCK_EXPLORER_BROWSER_URL"),
            chain.explorer_browser_url(env)?.to_string(),
        );
        projection.insert(
            format!("{prefix}_BLOCK_EXPLORER_API_URL"),
            chain.explorer_api_url(env)?.to_string(),
        );
        projection.insert(format!("{prefix}_CHAIN_ID"), chain.chain_id(env)?.to_string());
        // The key spelling is what the bridge repository's hardhat config reads.
        projection.insert(
            format!("{prefix}_PRC_URL"),
            chain.remote_rpc_url(env)?.to_string(),
        );
    }
    Ok(projection)
}
