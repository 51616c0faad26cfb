//! Expected-state config for the state-mate tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy_core::primitives::{Address, B256, U256, keccak256};
use alloy_core::sol_types::SolValue;
use anyhow::{Context, Result};
use url::Url;

use super::EnvProjection;
use super::yaml::{YamlDocument, YamlValue};
use crate::artifacts::{DeploymentArtifacts, write_atomic};
use crate::config::{ConfigDocument, TokenInfo};
use crate::settings::Layout;

pub const STATE_MATE_CONFIG: &str = "automaton.yaml";

/// Anchored `parameters` entries copied from the deployment config into the seed.
const PARAMETER_ANCHORS: [&str; 9] = [
    "agent",
    "lido",
    "accountingOracle",
    "wstETH",
    "stETH",
    "l1EmergencyBreaksMultisig",
    "l2EmergencyBreaksMultisig",
    "l1CrossDomainMessenger",
    "l2CrossDomainMessenger",
];

const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// EIP-712 domain separator of a token deployed at `verifying_contract`.
pub fn domain_separator(
    name: &str,
    version: &str,
    chain_id: u64,
    verifying_contract: &str,
) -> Result<B256> {
    let contract = Address::from_str(verifying_contract.trim())
        .with_context(|| format!("Invalid verifying contract address '{verifying_contract}'"))?;
    let encoded = (
        keccak256(EIP712_DOMAIN_TYPE),
        keccak256(name),
        keccak256(version),
        U256::from(chain_id),
        contract,
    )
        .abi_encode_params();
    Ok(keccak256(encoded))
}

/// Both chains' RPC endpoints under the names state-mate reads for testnets and mainnets.
pub fn state_mate_env(l1_rpc_url: &Url, l2_rpc_url: &Url) -> EnvProjection {
    EnvProjection::from_pairs([
        ("L1_TESTNET_RPC_URL", l1_rpc_url.as_str()),
        ("L2_TESTNET_RPC_URL", l2_rpc_url.as_str()),
        ("L1_MAINNET_RPC_URL", l1_rpc_url.as_str()),
        ("L2_MAINNET_RPC_URL", l2_rpc_url.as_str()),
    ])
}

/// Fill the seed config with the configured parameters, the deployed addresses and the
/// expected getter values.
pub fn state_mate_config(
    seed: &str,
    config: &ConfigDocument,
    deployed: &DeploymentArtifacts,
    l2_chain_id: u64,
) -> Result<String> {
    let mut doc = YamlDocument::parse(seed).context("Failed to parse state-mate seed")?;
    let main = YamlDocument::parse(config.raw.as_str())?;

    for anchor in PARAMETER_ANCHORS {
        let value = main
            .anchor_value(anchor)
            .with_context(|| format!("Deployment config has no &{anchor} parameter"))?;
        doc.set_anchor_value(anchor, &value)?;
    }

    let l1 = &deployed.l1;
    let l2 = &deployed.l2;
    for (anchor, address) in [
        ("l1TokenBridge", &l1.bridge_proxy_address),
        ("l1TokenBridgeImpl", &l1.bridge_impl_address),
        ("l1OpStackTokenRatePusher", &l1.op_stack_token_rate_pusher_impl_address),
        ("l2GovernanceExecutor", &l2.gov_bridge_executor),
        ("l2TokenBridge", &l2.token_bridge_proxy_address),
        ("l2TokenBridgeImpl", &l2.token_bridge_impl_address),
        ("l2WstETH", &l2.token_proxy_address),
        ("l2WstETHImpl", &l2.token_impl_address),
        ("l2StETH", &l2.token_rebasable_proxy_address),
        ("l2StETHImpl", &l2.token_rebasable_impl_address),
        ("l2TokenRateOracle", &l2.token_rate_oracle_proxy_address),
        ("l2TokenRateOracleImpl", &l2.token_rate_oracle_impl_address),
    ] {
        doc.set_anchor_value(anchor, address)?;
    }

    let params = &config.parsed.deploy_parameters;

    let pusher = ["l1", "contracts", "opStackTokenRatePusher", "checks"];
    set_check(
        &mut doc,
        &pusher,
        "L2_GAS_LIMIT_FOR_PUSHING_TOKEN_RATE",
        params
            .l1
            .op_stack_token_rate_pusher
            .l2_gas_limit_for_pushing_token_rate
            .into(),
    )?;

    let l1_bridge = ["l1", "contracts", "tokenBridge", "checks"];
    let bridge = &params.l1.token_bridge;
    set_check(&mut doc, &l1_bridge, "isDepositsEnabled", bridge.deposits_enabled.into())?;
    set_check(&mut doc, &l1_bridge, "isWithdrawalsEnabled", bridge.withdrawals_enabled.into())?;

    let executor = ["l2", "contracts", "governanceExecutor", "checks"];
    let gov = &params.l2.gov_bridge_executor;
    set_check(
        &mut doc,
        &executor,
        "OVM_L2_CROSS_DOMAIN_MESSENGER",
        gov.ovm_l2_messenger.as_str().into(),
    )?;
    set_check(&mut doc, &executor, "getDelay", gov.delay.into())?;
    set_check(&mut doc, &executor, "getGracePeriod", gov.grace_period.into())?;
    set_check(&mut doc, &executor, "getMinimumDelay", gov.min_delay.into())?;
    set_check(&mut doc, &executor, "getMaximumDelay", gov.max_delay.into())?;
    set_check(&mut doc, &executor, "getGuardian", gov.ovm_guardian.as_str().into())?;

    set_token_checks(
        &mut doc,
        "wstETH",
        &params.l2.non_rebasable_token,
        &l2.token_proxy_address,
        l2_chain_id,
    )?;
    set_token_checks(
        &mut doc,
        "stETH",
        &params.l2.rebasable_token,
        &l2.token_rebasable_proxy_address,
        l2_chain_id,
    )?;

    let oracle_checks = ["l2", "contracts", "tokenRateOracle", "checks"];
    let oracle = &params.l2.token_rate_oracle;
    for (check, value) in [
        ("MAX_ALLOWED_L2_TO_L1_CLOCK_LAG", oracle.max_allowed_l2_to_l1_clock_lag),
        (
            "MAX_ALLOWED_TOKEN_RATE_DEVIATION_PER_DAY_BP",
            oracle.max_allowed_token_rate_deviation_per_day_bp,
        ),
        ("MIN_TIME_BETWEEN_TOKEN_RATE_UPDATES", oracle.min_time_between_token_rate_updates),
        ("OLDEST_RATE_ALLOWED_IN_PAUSE_TIME_SPAN", oracle.oldest_rate_allowed_in_pause_time_span),
        ("TOKEN_RATE_OUTDATED_DELAY", oracle.token_rate_outdated_delay),
    ] {
        set_check(&mut doc, &oracle_checks, check, value.into())?;
    }
    set_check(
        &mut doc,
        &oracle_checks,
        "isTokenRateUpdatesPaused",
        (!oracle.update_enabled).into(),
    )?;

    let l2_bridge = ["l2", "contracts", "tokenBridge", "checks"];
    let bridge = &params.l2.token_bridge;
    set_check(&mut doc, &l2_bridge, "isDepositsEnabled", bridge.deposits_enabled.into())?;
    set_check(&mut doc, &l2_bridge, "isWithdrawalsEnabled", bridge.withdrawals_enabled.into())?;

    doc.validate()?;
    Ok(doc.into_string())
}

fn set_check(doc: &mut YamlDocument, checks: &[&str], name: &str, value: YamlValue) -> Result<()> {
    let mut path = checks.to_vec();
    path.push(name);
    doc.set_path(&path, value)
        .with_context(|| format!("Failed to set {}", path.join(".")))
}

fn set_token_checks(
    doc: &mut YamlDocument,
    contract: &str,
    token: &TokenInfo,
    address: &str,
    chain_id: u64,
) -> Result<()> {
    let checks = ["l2", "contracts", contract, "checks"];
    let version = token.signing_domain_version.to_string();
    set_check(doc, &checks, "name", token.name.as_str().into())?;
    set_check(doc, &checks, "symbol", token.symbol.as_str().into())?;
    set_check(doc, &checks, "getContractVersion", token.signing_domain_version.into())?;

    let separator = domain_separator(&token.name, &version, chain_id, address)
        .with_context(|| format!("Failed to compute {contract} domain separator"))?;
    set_check(doc, &checks, "DOMAIN_SEPARATOR", separator.to_string().as_str().into())?;

    let domain = serde_json::json!([
        "0x0f",
        token.name,
        version,
        chain_id,
        address,
        B256::ZERO.to_string(),
        [],
    ]);
    set_check(doc, &checks, "eip712Domain", YamlValue::Flow(domain))
}

/// Generate the config into the configs directory next to a copy of the seed's ABI files.
/// Returns the path of the written config.
pub fn write_state_mate_config(
    layout: &Layout,
    config: &ConfigDocument,
    deployed: &DeploymentArtifacts,
    l2_chain_id: u64,
) -> Result<PathBuf> {
    let seed_path = layout.state_mate_seed();
    let seed = fs::read_to_string(&seed_path)
        .with_context(|| format!("Failed to read state-mate seed {}", seed_path.display()))?;
    let rendered = state_mate_config(&seed, config, deployed, l2_chain_id)?;

    let configs_dir = layout.configs_dir();
    let output = configs_dir.join(STATE_MATE_CONFIG);
    write_atomic(&output, rendered.as_bytes())?;
    copy_dir(&layout.state_mate_abi_dir(), &configs_dir.join("abi"))?;

    tracing::info!(path = %output.display(), "Wrote state-mate config");
    Ok(output)
}

fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let entries = fs::read_dir(source)
        .with_context(|| format!("Failed to read directory {}", source.display()))?;
    for entry in entries {
        let entry = entry?;
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), destination.display())
            })?;
        }
    }
    Ok(())
}
