//! Bytecode-diff configs and environment for diffyscan.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::EnvProjection;
use crate::artifacts::{DeploymentArtifacts, read_json, write_atomic};
use crate::env::Env;
use crate::gov_executor::ExecutorArgs;
use crate::network::{Chain, diffyscan_rpc_url};
use crate::settings::Layout;

/// One diffyscan run over a group of contracts on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum DiffyscanTarget {
    #[strum(to_string = "L1 bridge")]
    L1,
    #[strum(to_string = "L2 governance executor")]
    L2Gov,
    #[strum(to_string = "L2 bridge")]
    L2,
}

impl DiffyscanTarget {
    pub fn config_name(self) -> &'static str {
        match self {
            DiffyscanTarget::L1 => "automaton_config_L1.json",
            DiffyscanTarget::L2Gov => "automaton_config_L2_gov.json",
            DiffyscanTarget::L2 => "automaton_config_L2.json",
        }
    }

    pub fn chain(self) -> Chain {
        match self {
            DiffyscanTarget::L1 => Chain::L1,
            DiffyscanTarget::L2Gov | DiffyscanTarget::L2 => Chain::L2,
        }
    }

    /// Deployed address → contract name to compare against source.
    fn contracts(self, deployed: &DeploymentArtifacts) -> Map<String, Value> {
        let l1 = &deployed.l1;
        let l2 = &deployed.l2;
        let entries: Vec<(&String, &str)> = match self {
            DiffyscanTarget::L1 => vec![
                (&l1.bridge_proxy_address, "OssifiableProxy"),
                (&l1.bridge_impl_address, "L1LidoTokensBridge"),
                (&l1.op_stack_token_rate_pusher_impl_address, "OpStackTokenRatePusher"),
            ],
            DiffyscanTarget::L2Gov => vec![(&l2.gov_bridge_executor, "OptimismBridgeExecutor")],
            DiffyscanTarget::L2 => vec![
                (&l2.token_rate_oracle_proxy_address, "OssifiableProxy"),
                (&l2.token_rate_oracle_impl_address, "TokenRateOracle"),
                (&l2.token_proxy_address, "OssifiableProxy"),
                (&l2.token_impl_address, "ERC20BridgedPermit"),
                (&l2.token_rebasable_proxy_address, "OssifiableProxy"),
                (&l2.token_rebasable_impl_address, "ERC20RebasableBridgedPermit"),
                (&l2.token_bridge_proxy_address, "OssifiableProxy"),
                (&l2.token_bridge_impl_address, "L2ERC20ExtendedTokensBridge"),
            ],
        };
        entries
            .into_iter()
            .map(|(address, name)| (address.clone(), Value::from(name)))
            .collect()
    }
}

/// Variables diffyscan reads: explorer token, the remote chain to compare and the
/// local port it may spin its own node on.
pub fn diffyscan_env(chain: Chain, env: &Env) -> Result<EnvProjection> {
    Ok(EnvProjection::from_pairs([
        ("ETHERSCAN_EXPLORER_TOKEN", chain.explorer_token(env)?),
        ("REMOTE_RPC_URL", chain.remote_rpc_url(env)?.to_string()),
        ("LOCAL_RPC_URL", diffyscan_rpc_url(env)?.to_string()),
        ("GITHUB_API_TOKEN", env.string("GITHUB_API_TOKEN")?),
        ("CHAIN_ID", chain.chain_id(env)?.to_string()),
    ]))
}

/// Render every target's config from its template. Returns the written paths in
/// target order.
pub fn write_diffyscan_configs(
    layout: &Layout,
    deployed: &DeploymentArtifacts,
    executor: &ExecutorArgs,
) -> Result<Vec<(DiffyscanTarget, PathBuf)>> {
    use strum::IntoEnumIterator;

    let templates = layout.diffyscan_templates();
    let configs_dir = layout.configs_dir();
    DiffyscanTarget::iter()
        .map(|target| {
            let template_path = templates.join(target.config_name());
            let template: Value = read_json(&template_path)?;
            let rendered = render_config(template, target, deployed, executor)
                .with_context(|| format!("Invalid template {}", template_path.display()))?;

            let output = configs_dir.join(target.config_name());
            let contents = serde_json::to_string_pretty(&rendered)?;
            write_atomic(&output, contents.as_bytes())?;
            Ok((target, output))
        })
        .collect()
}

fn render_config(
    mut template: Value,
    target: DiffyscanTarget,
    deployed: &DeploymentArtifacts,
    executor: &ExecutorArgs,
) -> Result<Value> {
    let object = template
        .as_object_mut()
        .context("Diffyscan template is not a JSON object")?;
    object.insert("contracts".into(), Value::Object(target.contracts(deployed)));
    if target == DiffyscanTarget::L2Gov {
        let mut args = Map::new();
        args.insert(
            deployed.l2.gov_bridge_executor.clone(),
            Value::Array(constructor_values(executor)),
        );
        object.insert("constructor_args".into(), Value::Object(args));
    }
    Ok(template)
}

/// Executor constructor arguments typed the way diffyscan ABI-encodes them.
fn constructor_values(executor: &ExecutorArgs) -> Vec<Value> {
    let number = |value: u128| {
        u64::try_from(value).map_or_else(|_| Value::from(value.to_string()), Value::from)
    };
    vec![
        Value::from(executor.ovm_l2_messenger.as_str()),
        Value::from(executor.ethereum_gov_executor.as_str()),
        number(executor.delay),
        number(executor.grace_period),
        number(executor.min_delay),
        number(executor.max_delay),
        Value::from(executor.ovm_guardian.as_str()),
    ]
}
