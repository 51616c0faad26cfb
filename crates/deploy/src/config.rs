//! Deployment configuration loaded from the operator's YAML file.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Parsed deployment configuration plus the text it came from.
///
/// The raw text is kept because the state-assertion config copies anchored
/// `parameters` entries out of it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub parsed: MainConfig,
    pub raw: String,
}

impl ConfigDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: String) -> Result<Self> {
        let parsed = serde_yaml::from_str(&raw).context("Failed to parse deployment config")?;
        Ok(Self { parsed, raw })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainConfig {
    pub deploy_parameters: DeployParameters,
    pub testing_parameters: TestingParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployParameters {
    #[serde(default)]
    pub forking: bool,
    pub l1: L1Config,
    pub l2: L2Config,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1Config {
    pub proxy_admin: String,
    pub op_stack_token_rate_pusher: OpStackTokenRatePusher,
    pub token_bridge: L1TokenBridge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2Config {
    pub gov_bridge_executor: GovBridgeExecutor,
    pub token_rate_oracle: TokenRateOracle,
    pub non_rebasable_token: TokenInfo,
    pub rebasable_token: TokenInfo,
    pub token_bridge: L2TokenBridge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpStackTokenRatePusher {
    pub messenger: String,
    #[serde(rename = "wstETH")]
    pub wst_eth: String,
    pub accounting_oracle: String,
    #[serde(deserialize_with = "integer")]
    pub l2_gas_limit_for_pushing_token_rate: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1TokenBridge {
    pub bridge_admin: String,
    pub messenger: String,
    pub accounting_oracle: String,
    pub l1_non_rebasable_token: String,
    pub l1_rebasable_token: String,
    pub deposits_enabled: bool,
    pub withdrawals_enabled: bool,
    #[serde(default)]
    pub deposits_enablers: Vec<String>,
    #[serde(default)]
    pub deposits_disablers: Vec<String>,
    #[serde(default)]
    pub withdrawals_enablers: Vec<String>,
    #[serde(default)]
    pub withdrawals_disablers: Vec<String>,
}

/// Constructor parameters of the L2 governance executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovBridgeExecutor {
    pub ovm_l2_messenger: String,
    pub ethereum_gov_executor: String,
    #[serde(deserialize_with = "integer")]
    pub delay: u128,
    #[serde(deserialize_with = "integer")]
    pub grace_period: u128,
    #[serde(deserialize_with = "integer")]
    pub min_delay: u128,
    #[serde(deserialize_with = "integer")]
    pub max_delay: u128,
    // The key is misspelled in every config in circulation.
    #[serde(rename = "ovmGuiardian")]
    pub ovm_guardian: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRateOracle {
    #[serde(default)]
    pub l2_messenger: String,
    #[serde(deserialize_with = "integer")]
    pub token_rate_outdated_delay: u128,
    #[serde(deserialize_with = "integer")]
    pub max_allowed_l2_to_l1_clock_lag: u128,
    #[serde(deserialize_with = "integer")]
    pub max_allowed_token_rate_deviation_per_day_bp: u128,
    #[serde(deserialize_with = "integer")]
    pub oldest_rate_allowed_in_pause_time_span: u128,
    #[serde(deserialize_with = "integer")]
    pub min_time_between_token_rate_updates: u128,
    pub update_enabled: bool,
    #[serde(default)]
    pub update_enablers: Vec<String>,
    #[serde(default)]
    pub update_disablers: Vec<String>,
    #[serde(deserialize_with = "integer")]
    pub initial_token_rate_value: u128,
    #[serde(deserialize_with = "integer")]
    pub initial_token_rate_l1_timestamp: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    #[serde(deserialize_with = "integer")]
    pub signing_domain_version: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2TokenBridge {
    pub messenger: String,
    #[serde(default)]
    pub l1_non_rebasable_token: String,
    #[serde(default)]
    pub l1_rebasable_token: String,
    pub deposits_enabled: bool,
    pub withdrawals_enabled: bool,
    #[serde(default)]
    pub deposits_enablers: Vec<String>,
    #[serde(default)]
    pub deposits_disablers: Vec<String>,
    #[serde(default)]
    pub withdrawals_enablers: Vec<String>,
    #[serde(default)]
    pub withdrawals_disablers: Vec<String>,
}

/// Addresses the bridge's integration tests exercise against a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestingParameters {
    pub lido: String,
    pub accounting_oracle: String,
    pub token_rate_notifier: String,
    pub l1_non_rebasable_token: String,
    pub l1_rebasable_token: String,
    pub l1_tokens_holder: String,
}

/// Accepts integers written either bare or quoted, up to `u128`.
fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    struct IntegerVisitor;

    impl Visitor<'_> for IntegerVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative integer {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u128, E> {
            Err(E::custom(format!(
                "{v} is not an exact integer; quote large values"
            )))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim()
                .replace('_', "")
                .parse()
                .map_err(|_| E::custom(format!("'{v}' is not an integer")))
        }
    }

    deserializer.deserialize_any(IntegerVisitor)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_CONFIG: &str = r#"
parameters:
  - &agent "0x32A0E5828B62AAb932362a4816ae03b860b65e83"
  - &lido "0x3e3FE7dBc6B4C189E7128855dD526361c49b40Af"
  - &accountingOracle "0xd497Be005638efCf09F6BFC8DAFBBB0BB72cD991"
  - &wstETH "0xB82381A3fBD3FaFA77B3a7bE693342618240067b"
  - &stETH "0x3e3FE7dBc6B4C189E7128855dD526361c49b40Af"
  - &l1EmergencyBreaksMultisig "0xa5F1d7D49F581136Cf6e58B32cBE9a2039C48bA1"
  - &l2EmergencyBreaksMultisig "0xa5F1d7D49F581136Cf6e58B32cBE9a2039C48bA1"
  - &l1CrossDomainMessenger "0x58Cc85b8D04EA49cC6DBd3CbFFd00B4B8D6cb3ef"
  - &l2CrossDomainMessenger "0x4200000000000000000000000000000000000007"

deployParameters:
  forking: true
  l1:
    proxyAdmin: *agent
    opStackTokenRatePusher:
      messenger: *l1CrossDomainMessenger
      wstETH: *wstETH
      accountingOracle: *accountingOracle
      l2GasLimitForPushingTokenRate: 300000
    tokenBridge:
      bridgeAdmin: *agent
      messenger: *l1CrossDomainMessenger
      accountingOracle: *accountingOracle
      l1NonRebasableToken: *wstETH
      l1RebasableToken: *stETH
      depositsEnabled: true
      withdrawalsEnabled: true
      depositsEnablers: [*agent]
      depositsDisablers: [*agent, *l1EmergencyBreaksMultisig]
      withdrawalsEnablers: [*agent]
      withdrawalsDisablers: [*agent, *l1EmergencyBreaksMultisig]
  l2:
    govBridgeExecutor:
      ovmL2Messenger: *l2CrossDomainMessenger
      ethereumGovExecutor: *agent
      delay: 0
      gracePeriod: 86400
      minDelay: 0
      maxDelay: 1
      ovmGuiardian: "0x0000000000000000000000000000000000000000"
    tokenRateOracle:
      l2Messenger: *l2CrossDomainMessenger
      tokenRateOutdatedDelay: 86400
      maxAllowedL2ToL1ClockLag: 86400
      maxAllowedTokenRateDeviationPerDayBp: 500
      oldestRateAllowedInPauseTimeSpan: 86400
      minTimeBetweenTokenRateUpdates: 3600
      updateEnabled: true
      updateEnablers: []
      updateDisablers: [*l2EmergencyBreaksMultisig]
      initialTokenRateValue: "1000000000000000000000000000"
      initialTokenRateL1Timestamp: 1719765972
    nonRebasableToken:
      name: "Wrapped liquid staked Ether 2.0"
      symbol: "wstETH"
      signingDomainVersion: 2
    rebasableToken:
      name: "Liquid staked Ether 2.0"
      symbol: "stETH"
      signingDomainVersion: "2"
    tokenBridge:
      messenger: *l2CrossDomainMessenger
      depositsEnabled: true
      withdrawalsEnabled: false
      depositsEnablers: []
      depositsDisablers: [*l2EmergencyBreaksMultisig]
      withdrawalsEnablers: []
      withdrawalsDisablers: [*l2EmergencyBreaksMultisig]

testingParameters:
  lido: *lido
  accountingOracle: *accountingOracle
  tokenRateNotifier: "0x10cA9008D7dcea1Bed4d5394F8c58F3113A2814D"
  l1NonRebasableToken: *wstETH
  l1RebasableToken: *stETH
  l1TokensHolder: "0xCDE580BD2D5D8D0E8B9Bd6D6C5D37f4cB0aB0A22"
"#;

    pub(crate) fn sample_document() -> ConfigDocument {
        ConfigDocument::parse(SAMPLE_CONFIG.to_string()).unwrap()
    }

    #[test]
    fn test_parse_resolves_aliases() {
        let config = sample_document().parsed;
        let l1 = &config.deploy_parameters.l1;
        assert_eq!(l1.proxy_admin, "0x32A0E5828B62AAb932362a4816ae03b860b65e83");
        assert_eq!(
            l1.token_bridge.deposits_disablers,
            vec![
                "0x32A0E5828B62AAb932362a4816ae03b860b65e83".to_string(),
                "0xa5F1d7D49F581136Cf6e58B32cBE9a2039C48bA1".to_string(),
            ]
        );
        assert!(config.deploy_parameters.forking);
    }

    #[test]
    fn test_integers_accept_quoted_and_large_values() {
        let config = sample_document().parsed;
        let oracle = &config.deploy_parameters.l2.token_rate_oracle;
        assert_eq!(
            oracle.initial_token_rate_value,
            1_000_000_000_000_000_000_000_000_000
        );
        assert_eq!(
            config.deploy_parameters.l2.rebasable_token.signing_domain_version,
            2
        );
        assert_eq!(
            config
                .deploy_parameters
                .l1
                .op_stack_token_rate_pusher
                .l2_gas_limit_for_pushing_token_rate,
            300_000
        );
    }

    #[test]
    fn test_misspelled_guardian_key() {
        let config = sample_document().parsed;
        assert_eq!(
            config.deploy_parameters.l2.gov_bridge_executor.ovm_guardian,
            "0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_raw_text_is_kept() {
        let document = sample_document();
        assert!(document.raw.contains("&agent"));
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let result = ConfigDocument::parse("deployParameters: {}\n".to_string());
        assert!(result.is_err());
    }
}
