//! Translation of configuration and deployment records into the inputs each external
//! tool expects: environment variables, YAML and JSON configs.
//!
//! Every function here is pure or touches only the artifact directory. Nothing mutates
//! the orchestrator's own process environment.

use std::collections::BTreeMap;

use derive_more::Deref;

mod bridge;
mod diffyscan;
mod state_mate;
mod yaml;

pub use bridge::{bridge_deploy_env, integration_test_env, verification_env};
pub use diffyscan::{DiffyscanTarget, diffyscan_env, write_diffyscan_configs};
pub use state_mate::{domain_separator, state_mate_config, state_mate_env, write_state_mate_config};
pub use yaml::{YamlDocument, YamlValue};

/// Environment variables to layer over the inherited environment of one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct EnvProjection(BTreeMap<String, String>);

impl EnvProjection {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Entries of `other` win over entries of `self`.
    pub fn merge(mut self, other: EnvProjection) -> Self {
        self.0.extend(other.0);
        self
    }
}

/// Formats addresses the way the bridge scripts parse lists: `["0xa","0xb"]`.
pub(crate) fn bracket_list<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> String {
    let quoted: Vec<String> = items
        .into_iter()
        .map(|item| format!("\"{}\"", item.as_ref()))
        .collect();
    format!("[{}]", quoted.join(","))
}
