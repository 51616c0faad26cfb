//! Persistent JSON records shared between steps and between runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

/// Addresses of one full deployment, as persisted under a target's deployment file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentArtifacts {
    pub l1: L1Deployment,
    pub l2: L2Deployment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct L1Deployment {
    pub bridge_impl_address: String,
    pub bridge_proxy_address: String,
    pub op_stack_token_rate_pusher_impl_address: String,
    pub last_block_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct L2Deployment {
    pub gov_bridge_executor: String,
    pub token_impl_address: String,
    pub token_proxy_address: String,
    pub token_rebasable_impl_address: String,
    pub token_rebasable_proxy_address: String,
    pub token_bridge_impl_address: String,
    pub token_bridge_proxy_address: String,
    pub token_rate_oracle_impl_address: String,
    pub token_rate_oracle_proxy_address: String,
    pub last_block_number: u64,
}

/// Result file written by the bridge deploy script, keyed by network name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptDeploymentResult {
    pub ethereum: L1Deployment,
    pub optimism: L2Deployment,
}

impl DeploymentArtifacts {
    /// Map the deploy script's output, keeping `gov_bridge_executor` from the existing
    /// record for the same target.
    pub fn merged_from_script(script: ScriptDeploymentResult, gov_bridge_executor: &str) -> Self {
        let mut merged = Self {
            l1: script.ethereum,
            l2: script.optimism,
        };
        merged.l2.gov_bridge_executor = gov_bridge_executor.to_string();
        merged
    }
}

/// Deployed address → ordered constructor arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentArgs(pub BTreeMap<String, Vec<Value>>);

impl DeploymentArgs {
    pub fn single(address: impl Into<String>, args: Vec<Value>) -> Self {
        Self(BTreeMap::from([(address.into(), args)]))
    }

    /// Arguments rendered as command-line words: strings bare, everything else as JSON.
    pub fn command_args(args: &[Value]) -> Vec<String> {
        args.iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Directory of named JSON artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the directory when needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create artifact directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Load `name`, materializing and persisting the default record when it is absent.
    pub fn load<T>(&self, name: &str) -> Result<T>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        let path = self.path(name);
        if !path.exists() {
            let value = T::default();
            self.save(name, &value)?;
            tracing::debug!(path = %path.display(), "Created default artifact");
            return Ok(value);
        }
        read_json(&path)
    }

    /// Load `name`, which must already exist.
    pub fn load_existing<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        anyhow::ensure!(path.exists(), "Artifact {} does not exist", path.display());
        read_json(&path)
    }

    /// Replace `name` wholesale. Readers never observe a partially written file.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize artifact {name}"))?;
        write_atomic(&self.path(name), contents.as_bytes())
    }

    /// Copy an external JSON file into the store under `name`, checking it parses first.
    pub fn import(&self, source: &Path, name: &str) -> Result<()> {
        let _: Value = read_json(source)?;
        let contents = fs::read(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        write_atomic(&self.path(name), &contents)
    }
}

/// Read and parse a JSON file, classifying parse failures as corruption.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).map_err(|source| {
        PipelineError::CorruptArtifact {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Write through a sibling temporary file and rename over the target.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid artifact path {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))
}
