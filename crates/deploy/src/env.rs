//! Snapshot of the process environment with typed accessors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context as _;
use url::Url;

use crate::error::PipelineError;

/// Load a dotenv file into the process environment.
///
/// With no `path`, `.env` is searched in the working directory and its parents; a missing
/// file is not an error. Variables already set in the process keep their values. Returns
/// the file that was loaded.
pub fn load_dotenv(path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(e).context("Failed to load .env"),
        },
    }
}

/// Environment variables captured once at startup.
///
/// Steps read configuration through this snapshot rather than `std::env`, so tests can
/// build an isolated environment with [`Env::from_pairs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read a variable that must be set. Empty values count as unset.
    pub fn string(&self, name: &str) -> Result<String, PipelineError> {
        self.optional(name)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::MissingEnv {
                name: name.to_string(),
            })
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Read and parse a numeric variable.
    pub fn number<T: FromStr>(&self, name: &str) -> Result<T, PipelineError> {
        let raw = self.string(name)?;
        raw.trim().parse().map_err(|_| PipelineError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        })
    }

    /// Read a variable that must hold an absolute URL.
    pub fn url(&self, name: &str) -> Result<Url, PipelineError> {
        let raw = self.string(name)?;
        Url::parse(raw.trim()).map_err(|_| PipelineError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::from_pairs([
            ("L1_CHAIN_ID", "11155111"),
            ("L1_LOCAL_RPC_PORT", " 8545 "),
            ("L1_REMOTE_RPC_URL", "https://rpc.example.org/v1"),
            ("BAD_PORT", "eighty"),
            ("EMPTY", ""),
        ])
    }

    #[test]
    fn test_number_parses_trimmed_values() {
        assert_eq!(env().number::<u64>("L1_CHAIN_ID").unwrap(), 11155111);
        assert_eq!(env().number::<u16>("L1_LOCAL_RPC_PORT").unwrap(), 8545);
    }

    #[test]
    fn test_missing_and_empty_are_missing() {
        assert!(matches!(
            env().string("NOT_SET"),
            Err(PipelineError::MissingEnv { name }) if name == "NOT_SET"
        ));
        assert!(matches!(
            env().string("EMPTY"),
            Err(PipelineError::MissingEnv { .. })
        ));
    }

    #[test]
    fn test_invalid_number_is_reported_with_value() {
        match env().number::<u16>("BAD_PORT") {
            Err(PipelineError::InvalidEnv { name, value }) => {
                assert_eq!(name, "BAD_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_dotenv_values_reach_the_snapshot() {
        let temp_dir = tempdir::TempDir::new("automaton-test").unwrap();
        let path = temp_dir.path().join(".env");
        std::fs::write(
            &path,
            "AUTOMATON_DOTENV_L2_REMOTE_RPC_URL=https://op.example.org/from-dotenv\n\
             CARGO_PKG_NAME=from-dotenv\n",
        )
        .unwrap();

        let loaded = load_dotenv(Some(&path)).unwrap();
        assert_eq!(loaded.as_deref(), Some(path.as_path()));

        let env = Env::from_process();
        assert_eq!(
            env.url("AUTOMATON_DOTENV_L2_REMOTE_RPC_URL").unwrap().path(),
            "/from-dotenv"
        );
        // Already-set process variables win over the file.
        assert_eq!(env.optional("CARGO_PKG_NAME"), Some(env!("CARGO_PKG_NAME")));
    }

    #[test]
    fn test_missing_explicit_dotenv_is_an_error() {
        let temp_dir = tempdir::TempDir::new("automaton-test").unwrap();
        assert!(load_dotenv(Some(&temp_dir.path().join("absent.env"))).is_err());
    }

    #[test]
    fn test_url_accessor() {
        let url = env().url("L1_REMOTE_RPC_URL").unwrap();
        assert_eq!(url.host_str(), Some("rpc.example.org"));
        assert!(env().url("BAD_PORT").is_err());
    }
}
