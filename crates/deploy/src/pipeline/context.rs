use alloy_core::primitives::Address;
use anyhow::Result;

use super::Slot;
use crate::artifacts::{ArtifactStore, DeploymentArtifacts};
use crate::config::ConfigDocument;
use crate::env::Env;
use crate::error::PipelineError;
use crate::fork::ForkSet;
use crate::network::NetworkMode;
use crate::settings::PipelineSettings;

/// What the pipeline knows about one deployment target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TargetState {
    pub gov_executor: Option<Address>,
    pub deployment: Option<DeploymentArtifacts>,
}

/// State shared by every step of a run.
#[derive(Debug)]
pub struct Context {
    pub config: ConfigDocument,
    pub env: Env,
    pub settings: PipelineSettings,
    pub store: ArtifactStore,
    pub forks: ForkSet,
    pub forked: TargetState,
    pub live: TargetState,
}

impl Context {
    /// Build a context, opening the artifact directory from the settings layout.
    pub fn new(config: ConfigDocument, env: Env, settings: PipelineSettings) -> Result<Self> {
        let store = ArtifactStore::open(&settings.layout.artifacts_dir)?;
        Ok(Self {
            config,
            env,
            settings,
            store,
            forks: ForkSet::default(),
            forked: TargetState::default(),
            live: TargetState::default(),
        })
    }

    pub fn target(&self, mode: NetworkMode) -> &TargetState {
        match mode {
            NetworkMode::Forked => &self.forked,
            NetworkMode::Live => &self.live,
        }
    }

    pub fn target_mut(&mut self, mode: NetworkMode) -> &mut TargetState {
        match mode {
            NetworkMode::Forked => &mut self.forked,
            NetworkMode::Live => &mut self.live,
        }
    }

    /// Executor address recorded for `mode`, as needed by `step`.
    pub fn gov_executor(&self, mode: NetworkMode, step: &str) -> Result<Address, PipelineError> {
        self.target(mode)
            .gov_executor
            .ok_or_else(|| PipelineError::StepContract {
                step: step.to_string(),
                slot: gov_slot(mode),
            })
    }

    /// Deployment recorded for `mode`, as needed by `step`.
    pub fn deployment(
        &self,
        mode: NetworkMode,
        step: &str,
    ) -> Result<&DeploymentArtifacts, PipelineError> {
        self.target(mode)
            .deployment
            .as_ref()
            .ok_or_else(|| PipelineError::StepContract {
                step: step.to_string(),
                slot: deployment_slot(mode),
            })
    }
}

fn gov_slot(mode: NetworkMode) -> Slot {
    match mode {
        NetworkMode::Forked => Slot::ForkGovExecutor,
        NetworkMode::Live => Slot::LiveGovExecutor,
    }
}

fn deployment_slot(mode: NetworkMode) -> Slot {
    match mode {
        NetworkMode::Forked => Slot::ForkDeployment,
        NetworkMode::Live => Slot::LiveDeployment,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::sample_document;
    use crate::test_utils::full_env;
    use crate::settings::Layout;
    use tempdir::TempDir;

    /// Context over a temporary artifact directory.
    pub(crate) fn test_context(temp_dir: &TempDir) -> Context {
        let settings = PipelineSettings {
            layout: Layout {
                artifacts_dir: temp_dir.path().join("artifacts"),
                ..Layout::default()
            },
            ..PipelineSettings::default()
        };
        Context::new(sample_document(), full_env(), settings).unwrap()
    }

    #[test]
    fn test_new_creates_artifact_dir() {
        let temp_dir = TempDir::new("context").unwrap();
        let ctx = test_context(&temp_dir);
        assert!(ctx.store.root().is_dir());
        assert!(ctx.forks.is_empty());
    }

    #[test]
    fn test_missing_values_name_the_slot() {
        let temp_dir = TempDir::new("context").unwrap();
        let mut ctx = test_context(&temp_dir);

        let error = ctx.gov_executor(NetworkMode::Live, "Run Deploy Script").unwrap_err();
        assert!(matches!(
            error,
            PipelineError::StepContract { slot: Slot::LiveGovExecutor, .. }
        ));

        ctx.forked.gov_executor = Some(Address::repeat_byte(0xe1));
        assert_eq!(
            ctx.gov_executor(NetworkMode::Forked, "x").unwrap(),
            Address::repeat_byte(0xe1)
        );
        assert!(ctx.deployment(NetworkMode::Forked, "x").is_err());
        assert!(ctx.target(NetworkMode::Live).deployment.is_none());
    }
}
