//! Where an Execute step gets its task configuration from.

use buildrun_core::{CoreError, ExecutePlan, TaskConfig};
use tracing::debug;

use crate::{ArtifactSet, Backend, BackendError};

/// Source of a task configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Configuration given inline in the plan.
    Static(TaskConfig),

    /// Configuration file inside an upstream artifact, `<artifact>/<path>`.
    File(String),

    /// File configuration overlaid with inline configuration.
    Merged { file: String, inline: TaskConfig },
}

impl ConfigSource {
    /// Pick the source described by an execute plan.
    ///
    /// Returns `None` when the plan has neither inline config nor a path.
    pub fn from_plan(plan: &ExecutePlan) -> Option<Self> {
        match (&plan.config, &plan.config_path) {
            (Some(inline), Some(path)) => Some(Self::Merged {
                file: path.clone(),
                inline: inline.clone(),
            }),
            (Some(inline), None) => Some(Self::Static(inline.clone())),
            (None, Some(path)) => Some(Self::File(path.clone())),
            (None, None) => None,
        }
    }

    /// Load the configuration.
    pub async fn fetch(
        &self,
        backend: &dyn Backend,
        artifacts: &ArtifactSet,
    ) -> Result<TaskConfig, BackendError> {
        match self {
            Self::Static(config) => Ok(config.clone()),
            Self::File(path) => read_config_file(backend, artifacts, path).await,
            Self::Merged { file, inline } => {
                let from_file = read_config_file(backend, artifacts, file).await?;
                Ok(from_file.merge(inline.clone()))
            }
        }
    }
}

async fn read_config_file(
    backend: &dyn Backend,
    artifacts: &ArtifactSet,
    config_path: &str,
) -> Result<TaskConfig, BackendError> {
    let (artifact_name, path) = config_path
        .split_once('/')
        .filter(|(name, path)| !name.is_empty() && !path.is_empty())
        .ok_or_else(|| {
            CoreError::InvalidTaskConfig(format!(
                "config path '{}' must be <artifact>/<path>",
                config_path
            ))
        })?;

    let artifact = artifacts
        .get(artifact_name)
        .ok_or_else(|| BackendError::ArtifactNotFound(artifact_name.to_string()))?;

    debug!(artifact = %artifact_name, path = %path, "reading task config");
    let bytes = backend.read_file(artifact, path).await?;
    Ok(TaskConfig::from_yaml(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use crate::Artifact;

    fn repo() -> ArtifactSet {
        [Artifact::new("repo").with_handle("vol-repo")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_from_plan_picks_source() {
        assert_eq!(ConfigSource::from_plan(&ExecutePlan::default()), None);
        assert!(matches!(
            ConfigSource::from_plan(&ExecutePlan::from_file("repo/task.yml")),
            Some(ConfigSource::File(_))
        ));
        assert!(matches!(
            ConfigSource::from_plan(&ExecutePlan::inline(TaskConfig::new("./x"))),
            Some(ConfigSource::Static(_))
        ));

        let both = ExecutePlan {
            config: Some(TaskConfig::new("./x")),
            config_path: Some("repo/task.yml".into()),
            privileged: false,
        };
        assert!(matches!(
            ConfigSource::from_plan(&both),
            Some(ConfigSource::Merged { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_source_reads_through_artifact() {
        let backend = FakeBackend::new();
        backend.add_file("vol-repo", "ci/task.yml", "platform: linux\nrun:\n  path: ./ci/test.sh\n");

        let source = ConfigSource::File("repo/ci/task.yml".into());
        let config = source.fetch(&backend, &repo()).await.unwrap();
        assert_eq!(config.run.path, "./ci/test.sh");
    }

    #[tokio::test]
    async fn test_merged_source_prefers_inline() {
        let backend = FakeBackend::new();
        backend.add_file(
            "vol-repo",
            "task.yml",
            "platform: linux\nparams:\n  A: file\n  B: file\nrun:\n  path: ./from-file\n",
        );

        let source = ConfigSource::Merged {
            file: "repo/task.yml".into(),
            inline: TaskConfig::default().with_param("B", "inline"),
        };
        let config = source.fetch(&backend, &repo()).await.unwrap();
        assert_eq!(config.run.path, "./from-file");
        assert_eq!(config.params["A"], "file");
        assert_eq!(config.params["B"], "inline");
    }

    #[tokio::test]
    async fn test_file_source_missing_artifact() {
        let backend = FakeBackend::new();
        let source = ConfigSource::File("other/task.yml".into());
        let err = source.fetch(&backend, &repo()).await.unwrap_err();
        assert!(matches!(err, BackendError::ArtifactNotFound(name) if name == "other"));
    }

    #[tokio::test]
    async fn test_file_source_bad_path() {
        let backend = FakeBackend::new();
        let source = ConfigSource::File("task.yml".into());
        let err = source.fetch(&backend, &repo()).await.unwrap_err();
        assert!(matches!(err, BackendError::Config(CoreError::InvalidTaskConfig(_))));
    }
}
