//! Artifacts flowing between steps.

use std::collections::BTreeMap;

use buildrun_core::Version;
use serde::{Deserialize, Serialize};

/// A named set of bits produced by a step: a fetched resource, a task
/// output, or a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,

    /// Backend handle of the volume holding the bits, if any.
    pub handle: Option<String>,

    /// Resource version the bits correspond to, if any.
    pub version: Option<Version>,
}

impl Artifact {
    /// Create an artifact with no volume and no version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
            version: None,
        }
    }

    /// Builder method to set the volume handle.
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Builder method to set the version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }
}

/// Artifacts visible to a step, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(BTreeMap<String, Artifact>);

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, replacing any artifact of the same name.
    pub fn insert(&mut self, artifact: Artifact) {
        self.0.insert(artifact.name.clone(), artifact);
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Add every artifact of `other`; `other` wins on name clashes.
    pub fn merge(&mut self, other: &ArtifactSet) {
        for artifact in other.0.values() {
            self.insert(artifact.clone());
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Artifact> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        let mut set = Self::new();
        for artifact in iter {
            set.insert(artifact);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_by_name() {
        let mut left: ArtifactSet = [Artifact::new("repo").with_handle("vol-1")]
            .into_iter()
            .collect();
        let right: ArtifactSet = [
            Artifact::new("repo").with_handle("vol-2"),
            Artifact::new("image"),
        ]
        .into_iter()
        .collect();

        left.merge(&right);
        assert_eq!(left.len(), 2);
        assert_eq!(left.get("repo").unwrap().handle.as_deref(), Some("vol-2"));
        assert_eq!(left.names().collect::<Vec<_>>(), vec!["image", "repo"]);
    }
}
