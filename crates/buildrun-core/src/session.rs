//! Session keys scope container and volume caches to a logical step.
//!
//! Keys are derived, never generated: running the same plan for the same
//! build yields the same keys, so a resumed build lands on the resources its
//! previous attempt already acquired.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BuildId;

/// Role a step plays in its build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepRole {
    /// The build's task.
    Execute,
    /// A fetched resource, by artifact name.
    Input(String),
    /// A published resource, by resource name.
    Output(String),
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::Input(name) => write!(f, "input-{}", name),
            Self::Output(name) => write!(f, "output-{}", name),
        }
    }
}

/// Cache-scoping key for the resources of one step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive the key for `role` in build `build_id`.
    ///
    /// `prefix` namespaces the keys of one engine deployment; it is `build`
    /// unless configured otherwise.
    pub fn derive(prefix: &str, build_id: &BuildId, role: &StepRole) -> Self {
        Self(format!("{}-{}-{}", prefix, build_id, role))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
