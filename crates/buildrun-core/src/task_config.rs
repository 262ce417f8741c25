//! Task configuration: what an Execute step runs and with what.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Configuration of a task run by an Execute step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Platform the task must run on (e.g. "linux").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Root filesystem image for the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Environment parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    /// Artifacts the task expects to find in its working directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<TaskInputConfig>,

    /// Directories the task produces as artifacts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<TaskOutputConfig>,

    #[serde(default)]
    pub run: TaskRunConfig,
}

/// The command a task runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRunConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// An input artifact of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInputConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// An output artifact of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutputConfig {
    pub name: String,
}

impl TaskConfig {
    /// Create a config that runs `path` on linux.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            platform: Some("linux".to_string()),
            run: TaskRunConfig {
                path: path.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse a task configuration file.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Builder method to add an env param.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Builder method to declare an input.
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(TaskInputConfig {
            name: name.into(),
            path: None,
        });
        self
    }

    /// Builder method to declare an output.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(TaskOutputConfig { name: name.into() });
        self
    }

    /// Overlay `other` onto this config.
    ///
    /// Fields set in `other` win. Params are merged key by key; inputs,
    /// outputs and the run command are replaced when `other` sets them.
    pub fn merge(mut self, other: TaskConfig) -> Self {
        if other.platform.is_some() {
            self.platform = other.platform;
        }
        if other.image.is_some() {
            self.image = other.image;
        }
        self.params.extend(other.params);
        if !other.inputs.is_empty() {
            self.inputs = other.inputs;
        }
        if !other.outputs.is_empty() {
            self.outputs = other.outputs;
        }
        if !other.run.path.is_empty() {
            self.run = other.run;
        }
        self
    }

    /// Check that the config can be run.
    ///
    /// Only the command is required; a task without a platform runs on
    /// whatever platform the backend picks.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.run.path.is_empty() {
            return Err(CoreError::InvalidTaskConfig("missing run.path".to_string()));
        }
        if self.platform.as_deref() == Some("") {
            return Err(CoreError::InvalidTaskConfig("empty platform".to_string()));
        }
        Ok(())
    }
}
