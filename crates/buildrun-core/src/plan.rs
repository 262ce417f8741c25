//! Build plans: the declarative tree handed to the engine.
//!
//! A plan node carries an identity and at most one step. The step is a true
//! sum type, so a node can never describe two kinds of work at once; a node
//! without a step compiles to a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{OutcomeKind, PlanId, TaskConfig};

/// Resource source configuration, passed through to the backend untouched.
pub type Source = serde_json::Map<String, serde_json::Value>;

/// Step parameters, passed through to the backend untouched.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A resource version, e.g. `{"ref": "abc123"}`.
pub type Version = BTreeMap<String, String>;

/// A node in a build plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identity of this node.
    pub id: PlanId,

    /// The work this node describes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<PlanStep>,
}

impl Plan {
    /// Create a plan node with a freshly generated id.
    pub fn new(step: PlanStep) -> Self {
        Self {
            id: PlanId::generate(),
            step: Some(step),
        }
    }

    /// Create a node that describes no work.
    pub fn noop() -> Self {
        Self {
            id: PlanId::generate(),
            step: None,
        }
    }

    /// Builder method to set a specific ID.
    pub fn with_id(mut self, id: impl Into<PlanId>) -> Self {
        self.id = id.into();
        self
    }

    /// Run every named child concurrently.
    pub fn aggregate<I, K>(children: I) -> Self
    where
        I: IntoIterator<Item = (K, Plan)>,
        K: Into<String>,
    {
        Self::new(PlanStep::Aggregate(AggregatePlan(
            children.into_iter().map(|(k, p)| (k.into(), p)).collect(),
        )))
    }

    /// Run `a`, then `b` with `a`'s artifacts.
    pub fn compose(a: Plan, b: Plan) -> Self {
        Self::new(PlanStep::Compose(ComposePlan {
            a: Box::new(a),
            b: Box::new(b),
        }))
    }

    /// Run `plan` only if the preceding outcome is one of `conditions`.
    pub fn conditional(conditions: Vec<OutcomeKind>, plan: Plan) -> Self {
        Self::new(PlanStep::Conditional(ConditionalPlan {
            conditions,
            plan: Box::new(plan),
        }))
    }

    /// Run a task.
    pub fn execute(execute: ExecutePlan) -> Self {
        Self::new(PlanStep::Execute(execute))
    }

    /// Fetch a resource version.
    pub fn get(get: GetPlan) -> Self {
        Self::new(PlanStep::Get(get))
    }

    /// Publish to a resource.
    pub fn put(put: PutPlan) -> Self {
        Self::new(PlanStep::Put(put))
    }
}

impl From<String> for PlanId {
    fn from(s: String) -> Self {
        PlanId::new(s)
    }
}

/// The kind of work a plan node describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    Aggregate(AggregatePlan),
    Compose(ComposePlan),
    Conditional(ConditionalPlan),
    Execute(ExecutePlan),
    Get(GetPlan),
    Put(PutPlan),
}

/// Named children run concurrently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatePlan(pub BTreeMap<String, Plan>);

/// Two plans run in sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposePlan {
    pub a: Box<Plan>,
    pub b: Box<Plan>,
}

/// A plan gated on the preceding outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalPlan {
    /// Outcome classes that allow the inner plan to run.
    pub conditions: Vec<OutcomeKind>,
    pub plan: Box<Plan>,
}

/// Run a task in a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutePlan {
    #[serde(default)]
    pub privileged: bool,

    /// Inline task configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TaskConfig>,

    /// Path to a task configuration file, `<artifact>/<path>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

impl ExecutePlan {
    /// Execute plan with only an inline config.
    pub fn inline(config: TaskConfig) -> Self {
        Self {
            config: Some(config),
            ..Default::default()
        }
    }

    /// Execute plan with only a config file.
    pub fn from_file(path: impl Into<String>) -> Self {
        Self {
            config_path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Fetch a version of a resource into an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPlan {
    /// Artifact name the fetched bits are known by.
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub params: Params,
    /// Pinned version; latest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl GetPlan {
    /// Get a resource under its own name.
    pub fn new(resource: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let resource = resource.into();
        Self {
            name: resource.clone(),
            resource,
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Builder method to pin a version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }
}

/// Publish params to a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PutPlan {
    pub resource: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub params: Params,
}

impl PutPlan {
    pub fn new(resource: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }
}
