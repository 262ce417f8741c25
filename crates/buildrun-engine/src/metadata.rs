//! Durable build state.

use serde::{Deserialize, Serialize};

use buildrun_core::Plan;

/// What a build persists: its plan, nothing else.
///
/// Restoring re-drives the whole plan. Steps that already ran are cheap the
/// second time because their session keys, and so the backend's caches, are
/// the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub plan: Plan,
}

impl BuildMetadata {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildrun_core::{ExecutePlan, GetPlan, TaskConfig};

    #[test]
    fn test_wire_format_has_single_plan_field() {
        let metadata = BuildMetadata::new(Plan::noop().with_id("root"));
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({ "plan": { "id": "root" } }));
    }

    #[test]
    fn test_roundtrip() {
        let metadata = BuildMetadata::new(Plan::compose(
            Plan::get(GetPlan::new("repo", "git")),
            Plan::execute(ExecutePlan::inline(TaskConfig::new("./test.sh"))),
        ));
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: BuildMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }
}
