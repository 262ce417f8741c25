//! Plan compiler: turns a plan tree into a step tree.

use std::sync::Arc;

use tracing::{info_span, Span};

use buildrun_core::{BuildId, GetPlan, Plan, PlanStep, PutPlan, SessionKey, StepRole};
use buildrun_exec::{
    AggregateStep, Backend, BuildDelegate, ComposeStep, ConditionalStep, ConfigSource,
    ExecuteStep, GetStep, IdentityStep, PutStep, ResourceConfig, Step,
};

/// Compiles the plans of one build.
///
/// Compilation is total: a node without a step, or an Execute node without
/// any task config, becomes an [`IdentityStep`].
pub struct Compiler {
    build_id: BuildId,
    session_prefix: String,
    backend: Arc<dyn Backend>,
    delegate: Arc<dyn BuildDelegate>,
}

impl Compiler {
    pub fn new(
        build_id: BuildId,
        session_prefix: impl Into<String>,
        backend: Arc<dyn Backend>,
        delegate: Arc<dyn BuildDelegate>,
    ) -> Self {
        Self {
            build_id,
            session_prefix: session_prefix.into(),
            backend,
            delegate,
        }
    }

    /// Session key of the step playing `role` in this build.
    pub fn session(&self, role: &StepRole) -> SessionKey {
        SessionKey::derive(&self.session_prefix, &self.build_id, role)
    }

    /// Compile `plan`, giving each step a span under `parent`.
    pub fn compile(&self, plan: &Plan, parent: &Span) -> Box<dyn Step> {
        let Some(step) = &plan.step else {
            return Box::new(IdentityStep::new());
        };

        match step {
            PlanStep::Aggregate(aggregate) => {
                let span = info_span!(parent: parent, "aggregate", plan_id = %plan.id);
                let children = aggregate
                    .0
                    .iter()
                    .map(|(name, child)| {
                        let branch = info_span!(parent: &span, "branch", name = %name);
                        (name.clone(), self.compile(child, &branch))
                    })
                    .collect();
                Box::new(AggregateStep::new(children, span))
            }

            PlanStep::Compose(compose) => Box::new(ComposeStep::new(
                self.compile(&compose.a, parent),
                self.compile(&compose.b, parent),
            )),

            PlanStep::Conditional(conditional) => {
                let span = info_span!(
                    parent: parent,
                    "conditional",
                    plan_id = %plan.id,
                    on = ?conditional.conditions,
                );
                let inner = self.compile(&conditional.plan, &span);
                Box::new(ConditionalStep::new(
                    conditional.conditions.clone(),
                    inner,
                    span,
                ))
            }

            PlanStep::Execute(execute) => {
                let Some(config_source) = ConfigSource::from_plan(execute) else {
                    return Box::new(IdentityStep::new());
                };
                let span = info_span!(parent: parent, "execute", plan_id = %plan.id);
                Box::new(ExecuteStep::new(
                    self.session(&StepRole::Execute),
                    self.delegate.execution_delegate(),
                    execute.privileged,
                    config_source,
                    self.backend.clone(),
                    span,
                ))
            }

            PlanStep::Get(get) => {
                let span = info_span!(parent: parent, "get", plan_id = %plan.id, name = %get.name);
                Box::new(GetStep::new(
                    self.session(&StepRole::Input(get.name.clone())),
                    self.delegate.input_delegate(get),
                    get.name.clone(),
                    input_resource(get),
                    get.params.clone(),
                    get.version.clone(),
                    self.backend.clone(),
                    span,
                ))
            }

            PlanStep::Put(put) => {
                let span =
                    info_span!(parent: parent, "put", plan_id = %plan.id, name = %put.resource);
                Box::new(PutStep::new(
                    self.session(&StepRole::Output(put.resource.clone())),
                    self.delegate.output_delegate(put),
                    output_resource(put),
                    put.params.clone(),
                    self.backend.clone(),
                    span,
                ))
            }
        }
    }
}

fn input_resource(get: &GetPlan) -> ResourceConfig {
    ResourceConfig {
        name: get.resource.clone(),
        resource_type: get.resource_type.clone(),
        source: get.source.clone(),
    }
}

fn output_resource(put: &PutPlan) -> ResourceConfig {
    ResourceConfig {
        name: put.resource.clone(),
        resource_type: put.resource_type.clone(),
        source: put.source.clone(),
    }
}

/// Kind names of a step tree, depth first.
#[cfg(test)]
pub(crate) fn shape(step: &dyn Step) -> String {
    let children = step.children();
    if children.is_empty() {
        return step.kind().to_string();
    }
    let inner: Vec<String> = children.into_iter().map(shape).collect();
    format!("{}({})", step.kind(), inner.join(","))
}
