//! Collaborator traits the coloring feature consumes (§6, §S3): rule data
//! and intersection reporting come from outside the core; interprocedural
//! callee resolution comes from the painting session (L3), but the
//! coloring feature only needs its trait shape, not its implementation.

use ahash::AHashMap;

use super::domain::{ColorTag, ColoredObject, TraceItem};
use crate::features::graph_builder::domain::{Invocation, NodeId};

/// What a rule/data provider declares about one method's parameters and
/// return value (§4.3 "Rule/data provider collaborator").
#[derive(Debug, Clone, Default)]
pub struct MethodRules {
    pub param_colors: Vec<Option<ColorTag>>,
    pub result_color: Option<ColorTag>,
}

/// The external rule/data provider (§4.3, §6). Consulted only by the
/// initial brushes (`MethodParameterImplicitColorer`,
/// `InvocationsImplicitColorer`).
pub trait RuleProvider {
    fn method_rules(&self, class: &str, name: &str, descriptor: &str) -> Option<MethodRules>;

    fn field_rules(&self, class: &str, name: &str) -> Option<ColorTag>;
}

/// Reports a confirmed source-to-sink flow (§4.3, §6). Documented as
/// idempotent-call-tolerant: the same intersection may be reported more
/// than once across fixpoint iterations or worklist re-executions, and a
/// conforming sink must tolerate that rather than double-count.
pub trait IntersectionSink {
    fn on_source_sink_intersection(&self, source_trace: &TraceItem, sink_trace: &TraceItem);
}

/// The painting session's interprocedural query, as seen from inside a
/// single method's coloring fixpoint (§4.5 `resolve_callee`). Implemented
/// by `painting_session::PaintingSession`; `InvocationsBrush` depends only
/// on this trait, not on the painting session's concrete types, keeping L2
/// ignorant of L3's worklist/concurrency machinery.
pub trait CalleeResolver {
    fn resolve_callee(
        &self,
        invocation: &Invocation,
        ins: &[ColoredObject],
        outs: &[ColoredObject],
    ) -> AHashMap<NodeId, ColoredObject>;
}
