//! The seven required brushes (§4.4): pure `(graph, coloring) ->
//! (coloring, changed)` transforms the `GraphColorer` drives to a
//! fixpoint.

use ahash::AHashMap;

use crate::features::coloring::domain::{
    merge_lub, merge_most_dangerous, ColorTag, ColoredObject, Coloring, Confidence, Intersection, PaintedColor,
    TraceItem,
};
use crate::features::coloring::ports::{CalleeResolver, RuleProvider};
use crate::features::graph_builder::domain::{MethodDataGraph, NodeId, Operation};

/// Everything a brush needs, gathered so `GraphColorer` can hand the same
/// bundle to every brush in the pass without a long parameter list.
pub struct BrushContext<'a> {
    pub graph: &'a MethodDataGraph,
    pub coloring: &'a mut Coloring,
    pub rule_provider: &'a dyn RuleProvider,
    pub callee_resolver: &'a dyn CalleeResolver,
    pub on_intersection: &'a mut dyn FnMut(Intersection),
}

impl BrushContext<'_> {
    fn color_of(&self, id: NodeId) -> ColoredObject {
        self.coloring.get(&id).cloned().unwrap_or_default()
    }

    fn merge_lub_into(&mut self, id: NodeId, incoming: ColoredObject) -> bool {
        let existing = self.coloring.entry(id).or_default();
        let merged = merge_lub(existing, &incoming);
        let changed = merged != *existing;
        *existing = merged;
        changed
    }

    fn merge_dangerous_into(&mut self, id: NodeId, incoming: ColoredObject) -> bool {
        let existing = self.color_of(id);
        let merged = merge_most_dangerous(&existing, &incoming, self.on_intersection);
        let changed = merged != existing;
        self.coloring.insert(id, merged);
        changed
    }
}

pub trait Brush {
    fn name(&self) -> &'static str;

    /// Returns whether this pass changed any node's coloring.
    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool;
}

fn rule_color_as_painted(color: ColorTag, trace: impl Into<String>) -> PaintedColor {
    PaintedColor::new(color, Confidence::Explicitly, TraceItem::root(trace.into()))
}

/// If a node's declared static type names a class, that class is the
/// coloring key; otherwise (primitives) we key by the type's own display
/// form, so a rule-declared `int` parameter still has somewhere to live.
fn class_key(ty: &crate::shared::VerificationType) -> String {
    ty.to_string()
}

/// Initial. Stamps each parameter node with its rule-declared color, if
/// any (§4.4). The receiver ("this", present when the method is an
/// instance method) has no entry in `param_colors` — it is keyed
/// separately by label. Merges via `merge_dangerous_into` since a
/// parameter's declared rule can disagree with a color already seeded on
/// it (e.g. from an interprocedural caller result) — that disagreement is
/// a reportable collision, not something to silently drop.
pub struct MethodParameterImplicitColorer;

impl Brush for MethodParameterImplicitColorer {
    fn name(&self) -> &'static str {
        "MethodParameterImplicitColorer"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let method = &ctx.graph.method;
        let Some(rules) = ctx.rule_provider.method_rules(&method.class, &method.name, &method.descriptor) else {
            return false;
        };
        let mut changed = false;
        let offset = ctx.graph.parameters.first().map(|p| ctx.graph.node(*p).label == "this").unwrap_or(false) as usize;
        for param_id in &ctx.graph.parameters {
            let node = ctx.graph.node(*param_id);
            if node.label == "this" {
                continue;
            }
            let Operation::Parameter(index) = node.op else { continue };
            let formal_index = index as usize - offset;
            if let Some(Some(color)) = rules.param_colors.get(formal_index) {
                let key = class_key(&node.ty);
                let painted = rule_color_as_painted(color.clone(), format!("{method} param {formal_index} rule"));
                if ctx.merge_dangerous_into(*param_id, ColoredObject::single(key, painted)) {
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Initial. For every invocation, stamps the target's declared parameter
/// and result colors directly onto the call site's DataNodes (§4.4).
/// Also merges via `merge_dangerous_into`, for the same reason as
/// `MethodParameterImplicitColorer`: an argument or result node can
/// already carry a color from elsewhere in the graph by the time this
/// runs, and a declared-rule collision against it must be reported.
pub struct InvocationsImplicitColorer;

impl Brush for InvocationsImplicitColorer {
    fn name(&self) -> &'static str {
        "InvocationsImplicitColorer"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let mut changed = false;
        let invocations: Vec<_> =
            ctx.graph.blocks.values().flat_map(|b| b.invocations.iter().cloned()).collect();
        for inv in &invocations {
            let Some(rules) = ctx.rule_provider.method_rules(&inv.target.class, &inv.target.name, &inv.target.descriptor)
            else {
                continue;
            };
            let offset = if inv.is_static { 0 } else { 1 };
            for (i, param_id) in inv.parameters.iter().enumerate() {
                if i < offset {
                    continue;
                }
                if let Some(Some(color)) = rules.param_colors.get(i - offset) {
                    let ty = ctx.graph.type_of(*param_id).clone();
                    let painted = rule_color_as_painted(color.clone(), format!("{} param {}", inv.target, i - offset));
                    if ctx.merge_dangerous_into(*param_id, ColoredObject::single(class_key(&ty), painted)) {
                        changed = true;
                    }
                }
            }
            if let (Some(result_id), Some(color)) = (inv.result, rules.result_color.clone()) {
                let ty = ctx.graph.type_of(result_id).clone();
                let painted = rule_color_as_painted(color, format!("{} result", inv.target));
                if ctx.merge_dangerous_into(result_id, ColoredObject::single(class_key(&ty), painted)) {
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Repeatable. Every node that composes more than one input (arithmetic,
/// array load, `NEW`-style construction, control-flow merges) gets the
/// LUB of its inputs' colorings, downgraded to INFERRED confidence.
pub struct CompositionNodeBrush;

impl Brush for CompositionNodeBrush {
    fn name(&self) -> &'static str {
        "CompositionNodeBrush"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let mut changed = false;
        let targets: Vec<NodeId> = ctx
            .graph
            .node_ids()
            .filter(|id| {
                let op = &ctx.graph.node(*id).op;
                op.is_composition() || matches!(op, Operation::Merge)
            })
            .collect();
        for id in targets {
            let inputs = ctx.graph.node(id).inputs.clone();
            if inputs.is_empty() {
                continue;
            }
            let mut combined = ctx.color_of(inputs[0]);
            for input in &inputs[1..] {
                combined = merge_lub(&combined, &ctx.color_of(*input));
            }
            let downgraded = downgrade(&combined);
            if ctx.merge_lub_into(id, downgraded) {
                changed = true;
            }
        }
        changed
    }
}

fn downgrade(colored: &ColoredObject) -> ColoredObject {
    let mut out = ColoredObject::default();
    for (class, painted) in &colored.by_class {
        out.by_class.insert(
            class.clone(),
            PaintedColor::new(painted.color.clone(), Confidence::Inferred, painted.trace.clone()),
        );
    }
    for (field, nested) in &colored.fields {
        out.fields.insert(field.clone(), downgrade(nested));
    }
    out
}

/// Repeatable. Identity pass-through nodes (`CHECKCAST`, widening
/// conversions) take their single input's coloring unchanged — no
/// confidence downgrade, since nothing was inferred.
pub struct CopierBrush;

impl Brush for CopierBrush {
    fn name(&self) -> &'static str {
        "CopierBrush"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let mut changed = false;
        let targets: Vec<NodeId> = ctx.graph.node_ids().filter(|id| ctx.graph.node(*id).op.is_identity()).collect();
        for id in targets {
            let Some(&input) = ctx.graph.node(id).inputs.first() else { continue };
            let incoming = ctx.color_of(input);
            if ctx.merge_lub_into(id, incoming) {
                changed = true;
            }
        }
        changed
    }
}

/// Repeatable. Propagates field-path attributes both ways across
/// `GETFIELD`/`PUTFIELD` (the result/value's color becomes a field
/// attribute of the receiver) and stamps `GETSTATIC` results from
/// declared field rules.
pub struct ParentAttributesDefinerBrush;

impl Brush for ParentAttributesDefinerBrush {
    fn name(&self) -> &'static str {
        "ParentAttributesDefinerBrush"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let mut changed = false;
        let blocks: Vec<_> = ctx.graph.blocks.values().cloned().collect();
        for block in &blocks {
            for rec in &block.get_fields {
                let result_color = ctx.color_of(rec.result);
                if result_color.is_empty() {
                    continue;
                }
                let existing = ctx.color_of(rec.receiver);
                let mut updated = existing.clone();
                for (class, painted) in &result_color.by_class {
                    updated.set_field(&[rec.field.name.clone()], class.clone(), painted.clone());
                }
                let merged = merge_lub(&existing, &updated);
                if ctx.merge_lub_into(rec.receiver, merged) {
                    changed = true;
                }
            }
            for rec in &block.put_fields {
                let value_color = ctx.color_of(rec.value);
                if value_color.is_empty() {
                    continue;
                }
                let existing = ctx.color_of(rec.receiver);
                let mut updated = existing.clone();
                for (class, painted) in &value_color.by_class {
                    updated.set_field(&[rec.field.name.clone()], class.clone(), painted.clone());
                }
                let merged = merge_lub(&existing, &updated);
                if ctx.merge_lub_into(rec.receiver, merged) {
                    changed = true;
                }
            }
            for rec in &block.get_statics {
                if let Some(color) = ctx.rule_provider.field_rules(&rec.field.class, &rec.field.name) {
                    let ty = ctx.graph.type_of(rec.result).clone();
                    let painted = rule_color_as_painted(color, format!("{}.{} static field rule", rec.field.class, rec.field.name));
                    if ctx.merge_lub_into(rec.result, ColoredObject::single(class_key(&ty), painted)) {
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

/// Repeatable. For every non-dynamic invocation, asks the painting
/// session to resolve the callee's current result colorings and merges
/// them back via `merge_most_dangerous` (§4.4, §4.5).
pub struct InvocationsBrush;

impl Brush for InvocationsBrush {
    fn name(&self) -> &'static str {
        "InvocationsBrush"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let mut changed = false;
        let invocations: Vec<_> = ctx
            .graph
            .blocks
            .values()
            .flat_map(|b| b.invocations.iter().cloned())
            .filter(|inv| !inv.is_dynamic)
            .collect();
        for inv in &invocations {
            let ins: Vec<ColoredObject> = inv.parameters.iter().map(|id| ctx.color_of(*id)).collect();
            let outs: Vec<ColoredObject> = inv.result.iter().map(|id| ctx.color_of(*id)).collect();
            let resolved: AHashMap<NodeId, ColoredObject> = ctx.callee_resolver.resolve_callee(inv, &ins, &outs);
            for (node_id, color) in resolved {
                if ctx.merge_dangerous_into(node_id, color) {
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Repeatable. `INVOKEDYNAMIC` call sites have no resolvable callee body
/// (§3 `Invocation::is_dynamic`), so this brush just joins the inputs'
/// colorings into the result via LUB, the same way `CompositionNodeBrush`
/// treats an ordinary composing opcode.
pub struct InvokeDynamicBrush;

impl Brush for InvokeDynamicBrush {
    fn name(&self) -> &'static str {
        "InvokeDynamicBrush"
    }

    fn apply(&self, ctx: &mut BrushContext<'_>) -> bool {
        let mut changed = false;
        let invocations: Vec<_> = ctx
            .graph
            .blocks
            .values()
            .flat_map(|b| b.invocations.iter().cloned())
            .filter(|inv| inv.is_dynamic)
            .collect();
        for inv in &invocations {
            let Some(result_id) = inv.result else { continue };
            if inv.parameters.is_empty() {
                continue;
            }
            let mut combined = ctx.color_of(inv.parameters[0]);
            for param in &inv.parameters[1..] {
                combined = merge_lub(&combined, &ctx.color_of(*param));
            }
            if ctx.merge_lub_into(result_id, downgrade(&combined)) {
                changed = true;
            }
        }
        changed
    }
}
