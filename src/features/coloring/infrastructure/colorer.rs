//! `GraphColorer` (§4.4): seeds a method's parameter/result colorings,
//! runs the initial brushes once, then the repeatable brushes to a
//! fixpoint.

use tracing::warn;

use super::brush::{
    Brush, BrushContext, CompositionNodeBrush, CopierBrush, InvocationsBrush, InvocationsImplicitColorer,
    InvokeDynamicBrush, MethodParameterImplicitColorer, ParentAttributesDefinerBrush,
};
use crate::features::coloring::domain::{ColorTag, ColoredObject, Coloring, Confidence, Intersection, PaintedColor, TraceItem};
use crate::features::coloring::ports::{CalleeResolver, RuleProvider};
use crate::features::graph_builder::domain::MethodDataGraph;

/// Turns an optional pre-coloring (a caller-supplied seed for a
/// parameter or result slot) into the `ColoredObject` the fixpoint starts
/// from, keyed by the node's own static type.
fn seed(ty: &crate::shared::VerificationType, pre: &Option<ColorTag>) -> ColoredObject {
    match pre {
        None => ColoredObject::default(),
        Some(color) => ColoredObject::single(
            ty.to_string(),
            PaintedColor::new(color.clone(), Confidence::Explicitly, TraceItem::root("seed")),
        ),
    }
}

/// Runs the fixed five-brush fixpoint over one method's graph and returns
/// the resulting parameter and result colorings, in the same order as
/// `graph.parameters` / `graph.results` (§4.4 step 5).
pub fn color(
    graph: &MethodDataGraph,
    ins: &[Option<ColorTag>],
    outs: &[Option<ColorTag>],
    rule_provider: &dyn RuleProvider,
    callee_resolver: &dyn CalleeResolver,
    on_intersection: &mut dyn FnMut(Intersection),
    iteration_cap: u32,
) -> (Vec<ColoredObject>, Vec<ColoredObject>) {
    let mut coloring: Coloring = Coloring::default();

    let no_seed: Option<ColorTag> = None;
    for (param_id, pre) in graph.parameters.iter().zip(ins.iter().chain(std::iter::repeat(&no_seed))) {
        let ty = graph.type_of(*param_id).clone();
        let seeded = seed(&ty, pre);
        if !seeded.is_empty() {
            coloring.insert(*param_id, seeded);
        }
    }
    for (result_id, pre) in graph.results.iter().zip(outs.iter().chain(std::iter::repeat(&no_seed))) {
        let ty = graph.type_of(*result_id).clone();
        let seeded = seed(&ty, pre);
        if !seeded.is_empty() {
            coloring.insert(*result_id, seeded);
        }
    }

    let initial: [&dyn Brush; 2] = [&MethodParameterImplicitColorer, &InvocationsImplicitColorer];
    let repeatable: [&dyn Brush; 5] = [
        &CompositionNodeBrush,
        &CopierBrush,
        &ParentAttributesDefinerBrush,
        &InvocationsBrush,
        &InvokeDynamicBrush,
    ];

    {
        let mut ctx = BrushContext { graph, coloring: &mut coloring, rule_provider, callee_resolver, on_intersection };
        for brush in &initial {
            brush.apply(&mut ctx);
        }

        let mut iterations = 0u32;
        loop {
            let mut changed = false;
            for brush in &repeatable {
                if brush.apply(&mut ctx) {
                    changed = true;
                }
            }
            iterations += 1;
            if !changed {
                break;
            }
            if iterations >= iteration_cap {
                warn!(method = %graph.method, cap = iteration_cap, "brush fixpoint did not converge within the iteration cap");
                break;
            }
        }
    }

    let param_colors = graph.parameters.iter().map(|id| coloring.get(id).cloned().unwrap_or_default()).collect();
    let result_colors = graph.results.iter().map(|id| coloring.get(id).cloned().unwrap_or_default()).collect();
    (param_colors, result_colors)
}
