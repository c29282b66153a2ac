//! The single public entry point (§6 "Analysis entry point"): wires the
//! colorless graph builder (L1), the brush fixpoint (L2), and the
//! interprocedural worklist (L3) together behind one function call.

use tracing::{error, warn};

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::features::coloring::domain::{ColorTag, ColoredObject};
use crate::features::coloring::ports::{IntersectionSink, RuleProvider};
use crate::features::graph_builder::infrastructure::build_method_data_graph;
use crate::features::graph_builder::ports::{ClassResolver, MethodRef};
use crate::features::painting_session::PaintingSession;

/// Analyzes `method`, seeding its parameter/result colorings from `ins`
/// and `outs` (§6: `analyze(method, ins?, outs?) -> (ins', outs')?`).
/// Returns `None` when the method body is empty (abstract, native, or
/// zero-instruction) — not an error (§7 `EmptyMethod`). No other error
/// escapes this function; bytecode and resolution failures are logged
/// and degrade to an empty result for the offending method, per §7.
pub fn analyze(
    resolver: &dyn ClassResolver,
    rule_provider: &dyn RuleProvider,
    intersection_sink: &dyn IntersectionSink,
    config: &EngineConfig,
    method: &MethodRef,
    ins: Vec<Option<ColorTag>>,
    outs: Vec<Option<ColorTag>>,
) -> Result<Option<(Vec<ColoredObject>, Vec<ColoredObject>)>> {
    match build_method_data_graph(resolver, method) {
        Ok(None) => return Ok(None),
        Ok(Some(_)) => {}
        Err(e) if e.is_elidable() => {
            warn!(method = %method, error = %e, "entry method's call graph could not be resolved");
            return Ok(None);
        }
        Err(e) => {
            error!(method = %method, error = %e, "entry method rejected");
            return Ok(None);
        }
    }

    let session = PaintingSession::new(resolver, rule_provider, intersection_sink, config);
    let result = session.analyze(method, ins, outs)?;
    Ok(Some((result.ins, result.outs)))
}
