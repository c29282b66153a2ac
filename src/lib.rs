//! Bytecode taint-painting engine.
//!
//! Organized feature-first (hexagonal: `domain` / `infrastructure` / `ports`
//! per feature):
//!
//! - `features::graph_builder` (L1) — symbolic bytecode interpreter and
//!   inter-block stitching; produces the colorless `MethodDataGraph`.
//! - `features::coloring` (L2) — the color model and the brushes that
//!   reach a per-method fixpoint.
//! - `features::painting_session` (L3) — the interprocedural worklist
//!   that ties per-method colorings together across call edges.
//!
//! `api::analyze` is the only entry point most callers need; everything
//! else is reachable for callers that want to drive the layers directly
//! (e.g. to inspect a colorless graph without painting it).

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod api;
pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use api::analyze;
pub use errors::{EngineError, Result};
