pub mod color;
pub mod colored_object;

pub use color::{ColorTag, Confidence, PaintedColor, TraceItem};
pub use colored_object::{demultiplex, merge_lub, merge_most_dangerous, ColoredObject, Intersection};

use ahash::AHashMap;

use crate::features::graph_builder::domain::NodeId;

/// A whole graph's worth of per-node colorings, as threaded through the
/// `GraphColorer` fixpoint (§4.4).
pub type Coloring = AHashMap<NodeId, ColoredObject>;
