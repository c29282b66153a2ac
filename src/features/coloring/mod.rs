//! L2 — color model and brushes (§4.3/§4.4): `ColoredObject`, the two
//! merge operations, the seven brushes, and the `GraphColorer` fixpoint
//! that drives them.

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{ColorTag, ColoredObject, Coloring, Confidence, Intersection, PaintedColor, TraceItem};
pub use infrastructure::color;
