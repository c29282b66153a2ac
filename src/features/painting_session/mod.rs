//! L3 — the interprocedural worklist (§4.5, §5): `PaintingTask`, `TaskKey`,
//! and the `PaintingSession` that drives them to a fixpoint across method
//! boundaries, discovering callees as it colors.

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{PaintingResult, PaintingTask, TaskKey, TaskState};
pub use infrastructure::PaintingSession;
