//! L1 algorithms: the per-block symbolic interpreter (§4.1) and the
//! inter-block stitching fixpoint (§4.2) that together turn a method's
//! bytecode into a `MethodDataGraph`.

mod descriptor;
mod interpreter;
mod opcodes;
mod stitcher;

pub use descriptor::{parse_descriptor, parse_field_descriptor};
pub use interpreter::interpret_block;
pub use stitcher::build_method_data_graph;
