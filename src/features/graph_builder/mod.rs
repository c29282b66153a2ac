//! L1 — colorless graph builder (§4.1/§4.2): the symbolic bytecode
//! interpreter and inter-block stitching that together produce a method's
//! `MethodDataGraph` before any coloring brush runs.

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{BlockDataGraph, MethodDataGraph};
pub use infrastructure::build_method_data_graph;
