//! The painting session drives the L1 graph builder and L2 colorer but
//! introduces no collaborator traits of its own: it consumes
//! `graph_builder::ports::ClassResolver` to build method graphs and
//! `coloring::ports::{RuleProvider, IntersectionSink}` to color and report
//! them. Re-exported here so callers can reach all three through one
//! path.

pub use crate::features::coloring::ports::{IntersectionSink, RuleProvider};
pub use crate::features::graph_builder::ports::ClassResolver;
