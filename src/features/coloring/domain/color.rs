//! The color model (§3, §4.3): a taint tag with confidence and a
//! provenance trail.

use std::sync::Arc;

/// Whether a color was declared by a rule or inferred by a brush.
/// `Explicitly` always outranks `Inferred` when merging (§4.3 merge_lub).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    Inferred,
    Explicitly,
}

/// The color taxonomy (§3: "includes at least SourceData and SinkTarget;
/// the taxonomy is extensible"). `Custom` carries a rule-declared tag this
/// core doesn't interpret specially, but still merges and reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColorTag {
    SourceData,
    SinkTarget,
    Custom(String),
}

impl ColorTag {
    pub fn is_source_like(&self) -> bool {
        matches!(self, ColorTag::SourceData)
    }

    pub fn is_sink_like(&self) -> bool {
        matches!(self, ColorTag::SinkTarget)
    }
}

/// One link in the provenance chain from a source or to a sink (§3, §S4
/// supplement #5). Chains are built by cloning-and-linking rather than by
/// mutation, so a `TraceItem` can be freely shared between colorings.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceItem {
    description: String,
    previous: Option<Arc<TraceItem>>,
}

impl TraceItem {
    pub fn root(description: impl Into<String>) -> Self {
        TraceItem { description: description.into(), previous: None }
    }

    pub fn chain(&self, description: impl Into<String>) -> Self {
        TraceItem { description: description.into(), previous: Some(Arc::new(self.clone())) }
    }

    pub fn describe(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for TraceItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(prev) = &self.previous {
            write!(f, "{prev} -> {}", self.description)
        } else {
            write!(f, "{}", self.description)
        }
    }
}

/// A node's coloring at one observed class (§3): the tag, its confidence,
/// and how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintedColor {
    pub color: ColorTag,
    pub confidence: Confidence,
    pub trace: TraceItem,
}

impl PaintedColor {
    pub fn new(color: ColorTag, confidence: Confidence, trace: TraceItem) -> Self {
        PaintedColor { color, confidence, trace }
    }
}
