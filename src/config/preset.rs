//! Named presets scaling the two iteration caps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Tight caps, lower latency, more conservative fixpoints.
    Fast,
    /// The engine's baseline caps.
    Balanced,
    /// Loose caps for exhaustive offline runs.
    Thorough,
}

impl Default for Preset {
    fn default() -> Self {
        Preset::Balanced
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Preset::Fast => "fast",
            Preset::Balanced => "balanced",
            Preset::Thorough => "thorough",
        };
        write!(f, "{s}")
    }
}
