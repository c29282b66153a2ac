//! Analysis tuning: iteration caps, worker count, merge-variant default.
//! Serde-backed so a deployment can override via YAML, following this
//! codebase's tiered preset convention (fast/balanced/thorough).

mod preset;

pub use preset::Preset;

use serde::{Deserialize, Serialize};

/// Which merge variant (§4.3) a brush falls back to when it doesn't pick
/// one explicitly. The two variants are not interchangeable: `Lub` never
/// reports an intersection on its own; `MostDangerous` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeVariant {
    Lub,
    MostDangerous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on brush fixpoint passes (§4.4). Exceeding it logs a
    /// warning and returns the last state rather than erroring.
    pub brush_iteration_cap: u32,

    /// Hard cap on a single task's execution count across the session's
    /// worklist lifetime (§4.5), a safety valve against a non-monotone
    /// brush.
    pub task_execution_cap: u32,

    /// Worklist worker count; `None` defaults to `num_cpus::get()`.
    pub worker_count: Option<usize>,

    /// Merge variant `resolve_callee` (§4.5) uses when combining a
    /// callee's cached result into a caller's running colorings.
    pub callee_merge_variant: MergeVariant,
}

impl EngineConfig {
    pub fn worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get)
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => EngineConfig {
                brush_iteration_cap: 16,
                task_execution_cap: 64,
                worker_count: None,
                callee_merge_variant: MergeVariant::MostDangerous,
            },
            Preset::Balanced => EngineConfig::default(),
            Preset::Thorough => EngineConfig {
                brush_iteration_cap: 256,
                task_execution_cap: 1024,
                worker_count: None,
                callee_merge_variant: MergeVariant::MostDangerous,
            },
        }
    }

    pub fn from_yaml(source: &str) -> crate::errors::Result<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| crate::errors::EngineError::Config(e.to_string()))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            brush_iteration_cap: 64,
            task_execution_cap: 256,
            worker_count: None,
            callee_merge_variant: MergeVariant::MostDangerous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_matches_default() {
        let a = EngineConfig::from_preset(Preset::Balanced);
        let b = EngineConfig::default();
        assert_eq!(a.brush_iteration_cap, b.brush_iteration_cap);
        assert_eq!(a.task_execution_cap, b.task_execution_cap);
    }

    #[test]
    fn fast_tightens_caps_relative_to_thorough() {
        let fast = EngineConfig::from_preset(Preset::Fast);
        let thorough = EngineConfig::from_preset(Preset::Thorough);
        assert!(fast.brush_iteration_cap < thorough.brush_iteration_cap);
        assert!(fast.task_execution_cap < thorough.task_execution_cap);
    }

    #[test]
    fn from_yaml_overrides_defaults() {
        let cfg = EngineConfig::from_yaml("brush_iteration_cap: 8\n").unwrap();
        assert_eq!(cfg.brush_iteration_cap, 8);
        assert_eq!(cfg.task_execution_cap, EngineConfig::default().task_execution_cap);
    }
}
