//! Calculator registry (C7): dynamic dispatch keyed by `requirement.calculator`,
//! implemented as a compile-time table rather than runtime module loading
//! (the Python original's `__import__(f'lib.{module_name}')`) — see
//! SPEC_FULL.md's REDESIGN FLAGS for why the dynamic-import approach doesn't
//! carry over to a statically linked binary.

use std::path::Path;

/// One calculator's output. `value`/`summary` are contractual; everything
/// else rides along as opaque extras for template substitution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CalcResult {
    pub value: f64,
    pub summary: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A requirement calculator. Must never panic; a `None` return means "skip
/// this check" (fail-open), not an error.
pub trait Calculator: Send + Sync {
    fn calculate(&self, project_dir: &Path, branch: &str) -> Option<CalcResult>;
}

/// Look up a calculator by its configured name. Unknown names are a
/// configuration error the dynamic strategy treats as fail-open.
pub fn lookup(name: &str) -> Option<Box<dyn Calculator>> {
    match name {
        "branch_size" => Some(Box::new(crate::calculators::branch_size::BranchSizeCalculator)),
        _ => None,
    }
}
