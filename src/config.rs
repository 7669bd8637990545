//! Engine configuration

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for one panel. Every field has a default, so hosts only
/// pass what they change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Script-tier slice divisor: each tick evaluates 1/P of the script
    /// variables, so every one of them runs once every P ticks
    pub script_update_priority: usize,
    /// Relative tolerance under which a numeric change is not reported to
    /// numeric-change subscribers
    pub change_tolerance: f64,
    /// Interpreter value stack limit
    pub max_stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            script_update_priority: 1,
            change_tolerance: 1e-6,
            max_stack_size: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.script_update_priority == 0 {
            return Err(EngineError::Config(
                "scriptUpdatePriority must be at least 1".to_string(),
            ));
        }
        if self.change_tolerance.is_nan() || self.change_tolerance < 0.0 {
            return Err(EngineError::Config(format!(
                "changeTolerance must be a non-negative number, got {}",
                self.change_tolerance
            )));
        }
        if self.max_stack_size == 0 {
            return Err(EngineError::Config(
                "maxStackSize must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Approximate float equality used for numeric change callbacks.
    ///
    /// Relative to the larger magnitude, with a tiny absolute floor so values
    /// near zero still compare sensibly.
    pub fn approximately(&self, a: f64, b: f64) -> bool {
        let floor = f64::from(f32::MIN_POSITIVE) * 8.0;
        let scale = a.abs().max(b.abs());
        (b - a).abs() < (self.change_tolerance * scale).max(floor)
    }
}
