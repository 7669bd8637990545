//! Per-tick update scheduler
//!
//! One `tick` walks the phases in order: rebuild tiers if membership
//! changed, evaluate the whole native tier, evaluate one slice of the
//! script tier, evaluate the whole math-library tier. Every phase is
//! fail-soft per variable: a failure is logged and collected, the
//! variable keeps its last good value and the tick moves on.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::Evaluator;
use crate::registry::VariableRegistry;
use crate::variable::Tier;
use std::ops::Range;
use tracing::{trace, warn};

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    /// Tick number, starting at 0
    pub tick: u64,
    /// Whether the tier arrays were rebuilt first
    pub rebuilt: bool,
    pub native: usize,
    pub script: usize,
    pub math_library: usize,
    /// Variables whose raw value changed
    pub changed: usize,
    pub failures: Vec<EngineError>,
}

impl TickReport {
    pub fn evaluated(&self) -> usize {
        self.native + self.script + self.math_library
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tick_counter: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.tick_counter
    }

    /// Script-tier range evaluated on `tick` for a tier of `len` members.
    ///
    /// Slice `k` is `[k*len/P, (k+1)*len/P)`. The `P` slices partition the
    /// tier and none is longer than `ceil(len/P)`.
    pub fn slice_bounds(tick: u64, len: usize, priority: usize) -> Range<usize> {
        let priority = priority.max(1);
        let k = (tick % priority as u64) as usize;
        let start = k * len / priority;
        let end = (k + 1) * len / priority;
        start..end
    }

    /// Advance one tick
    pub fn tick(
        &mut self,
        registry: &mut VariableRegistry,
        evaluator: &mut Evaluator,
        config: &EngineConfig,
    ) -> TickReport {
        let mut report = TickReport {
            tick: self.tick_counter,
            ..TickReport::default()
        };

        if registry.tiers_dirty() {
            registry.rebuild_tiers();
            report.rebuilt = true;
        }

        let native_len = registry.tier(Tier::Native).len();
        let native = evaluate_range(registry, evaluator, config, Tier::Native, 0..native_len, &mut report);
        report.native = native;

        let slice = Self::slice_bounds(
            self.tick_counter,
            registry.tier(Tier::Script).len(),
            config.script_update_priority,
        );
        let script = evaluate_range(registry, evaluator, config, Tier::Script, slice, &mut report);
        report.script = script;

        let math_len = registry.tier(Tier::MathLibrary).len();
        let math = evaluate_range(registry, evaluator, config, Tier::MathLibrary, 0..math_len, &mut report);
        report.math_library = math;

        trace!(
            tick = report.tick,
            native = report.native,
            script = report.script,
            math = report.math_library,
            changed = report.changed,
            failures = report.failures.len(),
            "tick complete"
        );

        self.tick_counter += 1;
        report
    }
}

/// Evaluate `range` of a tier's members; returns how many were attempted
fn evaluate_range(
    registry: &mut VariableRegistry,
    evaluator: &mut Evaluator,
    config: &EngineConfig,
    tier: Tier,
    range: Range<usize>,
    report: &mut TickReport,
) -> usize {
    let count = range.len();
    for i in range {
        let id = registry.tier(tier)[i];
        match registry.evaluate(id, evaluator, config) {
            Ok(true) => report.changed += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(?tier, error = %err, "evaluation failed; keeping last value");
                report.failures.push(err);
            }
        }
    }
    count
}
