//! Variable Registry
//!
//! Arena of variables addressed by `VariableId`, indexed by canonical name,
//! plus the three tier arrays the scheduler walks. Variables are never
//! removed individually; the registry is dropped as a whole with its panel.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::Evaluator;
use crate::variable::{Tier, Variable, VariableId};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

/// Number of mutable variables per tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub native: usize,
    pub script: usize,
    pub math_library: usize,
}

#[derive(Default)]
pub struct VariableRegistry {
    variables: Vec<Variable>,
    by_name: IndexMap<Rc<str>, VariableId>,

    native_tier: Vec<VariableId>,
    script_tier: Vec<VariableId>,
    math_tier: Vec<VariableId>,

    /// Set when membership changed since the last rebuild
    tiers_dirty: bool,
    /// Bumped on every rebuild
    generation: u64,
}

impl VariableRegistry {
    pub fn new() -> Self {
        VariableRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Find a variable by canonical name
    pub fn lookup(&self, name: &str) -> Option<VariableId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.variables.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VariableId(i), v))
    }

    pub(crate) fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Add a variable under its name. If the name is already present the
    /// existing id is returned and `variable` is dropped.
    pub(crate) fn insert(&mut self, variable: Variable) -> VariableId {
        if let Some(existing) = self.lookup(variable.name()) {
            return existing;
        }
        let id = VariableId(self.variables.len());
        let name: Rc<str> = Rc::from(variable.name());
        if variable.is_mutable() {
            self.tiers_dirty = true;
        }
        self.variables.push(variable);
        self.by_name.insert(name, id);
        id
    }

    pub fn tiers_dirty(&self) -> bool {
        self.tiers_dirty
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Re-partition every mutable variable into its tier array
    pub fn rebuild_tiers(&mut self) {
        self.native_tier.clear();
        self.script_tier.clear();
        self.math_tier.clear();

        for (i, variable) in self.variables.iter().enumerate() {
            let id = VariableId(i);
            match variable.tier() {
                Some(Tier::Native) => self.native_tier.push(id),
                Some(Tier::Script) => self.script_tier.push(id),
                Some(Tier::MathLibrary) => self.math_tier.push(id),
                None => {}
            }
        }

        self.tiers_dirty = false;
        self.generation += 1;
        debug!(
            generation = self.generation,
            native = self.native_tier.len(),
            script = self.script_tier.len(),
            math = self.math_tier.len(),
            "tiers rebuilt"
        );
    }

    /// Members of a tier as of the last rebuild
    pub fn tier(&self, tier: Tier) -> &[VariableId] {
        match tier {
            Tier::Native => &self.native_tier,
            Tier::Script => &self.script_tier,
            Tier::MathLibrary => &self.math_tier,
        }
    }

    /// Current tier membership, including variables added since the last
    /// rebuild
    pub fn tier_counts(&self) -> TierCounts {
        let mut counts = TierCounts::default();
        for variable in &self.variables {
            match variable.tier() {
                Some(Tier::Native) => counts.native += 1,
                Some(Tier::Script) => counts.script += 1,
                Some(Tier::MathLibrary) => counts.math_library += 1,
                None => {}
            }
        }
        counts
    }

    /// Evaluate one variable and apply the result. Returns whether its raw
    /// value changed; on failure the cached value is left untouched.
    pub fn evaluate(
        &mut self,
        id: VariableId,
        evaluator: &mut Evaluator,
        config: &EngineConfig,
    ) -> Result<bool, EngineError> {
        let variable = self
            .variables
            .get(id.0)
            .ok_or(EngineError::UnknownVariable(id.0))?;
        match variable.compute(&self.variables, evaluator) {
            Ok(Some(value)) => Ok(self.variables[id.0].apply(value, config)),
            Ok(None) => Ok(false),
            Err(source) => Err(EngineError::Evaluation {
                name: variable.name().to_string(),
                source,
            }),
        }
    }
}
