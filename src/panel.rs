//! Instrument panel session
//!
//! A `Panel` owns everything one instrument instance needs: the host table,
//! the variable registry, the shared interpreter and the scheduler. Panels
//! share nothing, so independent instruments cannot interfere.

use crate::binder::{NativeBinder, ResolveNested};
use crate::canonical::canonicalize;
use crate::compiler::compile;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::evaluator::Evaluator;
use crate::host::HostRegistry;
use crate::lexer::{tokenize, Keyword, Token};
use crate::registry::{TierCounts, VariableRegistry};
use crate::scheduler::{Scheduler, TickReport};
use crate::value::Primitive;
use crate::variable::{
    Binding, CallbackError, Tier, Variable, VariableId, VariableSnapshot,
};
use std::borrow::Cow;
use std::ops::Index;
use std::rc::Rc;
use tracing::{debug, warn};

/// Placeholder substitutions applied to expression text before tokenizing,
/// in insertion order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindingContext {
    replacements: Vec<(String, String)>,
}

impl BindingContext {
    pub fn new() -> Self {
        BindingContext::default()
    }

    pub fn with(mut self, placeholder: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.replacements
            .push((placeholder.into(), replacement.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut result = Cow::Borrowed(text);
        for (placeholder, replacement) in &self.replacements {
            if !placeholder.is_empty() && result.contains(placeholder.as_str()) {
                result = Cow::Owned(result.replace(placeholder.as_str(), replacement));
            }
        }
        result
    }
}

pub struct Panel {
    config: EngineConfig,
    hosts: HostRegistry,
    registry: VariableRegistry,
    evaluator: Evaluator,
    scheduler: Scheduler,
}

impl Panel {
    /// Panel with the default configuration
    pub fn new(hosts: HostRegistry) -> Self {
        let config = EngineConfig::default();
        Panel {
            evaluator: Evaluator::new(config.max_stack_size),
            config,
            hosts,
            registry: VariableRegistry::new(),
            scheduler: Scheduler::new(),
        }
    }

    pub fn with_config(hosts: HostRegistry, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Panel {
            evaluator: Evaluator::new(config.max_stack_size),
            config,
            hosts,
            registry: VariableRegistry::new(),
            scheduler: Scheduler::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    /// Get the variable for an expression, creating it on first request.
    ///
    /// Equivalent texts (after placeholder substitution and
    /// canonicalization) always return the same id. Fails only when the text
    /// cannot be tokenized; anything that tokenizes yields a variable, which
    /// is marked invalid if it cannot be evaluated.
    pub fn get_variable(&mut self, text: &str, context: &BindingContext) -> Result<VariableId> {
        let text = context.apply(text);
        let tokens = tokenize(&text).map_err(|source| EngineError::Unparseable {
            text: text.to_string(),
            source,
        })?;
        let mut resolver = Resolver {
            hosts: &self.hosts,
            registry: &mut self.registry,
            evaluator: &mut self.evaluator,
            config: &self.config,
        };
        Ok(resolver.get_or_create(&tokens))
    }

    /// `get_variable` with an empty binding context
    pub fn get(&mut self, text: &str) -> Result<VariableId> {
        self.get_variable(text, &BindingContext::default())
    }

    /// Find an existing variable without creating one
    pub fn lookup(&self, text: &str, context: &BindingContext) -> Option<VariableId> {
        let tokens = tokenize(&context.apply(text)).ok()?;
        self.registry.lookup(&canonicalize(&tokens))
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.registry.get(id)
    }

    fn variable_mut(&mut self, id: VariableId) -> Result<&mut Variable> {
        self.registry
            .get_mut(id)
            .ok_or(EngineError::UnknownVariable(id.index()))
    }

    /// Subscribe to numeric changes of a variable
    pub fn on_numeric_change(
        &mut self,
        id: VariableId,
        callback: impl FnMut(f64) -> std::result::Result<(), CallbackError> + 'static,
    ) -> Result<()> {
        self.variable_mut(id)?.on_numeric_change(callback);
        Ok(())
    }

    /// Subscribe to any raw change of a variable
    pub fn on_change(
        &mut self,
        id: VariableId,
        callback: impl FnMut() -> std::result::Result<(), CallbackError> + 'static,
    ) -> Result<()> {
        self.variable_mut(id)?.on_change(callback);
        Ok(())
    }

    /// Evaluate one variable outside the tick; returns whether it changed
    pub fn evaluate(&mut self, id: VariableId) -> Result<bool> {
        self.registry
            .evaluate(id, &mut self.evaluator, &self.config)
    }

    /// Variables a native binding reads at call time
    pub fn inputs(&self, id: VariableId) -> Vec<VariableId> {
        self.registry
            .get(id)
            .and_then(Variable::binding)
            .map(Binding::inputs)
            .unwrap_or_default()
    }

    /// Advance the scheduler one tick
    pub fn tick(&mut self) -> TickReport {
        self.scheduler
            .tick(&mut self.registry, &mut self.evaluator, &self.config)
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.scheduler.ticks()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn tier_counts(&self) -> TierCounts {
        self.registry.tier_counts()
    }

    pub fn snapshot(&self) -> Vec<VariableSnapshot> {
        self.registry.iter().map(|(_, v)| v.snapshot()).collect()
    }
}

impl Index<VariableId> for Panel {
    type Output = Variable;

    /// Panics if `id` was issued by another panel
    fn index(&self, id: VariableId) -> &Variable {
        &self.registry.variables()[id.index()]
    }
}

/// Disjoint borrows of a panel for one `get_variable` call
struct Resolver<'a> {
    hosts: &'a HostRegistry,
    registry: &'a mut VariableRegistry,
    evaluator: &'a mut Evaluator,
    config: &'a EngineConfig,
}

impl Resolver<'_> {
    fn get_or_create(&mut self, tokens: &[Token]) -> VariableId {
        let name = canonicalize(tokens);
        if let Some(id) = self.registry.lookup(&name) {
            return id;
        }

        let variable = self.create(Rc::from(name), tokens);
        debug!(
            variable = variable.name(),
            kind = ?variable.kind(),
            tier = ?variable.tier(),
            valid = variable.is_valid(),
            "variable created"
        );
        self.registry.insert(variable)
    }

    fn create(&mut self, name: Rc<str>, tokens: &[Token]) -> Variable {
        if let Some(value) = literal(tokens) {
            return Variable::constant(name, value);
        }

        let hosts = self.hosts;
        if let Some((binding, tier)) = NativeBinder::new(hosts).bind(tokens, self) {
            return self.native(name, binding, tier);
        }
        self.script(name, tokens)
    }

    fn native(&mut self, name: Rc<str>, binding: Binding, tier: Tier) -> Variable {
        let mut variable = Variable::native(name, binding, tier);
        match variable.compute(self.registry.variables(), self.evaluator) {
            Ok(Some(value)) => {
                variable.apply(value, self.config);
            }
            Ok(None) => {}
            // The binding stays; the next tick retries
            Err(err) => warn!(
                variable = variable.name(),
                error = %err,
                "initial native evaluation failed"
            ),
        }
        variable
    }

    fn script(&mut self, name: Rc<str>, tokens: &[Token]) -> Variable {
        let program = match compile(tokens, self.hosts) {
            Ok(program) => program,
            Err(err) => {
                warn!(variable = %name, error = %err, "expression does not compile");
                return Variable::invalid(name);
            }
        };
        match self.evaluator.evaluate(&program) {
            Ok(value) if !program.calls_host() => Variable::constant(name, value),
            Ok(value) => Variable::script(name, program, value),
            Err(err) => {
                warn!(variable = %name, error = %err, "expression cannot be evaluated");
                Variable::invalid(name)
            }
        }
    }
}

impl ResolveNested for Resolver<'_> {
    fn resolve_nested(&mut self, tokens: &[Token]) -> Option<VariableId> {
        Some(self.get_or_create(tokens))
    }

    fn variable(&self, id: VariableId) -> &Variable {
        &self.registry.variables()[id.index()]
    }
}

/// A lone literal token
fn literal(tokens: &[Token]) -> Option<Primitive> {
    match tokens {
        [Token::Number(n)] => Some(Primitive::Double(*n)),
        [Token::QuotedString(s)] => Some(Primitive::from(s.as_str())),
        [Token::Keyword(Keyword::True)] => Some(Primitive::Bool(true)),
        [Token::Keyword(Keyword::False)] => Some(Primitive::Bool(false)),
        _ => None,
    }
}
