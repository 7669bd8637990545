//! Variables: cached, incrementally updated expression values
//!
//! A variable is created once per canonical expression and lives as long as
//! its panel. Its classification is fixed at construction:
//!
//! - `Constant` never re-evaluates
//! - `NativeBound` calls a host method directly (or combines other variables)
//! - `Script` re-runs a compiled program on the interpreter
//!
//! Evaluation is split in two so the registry can read other variables while
//! computing one: `compute` borrows the whole arena immutably and returns the
//! new raw value, `apply` then updates this variable and notifies subscribers.

use crate::bytecode::Program;
use crate::config::EngineConfig;
use crate::error::ScriptError;
use crate::evaluator::Evaluator;
use crate::host::HostMethod;
use crate::value::{safe, ParamType, Primitive};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// Index of a variable in its panel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariableId(pub(crate) usize);

impl VariableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling class of a mutable variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    /// Direct host calls, evaluated every tick
    Native,
    /// Interpreted programs, time-sliced
    Script,
    /// Pure math functions over another variable, evaluated every tick
    /// after the script slice
    MathLibrary,
}

/// Public view of a classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableKind {
    Constant,
    NativeBound,
    Script,
}

/// Argument captured by a native binding
#[derive(Clone, Debug)]
pub(crate) enum BoundArg {
    None,
    Const(Primitive),
    /// Read from another variable at call time, projected to `ty`
    Variable { id: VariableId, ty: ParamType },
}

/// Operator joining two operands of a native arithmetic chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChainOp {
    Add,
    Mul,
    Div,
}

impl ChainOp {
    fn symbol(&self) -> &'static str {
        match self {
            ChainOp::Add => "+",
            ChainOp::Mul => "*",
            ChainOp::Div => "/",
        }
    }
}

/// One operand of a native arithmetic chain
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ChainOperand {
    /// A number literal, kept in the binding rather than the registry
    Const(Primitive),
    Variable(VariableId),
}

impl ChainOperand {
    fn value<'a>(&'a self, arena: &'a [Variable]) -> &'a Primitive {
        match self {
            ChainOperand::Const(value) => value,
            ChainOperand::Variable(id) => &arena[id.0].raw,
        }
    }
}

/// A directly callable evaluator produced by the native binder
#[derive(Clone, Debug)]
pub(crate) enum Binding {
    /// `ns.method()` or `ns.method(arg)`; the receiver lives in the method
    Call {
        method: Rc<HostMethod>,
        arg: BoundArg,
    },
    /// `a * b + c / d ...` over numeric operands
    Chain {
        first: ChainOperand,
        rest: Vec<(ChainOp, ChainOperand)>,
    },
}

impl Binding {
    fn invoke(&self, arena: &[Variable]) -> Result<Primitive, ScriptError> {
        match self {
            Binding::Call { method, arg } => {
                let result = match arg {
                    BoundArg::None => method.invoke(&[])?,
                    BoundArg::Const(value) => method.invoke(std::slice::from_ref(value))?,
                    BoundArg::Variable { id, ty } => {
                        let value = arena[id.0].raw.project(*ty);
                        method.invoke(&[value])?
                    }
                };
                Ok(result)
            }
            Binding::Chain { first, rest } => {
                // Sum of products, so `*` and `/` bind tighter than `+`.
                // Operands coerce exactly like interpreted arithmetic.
                let mut lhs = first.value(arena);
                let mut sum: Option<f64> = None;
                let mut product = lhs.as_number().unwrap_or_default();
                for (op, operand) in rest {
                    let rhs = operand.value(arena);
                    let (Some(_), Some(y)) = (lhs.as_number(), rhs.as_number()) else {
                        return Err(ScriptError::TypeMismatch {
                            op: op.symbol(),
                            lhs: lhs.type_name(),
                            rhs: rhs.type_name(),
                        });
                    };
                    match op {
                        ChainOp::Mul => product *= y,
                        ChainOp::Div => product /= y,
                        ChainOp::Add => {
                            sum = Some(sum.map_or(product, |s| s + product));
                            product = y;
                        }
                    }
                    lhs = rhs;
                }
                Ok(Primitive::Double(sum.map_or(product, |s| s + product)))
            }
        }
    }

    /// Variables this binding reads
    pub(crate) fn inputs(&self) -> Vec<VariableId> {
        match self {
            Binding::Call {
                arg: BoundArg::Variable { id, .. },
                ..
            } => vec![*id],
            Binding::Call { .. } => Vec::new(),
            Binding::Chain { first, rest } => std::iter::once(first)
                .chain(rest.iter().map(|(_, operand)| operand))
                .filter_map(|operand| match operand {
                    ChainOperand::Variable(id) => Some(*id),
                    ChainOperand::Const(_) => None,
                })
                .collect(),
        }
    }
}

pub(crate) enum Classification {
    Constant,
    NativeBound(Binding),
    Script(Program),
}

/// Error type subscribers may return; it is logged and dropped
pub type CallbackError = Box<dyn std::error::Error>;

type NumericCallback = Box<dyn FnMut(f64) -> Result<(), CallbackError>>;
type ChangeCallback = Box<dyn FnMut() -> Result<(), CallbackError>>;

/// A cached expression value
pub struct Variable {
    name: Rc<str>,
    classification: Classification,
    tier: Option<Tier>,
    valid: bool,
    /// Set once a value has been computed (or was known at creation)
    evaluated: bool,
    raw: Primitive,
    double: f64,
    safe: f64,
    string: String,
    numeric_callbacks: Vec<NumericCallback>,
    change_callbacks: Vec<ChangeCallback>,
}

impl Variable {
    fn with_state(
        name: Rc<str>,
        classification: Classification,
        tier: Option<Tier>,
        valid: bool,
        raw: Primitive,
    ) -> Self {
        let mut variable = Variable {
            name,
            classification,
            tier,
            valid,
            evaluated: true,
            raw: Primitive::default(),
            double: 0.0,
            safe: 0.0,
            string: String::new(),
            numeric_callbacks: Vec::new(),
            change_callbacks: Vec::new(),
        };
        variable.set_raw(raw);
        variable
    }

    pub(crate) fn constant(name: Rc<str>, value: Primitive) -> Self {
        Self::with_state(name, Classification::Constant, None, true, value)
    }

    /// An expression nothing could resolve. It renders as its own text.
    pub(crate) fn invalid(name: Rc<str>) -> Self {
        let raw = Primitive::Str(name.clone());
        Self::with_state(name, Classification::Constant, None, false, raw)
    }

    /// A bound variable that has not been evaluated yet
    pub(crate) fn native(name: Rc<str>, binding: Binding, tier: Tier) -> Self {
        let mut variable = Self::with_state(
            name,
            Classification::NativeBound(binding),
            Some(tier),
            true,
            Primitive::default(),
        );
        variable.evaluated = false;
        variable
    }

    pub(crate) fn script(name: Rc<str>, program: Program, initial: Primitive) -> Self {
        Self::with_state(
            name,
            Classification::Script(program),
            Some(Tier::Script),
            true,
            initial,
        )
    }

    fn set_raw(&mut self, raw: Primitive) {
        self.double = raw.to_f64();
        self.safe = safe(self.double);
        self.string = raw.to_string();
        self.raw = raw;
    }

    /// Canonical expression text
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        match self.classification {
            Classification::Constant => VariableKind::Constant,
            Classification::NativeBound(_) => VariableKind::NativeBound,
            Classification::Script(_) => VariableKind::Script,
        }
    }

    /// Scheduling tier; `None` for constants
    pub fn tier(&self) -> Option<Tier> {
        self.tier
    }

    /// False when the expression could not be resolved at all
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True unless the variable is a constant
    pub fn is_mutable(&self) -> bool {
        !matches!(self.classification, Classification::Constant)
    }

    /// False while the cached value is still the placeholder a native
    /// variable starts with, i.e. its host call has never succeeded
    pub fn has_value(&self) -> bool {
        self.evaluated
    }

    pub fn raw_value(&self) -> &Primitive {
        &self.raw
    }

    /// Numeric projection; may be NaN or infinite
    pub fn value(&self) -> f64 {
        self.double
    }

    /// Numeric projection with NaN and infinities replaced by 0
    pub fn safe_value(&self) -> f64 {
        self.safe
    }

    /// String projection
    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub(crate) fn binding(&self) -> Option<&Binding> {
        match &self.classification {
            Classification::NativeBound(binding) => Some(binding),
            _ => None,
        }
    }

    /// Subscribe to numeric changes; receives the new safe value
    pub fn on_numeric_change(&mut self, callback: impl FnMut(f64) -> Result<(), CallbackError> + 'static) {
        self.numeric_callbacks.push(Box::new(callback));
    }

    /// Subscribe to any change of the raw value
    pub fn on_change(&mut self, callback: impl FnMut() -> Result<(), CallbackError> + 'static) {
        self.change_callbacks.push(Box::new(callback));
    }

    pub fn subscriber_count(&self) -> usize {
        self.numeric_callbacks.len() + self.change_callbacks.len()
    }

    /// Compute this variable's next raw value. `Ok(None)` for constants.
    pub(crate) fn compute(
        &self,
        arena: &[Variable],
        evaluator: &mut Evaluator,
    ) -> Result<Option<Primitive>, ScriptError> {
        match &self.classification {
            Classification::Constant => Ok(None),
            Classification::NativeBound(binding) => binding.invoke(arena).map(Some),
            Classification::Script(program) => evaluator.evaluate(program).map(Some),
        }
    }

    /// Store a freshly computed value and notify subscribers.
    ///
    /// Returns whether the raw value changed. Numeric subscribers only hear
    /// about changes of the safe value beyond the configured tolerance; change
    /// subscribers hear about every raw change.
    pub(crate) fn apply(&mut self, value: Primitive, config: &EngineConfig) -> bool {
        self.evaluated = true;
        if value.same_as(&self.raw) {
            return false;
        }

        let previous_safe = self.safe;
        self.set_raw(value);

        if !config.approximately(previous_safe, self.safe) {
            let safe_value = self.safe;
            for callback in self.numeric_callbacks.iter_mut() {
                if let Err(err) = callback(safe_value) {
                    warn!(variable = %self.name, error = %err, "numeric change callback failed");
                }
            }
        }
        for callback in self.change_callbacks.iter_mut() {
            if let Err(err) = callback() {
                warn!(variable = %self.name, error = %err, "change callback failed");
            }
        }
        true
    }

    pub fn snapshot(&self) -> VariableSnapshot {
        VariableSnapshot {
            name: self.name.to_string(),
            kind: self.kind(),
            tier: self.tier,
            valid: self.valid,
            value: self.double,
            safe_value: self.safe,
            string: self.string.clone(),
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("tier", &self.tier)
            .field("valid", &self.valid)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Serializable copy of a variable's cached state
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSnapshot {
    pub name: String,
    pub kind: VariableKind,
    pub tier: Option<Tier>,
    pub valid: bool,
    pub value: f64,
    pub safe_value: f64,
    pub string: String,
}
