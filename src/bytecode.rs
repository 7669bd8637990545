//! Bytecode for interpreted expressions
//!
//! The interpreter compiles an expression once into a flat list of ops for
//! a stack machine. The resulting `Program` is the compiled handle a script
//! variable keeps and re-runs on every scheduled evaluation.

use crate::host::HostMethod;
use crate::value::Primitive;
use std::rc::Rc;

/// Stack machine operations
#[derive(Debug, Clone)]
pub enum Op {
    /// Push a constant
    LoadConst(Primitive),
    /// Pop `argc` arguments, call the overload matching their types, push
    /// the result. Overloads all share one name and arity.
    Call {
        overloads: Rc<[Rc<HostMethod>]>,
        argc: usize,
    },

    // Unary, pop 1 push 1
    Neg,
    Not,

    // Binary, pop 2 push 1
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NotEq,

    /// `and`: if the top of stack is falsy jump to the target keeping it,
    /// otherwise pop it and fall through
    AndJump(usize),
    /// `or`: if the top of stack is truthy jump to the target keeping it,
    /// otherwise pop it and fall through
    OrJump(usize),
}

impl Op {
    /// Operator text for error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::LoadConst(_) => "const",
            Op::Call { .. } => "call",
            Op::Neg => "-",
            Op::Not => "not",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "^",
            Op::Concat => "..",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
            Op::NotEq => "~=",
            Op::AndJump(_) => "and",
            Op::OrJump(_) => "or",
        }
    }
}

/// A compiled expression
#[derive(Debug, Clone)]
pub struct Program {
    ops: Vec<Op>,
    max_depth: usize,
}

impl Program {
    pub fn new(ops: Vec<Op>, max_depth: usize) -> Self {
        Program { ops, max_depth }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Deepest stack the program can reach
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// True when running the program reads host state. Programs that do not
    /// are constant and only need to run once.
    pub fn calls_host(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, Op::Call { .. }))
    }
}
