//! Error taxonomy
//!
//! Each layer has its own error enum; `EngineError` is what crosses the
//! public boundary. Bind failures are deliberately absent: the native binder
//! answers with `None` and the expression goes to the interpreter instead.

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Tokenizer failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: String, offset: usize },

    #[error("number literal {text} at offset {offset} is out of range")]
    NumberOutOfRange { text: String, offset: usize },

    #[error("expression is empty")]
    Empty,
}

/// Failures while compiling an expression for the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unexpected token `{found}`, expected {expected}")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown namespace `{0}`")]
    UnknownNamespace(String),

    #[error("`{namespace}` has no method `{method}` taking {arity} argument(s)")]
    UnknownMethod {
        namespace: String,
        method: String,
        arity: usize,
    },
}

/// A host method reported failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{namespace}.{method}: {message}")]
pub struct HostError {
    pub namespace: String,
    pub method: String,
    pub message: String,
}

/// Failures while running a compiled expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("cannot apply `{op}` to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("cannot apply `{op}` to {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },

    #[error("no overload of {namespace}.{method} accepts ({args})")]
    NoOverload {
        namespace: String,
        method: String,
        args: String,
    },

    #[error("stack overflow in evaluator")]
    StackOverflow,

    #[error("stack underflow in evaluator")]
    StackUnderflow,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Errors surfaced to engine callers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unparseable expression `{text}`: {source}")]
    Unparseable {
        text: String,
        #[source]
        source: LexError,
    },

    #[error("evaluation of `{name}` failed: {source}")]
    Evaluation {
        name: String,
        #[source]
        source: ScriptError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no variable with id {0}")]
    UnknownVariable(usize),
}
