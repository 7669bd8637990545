//! Built-in `math` namespace
//!
//! The one-argument functions here are registered as pure: they are the
//! allow-list that places a bound variable in the math-library tier.
//! Multi-argument helpers are only reachable through the interpreter.

use crate::host::{HostRegistry, Namespace};

pub const NAMESPACE: &str = "math";

/// Math functions keep no state; the receiver is unit
pub fn namespace() -> Namespace<()> {
    Namespace::new(NAMESPACE, ())
        .pure1("Sin", |_: &(), x: f64| x.sin())
        .pure1("Cos", |_: &(), x: f64| x.cos())
        .pure1("Tan", |_: &(), x: f64| x.tan())
        .pure1("Asin", |_: &(), x: f64| x.asin())
        .pure1("Acos", |_: &(), x: f64| x.acos())
        .pure1("Atan", |_: &(), x: f64| x.atan())
        .pure1("Abs", |_: &(), x: f64| x.abs())
        .pure1("Floor", |_: &(), x: f64| x.floor())
        .pure1("Ceil", |_: &(), x: f64| x.ceil())
        .pure1("Round", |_: &(), x: f64| x.round())
        .pure1("Sqrt", |_: &(), x: f64| x.sqrt())
        .pure1("Exp", |_: &(), x: f64| x.exp())
        .pure1("Log", |_: &(), x: f64| x.ln())
        .pure1("Log10", |_: &(), x: f64| x.log10())
        .pure1("Sign", |_: &(), x: f64| sign(x))
        .pure1("Clamp01", |_: &(), x: f64| x.clamp(0.0, 1.0))
        .method2("Min", |_: &(), a: f64, b: f64| a.min(b))
        .method2("Max", |_: &(), a: f64, b: f64| a.max(b))
        .method2("Pow", |_: &(), a: f64, b: f64| a.powf(b))
        .method2("Atan2", |_: &(), y: f64, x: f64| y.atan2(x))
        .method3("Clamp", |_: &(), x: f64, lo: f64, hi: f64| clamp(x, lo, hi))
}

/// -1, 0 or 1; `f64::signum` returns 1 for +0
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Clamp that tolerates swapped bounds instead of panicking
fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    x.max(lo).min(hi)
}

impl HostRegistry {
    /// A registry holding only the `math` namespace
    pub fn with_math_library() -> Self {
        HostRegistry::new().with(namespace())
    }
}
