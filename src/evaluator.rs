//! Stack-based Expression Evaluator
//!
//! Runs compiled programs on a reusable value stack. This is the slow,
//! general path: every op dispatches dynamically on the operand types, and
//! host calls pick their overload by the runtime argument types.

use crate::bytecode::{Op, Program};
use crate::error::ScriptError;
use crate::host::HostMethod;
use crate::value::Primitive;
use std::cmp::Ordering;
use std::rc::Rc;

/// Stack machine shared by all script variables of a panel
pub struct Evaluator {
    stack: Vec<Primitive>,
    max_stack_size: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new(256)
    }
}

impl Evaluator {
    pub fn new(max_stack_size: usize) -> Self {
        Evaluator {
            stack: Vec::with_capacity(32),
            max_stack_size,
        }
    }

    fn push(&mut self, value: Primitive) -> Result<(), ScriptError> {
        if self.stack.len() >= self.max_stack_size {
            return Err(ScriptError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Primitive, ScriptError> {
        self.stack.pop().ok_or(ScriptError::StackUnderflow)
    }

    fn peek(&self) -> Result<&Primitive, ScriptError> {
        self.stack.last().ok_or(ScriptError::StackUnderflow)
    }

    fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Run a program to completion
    pub fn evaluate(&mut self, program: &Program) -> Result<Primitive, ScriptError> {
        if program.max_depth() > self.max_stack_size {
            return Err(ScriptError::StackOverflow);
        }

        self.clear_stack();
        let ops = program.ops();
        let mut pc = 0;

        while pc < ops.len() {
            let op = &ops[pc];
            pc += 1;

            match op {
                Op::LoadConst(value) => self.push(value.clone())?,

                Op::Call { overloads, argc } => {
                    let split = self
                        .stack
                        .len()
                        .checked_sub(*argc)
                        .ok_or(ScriptError::StackUnderflow)?;
                    let args = self.stack.split_off(split);
                    let method = overloads
                        .iter()
                        .find(|m| m.accepts(&args))
                        .ok_or_else(|| no_overload(overloads, &args))?;
                    let result = method.invoke(&args)?;
                    self.push(result)?;
                }

                Op::Neg => {
                    let value = self.pop()?;
                    let n = value.as_number().ok_or(ScriptError::UnaryTypeMismatch {
                        op: "-",
                        operand: value.type_name(),
                    })?;
                    self.push(Primitive::Double(-n))?;
                }
                Op::Not => {
                    let value = self.pop()?;
                    self.push(Primitive::Bool(!value.is_truthy()))?;
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Pow => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(arithmetic(op, &a, &b)?)?;
                }
                Op::Concat => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Primitive::from(format!("{}{}", a, b)))?;
                }
                Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let ordering = compare(op, &a, &b)?;
                    let result = match op {
                        Op::Lt => ordering == Some(Ordering::Less),
                        Op::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                        Op::Gt => ordering == Some(Ordering::Greater),
                        _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    };
                    self.push(Primitive::Bool(result))?;
                }
                Op::Eq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Primitive::Bool(a == b))?;
                }
                Op::NotEq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Primitive::Bool(a != b))?;
                }

                Op::AndJump(target) => {
                    if self.peek()?.is_truthy() {
                        self.pop()?;
                    } else {
                        pc = *target;
                    }
                }
                Op::OrJump(target) => {
                    if self.peek()?.is_truthy() {
                        pc = *target;
                    } else {
                        self.pop()?;
                    }
                }
            }
        }

        let result = self.pop()?;
        self.clear_stack();
        Ok(result)
    }
}

fn no_overload(overloads: &[Rc<HostMethod>], args: &[Primitive]) -> ScriptError {
    let (namespace, method) = overloads
        .first()
        .map(|m| (m.namespace().to_string(), m.name().to_string()))
        .unwrap_or_default();
    let args = args
        .iter()
        .map(Primitive::type_name)
        .collect::<Vec<_>>()
        .join(", ");
    ScriptError::NoOverload {
        namespace,
        method,
        args,
    }
}

fn arithmetic(op: &Op, a: &Primitive, b: &Primitive) -> Result<Primitive, ScriptError> {
    let (x, y) = match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(ScriptError::TypeMismatch {
                op: op.symbol(),
                lhs: a.type_name(),
                rhs: b.type_name(),
            })
        }
    };
    let result = match op {
        Op::Add => x + y,
        Op::Sub => x - y,
        Op::Mul => x * y,
        Op::Div => x / y,
        // Floored modulo: the result takes the sign of the divisor
        Op::Mod => x - (x / y).floor() * y,
        _ => x.powf(y),
    };
    Ok(Primitive::Double(result))
}

fn compare(op: &Op, a: &Primitive, b: &Primitive) -> Result<Option<Ordering>, ScriptError> {
    match (a, b) {
        (Primitive::Double(x), Primitive::Double(y)) => Ok(x.partial_cmp(y)),
        (Primitive::Str(x), Primitive::Str(y)) => Ok(Some(x.cmp(y))),
        _ => Err(ScriptError::TypeMismatch {
            op: op.symbol(),
            lhs: a.type_name(),
            rhs: b.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::host::{HostRegistry, Namespace};
    use crate::lexer::tokenize;

    fn hosts() -> HostRegistry {
        HostRegistry::with_math_library().with(
            Namespace::new("fc", ())
                .method0("Altitude", |_: &()| 1250.0)
                .method0("Callsign", |_: &()| "N172SP")
                .method0("GearDown", |_: &()| true)
                .method1("Failing", |_: &(), _: f64| Err::<f64, _>("sensor offline")),
        )
    }

    fn eval(text: &str) -> Result<Primitive, ScriptError> {
        let hosts = hosts();
        let program = compile(&tokenize(text).unwrap(), &hosts).unwrap();
        Evaluator::default().evaluate(&program)
    }

    fn num(text: &str) -> f64 {
        eval(text).unwrap().to_f64()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(num("1 + 2 * 3"), 7.0);
        assert_eq!(num("(1 + 2) * 3"), 9.0);
        assert_eq!(num("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(num("-(2 ^ 2)"), -4.0);
        assert_eq!(num("7 % 3"), 1.0);
        assert_eq!(num("-7 % 3"), 2.0);
    }

    #[test]
    fn test_folded_subtraction() {
        assert_eq!(num("10 - 4"), 6.0);
        assert_eq!(num("10-4"), 6.0);
        assert_eq!(num("10 - 2 * 3"), 4.0);
        assert_eq!(num("10 - 2 ^ 2"), 6.0);
        assert_eq!(num("1 - 0"), 1.0);
        // The heuristic: a folded literal binds tighter than `^`
        assert_eq!(num("-2 ^ 2"), 4.0);
    }

    #[test]
    fn test_host_calls() {
        assert_eq!(num("fc.Altitude() / 1000"), 1.25);
        assert_eq!(num("math.Max(fc.Altitude(), 2000)"), 2000.0);
        assert_eq!(num("math.Abs(-3)"), 3.0);
        assert_eq!(
            eval("fc.Callsign() .. ' ' .. 5").unwrap(),
            Primitive::from("N172SP 5")
        );
    }

    #[test]
    fn test_logic() {
        assert_eq!(num("fc.GearDown() and 1 or 0"), 1.0);
        assert_eq!(num("not fc.GearDown() and 1 or 0"), 0.0);
        assert_eq!(eval("false or 'x'").unwrap(), Primitive::from("x"));
        assert_eq!(eval("0 and 'zero is truthy'").unwrap(), Primitive::from("zero is truthy"));
        assert_eq!(eval("fc.Altitude() > 1000").unwrap(), Primitive::Bool(true));
        assert_eq!(eval("'abc' < 'abd'").unwrap(), Primitive::Bool(true));
        assert_eq!(eval("1 == '1'").unwrap(), Primitive::Bool(false));
        assert_eq!(eval("1 ~= 2").unwrap(), Primitive::Bool(true));
    }

    #[test]
    fn test_numeric_strings_coerce() {
        assert_eq!(num("'2' * 3"), 6.0);
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(
            eval("true + 1"),
            Err(ScriptError::TypeMismatch { op: "+", .. })
        ));
        assert!(matches!(
            eval("'a' < 1"),
            Err(ScriptError::TypeMismatch { op: "<", .. })
        ));
        assert!(matches!(
            eval("-'abc'"),
            Err(ScriptError::UnaryTypeMismatch { .. })
        ));
        assert!(matches!(
            eval("math.Abs('x')"),
            Err(ScriptError::NoOverload { .. })
        ));
    }

    #[test]
    fn test_host_failure_propagates() {
        match eval("fc.Failing(1)") {
            Err(ScriptError::Host(err)) => assert_eq!(err.message, "sensor offline"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_stack_limit() {
        let hosts = hosts();
        let program = compile(&tokenize("1 + (2 + (3 + 4))").unwrap(), &hosts).unwrap();
        assert_eq!(
            Evaluator::new(2).evaluate(&program).unwrap_err(),
            ScriptError::StackOverflow
        );
        assert_eq!(
            Evaluator::new(4).evaluate(&program).unwrap(),
            Primitive::Double(10.0)
        );
    }
}
