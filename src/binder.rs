//! Native Binder
//!
//! Matches token sequences shaped like `ns.method(arg)` (or arithmetic
//! chains of such calls) against the host registry and produces a
//! `Binding` that calls the host method directly, bypassing the
//! interpreter. A failed match is never an error: `bind` returns `None` and
//! the caller falls back to compiling a script.

use crate::host::HostRegistry;
use crate::lexer::{Keyword, Symbol, Token};
use crate::value::{ParamType, Primitive};
use crate::variable::{
    BoundArg, Binding, ChainOp, ChainOperand, Tier, Variable, VariableId, VariableKind,
};
use tracing::debug;

/// Resolves nested sub-expressions while binding
pub(crate) trait ResolveNested {
    /// Get or create the variable for a sub-expression
    fn resolve_nested(&mut self, tokens: &[Token]) -> Option<VariableId>;

    fn variable(&self, id: VariableId) -> &Variable;
}

pub(crate) struct NativeBinder<'h> {
    hosts: &'h HostRegistry,
}

impl<'h> NativeBinder<'h> {
    pub(crate) fn new(hosts: &'h HostRegistry) -> Self {
        NativeBinder { hosts }
    }

    /// Try to bind a whole expression. Returns the binding and the tier it
    /// belongs to, or `None` to fall back.
    pub(crate) fn bind(
        &self,
        tokens: &[Token],
        nested: &mut impl ResolveNested,
    ) -> Option<(Binding, Tier)> {
        if !depth_never_negative(tokens) {
            debug!(reason = "unbalanced parentheses", "native bind skipped");
            return None;
        }
        if is_call_shape(tokens) {
            return self.bind_call(tokens, nested);
        }
        self.bind_chain(tokens, nested)
    }

    fn bind_call(
        &self,
        tokens: &[Token],
        nested: &mut impl ResolveNested,
    ) -> Option<(Binding, Tier)> {
        let (namespace, method) = match (&tokens[0], &tokens[2]) {
            (Token::Identifier(ns), Token::Identifier(m)) => (ns.as_str(), m.as_str()),
            _ => return None,
        };
        if !self.hosts.contains(namespace) {
            debug!(namespace, reason = "unknown namespace", "native bind skipped");
            return None;
        }

        let args = split_top_level(&tokens[4..tokens.len() - 1], |t| {
            t.is_symbol(Symbol::Comma)
        });
        let arg = match args.as_slice() {
            [] => BoundArg::None,
            [only] => self.bind_arg(only, nested)?,
            _ => {
                debug!(namespace, method, reason = "more than one parameter", "native bind skipped");
                return None;
            }
        };

        let params: Vec<ParamType> = match &arg {
            BoundArg::None => Vec::new(),
            BoundArg::Const(value) => vec![value.param_type()],
            BoundArg::Variable { ty, .. } => vec![*ty],
        };
        let Some(resolved) = self.hosts.find(namespace, method, &params) else {
            debug!(namespace, method, reason = "no exact signature", "native bind skipped");
            return None;
        };

        let tier = match &arg {
            BoundArg::Variable { .. } if resolved.is_pure() => Tier::MathLibrary,
            BoundArg::Variable { id, .. } => tier_after([nested.variable(*id).tier()]),
            _ => Tier::Native,
        };
        Some((
            Binding::Call {
                method: resolved,
                arg,
            },
            tier,
        ))
    }

    fn bind_arg(&self, tokens: &[Token], nested: &mut impl ResolveNested) -> Option<BoundArg> {
        if let [token] = tokens {
            let literal = match token {
                Token::Number(n) => Some(Primitive::Double(*n)),
                Token::QuotedString(s) => Some(Primitive::from(s.as_str())),
                Token::Keyword(Keyword::True) => Some(Primitive::Bool(true)),
                Token::Keyword(Keyword::False) => Some(Primitive::Bool(false)),
                _ => None,
            };
            if let Some(value) = literal {
                return Some(BoundArg::Const(value));
            }
        }

        let id = nested.resolve_nested(tokens)?;
        let variable = nested.variable(id);
        if !variable.is_valid() {
            debug!(argument = variable.name(), reason = "invalid argument", "native bind skipped");
            return None;
        }
        if !variable.is_mutable() {
            return Some(BoundArg::Const(variable.raw_value().clone()));
        }
        // The parameter type is read off the current value, so it must be real
        if !variable.has_value() {
            debug!(
                argument = variable.name(),
                reason = "argument never evaluated",
                "native bind skipped"
            );
            return None;
        }
        Some(BoundArg::Variable {
            id,
            ty: variable.raw_value().param_type(),
        })
    }

    fn bind_chain(
        &self,
        tokens: &[Token],
        nested: &mut impl ResolveNested,
    ) -> Option<(Binding, Tier)> {
        let mut operators = Vec::new();
        let mut depth = 0usize;
        for token in tokens {
            match token {
                Token::Symbol(Symbol::LParen) => depth += 1,
                Token::Symbol(Symbol::RParen) => depth = depth.saturating_sub(1),
                Token::Symbol(Symbol::Star) if depth == 0 => operators.push(ChainOp::Mul),
                Token::Symbol(Symbol::Slash) if depth == 0 => operators.push(ChainOp::Div),
                Token::Symbol(Symbol::Plus) if depth == 0 => operators.push(ChainOp::Add),
                _ => {}
            }
        }
        if operators.is_empty() {
            return None;
        }

        let operands = split_top_level(tokens, |t| {
            t.is_symbol(Symbol::Star) || t.is_symbol(Symbol::Slash) || t.is_symbol(Symbol::Plus)
        });
        if operands
            .iter()
            .any(|operand| !(is_number(operand) || is_call_shape(operand)))
        {
            debug!(reason = "chain operand is not a literal or call", "native bind skipped");
            return None;
        }

        if !operands.iter().any(|operand| is_call_shape(operand)) {
            debug!(reason = "chain has no call operand", "native bind skipped");
            return None;
        }

        let mut bound = Vec::with_capacity(operands.len());
        let mut input_tiers = Vec::new();
        for operand in operands {
            if let [Token::Number(n)] = operand {
                bound.push(ChainOperand::Const(Primitive::Double(*n)));
                continue;
            }
            let id = nested.resolve_nested(operand)?;
            let variable = nested.variable(id);
            let numeric = variable.is_valid()
                && variable.kind() == VariableKind::NativeBound
                && variable.has_value()
                && variable.raw_value().as_number().is_some();
            if !numeric {
                debug!(
                    operand = variable.name(),
                    reason = "chain operand not a native number",
                    "native bind skipped"
                );
                return None;
            }
            input_tiers.push(variable.tier());
            bound.push(ChainOperand::Variable(id));
        }

        let mut bound = bound.into_iter();
        let first = bound.next()?;
        let rest = operators.into_iter().zip(bound).collect();
        Some((Binding::Chain { first, rest }, tier_after(input_tiers)))
    }
}

/// The earliest tier that runs after every input has been refreshed in the
/// same tick. Tiers run native, then the script slice, then math library.
fn tier_after(inputs: impl IntoIterator<Item = Option<Tier>>) -> Tier {
    let late = inputs
        .into_iter()
        .any(|tier| matches!(tier, Some(Tier::Script | Tier::MathLibrary)));
    if late {
        Tier::MathLibrary
    } else {
        Tier::Native
    }
}

/// `Identifier '.' Identifier '(' ... ')'` where the opening parenthesis
/// closes on the final token
fn is_call_shape(tokens: &[Token]) -> bool {
    if tokens.len() < 5 {
        return false;
    }
    let head = matches!(tokens[0], Token::Identifier(_))
        && tokens[1].is_symbol(Symbol::Dot)
        && matches!(tokens[2], Token::Identifier(_))
        && tokens[3].is_symbol(Symbol::LParen);
    if !head {
        return false;
    }

    let mut depth = 0usize;
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate().skip(3) {
        if token.is_symbol(Symbol::LParen) {
            depth += 1;
        } else if token.is_symbol(Symbol::RParen) {
            match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            }
            if depth == 0 {
                return i == last;
            }
        }
    }
    false
}

fn is_number(tokens: &[Token]) -> bool {
    matches!(tokens, [Token::Number(_)])
}

fn depth_never_negative(tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    for token in tokens {
        if token.is_symbol(Symbol::LParen) {
            depth += 1;
        } else if token.is_symbol(Symbol::RParen) {
            depth -= 1;
            if depth < 0 {
                return false;
            }
        }
    }
    true
}

/// Split at separators outside any parentheses
fn split_top_level(tokens: &[Token], is_separator: impl Fn(&Token) -> bool) -> Vec<&[Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_symbol(Symbol::LParen) {
            depth += 1;
        } else if token.is_symbol(Symbol::RParen) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && is_separator(token) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}
