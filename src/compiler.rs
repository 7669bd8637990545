//! Expression Compiler: Tokens → Bytecode
//!
//! Recursive-descent compiler for the general expression language used when
//! the native binder cannot take an expression. Ops are emitted while parsing;
//! host calls are resolved against the registry at compile time so unknown
//! namespaces and methods are reported before the expression ever runs.
//!
//! Precedence, lowest first: `or`, `and`, comparison, `..` (right
//! associative), `+ -`, `* / %`, unary `- not`, `^` (right associative).

use crate::bytecode::{Op, Program};
use crate::error::CompileError;
use crate::host::{HostMethod, HostRegistry};
use crate::lexer::{Keyword, Symbol, Token};
use crate::value::Primitive;
use std::rc::Rc;

/// Compiler state for one expression
pub struct ExpressionCompiler<'h> {
    hosts: &'h HostRegistry,
    ops: Vec<Op>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'h> ExpressionCompiler<'h> {
    pub fn new(hosts: &'h HostRegistry) -> Self {
        ExpressionCompiler {
            hosts,
            ops: Vec::new(),
            pos: 0,
            depth: 0,
            max_depth: 0,
        }
    }

    /// Compile a token stream into a program
    pub fn compile(&mut self, tokens: &[Token]) -> Result<Program, CompileError> {
        // Reset state
        self.ops.clear();
        self.pos = 0;
        self.depth = 0;
        self.max_depth = 0;

        self.parse_and_emit_or(tokens)?;
        if let Some(extra) = tokens.get(self.pos) {
            return Err(CompileError::UnexpectedToken {
                found: extra.text(),
                expected: "end of expression",
            });
        }

        Ok(Program::new(std::mem::take(&mut self.ops), self.max_depth))
    }

    // === Emission ===

    fn emit(&mut self, op: Op) {
        match &op {
            Op::LoadConst(_) => self.push_depth(1),
            Op::Call { argc, .. } => {
                self.depth -= argc;
                self.push_depth(1);
            }
            Op::Neg | Op::Not => {}
            // Short-circuit ops pop on the fall-through path
            _ => self.depth -= 1,
        }
        self.ops.push(op);
    }

    fn push_depth(&mut self, n: usize) {
        self.depth += n;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn patch_jump(&mut self, at: usize) {
        let target = self.ops.len();
        match &mut self.ops[at] {
            Op::AndJump(t) | Op::OrJump(t) => *t = target,
            _ => unreachable!("patched op is always a jump"),
        }
    }

    // === Token helpers ===

    fn peek<'t>(&self, tokens: &'t [Token]) -> Option<&'t Token> {
        tokens.get(self.pos)
    }

    fn eat_symbol(&mut self, tokens: &[Token], symbol: Symbol) -> bool {
        if self.peek(tokens).is_some_and(|t| t.is_symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(
        &mut self,
        tokens: &[Token],
        symbol: Symbol,
        expected: &'static str,
    ) -> Result<(), CompileError> {
        if self.eat_symbol(tokens, symbol) {
            return Ok(());
        }
        Err(self.unexpected(tokens, expected))
    }

    fn expect_identifier(
        &mut self,
        tokens: &[Token],
        expected: &'static str,
    ) -> Result<String, CompileError> {
        match self.peek(tokens) {
            Some(Token::Identifier(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(self.unexpected(tokens, expected)),
        }
    }

    fn unexpected(&self, tokens: &[Token], expected: &'static str) -> CompileError {
        match self.peek(tokens) {
            Some(token) => CompileError::UnexpectedToken {
                found: token.text(),
                expected,
            },
            None => CompileError::UnexpectedEnd { expected },
        }
    }

    // === Grammar ===

    fn parse_and_emit_or(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        self.parse_and_emit_and(tokens)?;
        while self.peek(tokens).is_some_and(|t| t.is_keyword(Keyword::Or)) {
            self.pos += 1;
            let jump = self.ops.len();
            self.emit(Op::OrJump(0));
            self.parse_and_emit_and(tokens)?;
            self.patch_jump(jump);
        }
        Ok(())
    }

    fn parse_and_emit_and(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        self.parse_and_emit_comparison(tokens)?;
        while self.peek(tokens).is_some_and(|t| t.is_keyword(Keyword::And)) {
            self.pos += 1;
            let jump = self.ops.len();
            self.emit(Op::AndJump(0));
            self.parse_and_emit_comparison(tokens)?;
            self.patch_jump(jump);
        }
        Ok(())
    }

    fn parse_and_emit_comparison(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        self.parse_and_emit_concat(tokens)?;
        loop {
            let op = match self.peek(tokens) {
                Some(Token::Symbol(Symbol::Lt)) => Op::Lt,
                Some(Token::Symbol(Symbol::Le)) => Op::Le,
                Some(Token::Symbol(Symbol::Gt)) => Op::Gt,
                Some(Token::Symbol(Symbol::Ge)) => Op::Ge,
                Some(Token::Symbol(Symbol::Eq)) => Op::Eq,
                Some(Token::Symbol(Symbol::NotEq)) => Op::NotEq,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.parse_and_emit_concat(tokens)?;
            self.emit(op);
        }
    }

    fn parse_and_emit_concat(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        self.parse_and_emit_additive(tokens)?;
        if self.eat_symbol(tokens, Symbol::Concat) {
            self.parse_and_emit_concat(tokens)?;
            self.emit(Op::Concat);
        }
        Ok(())
    }

    fn parse_and_emit_additive(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        self.parse_and_emit_multiplicative(tokens, None)?;
        loop {
            match self.peek(tokens) {
                Some(Token::Symbol(Symbol::Plus)) => {
                    self.pos += 1;
                    self.parse_and_emit_multiplicative(tokens, None)?;
                    self.emit(Op::Add);
                }
                Some(Token::Symbol(Symbol::Minus)) => {
                    self.pos += 1;
                    self.parse_and_emit_multiplicative(tokens, None)?;
                    self.emit(Op::Sub);
                }
                // The lexer folded the minus of `a - 1` into the literal;
                // a negative literal right after an operand is a subtraction.
                Some(Token::Number(n)) if n.is_sign_negative() => {
                    let magnitude = -*n;
                    self.pos += 1;
                    self.parse_and_emit_multiplicative(tokens, Some(magnitude))?;
                    self.emit(Op::Sub);
                }
                _ => return Ok(()),
            }
        }
    }

    /// `seed` is an already consumed literal that starts the first factor
    fn parse_and_emit_multiplicative(
        &mut self,
        tokens: &[Token],
        seed: Option<f64>,
    ) -> Result<(), CompileError> {
        self.parse_and_emit_unary(tokens, seed)?;
        loop {
            let op = match self.peek(tokens) {
                Some(Token::Symbol(Symbol::Star)) => Op::Mul,
                Some(Token::Symbol(Symbol::Slash)) => Op::Div,
                Some(Token::Symbol(Symbol::Percent)) => Op::Mod,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.parse_and_emit_unary(tokens, None)?;
            self.emit(op);
        }
    }

    fn parse_and_emit_unary(&mut self, tokens: &[Token], seed: Option<f64>) -> Result<(), CompileError> {
        if seed.is_none() {
            if self.eat_symbol(tokens, Symbol::Minus) {
                self.parse_and_emit_unary(tokens, None)?;
                self.emit(Op::Neg);
                return Ok(());
            }
            if self.peek(tokens).is_some_and(|t| t.is_keyword(Keyword::Not)) {
                self.pos += 1;
                self.parse_and_emit_unary(tokens, None)?;
                self.emit(Op::Not);
                return Ok(());
            }
        }
        self.parse_and_emit_power(tokens, seed)
    }

    fn parse_and_emit_power(&mut self, tokens: &[Token], seed: Option<f64>) -> Result<(), CompileError> {
        match seed {
            Some(value) => self.emit(Op::LoadConst(Primitive::Double(value))),
            None => self.parse_and_emit_primary(tokens)?,
        }
        if self.eat_symbol(tokens, Symbol::Caret) {
            // Right associative; the exponent may carry its own sign
            self.parse_and_emit_unary(tokens, None)?;
            self.emit(Op::Pow);
        }
        Ok(())
    }

    fn parse_and_emit_primary(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        let token = match self.peek(tokens) {
            Some(token) => token,
            None => return Err(CompileError::UnexpectedEnd { expected: "a value" }),
        };

        match token {
            Token::Number(n) => {
                let value = *n;
                self.pos += 1;
                self.emit(Op::LoadConst(Primitive::Double(value)));
            }
            Token::QuotedString(s) => {
                let value = Primitive::from(s.as_str());
                self.pos += 1;
                self.emit(Op::LoadConst(value));
            }
            Token::Keyword(Keyword::True) => {
                self.pos += 1;
                self.emit(Op::LoadConst(Primitive::Bool(true)));
            }
            Token::Keyword(Keyword::False) => {
                self.pos += 1;
                self.emit(Op::LoadConst(Primitive::Bool(false)));
            }
            Token::Symbol(Symbol::LParen) => {
                self.pos += 1;
                self.parse_and_emit_or(tokens)?;
                self.expect_symbol(tokens, Symbol::RParen, "`)`")?;
            }
            Token::Identifier(_) => self.parse_and_emit_call(tokens)?,
            _ => return Err(self.unexpected(tokens, "a value")),
        }
        Ok(())
    }

    /// `namespace.method(arg, ...)`
    fn parse_and_emit_call(&mut self, tokens: &[Token]) -> Result<(), CompileError> {
        let namespace = self.expect_identifier(tokens, "a namespace")?;
        self.expect_symbol(tokens, Symbol::Dot, "`.` after namespace")?;
        let method = self.expect_identifier(tokens, "a method name")?;
        self.expect_symbol(tokens, Symbol::LParen, "`(`")?;

        let mut argc = 0;
        if !self.eat_symbol(tokens, Symbol::RParen) {
            loop {
                self.parse_and_emit_or(tokens)?;
                argc += 1;
                if self.eat_symbol(tokens, Symbol::RParen) {
                    break;
                }
                self.expect_symbol(tokens, Symbol::Comma, "`,` or `)`")?;
            }
        }

        let overloads = self.resolve_overloads(&namespace, &method, argc)?;
        self.emit(Op::Call { overloads, argc });
        Ok(())
    }

    fn resolve_overloads(
        &self,
        namespace: &str,
        method: &str,
        argc: usize,
    ) -> Result<Rc<[Rc<HostMethod>]>, CompileError> {
        if !self.hosts.contains(namespace) {
            return Err(CompileError::UnknownNamespace(namespace.to_string()));
        }
        let matching: Vec<Rc<HostMethod>> = self
            .hosts
            .overloads(namespace, method)
            .iter()
            .filter(|m| m.params().len() == argc)
            .cloned()
            .collect();
        if matching.is_empty() {
            return Err(CompileError::UnknownMethod {
                namespace: namespace.to_string(),
                method: method.to_string(),
                arity: argc,
            });
        }
        Ok(Rc::from(matching))
    }
}

/// Compile a token stream against `hosts`
pub fn compile(tokens: &[Token], hosts: &HostRegistry) -> Result<Program, CompileError> {
    ExpressionCompiler::new(hosts).compile(tokens)
}
