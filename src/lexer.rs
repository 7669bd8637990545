//! Tokenizer
//!
//! Turns expression text into a normalized token stream using logos.
//! Normalization happens here so later stages never see formatting noise:
//!
//! - whitespace is dropped
//! - single- and double-quoted strings become one `QuotedString` token
//!   holding the unescaped content
//! - `true`, `false`, `and`, `or`, `not` become keywords in any letter case
//! - numbers carry their parsed value, so `0`, `0.0` and `0.00` are equal
//! - a `-` directly in front of a number is folded into the literal

use crate::error::LexError;
use crate::value::format_number;
use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
    #[token(".")]
    Dot,
    #[token("..")]
    Concat,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    #[token("~=")]
    NotEq,

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Strip the surrounding quotes and resolve escapes
fn unescape(quoted: &str) -> Option<String> {
    let content = &quoted[1..quoted.len() - 1];
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => result.push('\n'),
                't' => result.push('\t'),
                'r' => result.push('\r'),
                other => result.push(other),
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

/// Operator and punctuation symbols
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Dot,
    Concat,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NotEq,
}

impl Symbol {
    pub fn text(&self) -> &'static str {
        match self {
            Symbol::Dot => ".",
            Symbol::Concat => "..",
            Symbol::Comma => ",",
            Symbol::LParen => "(",
            Symbol::RParen => ")",
            Symbol::Plus => "+",
            Symbol::Minus => "-",
            Symbol::Star => "*",
            Symbol::Slash => "/",
            Symbol::Percent => "%",
            Symbol::Caret => "^",
            Symbol::Lt => "<",
            Symbol::Le => "<=",
            Symbol::Gt => ">",
            Symbol::Ge => ">=",
            Symbol::Eq => "==",
            Symbol::NotEq => "~=",
        }
    }
}

/// Reserved words, recognized case-insensitively
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    True,
    False,
    And,
    Or,
    Not,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Keyword> {
        match ident.to_ascii_lowercase().as_str() {
            "true" => Some(Keyword::True),
            "false" => Some(Keyword::False),
            "and" => Some(Keyword::And),
            "or" => Some(Keyword::Or),
            "not" => Some(Keyword::Not),
            _ => None,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
        }
    }
}

/// Token category
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    QuotedString,
    Symbol,
    Keyword,
}

/// A normalized token
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Identifier(String),
    Number(f64),
    QuotedString(String),
    Symbol(Symbol),
    Keyword(Keyword),
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Identifier(_) => TokenKind::Identifier,
            Token::Number(_) => TokenKind::Number,
            Token::QuotedString(_) => TokenKind::QuotedString,
            Token::Symbol(_) => TokenKind::Symbol,
            Token::Keyword(_) => TokenKind::Keyword,
        }
    }

    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        matches!(self, Token::Symbol(s) if *s == symbol)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, Token::Keyword(k) if *k == keyword)
    }

    /// Canonical text of this single token
    pub fn text(&self) -> String {
        match self {
            Token::Identifier(name) => name.clone(),
            Token::Number(value) => number_text(*value),
            Token::QuotedString(content) => quote(content),
            Token::Symbol(symbol) => symbol.text().to_string(),
            Token::Keyword(keyword) => keyword.text().to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Literal text that tokenizes back to the same number. Unlike value
/// formatting, a folded `-0` keeps its sign: it still marks a subtraction.
fn number_text(value: f64) -> String {
    if value == 0.0 && value.is_sign_negative() {
        return "-0".to_string();
    }
    format_number(value)
}

/// Double-quote a string, escaping what `unescape` resolves
pub fn quote(content: &str) -> String {
    let mut result = String::with_capacity(content.len() + 2);
    result.push('"');
    for c in content.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            '\r' => result.push_str("\\r"),
            other => result.push(other),
        }
    }
    result.push('"');
    result
}

/// Tokenize an expression.
///
/// Negative-number folding is purely lexical: `a - 1` and `a -1` both
/// produce `[a, -1]`. The interpreter reads a folded literal that directly
/// follows an operand as a subtraction.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pending_minus = false;
    let mut lexer = RawToken::lexer(text);

    while let Some(raw) = lexer.next() {
        let raw = raw.map_err(|()| LexError::UnexpectedChar {
            found: lexer.slice().to_string(),
            offset: lexer.span().start,
        })?;

        let token = match raw {
            RawToken::Number(value) if !value.is_finite() => {
                return Err(LexError::NumberOutOfRange {
                    text: lexer.slice().to_string(),
                    offset: lexer.span().start,
                })
            }
            RawToken::Number(value) if pending_minus => {
                pending_minus = false;
                tokens.push(Token::Number(-value));
                continue;
            }
            RawToken::Minus => {
                if pending_minus {
                    tokens.push(Token::Symbol(Symbol::Minus));
                }
                pending_minus = true;
                continue;
            }
            RawToken::Number(value) => Token::Number(value),
            RawToken::Str(content) => Token::QuotedString(content),
            RawToken::Ident(name) => match Keyword::from_ident(&name) {
                Some(keyword) => Token::Keyword(keyword),
                None => Token::Identifier(name),
            },
            RawToken::Dot => Token::Symbol(Symbol::Dot),
            RawToken::Concat => Token::Symbol(Symbol::Concat),
            RawToken::Comma => Token::Symbol(Symbol::Comma),
            RawToken::LParen => Token::Symbol(Symbol::LParen),
            RawToken::RParen => Token::Symbol(Symbol::RParen),
            RawToken::Plus => Token::Symbol(Symbol::Plus),
            RawToken::Star => Token::Symbol(Symbol::Star),
            RawToken::Slash => Token::Symbol(Symbol::Slash),
            RawToken::Percent => Token::Symbol(Symbol::Percent),
            RawToken::Caret => Token::Symbol(Symbol::Caret),
            RawToken::Lt => Token::Symbol(Symbol::Lt),
            RawToken::Le => Token::Symbol(Symbol::Le),
            RawToken::Gt => Token::Symbol(Symbol::Gt),
            RawToken::Ge => Token::Symbol(Symbol::Ge),
            RawToken::EqEq => Token::Symbol(Symbol::Eq),
            RawToken::NotEq => Token::Symbol(Symbol::NotEq),
        };

        if pending_minus {
            tokens.push(Token::Symbol(Symbol::Minus));
            pending_minus = false;
        }
        tokens.push(token);
    }

    if pending_minus {
        tokens.push(Token::Symbol(Symbol::Minus));
    }

    if tokens.is_empty() {
        return Err(LexError::Empty);
    }
    Ok(tokens)
}
