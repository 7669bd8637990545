//! Canonicalizer
//!
//! Rebuilds expression text from its tokens with fixed spacing rules so that
//! formatting differences never produce two cache entries for one expression.

use crate::lexer::{Keyword, Symbol, Token};

/// True when `token` closes an operand (something a binary operator may follow)
fn ends_operand(token: &Token) -> bool {
    match token {
        Token::Identifier(_) | Token::Number(_) | Token::QuotedString(_) => true,
        Token::Keyword(k) => matches!(k, Keyword::True | Keyword::False),
        Token::Symbol(s) => *s == Symbol::RParen,
    }
}

fn is_binary_symbol(symbol: Symbol) -> bool {
    !matches!(
        symbol,
        Symbol::Dot | Symbol::Comma | Symbol::LParen | Symbol::RParen
    )
}

/// Canonical text of a token stream.
///
/// - `,` becomes `, `
/// - binary operators and `and`/`or` are surrounded by single spaces
/// - unary `-` and `not ` attach to their operand
/// - `.` and parentheses never carry spaces
/// - two adjacent operands are separated by one space (`x -1`)
pub fn canonicalize(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;

    for token in tokens {
        let after_operand = prev.is_some_and(ends_operand);
        match token {
            Token::Symbol(Symbol::Comma) => out.push_str(", "),
            Token::Symbol(symbol) if is_binary_symbol(*symbol) && after_operand => {
                out.push(' ');
                out.push_str(symbol.text());
                out.push(' ');
            }
            Token::Symbol(symbol) => out.push_str(symbol.text()),
            Token::Keyword(Keyword::And) | Token::Keyword(Keyword::Or) => {
                out.push(' ');
                out.push_str(&token.text());
                out.push(' ');
            }
            Token::Keyword(Keyword::Not) => {
                if after_operand {
                    out.push(' ');
                }
                out.push_str("not ");
            }
            other => {
                if after_operand {
                    out.push(' ');
                }
                out.push_str(&other.text());
            }
        }
        prev = Some(token);
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn canon(text: &str) -> String {
        canonicalize(&tokenize(text).unwrap())
    }

    #[test]
    fn test_whitespace_insensitive() {
        assert_eq!(canon("nav.Heading( )"), "nav.Heading()");
        assert_eq!(canon("  nav . Heading ()"), "nav.Heading()");
        assert_eq!(canon("fc.Select(1,2)"), "fc.Select(1, 2)");
        assert_eq!(canon("fc.Select( 1 ,   2 )"), "fc.Select(1, 2)");
    }

    #[test]
    fn test_operator_spacing() {
        assert_eq!(canon("a*b"), "a * b");
        assert_eq!(canon("a*-b"), "a * -b");
        assert_eq!(canon("a..'x'"), "a .. \"x\"");
        assert_eq!(canon("not  a AND b"), "not a and b");
        assert_eq!(canon("(a+b)/2"), "(a + b) / 2");
    }

    #[test]
    fn test_folded_subtraction_stays_stable() {
        assert_eq!(canon("x - 1"), "x -1");
        assert_eq!(canon("x-1"), "x -1");
        // Canonical text tokenizes back to the same canonical text
        assert_eq!(canon(&canon("x - 1")), "x -1");
    }

    #[test]
    fn test_canonical_text_is_a_fixed_point() {
        for text in [
            "nav.Heading() - 0",
            "x - 0.0",
            "-0",
            "a--1",
            "math.Max(nav.Heading(),-0) * 1e300",
            "0.000001 + 123456789.125",
            "not(a)or b",
        ] {
            let once = canon(text);
            assert_eq!(canon(&once), once, "{}", text);
        }
        // Subtracting zero is not the same expression as juxtaposing it
        assert_eq!(canon("nav.Heading() - 0"), "nav.Heading() -0");
        assert_ne!(canon("nav.Heading() - 0"), canon("nav.Heading() 0"));
    }

    #[test]
    fn test_literals() {
        assert_eq!(canon("0.00"), "0");
        assert_eq!(canon("'abc'"), "\"abc\"");
        assert_eq!(canon("True"), "true");
    }
}
