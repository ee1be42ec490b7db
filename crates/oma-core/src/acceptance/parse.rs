//! Textual acceptance conditions: the parser for the
//! `t | f | Inf(n) | Fin(n) | (acc) | acc & acc | acc | acc` grammar
//! (where `&` binds tighter than `|`) and the printer it round-trips with.

use std::fmt::{self, Display};

use thiserror::Error;

use super::Acceptance;
use crate::marks::{MAX_SETS, MarkSet};

/// A syntax error, carrying the byte offset of the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at offset {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

/// Parses an acceptance formula from its textual form.
///
/// # Example
/// ```
/// use oma_core::acceptance::parse_acceptance;
///
/// let code = parse_acceptance("(Fin(0) & Inf(1)) | Fin(2)").unwrap();
/// assert_eq!(parse_acceptance(&code.to_string()).unwrap(), code);
/// assert!(parse_acceptance("Inf(0) &").is_err());
/// ```
pub fn parse_acceptance(input: &str) -> Result<Acceptance, ParseError> {
    let mut p = Parser { input: input.as_bytes(), pos: 0 };
    p.skip_space();
    let code = p.disjunction()?;
    p.skip_space();
    if p.pos < p.input.len() {
        return Err(p.error("unexpected trailing input"));
    }
    Ok(code)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> ParseError {
        ParseError { position: self.pos, message: message.to_string() }
    }

    fn skip_space(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Result<(), ParseError> {
        if self.peek() != Some(c) {
            return Err(self.error(&format!("expected '{}'", c as char)));
        }
        self.pos += 1;
        self.skip_space();
        Ok(())
    }

    fn disjunction(&mut self) -> Result<Acceptance, ParseError> {
        let mut code = self.conjunction()?;
        while self.peek() == Some(b'|') {
            self.pos += 1;
            self.skip_space();
            code = code.or(self.conjunction()?);
        }
        Ok(code)
    }

    fn conjunction(&mut self) -> Result<Acceptance, ParseError> {
        let mut code = self.primary()?;
        while self.peek() == Some(b'&') {
            self.pos += 1;
            self.skip_space();
            code = code.and(self.primary()?);
        }
        Ok(code)
    }

    fn primary(&mut self) -> Result<Acceptance, ParseError> {
        let res = match self.peek() {
            Some(b't') => {
                self.pos += 1;
                Acceptance::Top
            }
            Some(b'f') => {
                self.pos += 1;
                Acceptance::Bottom
            }
            Some(b'(') => {
                self.pos += 1;
                self.skip_space();
                let inner = self.disjunction()?;
                self.expect(b')')?;
                return Ok(inner);
            }
            Some(b'I') if self.input[self.pos..].starts_with(b"Inf") => {
                self.pos += 3;
                Acceptance::inf(MarkSet::singleton(self.number()?))
            }
            Some(b'F') if self.input[self.pos..].starts_with(b"Fin") => {
                self.pos += 3;
                Acceptance::fin(MarkSet::singleton(self.number()?))
            }
            _ => return Err(self.error("expected 't', 'f', 'Inf', 'Fin' or '('")),
        };
        self.skip_space();
        Ok(res)
    }

    fn number(&mut self) -> Result<u32, ParseError> {
        self.skip_space();
        self.expect(b'(')?;
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            value = value * 10 + (c - b'0') as u64;
            if value >= MAX_SETS as u64 {
                return Err(self.error("acceptance set number too large"));
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an acceptance set number"));
        }
        self.skip_space();
        self.expect(b')')?;
        Ok(value as u32)
    }
}

impl Display for Acceptance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_rec(self, f, true)
    }
}

fn fmt_rec(code: &Acceptance, f: &mut fmt::Formatter<'_>, top: bool) -> fmt::Result {
    match code {
        Acceptance::Top => write!(f, "t"),
        Acceptance::Bottom => write!(f, "f"),
        Acceptance::Inf(m) => fmt_atom(f, "Inf", "&", *m, top),
        Acceptance::Fin(m) => fmt_atom(f, "Fin", "|", *m, top),
        Acceptance::And(cs) => fmt_nary(f, cs, " & ", top),
        Acceptance::Or(cs) => fmt_nary(f, cs, " | ", top),
    }
}

// A multi-set atom prints as the combination of its singletons, e.g.
// Inf({0,2}) as "Inf(0)&Inf(2)".
fn fmt_atom(f: &mut fmt::Formatter<'_>, name: &str, op: &str, m: MarkSet, top: bool) -> fmt::Result {
    let parens = !top && m.count() > 1;
    if parens {
        write!(f, "(")?;
    }
    let mut sep = "";
    for s in m.sets() {
        write!(f, "{sep}{name}({s})")?;
        sep = op;
    }
    if parens {
        write!(f, ")")?;
    }
    Ok(())
}

fn fmt_nary(f: &mut fmt::Formatter<'_>, cs: &[Acceptance], op: &str, top: bool) -> fmt::Result {
    if !top {
        write!(f, "(")?;
    }
    let mut sep = "";
    for c in cs {
        write!(f, "{sep}")?;
        fmt_rec(c, f, false)?;
        sep = op;
    }
    if !top {
        write!(f, ")")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_constants_and_atoms() {
        assert_eq!(parse_acceptance("t").unwrap(), Acceptance::Top);
        assert_eq!(parse_acceptance(" f ").unwrap(), Acceptance::Bottom);
        assert_eq!(
            parse_acceptance("Inf(3)").unwrap(),
            Acceptance::inf(MarkSet::singleton(3))
        );
        assert_eq!(
            parse_acceptance("Fin ( 2 )").unwrap(),
            Acceptance::fin(MarkSet::singleton(2))
        );
    }

    #[test]
    fn precedence_and_grouping() {
        // '&' binds tighter than '|': the top operator here is Or.
        let code = parse_acceptance("(Fin(0) & Inf(1)) | Fin(2)").unwrap();
        assert_eq!(code, parse_acceptance("Fin(0) & Inf(1) | Fin(2)").unwrap());
        assert!(matches!(code, Acceptance::Or(_)));

        let grouped = parse_acceptance("Fin(0) & (Inf(1) | Fin(2))").unwrap();
        assert!(matches!(grouped, Acceptance::And(_)));
        assert_ne!(code, grouped);
    }

    #[test]
    fn canonicalizes_while_parsing() {
        assert_eq!(
            parse_acceptance("Inf(0) & Inf(1)").unwrap(),
            Acceptance::inf(MarkSet::from_iter([0, 1]))
        );
        assert_eq!(
            parse_acceptance("Fin(0) | Fin(2)").unwrap(),
            Acceptance::fin(MarkSet::from_iter([0, 2]))
        );
        assert_eq!(parse_acceptance("t & Inf(1)").unwrap(), parse_acceptance("Inf(1)").unwrap());
        assert_eq!(parse_acceptance("f | Fin(1)").unwrap(), parse_acceptance("Fin(1)").unwrap());
    }

    #[test]
    fn reports_error_positions() {
        let err = parse_acceptance("Inf(0) & ").unwrap_err();
        assert_eq!(err.position, 9);
        let err = parse_acceptance("Inf(!0)").unwrap_err();
        assert_eq!(err.position, 4);
        let err = parse_acceptance("Inf(0) Inf(1)").unwrap_err();
        assert_eq!(err.position, 7);
        assert!(parse_acceptance("Inf(99)").is_err());
        assert!(parse_acceptance("").is_err());
    }

    #[test]
    fn print_parse_round_trip() {
        for s in [
            "t",
            "f",
            "Inf(0)",
            "Inf(0)&Inf(1)",
            "(Fin(0) & Inf(1)) | Fin(2)",
            "Fin(0) & (Inf(1)|Inf(2))",
            "(Fin(0)|Fin(1)) & Inf(2) & (Inf(3) | Fin(4))",
        ] {
            let once = parse_acceptance(s).unwrap();
            let again = parse_acceptance(&once.to_string()).unwrap();
            assert_eq!(once, again, "round-trip of {s} via {once}");
        }
    }
}
