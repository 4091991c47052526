use std::fmt;

use b33arch::{AddressingMode, IndexByte, Mnemonic, Reg, Step};
use color_print::cformat;

use crate::{
    error::{AsmError, Error},
    lexer::{tokenize_line, Directive, Token, TokenKind, TokenStream},
};

// ----------------------------------------------------------------------------
// Line

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based
    pub number: usize,
    pub label: Option<String>,
    pub stmt: Option<Stmt>,
    pub comment: Option<String>,
    pub source: String,
}

impl Line {
    pub fn parse(number: usize, source: &str) -> Result<Line, AsmError> {
        let tokens = tokenize_line(source, number)?;
        Self::parse_tokens(number, source, tokens).map_err(|e| e.at(number))
    }

    fn parse_tokens(number: usize, source: &str, tokens: Vec<Token>) -> Result<Line, Error> {
        let mut ts = TokenStream::new(tokens);
        let label = parse_label(&mut ts);
        ts.skip_whitespace();

        let stmt = match ts.peek_kind().cloned() {
            None => None,
            Some(kind) if kind.is_trivia() => None,
            Some(TokenKind::Mnemonic(m)) => {
                ts.consume();
                Some(Stmt::Op(m, parse_operand(&mut ts)?))
            }
            Some(TokenKind::Directive(d)) => {
                ts.consume();
                Some(parse_directive(d, &label, &mut ts)?)
            }
            Some(TokenKind::Label(name)) => return Err(Error::UnknownMnemonic(name)),
            Some(_) => return Err(unexpected(&ts)),
        };

        ts.skip_whitespace();
        if !ts.is_at_end() {
            return Err(unexpected(&ts));
        }

        Ok(Line {
            number,
            label,
            stmt,
            comment: ts.comment(),
            source: source.to_string(),
        })
    }
}

/// A word in column 0 that is not a mnemonic or directive, or any word
/// followed by a colon.
fn parse_label(ts: &mut TokenStream) -> Option<String> {
    let in_column0 =
        matches!(ts.peek(), Some(t) if t.column == 0 && matches!(t.kind, TokenKind::Label(_)));
    ts.skip_whitespace();
    let colon_follows = ts.peek_at(1).map(|t| &t.kind) == Some(&TokenKind::Colon);
    match ts.peek_kind() {
        Some(TokenKind::Label(name)) if in_column0 || colon_follows => {
            let name = name.clone();
            ts.consume();
            ts.eat(&TokenKind::Colon);
            Some(name)
        }
        _ => None,
    }
}

fn unexpected(ts: &TokenStream) -> Error {
    match ts.peek() {
        Some(tok) => Error::Syntax(format!("unexpected `{}`", tok.text)),
        None => Error::Syntax("unexpected end of line".to_string()),
    }
}

// ----------------------------------------------------------------------------
// Statement

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Op(Mnemonic, Operand),
    /// Reserve n zero bytes.
    Rmb(Expr),
    /// Text bytes plus a zero terminator.
    Str(String),
    Chr(Vec<Expr>),
    End(Option<Expr>),
    Equ(Expr),
}

impl Stmt {
    pub fn cformat(&self) -> String {
        match self {
            Stmt::Op(m, Operand::Inherent) => cformat!("<red>{:<6}</>", m.to_string()),
            Stmt::Op(m, operand) => {
                cformat!("<red>{:<6}</><blue>{}</>", m.to_string(), operand)
            }
            Stmt::Rmb(n) => cformat!("<c>{:<6}</><y>{}</>", "RMB", n),
            Stmt::Str(text) => cformat!("<c>{:<6}</><y>\"{}\"</>", "STR", text),
            Stmt::Chr(values) => cformat!("<c>{:<6}</><y>{}</>", "CHR", join(values)),
            Stmt::End(Some(e)) => cformat!("<c>{:<6}</><g>{}</>", "END", e),
            Stmt::End(None) => cformat!("<c>END</>"),
            Stmt::Equ(e) => cformat!("<c>{:<6}</><y>{}</>", "EQU", e),
        }
    }
}

fn join(values: &[Expr]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_directive(
    d: Directive,
    label: &Option<String>,
    ts: &mut TokenStream,
) -> Result<Stmt, Error> {
    ts.skip_whitespace();
    match d {
        Directive::Rmb => Ok(Stmt::Rmb(parse_expr(ts)?)),
        Directive::Str => match ts.consume().map(|t| t.kind) {
            Some(TokenKind::Str(text)) => Ok(Stmt::Str(text)),
            _ => Err(Error::InvalidDirective(
                "STR expects a quoted string".to_string(),
            )),
        },
        Directive::Chr => {
            let mut values = vec![parse_expr(ts)?];
            loop {
                ts.skip_whitespace();
                if !ts.eat(&TokenKind::Comma) {
                    break;
                }
                values.push(parse_expr(ts)?);
            }
            Ok(Stmt::Chr(values))
        }
        Directive::End => {
            if ts.is_at_end() {
                Ok(Stmt::End(None))
            } else {
                Ok(Stmt::End(Some(parse_expr(ts)?)))
            }
        }
        Directive::Equ => {
            if label.is_none() {
                return Err(Error::InvalidDirective("EQU without a name".to_string()));
            }
            Ok(Stmt::Equ(parse_expr(ts)?))
        }
    }
}

// ----------------------------------------------------------------------------
// Operand

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Inherent,
    /// `#expr`
    Immediate(Expr),
    /// Bare expression: extended address, or branch target.
    Address(Expr),
    Indexed(IndexByte),
}

impl Operand {
    pub fn mode(&self, mnemonic: Mnemonic) -> AddressingMode {
        match self {
            Operand::Inherent => AddressingMode::Inherent,
            Operand::Immediate(_) => AddressingMode::Immediate,
            Operand::Indexed(_) => AddressingMode::Indexed,
            Operand::Address(_) if mnemonic.is_branch() => AddressingMode::Relative,
            Operand::Address(_) => AddressingMode::Extended,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Inherent => Ok(()),
            Operand::Immediate(e) => write!(f, "#{e}"),
            Operand::Address(e) => write!(f, "{e}"),
            Operand::Indexed(ib) => write!(f, "{ib}"),
        }
    }
}

fn parse_operand(ts: &mut TokenStream) -> Result<Operand, Error> {
    ts.skip_whitespace();
    match ts.peek_kind() {
        None => Ok(Operand::Inherent),
        Some(kind) if kind.is_trivia() => Ok(Operand::Inherent),
        Some(TokenKind::Hash) => {
            ts.consume();
            Ok(Operand::Immediate(parse_expr(ts)?))
        }
        Some(TokenKind::Comma) => {
            ts.consume();
            parse_index(None, ts)
        }
        Some(&TokenKind::Register(ofs)) => {
            ts.consume();
            if !ts.eat(&TokenKind::Comma) {
                return Err(unexpected(ts));
            }
            parse_index(Some(ofs), ts)
        }
        Some(_) => Ok(Operand::Address(parse_expr(ts)?)),
    }
}

/// Index part after the comma: `X`, `X+`, `X++`, `-X`, `--X`.
fn parse_index(offset: Option<Reg>, ts: &mut TokenStream) -> Result<Operand, Error> {
    ts.skip_whitespace();
    let mut dec = 0;
    while ts.eat(&TokenKind::Minus) {
        dec += 1;
    }
    let index = match ts.peek_kind() {
        Some(&TokenKind::Register(r)) => {
            ts.consume();
            r
        }
        _ => return Err(unexpected(ts)),
    };
    let mut inc = 0;
    while ts.eat(&TokenKind::Plus) {
        inc += 1;
    }
    let step = match (dec, inc) {
        (0, 0) => Step::None,
        (0, n) => Step::PostInc(n),
        (n, 0) => Step::PreDec(n),
        _ => {
            return Err(Error::Syntax(
                "cannot both increment and decrement".to_string(),
            ))
        }
    };
    Ok(Operand::Indexed(IndexByte::new(index, offset, step)?))
}

// ----------------------------------------------------------------------------
// Expression

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    /// `label`, `label+n`, `label-n`
    Symbol(String, i64),
}

impl Expr {
    pub fn eval(&self, lookup: impl Fn(&str) -> Option<i64>) -> Result<i64, Error> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Symbol(name, ofs) => match lookup(name) {
                Some(v) => Ok(v + ofs),
                None => Err(Error::UndefinedLabel(name.clone())),
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) if *n < 0 => write!(f, "{n}"),
            Expr::Number(n) if *n < 10 => write!(f, "{n}"),
            Expr::Number(n) => write!(f, "${n:X}"),
            Expr::Symbol(name, 0) => write!(f, "{name}"),
            Expr::Symbol(name, ofs) if *ofs < 0 => write!(f, "{name}{ofs}"),
            Expr::Symbol(name, ofs) => write!(f, "{name}+{ofs}"),
        }
    }
}

fn parse_expr(ts: &mut TokenStream) -> Result<Expr, Error> {
    ts.skip_whitespace();
    let negative = ts.eat(&TokenKind::Minus);
    let tok = ts.consume();
    match tok.as_ref().map(|t| &t.kind) {
        Some(kind) if kind.number().is_some() => {
            let n = kind.number().unwrap_or_default() as i64;
            Ok(Expr::Number(if negative { -n } else { n }))
        }
        Some(TokenKind::Label(name)) if !negative => {
            let sign = if ts.eat(&TokenKind::Plus) {
                1
            } else if ts.eat(&TokenKind::Minus) {
                -1
            } else {
                return Ok(Expr::Symbol(name.clone(), 0));
            };
            match ts.consume().and_then(|t| t.kind.number()) {
                Some(n) => Ok(Expr::Symbol(name.clone(), sign * n as i64)),
                None => Err(Error::Syntax(format!("expected offset after `{name}`"))),
            }
        }
        Some(_) => Err(Error::Syntax(format!(
            "expected expression, found `{}`",
            tok.as_ref().map_or("", |t| t.text.as_str())
        ))),
        None => Err(Error::Syntax("expected expression".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Line {
        Line::parse(1, src).unwrap()
    }

    #[test]
    fn label_and_immediate() {
        let line = parse("Start LDA #99");
        assert_eq!(line.label.as_deref(), Some("Start"));
        assert_eq!(
            line.stmt,
            Some(Stmt::Op(Mnemonic::LDA, Operand::Immediate(Expr::Number(99))))
        );
    }

    #[test]
    fn indented_mnemonic_has_no_label() {
        let line = parse("  RET ; back");
        assert_eq!(line.label, None);
        assert_eq!(line.stmt, Some(Stmt::Op(Mnemonic::RET, Operand::Inherent)));
        assert_eq!(line.comment.as_deref(), Some(" back"));
    }

    #[test]
    fn colon_label() {
        let line = parse("loop: BNE loop");
        assert_eq!(line.label.as_deref(), Some("loop"));
        let line = parse("   again: NOP");
        assert_eq!(line.label.as_deref(), Some("again"));
    }

    #[test]
    fn label_only_and_blank() {
        assert_eq!(parse("here").label.as_deref(), Some("here"));
        assert_eq!(parse("here").stmt, None);
        assert_eq!(parse("").stmt, None);
        assert_eq!(parse("; just a comment").stmt, None);
    }

    #[test]
    fn indexed_forms() {
        let ib = |idx, ofs, step| Operand::Indexed(IndexByte::new(idx, ofs, step).unwrap());
        let op = |src: &str| match parse(src).stmt {
            Some(Stmt::Op(_, operand)) => operand,
            other => panic!("{other:?}"),
        };
        assert_eq!(op(" STA ,X++"), ib(Reg::X, None, Step::PostInc(2)));
        assert_eq!(op(" LDA ,-Y"), ib(Reg::Y, None, Step::PreDec(1)));
        assert_eq!(op(" LDA B,Y+"), ib(Reg::Y, Some(Reg::B), Step::PostInc(1)));
        assert_eq!(op(" JMP D,X"), ib(Reg::X, Some(Reg::D), Step::None));
    }

    #[test]
    fn illegal_index_forms() {
        assert!(Line::parse(1, " LDA ,A").is_err());
        assert!(Line::parse(1, " LDA X,Y").is_err());
        assert!(Line::parse(1, " LDA ,-X+").is_err());
        assert!(Line::parse(1, " LDA ,X+++").is_err());
    }

    #[test]
    fn expressions() {
        let expr = |src: &str| match parse(src).stmt {
            Some(Stmt::Op(_, Operand::Address(e))) => e,
            other => panic!("{other:?}"),
        };
        assert_eq!(expr(" JMP table+2"), Expr::Symbol("table".into(), 2));
        assert_eq!(expr(" JMP table-$10"), Expr::Symbol("table".into(), -16));
        assert_eq!(expr(" JMP $E000"), Expr::Number(0xE000));
        assert_eq!(
            parse(" LDA #-1").stmt,
            Some(Stmt::Op(Mnemonic::LDA, Operand::Immediate(Expr::Number(-1))))
        );
    }

    #[test]
    fn directives() {
        assert_eq!(parse(" RMB 4").stmt, Some(Stmt::Rmb(Expr::Number(4))));
        assert_eq!(
            parse("msg STR \"Hi\"").stmt,
            Some(Stmt::Str("Hi".to_string()))
        );
        assert_eq!(
            parse(" CHR 1, $FF,%11").stmt,
            Some(Stmt::Chr(vec![
                Expr::Number(1),
                Expr::Number(255),
                Expr::Number(3)
            ]))
        );
        assert_eq!(
            parse(" END Start").stmt,
            Some(Stmt::End(Some(Expr::Symbol("Start".into(), 0))))
        );
        assert_eq!(parse(" end").stmt, Some(Stmt::End(None)));
        assert_eq!(parse("SIZE EQU 80").stmt, Some(Stmt::Equ(Expr::Number(80))));
    }

    #[test]
    fn errors() {
        let err = Line::parse(4, " FOO #1").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(matches!(err.error, Error::UnknownMnemonic(ref s) if s == "FOO"));

        assert!(matches!(
            Line::parse(1, " EQU 3").unwrap_err().error,
            Error::InvalidDirective(_)
        ));
        assert!(matches!(
            Line::parse(1, " STR 3").unwrap_err().error,
            Error::InvalidDirective(_)
        ));
        assert!(matches!(
            Line::parse(1, " LDA #1 2").unwrap_err().error,
            Error::Syntax(_)
        ));
        assert!(matches!(
            Line::parse(1, " LDA #").unwrap_err().error,
            Error::Syntax(_)
        ));
    }

    #[test]
    fn operand_modes() {
        let e = Expr::Number(0);
        assert_eq!(
            Operand::Address(e.clone()).mode(Mnemonic::BNE),
            AddressingMode::Relative
        );
        assert_eq!(
            Operand::Address(e).mode(Mnemonic::JMP),
            AddressingMode::Extended
        );
    }

    #[test]
    fn display_reads_back() {
        for src in [" LDA #$10", " STA A,--X", " JMP table+2", " LDX #-5"] {
            let Some(Stmt::Op(m, operand)) = parse(src).stmt else {
                panic!()
            };
            let again = parse(&format!(" {m} {operand}"));
            assert_eq!(again.stmt, Some(Stmt::Op(m, operand)));
        }
    }
}
