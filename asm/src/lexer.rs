//! Tokenizer for B33 assembly source.
//!
//! Each source line is scanned on its own so the assembler can stop at `END`
//! without looking at the rest of the file. [`tokenize`] joins the lines with
//! [`TokenKind::Newline`] and ends with [`TokenKind::Eof`].
//!
//! Identifiers are classified here: a word that names a mnemonic, a directive
//! or a register gets its own kind, everything else is a [`TokenKind::Label`].
//! Numeric literals are parsed eagerly; range checks happen in the assembler.

use std::iter::Peekable;
use std::str::CharIndices;

use b33arch::{Mnemonic, Reg};
use strum::{Display, EnumString};

use crate::error::{AsmError, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Directive {
    Rmb,
    Str,
    Chr,
    End,
    Equ,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Mnemonic(Mnemonic),
    Register(Reg),
    Directive(Directive),
    /// Any other identifier.
    Label(String),
    /// `$FF` or `&HFF`
    HexNumber(u32),
    DecNumber(u32),
    /// `%1010`
    BinNumber(u32),
    Str(String),
    Comma,
    Hash,
    Plus,
    Minus,
    Colon,
    /// Text after `;`, without the semicolon.
    Comment(String),
    Whitespace,
    Newline,
    Eof,
}

impl TokenKind {
    pub fn number(&self) -> Option<u32> {
        match self {
            TokenKind::HexNumber(n) | TokenKind::DecNumber(n) | TokenKind::BinNumber(n) => Some(*n),
            _ => None,
        }
    }

    /// Whitespace, comments and line ends carry no syntax.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Comment(_) | TokenKind::Newline | TokenKind::Eof
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based
    pub line: usize,
    /// 0-based, in characters
    pub column: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, AsmError> {
    let mut tokens = vec![];
    let mut last = 1;
    // Width of the previous line, where its newline token sits.
    let mut width = 0;
    for (idx, text) in source.lines().enumerate() {
        let line = idx + 1;
        if idx > 0 {
            tokens.push(Token {
                kind: TokenKind::Newline,
                text: "\n".to_string(),
                line: idx,
                column: width,
            });
        }
        tokens.extend(tokenize_line(text, line)?);
        width = text.chars().count();
        last = line;
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        line: last,
        column: width,
    });
    Ok(tokens)
}

pub fn tokenize_line(text: &str, line: usize) -> Result<Vec<Token>, AsmError> {
    Lexer {
        src: text,
        chars: text.char_indices().peekable(),
        line,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn pos(&mut self) -> usize {
        self.chars.peek().map_or(self.src.len(), |(i, _)| *i)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos();
        while self.chars.next_if(|(_, c)| pred(*c)).is_some() {}
        let end = self.pos();
        let src = self.src;
        &src[start..end]
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.chars.next();
        kind
    }

    fn run(mut self) -> Result<Vec<Token>, AsmError> {
        let mut tokens = vec![];
        while let Some(&(start, ch)) = self.chars.peek() {
            let kind = self.scan(start, ch).map_err(|e| e.at(self.line))?;
            let end = self.pos();
            tokens.push(Token {
                kind,
                text: self.src[start..end].to_string(),
                line: self.line,
                column: self.src[..start].chars().count(),
            });
        }
        Ok(tokens)
    }

    fn scan(&mut self, start: usize, ch: char) -> Result<TokenKind, Error> {
        let src = self.src;
        let kind = match ch {
            ' ' | '\t' | '\r' => {
                self.eat_while(|c| c == ' ' || c == '\t' || c == '\r');
                TokenKind::Whitespace
            }
            ';' => {
                self.chars.next();
                TokenKind::Comment(self.eat_while(|_| true).to_string())
            }
            ',' => self.single(TokenKind::Comma),
            '#' => self.single(TokenKind::Hash),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            ':' => self.single(TokenKind::Colon),
            '$' => {
                self.chars.next();
                let digits = self.eat_while(|c| c.is_ascii_alphanumeric());
                TokenKind::HexNumber(number(digits, 16, &src[start..self.pos()])?)
            }
            '&' => {
                self.chars.next();
                if self.chars.next_if(|(_, c)| c.eq_ignore_ascii_case(&'h')).is_none() {
                    return Err(Error::InvalidNumber(src[start..self.pos()].to_string()));
                }
                let digits = self.eat_while(|c| c.is_ascii_alphanumeric());
                TokenKind::HexNumber(number(digits, 16, &src[start..self.pos()])?)
            }
            '%' => {
                self.chars.next();
                let digits = self.eat_while(|c| c.is_ascii_alphanumeric());
                TokenKind::BinNumber(number(digits, 2, &src[start..self.pos()])?)
            }
            '"' => {
                self.chars.next();
                let text = self.eat_while(|c| c != '"');
                if self.chars.next().is_none() {
                    return Err(Error::UnterminatedString);
                }
                TokenKind::Str(text.to_string())
            }
            c if c.is_ascii_digit() => {
                let digits = self.eat_while(|c| c.is_ascii_alphanumeric());
                TokenKind::DecNumber(number(digits, 10, digits)?)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
                classify(word)
            }
            c => {
                return Err(Error::Syntax(format!("unexpected character `{c}`")));
            }
        };
        Ok(kind)
    }
}

fn number(digits: &str, radix: u32, text: &str) -> Result<u32, Error> {
    if digits.is_empty() {
        return Err(Error::InvalidNumber(text.to_string()));
    }
    u32::from_str_radix(digits, radix).map_err(|_| Error::InvalidNumber(text.to_string()))
}

fn classify(word: &str) -> TokenKind {
    if let Ok(m) = Mnemonic::parse(word) {
        TokenKind::Mnemonic(m)
    } else if let Ok(d) = word.parse::<Directive>() {
        TokenKind::Directive(d)
    } else if let Ok(r) = Reg::parse(word) {
        TokenKind::Register(r)
    } else {
        TokenKind::Label(word.to_string())
    }
}

/// Cursor over the tokens of one line, with lookahead.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        TokenStream { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    pub fn consume(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Consume the next token when it has exactly this kind.
    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek_kind() == Some(&TokenKind::Whitespace) {
            self.pos += 1;
        }
    }

    /// Nothing but trivia left.
    pub fn is_at_end(&self) -> bool {
        self.tokens[self.pos.min(self.tokens.len())..]
            .iter()
            .all(|t| t.kind.is_trivia())
    }

    pub fn comment(&self) -> Option<String> {
        self.tokens[self.pos.min(self.tokens.len())..]
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Comment(c) => Some(c.clone()),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize_line(src, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Whitespace)
            .collect()
    }

    #[test]
    fn instruction_line() {
        assert_eq!(
            kinds("Start LDA #99 ; go"),
            vec![
                TokenKind::Label("Start".to_string()),
                TokenKind::Mnemonic(Mnemonic::LDA),
                TokenKind::Hash,
                TokenKind::DecNumber(99),
                TokenKind::Comment(" go".to_string()),
            ]
        );
    }

    #[test]
    fn number_formats() {
        assert_eq!(kinds("$FF"), vec![TokenKind::HexNumber(0xFF)]);
        assert_eq!(kinds("&hff"), vec![TokenKind::HexNumber(0xFF)]);
        assert_eq!(kinds("%1010"), vec![TokenKind::BinNumber(10)]);
        assert_eq!(kinds("-5"), vec![TokenKind::Minus, TokenKind::DecNumber(5)]);
    }

    #[test]
    fn invalid_numbers() {
        assert!(tokenize_line("$ZZ", 1).is_err());
        assert!(tokenize_line("%102", 1).is_err());
        assert!(tokenize_line("12AB", 1).is_err());
        assert!(tokenize_line("&FF", 1).is_err());
        assert!(tokenize_line("$", 1).is_err());
    }

    #[test]
    fn index_operand() {
        assert_eq!(
            kinds("STA ,--X"),
            vec![
                TokenKind::Mnemonic(Mnemonic::STA),
                TokenKind::Comma,
                TokenKind::Minus,
                TokenKind::Minus,
                TokenKind::Register(Reg::X),
            ]
        );
        assert_eq!(
            kinds("lda b,y+"),
            vec![
                TokenKind::Mnemonic(Mnemonic::LDA),
                TokenKind::Register(Reg::B),
                TokenKind::Comma,
                TokenKind::Register(Reg::Y),
                TokenKind::Plus,
            ]
        );
    }

    #[test]
    fn strings() {
        assert_eq!(
            kinds("msg STR \"Hi; there\""),
            vec![
                TokenKind::Label("msg".to_string()),
                TokenKind::Directive(Directive::Str),
                TokenKind::Str("Hi; there".to_string()),
            ]
        );
        let err = tokenize_line("STR \"oops", 7).unwrap_err();
        assert_eq!(err.line, 7);
        assert!(matches!(err.error, Error::UnterminatedString));
    }

    #[test]
    fn columns_and_lines() {
        let tokens = tokenize("A1 NOP\n  HLT").unwrap();
        let hlt = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Mnemonic(Mnemonic::HLT))
            .unwrap();
        assert_eq!((hlt.line, hlt.column), (2, 2));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Newline));
    }

    #[test]
    fn newline_columns_on_long_sources() {
        let source = " NOP\nLoop INCX\n".repeat(20_000);
        let tokens = tokenize(&source).unwrap();
        let newlines: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .collect();
        assert_eq!(newlines.len(), 39_999);
        assert_eq!((newlines[0].line, newlines[0].column), (1, 4));
        assert_eq!((newlines[1].line, newlines[1].column), (2, 9));
        let eof = tokens.last().unwrap();
        assert_eq!((eof.kind.clone(), eof.line, eof.column), (TokenKind::Eof, 40_000, 9));
    }

    #[test]
    fn stream_lookahead() {
        let mut ts = TokenStream::new(tokenize_line("loop: NOP ; spin", 1).unwrap());
        assert_eq!(ts.peek_at(1).map(|t| &t.kind), Some(&TokenKind::Colon));
        assert!(matches!(ts.consume().unwrap().kind, TokenKind::Label(_)));
        assert!(ts.eat(&TokenKind::Colon));
        ts.skip_whitespace();
        assert!(ts.eat(&TokenKind::Mnemonic(Mnemonic::NOP)));
        assert!(ts.is_at_end());
        assert_eq!(ts.comment(), Some(" spin".to_string()));
    }

    proptest! {
        #[test]
        fn numbers_parse_in_every_radix(n in 0u32..=0xFFFF) {
            prop_assert_eq!(kinds(&format!("${n:X}")), vec![TokenKind::HexNumber(n)]);
            prop_assert_eq!(kinds(&format!("&H{n:x}")), vec![TokenKind::HexNumber(n)]);
            prop_assert_eq!(kinds(&format!("%{n:b}")), vec![TokenKind::BinNumber(n)]);
            prop_assert_eq!(kinds(&format!("{n}")), vec![TokenKind::DecNumber(n)]);
        }
    }
}
