//! Hand-written scanner producing the token stream described in spec §6.
//! Tokenization is an external collaborator in the original system; here it
//! is folded into the crate as an internal module so the parser has a
//! concrete, buildable input, but the token catalog and the ENDL-coalescing
//! contract are exactly what §6 describes.

use crate::error::{ParseError, WithSource};
use crate::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Endl,
    Directive,
    Name,
    DottedName,
    Label,
    Integer,
    Float,
    Str,
    Char,
    Bool,
    Register,
    ClobberedRegister,
    VarType,
    DataType,
    Sub,
    RArrow,
    Is,
    Incr,
    Decr,
    AugAssign,
    Goto,
    Return,
    If,
    InlineAsm,
    PreserveRegs,
    BitInvert,
    BitAnd,
    BitOr,
    BitXor,
    LogicAnd,
    LogicOr,
    LogicNot,
    ShiftLeft,
    ShiftRight,
    Lt,
    Gt,
    Le,
    Ge,
    Equals,
    NotEquals,
    Modulo,
    IntegerDivide,
    Power,
    Comment,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Question,
    Amp,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

const KEYWORDS_AUG: &[(&str, TokenKind)] = &[
    ("+=", TokenKind::AugAssign),
    ("-=", TokenKind::AugAssign),
    ("*=", TokenKind::AugAssign),
    ("/=", TokenKind::AugAssign),
    ("%=", TokenKind::AugAssign),
    ("&=", TokenKind::AugAssign),
    ("|=", TokenKind::AugAssign),
    ("^=", TokenKind::AugAssign),
    ("<<=", TokenKind::AugAssign),
    (">>=", TokenKind::AugAssign),
];

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    fn col(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn span_from(&self, start: usize, start_line: usize, start_col: usize) -> Span {
        let length = self.pos - start;
        Span {
            offset: start,
            length,
            start_line,
            start_col,
            end_line: self.line,
            end_col: self.col(),
        }
    }
}

/// Scan `src` into a flat token stream, not yet ENDL-coalesced.
pub fn tokenize(src: &str) -> Result<Vec<Token>, WithSource<ParseError>> {
    let mut sc = Scanner::new(src);
    let mut out = Vec::new();

    loop {
        let start = sc.pos;
        let start_line = sc.line;
        let start_col = sc.col();

        let c = match sc.peek() {
            None => break,
            Some(c) => c,
        };

        if c == b'\n' {
            sc.bump();
            out.push(Token {
                kind: TokenKind::Endl,
                text: "\n".into(),
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }
        if c == b' ' || c == b'\t' || c == b'\r' {
            sc.bump();
            continue;
        }
        if c == b';' {
            while let Some(c) = sc.peek() {
                if c == b'\n' {
                    break;
                }
                sc.bump();
            }
            out.push(Token {
                kind: TokenKind::Comment,
                text: sc.src[start..sc.pos].to_string(),
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }
        if c == b'%' && sc.peek_at(1) == Some(b'%') {
            // %% inline-asm block, terminated by a matching %%
            sc.bump();
            sc.bump();
            let text_start = sc.pos;
            loop {
                match sc.peek() {
                    None => {
                        return Err(WithSource::new(
                            ParseError::UnexpectedEof,
                            sc.span_from(start, start_line, start_col),
                        ))
                    }
                    Some(b'%') if sc.peek_at(1) == Some(b'%') => {
                        let text = sc.src[text_start..sc.pos].to_string();
                        sc.bump();
                        sc.bump();
                        out.push(Token {
                            kind: TokenKind::InlineAsm,
                            text,
                            span: sc.span_from(start, start_line, start_col),
                        });
                        break;
                    }
                    _ => {
                        sc.bump();
                    }
                }
            }
            continue;
        }
        if c == b'.' && sc.peek_at(1).map_or(false, |c| c.is_ascii_alphabetic()) {
            sc.bump();
            while sc
                .peek()
                .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_')
            {
                sc.bump();
            }
            out.push(Token {
                kind: TokenKind::Directive,
                text: sc.src[start + 1..sc.pos].to_string(),
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }
        if c.is_ascii_digit() {
            let mut is_float = false;
            while sc.peek().map_or(false, |c| c.is_ascii_digit()) {
                sc.bump();
            }
            if sc.peek() == Some(b'.')
                && sc.peek_at(1).map_or(false, |c| c.is_ascii_digit())
            {
                is_float = true;
                sc.bump();
                while sc.peek().map_or(false, |c| c.is_ascii_digit()) {
                    sc.bump();
                }
            }
            out.push(Token {
                kind: if is_float {
                    TokenKind::Float
                } else {
                    TokenKind::Integer
                },
                text: sc.src[start..sc.pos].to_string(),
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }
        if c == b'"' {
            sc.bump();
            while let Some(c) = sc.peek() {
                if c == b'"' {
                    break;
                }
                sc.bump();
            }
            if sc.peek().is_none() {
                return Err(WithSource::new(
                    ParseError::UnexpectedEof,
                    sc.span_from(start, start_line, start_col),
                ));
            }
            let text = sc.src[start + 1..sc.pos].to_string();
            sc.bump();
            out.push(Token {
                kind: TokenKind::Str,
                text,
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }
        if c == b'\'' {
            sc.bump();
            let ch_start = sc.pos;
            while sc.peek().map_or(false, |c| c != b'\'') {
                sc.bump();
            }
            let text = sc.src[ch_start..sc.pos].to_string();
            sc.bump();
            out.push(Token {
                kind: TokenKind::Char,
                text,
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            while sc
                .peek()
                .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_')
            {
                sc.bump();
            }
            let mut dotted = false;
            // Dotted names (`outer.inner.x`): only swallow a following `.ident`
            // run for plain Name words, never for keywords.
            while sc.peek() == Some(b'.')
                && sc
                    .peek_at(1)
                    .map_or(false, |c| c.is_ascii_alphabetic() || c == b'_')
            {
                dotted = true;
                sc.bump(); // '.'
                while sc
                    .peek()
                    .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_')
                {
                    sc.bump();
                }
            }
            let word = &sc.src[start..sc.pos];
            let kind = if dotted {
                TokenKind::DottedName
            } else {
                classify_word(word)
            };
            out.push(Token {
                kind,
                text: word.to_string(),
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }

        // multi-char operators, longest match first
        let rest = &sc.src[sc.pos..];
        if let Some((text, kind)) = match_operator(rest) {
            for _ in 0..text.len() {
                sc.bump();
            }
            out.push(Token {
                kind,
                text: text.to_string(),
                span: sc.span_from(start, start_line, start_col),
            });
            continue;
        }

        return Err(WithSource::new(
            ParseError::UnexpectedToken,
            sc.span_from(start, start_line, start_col),
        ));
    }

    out.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        span: sc.span_from(sc.pos, sc.line, sc.col()),
    });
    Ok(out)
}

fn classify_word(word: &str) -> TokenKind {
    match word {
        "sub" => TokenKind::Sub,
        "goto" => TokenKind::Goto,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "saveregs" | "clobbers" => TokenKind::PreserveRegs,
        "mod" => TokenKind::Modulo,
        "and" => TokenKind::LogicAnd,
        "or" => TokenKind::LogicOr,
        "not" => TokenKind::LogicNot,
        "true" | "false" => TokenKind::Bool,
        "const" | "var" | "memory" => TokenKind::VarType,
        "byte" | "sbyte" | "word" | "sword" | "float" | "bool" => {
            TokenKind::DataType
        }
        "a" | "x" | "y" | "ax" | "ay" | "xy" | "sc" => TokenKind::Register,
        _ => TokenKind::Name,
    }
}

fn match_operator(rest: &str) -> Option<(&str, TokenKind)> {
    const THREE: &[(&str, TokenKind)] = &[
        ("<<=", TokenKind::AugAssign),
        (">>=", TokenKind::AugAssign),
    ];
    for (text, kind) in THREE {
        if rest.starts_with(text) {
            return Some((text, kind.clone()));
        }
    }
    const TWO: &[(&str, TokenKind)] = &[
        ("->", TokenKind::RArrow),
        ("==", TokenKind::Equals),
        ("!=", TokenKind::NotEquals),
        ("<=", TokenKind::Le),
        (">=", TokenKind::Ge),
        ("<<", TokenKind::ShiftLeft),
        (">>", TokenKind::ShiftRight),
        ("++", TokenKind::Incr),
        ("--", TokenKind::Decr),
        ("**", TokenKind::Power),
        ("//", TokenKind::IntegerDivide),
        ("&&", TokenKind::LogicAnd),
        ("||", TokenKind::LogicOr),
        ("+=", TokenKind::AugAssign),
        ("-=", TokenKind::AugAssign),
        ("*=", TokenKind::AugAssign),
        ("/=", TokenKind::AugAssign),
        ("%=", TokenKind::AugAssign),
        ("&=", TokenKind::AugAssign),
        ("|=", TokenKind::AugAssign),
        ("^=", TokenKind::AugAssign),
    ];
    for (text, kind) in TWO {
        if rest.starts_with(text) {
            return Some((text, kind.clone()));
        }
    }
    let _ = KEYWORDS_AUG;
    let one = &rest[..1];
    let kind = match one {
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        "[" => TokenKind::LBracket,
        "]" => TokenKind::RBracket,
        "{" => TokenKind::LBrace,
        "}" => TokenKind::RBrace,
        "," => TokenKind::Comma,
        ":" => TokenKind::Colon,
        "?" => TokenKind::Question,
        "&" => TokenKind::BitAnd,
        "|" => TokenKind::BitOr,
        "^" => TokenKind::BitXor,
        "~" => TokenKind::BitInvert,
        "=" => TokenKind::Assign,
        "+" => TokenKind::Plus,
        "-" => TokenKind::Minus,
        "*" => TokenKind::Star,
        "/" => TokenKind::Slash,
        "%" => TokenKind::Modulo,
        "<" => TokenKind::Lt,
        ">" => TokenKind::Gt,
        "." => TokenKind::Colon, // bare '.' outside a directive is unusual; treat as separator token
        _ => return None,
    };
    Some((one, kind))
}

/// Collapse runs of consecutive ENDL tokens into one, and drop comments
/// (they carry no grammatical meaning once tokenized). Per spec §6: "An
/// ENDL-coalescing filter must wrap the raw stream."
pub fn coalesce_endl(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for tok in tokens {
        if tok.kind == TokenKind::Comment {
            continue;
        }
        if tok.kind == TokenKind::Endl {
            if matches!(out.last().map(|t| &t.kind), Some(TokenKind::Endl)) {
                continue;
            }
        }
        out.push(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokens() {
        let toks = tokenize("var byte x = 5\n").unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::VarType,
                TokenKind::DataType,
                TokenKind::Name,
                TokenKind::Assign,
                TokenKind::Integer,
                TokenKind::Endl,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_coalesce_endl() {
        let toks = tokenize("a\n\n\nb\n").unwrap();
        let coalesced = coalesce_endl(toks);
        let endl_count = coalesced
            .iter()
            .filter(|t| t.kind == TokenKind::Endl)
            .count();
        assert_eq!(endl_count, 2);
    }

    #[test]
    fn test_directive() {
        let toks = tokenize(".output raw\n").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Directive);
        assert_eq!(toks[0].text, "output");
    }
}
