//! Template tokenizer.
//!
//! Text outside `{{ }}` is lexed by [`Outer`]. At each opening delimiter the
//! lexer morphs into [`Token`] for the action body and morphs back at the
//! closing delimiter, so `}}` inside a string literal never ends an action.

use std::fmt;

use chumsky::span::SimpleSpan;
use logos::{Lexer, Logos};

use crate::Error;

pub(crate) type Span = SimpleSpan;

#[derive(Logos, Debug, Clone, PartialEq)]
enum Outer {
    #[regex(r"[^{]+")]
    Text,

    #[token("{")]
    Brace,

    #[token("{{")]
    Open,

    #[regex(r"\{\{-[ \t\r\n]")]
    OpenTrim,
}

/// A `$name.Field.Chain` reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VarRef {
    pub name: String,
    pub fields: Vec<String>,
}

/// Tokens inside an action.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub(crate) enum Token {
    #[token("}}")]
    Close,

    #[regex(r"[ \t\r\n]+-\}\}")]
    CloseTrim,

    #[token(".")]
    Dot,

    #[regex(r"(\.[A-Za-z_][A-Za-z0-9_]*)+", field_chain)]
    Field(Vec<String>),

    #[regex(r"\$[A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", variable)]
    Variable(VarRef),

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("end")]
    End,

    #[token("range")]
    Range,

    #[token("with")]
    With,

    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    #[token("nil")]
    Nil,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r#""([^"\\\n]|\\.)*""#, quoted)]
    #[regex(r"`[^`]*`", raw_quoted)]
    Str(String),

    #[regex(r"[+-]?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[token("|")]
    Pipe,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token(",")]
    Comma,

    #[token(":=")]
    Declare,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Close | Token::CloseTrim => write!(f, "}}}}"),
            Token::Dot => write!(f, "."),
            Token::Field(chain) => write!(f, ".{}", chain.join(".")),
            Token::Variable(v) if v.fields.is_empty() => write!(f, "{}", v.name),
            Token::Variable(v) => write!(f, "{}.{}", v.name, v.fields.join(".")),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::End => write!(f, "end"),
            Token::Range => write!(f, "range"),
            Token::With => write!(f, "with"),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Nil => write!(f, "nil"),
            Token::Ident(s) | Token::Number(s) => write!(f, "{}", s),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Pipe => write!(f, "|"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Declare => write!(f, ":="),
        }
    }
}

/// The parser's input: text runs, action delimiters and action tokens.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lexeme {
    Text(String),
    Open,
    Close,
    Token(Token),
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lexeme::Text(_) => write!(f, "text"),
            Lexeme::Open => write!(f, "{{{{"),
            Lexeme::Close => write!(f, "}}}}"),
            Lexeme::Token(t) => write!(f, "{}", t),
        }
    }
}

fn field_chain(lex: &mut Lexer<'_, Token>) -> Vec<String> {
    lex.slice()
        .split('.')
        .skip(1)
        .map(String::from)
        .collect()
}

fn variable(lex: &mut Lexer<'_, Token>) -> VarRef {
    let mut parts = lex.slice().split('.');
    let name = parts.next().unwrap_or("$").to_string();
    VarRef {
        name,
        fields: parts.map(String::from).collect(),
    }
}

fn quoted(lex: &mut Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            c @ ('\\' | '"' | '\'') => c,
            _ => return None,
        });
    }
    Some(out)
}

fn raw_quoted(lex: &mut Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

/// 1-based line of a byte offset.
pub(crate) fn line_of(src: &str, offset: usize) -> usize {
    src.get(..offset).map_or(1, |s| s.matches('\n').count() + 1)
}

/// Split `src` into lexemes, applying `{{-`/`-}}` whitespace trimming and
/// dropping comment-only actions.
pub(crate) fn lex(name: &str, src: &str) -> Result<Vec<(Lexeme, Span)>, Error> {
    let mut out: Vec<(Lexeme, Span)> = Vec::new();
    let mut text = String::new();
    let mut text_span: Option<Span> = None;
    let mut trim_next = false;

    let mut outer = Outer::lexer(src);
    while let Some(next) = outer.next() {
        let span = outer.span();
        match next {
            Ok(Outer::Text | Outer::Brace) => {
                let chunk = outer.slice();
                let chunk = if trim_next && text.is_empty() {
                    chunk.trim_start()
                } else {
                    chunk
                };
                if chunk.is_empty() {
                    continue;
                }
                trim_next = false;
                text.push_str(chunk);
                text_span = Some(match text_span {
                    Some(s) => (s.start..span.end).into(),
                    None => span.into(),
                });
            }
            Ok(open @ (Outer::Open | Outer::OpenTrim)) => {
                if open == Outer::OpenTrim {
                    text.truncate(text.trim_end().len());
                }
                if let Some(s) = text_span.take() {
                    if !text.is_empty() {
                        out.push((Lexeme::Text(std::mem::take(&mut text)), s));
                    }
                }
                text.clear();
                trim_next = false;

                let open_at = out.len();
                let (open_start, body_start) = (span.start, span.end);
                out.push((Lexeme::Open, span.into()));

                let mut action = outer.morph::<Token>();
                let trim = loop {
                    match action.next() {
                        None => return Err(Error::syntax(name, line_of(src, open_start), "unclosed action")),
                        Some(Ok(Token::Close)) => break false,
                        Some(Ok(Token::CloseTrim)) => break true,
                        Some(Ok(token)) => out.push((Lexeme::Token(token), action.span().into())),
                        Some(Err(())) => return Err(unexpected(name, src, action.slice(), action.span().start)),
                    }
                };
                let close_span = action.span();

                let comment_only =
                    out.len() == open_at + 1 && src[body_start..close_span.start].contains("/*");
                if comment_only {
                    out.truncate(open_at);
                } else {
                    out.push((Lexeme::Close, close_span.into()));
                }

                trim_next = trim;
                outer = action.morph();
            }
            Err(()) => return Err(unexpected(name, src, outer.slice(), span.start)),
        }
    }

    if let Some(s) = text_span {
        if !text.is_empty() {
            out.push((Lexeme::Text(text), s));
        }
    }
    Ok(out)
}

fn unexpected(name: &str, src: &str, slice: &str, offset: usize) -> Error {
    let line = line_of(src, offset);
    let message = match slice.chars().next() {
        Some('"') if slice.len() > 1 && slice.ends_with('"') => {
            format!("invalid syntax in quoted string {}", slice)
        }
        Some('"') => "unterminated quoted string".to_string(),
        Some('`') => "unterminated raw quoted string".to_string(),
        Some(c) => format!("unexpected {:?} in command", c),
        None => "unexpected end of input".to_string(),
    };
    Error::syntax(name, line, message)
}
