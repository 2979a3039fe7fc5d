//! Builds the template tree from lexemes.
//!
//! Parser combinators are chumsky's, generic over the input type. Nesting
//! is bounded before the combinators run, since both the parser and the
//! executor recurse once per level.

use chumsky::{input::ValueInput, prelude::*};
use serde_json::{Number, Value};

use crate::lex::{line_of, Lexeme, Span, Token};
use crate::Error;

/// Deepest allowed nesting of blocks, `else if` chains and parentheses.
pub(crate) const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
}

/// A control block: `{{if}}`, `{{range}}` or `{{with}}`.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub pipe: Pipeline,
    pub body: Vec<Node>,
    /// The `{{else}}` part, empty if absent.
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    /// Byte offset of the pipeline in the template text.
    pub offset: usize,
    pub decl: Vec<String>,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(String),
    Literal(Value),
    Nested(Box<Pipeline>),
}

type Extra<'t> = extra::Err<Rich<'t, Lexeme, Span>>;

/// Parse lexed template text.
///
/// `is_function` decides which identifiers name callable functions; any
/// other identifier is a syntax error, as is nesting beyond [`MAX_DEPTH`].
pub(crate) fn parse<F>(name: &str, src: &str, lexemes: Vec<(Lexeme, Span)>, is_function: F) -> Result<Vec<Node>, Error>
where
    F: Fn(&str) -> bool,
{
    if let Some(offset) = too_deep(&lexemes) {
        return Err(Error::syntax(
            name,
            line_of(src, offset),
            format!("exceeded maximum template depth ({})", MAX_DEPTH),
        ));
    }

    let end_span: Span = (src.len()..src.len()).into();
    let nodes = template_parser()
        .then_ignore(end())
        .parse(lexemes.as_slice().map(end_span, |(l, s)| (l, s)))
        .into_result()
        .map_err(|errs| {
            let offset = errs.first().map_or(src.len(), |e| e.span().start);
            let message = errs
                .first()
                .map_or_else(|| "unexpected input".to_string(), |e| e.to_string());
            Error::syntax(name, line_of(src, offset), message)
        })?;

    check_functions(&nodes, &is_function)
        .map_err(|(offset, function)| {
            Error::syntax(
                name,
                line_of(src, offset),
                format!("function {:?} not defined", function),
            )
        })?;
    Ok(nodes)
}

/// Offset of the first lexeme nested deeper than [`MAX_DEPTH`].
fn too_deep(lexemes: &[(Lexeme, Span)]) -> Option<usize> {
    // One entry per open block; `else if`/`else with` add to the innermost.
    let mut blocks: Vec<usize> = Vec::new();
    let mut nested = 0usize;
    let mut parens = 0usize;

    for (i, (lexeme, span)) in lexemes.iter().enumerate() {
        let next = |n: usize| lexemes.get(i + n).map(|(l, _)| l);
        match lexeme {
            Lexeme::Token(Token::LeftParen) => parens += 1,
            Lexeme::Token(Token::RightParen) => parens = parens.saturating_sub(1),
            Lexeme::Close => parens = 0,
            Lexeme::Open => match (next(1), next(2)) {
                (Some(Lexeme::Token(Token::If | Token::Range | Token::With)), _) => {
                    blocks.push(1);
                    nested += 1;
                }
                (Some(Lexeme::Token(Token::Else)), Some(Lexeme::Token(Token::If | Token::With))) => {
                    if let Some(top) = blocks.last_mut() {
                        *top += 1;
                        nested += 1;
                    }
                }
                (Some(Lexeme::Token(Token::End)), _) => {
                    nested = nested.saturating_sub(blocks.pop().unwrap_or(0));
                }
                _ => {}
            },
            _ => {}
        }
        if nested + parens > MAX_DEPTH {
            return Some(span.start);
        }
    }
    None
}

fn check_functions<F: Fn(&str) -> bool>(nodes: &[Node], is_function: &F) -> Result<(), (usize, String)> {
    fn pipeline<F: Fn(&str) -> bool>(pipe: &Pipeline, is_function: &F) -> Result<(), (usize, String)> {
        for operand in pipe.cmds.iter().flat_map(|c| &c.args) {
            match operand {
                Operand::Function(name) if !is_function(name.as_str()) => {
                    return Err((pipe.offset, name.clone()))
                }
                Operand::Nested(inner) => pipeline(inner, is_function)?,
                _ => {}
            }
        }
        Ok(())
    }

    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Action(pipe) => pipeline(pipe, is_function)?,
            Node::If(b) | Node::Range(b) | Node::With(b) => {
                pipeline(&b.pipe, is_function)?;
                check_functions(&b.body, is_function)?;
                check_functions(&b.otherwise, is_function)?;
            }
        }
    }
    Ok(())
}

fn token<'t, I>(t: Token) -> impl Parser<'t, I, Lexeme, Extra<'t>> + Clone
where
    I: ValueInput<'t, Token = Lexeme, Span = Span>,
{
    just(Lexeme::Token(t))
}

/// `{{ keyword`, the start of a block action.
fn opens<'t, I>(t: Token) -> impl Parser<'t, I, (), Extra<'t>> + Clone
where
    I: ValueInput<'t, Token = Lexeme, Span = Span>,
{
    just(Lexeme::Open).then(token(t)).ignored()
}

fn close<'t, I>() -> impl Parser<'t, I, (), Extra<'t>> + Clone
where
    I: ValueInput<'t, Token = Lexeme, Span = Span>,
{
    just(Lexeme::Close).ignored()
}

/// A list of nodes, the body of the template and of every block.
fn template_parser<'t, I>() -> impl Parser<'t, I, Vec<Node>, Extra<'t>> + Clone
where
    I: ValueInput<'t, Token = Lexeme, Span = Span>,
{
    recursive(|nodes| {
        let pipeline = pipeline_parser();
        let head = |kw: Token| opens(kw).ignore_then(pipeline.clone()).then_ignore(close());
        let end_action = opens(Token::End).then(close());
        let else_action = opens(Token::Else).then(close());
        let else_chain = |kw: Token| {
            just(Lexeme::Open)
                .then(token(Token::Else))
                .then(token(kw))
                .ignore_then(pipeline.clone())
                .then_ignore(close())
                .then(nodes.clone())
        };

        let text = select! { Lexeme::Text(s) => Node::Text(s) };

        let action = just(Lexeme::Open)
            .ignore_then(pipeline.clone())
            .then_ignore(close())
            .map(Node::Action);

        let if_block = head(Token::If)
            .then(nodes.clone())
            .then(else_chain(Token::If).repeated().collect::<Vec<_>>())
            .then(else_action.clone().ignore_then(nodes.clone()).or_not())
            .then_ignore(end_action.clone())
            .map(|(((pipe, body), chain), otherwise)| chained(Node::If, pipe, body, chain, otherwise));

        let with_block = head(Token::With)
            .then(nodes.clone())
            .then(else_chain(Token::With).repeated().collect::<Vec<_>>())
            .then(else_action.clone().ignore_then(nodes.clone()).or_not())
            .then_ignore(end_action.clone())
            .map(|(((pipe, body), chain), otherwise)| chained(Node::With, pipe, body, chain, otherwise));

        let range_block = head(Token::Range)
            .then(nodes.clone())
            .then(else_action.ignore_then(nodes.clone()).or_not())
            .then_ignore(end_action)
            .map(|((pipe, body), otherwise)| {
                Node::Range(Branch {
                    pipe,
                    body,
                    otherwise: otherwise.unwrap_or_default(),
                })
            });

        choice((text, if_block, with_block, range_block, action))
            .repeated()
            .collect::<Vec<_>>()
            .boxed()
    })
}

/// Fold `{{else if}}` links into nested blocks under a single `{{end}}`.
fn chained(
    kind: fn(Branch) -> Node,
    pipe: Pipeline,
    body: Vec<Node>,
    chain: Vec<(Pipeline, Vec<Node>)>,
    otherwise: Option<Vec<Node>>,
) -> Node {
    let mut otherwise = otherwise.unwrap_or_default();
    for (pipe, body) in chain.into_iter().rev() {
        otherwise = vec![kind(Branch { pipe, body, otherwise })];
    }
    kind(Branch { pipe, body, otherwise })
}

/// `[$x[, $y] :=] command [| command ...]`
fn pipeline_parser<'t, I>() -> impl Parser<'t, I, Pipeline, Extra<'t>> + Clone
where
    I: ValueInput<'t, Token = Lexeme, Span = Span>,
{
    recursive(|pipeline| {
        let literal = select! {
            Lexeme::Token(Token::Str(s)) => Value::String(s),
            Lexeme::Token(Token::Bool(b)) => Value::Bool(b),
            Lexeme::Token(Token::Nil) => Value::Null,
        };
        let number = select! { Lexeme::Token(Token::Number(n)) => n }.try_map(|n, span| {
            parse_number(&n).ok_or_else(|| Rich::custom(span, format!("bad number syntax: {:?}", n)))
        });

        let operand = choice((
            token(Token::Dot).to(Operand::Dot),
            select! {
                Lexeme::Token(Token::Field(chain)) => Operand::Field(chain),
                Lexeme::Token(Token::Variable(v)) => Operand::Variable(v.name, v.fields),
                Lexeme::Token(Token::Ident(name)) => Operand::Function(name),
            },
            literal.or(number).map(Operand::Literal),
            pipeline
                .delimited_by(token(Token::LeftParen), token(Token::RightParen))
                .map(|p| Operand::Nested(Box::new(p))),
        ))
        .labelled("operand");

        let command = operand
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|args| Command { args })
            .labelled("command");

        let var = select! {
            Lexeme::Token(Token::Variable(v)) if v.fields.is_empty() => v.name,
        };
        let decl = var
            .clone()
            .then(token(Token::Comma).ignore_then(var).or_not())
            .then_ignore(token(Token::Declare))
            .map(|(first, second)| std::iter::once(first).chain(second).collect::<Vec<_>>());

        decl.or_not()
            .then(command.separated_by(token(Token::Pipe)).at_least(1).collect::<Vec<_>>())
            .map_with(|(decl, cmds), e| {
                let span: Span = e.span();
                Pipeline {
                    offset: span.start,
                    decl: decl.unwrap_or_default(),
                    cmds,
                }
            })
            .labelled("pipeline")
            .boxed()
    })
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.strip_prefix('+').unwrap_or(text);
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
