//! Parser producing the expression AST from the token stream

use super::lexer::{syntax_error, tokenize, Keyword, Number, Token};
use super::ExprError;
use chumsky::prelude::*;
use chumsky::Stream;
use serde_json::Value;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Key of an object construction entry
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Literal(String),
    Computed(Ast),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Identity,
    /// `..`
    Recurse,
    Literal(Value),
    /// `target[index]`; the index is evaluated against the original input
    Index {
        target: Box<Ast>,
        index: Box<Ast>,
    },
    Slice {
        target: Box<Ast>,
        from: Option<Box<Ast>>,
        to: Option<Box<Ast>>,
    },
    /// `target[]`
    Iterate(Box<Ast>),
    /// `try body catch handler`, and the `?` suffix when `handler` is `None`
    Try {
        body: Box<Ast>,
        handler: Option<Box<Ast>>,
    },
    Pipe(Box<Ast>, Box<Ast>),
    Comma(Box<Ast>, Box<Ast>),
    Neg(Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    /// `a // b`
    Alternative(Box<Ast>, Box<Ast>),
    If {
        cond: Box<Ast>,
        then: Box<Ast>,
        otherwise: Option<Box<Ast>>,
    },
    Array(Option<Box<Ast>>),
    Object(Vec<(ObjectKey, Ast)>),
    Var(String),
    /// `source as $var | body`
    Bind {
        source: Box<Ast>,
        var: String,
        body: Box<Ast>,
    },
    Reduce {
        source: Box<Ast>,
        var: String,
        init: Box<Ast>,
        update: Box<Ast>,
    },
    Call {
        name: String,
        args: Vec<Ast>,
    },
}

fn boxed(ast: Ast) -> Box<Ast> {
    Box::new(ast)
}

fn field(target: Ast, name: String) -> Ast {
    Ast::Index {
        target: boxed(target),
        index: boxed(Ast::Literal(Value::String(name))),
    }
}


/// Postfix applied to a term
#[derive(Debug, Clone)]
enum Suffix {
    Field(String),
    Index(Ast),
    Slice(Option<Ast>, Option<Ast>),
    Iterate,
    Try,
}

fn apply(target: Ast, suffix: Suffix) -> Ast {
    match suffix {
        Suffix::Field(name) => field(target, name),
        Suffix::Index(index) => Ast::Index {
            target: boxed(target),
            index: boxed(index),
        },
        Suffix::Slice(from, to) => Ast::Slice {
            target: boxed(target),
            from: from.map(boxed),
            to: to.map(boxed),
        },
        Suffix::Iterate => Ast::Iterate(boxed(target)),
        Suffix::Try => Ast::Try {
            body: boxed(target),
            handler: None,
        },
    }
}

/// Join `first` and `rest` into a right-associative chain
fn fold_right(first: Ast, mut rest: Vec<Ast>, join: fn(Box<Ast>, Box<Ast>) -> Ast) -> Ast {
    let Some(mut acc) = rest.pop() else {
        return first;
    };
    while let Some(item) = rest.pop() {
        acc = join(boxed(item), boxed(acc));
    }
    join(boxed(first), boxed(acc))
}

fn binary(op: BinOp, left: Ast, right: Ast) -> Ast {
    Ast::Binary(op, boxed(left), boxed(right))
}

/// Grammar, loosest binding first: pipe, comma, `//`, `or`, `and`,
/// comparison, additive, multiplicative, unary minus, postfix
fn expression() -> impl Parser<Token, Ast, Error = Simple<Token>> + Clone {
    recursive(|pipe| {
        let alternative = recursive(|alternative| {
            let term = recursive(|term| {
                let keyword = |k: Keyword| just(Token::Keyword(k));
                let ident = select! { Token::Ident(name) => name };
                let var = select! { Token::Var(name) => name };
                let string = select! { Token::Str(s) => s };

                // object values stop at commas
                let object_value = alternative
                    .clone()
                    .then(just(Token::Pipe).ignore_then(alternative.clone()).repeated())
                    .map(|(first, rest)| fold_right(first, rest, Ast::Pipe));

                let key_name = select! {
                    Token::Ident(name) => name,
                    Token::Str(name) => name,
                    Token::Keyword(k) => k.as_str().to_string(),
                };
                let entry = choice((
                    pipe.clone()
                        .delimited_by(just(Token::LParen), just(Token::RParen))
                        .then_ignore(just(Token::Colon))
                        .then(object_value.clone())
                        .map(|(key, value)| (ObjectKey::Computed(key), value)),
                    var.clone()
                        .map(|name: String| (ObjectKey::Literal(name.clone()), Ast::Var(name))),
                    key_name
                        .then(just(Token::Colon).ignore_then(object_value).or_not())
                        .map(|(name, value): (String, Option<Ast>)| {
                            let value = value.unwrap_or_else(|| field(Ast::Identity, name.clone()));
                            (ObjectKey::Literal(name), value)
                        }),
                ));
                let object = entry
                    .separated_by(just(Token::Comma))
                    .delimited_by(just(Token::LBrace), just(Token::RBrace))
                    .map(Ast::Object);

                let array = pipe
                    .clone()
                    .or_not()
                    .delimited_by(just(Token::LBracket), just(Token::RBracket))
                    .map(|inner: Option<Ast>| Ast::Array(inner.map(boxed)));

                let conditional = keyword(Keyword::If)
                    .ignore_then(pipe.clone())
                    .then_ignore(keyword(Keyword::Then))
                    .then(pipe.clone())
                    .then(
                        keyword(Keyword::Elif)
                            .ignore_then(pipe.clone())
                            .then_ignore(keyword(Keyword::Then))
                            .then(pipe.clone())
                            .repeated(),
                    )
                    .then(keyword(Keyword::Else).ignore_then(pipe.clone()).or_not())
                    .then_ignore(keyword(Keyword::End))
                    .map(|(((cond, then), elifs), otherwise)| {
                        let mut otherwise = otherwise.map(boxed);
                        for (cond, then) in elifs.into_iter().rev() {
                            otherwise = Some(boxed(Ast::If {
                                cond: boxed(cond),
                                then: boxed(then),
                                otherwise,
                            }));
                        }
                        Ast::If {
                            cond: boxed(cond),
                            then: boxed(then),
                            otherwise,
                        }
                    });

                let try_catch = keyword(Keyword::Try)
                    .ignore_then(term.clone())
                    .then(keyword(Keyword::Catch).ignore_then(term.clone()).or_not())
                    .map(|(body, handler): (Ast, Option<Ast>)| Ast::Try {
                        body: boxed(body),
                        handler: handler.map(boxed),
                    });

                let reduce = keyword(Keyword::Reduce)
                    .ignore_then(term.clone())
                    .then_ignore(keyword(Keyword::As))
                    .then(var.clone())
                    .then_ignore(just(Token::LParen))
                    .then(pipe.clone())
                    .then_ignore(just(Token::Semicolon))
                    .then(pipe.clone())
                    .then_ignore(just(Token::RParen))
                    .map(|(((source, var), init), update)| Ast::Reduce {
                        source: boxed(source),
                        var,
                        init: boxed(init),
                        update: boxed(update),
                    });

                let call = ident
                    .then(
                        pipe.clone()
                            .separated_by(just(Token::Semicolon))
                            .at_least(1)
                            .delimited_by(just(Token::LParen), just(Token::RParen))
                            .or_not(),
                    )
                    .map(|(name, args): (String, Option<Vec<Ast>>)| match (name.as_str(), args) {
                        ("true", None) => Ast::Literal(Value::Bool(true)),
                        ("false", None) => Ast::Literal(Value::Bool(false)),
                        ("null", None) => Ast::Literal(Value::Null),
                        (_, args) => Ast::Call {
                            name,
                            args: args.unwrap_or_default(),
                        },
                    });

                let primary = choice((
                    just(Token::Dot)
                        .ignore_then(string.clone())
                        .map(|name| field(Ast::Identity, name)),
                    just(Token::Dot).to(Ast::Identity),
                    just(Token::DotDot).to(Ast::Recurse),
                    select! { Token::Field(name) => field(Ast::Identity, name) },
                    select! { Token::Num(Number(n)) => Ast::Literal(super::value::number(n)) },
                    string.clone().map(|s| Ast::Literal(Value::String(s))),
                    var.map(Ast::Var),
                    pipe.clone().delimited_by(just(Token::LParen), just(Token::RParen)),
                    array,
                    object,
                    conditional,
                    try_catch,
                    reduce,
                    call,
                ))
                .boxed();

                let bracket = choice((
                    just(Token::RBracket).to(Suffix::Iterate),
                    just(Token::Colon)
                        .ignore_then(pipe.clone())
                        .then_ignore(just(Token::RBracket))
                        .map(|to| Suffix::Slice(None, Some(to))),
                    pipe.clone()
                        .then(just(Token::Colon).ignore_then(pipe.clone().or_not()).or_not())
                        .then_ignore(just(Token::RBracket))
                        .map(|(index, slice): (Ast, Option<Option<Ast>>)| match slice {
                            None => Suffix::Index(index),
                            Some(to) => Suffix::Slice(Some(index), to),
                        }),
                ));
                let suffix = choice((
                    select! { Token::Field(name) => Suffix::Field(name) },
                    just(Token::Dot).ignore_then(string).map(Suffix::Field),
                    just(Token::Dot)
                        .or_not()
                        .ignore_then(just(Token::LBracket))
                        .ignore_then(bracket),
                    just(Token::Question).to(Suffix::Try),
                ));

                primary.then(suffix.repeated()).foldl(apply).boxed()
            });

            // `term as $name | body` binds for the rest of the pipe
            let bound = term
                .then(
                    just(Token::Keyword(Keyword::As))
                        .ignore_then(select! { Token::Var(name) => name })
                        .then_ignore(just(Token::Pipe))
                        .then(pipe.clone())
                        .or_not(),
                )
                .map(|(source, bind): (Ast, Option<(String, Ast)>)| match bind {
                    Some((var, body)) => Ast::Bind {
                        source: boxed(source),
                        var,
                        body: boxed(body),
                    },
                    None => source,
                });

            let unary = just(Token::Minus)
                .repeated()
                .then(bound)
                .foldr(|_, operand| Ast::Neg(boxed(operand)))
                .boxed();

            let op = |token: Token, bin: BinOp| just(token).to(bin);

            let product = unary
                .clone()
                .then(
                    choice((
                        op(Token::Star, BinOp::Mul),
                        op(Token::Slash, BinOp::Div),
                        op(Token::Percent, BinOp::Mod),
                    ))
                    .then(unary)
                    .repeated(),
                )
                .foldl(|left, (op, right)| binary(op, left, right));

            let sum = product
                .clone()
                .then(
                    choice((op(Token::Plus, BinOp::Add), op(Token::Minus, BinOp::Sub)))
                        .then(product)
                        .repeated(),
                )
                .foldl(|left, (op, right)| binary(op, left, right))
                .boxed();

            // comparisons do not chain: `1 == 2 == 3` leaves `== 3` unparsed
            let comparison = sum
                .clone()
                .then(
                    choice((
                        op(Token::Eq, BinOp::Eq),
                        op(Token::Ne, BinOp::Ne),
                        op(Token::Le, BinOp::Le),
                        op(Token::Ge, BinOp::Ge),
                        op(Token::Lt, BinOp::Lt),
                        op(Token::Gt, BinOp::Gt),
                    ))
                    .then(sum)
                    .or_not(),
                )
                .map(|(left, rhs)| match rhs {
                    Some((op, right)) => binary(op, left, right),
                    None => left,
                });

            let conjunction = comparison
                .clone()
                .then(just(Token::Keyword(Keyword::And)).ignore_then(comparison).repeated())
                .foldl(|left, right| Ast::And(boxed(left), boxed(right)));

            let disjunction = conjunction
                .clone()
                .then(just(Token::Keyword(Keyword::Or)).ignore_then(conjunction).repeated())
                .foldl(|left, right| Ast::Or(boxed(left), boxed(right)));

            disjunction
                .then(just(Token::Alt).ignore_then(alternative).or_not())
                .map(|(left, right): (Ast, Option<Ast>)| match right {
                    Some(right) => Ast::Alternative(boxed(left), boxed(right)),
                    None => left,
                })
                .boxed()
        });

        let comma = alternative
            .clone()
            .then(just(Token::Comma).ignore_then(alternative).repeated())
            .foldl(|left, right| Ast::Comma(boxed(left), boxed(right)));

        comma
            .then(just(Token::Pipe).ignore_then(pipe).or_not())
            .map(|(left, right): (Ast, Option<Ast>)| match right {
                Some(right) => Ast::Pipe(boxed(left), boxed(right)),
                None => left,
            })
    })
}

/// Parse an expression into its AST
pub fn parse(src: &str) -> Result<Ast, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::Syntax {
            offset: 0,
            message: "empty expression".to_string(),
        });
    }

    let eoi = src.chars().count();
    let stream = Stream::from_iter(eoi..eoi + 1, tokens.into_iter());
    expression()
        .then_ignore(end())
        .parse(stream)
        .map_err(syntax_error)
}
