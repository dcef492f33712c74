//! Tokenizer for the expression language

use super::ExprError;
use chumsky::error::SimpleReason;
use chumsky::prelude::*;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

pub type Span = Range<usize>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `.name`
    Field(String),
    Ident(String),
    Keyword(Keyword),
    /// `$name`
    Var(String),
    Num(Number),
    Str(String),
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Pipe,
    Comma,
    Colon,
    Semicolon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `//`
    Alt,
}

/// Numeric literal, compared bitwise so tokens can be hashed
#[derive(Debug, Clone, Copy)]
pub struct Number(pub f64);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Then,
    Elif,
    Else,
    End,
    As,
    Reduce,
    Try,
    Catch,
    And,
    Or,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "as" => Keyword::As,
            "reduce" => Keyword::Reduce,
            "try" => Keyword::Try,
            "catch" => Keyword::Catch,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::As => "as",
            Keyword::Reduce => "reduce",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::And => "and",
            Keyword::Or => "or",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Token::Field(name) => return write!(f, "'.{}'", name),
            Token::Ident(name) => return write!(f, "'{}'", name),
            Token::Keyword(k) => return write!(f, "'{}'", k.as_str()),
            Token::Var(name) => return write!(f, "'${}'", name),
            Token::Num(n) => return write!(f, "number {}", n.0),
            Token::Str(s) => return write!(f, "string {:?}", s),
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Pipe => "|",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Question => "?",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Alt => "//",
        };
        write!(f, "'{}'", symbol)
    }
}

/// Piece of a string literal; `\u` escapes are kept as UTF-16 units so
/// surrogate pairs can be joined afterwards
#[derive(Clone)]
enum Piece {
    Char(char),
    Unit(u16),
}

fn string_literal() -> impl Parser<char, String, Error = Simple<char>> {
    let hex4 = filter(|c: &char| c.is_ascii_hexdigit())
        .repeated()
        .exactly(4)
        .collect::<String>()
        .try_map(|digits, span| {
            u16::from_str_radix(&digits, 16)
                .map_err(|_| Simple::custom(span, format!("invalid \\u escape '{}'", digits)))
        });

    let escape = just('\\').ignore_then(choice((
        just('"').to(Piece::Char('"')),
        just('\\').to(Piece::Char('\\')),
        just('/').to(Piece::Char('/')),
        just('b').to(Piece::Char('\x08')),
        just('f').to(Piece::Char('\x0c')),
        just('n').to(Piece::Char('\n')),
        just('r').to(Piece::Char('\r')),
        just('t').to(Piece::Char('\t')),
        just('u').ignore_then(hex4).map(Piece::Unit),
        just('(').try_map(|_, span| {
            Err::<Piece, _>(Simple::custom(span, "string interpolation is not supported"))
        }),
    )));

    let plain = filter(|c: &char| *c != '"' && *c != '\\').map(Piece::Char);

    plain
        .or(escape)
        .repeated()
        .delimited_by(just('"'), just('"'))
        .try_map(|pieces: Vec<Piece>, span| {
            let mut out = String::new();
            let mut units = Vec::new();
            for piece in pieces {
                match piece {
                    Piece::Unit(unit) => units.push(unit),
                    Piece::Char(c) => {
                        flush_units(&mut units, &mut out, &span)?;
                        out.push(c);
                    }
                }
            }
            flush_units(&mut units, &mut out, &span)?;
            Ok(out)
        })
}

fn flush_units(units: &mut Vec<u16>, out: &mut String, span: &Span) -> Result<(), Simple<char>> {
    if units.is_empty() {
        return Ok(());
    }
    let decoded = String::from_utf16(units)
        .map_err(|_| Simple::custom(span.clone(), "unpaired surrogate in \\u escape"))?;
    out.push_str(&decoded);
    units.clear();
    Ok(())
}

fn number_literal() -> impl Parser<char, Token, Error = Simple<char>> {
    let exponent = one_of("eE")
        .chain::<char, _, _>(one_of("+-").or_not())
        .chain::<char, _, _>(text::digits(10));
    let fraction = just('.').chain::<char, _, _>(text::digits(10));

    let integral = text::int(10)
        .chain::<char, _, _>(fraction.or_not().flatten())
        .chain::<char, _, _>(exponent.clone().or_not().flatten());
    let leading_dot = just('.')
        .chain::<char, _, _>(text::digits(10))
        .chain::<char, _, _>(exponent.or_not().flatten());

    integral
        .or(leading_dot)
        .collect::<String>()
        .try_map(|text, span| {
            text.parse::<f64>()
                .map(|n| Token::Num(Number(n)))
                .map_err(|_| Simple::custom(span, format!("invalid number '{}'", text)))
        })
}

pub fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let word = text::ident().map(|ident: String| match Keyword::from_ident(&ident) {
        Some(keyword) => Token::Keyword(keyword),
        None => Token::Ident(ident),
    });

    let comparison = choice((
        just("//").to(Token::Alt),
        just("==").to(Token::Eq),
        just("!=").to(Token::Ne),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
    ));

    let punctuation = choice((
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('|').to(Token::Pipe),
        just(',').to(Token::Comma),
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just('?').to(Token::Question),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let token = choice((
        just("..").to(Token::DotDot),
        just('.').ignore_then(text::ident()).map(Token::Field),
        number_literal(),
        just('.').to(Token::Dot),
        just('$').ignore_then(text::ident()).map(Token::Var),
        string_literal().map(Token::Str),
        word,
        comparison,
        punctuation,
    ))
    .map_with_span(|token, span| (token, span));

    let comment = just('#').then(filter(|c: &char| *c != '\n').repeated()).ignored();
    let skip = comment
        .or(filter(|c: &char| c.is_whitespace()).ignored())
        .repeated();

    skip.clone()
        .ignore_then(token.then_ignore(skip).repeated())
        .then_ignore(end())
}

/// Turn the first parse error into an [`ExprError::Syntax`]
pub fn syntax_error<T>(errors: Vec<Simple<T>>) -> ExprError
where
    T: fmt::Display + Hash + Eq,
{
    let Some(error) = errors.into_iter().min_by_key(|e| e.span().start) else {
        return ExprError::Syntax {
            offset: 0,
            message: "invalid expression".to_string(),
        };
    };

    let message = match error.reason() {
        SimpleReason::Custom(message) => message.clone(),
        SimpleReason::Unclosed { delimiter, .. } => format!("unclosed {}", delimiter),
        SimpleReason::Unexpected => {
            let describe = |t: Option<&T>| t.map_or_else(|| "end of input".to_string(), |t| t.to_string());
            let found = describe(error.found());
            let mut expected: Vec<String> = error.expected().map(|e| describe(e.as_ref())).collect();
            expected.sort();
            expected.dedup();
            if expected.is_empty() {
                format!("unexpected {}", found)
            } else {
                format!("expected {}, found {}", expected.join(" or "), found)
            }
        }
    };

    ExprError::Syntax {
        offset: error.span().start,
        message,
    }
}

pub fn tokenize(src: &str) -> Result<Vec<(Token, Span)>, ExprError> {
    lexer().parse(src).map_err(syntax_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|(token, _)| token).collect()
    }

    #[test]
    fn test_paths_and_operators() {
        assert_eq!(
            kinds(".spec.replicas >= 2 // 1"),
            vec![
                Token::Field("spec".to_string()),
                Token::Field("replicas".to_string()),
                Token::Ge,
                Token::Num(Number(2.0)),
                Token::Alt,
                Token::Num(Number(1.0)),
            ]
        );
        assert_eq!(
            kinds(".[] | .."),
            vec![Token::Dot, Token::LBracket, Token::RBracket, Token::Pipe, Token::DotDot]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("  .a | 10").unwrap();
        let spans: Vec<Span> = tokens.into_iter().map(|(_, span)| span).collect();
        assert_eq!(spans, vec![2..4, 5..6, 7..9]);
    }

    #[test]
    fn test_keywords_and_vars() {
        assert_eq!(
            kinds("if $objects then not else end"),
            vec![
                Token::Keyword(Keyword::If),
                Token::Var("objects".to_string()),
                Token::Keyword(Keyword::Then),
                Token::Ident("not".to_string()),
                Token::Keyword(Keyword::Else),
                Token::Keyword(Keyword::End),
            ]
        );
        // keywords are plain field names after a dot
        assert_eq!(kinds(".end"), vec![Token::Field("end".to_string())]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n\u00e9\ud83d\ude00""#),
            vec![Token::Str("a\"b\n\u{e9}\u{1F600}".to_string())]
        );
        assert_eq!(kinds(r#""""#), vec![Token::Str(String::new())]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1.5e3 .5 10"),
            vec![
                Token::Num(Number(1500.0)),
                Token::Num(Number(0.5)),
                Token::Num(Number(10.0))
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(kinds(". # trailing\n| ."), vec![Token::Dot, Token::Pipe, Token::Dot]);
        assert_eq!(kinds("# only a comment"), vec![]);
        assert_eq!(kinds(".a # no newline"), vec![Token::Field("a".to_string())]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(tokenize("\"open"), Err(ExprError::Syntax { .. })));
        assert!(matches!(tokenize(". & ."), Err(ExprError::Syntax { offset: 2, .. })));

        for src in [r#""\(.a)""#, r#""\ud83d""#, r#""\q""#, "$"] {
            assert!(
                matches!(tokenize(src), Err(ExprError::Syntax { .. })),
                "expected syntax error for {:?}",
                src
            );
        }
    }
}
