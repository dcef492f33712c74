//! A jq-compatible expression language
//!
//! Expressions are compiled once with [`compile`] and evaluated against a
//! document with [`Program::evaluate`]. Two variables are always bound:
//! `$object` (the current document, also the input `.`) and `$objects` (an
//! array of every document in the run).
//!
//! ```
//! use kubelint::expr::compile;
//! use serde_json::json;
//!
//! let program = compile(r#".kind == "Deployment" and (.spec.replicas // 1) < 2"#).unwrap();
//! let doc = json!({"kind": "Deployment", "spec": {"replicas": 1}});
//! let all = json!([doc.clone()]);
//! assert_eq!(program.evaluate(&doc, &all).unwrap(), Some(json!(true)));
//! ```

mod builtins;
mod eval;
mod lexer;
mod parser;
mod value;

pub use parser::Ast;
pub use value::{compare, equals, truthy};

use eval::{Env, Evaluator, Flow, RegexKey};
use parser::ObjectKey;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub(crate) use value::number;

/// Names bound in every evaluation
const ROOT_VARIABLES: [&str; 2] = ["object", "objects"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("{name}/{arity} is not defined")]
    UnknownFunction { name: String, arity: usize },

    #[error("${0} is not defined")]
    UndefinedVariable(String),

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("{0}")]
    Type(String),

    #[error("{}", raised_message(.0))]
    Raised(Value),
}

fn raised_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{} (not a string)", other),
    }
}

impl ExprError {
    /// Errors that can only come out of [`compile`]
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            ExprError::Syntax { .. }
                | ExprError::UnknownFunction { .. }
                | ExprError::UndefinedVariable(_)
        )
    }

    /// The value a `catch` handler receives
    fn into_value(self) -> Value {
        match self {
            ExprError::Raised(value) => value,
            other => Value::String(other.to_string()),
        }
    }
}

/// A compiled expression
#[derive(Clone)]
pub struct Program {
    source: String,
    ast: Ast,
    regexes: HashMap<RegexKey, Regex>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Evaluate as a predicate: the first output that is neither `null` nor
    /// `false`, or `None` when there is no such output.
    ///
    /// Evaluation stops at that first truthy output.
    pub fn evaluate(&self, input: &Value, all: &Value) -> Result<Option<Value>, ExprError> {
        let mut found = None;
        self.stream(input, all, &mut |v| {
            if truthy(&v) {
                found = Some(v.into_owned());
                return Ok(Flow::Stop);
            }
            Ok(Flow::Continue)
        })?;
        Ok(found)
    }

    /// Every output, in order
    pub fn outputs(&self, input: &Value, all: &Value) -> Result<Vec<Value>, ExprError> {
        let mut outputs = Vec::new();
        self.stream(input, all, &mut |v| {
            outputs.push(v.into_owned());
            Ok(Flow::Continue)
        })?;
        Ok(outputs)
    }

    fn stream<'a>(
        &'a self,
        input: &'a Value,
        all: &'a Value,
        out: &mut eval::Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        let evaluator = Evaluator::new(&self.regexes);
        let env = Env::default()
            .bind(ROOT_VARIABLES[1], Cow::Borrowed(all))
            .bind(ROOT_VARIABLES[0], Cow::Borrowed(input));
        evaluator.run(&self.ast, &Cow::Borrowed(input), &env, out)
    }
}

/// Compile an expression, rejecting syntax errors, unknown functions,
/// unbound variables and invalid literal regular expressions
pub fn compile(source: &str) -> Result<Program, ExprError> {
    let ast = parser::parse(source)?;
    let mut scope: Vec<&str> = ROOT_VARIABLES.to_vec();
    let mut regexes = HashMap::new();
    check(&ast, &mut scope, &mut regexes)?;
    Ok(Program {
        source: source.to_string(),
        ast,
        regexes,
    })
}

fn literal_str(ast: &Ast) -> Option<&str> {
    match ast {
        Ast::Literal(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn check<'a>(
    ast: &'a Ast,
    scope: &mut Vec<&'a str>,
    regexes: &mut HashMap<RegexKey, Regex>,
) -> Result<(), ExprError> {
    match ast {
        Ast::Identity | Ast::Recurse | Ast::Literal(_) => Ok(()),
        Ast::Var(name) => {
            if scope.iter().any(|s| s == name) {
                Ok(())
            } else {
                Err(ExprError::UndefinedVariable(name.clone()))
            }
        }
        Ast::Index { target, index } => {
            check(target, scope, regexes)?;
            check(index, scope, regexes)
        }
        Ast::Slice { target, from, to } => {
            check(target, scope, regexes)?;
            for bound in [from, to].into_iter().flatten() {
                check(bound, scope, regexes)?;
            }
            Ok(())
        }
        Ast::Iterate(inner) | Ast::Neg(inner) | Ast::Array(Some(inner)) => {
            check(inner, scope, regexes)
        }
        Ast::Array(None) => Ok(()),
        Ast::Try { body, handler } => {
            check(body, scope, regexes)?;
            match handler {
                Some(handler) => check(handler, scope, regexes),
                None => Ok(()),
            }
        }
        Ast::Pipe(l, r)
        | Ast::Comma(l, r)
        | Ast::Binary(_, l, r)
        | Ast::And(l, r)
        | Ast::Or(l, r)
        | Ast::Alternative(l, r) => {
            check(l, scope, regexes)?;
            check(r, scope, regexes)
        }
        Ast::If {
            cond,
            then,
            otherwise,
        } => {
            check(cond, scope, regexes)?;
            check(then, scope, regexes)?;
            match otherwise {
                Some(otherwise) => check(otherwise, scope, regexes),
                None => Ok(()),
            }
        }
        Ast::Object(entries) => {
            for (key, value) in entries {
                if let ObjectKey::Computed(key) = key {
                    check(key, scope, regexes)?;
                }
                check(value, scope, regexes)?;
            }
            Ok(())
        }
        Ast::Bind { source, var, body } => {
            check(source, scope, regexes)?;
            scope.push(var);
            let result = check(body, scope, regexes);
            scope.pop();
            result
        }
        Ast::Reduce {
            source,
            var,
            init,
            update,
        } => {
            check(source, scope, regexes)?;
            check(init, scope, regexes)?;
            scope.push(var);
            let result = check(update, scope, regexes);
            scope.pop();
            result
        }
        Ast::Call { name, args } => {
            if !builtins::is_builtin(name, args.len()) {
                return Err(ExprError::UnknownFunction {
                    name: name.clone(),
                    arity: args.len(),
                });
            }
            for arg in args {
                check(arg, scope, regexes)?;
            }
            if name == "test" {
                let flags = match args.get(1) {
                    None => Some(""),
                    Some(flags) => literal_str(flags),
                };
                if let (Some(pattern), Some(flags)) = (literal_str(&args[0]), flags) {
                    let re = eval::build_regex(pattern, flags)?;
                    regexes.insert((pattern.to_string(), flags.to_string()), re);
                }
            }
            Ok(())
        }
    }
}
