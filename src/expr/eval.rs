//! Streaming evaluator
//!
//! Every node pushes its outputs into a sink instead of collecting them, so
//! predicates can stop at the first truthy output. Values borrowed from the
//! input documents stay borrowed (`Cow::Borrowed`) until an operation has to
//! build something new.

use super::parser::{Ast, ObjectKey};
use super::value::{self, truthy};
use super::ExprError;
use crate::document::type_name;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type Val<'a> = Cow<'a, Value>;

/// Output sink. Returning [`Flow::Stop`] asks the producer to stop.
pub type Sink<'s, 'a> = dyn FnMut(Val<'a>) -> Result<Flow, ExprError> + 's;

pub type RegexKey = (String, String);

static NULL: Value = Value::Null;
static TRUE: Value = Value::Bool(true);
static FALSE: Value = Value::Bool(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub fn null<'a>() -> Val<'a> {
    Cow::Borrowed(&NULL)
}

pub fn boolean<'a>(b: bool) -> Val<'a> {
    Cow::Borrowed(if b { &TRUE } else { &FALSE })
}

/// Variable bindings, innermost first
#[derive(Clone, Default)]
pub struct Env<'a> {
    head: Option<Rc<Frame<'a>>>,
}

struct Frame<'a> {
    name: &'a str,
    value: Val<'a>,
    next: Option<Rc<Frame<'a>>>,
}

impl<'a> Env<'a> {
    pub fn bind(&self, name: &'a str, value: Val<'a>) -> Self {
        Self {
            head: Some(Rc::new(Frame {
                name,
                value,
                next: self.head.clone(),
            })),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Val<'a>> {
        let mut current = self.head.as_deref();
        while let Some(frame) = current {
            if frame.name == name {
                return Some(&frame.value);
            }
            current = frame.next.as_deref();
        }
        None
    }
}

/// Children of an array or object, borrowed when the parent is borrowed
pub fn children<'a>(v: &Val<'a>) -> Option<Vec<Val<'a>>> {
    match v {
        Cow::Borrowed(b) => {
            let b: &'a Value = *b;
            match b {
                Value::Array(items) => Some(items.iter().map(Cow::Borrowed).collect()),
                Value::Object(map) => Some(map.values().map(Cow::Borrowed).collect()),
                _ => None,
            }
        }
        Cow::Owned(o) => match o {
            Value::Array(items) => Some(items.iter().cloned().map(Cow::Owned).collect()),
            Value::Object(map) => Some(map.values().cloned().map(Cow::Owned).collect()),
            _ => None,
        },
    }
}

/// `.[key]`, keeping borrowed values borrowed
fn index_val<'a>(target: &Val<'a>, key: &Value) -> Result<Val<'a>, ExprError> {
    match target {
        Cow::Borrowed(b) => value::index(*b, key).map(Cow::Borrowed),
        Cow::Owned(o) => value::index(o, key).map(|v| Cow::Owned(v.clone())),
    }
}

pub struct Evaluator<'a> {
    compiled: &'a HashMap<RegexKey, Regex>,
    cache: RefCell<HashMap<RegexKey, Regex>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(compiled: &'a HashMap<RegexKey, Regex>) -> Self {
        Self {
            compiled,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Compiled regex for a pattern and flag string, cached per evaluation
    pub fn regex(&self, pattern: &str, flags: &str) -> Result<Regex, ExprError> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(re) = self.compiled.get(&key) {
            return Ok(re.clone());
        }
        if let Some(re) = self.cache.borrow().get(&key) {
            return Ok(re.clone());
        }
        let re = build_regex(pattern, flags)?;
        self.cache.borrow_mut().insert(key, re.clone());
        Ok(re)
    }

    pub fn run(
        &self,
        ast: &'a Ast,
        input: &Val<'a>,
        env: &Env<'a>,
        out: &mut Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        match ast {
            Ast::Identity => out(input.clone()),
            Ast::Recurse => self.recurse(input, out),
            Ast::Literal(v) => out(Cow::Borrowed(v)),
            Ast::Var(name) => match env.get(name) {
                Some(v) => out(v.clone()),
                None => Err(ExprError::UndefinedVariable(name.clone())),
            },
            Ast::Index { target, index } => self.run(target, input, env, &mut |t| {
                self.run(index, input, env, &mut |k| out(index_val(&t, &k)?))
            }),
            Ast::Slice { target, from, to } => self.run(target, input, env, &mut |t| {
                self.optional(from.as_deref(), input, env, &mut |f| {
                    self.optional(to.as_deref(), input, env, &mut |e| {
                        out(Cow::Owned(value::slice(&t, &f, &e)?))
                    })
                })
            }),
            Ast::Iterate(target) => self.run(target, input, env, &mut |t| match children(&t) {
                Some(items) => emit_all(items, out),
                None => Err(value::cannot_iterate(&t)),
            }),
            Ast::Try { body, handler } => {
                let mut downstream = None;
                let result = self.run(body, input, env, &mut |v| match out(v) {
                    Ok(flow) => Ok(flow),
                    Err(e) => {
                        downstream = Some(e);
                        Ok(Flow::Stop)
                    }
                });
                if let Some(e) = downstream {
                    return Err(e);
                }
                match (result, handler) {
                    (Ok(flow), _) => Ok(flow),
                    (Err(err), Some(handler)) => {
                        self.run(handler, &Cow::Owned(err.into_value()), env, out)
                    }
                    (Err(_), None) => Ok(Flow::Continue),
                }
            }
            Ast::Pipe(left, right) => {
                self.run(left, input, env, &mut |v| self.run(right, &v, env, out))
            }
            Ast::Comma(left, right) => {
                if self.run(left, input, env, out)? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
                self.run(right, input, env, out)
            }
            Ast::Neg(operand) => self.run(operand, input, env, &mut |v| match &*v {
                Value::Number(n) => out(Cow::Owned(value::number(-value::as_f64(n)))),
                other => Err(ExprError::Type(format!(
                    "{} cannot be negated",
                    value::describe(other)
                ))),
            }),
            Ast::Binary(op, left, right) => self.run(right, input, env, &mut |r| {
                self.run(left, input, env, &mut |l| {
                    out(Cow::Owned(value::binary(*op, &l, &r)?))
                })
            }),
            Ast::And(left, right) => self.run(left, input, env, &mut |l| {
                if !truthy(&l) {
                    return out(boolean(false));
                }
                self.run(right, input, env, &mut |r| out(boolean(truthy(&r))))
            }),
            Ast::Or(left, right) => self.run(left, input, env, &mut |l| {
                if truthy(&l) {
                    return out(boolean(true));
                }
                self.run(right, input, env, &mut |r| out(boolean(truthy(&r))))
            }),
            Ast::Alternative(left, right) => {
                let mut produced = false;
                let mut downstream = None;
                let result = self.run(left, input, env, &mut |v| {
                    if !truthy(&v) {
                        return Ok(Flow::Continue);
                    }
                    produced = true;
                    match out(v) {
                        Ok(flow) => Ok(flow),
                        Err(e) => {
                            downstream = Some(e);
                            Ok(Flow::Stop)
                        }
                    }
                });
                if let Some(e) = downstream {
                    return Err(e);
                }
                match result {
                    Ok(Flow::Stop) => Ok(Flow::Stop),
                    // errors on the left count as "no value"
                    _ if produced => Ok(Flow::Continue),
                    _ => self.run(right, input, env, out),
                }
            }
            Ast::If {
                cond,
                then,
                otherwise,
            } => self.run(cond, input, env, &mut |c| {
                if truthy(&c) {
                    self.run(then, input, env, out)
                } else if let Some(otherwise) = otherwise {
                    self.run(otherwise, input, env, out)
                } else {
                    out(input.clone())
                }
            }),
            Ast::Array(None) => out(Cow::Owned(Value::Array(Vec::new()))),
            Ast::Array(Some(inner)) => {
                let items = self.collect(inner, input, env)?;
                out(Cow::Owned(Value::Array(items)))
            }
            Ast::Object(entries) => self.object(entries, input, env, Map::new(), out),
            Ast::Bind { source, var, body } => self.run(source, input, env, &mut |v| {
                let env = env.bind(var.as_str(), v);
                self.run(body, input, &env, out)
            }),
            Ast::Reduce {
                source,
                var,
                init,
                update,
            } => self.run(init, input, env, &mut |start| {
                let mut acc = start;
                self.run(source, input, env, &mut |v| {
                    let env = env.bind(var.as_str(), v);
                    let mut last = None;
                    self.run(update, &acc, &env, &mut |u| {
                        last = Some(u);
                        Ok(Flow::Continue)
                    })?;
                    acc = last.unwrap_or_else(null);
                    Ok(Flow::Continue)
                })?;
                out(acc)
            }),
            Ast::Call { name, args } => self.call(name, args, input, env, out),
        }
    }

    /// Run `ast` if present, otherwise produce a single `null`
    fn optional(
        &self,
        ast: Option<&'a Ast>,
        input: &Val<'a>,
        env: &Env<'a>,
        out: &mut Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        match ast {
            Some(ast) => self.run(ast, input, env, out),
            None => out(null()),
        }
    }

    /// All outputs of `ast`, owned
    pub fn collect(
        &self,
        ast: &'a Ast,
        input: &Val<'a>,
        env: &Env<'a>,
    ) -> Result<Vec<Value>, ExprError> {
        let mut items = Vec::new();
        self.run(ast, input, env, &mut |v| {
            items.push(v.into_owned());
            Ok(Flow::Continue)
        })?;
        Ok(items)
    }

    /// `..`: the value, then every value below it, depth first
    pub fn recurse(&self, v: &Val<'a>, out: &mut Sink<'_, 'a>) -> Result<Flow, ExprError> {
        if out(v.clone())? == Flow::Stop {
            return Ok(Flow::Stop);
        }
        if let Some(items) = children(v) {
            for item in &items {
                if self.recurse(item, out)? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn object(
        &self,
        entries: &'a [(ObjectKey, Ast)],
        input: &Val<'a>,
        env: &Env<'a>,
        acc: Map<String, Value>,
        out: &mut Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        let Some(((key, value), rest)) = entries.split_first() else {
            return out(Cow::Owned(Value::Object(acc)));
        };
        match key {
            ObjectKey::Literal(k) => self.object_entry(k, value, rest, input, env, &acc, out),
            ObjectKey::Computed(expr) => self.run(expr, input, env, &mut |k| match &*k {
                Value::String(k) => self.object_entry(k, value, rest, input, env, &acc, out),
                other => Err(ExprError::Type(format!(
                    "Object keys must be strings, got {}",
                    type_name(other)
                ))),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn object_entry(
        &self,
        key: &str,
        value: &'a Ast,
        rest: &'a [(ObjectKey, Ast)],
        input: &Val<'a>,
        env: &Env<'a>,
        acc: &Map<String, Value>,
        out: &mut Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        self.run(value, input, env, &mut |v| {
            let mut next = acc.clone();
            next.insert(key.to_string(), v.into_owned());
            self.object(rest, input, env, next, out)
        })
    }
}

pub fn emit_all<'a>(items: Vec<Val<'a>>, out: &mut Sink<'_, 'a>) -> Result<Flow, ExprError> {
    for item in items {
        if out(item)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

/// Build a regex from a pattern and jq-style flags (`g`, `i`, `x`, `s`, `n`)
pub fn build_regex(pattern: &str, flags: &str) -> Result<Regex, ExprError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            // global and no-empty-match only affect match enumeration
            'g' | 'n' => {}
            other => {
                return Err(ExprError::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: format!("'{}' is not a valid modifier", other),
                })
            }
        }
    }
    builder.build().map_err(|e| ExprError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
