//! Builtin functions

use super::eval::{boolean, children, null, Env, Evaluator, Flow, Sink, Val};
use super::parser::Ast;
use super::value::{self, as_f64, compare, describe, equals, number, truthy};
use super::ExprError;
use crate::document::type_name;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

/// Every builtin as `(name, arity)`
pub const BUILTINS: &[(&str, usize)] = &[
    ("empty", 0),
    ("error", 0),
    ("error", 1),
    ("not", 0),
    ("length", 0),
    ("keys", 0),
    ("keys_unsorted", 0),
    ("values", 0),
    ("type", 0),
    ("add", 0),
    ("any", 0),
    ("any", 1),
    ("any", 2),
    ("all", 0),
    ("all", 1),
    ("all", 2),
    ("first", 0),
    ("first", 1),
    ("last", 0),
    ("last", 1),
    ("reverse", 0),
    ("sort", 0),
    ("sort_by", 1),
    ("group_by", 1),
    ("unique", 0),
    ("unique_by", 1),
    ("min", 0),
    ("max", 0),
    ("min_by", 1),
    ("max_by", 1),
    ("flatten", 0),
    ("flatten", 1),
    ("tostring", 0),
    ("tonumber", 0),
    ("tojson", 0),
    ("ascii_downcase", 0),
    ("ascii_upcase", 0),
    ("to_entries", 0),
    ("from_entries", 0),
    ("with_entries", 1),
    ("objects", 0),
    ("arrays", 0),
    ("strings", 0),
    ("numbers", 0),
    ("booleans", 0),
    ("nulls", 0),
    ("iterables", 0),
    ("scalars", 0),
    ("recurse", 0),
    ("recurse", 1),
    ("select", 1),
    ("map", 1),
    ("map_values", 1),
    ("has", 1),
    ("in", 1),
    ("contains", 1),
    ("inside", 1),
    ("startswith", 1),
    ("endswith", 1),
    ("ltrimstr", 1),
    ("rtrimstr", 1),
    ("split", 1),
    ("join", 1),
    ("test", 1),
    ("test", 2),
    ("isempty", 1),
    ("limit", 2),
    ("range", 1),
    ("range", 2),
    ("index", 1),
    ("IN", 1),
    ("IN", 2),
];

pub fn is_builtin(name: &str, arity: usize) -> bool {
    BUILTINS.iter().any(|&(n, a)| n == name && a == arity)
}

fn owned<'a>(v: Value) -> Val<'a> {
    Cow::Owned(v)
}

fn type_err(message: String) -> ExprError {
    ExprError::Type(message)
}

fn require_array<'v>(v: &'v Value, what: &str) -> Result<&'v Vec<Value>, ExprError> {
    v.as_array()
        .ok_or_else(|| type_err(format!("{} cannot be {}, as it is not an array", describe(v), what)))
}

fn require_str<'v>(v: &'v Value, func: &str) -> Result<&'v str, ExprError> {
    v.as_str()
        .ok_or_else(|| type_err(format!("{}() requires string inputs, got {}", func, describe(v))))
}

fn length(v: &Value) -> Result<Value, ExprError> {
    Ok(match v {
        Value::Null => Value::from(0),
        Value::Bool(_) => return Err(type_err(format!("{} has no length", describe(v)))),
        Value::Number(n) => number(as_f64(n).abs()),
        Value::String(s) => Value::from(s.chars().count()),
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::from(map.len()),
    })
}

fn keys(v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            Ok(Value::Array(keys.into_iter().map(Value::String).collect()))
        }
        Value::Array(items) => Ok(Value::Array((0..items.len()).map(Value::from).collect())),
        other => Err(type_err(format!("{} has no keys", describe(other)))),
    }
}

fn has(container: &Value, key: &Value) -> Result<bool, ExprError> {
    match (container, key) {
        (Value::Object(map), Value::String(k)) => Ok(map.contains_key(k)),
        (Value::Array(items), Value::Number(n)) => {
            let i = as_f64(n);
            Ok(i >= 0.0 && i < items.len() as f64)
        }
        _ => Err(type_err(format!(
            "Cannot check whether {} has a {} key",
            type_name(container),
            type_name(key)
        ))),
    }
}

fn add(v: &Value) -> Result<Value, ExprError> {
    let items = match v {
        Value::Null => return Ok(Value::Null),
        other => value::elements(other).ok_or_else(|| value::cannot_iterate(other))?,
    };
    let mut acc = Value::Null;
    for item in items {
        acc = value::binary(super::parser::BinOp::Add, &acc, item)?;
    }
    Ok(acc)
}

fn flatten(v: &Value, depth: f64) -> Result<Value, ExprError> {
    if depth < 0.0 {
        return Err(type_err("flatten depth must not be negative".to_string()));
    }
    fn walk(items: &[Value], depth: f64, out: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::Array(inner) if depth > 0.0 => walk(inner, depth - 1.0, out),
                other => out.push(other.clone()),
            }
        }
    }
    let items = require_array(v, "flattened")?;
    let mut out = Vec::new();
    walk(items, depth, &mut out);
    Ok(Value::Array(out))
}

fn tostring(v: &Value) -> Value {
    match v {
        Value::String(_) => v.clone(),
        other => Value::String(serde_json::to_string(other).unwrap_or_default()),
    }
}

fn tonumber(v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Number(_) => Ok(v.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(number)
            .map_err(|_| type_err(format!("Cannot parse '{}' as a number", s))),
        other => Err(type_err(format!("{} cannot be parsed as a number", describe(other)))),
    }
}

fn to_entries(v: &Value) -> Result<Value, ExprError> {
    let map = v
        .as_object()
        .ok_or_else(|| type_err(format!("{} has no keys", describe(v))))?;
    Ok(Value::Array(
        map.iter()
            .map(|(k, v)| {
                let mut entry = Map::new();
                entry.insert("key".to_string(), Value::String(k.clone()));
                entry.insert("value".to_string(), v.clone());
                Value::Object(entry)
            })
            .collect(),
    ))
}

fn from_entries(v: &Value) -> Result<Value, ExprError> {
    let items = require_array(v, "turned into an object")?;
    let mut map = Map::new();
    for item in items {
        let entry = item
            .as_object()
            .ok_or_else(|| type_err(format!("Cannot index {} with \"key\"", type_name(item))))?;
        let key = ["key", "k", "name", "Name", "K", "Key"]
            .iter()
            .find_map(|k| entry.get(*k).filter(|v| truthy(v)))
            .unwrap_or(&Value::Null);
        let key = match key {
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => key.to_string(),
            other => {
                return Err(type_err(format!(
                    "Cannot use {} as object key",
                    describe(other)
                )))
            }
        };
        let value = ["value", "v", "Value", "V"]
            .iter()
            .find_map(|k| entry.get(*k))
            .cloned()
            .unwrap_or(Value::Null);
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

fn join(v: &Value, separator: &Value) -> Result<Value, ExprError> {
    let items = require_array(v, "joined")?;
    let separator = require_str(separator, "join")?;
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(match item {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => item.to_string(),
            other => return Err(type_err(format!("Cannot join with {}", type_name(other)))),
        });
    }
    Ok(Value::String(parts.join(separator)))
}

fn index_of(v: &Value, needle: &Value) -> Result<Value, ExprError> {
    match (v, needle) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::String(s), Value::String(n)) => {
            if n.is_empty() {
                return Ok(Value::Null);
            }
            Ok(match s.find(n.as_str()) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::Null,
            })
        }
        (Value::Array(items), Value::Array(seq)) => {
            if seq.is_empty() || seq.len() > items.len() {
                return Ok(Value::Null);
            }
            Ok(items
                .windows(seq.len())
                .position(|w| w.iter().zip(seq).all(|(a, b)| equals(a, b)))
                .map(Value::from)
                .unwrap_or(Value::Null))
        }
        (Value::Array(items), other) => Ok(items
            .iter()
            .position(|item| equals(item, other))
            .map(Value::from)
            .unwrap_or(Value::Null)),
        _ => Err(type_err(format!(
            "Cannot determine the index of {} in {}",
            describe(needle),
            describe(v)
        ))),
    }
}

fn reverse(v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Null => Ok(Value::Array(Vec::new())),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
        other => Err(type_err(format!("Cannot reverse {}", describe(other)))),
    }
}

fn extreme(v: &Value, want: Ordering) -> Result<Value, ExprError> {
    let items = require_array(v, "compared")?;
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            Some(current) if compare(item, current) != want => Some(current),
            _ => Some(item),
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn ascii_case(v: &Value, upper: bool) -> Result<Value, ExprError> {
    let s = v.as_str().ok_or_else(|| {
        type_err(format!(
            "{} input must be a string",
            if upper { "ascii_upcase" } else { "ascii_downcase" }
        ))
    })?;
    Ok(Value::String(if upper {
        s.to_ascii_uppercase()
    } else {
        s.to_ascii_lowercase()
    }))
}

impl<'a> Evaluator<'a> {
    /// Emit the input when `keep` holds
    fn keep_if(input: &Val<'a>, keep: bool, out: &mut Sink<'_, 'a>) -> Result<Flow, ExprError> {
        if keep {
            out(input.clone())
        } else {
            Ok(Flow::Continue)
        }
    }

    /// Map every output of `arg` through a function of `(input, arg)`
    fn with_arg(
        &self,
        arg: &'a Ast,
        input: &Val<'a>,
        env: &Env<'a>,
        out: &mut Sink<'_, 'a>,
        f: impl Fn(&Value, &Value) -> Result<Value, ExprError>,
    ) -> Result<Flow, ExprError> {
        self.run(arg, input, env, &mut |a| out(owned(f(&**input, &*a)?)))
    }

    /// Each element paired with the collected outputs of `f` on it
    fn keyed(
        &self,
        f: &'a Ast,
        input: &Val<'a>,
        env: &Env<'a>,
        what: &str,
    ) -> Result<Vec<(Value, Value)>, ExprError> {
        require_array(input, what)?;
        let mut pairs = Vec::new();
        for item in children(input).unwrap_or_default() {
            let key = Value::Array(self.collect(f, &item, env)?);
            pairs.push((key, item.into_owned()));
        }
        pairs.sort_by(|a, b| compare(&a.0, &b.0));
        Ok(pairs)
    }

    fn grouped(
        &self,
        f: &'a Ast,
        input: &Val<'a>,
        env: &Env<'a>,
    ) -> Result<Vec<Vec<Value>>, ExprError> {
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for (key, item) in self.keyed(f, input, env, "grouped")? {
            match groups.last_mut() {
                Some((last, members)) if equals(last, &key) => members.push(item),
                _ => groups.push((key, vec![item])),
            }
        }
        Ok(groups.into_iter().map(|(_, members)| members).collect())
    }

    /// Short-circuiting `any`/`all` over the outputs of `produce`.
    /// `want` is the truthiness that decides the answer early.
    fn quantify(
        &self,
        want: bool,
        out: &mut Sink<'_, 'a>,
        produce: impl FnOnce(&mut Sink<'_, 'a>) -> Result<Flow, ExprError>,
    ) -> Result<Flow, ExprError> {
        let mut decided = false;
        produce(&mut |v| {
            if truthy(&v) == want {
                decided = true;
                return Ok(Flow::Stop);
            }
            Ok(Flow::Continue)
        })?;
        out(boolean(if decided { want } else { !want }))
    }

    fn recurse_with(
        &self,
        f: &'a Ast,
        v: &Val<'a>,
        env: &Env<'a>,
        out: &mut Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        if out(v.clone())? == Flow::Stop {
            return Ok(Flow::Stop);
        }
        self.run(f, v, env, &mut |next| self.recurse_with(f, &next, env, out))
    }

    fn test(&self, input: &Value, pattern: &Value, flags: &Value) -> Result<Value, ExprError> {
        let subject = input.as_str().ok_or_else(|| {
            type_err(format!("{} cannot be matched, as it is not a string", describe(input)))
        })?;
        let pattern = pattern
            .as_str()
            .ok_or_else(|| type_err(format!("{} is not a string", describe(pattern))))?;
        let flags = match flags {
            Value::Null => "",
            Value::String(s) => s.as_str(),
            other => return Err(type_err(format!("{} is not a string", describe(other)))),
        };
        Ok(Value::Bool(self.regex(pattern, flags)?.is_match(subject)))
    }

    pub fn call(
        &self,
        name: &'a str,
        args: &'a [Ast],
        input: &Val<'a>,
        env: &Env<'a>,
        out: &mut Sink<'_, 'a>,
    ) -> Result<Flow, ExprError> {
        let v: &Value = input;
        match (name, args) {
            ("empty", []) => Ok(Flow::Continue),
            ("error", []) => Err(ExprError::Raised(v.clone())),
            ("error", [msg]) => self.run(msg, input, env, &mut |m| Err(ExprError::Raised(m.into_owned()))),
            ("not", []) => out(boolean(!truthy(v))),
            ("length", []) => out(owned(length(v)?)),
            ("keys", []) | ("keys_unsorted", []) => out(owned(keys(v)?)),
            ("type", []) => out(owned(Value::String(type_name(v).to_string()))),
            ("add", []) => out(owned(add(v)?)),
            ("reverse", []) => out(owned(reverse(v)?)),
            ("tostring", []) => out(owned(tostring(v))),
            ("tojson", []) => out(owned(Value::String(serde_json::to_string(v).unwrap_or_default()))),
            ("tonumber", []) => out(owned(tonumber(v)?)),
            ("ascii_downcase", []) => out(owned(ascii_case(v, false)?)),
            ("ascii_upcase", []) => out(owned(ascii_case(v, true)?)),
            ("to_entries", []) => out(owned(to_entries(v)?)),
            ("from_entries", []) => out(owned(from_entries(v)?)),
            ("flatten", []) => out(owned(flatten(v, f64::INFINITY)?)),
            ("flatten", [depth]) => self.with_arg(depth, input, env, out, |v, d| match d {
                Value::Number(n) => flatten(v, as_f64(n)),
                other => Err(type_err(format!("flatten depth must be a number, got {}", type_name(other)))),
            }),
            ("min", []) => out(owned(extreme(v, Ordering::Less)?)),
            ("max", []) => out(owned(extreme(v, Ordering::Greater)?)),
            ("sort", []) => {
                let mut items = require_array(v, "sorted")?.clone();
                value::sort_values(&mut items);
                out(owned(Value::Array(items)))
            }
            ("unique", []) => {
                let mut items = require_array(v, "sorted")?.clone();
                value::sort_values(&mut items);
                items.dedup_by(|a, b| equals(a, b));
                out(owned(Value::Array(items)))
            }
            ("first", []) => out(owned(value::index(v, &Value::from(0))?.clone())),
            ("last", []) => out(owned(value::index(v, &Value::from(-1))?.clone())),

            // type selectors
            ("values", []) => Self::keep_if(input, !v.is_null(), out),
            ("nulls", []) => Self::keep_if(input, v.is_null(), out),
            ("booleans", []) => Self::keep_if(input, v.is_boolean(), out),
            ("numbers", []) => Self::keep_if(input, v.is_number(), out),
            ("strings", []) => Self::keep_if(input, v.is_string(), out),
            ("arrays", []) => Self::keep_if(input, v.is_array(), out),
            ("objects", []) => Self::keep_if(input, v.is_object(), out),
            ("iterables", []) => Self::keep_if(input, v.is_array() || v.is_object(), out),
            ("scalars", []) => Self::keep_if(input, !(v.is_array() || v.is_object()), out),

            ("recurse", []) => self.recurse(input, out),
            ("recurse", [f]) => self.recurse_with(f, input, env, out),
            ("select", [f]) => self.run(f, input, env, &mut |c| Self::keep_if(input, truthy(&c), out)),
            ("map", [f]) => {
                let items = children(input).ok_or_else(|| value::cannot_iterate(v))?;
                let mut mapped = Vec::new();
                for item in &items {
                    mapped.extend(self.collect(f, item, env)?);
                }
                out(owned(Value::Array(mapped)))
            }
            ("map_values", [f]) => {
                let first = |item: &Val<'a>| -> Result<Option<Value>, ExprError> {
                    let mut found = None;
                    self.run(f, item, env, &mut |r| {
                        found = Some(r.into_owned());
                        Ok(Flow::Stop)
                    })?;
                    Ok(found)
                };
                let result = match v {
                    Value::Array(items) => {
                        let mut mapped = Vec::new();
                        for item in items {
                            mapped.extend(first(&Cow::Owned(item.clone()))?);
                        }
                        Value::Array(mapped)
                    }
                    Value::Object(map) => {
                        let mut mapped = Map::new();
                        for (key, item) in map {
                            if let Some(r) = first(&Cow::Owned(item.clone()))? {
                                mapped.insert(key.clone(), r);
                            }
                        }
                        Value::Object(mapped)
                    }
                    other => return Err(value::cannot_iterate(other)),
                };
                out(owned(result))
            }
            ("with_entries", [f]) => {
                let entries = Cow::Owned(to_entries(v)?);
                let mut mapped = Vec::new();
                for entry in children(&entries).unwrap_or_default() {
                    mapped.extend(self.collect(f, &entry, env)?);
                }
                out(owned(from_entries(&Value::Array(mapped))?))
            }
            ("has", [k]) => self.with_arg(k, input, env, out, |v, k| Ok(Value::Bool(has(v, k)?))),
            ("in", [c]) => self.with_arg(c, input, env, out, |v, c| Ok(Value::Bool(has(c, v)?))),
            ("contains", [x]) => {
                self.with_arg(x, input, env, out, |v, x| Ok(Value::Bool(value::contains(v, x)?)))
            }
            ("inside", [x]) => {
                self.with_arg(x, input, env, out, |v, x| Ok(Value::Bool(value::contains(x, v)?)))
            }
            ("startswith", [s]) => self.with_arg(s, input, env, out, |v, s| {
                let (v, s) = (require_str(v, "startswith")?, require_str(s, "startswith")?);
                Ok(Value::Bool(v.starts_with(s)))
            }),
            ("endswith", [s]) => self.with_arg(s, input, env, out, |v, s| {
                let (v, s) = (require_str(v, "endswith")?, require_str(s, "endswith")?);
                Ok(Value::Bool(v.ends_with(s)))
            }),
            ("ltrimstr", [s]) => self.with_arg(s, input, env, out, |v, s| {
                Ok(match (v.as_str(), s.as_str()) {
                    (Some(v), Some(s)) if v.starts_with(s) => Value::String(v[s.len()..].to_string()),
                    _ => v.clone(),
                })
            }),
            ("rtrimstr", [s]) => self.with_arg(s, input, env, out, |v, s| {
                Ok(match (v.as_str(), s.as_str()) {
                    (Some(v), Some(s)) if v.ends_with(s) => {
                        Value::String(v[..v.len() - s.len()].to_string())
                    }
                    _ => v.clone(),
                })
            }),
            ("split", [s]) => self.with_arg(s, input, env, out, |v, s| match (v, s) {
                (Value::String(v), Value::String(s)) => Ok(value::split(v, s)),
                _ => Err(type_err("split input and separator must be strings".to_string())),
            }),
            ("join", [s]) => self.with_arg(s, input, env, out, join),
            ("index", [s]) => self.with_arg(s, input, env, out, index_of),
            ("test", [re]) => self.with_arg(re, input, env, out, |v, re| self.test(v, re, &Value::Null)),
            ("test", [re, flags]) => self.run(flags, input, env, &mut |fl| {
                self.run(re, input, env, &mut |r| out(owned(self.test(v, &r, &fl)?)))
            }),

            ("any", []) => {
                let items = value::elements(v).ok_or_else(|| value::cannot_iterate(v))?;
                out(boolean(items.into_iter().any(truthy)))
            }
            ("all", []) => {
                let items = value::elements(v).ok_or_else(|| value::cannot_iterate(v))?;
                out(boolean(items.into_iter().all(truthy)))
            }
            ("any", [f]) | ("all", [f]) => {
                let items = children(input).ok_or_else(|| value::cannot_iterate(v))?;
                self.quantify(name == "any", out, |sink| {
                    for item in &items {
                        if self.run(f, item, env, sink)? == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                    Ok(Flow::Continue)
                })
            }
            ("any", [gen, cond]) | ("all", [gen, cond]) => {
                self.quantify(name == "any", out, |sink| {
                    self.run(gen, input, env, &mut |x| self.run(cond, &x, env, sink))
                })
            }
            ("IN", [s]) => self.quantify(true, out, |sink| {
                self.run(s, input, env, &mut |x| sink(boolean(equals(&x, v))))
            }),
            ("IN", [src, s]) => self.quantify(true, out, |sink| {
                self.run(src, input, env, &mut |x| {
                    self.run(s, input, env, &mut |y| sink(boolean(equals(&x, &y))))
                })
            }),
            ("isempty", [f]) => {
                let mut empty = true;
                self.run(f, input, env, &mut |_| {
                    empty = false;
                    Ok(Flow::Stop)
                })?;
                out(boolean(empty))
            }
            ("first", [f]) => {
                let mut flow = Flow::Continue;
                self.run(f, input, env, &mut |r| {
                    flow = out(r)?;
                    Ok(Flow::Stop)
                })?;
                Ok(flow)
            }
            ("last", [f]) => {
                let mut last = None;
                self.run(f, input, env, &mut |r| {
                    last = Some(r);
                    Ok(Flow::Continue)
                })?;
                match last {
                    Some(r) => out(r),
                    None => Ok(Flow::Continue),
                }
            }
            ("limit", [n, f]) => self.run(n, input, env, &mut |count| {
                let mut remaining = match &*count {
                    Value::Number(n) => as_f64(n),
                    other => {
                        return Err(type_err(format!(
                            "Invalid limit {}: must be a number",
                            describe(other)
                        )))
                    }
                };
                if remaining <= 0.0 {
                    return Ok(Flow::Continue);
                }
                let mut flow = Flow::Continue;
                self.run(f, input, env, &mut |r| {
                    flow = out(r)?;
                    remaining -= 1.0;
                    if flow == Flow::Stop || remaining <= 0.0 {
                        Ok(Flow::Stop)
                    } else {
                        Ok(Flow::Continue)
                    }
                })?;
                Ok(flow)
            }),
            ("range", [upto]) => self.run(upto, input, env, &mut |u| range(0.0, &u, out)),
            ("range", [from, upto]) => self.run(from, input, env, &mut |f| {
                let start = match &*f {
                    Value::Number(n) => as_f64(n),
                    other => return Err(type_err(format!("Range bounds must be numeric, got {}", describe(other)))),
                };
                self.run(upto, input, env, &mut |u| range(start, &u, out))
            }),
            ("sort_by", [f]) => {
                let items = self.keyed(f, input, env, "sorted")?;
                out(owned(Value::Array(items.into_iter().map(|(_, item)| item).collect())))
            }
            ("group_by", [f]) => {
                let groups = self.grouped(f, input, env)?;
                out(owned(Value::Array(groups.into_iter().map(Value::Array).collect())))
            }
            ("unique_by", [f]) => {
                let groups = self.grouped(f, input, env)?;
                out(owned(Value::Array(
                    groups.into_iter().filter_map(|g| g.into_iter().next()).collect(),
                )))
            }
            ("min_by", [f]) | ("max_by", [f]) => {
                let items = self.keyed(f, input, env, "compared")?;
                let picked = if name == "min_by" {
                    items.into_iter().next()
                } else {
                    items.into_iter().last()
                };
                out(picked.map_or_else(null, |(_, item)| owned(item)))
            }
            _ => Err(ExprError::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            }),
        }
    }
}

fn range<'a>(start: f64, upto: &Value, out: &mut Sink<'_, 'a>) -> Result<Flow, ExprError> {
    let end = match upto {
        Value::Number(n) => as_f64(n),
        other => return Err(type_err(format!("Range bounds must be numeric, got {}", describe(other)))),
    };
    let mut i = start;
    while i < end {
        if out(owned(number(i)))? == Flow::Stop {
            return Ok(Flow::Stop);
        }
        i += 1.0;
    }
    Ok(Flow::Continue)
}
