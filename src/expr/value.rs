//! Value semantics: truthiness, ordering, arithmetic

use super::parser::BinOp;
use super::ExprError;
use crate::document::type_name;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// `null` and `false` are falsy, everything else is truthy
pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Build a number, keeping integral values as integers
pub fn number(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(0.0)
}

/// `type (value)` with the value shortened, for error messages
pub fn describe(value: &Value) -> String {
    let mut text = serde_json::to_string(value).unwrap_or_default();
    if text.len() > 11 {
        let mut cut = 10;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    format!("{} ({})", type_name(value), text)
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

fn sorted_keys(map: &Map<String, Value>) -> Vec<&String> {
    let mut keys: Vec<_> = map.keys().collect();
    keys.sort();
    keys
}

/// Total order over values:
/// null < false < true < numbers < strings < arrays < objects
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => as_f64(x)
            .partial_cmp(&as_f64(y))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let kx = sorted_keys(x);
            let ky = sorted_keys(y);
            let ord = kx.cmp(&ky);
            if ord != Ordering::Equal {
                return ord;
            }
            for key in kx {
                let ord = compare(&x[key.as_str()], &y[key.as_str()]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Structural equality where `1 == 1.0`
pub fn equals(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Upper bound on the length of a string built by `string * number`
pub const MAX_REPEAT_LEN: usize = 16 * 1024 * 1024;

/// Repeat `s` `ceil(times)` times, refusing results over [`MAX_REPEAT_LEN`] bytes
fn repeat(s: &str, times: f64) -> Result<String, ExprError> {
    if s.is_empty() {
        return Ok(String::new());
    }
    let count = times.ceil();
    let len = if count.is_finite() && count <= MAX_REPEAT_LEN as f64 {
        s.len().checked_mul(count as usize)
    } else {
        None
    };
    match len {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(s.repeat(count as usize)),
        _ => Err(ExprError::Type(format!(
            "Repeat string result too long: {} * {}",
            describe(&Value::String(s.to_string())),
            times
        ))),
    }
}

fn type_error(l: &Value, r: &Value, verb: &str) -> ExprError {
    ExprError::Type(format!("{} and {} cannot be {}", describe(l), describe(r), verb))
}

fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let next = match (merged.get(key), value) {
            (Some(Value::Object(a)), Value::Object(b)) => Value::Object(deep_merge(a, b)),
            _ => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

/// Apply a binary operator
pub fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    use Value::*;
    let result = match op {
        BinOp::Eq => Bool(equals(l, r)),
        BinOp::Ne => Bool(!equals(l, r)),
        BinOp::Lt => Bool(compare(l, r) == Ordering::Less),
        BinOp::Le => Bool(compare(l, r) != Ordering::Greater),
        BinOp::Gt => Bool(compare(l, r) == Ordering::Greater),
        BinOp::Ge => Bool(compare(l, r) != Ordering::Less),
        BinOp::Add => match (l, r) {
            (Null, other) | (other, Null) => other.clone(),
            (Number(a), Number(b)) => number(as_f64(a) + as_f64(b)),
            (String(a), String(b)) => String(format!("{}{}", a, b)),
            (Array(a), Array(b)) => Array(a.iter().chain(b).cloned().collect()),
            (Object(a), Object(b)) => {
                let mut merged = a.clone();
                merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                Object(merged)
            }
            _ => return Err(type_error(l, r, "added")),
        },
        BinOp::Sub => match (l, r) {
            (Number(a), Number(b)) => number(as_f64(a) - as_f64(b)),
            (Array(a), Array(b)) => Array(
                a.iter()
                    .filter(|item| !b.iter().any(|x| equals(item, x)))
                    .cloned()
                    .collect(),
            ),
            _ => return Err(type_error(l, r, "subtracted")),
        },
        BinOp::Mul => match (l, r) {
            (Number(a), Number(b)) => number(as_f64(a) * as_f64(b)),
            (String(s), Number(n)) | (Number(n), String(s)) => {
                let times = as_f64(n);
                if times <= 0.0 {
                    Null
                } else {
                    String(repeat(s, times)?)
                }
            }
            (Object(a), Object(b)) => Object(deep_merge(a, b)),
            _ => return Err(type_error(l, r, "multiplied")),
        },
        BinOp::Div => match (l, r) {
            (Number(a), Number(b)) => {
                if as_f64(b) == 0.0 {
                    return Err(type_error(l, r, "divided because the divisor is zero"));
                }
                number(as_f64(a) / as_f64(b))
            }
            (String(a), String(b)) => split(a, b),
            _ => return Err(type_error(l, r, "divided")),
        },
        BinOp::Mod => match (l, r) {
            (Number(a), Number(b)) => {
                let divisor = as_f64(b) as i64;
                if divisor == 0 {
                    return Err(type_error(l, r, "divided because the divisor is zero"));
                }
                Value::from((as_f64(a) as i64).wrapping_rem(divisor))
            }
            _ => return Err(type_error(l, r, "divided")),
        },
    };
    Ok(result)
}

/// Split a string on a separator; an empty separator splits into characters
pub fn split(s: &str, separator: &str) -> Value {
    if s.is_empty() {
        return Value::Array(Vec::new());
    }
    if separator.is_empty() {
        return Value::Array(s.chars().map(|c| Value::String(c.to_string())).collect());
    }
    Value::Array(
        s.split(separator)
            .map(|part| Value::String(part.to_string()))
            .collect(),
    )
}

/// Containment: substrings, sub-arrays (any order) and sub-objects, recursively
pub fn contains(a: &Value, b: &Value) -> Result<bool, ExprError> {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            for (key, wanted) in y {
                match x.get(key) {
                    Some(have) if contains(have, wanted)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        (Value::Array(x), Value::Array(y)) => {
            for wanted in y {
                let mut found = false;
                for have in x {
                    if contains(have, wanted)? {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::String(x), Value::String(y)) => Ok(x.contains(y.as_str())),
        _ if rank(a) == rank(b) || (a.is_boolean() && b.is_boolean()) => Ok(equals(a, b)),
        _ => Err(ExprError::Type(format!(
            "{} and {} cannot have their containment checked",
            describe(a),
            describe(b)
        ))),
    }
}

/// Elements of an array or values of an object
pub fn elements(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(map) => Some(map.values().collect()),
        _ => None,
    }
}

pub fn cannot_iterate(value: &Value) -> ExprError {
    ExprError::Type(format!("Cannot iterate over {}", describe(value)))
}

/// `.[key]` on a borrowed value
pub fn index<'v>(value: &'v Value, key: &Value) -> Result<&'v Value, ExprError> {
    static NULL: Value = Value::Null;
    match (value, key) {
        (Value::Null, Value::String(_) | Value::Number(_) | Value::Null) => Ok(&NULL),
        (Value::Object(map), Value::String(k)) => Ok(map.get(k).unwrap_or(&NULL)),
        (Value::Array(items), Value::Number(n)) => {
            let len = items.len() as f64;
            let mut i = as_f64(n).floor();
            if i < 0.0 {
                i += len;
            }
            if i < 0.0 || i >= len {
                Ok(&NULL)
            } else {
                Ok(&items[i as usize])
            }
        }
        (_, Value::String(k)) => Err(ExprError::Type(format!(
            "Cannot index {} with \"{}\"",
            type_name(value),
            k
        ))),
        _ => Err(ExprError::Type(format!(
            "Cannot index {} with {}",
            type_name(value),
            type_name(key)
        ))),
    }
}

fn slice_bounds(len: usize, from: &Value, to: &Value) -> Result<(usize, usize), ExprError> {
    let len_f = len as f64;
    let resolve = |bound: &Value, default: f64, round: fn(f64) -> f64| -> Result<usize, ExprError> {
        let raw = match bound {
            Value::Null => default,
            Value::Number(n) => round(as_f64(n)),
            other => {
                return Err(ExprError::Type(format!(
                    "Start and end indices of a slice must be numbers, got {}",
                    type_name(other)
                )))
            }
        };
        let adjusted = if raw < 0.0 { raw + len_f } else { raw };
        Ok(adjusted.clamp(0.0, len_f) as usize)
    };
    let start = resolve(from, 0.0, f64::floor)?;
    let end = resolve(to, len_f, f64::ceil)?;
    Ok((start, end.max(start)))
}

/// `.[from:to]` on arrays and strings
pub fn slice(value: &Value, from: &Value, to: &Value) -> Result<Value, ExprError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let (start, end) = slice_bounds(items.len(), from, to)?;
            Ok(Value::Array(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), from, to)?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(ExprError::Type(format!("Cannot index {} with object", type_name(other)))),
    }
}

/// Sort values with the total order, keeping equal elements in place
pub fn sort_values(values: &mut [Value]) {
    values.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(truthy(&json!(0)));
        assert!(truthy(&json!("")));
        assert!(truthy(&json!([])));
    }

    #[test]
    fn test_ordering() {
        let mut values = vec![
            json!({"a": 1}),
            json!([1]),
            json!("b"),
            json!(2),
            json!(true),
            json!(false),
            json!(null),
            json!("a"),
        ];
        sort_values(&mut values);
        assert_eq!(
            values,
            vec![
                json!(null),
                json!(false),
                json!(true),
                json!(2),
                json!("a"),
                json!("b"),
                json!([1]),
                json!({"a": 1}),
            ]
        );
    }

    #[test]
    fn test_numeric_equality() {
        assert!(equals(&json!(1), &json!(1.0)));
        assert_eq!(number(3.0), json!(3));
        assert_eq!(number(0.5), json!(0.5));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(BinOp::Add, &json!(1), &json!(2)).unwrap(), json!(3));
        assert_eq!(binary(BinOp::Add, &json!(null), &json!("x")).unwrap(), json!("x"));
        assert_eq!(binary(BinOp::Add, &json!([1]), &json!([2])).unwrap(), json!([1, 2]));
        assert_eq!(
            binary(BinOp::Add, &json!({"a": 1}), &json!({"b": 2})).unwrap(),
            json!({"a": 1, "b": 2})
        );
        assert_eq!(binary(BinOp::Sub, &json!([1, 2, 1]), &json!([1])).unwrap(), json!([2]));
        assert_eq!(binary(BinOp::Div, &json!("a,b"), &json!(",")).unwrap(), json!(["a", "b"]));
        assert_eq!(binary(BinOp::Mod, &json!(7), &json!(3)).unwrap(), json!(1));
        assert_eq!(
            binary(BinOp::Mul, &json!({"a": {"b": 1}}), &json!({"a": {"c": 2}})).unwrap(),
            json!({"a": {"b": 1, "c": 2}})
        );
    }

    #[test]
    fn test_arithmetic_errors() {
        let err = binary(BinOp::Add, &json!({}), &json!(1)).unwrap_err();
        assert_eq!(err.to_string(), "object ({}) and number (1) cannot be added");
        assert!(binary(BinOp::Div, &json!(1), &json!(0)).is_err());
        assert!(binary(BinOp::Mod, &json!(1), &json!(0)).is_err());
    }

    #[test]
    fn test_string_repeat() {
        assert_eq!(binary(BinOp::Mul, &json!("ab"), &json!(2.5)).unwrap(), json!("ababab"));
        assert_eq!(binary(BinOp::Mul, &json!(2), &json!("x")).unwrap(), json!("xx"));
        assert_eq!(binary(BinOp::Mul, &json!("x"), &json!(0)).unwrap(), json!(null));
        assert_eq!(binary(BinOp::Mul, &json!(""), &json!(1e19)).unwrap(), json!(""));

        for times in [json!(1e19), json!(1e300), json!(MAX_REPEAT_LEN + 1)] {
            let err = binary(BinOp::Mul, &json!("web"), &times).unwrap_err();
            assert!(matches!(err, ExprError::Type(_)));
            assert!(err.to_string().starts_with("Repeat string result too long"), "{}", err);
        }
    }

    #[test]
    fn test_contains() {
        assert!(contains(&json!("foobar"), &json!("bar")).unwrap());
        assert!(contains(&json!(["abc", "def"]), &json!(["bc"])).unwrap());
        assert!(contains(&json!({"a": {"b": 1, "c": 2}}), &json!({"a": {"b": 1}})).unwrap());
        assert!(!contains(&json!({"a": 1}), &json!({"b": 1})).unwrap());
        assert!(contains(&json!(1), &json!("1")).is_err());
    }

    #[test]
    fn test_index_and_slice() {
        let arr = json!([1, 2, 3]);
        assert_eq!(index(&arr, &json!(-1)).unwrap(), &json!(3));
        assert_eq!(index(&arr, &json!(5)).unwrap(), &json!(null));
        assert_eq!(index(&json!(null), &json!("a")).unwrap(), &json!(null));
        let err = index(&json!("s"), &json!("a")).unwrap_err();
        assert_eq!(err.to_string(), "Cannot index string with \"a\"");

        assert_eq!(slice(&arr, &json!(1), &json!(null)).unwrap(), json!([2, 3]));
        assert_eq!(slice(&arr, &json!(-2), &json!(null)).unwrap(), json!([2, 3]));
        assert_eq!(slice(&json!("hello"), &json!(1), &json!(3)).unwrap(), json!("el"));
        assert_eq!(slice(&arr, &json!(2), &json!(1)).unwrap(), json!([]));
    }
}
