use std::cell::RefCell;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::ScriptError;
use crate::io::IOHandler;
use crate::value::Value;

thread_local! {
    /// Compiled patterns are cached per pattern string, since scripts
    /// commonly reuse the same `match(...)` pattern across many turns.
    static REGEX_CACHE: RefCell<FxHashMap<String, Regex>> = RefCell::new(FxHashMap::default());
}

/// Context a handful of built-ins need beyond their arguments: `print`
/// writes to the IOHandler's side channel, `current_state` reads the
/// engine's current state name (spec.md §4.6).
pub struct BuiltinCtx<'a> {
    pub io: &'a mut dyn IOHandler,
    pub current_state: &'a str,
}

/// Dispatches a call to the fixed built-in table (spec.md §4.6). Returns
/// `None` when `name` isn't a built-in, so the evaluator can decide how to
/// report "unknown function".
pub fn call(name: &str, args: Vec<Value>, line: usize, ctx: &mut BuiltinCtx) -> Option<Result<Value, ScriptError>> {
    Some(match name {
        "length" => length(&args, line),
        "upper" => string_fn(&args, line, "upper", str::to_uppercase),
        "lower" => string_fn(&args, line, "lower", str::to_lowercase),
        "trim" => string_fn(&args, line, "trim", |s| s.trim().to_string()),
        "contains" => str_str_bool(&args, line, "contains", |s, sub| s.contains(sub)),
        "startswith" => str_str_bool(&args, line, "startswith", |s, p| s.starts_with(p)),
        "endswith" => str_str_bool(&args, line, "endswith", |s, p| s.ends_with(p)),
        "replace" => replace(&args, line),
        "split" => split(&args, line),
        "join" => join(&args, line),

        "str" => Ok(arity1(&args, line, "str").map(|v| Value::Str(v.to_display_string()))?),
        "int" => int_of(&args, line),
        "float" => float_of(&args, line),
        "bool" => Ok(arity1(&args, line, "bool").map(|v| Value::Bool(v.truthy()))?),

        "first" => edge_element(&args, line, "first", |items| items.first()),
        "last" => edge_element(&args, line, "last", |items| items.last()),
        "append" => append(&args, line),
        "pop" => pop(&args, line),
        "slice" => slice(&args, line),

        "abs" => abs(&args, line),
        "min" => min_max(&args, line, "min", |a, b| a.min(b)),
        "max" => min_max(&args, line, "max", |a, b| a.max(b)),
        "round" => round(&args, line),

        "print" => {
            let text = args.iter().map(Value::to_display_string).collect::<Vec<_>>().join(" ");
            ctx.io.debug(&text);
            Ok(Value::Null)
        }
        "format" => format_fn(&args, line),
        "match" => match_fn(&args, line),
        "current_state" => Ok(Value::Str(ctx.current_state.to_string())),

        _ => return None,
    })
}

fn arity1(args: &[Value], line: usize, name: &str) -> Result<Value, ScriptError> {
    match args {
        [v] => Ok(v.clone()),
        _ => Err(ScriptError::runtime(line, format!("{name}() expects 1 argument, got {}", args.len()))),
    }
}

fn arity2<'a>(args: &'a [Value], line: usize, name: &str) -> Result<(&'a Value, &'a Value), ScriptError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(ScriptError::runtime(line, format!("{name}() expects 2 arguments, got {}", args.len()))),
    }
}

fn expect_str<'a>(v: &'a Value, line: usize, who: &str) -> Result<&'a str, ScriptError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::runtime(line, format!("{who} expects a string, got {}", other.type_name()))),
    }
}

fn expect_list<'a>(v: &'a Value, line: usize, who: &str) -> Result<&'a [Value], ScriptError> {
    match v {
        Value::List(items) => Ok(items),
        other => Err(ScriptError::runtime(line, format!("{who} expects a list, got {}", other.type_name()))),
    }
}

fn expect_number(v: &Value, line: usize, who: &str) -> Result<f64, ScriptError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(ScriptError::runtime(line, format!("{who} expects a number, got {}", other.type_name()))),
    }
}

fn length(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    match arity1(args, line, "length")? {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        other => Err(ScriptError::runtime(line, format!("length() expects a string or list, got {}", other.type_name()))),
    }
}

fn string_fn(args: &[Value], line: usize, name: &str, f: impl Fn(&str) -> String) -> Result<Value, ScriptError> {
    let v = arity1(args, line, name)?;
    let s = expect_str(&v, line, name)?;
    Ok(Value::Str(f(s)))
}

fn str_str_bool(args: &[Value], line: usize, name: &str, f: impl Fn(&str, &str) -> bool) -> Result<Value, ScriptError> {
    let (a, b) = arity2(args, line, name)?;
    let a = expect_str(a, line, name)?;
    let b = expect_str(b, line, name)?;
    Ok(Value::Bool(f(a, b)))
}

fn replace(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    match args {
        [s, a, b] => {
            let s = expect_str(s, line, "replace")?;
            let a = expect_str(a, line, "replace")?;
            let b = expect_str(b, line, "replace")?;
            Ok(Value::Str(s.replace(a, b)))
        }
        _ => Err(ScriptError::runtime(line, format!("replace() expects 3 arguments, got {}", args.len()))),
    }
}

fn split(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let (s, sep) = arity2(args, line, "split")?;
    let s = expect_str(s, line, "split")?;
    let sep = expect_str(sep, line, "split")?;
    let parts = if sep.is_empty() {
        s.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        s.split(sep).map(|p| Value::Str(p.to_string())).collect()
    };
    Ok(Value::List(parts))
}

fn join(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let (list, sep) = arity2(args, line, "join")?;
    let items = expect_list(list, line, "join")?;
    let sep = expect_str(sep, line, "join")?;
    let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
    Ok(Value::Str(parts.join(sep)))
}

fn int_of(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    match arity1(args, line, "int")? {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ScriptError::runtime(line, format!("cannot parse '{s}' as an integer"))),
        other => Err(ScriptError::runtime(line, format!("cannot convert {} to int", other.type_name()))),
    }
}

fn float_of(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    match arity1(args, line, "float")? {
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ScriptError::runtime(line, format!("cannot parse '{s}' as a floating-point number"))),
        other => Err(ScriptError::runtime(line, format!("cannot convert {} to float", other.type_name()))),
    }
}

fn edge_element(
    args: &[Value],
    line: usize,
    name: &str,
    pick: impl Fn(&[Value]) -> Option<&Value>,
) -> Result<Value, ScriptError> {
    let v = arity1(args, line, name)?;
    let items = expect_list(&v, line, name)?;
    pick(items)
        .cloned()
        .ok_or_else(|| ScriptError::runtime(line, format!("{name}() called on an empty list")))
}

/// Lists are value types here, so `append`/`pop` return a *new* list rather
/// than mutating the argument in place — scripts reassign the result, e.g.
/// `set xs = append(xs, 1)`.
fn append(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let (list, item) = arity2(args, line, "append")?;
    let mut items = expect_list(list, line, "append")?.to_vec();
    items.push(item.clone());
    Ok(Value::List(items))
}

fn pop(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let v = arity1(args, line, "pop")?;
    let mut items = expect_list(&v, line, "pop")?.to_vec();
    if items.pop().is_none() {
        return Err(ScriptError::runtime(line, "pop() called on an empty list"));
    }
    Ok(Value::List(items))
}

fn slice(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    match args {
        [list, start, end] => {
            let items = expect_list(list, line, "slice")?;
            let len = items.len() as i64;
            let clamp = |v: i64| v.clamp(0, len) as usize;
            let start = clamp(expect_number(start, line, "slice")? as i64);
            let end = clamp(expect_number(end, line, "slice")? as i64);
            if start >= end {
                Ok(Value::List(vec![]))
            } else {
                Ok(Value::List(items[start..end].to_vec()))
            }
        }
        _ => Err(ScriptError::runtime(line, format!("slice() expects 3 arguments, got {}", args.len()))),
    }
}

fn abs(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    match arity1(args, line, "abs")? {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(ScriptError::runtime(line, format!("abs() expects a number, got {}", other.type_name()))),
    }
}

fn min_max(args: &[Value], line: usize, name: &str, pick: impl Fn(f64, f64) -> f64) -> Result<Value, ScriptError> {
    let (a, b) = arity2(args, line, name)?;
    let is_float = matches!(a, Value::Float(_)) || matches!(b, Value::Float(_));
    let x = expect_number(a, line, name)?;
    let y = expect_number(b, line, name)?;
    let result = pick(x, y);
    Ok(if is_float { Value::Float(result) } else { Value::Int(result as i64) })
}

fn round(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let x = expect_number(&arity1(args, line, "round")?, line, "round")?;
    let rounded = if x >= 0.0 { (x + 0.5).floor() } else { (x - 0.5).ceil() };
    Ok(Value::Int(rounded as i64))
}

fn format_fn(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let Some((template, rest)) = args.split_first() else {
        return Err(ScriptError::runtime(line, "format() expects at least 1 argument"));
    };
    let template = expect_str(template, line, "format")?;
    let mut result = String::with_capacity(template.len());
    let mut args = rest.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'}') {
            chars.next();
            match args.next() {
                Some(v) => result.push_str(&v.to_display_string()),
                None => return Err(ScriptError::runtime(line, "format() has more '{}' placeholders than arguments")),
            }
        } else {
            result.push(c);
        }
    }
    Ok(Value::Str(result))
}

fn match_fn(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let (pattern, s) = arity2(args, line, "match")?;
    let pattern = expect_str(pattern, line, "match")?;
    let s = expect_str(s, line, "match")?;
    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if !cache.contains_key(pattern) {
            let compiled = Regex::new(pattern)
                .map_err(|e| ScriptError::runtime(line, format!("invalid regex '{pattern}': {e}")))?;
            cache.insert(pattern.to_string(), compiled);
        }
        Ok(Value::Bool(cache[pattern].is_match(s)))
    })
}
