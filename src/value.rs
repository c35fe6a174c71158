use crate::error::ScriptError;

/// The runtime value variant from spec.md §3: a tagged union over
/// `{null, boolean, integer, floating, string, list<Value>}`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Truthiness per spec.md §4.3: `false`, `null`, `0`, `0.0`, `""`, and
    /// an empty list are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "floating",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// `str(x)` per spec.md §4.6: null → `"null"`, booleans → `"true"`/
    /// `"false"`, numbers → canonical decimal, lists → `[a, b, ...]`.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Structural equality with the cross-tag number coercion spec.md §3
    /// requires; other cross-tag comparisons are simply unequal.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(a, b)| Value::values_equal(a, b))
            }
            (a, b) if a.numeric().is_some() && b.numeric().is_some() => a.numeric() == b.numeric(),
            _ => false,
        }
    }

    /// Ordering comparison per spec.md §4.4: allowed for number↔number and
    /// string↔string, an error otherwise.
    pub fn compare(a: &Value, b: &Value, line: usize) -> Result<std::cmp::Ordering, ScriptError> {
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
            _ => match (a.numeric(), b.numeric()) {
                (Some(x), Some(y)) => x
                    .partial_cmp(&y)
                    .ok_or_else(|| ScriptError::runtime(line, "cannot compare NaN")),
                _ => Err(ScriptError::runtime(
                    line,
                    format!("cannot order {} and {}", a.type_name(), b.type_name()),
                )),
            },
        }
    }
}

/// Canonical decimal rendering: integral floats print without a fractional
/// part suppressed (`2.0`, not `2`), matching the "floating" tag staying
/// visibly distinct from "integer" in user-facing output.
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_values() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::Str("".into()).truthy());
        assert!(!Value::List(vec![]).truthy());
    }

    #[test]
    fn truthy_values() {
        assert!(Value::Int(1).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(Value::List(vec![Value::Null]).truthy());
    }

    #[test]
    fn str_conversion_rules() {
        assert_eq!(Value::Null.to_display_string(), "null");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
        assert_eq!(Value::Int(3).to_display_string(), "3");
        assert_eq!(Value::Float(2.0).to_display_string(), "2.0");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_display_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn cross_tag_number_equality() {
        assert!(Value::values_equal(&Value::Int(2), &Value::Float(2.0)));
        assert!(!Value::values_equal(&Value::Int(2), &Value::Str("2".into())));
    }

    #[test]
    fn ordering_errors_across_incompatible_tags() {
        assert!(Value::compare(&Value::Str("a".into()), &Value::Int(1), 1).is_err());
    }
}
