//! Term ⇄ flat JSON record conversion.
//!
//! `p(a, "x", 1)` becomes `{"functor": "p", "arg0": "a", "arg1": "\"x\"", "arg2": 1}`.
//! String values carry the argument's source syntax, so the record
//! distinguishes atoms from strings and variables without side channels.
//! `null`, `"null"`, the empty string and anything starting with `_` read back
//! as [`Arg::Placeholder`].

use serde_json::{Map, Number, Value};

use crate::error::{RecordError, RecordResult};

use super::{is_functor, parse_arg, Arg, Term};

/// A term record: `functor` plus `arg0..argN`.
pub type Record = Map<String, Value>;

pub const FUNCTOR_KEY: &str = "functor";

/// Key of the `index`-th argument.
pub fn arg_key(index: usize) -> String {
    format!("arg{index}")
}

/// Flatten one level of `term` into a record.
pub fn to_record(term: &Term) -> Record {
    let mut record = Record::new();
    record.insert(FUNCTOR_KEY.into(), Value::String(term.functor().to_string()));
    for (i, arg) in term.args().iter().enumerate() {
        record.insert(arg_key(i), arg_to_value(arg));
    }
    record
}

fn arg_to_value(arg: &Arg) -> Value {
    match arg {
        Arg::Placeholder => Value::Null,
        // Quoted so the atom is not read back as a placeholder marker.
        Arg::Atom(name) if is_placeholder_marker(name) => {
            Value::String(format!("'{}'", name.replace('\'', "\\'")))
        }
        Arg::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Value::from(*n as i64),
        // Non-finite numbers have no JSON or source form.
        Arg::Number(n) => Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Arg::List(items) => Value::Array(items.iter().map(arg_to_value).collect()),
        other => Value::String(other.to_string()),
    }
}

/// Rebuild a term from a record.
pub fn from_record(record: &Record) -> RecordResult<Term> {
    let functor = match record.get(FUNCTOR_KEY) {
        Some(Value::String(f)) => f.trim(),
        _ => return Err(RecordError::MissingFunctor),
    };
    if !is_functor(functor) {
        return Err(RecordError::InvalidFunctor {
            value: functor.to_string(),
        });
    }

    let mut arity = 0;
    for key in record.keys() {
        if key == FUNCTOR_KEY {
            continue;
        }
        let valid = key
            .strip_prefix("arg")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(RecordError::UnexpectedKey { key: key.clone() });
        }
        arity += 1;
    }

    let mut args = Vec::with_capacity(arity);
    for i in 0..arity {
        let key = arg_key(i);
        let value = record
            .get(&key)
            .ok_or_else(|| RecordError::MissingArgument { key: key.clone() })?;
        args.push(value_to_arg(&key, value)?);
    }
    Ok(Term::new(functor, args))
}

fn value_to_arg(key: &str, value: &Value) -> RecordResult<Arg> {
    Ok(match value {
        Value::Null => Arg::Placeholder,
        Value::Bool(b) => Arg::atom(b.to_string()),
        Value::Number(n) => match n.as_f64() {
            Some(f) => Arg::Number(f),
            None => {
                return Err(RecordError::InvalidValue {
                    key: key.to_string(),
                    message: format!("number {n} is out of range"),
                });
            }
        },
        Value::String(s) => {
            let s = s.trim();
            if is_placeholder_marker(s) {
                Arg::Placeholder
            } else {
                // Free text the model wrote without quoting stays a string.
                parse_arg(s).unwrap_or_else(|_| Arg::text(s))
            }
        }
        Value::Array(items) => Arg::List(
            items
                .iter()
                .map(|v| value_to_arg(key, v))
                .collect::<RecordResult<_>>()?,
        ),
        Value::Object(nested) if nested.contains_key(FUNCTOR_KEY) => {
            Arg::from(from_record(nested)?)
        }
        Value::Object(_) => {
            return Err(RecordError::InvalidValue {
                key: key.to_string(),
                message: "nested objects must be term records with a \"functor\" key".into(),
            });
        }
    })
}

fn is_placeholder_marker(s: &str) -> bool {
    s.is_empty() || s == "null" || s.starts_with('_')
}

/// Parse a generation response into a record, tolerating Markdown code fences.
pub fn parse_record(response: &str) -> RecordResult<Record> {
    let value: Value =
        serde_json::from_str(strip_code_fences(response)).map_err(|e| RecordError::Json {
            message: e.to_string(),
        })?;
    match value {
        Value::Object(record) => Ok(record),
        other => Err(RecordError::NotAnObject {
            found: json_kind(&other).to_string(),
        }),
    }
}

/// Strip a surrounding ```` ```json ... ``` ```` fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
