//! Schema inference over same-shape example terms.
//!
//! Examples are heterogeneous: some are ground facts, some carry placeholders
//! or plan variables. Each argument slot accepts the union of every kind
//! observed at that position, so the generation service is constrained to the
//! shapes the agents actually use and nothing narrower.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{RecordError, RecordResult, SchemaError, SchemaResult};
use crate::term::record::{arg_key, FUNCTOR_KEY};
use crate::term::{Arg, ArgKind, Term};

/// Accepted kinds and variable-name hints for one argument position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub key: String,
    pub kinds: BTreeSet<ArgKind>,
    /// Variable names seen at this position across the examples.
    pub hints: BTreeSet<String>,
}

impl Slot {
    /// Whether a generated argument of `kind` may fill this slot.
    ///
    /// A placeholder always fits. Positions that held a variable or `_` in
    /// the examples take any value, and an atom fits a string position since
    /// unquoted model output reads back as an atom.
    pub fn accepts(&self, kind: ArgKind) -> bool {
        kind == ArgKind::Placeholder
            || self.kinds.contains(&kind)
            || self.kinds.contains(&ArgKind::Variable)
            || self.kinds.contains(&ArgKind::Placeholder)
            || (kind == ArgKind::Atom && self.kinds.contains(&ArgKind::Text))
    }
}

/// Inferred shape of a `functor/arity` family of terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub functor: String,
    pub slots: Vec<Slot>,
}

impl Schema {
    /// Infer a schema from `examples`, which must be non-empty and share
    /// functor and arity with the first one.
    pub fn infer(examples: &[Term]) -> SchemaResult<Self> {
        let first = examples.first().ok_or(SchemaError::EmptyExamples)?;
        let mut slots: Vec<Slot> = (0..first.arity())
            .map(|i| Slot {
                key: arg_key(i),
                kinds: BTreeSet::new(),
                hints: BTreeSet::new(),
            })
            .collect();

        for example in examples {
            if !example.same_shape(first) {
                return Err(SchemaError::ShapeMismatch {
                    expected: first.indicator(),
                    found: example.to_string(),
                });
            }
            for (slot, arg) in slots.iter_mut().zip(example.args()) {
                slot.kinds.insert(arg.kind());
                if let Arg::Variable(name) = arg {
                    slot.hints.insert(name.clone());
                }
            }
        }

        Ok(Self {
            functor: first.functor().to_string(),
            slots,
        })
    }

    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Zero-arity: nothing for the generation service to fill.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Check a generated term against this schema.
    pub fn check(&self, term: &Term) -> RecordResult<()> {
        let mismatch = |reason: String| RecordError::SchemaMismatch {
            expected: self.indicator(),
            found: term.to_string(),
            reason,
        };
        if term.functor() != self.functor {
            return Err(mismatch(format!("functor is not \"{}\"", self.functor)));
        }
        if term.arity() != self.arity() {
            return Err(mismatch(format!(
                "expected {} arguments, got {}",
                self.arity(),
                term.arity()
            )));
        }
        for (slot, arg) in self.slots.iter().zip(term.args()) {
            let kind = arg.kind();
            if !slot.accepts(kind) {
                return Err(mismatch(format!(
                    "{} is {}, not {}",
                    slot.key,
                    kind.as_str(),
                    slot.kinds
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(" or ")
                )));
            }
        }
        Ok(())
    }

    /// `functor/arity` of the terms this schema describes.
    pub fn indicator(&self) -> String {
        format!("{}/{}", self.functor, self.arity())
    }

    /// JSON Schema for the record the generation service must return.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(
            FUNCTOR_KEY.into(),
            json!({ "type": "string", "const": self.functor }),
        );
        let mut required = vec![Value::String(FUNCTOR_KEY.into())];

        for slot in &self.slots {
            let alternatives: Vec<Value> = slot.kinds.iter().map(|k| kind_schema(*k)).collect();
            let description = slot
                .kinds
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(" or ");
            properties.insert(
                slot.key.clone(),
                json!({
                    "anyOf": alternatives,
                    "description": format!("This field contains: {description}"),
                }),
            );
            required.push(Value::String(slot.key.clone()));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// One prompt line per slot that carried named variables in the examples.
    pub fn hint_lines(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| !s.hints.is_empty())
            .map(|s| {
                let names: Vec<&str> = s.hints.iter().map(String::as_str).collect();
                format!(
                    " - {} should contain [{}]; if this piece of information is in the sentence \
                     place it here, otherwise place underscore or null",
                    s.key,
                    names.join(", ")
                )
            })
            .collect()
    }
}

fn kind_schema(kind: ArgKind) -> Value {
    match kind {
        ArgKind::Atom => json!({ "type": "string", "pattern": "^[a-z][A-Za-z0-9_]*$" }),
        ArgKind::Variable => json!({ "type": "string", "pattern": "^[A-Z][A-Za-z0-9_]*$" }),
        ArgKind::Compound => {
            json!({ "type": "string", "pattern": "^~?[a-z][A-Za-z0-9_]*\\(.*\\)$" })
        }
        ArgKind::Text => json!({ "type": "string" }),
        ArgKind::Number => json!({ "type": "number" }),
        ArgKind::List => json!({ "type": "array" }),
        ArgKind::Placeholder => json!({ "type": "null" }),
    }
}
