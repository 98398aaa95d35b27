//! Deterministic offline model.
//!
//! Embeddings are hashed bags of words: each word (truncated to its first five
//! characters, so `ordered` and `order` share a bucket) adds 1 to one of
//! `dims` buckets. Generation pops queued responses in order. When the queue
//! is empty the model either fails or, in offline mode, answers with the
//! skeleton of the requested schema (or echoes the prompt when no schema was
//! given).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use super::{LanguageModel, LlmError, LlmResult};

const STEM_LEN: usize = 5;

/// A recorded `generate` call.
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub prompt: String,
    pub format: Option<Value>,
}

#[derive(Debug)]
pub struct ScriptedModel {
    dims: usize,
    offline: bool,
    responses: Mutex<VecDeque<String>>,
    fixed_embeddings: Mutex<HashMap<String, Vec<f32>>>,
    calls: Mutex<Vec<GenerateCall>>,
    embed_calls: AtomicUsize,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ScriptedModel {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(2),
            offline: false,
            responses: Mutex::new(VecDeque::new()),
            fixed_embeddings: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// A model that never runs out of answers.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in responses {
            self.push_response(r);
        }
        self
    }

    /// Queue the answer for the next `generate` call.
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(response.into());
    }

    /// Return `vector` for exactly `text` instead of the hashed embedding.
    pub fn set_embedding(&self, text: impl Into<String>, vector: Vec<f32>) {
        lock(&self.fixed_embeddings).insert(text.into(), vector);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        lock(&self.calls).clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        lock(&self.calls).last().map(|c| c.prompt.clone())
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        // Constant component keeps word-less text off the zero vector.
        v[0] = 0.1;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let stem: String = word.to_lowercase().chars().take(STEM_LEN).collect();
            let bucket = 1 + (fnv1a(stem.as_bytes()) as usize) % (self.dims - 1);
            v[bucket] += 1.0;
        }
        v
    }
}

impl LanguageModel for ScriptedModel {
    fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(v) = lock(&self.fixed_embeddings).get(text) {
            return Ok(v.clone());
        }
        Ok(self.hashed(text))
    }

    fn generate(&self, prompt: &str, format: Option<&Value>) -> LlmResult<String> {
        lock(&self.calls).push(GenerateCall {
            prompt: prompt.to_string(),
            format: format.cloned(),
        });
        if let Some(response) = lock(&self.responses).pop_front() {
            return Ok(response);
        }
        match (self.offline, format) {
            (true, Some(schema)) => Ok(skeleton(schema).to_string()),
            (true, None) => Ok(prompt.to_string()),
            (false, _) => Err(LlmError::RequestFailed {
                message: "scripted model has no response queued".into(),
            }),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// The least committal value satisfying `schema`.
fn skeleton(schema: &Value) -> Value {
    if let Some(c) = schema.get("const") {
        return c.clone();
    }
    if let Some(first) = schema["enum"].as_array().and_then(|e| e.first()) {
        return first.clone();
    }
    if let Some(alternatives) = schema["anyOf"].as_array() {
        if alternatives.iter().any(|a| a["type"] == "null") {
            return Value::Null;
        }
        return alternatives.first().map(skeleton).unwrap_or(Value::Null);
    }
    match schema["type"].as_str() {
        Some("object") => {
            let mut out = serde_json::Map::new();
            if let Some(props) = schema["properties"].as_object() {
                for (key, sub) in props {
                    out.insert(key.clone(), skeleton(sub));
                }
            }
            Value::Object(out)
        }
        Some("array") => Value::Array(Vec::new()),
        Some("number" | "integer") => Value::from(0),
        Some("string") => Value::String("_".into()),
        _ => Value::Null,
    }
}
