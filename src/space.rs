//! The embedding space: a two-tier vector index with per-agent domains.
//!
//! Every known term lives in exactly one [`Subspace`]: achievement goals in
//! `plans`, everything else in `terms`. Each agent has a domain, the subset of
//! indexed terms it knows, which scopes retrieval to the agents a sentence is
//! addressed to.
//!
//! The index is append-only. A term is embedded at most once no matter how
//! many agents contribute it: lookups go through concurrent maps, and the
//! embed-and-insert of a new term happens under a single writer lock with a
//! re-check, so two concurrent `add`s of the same term cost one embed call.

use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use dashmap::DashMap;
use regex::Regex;

use crate::distance::{cosine_distance, is_storable};
use crate::error::{SpaceError, SpaceResult, VectorError};
use crate::llm::LanguageModel;
use crate::message::Force;
use crate::term::Term;

/// Partition of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subspace {
    /// Facts, rule heads and bodies, guard predicates, non-goal triggers.
    Terms,
    /// Achievement-goal triggers.
    Plans,
}

impl Subspace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terms => "terms",
            Self::Plans => "plans",
        }
    }
}

impl fmt::Display for Subspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subspace {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terms" => Ok(Self::Terms),
            "plans" => Ok(Self::Plans),
            other => Err(SpaceError::UnknownSubspace {
                name: other.to_string(),
            }),
        }
    }
}

type Vector = Arc<[f32]>;

/// Term embeddings split into subspaces, with per-agent domains.
pub struct EmbeddingSpace {
    model: Arc<dyn LanguageModel>,
    terms: DashMap<Term, Vector>,
    plans: DashMap<Term, Vector>,
    /// Agent name → known terms, in insertion order.
    domains: DashMap<String, Vec<Term>>,
    writer: Mutex<()>,
}

impl EmbeddingSpace {
    /// Create an empty space that embeds through `model`.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            terms: DashMap::new(),
            plans: DashMap::new(),
            domains: DashMap::new(),
            writer: Mutex::new(()),
        }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    fn map(&self, subspace: Subspace) -> &DashMap<Term, Vector> {
        match subspace {
            Subspace::Terms => &self.terms,
            Subspace::Plans => &self.plans,
        }
    }

    /// Indexed in `subspace`.
    pub fn contains_in(&self, subspace: Subspace, term: &Term) -> bool {
        self.map(subspace).contains_key(term)
    }

    /// Indexed in either subspace.
    pub fn contains(&self, term: &Term) -> bool {
        self.subspace_of(term).is_some()
    }

    pub fn subspace_of(&self, term: &Term) -> Option<Subspace> {
        if self.terms.contains_key(term) {
            Some(Subspace::Terms)
        } else if self.plans.contains_key(term) {
            Some(Subspace::Plans)
        } else {
            None
        }
    }

    /// Number of terms indexed in `subspace`.
    pub fn len(&self, subspace: Subspace) -> usize {
        self.map(subspace).len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.plans.is_empty()
    }

    /// Make `agent` known even if it contributes no terms.
    pub fn register_agent(&self, agent: &str) {
        self.domains.entry(agent.to_string()).or_default();
    }

    pub fn knows_agent(&self, agent: &str) -> bool {
        self.domains.contains_key(agent)
    }

    /// Known agent names, sorted.
    pub fn agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.domains.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Terms in `agent`'s domain, in the order they were added.
    pub fn domain(&self, agent: &str) -> Vec<Term> {
        self.domains
            .get(agent)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }

    /// Index `term` in `subspace` for `agent`.
    ///
    /// Returns `true` when the term was new and got embedded, `false` when it
    /// was already indexed and only the domain grew. A term already present in
    /// the other subspace stays there.
    pub fn add(&self, agent: &str, subspace: Subspace, term: &Term) -> SpaceResult<bool> {
        if self.extend_if_indexed(agent, subspace, term) {
            return Ok(false);
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.extend_if_indexed(agent, subspace, term) {
            return Ok(false);
        }

        let text = preprocess(term);
        let vector = self.model.embed(&text)?;
        if !is_storable(&vector) {
            return Err(SpaceError::InvalidEmbedding {
                term: term.to_string(),
            });
        }
        if let Some(dims) = self.dimension() {
            if dims != vector.len() {
                return Err(VectorError::LengthMismatch {
                    left: dims,
                    right: vector.len(),
                }
                .into());
            }
        }

        self.map(subspace).insert(term.clone(), vector.into());
        self.extend_domain(agent, term);
        tracing::debug!(%agent, %subspace, %term, %text, "indexed new term");
        Ok(true)
    }

    fn extend_if_indexed(&self, agent: &str, subspace: Subspace, term: &Term) -> bool {
        let Some(existing) = self.subspace_of(term) else {
            return false;
        };
        if existing != subspace {
            tracing::warn!(
                %term,
                kept = %existing,
                requested = %subspace,
                "term already indexed in the other subspace"
            );
        }
        self.extend_domain(agent, term);
        true
    }

    fn extend_domain(&self, agent: &str, term: &Term) {
        let mut domain = self.domains.entry(agent.to_string()).or_default();
        if !domain.contains(term) {
            domain.push(term.clone());
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.terms
            .iter()
            .next()
            .or_else(|| self.plans.iter().next())
            .map(|e| e.value().len())
    }

    /// Candidates for retrieval: the subspace restricted to the union of the
    /// named domains, or the whole subspace when `agents` is empty.
    fn candidates(&self, agents: &[String], subspace: Subspace) -> Vec<(Term, Vector)> {
        let map = self.map(subspace);
        if agents.is_empty() {
            return map
                .iter()
                .map(|e| (e.key().clone(), Arc::clone(e.value())))
                .collect();
        }

        let mut seen = HashSet::new();
        let mut out: Vec<(Term, Vector)> = Vec::new();
        for agent in agents {
            for term in self.domain(agent) {
                if !seen.insert(term.clone()) {
                    continue;
                }
                if let Some(v) = map.get(&term) {
                    let v = Arc::clone(v.value());
                    out.push((term, v));
                }
            }
        }
        out
    }

    /// The term in `subspace`, scoped to `agents`' domains, closest to the
    /// raw `text`. Ties go to the smaller rendering.
    ///
    /// Callers filter unknown agent names first; an empty candidate set is
    /// an error and costs no embed call.
    pub fn find_nearest(&self, agents: &[String], subspace: Subspace, text: &str) -> SpaceResult<Term> {
        let candidates = self.candidates(agents, subspace);
        if candidates.is_empty() {
            return Err(SpaceError::NoCandidates {
                subspace: subspace.to_string(),
                agents: agents.to_vec(),
            });
        }

        let query = self.model.embed(text)?;
        let mut best: Option<(f32, String, Term)> = None;
        for (term, vector) in candidates {
            let d = cosine_distance(&query, &vector)?;
            let rendered = term.to_string();
            tracing::trace!(candidate = %rendered, distance = d);
            let better = match &best {
                None => true,
                Some((bd, br, _)) => d < *bd || (d == *bd && rendered < *br),
            };
            if better {
                best = Some((d, rendered, term));
            }
        }

        let (distance, _, nearest) = best.ok_or_else(|| SpaceError::NoCandidates {
            subspace: subspace.to_string(),
            agents: agents.to_vec(),
        })?;
        tracing::debug!(%nearest, distance, %subspace, "nearest term");
        Ok(nearest)
    }

    /// `nearest` followed by every other term of the same functor and arity
    /// in the subspace `force` draws examples from.
    pub fn examples(&self, force: Force, nearest: &Term) -> Vec<Term> {
        let mut others: Vec<Term> = self
            .map(force.example_subspace())
            .iter()
            .filter(|e| e.key().same_shape(nearest) && e.key() != nearest)
            .map(|e| e.key().clone())
            .collect();
        others.sort_by_cached_key(|t| t.to_string());

        let mut examples = Vec::with_capacity(others.len() + 1);
        examples.push(nearest.clone());
        examples.extend(others);
        examples
    }

    /// Human-readable dump of both subspaces and every domain.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for subspace in [Subspace::Terms, Subspace::Plans] {
            let mut entries: Vec<String> =
                self.map(subspace).iter().map(|e| e.key().to_string()).collect();
            entries.sort();
            let _ = writeln!(out, "{subspace} ({}):", entries.len());
            for e in entries {
                let _ = writeln!(out, "  {e}");
            }
        }
        for agent in self.agents() {
            let domain = self.domain(&agent);
            let _ = writeln!(out, "domain {agent} ({}):", domain.len());
            for t in domain {
                let _ = writeln!(out, "  {t}");
            }
        }
        out
    }
}

impl fmt::Debug for EmbeddingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingSpace")
            .field("terms", &self.terms.len())
            .field("plans", &self.plans.len())
            .field("agents", &self.domains.len())
            .finish()
    }
}

static OPERATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([=<>!]+)").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Text embedded for an indexed term.
///
/// The functor, with `_` read as a space and `my` turned into `your` (the
/// interpreter speaks from the listener's side), is repeated four times to
/// weight it; the arguments follow with parentheses, commas and operators
/// spaced out.
pub fn preprocess(term: &Term) -> String {
    let functor = format!("{} ", term.functor().replace('_', " ").replace("my", "your"));
    let head = functor.repeat(4);
    if term.arity() == 0 {
        return head;
    }

    let mut args = String::new();
    for arg in term.args() {
        let s = arg
            .to_string()
            .replace('_', " ")
            .replace('(', " ( ")
            .replace(')', " ) ")
            .replace(',', " , ")
            .replace("my", "your");
        let s = OPERATORS.replace_all(&s, " $1 ");
        let s = WHITESPACE.replace_all(&s, " ");
        args.push_str(s.trim());
        args.push(' ');
    }
    head + args.trim()
}
