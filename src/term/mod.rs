//! Structured predicate terms.
//!
//! A [`Term`] is a functor plus ordered [`Arg`]uments. Arguments are a closed
//! sum type: the kind of every value (atom, number, string, placeholder,
//! variable, nested term, list) is decided once when the term is built or
//! parsed, never re-guessed from text at the call site.
//!
//! [`Formula`] models the logical structure found in rule bodies and plan
//! guard conditions; [`Formula::predicates`] mines the individual predicates
//! out of it so they can be indexed one by one.

pub mod parser;
pub mod record;

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

pub use parser::{parse_arg, parse_formula, parse_program, parse_term, parse_trigger, Clause};
pub use record::{from_record, parse_record, to_record, Record};

// ── Term ────────────────────────────────────────────────────────────────

/// A structured predicate: functor name plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    functor: String,
    args: Vec<Arg>,
}

impl Term {
    /// Create a term from a functor and its arguments.
    pub fn new(functor: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            functor: functor.into(),
            args,
        }
    }

    /// A zero-arity term.
    pub fn atom(functor: impl Into<String>) -> Self {
        Self::new(functor, Vec::new())
    }

    pub fn functor(&self) -> &str {
        &self.functor
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// `functor/arity`, the shape examples are grouped by.
    pub fn indicator(&self) -> String {
        format!("{}/{}", self.functor, self.args.len())
    }

    /// Same functor and same arity.
    pub fn same_shape(&self, other: &Term) -> bool {
        self.functor == other.functor && self.args.len() == other.args.len()
    }

    /// Internal actions (`.member(X, L)`) are calls into the agent runtime,
    /// not predicates of the agent's knowledge.
    pub fn is_internal_action(&self) -> bool {
        self.functor.starts_with('.')
    }

    /// No placeholder and no variable anywhere inside.
    pub fn is_ground(&self) -> bool {
        let mut ground = true;
        self.walk(&mut |arg| {
            if matches!(arg, Arg::Placeholder | Arg::Variable(_)) {
                ground = false;
            }
        });
        ground
    }

    /// Names of all variables, in first-occurrence order.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        self.walk(&mut |arg| {
            if let Arg::Variable(name) = arg {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        });
        names
    }

    /// Depth-first pre-order visit of every argument, descending into nested
    /// terms and lists.
    pub fn walk(&self, visit: &mut impl FnMut(&Arg)) {
        for arg in &self.args {
            arg.walk(visit);
        }
    }

    /// The predicates this term decomposes into.
    ///
    /// A term whose arguments contain no predicate contributes itself;
    /// otherwise it contributes the predicates found in its arguments.
    /// Internal actions never contribute themselves.
    pub fn flatten(&self) -> Vec<Term> {
        let inner: Vec<Term> = self.args.iter().flat_map(Arg::predicates).collect();
        if inner.is_empty() && !self.is_internal_action() {
            vec![self.clone()]
        } else {
            inner
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_atom(f, &self.functor)?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl std::str::FromStr for Term {
    type Err = crate::error::TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_term(s)
    }
}

// ── Arg ─────────────────────────────────────────────────────────────────

/// One argument of a term.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A lower-case constant: `pizza`.
    Atom(String),
    /// Integer or decimal number.
    Number(f64),
    /// Double-quoted string.
    Text(String),
    /// Deliberately unspecified value: `_`.
    Placeholder,
    /// A named variable: `Food`.
    Variable(String),
    /// A compound term used as a value: `price(pizza, 12)`.
    Nested(Term),
    /// `[a, b, c]`
    List(Vec<Arg>),
}

impl Arg {
    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(name.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Atom(_) => ArgKind::Atom,
            Self::Number(_) => ArgKind::Number,
            Self::Text(_) => ArgKind::Text,
            Self::Placeholder => ArgKind::Placeholder,
            Self::Variable(_) => ArgKind::Variable,
            Self::Nested(_) => ArgKind::Compound,
            Self::List(_) => ArgKind::List,
        }
    }

    /// View this argument as a literal, if it is one.
    pub fn as_term(&self) -> Option<Term> {
        match self {
            Self::Atom(name) => Some(Term::atom(name.clone())),
            Self::Nested(term) => Some(term.clone()),
            _ => None,
        }
    }

    pub fn walk(&self, visit: &mut impl FnMut(&Arg)) {
        visit(self);
        match self {
            Self::Nested(term) => term.walk(visit),
            Self::List(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// Predicates contained in this argument. Leaves (atoms, numbers,
    /// strings, placeholders, variables) contain none.
    fn predicates(&self) -> Vec<Term> {
        match self {
            Self::Nested(term) => term.flatten(),
            Self::List(items) => items.iter().flat_map(Arg::predicates).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Term> for Arg {
    /// Zero-arity terms become atoms so that `f(a)` built either way compares equal.
    fn from(term: Term) -> Self {
        if term.args.is_empty() {
            Self::Atom(term.functor)
        } else {
            Self::Nested(term)
        }
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

/// Numbers compare by value with `-0.0 == 0.0`, and every NaN equal to
/// every other, so terms stay usable as map keys.
fn number_key(n: f64) -> u64 {
    if n == 0.0 {
        0
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Atom(a), Self::Atom(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => number_key(*a) == number_key(*b),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Placeholder, Self::Placeholder) => true,
            (Self::Variable(a), Self::Variable(b)) => a == b,
            (Self::Nested(a), Self::Nested(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Arg {}

impl Hash for Arg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Atom(s) | Self::Text(s) | Self::Variable(s) => s.hash(state),
            Self::Number(n) => number_key(*n).hash(state),
            Self::Placeholder => {}
            Self::Nested(t) => t.hash(state),
            Self::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(name) => write_atom(f, name),
            Self::Number(n) => write_number(f, *n),
            Self::Text(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Placeholder => f.write_str("_"),
            Self::Variable(name) => f.write_str(name),
            Self::Nested(term) => write!(f, "{term}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl std::str::FromStr for Arg {
    type Err = crate::error::TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_arg(s)
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

/// Atoms that are not plain identifiers are single-quoted.
fn write_atom(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_functor(name) {
        f.write_str(name)
    } else {
        write!(f, "'{}'", name.replace('\'', "\\'"))
    }
}

/// Whether `s` is a valid functor: an optional `~` (strong negation) or `.`
/// (internal action) prefix, then a lower-case identifier, with `.`-separated
/// segments allowed for internal-action libraries.
pub fn is_functor(s: &str) -> bool {
    let body = s.strip_prefix(['~', '.']).unwrap_or(s);
    let mut segments = body.split('.');
    segments.all(|seg| {
        let mut chars = seg.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

// ── ArgKind ─────────────────────────────────────────────────────────────

/// The observable kind of an argument, as used by schema inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Atom,
    Text,
    Number,
    List,
    Placeholder,
    Variable,
    Compound,
}

impl ArgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atom => "atom",
            Self::Text => "text",
            Self::Number => "number",
            Self::List => "list",
            Self::Placeholder => "placeholder",
            Self::Variable => "variable",
            Self::Compound => "compound",
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Formula ─────────────────────────────────────────────────────────────

/// Relational operators allowed in guard conditions and rule bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Neq,
    Unify,
    NotUnify,
    Lt,
    Gt,
    Le,
    Ge,
}

impl RelOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "\\==",
            Self::Unify => "=",
            Self::NotUnify => "\\=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

/// A logical formula: rule body or plan context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Formula {
    True,
    Literal(Term),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Relation { op: RelOp, left: Arg, right: Arg },
}

impl Formula {
    pub fn and(left: Formula, right: Formula) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Formula, right: Formula) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Formula) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Flatten the formula into the list of its constituent predicates.
    ///
    /// Connectives and relational expressions contribute only what their
    /// operands contain; literals contribute per [`Term::flatten`]. Order
    /// follows the source, duplicates removed.
    pub fn predicates(&self) -> Vec<Term> {
        let mut out = Vec::new();
        self.collect(&mut out);
        let mut unique: Vec<Term> = Vec::with_capacity(out.len());
        for term in out {
            if !unique.contains(&term) {
                unique.push(term);
            }
        }
        unique
    }

    fn collect(&self, out: &mut Vec<Term>) {
        match self {
            Self::True => {}
            Self::Literal(term) => out.extend(term.flatten()),
            Self::Not(inner) => inner.collect(out),
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect(out);
                r.collect(out);
            }
            Self::Relation { left, right, .. } => {
                out.extend(left.predicates());
                out.extend(right.predicates());
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::Literal(t) => write!(f, "{t}"),
            Self::Not(inner) => write!(f, "not ({inner})"),
            Self::And(l, r) => write!(f, "{l} & {r}"),
            Self::Or(l, r) => write!(f, "({l} | {r})"),
            Self::Relation { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
        }
    }
}

impl std::str::FromStr for Formula {
    type Err = crate::error::TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_formula(s)
    }
}

// ── Trigger ─────────────────────────────────────────────────────────────

/// `+` or `-` in front of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOp {
    Add,
    Remove,
}

/// What kind of event a trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Belief,
    Achieve,
    Test,
}

/// A plan trigger or goal event: `+!order(Food)`, `-b`, `+?price(P)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub op: TriggerOp,
    pub kind: TriggerKind,
    pub literal: Term,
}

impl Trigger {
    pub fn new(op: TriggerOp, kind: TriggerKind, literal: Term) -> Self {
        Self { op, kind, literal }
    }

    /// `+!literal`
    pub fn achieve(literal: Term) -> Self {
        Self::new(TriggerOp::Add, TriggerKind::Achieve, literal)
    }

    pub fn is_achievement_goal(&self) -> bool {
        self.kind == TriggerKind::Achieve
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            TriggerOp::Add => "+",
            TriggerOp::Remove => "-",
        };
        let kind = match self.kind {
            TriggerKind::Belief => "",
            TriggerKind::Achieve => "!",
            TriggerKind::Test => "?",
        };
        write!(f, "{op}{kind}{}", self.literal)
    }
}

impl std::str::FromStr for Trigger {
    type Err = crate::error::TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_trigger(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Term {
        s.parse().unwrap()
    }

    #[test]
    fn display_matches_source_syntax() {
        let term = Term::new(
            "order",
            vec![Arg::atom("pizza"), Arg::text("1999-01-01"), Arg::from(12i64)],
        );
        assert_eq!(term.to_string(), "order(pizza,\"1999-01-01\",12)");
        assert_eq!(term.arity(), 3);
        assert_eq!(term.indicator(), "order/3");

        let term = Term::new(
            "f",
            vec![
                Arg::Placeholder,
                Arg::var("X"),
                Arg::List(vec![Arg::from(1.5), Arg::atom("Hello World")]),
            ],
        );
        assert_eq!(term.to_string(), "f(_,X,[1.5,'Hello World'])");
    }

    #[test]
    fn structural_equality() {
        assert_eq!(t("p(a, 1)"), t("p(a,1.0)"));
        assert_ne!(t("p(X)"), t("p(Y)"));
        assert_eq!(t("p(_)"), t("p(_)"));
        assert_ne!(t("p(_)"), t("p(X)"));
        assert_ne!(t("p(a)"), t("p(\"a\")"));
        assert_eq!(Arg::from(Term::atom("a")), Arg::atom("a"));
    }

    #[test]
    fn equal_terms_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(t("p(a, 0)"));
        assert!(set.contains(&Term::new("p", vec![Arg::atom("a"), Arg::Number(-0.0)])));
    }

    #[test]
    fn ground_and_variables() {
        assert!(t("order(pizza, 2)").is_ground());
        assert!(!t("order(pizza, _)").is_ground());
        assert!(!t("order(f(X), [Y, X])").is_ground());
        assert_eq!(t("order(f(X), [Y, X])").variables(), vec!["X", "Y"]);
    }

    #[test]
    fn flatten_simple_predicate_is_itself() {
        assert_eq!(t("has(food)").flatten(), vec![t("has(food)")]);
        assert_eq!(t("hungry(X)").flatten(), vec![t("hungry(X)")]);
        assert_eq!(t("raining").flatten(), vec![t("raining")]);
    }

    #[test]
    fn flatten_descends_into_nested_terms_and_lists() {
        assert_eq!(
            t("likes(X, drink(beer), [food(pizza), 3])").flatten(),
            vec![t("drink(beer)"), t("food(pizza)")]
        );
        assert_eq!(t("member(X, [a, b])").flatten(), vec![t("member(X,[a,b])")]);
    }

    #[test]
    fn internal_actions_are_not_predicates() {
        assert!(t(".member(X, [a, b])").flatten().is_empty());
        assert_eq!(t(".member(pos(X), L)").flatten(), vec![t("pos(X)")]);
    }

    #[test]
    fn formula_predicates() {
        let f: Formula = "stomach(empty) & time(T) & T > 12 & not busy(me) | price(P) = cost(pizza, P)"
            .parse()
            .unwrap();
        assert_eq!(
            f.predicates(),
            vec![
                t("stomach(empty)"),
                t("time(T)"),
                t("busy(me)"),
                t("price(P)"),
                t("cost(pizza,P)")
            ]
        );
        assert!(Formula::True.predicates().is_empty());
    }

    #[test]
    fn formula_predicates_are_deduplicated() {
        let f: Formula = "at(home) & (at(home) | at(work))".parse().unwrap();
        assert_eq!(f.predicates(), vec![t("at(home)"), t("at(work)")]);
    }

    #[test]
    fn trigger_display() {
        let trig = Trigger::achieve(t("order(sushi)"));
        assert_eq!(trig.to_string(), "+!order(sushi)");
        assert!(trig.is_achievement_goal());
        let trig: Trigger = "-?price(P)".parse().unwrap();
        assert_eq!(trig.to_string(), "-?price(P)");
        assert!(!trig.is_achievement_goal());
    }

    #[test]
    fn functor_validity() {
        assert!(is_functor("order"));
        assert!(is_functor("my_order2"));
        assert!(is_functor(".member"));
        assert!(is_functor(".list.sort"));
        assert!(is_functor("~raining"));
        assert!(!is_functor("Order"));
        assert!(!is_functor("two words"));
        assert!(!is_functor(""));
        assert!(!is_functor("."));
    }
}
