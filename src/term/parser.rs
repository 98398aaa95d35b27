//! Recursive-descent parser for AgentSpeak-style source text.
//!
//! Two passes:
//! 1. **Tokenize**: identifiers, variables, numbers, strings, punctuation and
//!    operators, each with its byte offset for diagnostics
//! 2. **Parse**: arguments, literals (with annotations), formulas with
//!    `|` < `&` < `not` precedence, triggers, and whole agent programs
//!
//! Plan bodies are skipped: only triggers and guard conditions matter for
//! indexing.

use crate::error::{TermError, TermResult};

use super::{Arg, Formula, RelOp, Term, Trigger, TriggerKind, TriggerOp};

/// One top-level clause of an agent source file.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `p(a)[source(x)].`
    Belief {
        literal: Term,
        source: Option<String>,
    },
    /// `head :- body.`
    Rule {
        head: Term,
        body: Formula,
        source: Option<String>,
    },
    /// `@label +!trigger : context <- body.`
    Plan {
        label: Option<String>,
        trigger: Trigger,
        context: Option<Formula>,
    },
    /// `!goal.`
    InitialGoal(Term),
}

/// Parse a single literal, e.g. `order(pizza, "1999-01-01", 12)`.
///
/// Annotations are accepted and dropped; a trailing `.` is allowed.
pub fn parse_term(src: &str) -> TermResult<Term> {
    let mut p = Parser::new(src)?;
    let (term, _) = p.literal()?;
    p.finish()?;
    Ok(term)
}

/// Parse a single argument value: atom, number, string, variable, `_`,
/// compound term, or list.
pub fn parse_arg(src: &str) -> TermResult<Arg> {
    let mut p = Parser::new(src)?;
    let arg = p.arg()?;
    p.finish()?;
    Ok(arg)
}

/// Parse a logical formula (rule body or plan context).
pub fn parse_formula(src: &str) -> TermResult<Formula> {
    let mut p = Parser::new(src)?;
    let formula = p.formula()?;
    p.finish()?;
    Ok(formula)
}

/// Parse a trigger such as `+!order(Food)`.
pub fn parse_trigger(src: &str) -> TermResult<Trigger> {
    let mut p = Parser::new(src)?;
    let trigger = p.trigger()?;
    p.finish()?;
    Ok(trigger)
}

/// Parse an agent program into its clauses.
///
/// A clause outside the indexed subset (arithmetic in a guard, a list tail)
/// is skipped with a warning up to its closing `.`; lexical errors and a
/// clause with no closing `.` fail the whole program.
pub fn parse_program(src: &str) -> TermResult<Vec<Clause>> {
    let mut p = Parser::new(src)?;
    let mut clauses = Vec::new();
    while !p.at_end() {
        if p.is_punct("{") {
            // Directives (`{ include(...) }`, `{ begin ... }`) carry nothing to index.
            p.skip_block()?;
            continue;
        }
        let start = p.pos;
        match p.clause() {
            Ok(clause) => clauses.push(clause),
            Err(err) => {
                p.pos = start;
                let offset = p.offset();
                if p.skip_body().and_then(|()| p.expect(".")).is_err() {
                    return Err(err);
                }
                tracing::warn!(error = %err, offset, "skipping clause that does not parse");
            }
        }
    }
    Ok(clauses)
}

// ── Tokens ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// Lower-case identifier, quoted atom, or `.`-prefixed internal action.
    Atom(String),
    Var(String),
    Num(f64),
    Str(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

/// Multi-character operators first so the longest match wins.
const PUNCTS: &[&str] = &[
    "\\==", "=..", ":-", "<-", "\\=", "==", "<=", ">=", "(", ")", "[", "]", "{", "}", ",", ".",
    ":", "&", "|", "~", "!", "?", "+", "-", "@", ";", "=", "<", ">", "*", "/", "^", "#",
];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_trivia(&mut self) -> TermResult<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.rest().starts_with("//") => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.rest().starts_with("/*") => {
                    let start = self.pos;
                    match self.rest()[2..].find("*/") {
                        Some(end) => self.pos += 2 + end + 2,
                        None => {
                            return Err(TermError::syntax(self.src, start, "unterminated comment"));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    fn number(&mut self) -> TermResult<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && matches!(self.peek_second(), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = save;
            }
        }
        let value: f64 = self.src[start..self.pos]
            .parse()
            .map_err(|_| TermError::syntax(self.src, start, "malformed number"))?;
        if !value.is_finite() {
            return Err(TermError::syntax(self.src, start, "number out of range"));
        }
        Ok(value)
    }

    fn quoted(&mut self, quote: char) -> TermResult<String> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(TermError::syntax(self.src, start, "unterminated quoted text"))
    }

    fn tokenize(mut self) -> TermResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let offset = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    offset,
                });
                return Ok(tokens);
            };

            let tok = if c.is_ascii_lowercase() {
                Tok::Atom(self.identifier())
            } else if c.is_ascii_uppercase() || c == '_' {
                Tok::Var(self.identifier())
            } else if c.is_ascii_digit() {
                Tok::Num(self.number()?)
            } else if c == '"' {
                Tok::Str(self.quoted('"')?)
            } else if c == '\'' {
                Tok::Atom(self.quoted('\'')?)
            } else if c == '.' && matches!(self.peek_second(), Some(n) if n.is_ascii_lowercase()) {
                // Internal action, possibly library-qualified: `.list.sort`
                let mut name = String::new();
                while self.peek() == Some('.')
                    && matches!(self.peek_second(), Some(n) if n.is_ascii_lowercase())
                {
                    self.bump();
                    name.push('.');
                    name.push_str(&self.identifier());
                }
                Tok::Atom(name)
            } else if let Some(p) = PUNCTS.iter().find(|p| self.rest().starts_with(**p)) {
                self.pos += p.len();
                Tok::Punct(*p)
            } else {
                return Err(TermError::syntax(
                    self.src,
                    offset,
                    format!("unexpected character {c:?}"),
                ));
            };
            tokens.push(Token { tok, offset });
        }
    }
}

// ── Parser ──────────────────────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> TermResult<Self> {
        let tokens = Lexer { src, pos: 0 }.tokenize()?;
        Ok(Self {
            src,
            tokens,
            pos: 0,
        })
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, n: usize) -> &Tok {
        let i = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[i].tok
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Tok::Punct(q) if *q == p)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> TermError {
        TermError::syntax(self.src, self.offset(), message)
    }

    fn expect(&mut self, p: &str) -> TermResult<()> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{p}`, found {}", describe(self.peek()))))
        }
    }

    /// End of a single-item parse: an optional `.` then end of input.
    fn finish(&mut self) -> TermResult<()> {
        self.eat(".");
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {}", describe(self.peek()))))
        }
    }

    fn arg(&mut self) -> TermResult<Arg> {
        match self.peek().clone() {
            Tok::Var(name) => {
                self.advance();
                if name.starts_with('_') {
                    Ok(Arg::Placeholder)
                } else {
                    Ok(Arg::Variable(name))
                }
            }
            Tok::Num(n) => {
                self.advance();
                Ok(Arg::Number(n))
            }
            Tok::Punct("-") if matches!(self.peek_at(1), Tok::Num(_)) => {
                self.advance();
                let Tok::Num(n) = self.advance() else {
                    return Err(self.error("expected a number after `-`"));
                };
                Ok(Arg::Number(-n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Arg::Text(s))
            }
            Tok::Punct("[") => self.list(),
            Tok::Atom(_) | Tok::Punct("~") => {
                let (term, _) = self.literal()?;
                Ok(Arg::from(term))
            }
            other => Err(self.error(format!("expected an argument, found {}", describe(&other)))),
        }
    }

    fn list(&mut self) -> TermResult<Arg> {
        self.expect("[")?;
        let mut items = Vec::new();
        if self.eat("]") {
            return Ok(Arg::List(items));
        }
        loop {
            items.push(self.arg()?);
            if self.is_punct("|") {
                return Err(self.error("list tails `[H|T]` are not supported in indexed terms"));
            }
            if self.eat("]") {
                return Ok(Arg::List(items));
            }
            self.expect(",")?;
        }
    }

    /// A literal with optional strong negation and annotations.
    fn literal(&mut self) -> TermResult<(Term, Vec<Arg>)> {
        let negated = self.eat("~");
        let functor = match self.peek() {
            Tok::Atom(name) => name.clone(),
            other => {
                return Err(self.error(format!("expected a functor, found {}", describe(other))));
            }
        };
        self.advance();
        let functor = if negated {
            format!("~{functor}")
        } else {
            functor
        };

        let mut args = Vec::new();
        if self.eat("(") {
            loop {
                args.push(self.arg()?);
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }

        let mut annotations = Vec::new();
        if self.is_punct("[") {
            if let Arg::List(items) = self.list()? {
                annotations = items;
            }
        }
        Ok((Term::new(functor, args), annotations))
    }

    fn formula(&mut self) -> TermResult<Formula> {
        let mut left = self.conjunction()?;
        while self.eat("|") {
            let right = self.conjunction()?;
            left = Formula::or(left, right);
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> TermResult<Formula> {
        let mut left = self.unary()?;
        while self.eat("&") {
            let right = self.unary()?;
            left = Formula::and(left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> TermResult<Formula> {
        if matches!(self.peek(), Tok::Atom(a) if a == "not") {
            self.advance();
            return Ok(Formula::not(self.unary()?));
        }
        if self.eat("(") {
            let inner = self.formula()?;
            self.expect(")")?;
            return Ok(inner);
        }

        let start = self.offset();
        let left = self.arg()?;
        if let Some(op) = self.relop() {
            let right = self.arg()?;
            return Ok(Formula::Relation { op, left, right });
        }
        if matches!(&left, Arg::Atom(a) if a == "true") {
            return Ok(Formula::True);
        }
        match left.as_term() {
            Some(term) => Ok(Formula::Literal(term)),
            None => Err(TermError::syntax(
                self.src,
                start,
                format!("expected a literal, found {left}"),
            )),
        }
    }

    fn relop(&mut self) -> Option<RelOp> {
        let op = match self.peek() {
            Tok::Punct("==") => RelOp::Eq,
            Tok::Punct("\\==") => RelOp::Neq,
            Tok::Punct("=") => RelOp::Unify,
            Tok::Punct("\\=") => RelOp::NotUnify,
            Tok::Punct("<") => RelOp::Lt,
            Tok::Punct(">") => RelOp::Gt,
            Tok::Punct("<=") => RelOp::Le,
            Tok::Punct(">=") => RelOp::Ge,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn trigger(&mut self) -> TermResult<Trigger> {
        let op = if self.eat("+") {
            TriggerOp::Add
        } else if self.eat("-") {
            TriggerOp::Remove
        } else {
            return Err(self.error("a trigger starts with `+` or `-`"));
        };
        let kind = if self.eat("!") {
            TriggerKind::Achieve
        } else if self.eat("?") {
            TriggerKind::Test
        } else {
            TriggerKind::Belief
        };
        let (literal, _) = self.literal()?;
        Ok(Trigger::new(op, kind, literal))
    }

    fn clause(&mut self) -> TermResult<Clause> {
        if self.is_punct("@") || self.is_punct("+") || self.is_punct("-") {
            return self.plan();
        }
        if self.eat("!") {
            let (goal, _) = self.literal()?;
            self.expect(".")?;
            return Ok(Clause::InitialGoal(goal));
        }

        let (head, annotations) = self.literal()?;
        let source = source_of(&annotations);
        if self.eat(":-") {
            let body = self.formula()?;
            self.expect(".")?;
            return Ok(Clause::Rule { head, body, source });
        }
        self.expect(".")?;
        Ok(Clause::Belief {
            literal: head,
            source,
        })
    }

    fn plan(&mut self) -> TermResult<Clause> {
        let label = if self.eat("@") {
            let (label, _) = self.literal()?;
            Some(label.functor().to_string())
        } else {
            None
        };
        let trigger = self.trigger()?;
        let context = if self.eat(":") {
            Some(self.formula()?)
        } else {
            None
        };
        if self.eat("<-") {
            self.skip_body()?;
        }
        self.expect(".")?;
        Ok(Clause::Plan {
            label,
            trigger,
            context,
        })
    }

    /// Skip tokens up to the `.` that closes the clause.
    fn skip_body(&mut self) -> TermResult<()> {
        let start = self.offset();
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Tok::Eof => {
                    return Err(TermError::syntax(self.src, start, "unterminated plan body"));
                }
                Tok::Punct("(" | "[" | "{") => depth += 1,
                Tok::Punct(")" | "]" | "}") => depth = depth.saturating_sub(1),
                Tok::Punct(".") if depth == 0 => return Ok(()),
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_block(&mut self) -> TermResult<()> {
        let start = self.offset();
        self.expect("{")?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance() {
                Tok::Eof => return Err(TermError::syntax(self.src, start, "unterminated `{`")),
                Tok::Punct("{") => depth += 1,
                Tok::Punct("}") => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

fn source_of(annotations: &[Arg]) -> Option<String> {
    annotations.iter().find_map(|a| match a {
        Arg::Nested(t) if t.functor() == "source" && t.arity() == 1 => {
            t.arg(0).map(|s| s.to_string())
        }
        _ => None,
    })
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Atom(a) => format!("atom `{a}`"),
        Tok::Var(v) => format!("variable `{v}`"),
        Tok::Num(n) => format!("number `{n}`"),
        Tok::Str(s) => format!("string {s:?}"),
        Tok::Punct(p) => format!("`{p}`"),
        Tok::Eof => "end of input".to_string(),
    }
}
