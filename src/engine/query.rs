//! Structured storage queries.
//!
//! A [`Query`] is a conjunction of [`Clause`]s. The clause language is the
//! minimum the pipeline needs from a storage backend:
//!
//! ```text
//! Equals       field == value
//! Matches      field ~ /pattern/i          (user pattern against stored text)
//! MatchedBy    /field/i ~ text             (stored pattern against user text)
//! BitsAllSet   flag & bits == bits
//! BitsAllClear flag & bits == 0
//! And / Or     composition
//! ```
//!
//! Backends are free to translate clauses into their own query language;
//! [`Query::matches`] is the reference semantics and is what the in-memory
//! store evaluates.

use crate::Dialogue;
use crate::error::ValidationError;
use regex::{Regex, RegexBuilder};
use std::fmt;

/// Text field of a dialogue addressable by a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Question,
    Answer,
    Original,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Question => "question",
            Field::Answer => "answer",
            Field::Original => "original",
        }
    }

    fn read(self, dialogue: &Dialogue) -> &str {
        match self {
            Field::Question => &dialogue.question,
            Field::Answer => &dialogue.answer,
            Field::Original => &dialogue.original,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Clause {
    Equals { field: Field, value: String },
    Matches { field: Field, pattern: Regex },
    MatchedBy { field: Field, text: String },
    BitsAllSet(u32),
    BitsAllClear(u32),
    And(Vec<Clause>),
    Or(Vec<Clause>),
}

impl Clause {
    /// Case-insensitive pattern clause; fails when `pattern` is not a valid regex.
    pub fn matches(field: Field, pattern: &str) -> Result<Clause, ValidationError> {
        let pattern = compile_insensitive(pattern)
            .map_err(|_| ValidationError::InvalidRegex { pattern: pattern.to_string() })?;
        Ok(Clause::Matches { field, pattern })
    }

    pub fn equals(field: Field, value: impl Into<String>) -> Clause {
        Clause::Equals { field, value: value.into() }
    }

    pub fn eval(&self, dialogue: &Dialogue) -> bool {
        match self {
            Clause::Equals { field, value } => field.read(dialogue) == value,
            Clause::Matches { field, pattern } => pattern.is_match(field.read(dialogue)),
            // A stored pattern that does not compile simply never matches.
            Clause::MatchedBy { field, text } => {
                compile_insensitive(field.read(dialogue)).map(|re| re.is_match(text)).unwrap_or(false)
            }
            Clause::BitsAllSet(bits) => dialogue.flag & bits == *bits,
            Clause::BitsAllClear(bits) => dialogue.flag & bits == 0,
            Clause::And(clauses) => clauses.iter().all(|c| c.eval(dialogue)),
            Clause::Or(clauses) => clauses.iter().any(|c| c.eval(dialogue)),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Equals { field, value } => write!(f, "{} = {:?}", field.name(), value),
            Clause::Matches { field, pattern } => write!(f, "{} ~ /{}/i", field.name(), pattern.as_str()),
            Clause::MatchedBy { field, text } => write!(f, "/{}/i ~ {:?}", field.name(), text),
            Clause::BitsAllSet(bits) => write!(f, "flag & {bits:#x} = {bits:#x}"),
            Clause::BitsAllClear(bits) => write!(f, "flag & {bits:#x} = 0"),
            Clause::And(clauses) => write_joined(f, clauses, " AND "),
            Clause::Or(clauses) => write_joined(f, clauses, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, clauses: &[Clause], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{clause}")?;
    }
    f.write_str(")")
}

fn compile_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Conjunctive list of clauses. An empty query matches every record.
#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, dialogue: &Dialogue) -> bool {
        self.clauses.iter().all(|c| c.eval(dialogue))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("(all)");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue(question: &str, original: &str, answer: &str, flag: u32) -> Dialogue {
        Dialogue {
            id: 1,
            question: question.into(),
            original: original.into(),
            answer: answer.into(),
            flag,
            redirections: None,
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        let query = Query::default();
        assert!(query.matches(&dialogue("a", "a", "b", 0)));
        assert_eq!(query.to_string(), "(all)");
    }

    #[test]
    fn pattern_clauses_are_case_insensitive() {
        let clause = Clause::matches(Field::Answer, "hello").unwrap();
        assert!(clause.eval(&dialogue("q", "q", "Say HELLO there", 0)));
        assert!(!clause.eval(&dialogue("q", "q", "bye", 0)));
    }

    #[test]
    fn invalid_user_pattern_is_a_validation_error() {
        let err = Clause::matches(Field::Original, "(unclosed").unwrap_err();
        assert_eq!(err, ValidationError::InvalidRegex { pattern: "(unclosed".into() });
    }

    #[test]
    fn stored_patterns_match_user_text() {
        let clause = Clause::MatchedBy { field: Field::Original, text: "foo".into() };
        assert!(clause.eval(&dialogue("f.o", "f.o", "x", 1)));
        assert!(!clause.eval(&dialogue("bar", "bar", "x", 1)));
        // Broken stored patterns never match.
        assert!(!clause.eval(&dialogue("(", "(", "x", 1)));
    }

    #[test]
    fn bit_clauses() {
        let set = Clause::BitsAllSet(0b101);
        let clear = Clause::BitsAllClear(0b010);
        let record = dialogue("q", "q", "a", 0b101);
        assert!(set.eval(&record));
        assert!(clear.eval(&record));
        assert!(!Clause::BitsAllSet(0b111).eval(&record));
        assert!(!Clause::BitsAllClear(0b100).eval(&record));
    }

    #[test]
    fn display_renders_composition() {
        let mut query = Query::default();
        query.push(Clause::equals(Field::Answer, "hi"));
        query.push(Clause::Or(vec![Clause::BitsAllSet(1), Clause::BitsAllClear(1)]));
        assert_eq!(query.to_string(), "answer = \"hi\" AND (flag & 0x1 = 0x1 OR flag & 0x1 = 0)");
    }
}
