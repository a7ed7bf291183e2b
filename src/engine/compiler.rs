//! Test compilation.
//!
//! A [`DialogueTest`] becomes a [`Query`] by running every registered
//! [`Contributor`]'s test hook, in registration order, against one shared
//! query. The built-in `base` contributor is always first; flag contributors
//! follow in the order their flags were registered.
//!
//! ## Base contribution
//!
//! ```text
//! regexp = true   answer ~ /a/i, original ~ /o/i        (stop: no literal matching)
//! regexp = false  answer = a, question = q
//! regexp unset    answer = a,
//!                 (flag has REGEXP AND /original/i ~ o)
//!                  OR (flag lacks REGEXP AND question = q)
//! ```
//!
//! The unset case lets one query serve records stored as patterns and records
//! stored as literal text.

use crate::error::{ConfigError, ValidationError};
use crate::flags::{FlagBit, FlagEntry, FlagRegistry, flag_contributor};
use crate::{Contributor, Dialogue, DialogueTest, ModifyRequest, QaOptions};

use super::query::{Clause, Field, Query};

/// Ordered contributor list plus the flag registry it was built from.
#[derive(Debug)]
pub struct TestCompiler {
    flags: FlagRegistry,
    contributors: Vec<Contributor>,
}

impl Default for TestCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCompiler {
    /// A compiler with only the built-in `base` contributor.
    pub fn new() -> Self {
        TestCompiler { flags: FlagRegistry::new(), contributors: vec![base_contributor()] }
    }

    /// Append a contributor. It runs after every contributor registered before it.
    pub fn register(&mut self, contributor: Contributor) {
        tracing::debug!(contributor = %contributor.name, position = self.contributors.len(), "registered contributor");
        self.contributors.push(contributor);
    }

    /// Register a named flag and the contributor that handles it.
    pub fn register_flag(&mut self, name: &str, label: Option<String>) -> Result<FlagEntry, ConfigError> {
        let entry = self.flags.register_labeled(name, label)?.clone();
        self.register(flag_contributor(&entry));
        Ok(entry)
    }

    pub fn flags(&self) -> &FlagRegistry {
        &self.flags
    }

    pub fn contributor_names(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.name.as_str()).collect()
    }

    /// Run the before-search hooks: copy caller options into `test`.
    pub fn prepare(&self, options: &QaOptions, test: &mut DialogueTest) {
        for hook in self.contributors.iter().filter_map(|c| c.before_search.as_ref()) {
            hook(options, test);
        }
    }

    /// Compile `test` into a storage query.
    pub fn compile(&self, test: &DialogueTest) -> Result<Query, ValidationError> {
        let mut query = Query::default();
        for hook in self.contributors.iter().filter_map(|c| c.test.as_ref()) {
            hook(test, &mut query)?;
        }
        tracing::trace!(%query, "compiled dialogue test");
        Ok(query)
    }

    /// Run the modify hooks against `dialogue`.
    pub fn modify(&self, request: &ModifyRequest, dialogue: &mut Dialogue) {
        for hook in self.contributors.iter().filter_map(|c| c.modify.as_ref()) {
            hook(request, dialogue);
        }
    }
}

fn base_contributor() -> Contributor {
    contributor! {
        name: "base",
        before_search: |options, test| {
            if test.regexp.is_none() {
                test.regexp = options.regexp;
            }
        },
        test: |test, query| { compile_base(test, query) },
        modify: |request, dialogue| {
            if let Some(answer) = &request.answer {
                dialogue.answer = answer.clone();
            }
            if let Some(regexp) = request.options.regexp {
                dialogue.set_flag(FlagBit::REGEXP, regexp);
            }
            if let Some(question) = &request.question {
                dialogue.question = question.clone();
                dialogue.original = request.options.original.clone().unwrap_or_else(|| question.clone());
            }
        },
    }
}

fn compile_base(test: &DialogueTest, query: &mut Query) -> Result<(), ValidationError> {
    let DialogueTest { question, answer, original, regexp, search_question_answer, .. } = test;

    if *regexp == Some(true) {
        match (original, *search_question_answer) {
            (Some(keyword), true) => {
                query.push(Clause::Or(vec![
                    Clause::matches(Field::Original, keyword)?,
                    Clause::matches(Field::Answer, keyword)?,
                ]));
                if let Some(answer) = answer {
                    query.push(Clause::matches(Field::Answer, answer)?);
                }
            }
            _ => {
                if let Some(answer) = answer {
                    query.push(Clause::matches(Field::Answer, answer)?);
                }
                if let Some(original) = original {
                    query.push(Clause::matches(Field::Original, original)?);
                }
            }
        }
        return Ok(());
    }

    if let Some(answer) = answer {
        query.push(Clause::equals(Field::Answer, answer.as_str()));
    }

    if *regexp == Some(false) {
        if let Some(question) = question {
            query.push(Clause::equals(Field::Question, question.as_str()));
        }
        return Ok(());
    }

    let Some(text) = original.as_ref().or(question.as_ref()) else {
        return Ok(());
    };
    let literal = question.as_ref().unwrap_or(text);
    let regexp_bit = FlagBit::REGEXP.value();
    query.push(Clause::Or(vec![
        Clause::And(vec![
            Clause::BitsAllSet(regexp_bit),
            Clause::MatchedBy { field: Field::Original, text: text.clone() },
        ]),
        Clause::And(vec![Clause::BitsAllClear(regexp_bit), Clause::equals(Field::Question, literal.as_str())]),
    ]));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, question: &str, answer: &str, regexp: bool) -> Dialogue {
        let mut d = Dialogue::new(question, answer);
        d.id = id;
        d.set_flag(FlagBit::REGEXP, regexp);
        d
    }

    #[test]
    fn empty_test_compiles_to_empty_query() {
        let query = TestCompiler::new().compile(&DialogueTest::default()).unwrap();
        assert!(query.is_empty());
    }

    #[test]
    fn unset_regexp_or_composes_pattern_and_literal_records() {
        let compiler = TestCompiler::new();
        let test = DialogueTest { original: Some("foo".into()), ..Default::default() };
        let query = compiler.compile(&test).unwrap();

        assert!(query.matches(&record(1, "f.o", "x", true)));
        assert!(query.matches(&record(2, "foo", "x", false)));
        // Literal record whose text happens to be a matching pattern.
        assert!(!query.matches(&record(3, "f.o", "x", false)));
        // Pattern record that does not match.
        assert!(!query.matches(&record(4, "bar", "x", true)));
        assert_eq!(
            query.to_string(),
            "((flag & 0x1 = 0x1 AND /original/i ~ \"foo\") OR (flag & 0x1 = 0 AND question = \"foo\"))"
        );
    }

    #[test]
    fn regexp_true_matches_patterns_against_stored_text() {
        let compiler = TestCompiler::new();
        let test = DialogueTest {
            question: Some("ignored".into()),
            original: Some("^wea".into()),
            answer: Some("SUN".into()),
            regexp: Some(true),
            ..Default::default()
        };
        let query = compiler.compile(&test).unwrap();
        assert_eq!(query.clauses().len(), 2);

        let mut weather = record(1, "weather", "sunny", false);
        weather.original = "Weather".into();
        assert!(query.matches(&weather));
        assert!(!query.matches(&record(2, "weather", "rain", false)));
    }

    #[test]
    fn regexp_false_is_exact_question_match() {
        let compiler = TestCompiler::new();
        let test = DialogueTest { question: Some("hi".into()), regexp: Some(false), ..Default::default() };
        let query = compiler.compile(&test).unwrap();

        assert!(query.matches(&record(1, "hi", "x", true)));
        assert!(!query.matches(&record(2, "hi!", "x", false)));
    }

    #[test]
    fn search_question_answer_matches_either_field() {
        let compiler = TestCompiler::new();
        let test = DialogueTest {
            original: Some("天气".into()),
            regexp: Some(true),
            search_question_answer: true,
            ..Default::default()
        };
        let query = compiler.compile(&test).unwrap();

        assert!(query.matches(&record(1, "今天天气", "晴", false)));
        assert!(query.matches(&record(2, "你好", "天气不错", false)));
        assert!(!query.matches(&record(3, "你好", "你好", false)));
    }

    #[test]
    fn invalid_pattern_fails_compilation() {
        let compiler = TestCompiler::new();
        let test = DialogueTest { original: Some("[".into()), regexp: Some(true), ..Default::default() };
        assert!(matches!(compiler.compile(&test), Err(ValidationError::InvalidRegex { .. })));
    }

    #[test]
    fn contributors_run_in_registration_order() {
        let mut compiler = TestCompiler::new();
        compiler.register_flag("frozen", None).unwrap();
        compiler.register(contributor! {
            name: "answer-prefix",
            test: |test, query| {
                if test.search_question_answer {
                    query.push(Clause::matches(Field::Answer, "^ok")?);
                }
                Ok(())
            },
        });
        assert_eq!(compiler.contributor_names(), vec!["base", "flag:frozen", "answer-prefix"]);

        let mut test = DialogueTest { search_question_answer: true, ..Default::default() };
        test.flags.insert("frozen".into(), true);
        let query = compiler.compile(&test).unwrap();
        assert_eq!(query.to_string(), "flag & 0x2 = 0x2 AND answer ~ /^ok/i");
    }

    #[test]
    fn prepare_copies_options_into_test() {
        let mut compiler = TestCompiler::new();
        compiler.register_flag("frozen", None).unwrap();

        let mut options = QaOptions { regexp: Some(false), ..Default::default() };
        options.flags.insert("frozen".into(), false);
        let mut test = DialogueTest::default();
        compiler.prepare(&options, &mut test);

        assert_eq!(test.regexp, Some(false));
        assert_eq!(test.flags.get("frozen"), Some(&false));
    }

    #[test]
    fn base_modify_updates_fields_and_regexp_bit() {
        let compiler = TestCompiler::new();
        let mut dialogue = record(1, "old", "old answer", false);
        let request = ModifyRequest {
            options: QaOptions { regexp: Some(true), original: Some("New?".into()), ..Default::default() },
            question: Some("new".into()),
            answer: Some("new answer".into()),
        };
        compiler.modify(&request, &mut dialogue);

        assert_eq!(dialogue.question, "new");
        assert_eq!(dialogue.original, "New?");
        assert_eq!(dialogue.answer, "new answer");
        assert!(dialogue.has_flag(FlagBit::REGEXP));
    }
}
