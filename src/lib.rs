extern crate self as dialogue_qa;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod flags;
mod format;
mod prefix;
mod store;

pub use api::{QaService, QaServiceBuilder, Reply, USAGE};
pub use config::{FlagConfig, QaConfig};
pub use engine::{
    Clause, DIRECTIVE_PREFIX, DIRECTIVE_SUFFIX, Field, Query, QuestionMap, QuestionStripper, RedirectionResolver,
    Resolution, ResolveMetrics, StrippedQuestion, TestCompiler, extract_reference,
};
pub use error::{ConfigError, QaError, QaResult, StorageError, ValidationError};
pub use flags::{FLAG_CAPACITY, FlagBit, FlagEntry, FlagMask, FlagRegistry};
pub use format::{AnswerFormatter, DetailHook, MAX_ANSWER_LENGTH, SearchDetails, format_answer, format_details};
pub use prefix::{Command, Invocation, PrefixParser, tokenize};
pub use store::{DialogueStats, DialogueStore, MemoryStore};

// --- Data model -------------------------------------------------------------

/// Stable identifier of a stored dialogue.
pub type DialogueId = u64;

/// A stored question/answer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialogue {
    pub id: DialogueId,
    /// Matchable form of the question; a pattern when the `regexp` bit is set.
    pub question: String,
    /// The question as it was entered (display form).
    #[serde(default)]
    pub original: String,
    pub answer: String,
    /// Bitmask; bit meanings are owned by the [`FlagRegistry`].
    #[serde(default)]
    pub flag: u32,
    /// Dialogues reached by following this dialogue's answer reference.
    ///
    /// Populated by the resolver, at most once per search, never persisted.
    #[serde(skip)]
    pub redirections: Option<Vec<Dialogue>>,
}

impl Dialogue {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        let question = question.into();
        Dialogue { id: 0, original: question.clone(), question, answer: answer.into(), flag: 0, redirections: None }
    }

    pub fn has_flag(&self, bit: FlagBit) -> bool {
        FlagMask::from_bits_retain(self.flag).contains(bit.mask())
    }

    pub fn set_flag(&mut self, bit: FlagBit, on: bool) {
        let mut mask = FlagMask::from_bits_retain(self.flag);
        mask.set(bit.mask(), on);
        self.flag = mask.bits();
    }

    /// Resolved redirections, empty when none were attached.
    pub fn redirections(&self) -> &[Dialogue] {
        self.redirections.as_deref().unwrap_or(&[])
    }
}

/// Search criteria, built up by contributors and compiled into a [`Query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogueTest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub original: Option<String>,
    /// `Some(true)`: pattern match, `Some(false)`: literal match, `None`: follow the stored flag.
    pub regexp: Option<bool>,
    /// Per-flag requirement keyed by registered flag name: `true` = bit set, `false` = bit clear.
    pub flags: BTreeMap<String, bool>,
    /// The shorthand search keyword matches either the question or the answer.
    pub search_question_answer: bool,
}

/// Options of a `qa` invocation, as produced by the shorthand parser and the
/// argument check stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaOptions {
    pub search: bool,
    pub search_question_answer: bool,
    /// Raw id-range list, e.g. `1,3..5`.
    pub target: Option<String>,
    pub regexp: Option<bool>,
    pub flags: BTreeMap<String, bool>,
    /// Display form of the question argument.
    pub original: Option<String>,
    /// Whether the question started with one of the bot's nicknames.
    pub appellative: bool,
}

impl QaOptions {
    /// True when the options ask for any change to a stored record.
    pub fn has_modifications(&self) -> bool {
        self.regexp.is_some() || !self.flags.is_empty()
    }
}

/// A mutation request: options plus the (already checked) positional arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyRequest {
    pub options: QaOptions,
    pub question: Option<String>,
    pub answer: Option<String>,
}

// --- Contributors -----------------------------------------------------------

/// Copies caller options into the test before compilation.
pub type BeforeSearchHook = Box<dyn Fn(&QaOptions, &mut DialogueTest) + Send + Sync>;

/// Appends clauses for a finalized test.
pub type TestHook = Box<dyn Fn(&DialogueTest, &mut Query) -> Result<(), ValidationError> + Send + Sync>;

/// Applies a mutation request to a record.
pub type ModifyHook = Box<dyn Fn(&ModifyRequest, &mut Dialogue) + Send + Sync>;

/// A named bundle of pipeline hooks. Any hook may be absent.
///
/// Contributors are held in registration order by the [`TestCompiler`] and
/// never see each other; they only share the test and the query they build.
pub struct Contributor {
    pub name: String,
    pub before_search: Option<BeforeSearchHook>,
    pub test: Option<TestHook>,
    pub modify: Option<ModifyHook>,
}

impl Contributor {
    pub fn named(name: impl Into<String>) -> Self {
        Contributor { name: name.into(), before_search: None, test: None, modify: None }
    }
}

impl std::fmt::Debug for Contributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contributor")
            .field("name", &self.name)
            .field("before_search", &self.before_search.as_ref().map(|_| "<function>"))
            .field("test", &self.test.as_ref().map(|_| "<function>"))
            .field("modify", &self.modify.as_ref().map(|_| "<function>"))
            .finish()
    }
}
