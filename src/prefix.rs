//! Shorthand command classification.
//!
//! Chat users rarely type `qa --search 天气`; they type `##天气`, `#12` or
//! `搜索 天气`. The parser turns those shapes into a normalised [`Invocation`]
//! and declines (returns `None`) for anything else, leaving the message to the
//! regular command grammar.
//!
//! With prefix `P` (last character `L`) and id grammar `G = \d+(?:\.\.\d+)?`,
//! the first token is matched against
//!
//! ```text
//! ^P(L?)((G(,G)*)?|L?)$
//!    $1  $2
//! ```
//!
//! - `$1 == L` (doubled prefix): search with the remaining tokens, or the
//!   status report when there are none.
//! - `$2` non-empty and not `L`: `target` = the id list.
//! - bare prefix with nothing after it: status report.
//! - otherwise: plain `qa` with the remaining tokens as arguments.
//!
//! When the whole token does not match, the longest matching head is tried and
//! the rest of the token becomes the first argument, so `##天气` behaves like
//! `## 天气` and `#你好` like `# 你好`. A head that captured an id list is
//! declined: `#3个苹果` is neither a target nor a question.
//!
//! A second stage recognises the leading word `搜索` ("search"), which searches
//! questions and answers at once.

use crate::QaOptions;
use crate::error::ConfigError;
use regex::Regex;

const ID_GRAMMAR: &str = r"\d+(?:\.\.\d+)?";
const SEARCH_WORD: &str = "搜索";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// The `qa` command: search, view, modify or create.
    Qa,
    /// `qa.status`: corpus size report.
    Status,
}

/// A normalised command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub options: QaOptions,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn status() -> Self {
        Invocation { command: Command::Status, options: QaOptions::default(), args: Vec::new() }
    }

    pub fn qa(options: QaOptions, args: Vec<String>) -> Self {
        Invocation { command: Command::Qa, options, args }
    }
}

#[derive(Debug, Clone)]
pub struct PrefixParser {
    last: String,
    /// Whole-token shorthand.
    token: Regex,
    /// Shorthand head of a longer token.
    head: Regex,
}

impl PrefixParser {
    pub fn new(prefix: &str) -> Result<Self, ConfigError> {
        let last = prefix.chars().last().ok_or(ConfigError::InvalidPrefix)?.to_string();
        let p = regex::escape(prefix);
        let l = regex::escape(&last);
        let g = ID_GRAMMAR;

        let token = Regex::new(&format!(r"^{p}({l}?)((?:{g}(?:,{g})*)?|{l}?)$"))
            .map_err(|err| ConfigError::Parse { reason: err.to_string() })?;
        let head = Regex::new(&format!(r"^{p}({l}?)((?:{g}(?:,{g})*)?)"))
            .map_err(|err| ConfigError::Parse { reason: err.to_string() })?;

        Ok(PrefixParser { last, token, head })
    }

    /// Classify a raw message. `None` means "not a dialogue shorthand".
    pub fn parse(&self, text: &str) -> Option<Invocation> {
        let tokens = tokenize(text);
        self.parse_prefixed(&tokens).or_else(|| parse_search_word(&tokens))
    }

    /// Prefix stage over already tokenized input.
    pub fn parse_prefixed(&self, tokens: &[String]) -> Option<Invocation> {
        let (first, rest) = tokens.split_first()?;

        let (doubled, target, args) = if let Some(caps) = self.token.captures(first) {
            (caps[1].to_string(), caps[2].to_string(), rest.to_vec())
        } else {
            let caps = self.head.captures(first)?;
            // An id list followed by text is not a target.
            if !caps[2].is_empty() {
                return None;
            }
            let consumed = caps.get(0)?.end();
            let mut args = vec![first[consumed..].to_string()];
            args.extend_from_slice(rest);
            (caps[1].to_string(), caps[2].to_string(), args)
        };

        let mut options = QaOptions::default();
        if doubled == self.last {
            if args.is_empty() {
                return Some(Invocation::status());
            }
            options.search = true;
        } else if target.is_empty() && args.is_empty() {
            return Some(Invocation::status());
        }

        if !target.is_empty() && target != self.last {
            options.target = Some(target);
        }

        Some(Invocation::qa(options, args))
    }
}

/// Search-word stage: `搜索 <keyword>` searches both questions and answers.
pub fn parse_search_word(tokens: &[String]) -> Option<Invocation> {
    let (first, rest) = tokens.split_first()?;
    if first != SEARCH_WORD {
        return None;
    }
    if rest.is_empty() {
        return Some(Invocation::status());
    }
    let options = QaOptions { search: true, search_question_answer: true, ..Default::default() };
    Some(Invocation::qa(options, rest.to_vec()))
}

/// Split a message into whitespace-separated tokens.
///
/// A token starting with `"`, `'` or `“` runs to the matching closing quote
/// (or the end of the text) and may contain whitespace and line breaks.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let close = match c {
            '"' => Some('"'),
            '\'' => Some('\''),
            '“' => Some('”'),
            _ => None,
        };

        let mut token = String::new();
        if let Some(close) = close {
            chars.next();
            for c in chars.by_ref() {
                if c == close {
                    break;
                }
                token.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    tokens
}
