//! Flag registry.
//!
//! Every named boolean attribute of a dialogue owns exactly one bit of the
//! record's `flag` integer. Bits are handed out in registration order, starting
//! with the built-in `regexp` bit at position 0, and are never reused: the
//! registry is append-only and is filled once while the service is being built.
//!
//! A registered flag takes part in three pipeline stages through its
//! contributor (see [`flag_contributor`]):
//!
//! - before-search: `options.flags[name]` is copied into `test.flags[name]`
//! - test: `test.flags[name]` becomes a bits-all-set / bits-all-clear clause
//! - modify: `options.flags[name]` sets or clears the bit on the record
//!
//! ## Invariants
//!
//! - Names are unique and bits are unique.
//! - At most [`FLAG_CAPACITY`] flags exist; the sign bit of the 32-bit field is
//!   never used so the value stays a valid signed integer for storage backends.

use crate::engine::{Clause, Query};
use crate::error::ConfigError;
use crate::{Contributor, DialogueTest};

/// Number of usable bits in a dialogue's flag field.
pub const FLAG_CAPACITY: u32 = 31;

/// Option names a flag may not shadow.
const RESERVED_NAMES: &[&str] = &["search", "searchQuestionAnswer", "target", "original", "appellative", "help"];

bitflags::bitflags! {
    /// Raw view over a dialogue's flag field.
    ///
    /// Only the built-in bits are named; dynamically registered bits are kept
    /// through `from_bits_retain`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlagMask: u32 {
        const REGEXP = 1 << 0;
    }
}

/// Typed handle to one registered bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlagBit(u8);

impl FlagBit {
    /// Question/original is a pattern rather than literal text.
    pub const REGEXP: FlagBit = FlagBit(0);

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn value(self) -> u32 {
        1 << self.0
    }

    pub fn mask(self) -> FlagMask {
        FlagMask::from_bits_retain(self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagEntry {
    pub name: String,
    pub bit: FlagBit,
    /// Detail tag shown in listings when the bit is set.
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlagRegistry {
    entries: Vec<FlagEntry>,
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagRegistry {
    /// A registry holding only the built-in `regexp` flag.
    pub fn new() -> Self {
        let regexp = FlagEntry { name: "regexp".to_string(), bit: FlagBit::REGEXP, label: None };
        FlagRegistry { entries: vec![regexp] }
    }

    /// Register `name` and return its bit.
    pub fn register(&mut self, name: &str) -> Result<FlagBit, ConfigError> {
        self.register_labeled(name, None).map(|entry| entry.bit)
    }

    /// Register `name` with an optional display label.
    pub fn register_labeled(&mut self, name: &str, label: Option<String>) -> Result<&FlagEntry, ConfigError> {
        if name.is_empty()
            || RESERVED_NAMES.contains(&name)
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidFlagName { name: name.to_string() });
        }
        if self.get(name).is_some() {
            return Err(ConfigError::DuplicateFlag { name: name.to_string() });
        }
        let index = self.entries.len() as u32;
        if index >= FLAG_CAPACITY {
            return Err(ConfigError::CapacityExhausted { capacity: FLAG_CAPACITY });
        }

        let bit = FlagBit(index as u8);
        tracing::debug!(flag = name, bit = bit.index(), "registered dialogue flag");
        self.entries.push(FlagEntry { name: name.to_string(), bit, label });
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn get(&self, name: &str) -> Option<FlagBit> {
        self.entry(name).map(|e| e.bit)
    }

    pub fn entry(&self, name: &str) -> Option<&FlagEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries in registration order, built-ins first.
    pub fn iter(&self) -> impl Iterator<Item = &FlagEntry> {
        self.entries.iter()
    }

    /// Registered flags other than the built-in ones.
    pub fn custom(&self) -> impl Iterator<Item = &FlagEntry> {
        self.entries.iter().filter(|e| e.bit != FlagBit::REGEXP)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pipeline hooks for one registered flag.
pub(crate) fn flag_contributor(entry: &FlagEntry) -> Contributor {
    let bit = entry.bit;
    let (search_name, test_name, modify_name) = (entry.name.clone(), entry.name.clone(), entry.name.clone());

    contributor! {
        name: format!("flag:{}", entry.name),
        before_search: |options, test| {
            if let Some(&value) = options.flags.get(&search_name) {
                test.flags.insert(search_name.clone(), value);
            }
        },
        test: |test, query| {
            push_flag_clause(test, &test_name, bit, query);
            Ok(())
        },
        modify: |request, dialogue| {
            if let Some(&value) = request.options.flags.get(&modify_name) {
                dialogue.set_flag(bit, value);
            }
        },
    }
}

fn push_flag_clause(test: &DialogueTest, name: &str, bit: FlagBit, query: &mut Query) {
    match test.flags.get(name) {
        Some(true) => query.push(Clause::BitsAllSet(bit.value())),
        Some(false) => query.push(Clause::BitsAllClear(bit.value())),
        None => {}
    }
}
