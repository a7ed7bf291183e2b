//! Error taxonomy.
//!
//! Three families, one enum each:
//!
//! - [`ValidationError`]: bad user input. Its `Display` text *is* the reply sent
//!   back to the user; the command pipeline turns it into an `Ok` reply and
//!   never mutates state when one is raised.
//! - [`ConfigError`]: startup problems (flag table full, duplicate names, bad
//!   config files). Fatal.
//! - [`StorageError`]: whatever the storage collaborator reports. Passed
//!   through untouched, never retried here.

use std::path::PathBuf;

/// Rejections of user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("问题含有错误的或不支持的正则表达式语法。")]
    InvalidRegex { pattern: String },

    #[error("缺少问题或回答，请检查指令语法。")]
    MissingQuestionOrAnswer,

    #[error("{}", crate::api::USAGE)]
    Usage,

    #[error("存在多余的参数，请检查指令语法或将含有空格或换行的问答置于一对引号内。")]
    ExtraArguments,

    #[error("问题必须是纯文本。")]
    NonTextQuestion,

    #[error("未知选项 {option}，请检查指令语法。")]
    UnknownOption { option: String },

    #[error("问答编号 {target} 格式错误。")]
    InvalidTarget { target: String },
}

/// Startup and configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("flag capacity exhausted: all {capacity} bits are registered")]
    CapacityExhausted { capacity: u32 },

    #[error("flag '{name}' is already registered")]
    DuplicateFlag { name: String },

    #[error("invalid flag name '{name}'")]
    InvalidFlagName { name: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("command prefix must not be empty")]
    InvalidPrefix,
}

/// Errors reported by a [`DialogueStore`](crate::DialogueStore).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {message}")]
    Backend { message: String },

    #[error("failed to load corpus {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Top-level error for the dialogue pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type QaResult<T> = Result<T, QaError>;
