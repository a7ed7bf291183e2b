//! Question normalisation.
//!
//! Authored questions and redirect targets go through the same stripping so
//! that "你好？", "你好" and "bot，你好！" all land on one matchable key.

/// Result of [`QuestionStripper::strip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedQuestion {
    /// Display form: trimmed, leading nickname removed.
    pub original: String,
    /// Matchable form: lower-cased, whitespace and punctuation removed.
    pub parsed: String,
    /// The question addressed the bot by one of its nicknames.
    pub appellative: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionStripper {
    /// Longest first, so "bot" never shadows "botty".
    nicknames: Vec<String>,
}

impl QuestionStripper {
    pub fn new(nicknames: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut nicknames: Vec<String> =
            nicknames.into_iter().map(Into::into).filter(|n: &String| !n.is_empty()).collect();
        nicknames.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
        QuestionStripper { nicknames }
    }

    pub fn strip(&self, source: &str) -> StrippedQuestion {
        let mut text = source.trim();
        let mut appellative = false;

        for nickname in &self.nicknames {
            if let Some(rest) = text.strip_prefix(nickname.as_str()) {
                appellative = true;
                text = rest.trim_start_matches(|c: char| c.is_whitespace() || is_separator(c));
                break;
            }
        }

        let original = text.to_string();
        let mut parsed = regex!(r"[\s\p{P}~～]+").replace_all(&original, "").to_lowercase();
        if parsed.is_empty() {
            parsed = original.to_lowercase();
        }

        StrippedQuestion { original, parsed, appellative }
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, ',' | '，' | ':' | '：' | '、' | '.' | '。' | '!' | '！')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_case() {
        let stripper = QuestionStripper::default();
        let out = stripper.strip("  Hello, World？ ");
        assert_eq!(out.original, "Hello, World？");
        assert_eq!(out.parsed, "helloworld");
        assert!(!out.appellative);
    }

    #[test]
    fn leading_nickname_is_an_appellation() {
        let stripper = QuestionStripper::new(["小助手", "小助"]);
        let out = stripper.strip("小助手，今天天气怎么样？");
        assert!(out.appellative);
        assert_eq!(out.original, "今天天气怎么样？");
        assert_eq!(out.parsed, "今天天气怎么样");
    }

    #[test]
    fn punctuation_only_question_keeps_its_text() {
        let out = QuestionStripper::default().strip("？？");
        assert_eq!(out.parsed, "？？");
    }

    #[test]
    fn variants_share_a_key() {
        let stripper = QuestionStripper::default();
        assert_eq!(stripper.strip("你好").parsed, stripper.strip("你好！").parsed);
        assert_eq!(stripper.strip("Hi there").parsed, stripper.strip("hi~there").parsed);
    }
}
