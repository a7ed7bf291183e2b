//! Reply rendering.
//!
//! Answers are shortened to one display line, and every listed dialogue is
//! prefixed with its id and the tags contributed by registered detail hooks:
//!
//! ```text
//! 12. [锁定] 问题：天气，回答：晴……
//! = 13. [正则] 晴天
//! ```

use crate::flags::FlagEntry;
use crate::{Dialogue, FlagBit};

/// Longest answer shown in listings, counted in `char`s (Unicode scalar
/// values). This equals UTF-16 code units except for characters outside the
/// Basic Multilingual Plane, which count once here and twice in UTF-16.
pub const MAX_ANSWER_LENGTH: usize = 100;

const IMAGE_PLACEHOLDER: &str = "[图片]";
const ELLIPSIS: &str = "……";

/// Labels collected for one dialogue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDetails {
    pub tags: Vec<String>,
    /// Replaces the "问题" caption, e.g. "正则" for pattern questions.
    pub question_type: Option<String>,
    /// Replaces the "回答" caption.
    pub answer_type: Option<String>,
}

pub type DetailHook = Box<dyn Fn(&Dialogue, &mut SearchDetails) + Send + Sync>;

/// Shorten an answer for listings.
///
/// Keeps the first line only, replaces inline images with a placeholder and
/// cuts at [`MAX_ANSWER_LENGTH`] characters; a shortened answer ends in an
/// ellipsis.
pub fn format_answer(source: &str) -> String {
    let mut truncated = false;

    let mut lines = regex!(r"\r?\n|\$n").split(source);
    let first = lines.next().unwrap_or_default();
    let mut text = if lines.next().is_some() {
        truncated = true;
        first.trim().to_string()
    } else {
        source.to_string()
    };

    text = regex!(r"\[CQ:image,[^\]]+\]").replace_all(&text, IMAGE_PLACEHOLDER).into_owned();

    if text.chars().count() > MAX_ANSWER_LENGTH {
        truncated = true;
        text = text.chars().take(MAX_ANSWER_LENGTH).collect();
    }

    if truncated && !text.ends_with(ELLIPSIS) {
        if text.ends_with('…') {
            text.push('…');
        } else {
            text.push_str(ELLIPSIS);
        }
    }
    text
}

/// `"{id}. "` followed by the bracketed tag list when there are tags.
pub fn format_details(dialogue: &Dialogue, details: &SearchDetails) -> String {
    if details.tags.is_empty() {
        format!("{}. ", dialogue.id)
    } else {
        format!("{}. [{}] ", dialogue.id, details.tags.join(", "))
    }
}

pub struct AnswerFormatter {
    hooks: Vec<DetailHook>,
}

impl Default for AnswerFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnswerFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerFormatter").field("hooks", &self.hooks.len()).finish()
    }
}

impl AnswerFormatter {
    /// A formatter with the built-in pattern-question detail.
    pub fn new() -> Self {
        let regexp: DetailHook = Box::new(|dialogue, details| {
            if dialogue.has_flag(FlagBit::REGEXP) {
                details.question_type = Some("正则".to_string());
            }
        });
        AnswerFormatter { hooks: vec![regexp] }
    }

    pub fn register(&mut self, hook: DetailHook) {
        self.hooks.push(hook);
    }

    /// Tag dialogues carrying `entry`'s bit with its label. Unlabelled flags add nothing.
    pub fn register_flag(&mut self, entry: &FlagEntry) {
        let Some(label) = entry.label.clone() else { return };
        let bit = entry.bit;
        self.register(Box::new(move |dialogue, details| {
            if dialogue.has_flag(bit) {
                details.tags.push(label.clone());
            }
        }));
    }

    pub fn details(&self, dialogue: &Dialogue) -> SearchDetails {
        let mut details = SearchDetails::default();
        for hook in &self.hooks {
            hook(dialogue, &mut details);
        }
        details
    }

    fn format_prefix(&self, dialogue: &Dialogue, show_answer_type: bool) -> String {
        let details = self.details(dialogue);
        let mut result = format_details(dialogue, &details);
        if let Some(question_type) = &details.question_type {
            result.push_str(&format!("[{question_type}] "));
        }
        if show_answer_type {
            if let Some(answer_type) = &details.answer_type {
                result.push_str(&format!("[{answer_type}] "));
            }
        }
        result
    }

    /// One entry per dialogue: `{prefix}{id}. [tags] {answer}`, redirections below with `= `.
    pub fn format_answers(&self, dialogues: &[Dialogue], prefix: &str) -> Vec<String> {
        dialogues
            .iter()
            .map(|dialogue| {
                let mut output =
                    vec![format!("{prefix}{}{}", self.format_prefix(dialogue, true), format_answer(&dialogue.answer))];
                self.push_redirections(dialogue, prefix, &mut output);
                output.join("\n")
            })
            .collect()
    }

    /// One entry per dialogue: `{prefix}{id}. [tags] 问题：{original}，回答：{answer}`.
    pub fn format_question_answers(&self, dialogues: &[Dialogue], prefix: &str) -> Vec<String> {
        dialogues
            .iter()
            .map(|dialogue| {
                let details = self.details(dialogue);
                let question_type = details.question_type.as_deref().unwrap_or("问题");
                let answer_type = details.answer_type.as_deref().unwrap_or("回答");
                let mut output = vec![format!(
                    "{prefix}{}{question_type}：{}，{answer_type}：{}",
                    format_details(dialogue, &details),
                    dialogue.original,
                    format_answer(&dialogue.answer)
                )];
                self.push_redirections(dialogue, prefix, &mut output);
                output.join("\n")
            })
            .collect()
    }

    /// Full view of a single dialogue.
    pub fn format_detail(&self, dialogue: &Dialogue) -> String {
        let details = self.details(dialogue);
        let question_type = details.question_type.as_deref().unwrap_or("问题");
        let answer_type = details.answer_type.as_deref().unwrap_or("回答");

        let mut output = vec![
            format!("编号为 {} 的问答信息：", dialogue.id),
            format!("{question_type}：{}", dialogue.original),
            format!("{answer_type}：{}", dialogue.answer),
        ];
        if !details.tags.is_empty() {
            output.push(format!("标签：{}", details.tags.join(", ")));
        }
        if !dialogue.redirections().is_empty() {
            output.push("重定向到：".to_string());
            output.extend(self.format_question_answers(dialogue.redirections(), ""));
        }
        output.join("\n")
    }

    fn push_redirections(&self, dialogue: &Dialogue, prefix: &str, output: &mut Vec<String>) {
        if let Some(redirections) = &dialogue.redirections {
            output.extend(self.format_answers(redirections, &format!("{prefix}= ")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlagRegistry;

    fn dialogue(id: u64, original: &str, answer: &str) -> Dialogue {
        let mut d = Dialogue::new(original, answer);
        d.id = id;
        d
    }

    #[test]
    fn short_single_line_answers_are_unchanged() {
        assert_eq!(format_answer("你好呀"), "你好呀");
        let exact = "a".repeat(MAX_ANSWER_LENGTH);
        assert_eq!(format_answer(&exact), exact);
    }

    #[test]
    fn multi_line_answers_keep_the_first_line() {
        assert_eq!(format_answer("a\nb"), "a……");
        assert_eq!(format_answer("  first  \r\nsecond"), "first……");
        assert_eq!(format_answer("first$nsecond"), "first……");
    }

    #[test]
    fn images_become_placeholders() {
        assert_eq!(format_answer("看[CQ:image,file=abc.png]"), "看[图片]");
        assert_eq!(format_answer("[CQ:face,id=1]"), "[CQ:face,id=1]");
    }

    #[test]
    fn long_answers_are_cut_with_ellipsis() {
        let long = "字".repeat(150);
        let out = format_answer(&long);
        assert_eq!(out.chars().count(), MAX_ANSWER_LENGTH + 2);
        assert!(out.ends_with("……"));
    }

    #[test]
    fn existing_ellipsis_is_not_doubled() {
        assert_eq!(format_answer("wait……\nmore"), "wait……");
        assert_eq!(format_answer("wait…\nmore"), "wait……");

        let mut cut = "x".repeat(MAX_ANSWER_LENGTH - 1);
        cut.push('…');
        cut.push_str("tail");
        let out = format_answer(&cut);
        assert!(out.ends_with("x……"));
        assert_eq!(out.chars().count(), MAX_ANSWER_LENGTH + 1);
    }

    #[test]
    fn output_never_exceeds_limit_plus_ellipsis() {
        let inputs = ["短", "line\nline", &"y".repeat(500), &"…".repeat(120), "[CQ:image,file=1]\n2"];
        for input in inputs {
            assert!(format_answer(input).chars().count() <= MAX_ANSWER_LENGTH + ELLIPSIS.chars().count());
        }
    }

    #[test]
    fn details_prefix_lists_tags() {
        let mut registry = FlagRegistry::new();
        registry.register_labeled("frozen", Some("锁定".into())).unwrap();
        let mut formatter = AnswerFormatter::new();
        formatter.register_flag(registry.entry("frozen").unwrap());
        formatter.register(Box::new(|_, details| details.tags.push("测试".into())));

        let mut d = dialogue(12, "天气", "晴");
        d.set_flag(registry.get("frozen").unwrap(), true);
        d.set_flag(FlagBit::REGEXP, true);

        let details = formatter.details(&d);
        assert_eq!(details.tags, vec!["锁定", "测试"]);
        assert_eq!(format_details(&d, &details), "12. [锁定, 测试] ");
        assert_eq!(format_details(&dialogue(3, "q", "a"), &SearchDetails::default()), "3. ");
        assert_eq!(formatter.format_answers(&[d], ""), vec!["12. [锁定, 测试] [正则] 晴"]);
    }

    #[test]
    fn question_answer_listing_nests_redirections() {
        let formatter = AnswerFormatter::new();
        let mut leaf = dialogue(3, "c", "终点");
        leaf.set_flag(FlagBit::REGEXP, true);
        let mut middle = dialogue(2, "b", "%{dialogue c}");
        middle.redirections = Some(vec![leaf]);
        let mut root = dialogue(1, "a", "%{dialogue b}");
        root.redirections = Some(vec![middle]);

        let lines = formatter.format_question_answers(&[root], "");
        assert_eq!(lines, vec!["1. 问题：a，回答：%{dialogue b}\n= 2. %{dialogue c}\n= = 3. [正则] 终点"]);
    }

    #[test]
    fn detail_view_lists_redirections() {
        let formatter = AnswerFormatter::new();
        let mut root = dialogue(1, "你好", "%{dialogue 早上好}");
        root.redirections = Some(vec![dialogue(4, "早上好", "早！")]);

        assert_eq!(
            formatter.format_detail(&root),
            "编号为 1 的问答信息：\n问题：你好\n回答：%{dialogue 早上好}\n重定向到：\n4. 问题：早上好，回答：早！"
        );
    }
}
