use crate::config::QaConfig;
use crate::engine::{QuestionStripper, RedirectionResolver, Resolution, TestCompiler};
use crate::error::{ConfigError, QaError, QaResult, ValidationError};
use crate::format::{AnswerFormatter, DetailHook};
use crate::prefix::{Command, Invocation, PrefixParser};
use crate::store::DialogueStore;
use crate::{Contributor, Dialogue, DialogueId, DialogueTest, FlagBit, ModifyRequest, QaOptions};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Usage sheet shown for a bare create command.
pub const USAGE: &str = "问答 v0.1.0
用法：
搜索 <问题> - 搜索问题。
#<问题编号> - 查看问题。
# <问题> <回答> - 添加问题。";

/// Largest number of ids a single target list may expand to.
const MAX_TARGETS: usize = 1000;

/// Reply text plus the resolution behind it, when the command searched.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub resolution: Option<Resolution>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply { text: text.into(), resolution: None }
    }
}

/// Builds a [`QaService`]: registers configured flags, then extra
/// contributors and detail hooks, in that order.
pub struct QaServiceBuilder {
    store: Arc<dyn DialogueStore>,
    config: QaConfig,
    contributors: Vec<Contributor>,
    details: Vec<DetailHook>,
}

impl QaServiceBuilder {
    pub fn config(mut self, config: QaConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a flag after the configured ones.
    pub fn flag(mut self, name: &str, label: Option<&str>) -> Self {
        self.config.flags.push(crate::FlagConfig { name: name.to_string(), label: label.map(str::to_string) });
        self
    }

    pub fn contributor(mut self, contributor: Contributor) -> Self {
        self.contributors.push(contributor);
        self
    }

    pub fn detail(mut self, hook: DetailHook) -> Self {
        self.details.push(hook);
        self
    }

    pub fn build(self) -> Result<QaService, ConfigError> {
        let parser = PrefixParser::new(&self.config.prefix)?;
        let mut compiler = TestCompiler::new();
        let mut formatter = AnswerFormatter::new();

        for flag in &self.config.flags {
            let entry = compiler.register_flag(&flag.name, flag.label.clone())?;
            formatter.register_flag(&entry);
        }
        for contributor in self.contributors {
            compiler.register(contributor);
        }
        for hook in self.details {
            formatter.register(hook);
        }

        let stripper = QuestionStripper::new(self.config.nicknames.iter().cloned());
        tracing::debug!(prefix = %self.config.prefix, flags = compiler.flags().len(), "dialogue service ready");

        Ok(QaService { config: self.config, store: self.store, compiler, formatter, stripper, parser })
    }
}

/// The `qa` command pipeline: shorthand parsing, argument check, validation
/// and execution against a [`DialogueStore`].
///
/// Validation failures come back as `Ok` replies; storage failures as `Err`.
pub struct QaService {
    config: QaConfig,
    store: Arc<dyn DialogueStore>,
    compiler: TestCompiler,
    formatter: AnswerFormatter,
    stripper: QuestionStripper,
    parser: PrefixParser,
}

impl QaService {
    pub fn builder(store: Arc<dyn DialogueStore>) -> QaServiceBuilder {
        QaServiceBuilder { store, config: QaConfig::default(), contributors: Vec::new(), details: Vec::new() }
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    pub fn compiler(&self) -> &TestCompiler {
        &self.compiler
    }

    pub fn formatter(&self) -> &AnswerFormatter {
        &self.formatter
    }

    pub fn stripper(&self) -> &QuestionStripper {
        &self.stripper
    }

    /// Classify a raw message without executing it.
    pub fn parse(&self, message: &str) -> Option<Invocation> {
        self.parser.parse(message)
    }

    /// Handle a raw message. `Ok(None)` means the message is not a dialogue command.
    pub async fn handle(&self, message: &str) -> QaResult<Option<String>> {
        let Some(invocation) = self.parse(message) else {
            return Ok(None);
        };
        self.execute(invocation).await.map(Some)
    }

    pub async fn execute(&self, invocation: Invocation) -> QaResult<String> {
        self.respond(invocation).await.map(|reply| reply.text)
    }

    /// Execute an invocation, keeping the search resolution for reporting.
    pub async fn respond(&self, invocation: Invocation) -> QaResult<Reply> {
        tracing::debug!(command = ?invocation.command, options = ?invocation.options, "executing dialogue command");
        let result = match invocation.command {
            Command::Status => self.status().await.map(Reply::text),
            Command::Qa => self.run_qa(invocation).await,
        };
        match result {
            Err(QaError::Validation(err)) => {
                tracing::debug!(%err, "rejected dialogue command");
                Ok(Reply::text(err.to_string()))
            }
            Err(err) => {
                tracing::warn!(%err, "dialogue command failed");
                Err(err)
            }
            ok => ok,
        }
    }

    pub async fn status(&self) -> QaResult<String> {
        let stats = self.store.stats().await?;
        Ok(format!("共收录了 {} 个问题和 {} 个回答。", stats.questions, stats.dialogues))
    }

    /// Resolve `test` against the store, following answer references.
    pub async fn resolve(&self, test: &DialogueTest) -> QaResult<Resolution> {
        RedirectionResolver::new(&self.compiler, &self.stripper, self.store.as_ref()).resolve(test).await
    }

    async fn run_qa(&self, invocation: Invocation) -> QaResult<Reply> {
        let Invocation { mut options, args, .. } = invocation;
        let (question, answer) = self.check(&mut options, args)?;

        if options.search {
            return self.show_search(options, question, answer).await;
        }
        if let Some(target) = options.target.clone() {
            return self.show_or_modify(&target, options, question, answer).await.map(Reply::text);
        }
        self.create(options, question, answer).await.map(Reply::text)
    }

    /// Split option tokens from positional arguments and normalise the question.
    fn check(
        &self,
        options: &mut QaOptions,
        args: Vec<String>,
    ) -> Result<(Option<String>, Option<String>), ValidationError> {
        let mut positional = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-x" | "--regexp" => options.regexp = Some(true),
                "-X" | "--no-regexp" => options.regexp = Some(false),
                _ if is_option(&arg) => {
                    let name = arg.trim_start_matches('-');
                    let (name, value) = match name.strip_prefix("no-") {
                        Some(name) => (name, false),
                        None => (name, true),
                    };
                    if !arg.starts_with("--") || self.compiler.flags().custom().all(|e| e.name != name) {
                        return Err(ValidationError::UnknownOption { option: arg });
                    }
                    options.flags.insert(name.to_string(), value);
                }
                _ => positional.push(arg),
            }
        }

        if positional.len() > 2 {
            return Err(ValidationError::ExtraArguments);
        }
        let mut positional = positional.into_iter().map(|arg| given(&arg));
        let question = positional.next().flatten();
        let answer = positional.next().flatten();

        let Some(question) = question else {
            return Ok((None, answer));
        };
        if has_rich_media(&question) {
            return Err(ValidationError::NonTextQuestion);
        }

        let stripped = self.stripper.strip(&question);
        options.appellative = stripped.appellative;
        options.original = Some(stripped.original.clone());
        let question = if options.regexp == Some(true) { stripped.original } else { stripped.parsed };
        Ok((Some(question), answer))
    }

    async fn show_search(
        &self,
        options: QaOptions,
        question: Option<String>,
        answer: Option<String>,
    ) -> QaResult<Reply> {
        let original = options.original.clone();
        let mut test = DialogueTest {
            question,
            answer: answer.clone(),
            original: original.clone(),
            regexp: Some(true),
            search_question_answer: options.search_question_answer,
            ..Default::default()
        };
        self.compiler.prepare(&options, &mut test);

        let resolution = self.resolve(&test).await?;
        let output = self.formatter.format_question_answers(&resolution.dialogues, "");
        let found = !output.is_empty();

        let text = match (original, answer) {
            (None, None) if found => titled("全部问答如下", output),
            (None, None) => "没有搜索到任何回答，尝试切换到其他环境。".to_string(),
            (None, Some(answer)) if found => titled(&format!("回答“{answer}”的搜索结果如下"), output),
            (None, Some(answer)) => format!("没有搜索到含有“{answer}”的回答。"),
            (Some(original), None) if found => titled(&format!("问题“{original}”的搜索结果如下"), output),
            (Some(original), None) => format!("没有搜索到含有“{original}”的问题。"),
            (Some(original), Some(answer)) if found => {
                titled(&format!("问答“{original}”“{answer}”的搜索结果如下"), output)
            }
            (Some(original), Some(answer)) => format!("没有搜索到含有“{original}”“{answer}”的问答。"),
        };
        Ok(Reply { text, resolution: Some(resolution) })
    }

    async fn show_or_modify(
        &self,
        target: &str,
        options: QaOptions,
        question: Option<String>,
        answer: Option<String>,
    ) -> QaResult<String> {
        let ids = parse_target(target)?;
        let mut dialogues = self.store.get_by_ids(&ids).await?;
        let found: BTreeSet<DialogueId> = dialogues.iter().map(|d| d.id).collect();
        let missing: Vec<DialogueId> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        if dialogues.is_empty() {
            return Ok(format!("没有搜索到编号为 {} 的问答。", join_ids(&missing)));
        }

        let mut output = Vec::new();
        if question.is_none() && answer.is_none() && !options.has_modifications() {
            let resolver = RedirectionResolver::new(&self.compiler, &self.stripper, self.store.as_ref());
            let resolution = resolver.expand(dialogues).await?;
            output.extend(resolution.dialogues.iter().map(|d| self.formatter.format_detail(d)));
        } else {
            let targets_are_patterns = dialogues.iter().any(|d| d.has_flag(FlagBit::REGEXP));
            if options.regexp == Some(true) || (options.regexp.is_none() && question.is_some() && targets_are_patterns) {
                match &question {
                    Some(question) => validate_pattern(question)?,
                    None => dialogues.iter().try_for_each(|d| validate_pattern(&d.question))?,
                }
            }

            let request = ModifyRequest { options, question, answer };
            for dialogue in &mut dialogues {
                self.compiler.modify(&request, dialogue);
            }
            self.store.update(&dialogues).await?;
            tracing::info!(ids = %join_ids(&found.iter().copied().collect::<Vec<_>>()), "modified dialogues");
            output.push(format!("问答 {} 已成功修改。", join_ids(&found.into_iter().collect::<Vec<_>>())));
        }

        if !missing.is_empty() {
            output.push(format!("没有搜索到编号为 {} 的问答。", join_ids(&missing)));
        }
        Ok(output.join("\n"))
    }

    async fn create(&self, options: QaOptions, question: Option<String>, answer: Option<String>) -> QaResult<String> {
        let (question, answer) = match (question, answer) {
            (Some(question), Some(answer)) => (question, answer),
            (None, None) => return Err(ValidationError::Usage.into()),
            _ => return Err(ValidationError::MissingQuestionOrAnswer.into()),
        };
        if options.regexp == Some(true) {
            validate_pattern(&question)?;
        }

        let existing = DialogueTest {
            question: Some(question.clone()),
            answer: Some(answer.clone()),
            regexp: Some(false),
            ..Default::default()
        };
        let query = self.compiler.compile(&existing)?;
        if let Some(dialogue) = self.store.get(&query).await?.first() {
            return Ok(format!(
                "问答已存在，编号为 {id}，如要修改请尝试使用 {prefix}{id} 指令。",
                id = dialogue.id,
                prefix = self.config.prefix
            ));
        }

        let request = ModifyRequest { options, question: Some(question), answer: Some(answer) };
        let mut dialogue = Dialogue::new("", "");
        self.compiler.modify(&request, &mut dialogue);
        let created = self.store.create(dialogue).await?;
        tracing::info!(id = created.id, question = %created.question, "created dialogue");
        Ok(format!("问答已添加，编号为 {}。", created.id))
    }
}

/// `-x`, `--frozen`: a dash followed by a letter. `-_-` and `-1` stay positional.
fn is_option(arg: &str) -> bool {
    let body = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'));
    body.and_then(|b| b.chars().next()).is_some_and(|c| c.is_ascii_alphabetic())
}

/// Positional argument with the "not given" placeholders removed.
fn given(arg: &str) -> Option<String> {
    let arg = arg.trim();
    if arg.is_empty() || arg == "~" || arg == "～" { None } else { Some(arg.to_string()) }
}

/// Rich-media markup other than faces.
fn has_rich_media(text: &str) -> bool {
    text.match_indices("[CQ:").any(|(at, marker)| !text[at + marker.len()..].starts_with("face"))
}

fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    Regex::new(pattern).map(|_| ()).map_err(|_| ValidationError::InvalidRegex { pattern: pattern.to_string() })
}

/// Expand `1,3..5` into sorted, deduplicated ids.
fn parse_target(target: &str) -> Result<Vec<DialogueId>, ValidationError> {
    let invalid = || ValidationError::InvalidTarget { target: target.to_string() };
    let mut ids = BTreeSet::new();

    for part in target.split(',') {
        let (start, end) = match part.split_once("..") {
            Some((start, end)) => (start, end),
            None => (part, part),
        };
        let start: DialogueId = start.parse().map_err(|_| invalid())?;
        let end: DialogueId = end.parse().map_err(|_| invalid())?;
        if start > end || end - start >= MAX_TARGETS as DialogueId {
            return Err(invalid());
        }
        ids.extend(start..=end);
        if ids.len() > MAX_TARGETS {
            return Err(invalid());
        }
    }

    Ok(ids.into_iter().collect())
}

fn join_ids(ids: &[DialogueId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

fn titled(title: &str, mut output: Vec<String>) -> String {
    output.insert(0, format!("{title}："));
    output.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    const CORPUS: &str = r#"
[[dialogue]]
id = 1
question = "你好"
answer = "你好呀"

[[dialogue]]
id = 2
question = "早上好"
answer = "%{dialogue 你好}"

[[dialogue]]
id = 3
question = "^天气.*"
original = "^天气.*"
answer = "今天天气不错"
flag = 1

[[dialogue]]
id = 4
question = "下雨"
answer = "记得带伞，天气预报说下午有雨"
"#;

    fn service() -> (QaService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::from_toml_str(CORPUS).unwrap());
        let service = QaService::builder(store.clone()).flag("frozen", Some("锁定")).build().unwrap();
        (service, store)
    }

    #[tokio::test]
    async fn status_reports_corpus_size() {
        let (service, _) = service();
        assert_eq!(service.handle("#").await.unwrap().unwrap(), "共收录了 4 个问题和 4 个回答。");

        let empty = QaService::builder(Arc::new(MemoryStore::new())).build().unwrap();
        assert_eq!(empty.handle("##").await.unwrap().unwrap(), "共收录了 0 个问题和 0 个回答。");
        assert_eq!(empty.handle("搜索").await.unwrap().unwrap(), "共收录了 0 个问题和 0 个回答。");
    }

    #[tokio::test]
    async fn unrelated_messages_are_not_handled() {
        let (service, _) = service();
        assert_eq!(service.handle("今天吃什么").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_lists_questions_with_redirections() {
        let (service, _) = service();
        let reply = service.handle("##早上").await.unwrap().unwrap();
        assert_eq!(reply, "问题“早上”的搜索结果如下：\n2. 问题：早上好，回答：%{dialogue 你好}\n= 1. 你好呀");
    }

    #[tokio::test]
    async fn search_word_matches_questions_and_answers() {
        let (service, _) = service();
        let reply = service.handle("搜索 天气").await.unwrap().unwrap();
        assert_eq!(
            reply,
            "问题“天气”的搜索结果如下：\n3. 正则：^天气.*，回答：今天天气不错\n4. 问题：下雨，回答：记得带伞，天气预报说下午有雨"
        );

        let reply = service.handle("搜索 不存在").await.unwrap().unwrap();
        assert_eq!(reply, "没有搜索到含有“不存在”的问题。");
    }

    #[tokio::test]
    async fn search_by_answer_only() {
        let (service, _) = service();
        let reply = service.handle("## ~ 带伞").await.unwrap().unwrap();
        assert_eq!(reply, "回答“带伞”的搜索结果如下：\n4. 问题：下雨，回答：记得带伞，天气预报说下午有雨");
    }

    #[tokio::test]
    async fn search_with_bad_pattern_is_rejected() {
        let (service, _) = service();
        let reply = service.handle("## (").await.unwrap().unwrap();
        assert_eq!(reply, ValidationError::InvalidRegex { pattern: "(".into() }.to_string());
    }

    #[tokio::test]
    async fn create_and_duplicate() {
        let (service, store) = service();
        let reply = service.handle("# 晚上好！ 晚安").await.unwrap().unwrap();
        assert_eq!(reply, "问答已添加，编号为 5。");

        let created = store.get_by_ids(&[5]).await.unwrap();
        assert_eq!(created[0].question, "晚上好");
        assert_eq!(created[0].original, "晚上好！");
        assert_eq!(created[0].answer, "晚安");

        let reply = service.handle("# 晚上好 晚安").await.unwrap().unwrap();
        assert_eq!(reply, "问答已存在，编号为 5，如要修改请尝试使用 #5 指令。");
    }

    #[tokio::test]
    async fn create_rejections_leave_store_untouched() {
        let (service, store) = service();
        assert_eq!(service.handle("#你好").await.unwrap().unwrap(), "缺少问题或回答，请检查指令语法。");
        assert_eq!(service.handle("# a b c").await.unwrap().unwrap(), ValidationError::ExtraArguments.to_string());
        assert_eq!(
            service.handle("# [CQ:image,file=1] 图").await.unwrap().unwrap(),
            ValidationError::NonTextQuestion.to_string()
        );
        assert_eq!(
            service.handle("# -x ( 坏").await.unwrap().unwrap(),
            ValidationError::InvalidRegex { pattern: "(".into() }.to_string()
        );
        assert_eq!(
            service.handle("# --unknown q a").await.unwrap().unwrap(),
            ValidationError::UnknownOption { option: "--unknown".into() }.to_string()
        );
        assert_eq!(service.handle("# ~ ~").await.unwrap().unwrap(), USAGE);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn search_reply_carries_its_resolution() {
        let (service, _) = service();
        let invocation = service.parse("##早上").unwrap();
        let reply: crate::Reply = service.respond(invocation).await.unwrap();
        let resolution = reply.resolution.unwrap();
        assert_eq!(resolution.dialogues[0].id, 2);
        assert_eq!(resolution.metrics.fetched, vec!["你好"]);

        let status = service.respond(Invocation::status()).await.unwrap();
        assert!(status.resolution.is_none());
    }

    #[tokio::test]
    async fn id_prefix_followed_by_text_is_not_a_modify() {
        let (service, store) = service();
        assert_eq!(service.parse("#3个苹果 很多"), None);
        assert_eq!(service.handle("#3个苹果 很多").await.unwrap(), None);

        let untouched = &store.get_by_ids(&[3]).await.unwrap()[0];
        assert_eq!(untouched.question, "^天气.*");
        assert_eq!(untouched.answer, "今天天气不错");
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn create_pattern_question_keeps_punctuation() {
        let (service, store) = service();
        let reply = service.handle("# -x ^早.?安$ 早安！").await.unwrap().unwrap();
        assert_eq!(reply, "问答已添加，编号为 5。");
        let created = &store.get_by_ids(&[5]).await.unwrap()[0];
        assert_eq!(created.question, "^早.?安$");
        assert!(created.has_flag(FlagBit::REGEXP));
    }

    #[tokio::test]
    async fn target_view_shows_details_and_redirections() {
        let (service, _) = service();
        let reply = service.handle("#2,9").await.unwrap().unwrap();
        assert_eq!(
            reply,
            "编号为 2 的问答信息：\n问题：早上好\n回答：%{dialogue 你好}\n重定向到：\n1. 问题：你好，回答：你好呀\n没有搜索到编号为 9 的问答。"
        );

        let reply = service.handle("#7..8").await.unwrap().unwrap();
        assert_eq!(reply, "没有搜索到编号为 7, 8 的问答。");
    }

    #[tokio::test]
    async fn target_modify_applies_flags_and_answer() {
        let (service, store) = service();
        let reply = service.handle("#1 ~ 你也好 --frozen").await.unwrap().unwrap();
        assert_eq!(reply, "问答 1 已成功修改。");

        let frozen = service.compiler().flags().get("frozen").unwrap();
        let updated = &store.get_by_ids(&[1]).await.unwrap()[0];
        assert_eq!(updated.answer, "你也好");
        assert_eq!(updated.question, "你好");
        assert!(updated.has_flag(frozen));

        let reply = service.handle("#1 --no-frozen").await.unwrap().unwrap();
        assert_eq!(reply, "问答 1 已成功修改。");
        assert!(!store.get_by_ids(&[1]).await.unwrap()[0].has_flag(frozen));
    }

    #[tokio::test]
    async fn flag_tags_appear_in_listings() {
        let (service, _) = service();
        service.handle("#4 --frozen").await.unwrap();
        let reply = service.handle("## 下雨").await.unwrap().unwrap();
        assert_eq!(reply, "问题“下雨”的搜索结果如下：\n4. [锁定] 问题：下雨，回答：记得带伞，天气预报说下午有雨");

        let reply = service.handle("## 下雨 --no-frozen").await.unwrap().unwrap();
        assert_eq!(reply, "没有搜索到含有“下雨”的问题。");
    }

    #[tokio::test]
    async fn modifying_pattern_targets_validates_the_new_question() {
        let (service, store) = service();
        let reply = service.handle("#3 [ 坏").await.unwrap().unwrap();
        assert_eq!(reply, ValidationError::InvalidRegex { pattern: "[".into() }.to_string());
        assert_eq!(store.get_by_ids(&[3]).await.unwrap()[0].answer, "今天天气不错");
    }

    #[test]
    fn target_lists_expand_ranges() {
        assert_eq!(parse_target("1,3..5").unwrap(), vec![1, 3, 4, 5]);
        assert_eq!(parse_target("5,1..2,2").unwrap(), vec![1, 2, 5]);
        assert!(parse_target("5..1").is_err());
        assert!(parse_target("1..100000").is_err());
    }

    #[test]
    fn option_tokens() {
        assert!(is_option("-x"));
        assert!(is_option("--frozen"));
        assert!(!is_option("-_-"));
        assert!(!is_option("-1"));
        assert!(!is_option("~"));
        assert!(has_rich_media("[CQ:image,file=1]"));
        assert!(!has_rich_media("[CQ:face,id=1]你好"));
    }
}
