use dialogue_qa::{Dialogue, Invocation, QuestionStripper, Resolution, ResolveMetrics, extract_reference};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

/// Print the classified command, the redirection tree behind a search and
/// the resolver counters.
pub fn print_run(
    message: &str,
    invocation: &Invocation,
    resolution: Option<&Resolution>,
    stripper: &QuestionStripper,
    color: bool,
) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Message: \"{}\"", message), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Command ━━━", ansi::GRAY));
    println!("  {} {:?}", palette.paint("command:", ansi::BLUE), invocation.command);
    println!("  {} {:?}", palette.paint("args:", ansi::BLUE), invocation.args);
    if let Some(target) = &invocation.options.target {
        println!("  {} {}", palette.paint("target:", ansi::BLUE), palette.paint(target, ansi::YELLOW));
    }
    if invocation.options.search {
        let scope = if invocation.options.search_question_answer { "question + answer" } else { "question" };
        println!("  {} {}", palette.paint("search:", ansi::BLUE), scope);
    }

    let Some(resolution) = resolution else {
        println!();
        return;
    };

    println!("\n{}", palette.paint("━━━ Redirections ━━━", ansi::GRAY));
    if resolution.dialogues.is_empty() {
        println!("{}", palette.dim("  No dialogues matched"));
    }
    for dialogue in &resolution.dialogues {
        print_tree(dialogue, 1, &resolution.metrics, stripper, &palette);
    }

    let metrics = &resolution.metrics;
    println!("\n{}", palette.paint("━━━ Resolver ━━━", ansi::GRAY));
    println!(
        "  Queries: {}  │  Depth: {}  │  Total: {}",
        palette.paint(metrics.queries.to_string(), ansi::GREEN),
        palette.paint(metrics.depth.to_string(), ansi::CYAN),
        palette.dim(format!("{:?}", metrics.total)),
    );
    if !metrics.fetched.is_empty() {
        println!("  {} {}", palette.dim("followed:"), metrics.fetched.join(", "));
    }
    if !metrics.skipped.is_empty() {
        println!("  {} {}", palette.dim("skipped:"), palette.paint(metrics.skipped.join(", "), ansi::YELLOW));
    }
    if !metrics.unresolved.is_empty() {
        println!("  {} {}", palette.dim("unresolved:"), palette.paint(metrics.unresolved.join(", "), ansi::YELLOW));
    }
    println!();
}

fn print_tree(
    dialogue: &Dialogue,
    depth: usize,
    metrics: &ResolveMetrics,
    stripper: &QuestionStripper,
    palette: &ansi::Palette,
) {
    let indent = "  ".repeat(depth);
    let arrow = if depth > 1 { palette.dim("↳ ") } else { String::new() };
    println!(
        "{indent}{arrow}{} {} {} {}",
        palette.paint(format!("[{}]", dialogue.id), ansi::GRAY),
        palette.bold(&dialogue.original),
        palette.dim("│"),
        palette.paint(&dialogue.answer, ansi::GREEN),
    );

    if let (Some(reference), None) = (extract_reference(&dialogue.answer), &dialogue.redirections) {
        let key = stripper.strip(reference).parsed;
        if metrics.unresolved.contains(&key) {
            println!("{indent}  {}", palette.dim(format!("(\"{key}\" not resolvable)")));
        } else if metrics.skipped.contains(&key) {
            println!("{indent}  {}", palette.dim(format!("(\"{key}\" already resolved)")));
        }
    }
    for child in dialogue.redirections() {
        print_tree(child, depth + 1, metrics, stripper, palette);
    }
}
