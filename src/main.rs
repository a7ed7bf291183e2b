mod debug_report;

use dialogue_qa::{MemoryStore, QaConfig, QaService};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,dialogue_qa=debug".into()))
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => QaConfig::load(path)?,
        None => QaConfig::default(),
    };
    if let Some(prefix) = cli.prefix {
        config.prefix = prefix;
    }
    if let Some(corpus) = cli.corpus {
        config.corpus = Some(corpus);
    }

    let store = match &config.corpus {
        Some(path) => MemoryStore::load(path)?,
        None => MemoryStore::new(),
    };
    let service = QaService::builder(Arc::new(store)).config(config).build()?;

    let Some(invocation) = service.parse(&cli.message) else {
        eprintln!("not a dialogue command: {}", cli.message.trim());
        std::process::exit(1);
    };

    let reply = service.respond(invocation.clone()).await?;
    if cli.tree {
        debug_report::print_run(&cli.message, &invocation, reply.resolution.as_ref(), service.stripper(), cli.color);
    }
    println!("{}", reply.text);
    Ok(())
}

struct CliConfig {
    message: String,
    config: Option<PathBuf>,
    corpus: Option<PathBuf>,
    prefix: Option<String>,
    tree: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut message: Option<String> = None;
    let mut config = None;
    let mut corpus = None;
    let mut prefix = None;
    let mut tree = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("dialogue-qa {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--tree" => tree = true,
            "--config" | "-c" => {
                let value = args.next().ok_or_else(|| "error: --config expects a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--corpus" => {
                let value = args.next().ok_or_else(|| "error: --corpus expects a value".to_string())?;
                corpus = Some(PathBuf::from(value));
            }
            "--prefix" => {
                let value = args.next().ok_or_else(|| "error: --prefix expects a value".to_string())?;
                prefix = Some(value);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    message = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--config=") => {
                config = Some(PathBuf::from(arg.trim_start_matches("--config=")));
            }
            _ if arg.starts_with("--corpus=") => {
                corpus = Some(PathBuf::from(arg.trim_start_matches("--corpus=")));
            }
            _ if arg.starts_with("--prefix=") => {
                prefix = Some(arg.trim_start_matches("--prefix=").to_string());
            }
            _ if arg.starts_with("--") => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                // Everything from here on is the chat message, dashes included.
                message = Some(std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" "));
                break;
            }
        }
    }

    let message = match message {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if message.trim().is_empty() {
        return Err(format!("error: no message provided\n\n{}", help_text()));
    }

    Ok(CliConfig { message, config, corpus, prefix, tree, color })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "dialogue-qa {version}

Answer a single chat message against a dialogue corpus.

Usage:
  dialogue-qa [OPTIONS] [--] <message...>
  echo '<message>' | dialogue-qa [OPTIONS]

Options:
  -c, --config <file>        TOML config (prefix, nicknames, flags, corpus).
  --corpus <file>            TOML corpus of [[dialogue]] tables. Overrides the config.
  --prefix <text>            Shorthand prefix. Default: #
  --tree                     Print the redirection tree and resolver counters.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Logging is controlled with RUST_LOG (default: info,dialogue_qa=debug).

Exit codes:
  0  Reply printed.
  1  Not a dialogue command, or a config/storage error.
  2  Invalid arguments or missing message.
",
        version = env!("CARGO_PKG_VERSION")
    )
}
