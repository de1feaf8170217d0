//! Thin CLI consumer of `logfathom-core` (spec.md §6): non-interactive
//! `--open`/`--combats`/`--overview` flags, or an interactive REPL
//! accepting `open|o`, `combats|c`, `overview|ov`, `help|h`, `quit|q`.

use clap::Parser;
use logfathom_cli::{commands, readline, CliContext};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Off-line analyzer for space-combat log files")]
struct Cli {
    /// Path to a combat log; required for non-interactive use.
    #[arg(long)]
    open: Option<PathBuf>,

    /// List the first N isolated combats (default 5).
    #[arg(long, num_args = 0..=1, default_missing_value = "5")]
    combats: Option<usize>,

    /// Print the overview table of combat #N, 1-indexed (default 1).
    #[arg(long, num_args = 0..=1, default_missing_value = "1")]
    overview: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let ctx = CliContext::new();

    if let Some(path) = &cli.open {
        match commands::open(&path.to_string_lossy(), &ctx).await {
            Ok(message) => println!("{message}"),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
        if let Some(n) = cli.combats {
            match commands::combats(&ctx, n).await {
                Ok(table) => println!("{table}"),
                Err(err) => eprintln!("{err}"),
            }
        }
        if let Some(n) = cli.overview {
            match commands::overview(&ctx, n).await {
                Ok(table) => println!("{table}"),
                Err(err) => eprintln!("{err}"),
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", commands::help());
    loop {
        let line = match readline() {
            Ok(line) => line,
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match respond(line, &ctx).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => println!("{err}"),
        }
    }
    ExitCode::SUCCESS
}

async fn respond(line: &str, ctx: &CliContext) -> Result<bool, String> {
    let tokens = shlex::split(line).ok_or("error: invalid quoting")?;
    let Some(verb) = tokens.first() else {
        return Ok(false);
    };
    let rest = &tokens[1..];

    match verb.as_str() {
        "open" | "o" => {
            let path = rest.first().ok_or("usage: open <path>")?;
            println!("{}", commands::open(path, ctx).await?);
        }
        "combats" | "c" => {
            println!("{}", commands::combats(ctx, parse_n(rest, 5)?).await?);
        }
        "overview" | "ov" => {
            println!("{}", commands::overview(ctx, parse_n(rest, 1)?).await?);
        }
        "help" | "h" => println!("{}", commands::help()),
        "quit" | "q" => return Ok(true),
        other => println!("unknown verb {other:?}; {}", commands::help()),
    }
    Ok(false)
}

fn parse_n(rest: &[String], default: usize) -> Result<usize, String> {
    match rest.first() {
        Some(s) => s.parse().map_err(|_| format!("expected a number, got {s:?}")),
        None => Ok(default),
    }
}
