use anyhow::{Context, Result};
use clap::Parser;
use runbook::config::{DEFAULT_SIMILARITY, ShellConfig};
use runbook::{Config, ExecutableLanguages, TerminalGate, WalkOutcome, logging, parse_file};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "runbook",
    about = "Play a markdown tutorial interactively against a live shell session",
    version
)]
struct Args {
    /// Path to the markdown document
    document: String,

    /// Shell to run executable code blocks in (default: /bin/bash --noediting)
    #[arg(long)]
    shell: Option<String>,

    /// Extra argument for the shell; repeat for several
    #[arg(long = "shell-arg", allow_hyphen_values = true)]
    shell_args: Vec<String>,

    /// Additional code block language to execute; repeat for several
    #[arg(long = "exec-lang")]
    exec_langs: Vec<String>,

    /// Similarity required when a block declares expected output but no threshold
    #[arg(long, default_value_t = DEFAULT_SIMILARITY)]
    similarity: f64,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> Config {
        let shell = match &self.shell {
            Some(program) => ShellConfig::custom(program, self.shell_args.clone()),
            None if self.shell_args.is_empty() => ShellConfig::default(),
            None => ShellConfig::custom(ShellConfig::default().program, self.shell_args.clone()),
        };
        Config {
            shell,
            languages: ExecutableLanguages::with_extra(self.exec_langs.iter().cloned()),
            default_similarity: self.similarity,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let blocks = parse_file(&args.document)
        .with_context(|| format!("Failed to load document: {}", args.document))?;
    info!(blocks = blocks.len(), document = %args.document, "document loaded");

    let mut walker = args.config().walker(blocks, TerminalGate);
    let outcome = walker.run().await.context("Walk failed")?;
    info!(?outcome, "walk finished");

    if outcome == WalkOutcome::Aborted {
        // Stop right here: the shell and anything still pending go with the process.
        std::process::exit(0);
    }

    Ok(())
}
