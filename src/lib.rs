//! # Runbook
//!
//! Play a markdown tutorial interactively against a live shell session.
//!
//! Runbook walks the headings, paragraphs and fenced code blocks of a
//! document in order. Prose is printed, and the walk pauses for a keypress
//! at the end of each section and around every code block. Code blocks in a
//! shell language are run in one persistent interpreter, so `cd`, exported
//! variables and cached CLI logins carry over from block to block. When a
//! block declares the output it should produce, the observed output is
//! compared with it and a warning is printed if they differ too much.
//!
//! ## Quick start
//!
//! ```no_run
//! use runbook::{Config, TerminalGate, WalkOutcome, parse_file};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let blocks = parse_file("tutorial.md")?;
//!     let mut walker = Config::default().walker(blocks, TerminalGate);
//!     if walker.run().await? == WalkOutcome::Aborted {
//!         std::process::exit(0);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Document syntax
//!
//! | Markdown | Effect |
//! |----------|--------|
//! | `# Heading` | Printed; a heading that ends a section pauses first |
//! | prose | Printed without pausing |
//! | ```` ```bash ```` | Shown, then run after confirmation |
//! | ```` ```python ```` | Shown, then a pause (not run) |
//! | ```` ```output ```` after a code block | Expected output of that block |
//! | ```` ```output json ```` after a code block | Expected output, compared as JSON |
//! | `<!-- expected_similarity=0.8 -->` | Required similarity of the output |
//! | `<!-- expected_regex=^v\d+ -->` | Pattern the output must match |
//!
//! `bash`, `terraform`, `azurecli` and `azurecli-interactive` are executed by
//! default; see [`ExecutableLanguages`].
//!
//! ## Driving a walk without a terminal
//!
//! The walker talks to the shell through [`CommandRunner`] and to the user
//! through [`ConfirmationGate`], and writes everything it shows to an output
//! handler. [`ScriptedGate`] answers pauses from a fixed key sequence:
//!
//! ```no_run
//! use runbook::{Block, ScriptedGate, ShellSession, WalkOutcome, Walker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let blocks = vec![Block::heading("Demo"), Block::code("bash", "echo 42")];
//!     let shell = ShellSession::new("/bin/bash", vec!["--noediting".into()]);
//!
//!     let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
//!     let sink = captured.clone();
//!     let mut walker = Walker::new(blocks, shell, ScriptedGate::default())
//!         .with_output_handler(move |data| sink.lock().unwrap().extend_from_slice(data));
//!
//!     assert_eq!(walker.run().await?, WalkOutcome::Completed);
//!     println!("{}", String::from_utf8_lossy(&captured.lock().unwrap()));
//!     Ok(())
//! }
//! ```

pub mod block;
pub mod config;
pub mod document;
pub mod gate;
pub mod logging;
pub mod shell;
pub mod similarity;
pub mod walker;
pub(crate) mod pty;
pub(crate) mod pty_reader;

pub use block::{Block, CodeBlock, ExecutableLanguages};
pub use config::{Config, ShellConfig};
pub use document::{DocumentError, parse_file, parse_str};
pub use gate::{ConfirmationGate, Pause, ScriptedGate, Signal, TerminalGate};
pub use shell::{CommandRunner, SessionError, ShellSession};
pub use similarity::{Mismatch, check, similarity, verify};
pub use walker::{WalkOutcome, Walker, WalkerState};
