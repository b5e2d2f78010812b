//! The persistent shell session executable code blocks run in.
//!
//! [`ShellSession`] hosts one interactive interpreter in a PTY for the whole
//! walk. Its prompts are replaced with markers that ordinary output will not
//! contain, so the end of each command is detected by the primary marker
//! reappearing. There is deliberately no timeout: a command that never
//! returns to the prompt blocks until the process is interrupted.

use crate::pty::PtySession;
use crate::pty_reader::spawn_reader;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Marker the interpreter prints when it is ready for a new command.
pub const PRIMARY_PROMPT: &str = "[RUNBOOK_PROMPT>";

/// Marker the interpreter prints when a command needs more input lines.
pub const CONTINUATION_PROMPT: &str = "[RUNBOOK_PROMPT+";

/// Escape sequences bash emits around input when bracketed paste is on.
const BRACKETED_PASTE: &[&str] = &["\x1b[?2004h", "\x1b[?2004l"];

/// Errors reported by a running shell session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Incomplete command, the shell was still waiting for input: {0}")]
    IncompleteCommand(String),

    #[error("Shell session closed unexpectedly")]
    Closed,
}

/// Runs command text and returns what it printed.
///
/// The walker only talks to the shell through this trait, so tests can count
/// executions without a real interpreter.
#[async_trait(?Send)]
pub trait CommandRunner {
    async fn run_command(&mut self, command: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prompt {
    Primary,
    Continuation,
}

/// A live interpreter and the output it has produced but nobody has consumed yet.
struct Live {
    pty: PtySession,
    output_rx: UnboundedReceiver<Vec<u8>>,
    scanner: PromptScanner,
}

/// Accumulates PTY output and splits it at prompt markers.
///
/// Bytes already searched are not searched again, apart from a tail one byte
/// shorter than a marker, which may hold the start of a marker split across
/// chunks.
#[derive(Debug, Default)]
struct PromptScanner {
    buffer: Vec<u8>,
    scanned: usize,
}

/// A lazily spawned, long-lived interactive shell.
pub struct ShellSession {
    program: String,
    args: Vec<String>,
    live: Option<Live>,
}

impl ShellSession {
    /// Describe the shell to run. Nothing is spawned until the first command.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            live: None,
        }
    }

    /// Whether the interpreter has been spawned and is still running.
    pub fn is_running(&mut self) -> bool {
        self.live.as_mut().is_some_and(|live| live.pty.is_running())
    }

    async fn live(&mut self) -> Result<&mut Live> {
        if self.live.is_none() {
            self.live = Some(self.spawn().await?);
        }
        self.live.as_mut().ok_or_else(|| SessionError::Closed.into())
    }

    async fn spawn(&self) -> Result<Live> {
        info!(program = %self.program, args = ?self.args, "spawning shell session");
        let (pty, reader) = PtySession::spawn(&self.program, &self.args)?;
        let mut live = Live {
            pty,
            output_rx: spawn_reader(reader),
            scanner: PromptScanner::default(),
        };

        live.pty.write(prompt_change_command().as_bytes())?;
        // Whatever the user's own prompt and the echoed setup line printed is
        // discarded together with the first marker.
        live.read_until_prompt().await?;
        debug!("shell session ready");
        Ok(live)
    }
}

#[async_trait(?Send)]
impl CommandRunner for ShellSession {
    async fn run_command(&mut self, command: &str) -> Result<String> {
        let live = self.live().await?;
        let mut lines: Vec<&str> = command.lines().collect();
        if lines.is_empty() {
            lines.push("");
        }

        let mut output = String::new();
        let mut last_prompt = Prompt::Primary;
        for line in lines {
            debug!(line, "sending line to shell");
            live.pty.write(format!("{line}\n").as_bytes())?;
            let (text, prompt) = live.read_until_prompt().await?;
            output.push_str(&text);
            last_prompt = prompt;
        }

        if last_prompt == Prompt::Continuation {
            // Interrupt the half-entered command so the session stays usable.
            live.pty.write(b"\x03")?;
            while live.read_until_prompt().await?.1 != Prompt::Primary {}
            return Err(SessionError::IncompleteCommand(command.to_string()).into());
        }

        Ok(output)
    }
}

impl Live {
    /// Wait until either prompt marker shows up and return the output before it.
    async fn read_until_prompt(&mut self) -> Result<(String, Prompt)> {
        loop {
            if let Some(found) = self.scanner.take_until_prompt() {
                return Ok(found);
            }
            match self.output_rx.recv().await {
                Some(data) => self.scanner.push(&data),
                None => return Err(SessionError::Closed.into()),
            }
        }
    }
}

impl PromptScanner {
    fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Remove and return the output up to the earliest marker, if one arrived.
    fn take_until_prompt(&mut self) -> Option<(String, Prompt)> {
        let from = self.scanned.saturating_sub(PRIMARY_PROMPT.len() - 1);
        let Some((idx, prompt)) = self.find_prompt(from) else {
            self.scanned = self.buffer.len();
            return None;
        };
        let text = clean_output(&self.buffer[..idx]);
        self.buffer.drain(..idx + PRIMARY_PROMPT.len());
        self.scanned = 0;
        Some((text, prompt))
    }

    /// Earliest prompt marker at or after `from`, as an absolute offset.
    fn find_prompt(&self, from: usize) -> Option<(usize, Prompt)> {
        let window = &self.buffer[from.min(self.buffer.len())..];
        let primary =
            find(window, PRIMARY_PROMPT.as_bytes()).map(|i| (from + i, Prompt::Primary));
        let continuation = find(window, CONTINUATION_PROMPT.as_bytes())
            .map(|i| (from + i, Prompt::Continuation));
        match (primary, continuation) {
            (Some(p), Some(c)) => Some(if c.0 < p.0 { c } else { p }),
            (p, c) => p.or(c),
        }
    }
}

/// The line that disables echo and swaps both prompts for the markers.
///
/// An empty `\[\]` pair is spliced into each marker: bash renders it as
/// nothing, but the echoed assignment itself never contains the marker text.
fn prompt_change_command() -> String {
    format!(
        "stty -echo; PS1='{}' PS2='{}' PROMPT_COMMAND=''\n",
        split_marker(PRIMARY_PROMPT),
        split_marker(CONTINUATION_PROMPT)
    )
}

fn split_marker(marker: &str) -> String {
    let (head, tail) = marker.split_at(5);
    format!("{head}\\[\\]{tail}")
}

fn clean_output(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).replace('\r', "");
    for seq in BRACKETED_PASTE {
        text = text.replace(seq, "");
    }
    text
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
