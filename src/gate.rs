//! The [`ConfirmationGate`] trait: "wait until the user says go on, or stop".
//!
//! [`TerminalGate`] reads a single raw keystroke from the terminal.
//! [`ScriptedGate`] replays a fixed key sequence and records every pause,
//! which is what the walker tests drive.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read};
use tracing::debug;

/// The key that stops the walk. Case-sensitive.
pub const ABORT_KEY: char = 'b';

/// What the user decided at a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Abort,
}

impl Signal {
    /// Map a captured key to a signal. `None` stands for an interrupted or
    /// empty read and counts as continue.
    pub fn from_key(key: Option<char>) -> Self {
        match key {
            Some(ABORT_KEY) => Signal::Abort,
            _ => Signal::Continue,
        }
    }
}

/// The points at which the walker stops for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// A heading that ends the current section.
    SectionEnd,
    /// Before running an executable code block.
    BeforeExecute,
    /// After showing a code block that is not executed.
    PastBlock,
    /// After a command has run and its output was shown.
    AfterCommand,
}

impl Pause {
    /// The line shown to the user before waiting.
    pub fn prompt(self) -> &'static str {
        match self {
            Pause::BeforeExecute => {
                "Press any key to execute the above code block... Press b to exit the program"
            }
            Pause::SectionEnd | Pause::PastBlock | Pause::AfterCommand => {
                "Press any key to continue... Press b to exit the program"
            }
        }
    }
}

/// Blocks until the user confirms or aborts.
#[async_trait(?Send)]
pub trait ConfirmationGate {
    async fn confirm(&mut self, pause: Pause) -> Result<Signal>;
}

/// Reads one keystroke from stdin, in raw mode when stdin is a terminal.
///
/// When stdin is not a terminal a single byte is read instead and end of input
/// counts as continue, so a walk can be driven from a pipe.
#[derive(Debug, Default)]
pub struct TerminalGate;

#[async_trait(?Send)]
impl ConfirmationGate for TerminalGate {
    async fn confirm(&mut self, pause: Pause) -> Result<Signal> {
        let key = tokio::task::spawn_blocking(read_key)
            .await
            .context("Key reader task failed")??;
        let signal = Signal::from_key(key);
        debug!(?pause, ?key, ?signal, "confirmation received");
        Ok(signal)
    }
}

fn read_key() -> Result<Option<char>> {
    if !io::stdin().is_terminal() {
        let mut byte = [0u8; 1];
        let n = io::stdin()
            .lock()
            .read(&mut byte)
            .context("Failed to read from stdin")?;
        return Ok((n == 1).then(|| byte[0] as char));
    }

    let _raw = RawMode::enable()?;
    loop {
        if let Event::Key(key) = event::read().context("Failed to read key event")? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            // Raw mode swallows SIGINT; an interrupt is a neutral answer.
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                return Ok(None);
            }
            return Ok(match key.code {
                KeyCode::Char(c) => Some(c),
                KeyCode::Enter => Some('\n'),
                _ => None,
            });
        }
    }
}

/// Restores cooked mode when dropped, including on error paths.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Replays a fixed sequence of keys, one per pause, then keeps continuing.
#[derive(Debug, Default)]
pub struct ScriptedGate {
    keys: VecDeque<Option<char>>,
    pauses: Vec<Pause>,
}

impl ScriptedGate {
    pub fn new(keys: impl IntoIterator<Item = char>) -> Self {
        Self {
            keys: keys.into_iter().map(Some).collect(),
            pauses: Vec::new(),
        }
    }

    /// Queue an interrupted wait, which must behave like continue.
    pub fn push_interrupt(&mut self) {
        self.keys.push_back(None);
    }

    /// Every pause the walker stopped at, in order.
    pub fn pauses(&self) -> &[Pause] {
        &self.pauses
    }
}

#[async_trait(?Send)]
impl ConfirmationGate for ScriptedGate {
    async fn confirm(&mut self, pause: Pause) -> Result<Signal> {
        self.pauses.push(pause);
        Ok(Signal::from_key(self.keys.pop_front().flatten()))
    }
}
