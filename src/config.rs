//! Run configuration assembled by the CLI.

use crate::block::ExecutableLanguages;
use crate::gate::ConfirmationGate;
use crate::shell::ShellSession;
use crate::walker::Walker;
use crate::Block;

/// Interpreter used when no shell is given.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Arguments for [`DEFAULT_SHELL`]. Line editing is off so no readline
/// escape sequences end up in captured output.
pub const DEFAULT_SHELL_ARGS: &[&str] = &["--noediting"];

/// Threshold applied when a block has expected output but declares no similarity.
pub const DEFAULT_SIMILARITY: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_SHELL.to_string(),
            args: DEFAULT_SHELL_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ShellConfig {
    /// A custom interpreter. Default arguments only apply to the default shell.
    pub fn custom(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub shell: ShellConfig,
    pub languages: ExecutableLanguages,
    pub default_similarity: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            languages: ExecutableLanguages::default(),
            default_similarity: DEFAULT_SIMILARITY,
        }
    }
}

impl Config {
    /// An unstarted session for the configured shell.
    pub fn shell_session(&self) -> ShellSession {
        ShellSession::new(&self.shell.program, self.shell.args.clone())
    }

    /// A walker over `blocks` backed by a fresh shell session.
    pub fn walker<G: ConfirmationGate>(
        &self,
        blocks: Vec<Block>,
        gate: G,
    ) -> Walker<ShellSession, G> {
        Walker::new(blocks, self.shell_session(), gate)
            .with_languages(self.languages.clone())
            .with_default_similarity(self.default_similarity)
    }
}
