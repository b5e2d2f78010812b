//! The [`Walker`]: plays a block sequence as an interactive tutorial.
//!
//! Headings, paragraphs and code blocks are shown in order. The walker stops
//! for confirmation before a heading that ends a section, before and after
//! each executable code block, and after any other code block. An abort at a
//! heading ends the walk gracefully ([`WalkOutcome::Stopped`]); an abort
//! anywhere on the code path yields [`WalkOutcome::Aborted`] and the caller is
//! expected to terminate the program.

use crate::block::{Block, CodeBlock, ExecutableLanguages};
use crate::config::DEFAULT_SIMILARITY;
use crate::gate::{ConfirmationGate, Pause, Signal};
use crate::shell::{CommandRunner, SessionError};
use crate::similarity::check;
use anyhow::{Context as _, Result};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Receives everything the walker shows to the user.
pub type OutputHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Where the walker is within the current section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerState {
    /// At the start of the walk, or right after a section-ending pause.
    SectionStart,
    /// A heading has been shown; the next heading ends the section.
    AwaitingNextBlock,
    /// A code block just finished; the next heading starts silently.
    PostCodeBlock,
    /// Waiting on the gate before a section-ending heading.
    AwaitingHeadingConfirm,
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every block was played.
    Completed,
    /// The user stopped at a section-ending heading.
    Stopped,
    /// The user stopped at a code block pause.
    Aborted,
}

pub struct Walker<R, G> {
    blocks: Vec<Block>,
    cursor: usize,
    state: WalkerState,
    runner: R,
    gate: G,
    languages: ExecutableLanguages,
    default_similarity: f64,
    output_handler: OutputHandler,
}

impl<R: CommandRunner, G: ConfirmationGate> Walker<R, G> {
    /// Create a walker that writes to stdout and executes the default languages.
    pub fn new(blocks: Vec<Block>, runner: R, gate: G) -> Self {
        Self {
            blocks,
            cursor: 0,
            state: WalkerState::SectionStart,
            runner,
            gate,
            languages: ExecutableLanguages::default(),
            default_similarity: DEFAULT_SIMILARITY,
            output_handler: Arc::new(|data| {
                let mut stdout = io::stdout();
                let _ = stdout.write_all(data);
                let _ = stdout.flush();
            }),
        }
    }

    pub fn with_languages(mut self, languages: ExecutableLanguages) -> Self {
        self.languages = languages;
        self
    }

    /// Threshold used when a block declares expected output but no similarity.
    pub fn with_default_similarity(mut self, threshold: f64) -> Self {
        self.default_similarity = threshold;
        self
    }

    pub fn with_output_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.output_handler = Arc::new(handler);
        self
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    /// Blocks not consumed yet, starting with the current head.
    pub fn remaining(&self) -> &[Block] {
        &self.blocks[self.cursor..]
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    /// Play blocks until the sequence is exhausted or the user aborts.
    pub async fn run(&mut self) -> Result<WalkOutcome> {
        while let Some(block) = self.blocks.get(self.cursor).cloned() {
            debug!(index = self.cursor, kind = block.kind(), state = ?self.state, "visiting block");
            match block {
                Block::Heading(text) => match self.state {
                    WalkerState::SectionStart | WalkerState::PostCodeBlock => {
                        self.emit_line(&text);
                        self.cursor += 1;
                        self.state = WalkerState::AwaitingNextBlock;
                    }
                    WalkerState::AwaitingNextBlock | WalkerState::AwaitingHeadingConfirm => {
                        self.state = WalkerState::AwaitingHeadingConfirm;
                        if self.pause(Pause::SectionEnd).await? == Signal::Abort {
                            return Ok(WalkOutcome::Stopped);
                        }
                        // The same heading is shown on the next iteration.
                        self.state = WalkerState::SectionStart;
                    }
                },
                Block::Paragraph(text) => {
                    self.emit_line(&text);
                    self.cursor += 1;
                }
                Block::Code(code) => {
                    self.emit_line(&format!("```{}\n{}\n```", code.language, code.content));
                    if self.execute_code(&code).await? == Signal::Abort {
                        return Ok(WalkOutcome::Aborted);
                    }
                    self.cursor += 1;
                    self.state = WalkerState::PostCodeBlock;
                }
                Block::Other(_) => self.cursor += 1,
            }
        }
        Ok(WalkOutcome::Completed)
    }

    async fn execute_code(&mut self, code: &CodeBlock) -> Result<Signal> {
        if !self.languages.contains(&code.language) {
            return self.pause(Pause::PastBlock).await;
        }
        if self.pause(Pause::BeforeExecute).await? == Signal::Abort {
            return Ok(Signal::Abort);
        }
        self.run_command(code).await
    }

    async fn run_command(&mut self, code: &CodeBlock) -> Result<Signal> {
        let start = Instant::now();
        let result = self.runner.run_command(&code.content).await;
        let elapsed = start.elapsed();

        match result {
            Ok(output) => {
                let output = output.trim();
                debug!(elapsed = ?elapsed, bytes = output.len(), "command finished");
                self.emit_line(&format!(
                    "\n{}\nTime to Execute - {:.3}s",
                    output,
                    elapsed.as_secs_f64()
                ));

                if let Some(expected) = &code.expected_output {
                    self.emit_line(&format!("Expected Results - {}", expected));
                }
                if code.has_expectation() {
                    if let Some(mismatch) = check(output, code, self.default_similarity) {
                        self.emit_line(&mismatch.to_string());
                    }
                }
            }
            Err(err) => match err.downcast_ref::<SessionError>() {
                Some(SessionError::IncompleteCommand(_)) => {
                    warn!(error = %err, "command did not complete");
                    self.emit_line(&err.to_string());
                }
                _ => return Err(err).context("Failed to run code block"),
            },
        }

        self.pause(Pause::AfterCommand).await
    }

    async fn pause(&mut self, pause: Pause) -> Result<Signal> {
        self.emit(format!("\n\n{}\n\n", pause.prompt()).as_bytes());
        let signal = self.gate.confirm(pause).await?;
        if signal == Signal::Abort {
            self.emit_line("Exiting program on b key press");
        }
        Ok(signal)
    }

    fn emit(&self, data: &[u8]) {
        (self.output_handler)(data);
    }

    fn emit_line(&self, text: &str) {
        self.emit(format!("{text}\n").as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ScriptedGate;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records commands and answers each with a canned output.
    #[derive(Default)]
    struct RecordingRunner {
        commands: Vec<String>,
        output: String,
    }

    impl RecordingRunner {
        fn answering(output: &str) -> Self {
            Self {
                commands: Vec::new(),
                output: output.to_string(),
            }
        }
    }

    #[async_trait(?Send)]
    impl CommandRunner for RecordingRunner {
        async fn run_command(&mut self, command: &str) -> Result<String> {
            self.commands.push(command.to_string());
            Ok(self.output.clone())
        }
    }

    struct IncompleteRunner;

    #[async_trait(?Send)]
    impl CommandRunner for IncompleteRunner {
        async fn run_command(&mut self, command: &str) -> Result<String> {
            Err(SessionError::IncompleteCommand(command.to_string()).into())
        }
    }

    struct ClosedRunner;

    #[async_trait(?Send)]
    impl CommandRunner for ClosedRunner {
        async fn run_command(&mut self, _command: &str) -> Result<String> {
            Err(SessionError::Closed.into())
        }
    }

    fn walker<R: CommandRunner>(
        blocks: Vec<Block>,
        runner: R,
        keys: &str,
    ) -> (Walker<R, ScriptedGate>, Arc<Mutex<Vec<u8>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let walker = Walker::new(blocks, runner, ScriptedGate::new(keys.chars()))
            .with_output_handler(move |data| sink.lock().unwrap().extend_from_slice(data));
        (walker, captured)
    }

    fn text(captured: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&captured.lock().unwrap()).into_owned()
    }

    #[tokio::test]
    async fn test_empty_input_completes() {
        let (mut w, out) = walker(vec![], RecordingRunner::default(), "");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert!(w.gate().pauses().is_empty());
        assert!(text(&out).is_empty());
    }

    #[tokio::test]
    async fn test_visits_every_block_in_order() {
        let blocks = vec![
            Block::heading("Intro"),
            Block::paragraph("first"),
            Block::Other("---".into()),
            Block::paragraph("second"),
            Block::heading("Next"),
            Block::paragraph("third"),
        ];
        let (mut w, out) = walker(blocks, RecordingRunner::default(), "");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert!(w.remaining().is_empty());

        let out = text(&out);
        let positions: Vec<usize> = ["Intro", "first", "second", "Next", "third"]
            .iter()
            .map(|s| out.find(s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|p| p[0] < p[1]), "{out}");
        assert!(!out.contains("---"));
    }

    #[tokio::test]
    async fn test_second_heading_pauses() {
        let blocks = vec![
            Block::heading("A"),
            Block::paragraph("text"),
            Block::heading("B"),
        ];
        let (mut w, _) = walker(blocks, RecordingRunner::default(), "");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert_eq!(w.gate().pauses(), &[Pause::SectionEnd]);
        assert_eq!(w.state(), WalkerState::AwaitingNextBlock);
    }

    #[tokio::test]
    async fn test_heading_after_code_block_is_silent() {
        let blocks = vec![
            Block::heading("A"),
            Block::code("python", "print(1)"),
            Block::paragraph("between"),
            Block::heading("B"),
        ];
        let (mut w, _) = walker(blocks, RecordingRunner::default(), "");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert_eq!(w.gate().pauses(), &[Pause::PastBlock]);
    }

    #[tokio::test]
    async fn test_non_executable_block_pauses_once() {
        let (mut w, out) = walker(
            vec![Block::code("python", "print('hi')")],
            RecordingRunner::default(),
            "",
        );
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert_eq!(w.gate().pauses(), &[Pause::PastBlock]);
        assert!(w.runner().commands.is_empty());
        assert!(text(&out).contains("```python\nprint('hi')\n```"));
    }

    #[tokio::test]
    async fn test_executable_block_pauses_around_execution() {
        let (mut w, out) = walker(
            vec![Block::code("bash", "echo 42")],
            RecordingRunner::answering("  42\n"),
            "",
        );
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert_eq!(
            w.gate().pauses(),
            &[Pause::BeforeExecute, Pause::AfterCommand]
        );
        assert_eq!(w.runner().commands, vec!["echo 42"]);
        assert_eq!(w.state(), WalkerState::PostCodeBlock);

        let out = text(&out);
        assert!(out.contains("\n42\nTime to Execute - "), "{out}");
        assert!(!out.contains("Expected Results"));
    }

    #[tokio::test]
    async fn test_extra_language_executes() {
        let (w, _) = walker(
            vec![Block::code("sh", "ls")],
            RecordingRunner::default(),
            "",
        );
        let mut w = w.with_languages(ExecutableLanguages::with_extra(["sh"]));
        w.run().await.unwrap();
        assert_eq!(w.runner().commands, vec!["ls"]);
    }

    #[tokio::test]
    async fn test_abort_at_heading_leaves_blocks() {
        let blocks = vec![
            Block::heading("A"),
            Block::paragraph("text"),
            Block::heading("B"),
            Block::paragraph("more"),
        ];
        let (mut w, out) = walker(blocks, RecordingRunner::default(), "b");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Stopped);
        assert_eq!(
            w.remaining(),
            &[Block::heading("B"), Block::paragraph("more")]
        );
        assert_eq!(w.state(), WalkerState::AwaitingHeadingConfirm);
        let out = text(&out);
        assert!(!out.contains("more"));
        assert!(out.contains("Exiting program on b key press"));
    }

    #[tokio::test]
    async fn test_abort_before_execution_runs_nothing() {
        let blocks = vec![Block::code("bash", "rm -rf build"), Block::paragraph("after")];
        let (mut w, _) = walker(blocks, RecordingRunner::default(), "b");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Aborted);
        assert!(w.runner().commands.is_empty());
        assert_eq!(w.gate().pauses(), &[Pause::BeforeExecute]);
        assert_eq!(w.remaining().len(), 2);
    }

    #[tokio::test]
    async fn test_abort_after_command() {
        let blocks = vec![Block::code("bash", "true"), Block::paragraph("after")];
        let (mut w, out) = walker(blocks, RecordingRunner::default(), "xb");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Aborted);
        assert_eq!(w.runner().commands, vec!["true"]);
        assert!(!text(&out).contains("after"));
    }

    #[tokio::test]
    async fn test_abort_past_non_executable_block() {
        let (mut w, _) = walker(
            vec![Block::code("yaml", "a: 1")],
            RecordingRunner::default(),
            "b",
        );
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_interrupted_wait_continues() {
        let blocks = vec![
            Block::heading("A"),
            Block::paragraph("p"),
            Block::heading("B"),
        ];
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let mut gate = ScriptedGate::default();
        gate.push_interrupt();
        let mut w = Walker::new(blocks, RecordingRunner::default(), gate)
            .with_output_handler(move |data| sink.lock().unwrap().extend_from_slice(data));
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert!(text(&captured).contains("B\n"));
    }

    #[tokio::test]
    async fn test_mismatch_is_reported_and_walk_continues() {
        let code = CodeBlock::new("bash", "echo hello").with_expected("goodbye", Some("0.9"));
        let blocks = vec![code.into(), Block::paragraph("after")];
        let (mut w, out) = walker(blocks, RecordingRunner::answering("hello\n"), "");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);

        let out = text(&out);
        assert!(out.contains("Expected Results - goodbye"));
        assert_eq!(out.matches("The output is NOT correct").count(), 1);
        assert!(out.contains("Expected Similarity - 0.9"));
        assert!(out.contains("after"));
    }

    #[tokio::test]
    async fn test_matching_output_is_quiet() {
        let code = CodeBlock::new("bash", "echo hi").with_expected("hi", None);
        let (mut w, out) = walker(vec![code.into()], RecordingRunner::answering("hi\n"), "");
        w.run().await.unwrap();
        assert!(!text(&out).contains("NOT correct"));
    }

    #[tokio::test]
    async fn test_default_similarity_applies_without_threshold() {
        let code = CodeBlock::new("bash", "date").with_expected("Mon Jan 1", None);
        let (w, out) = walker(vec![code.into()], RecordingRunner::answering("Tue Jan 2"), "");
        let mut w = w.with_default_similarity(0.5);
        w.run().await.unwrap();
        assert!(!text(&out).contains("NOT correct"));
    }

    #[tokio::test]
    async fn test_empty_expected_output_still_verified() {
        let code = CodeBlock::new("bash", "echo noise").with_expected("", Some("0.5"));
        let (mut w, out) = walker(vec![code.into()], RecordingRunner::answering("noise"), "");
        w.run().await.unwrap();
        assert!(text(&out).contains("NOT correct"));
    }

    #[tokio::test]
    async fn test_regex_mismatch_is_reported() {
        let code = CodeBlock::new("bash", "az version").with_regex(r"azure-cli\s+2\.");
        let blocks = vec![code.into(), Block::paragraph("after")];
        let (mut w, out) = walker(blocks, RecordingRunner::answering("command not found\n"), "");
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);

        let out = text(&out);
        assert!(!out.contains("Expected Results"), "{out}");
        assert_eq!(out.matches("The output is NOT correct").count(), 1);
        assert!(out.contains(r"Expected output to match - azure-cli\s+2\."));
        assert!(out.contains("after"));
    }

    #[tokio::test]
    async fn test_regex_match_is_quiet() {
        let code = CodeBlock::new("bash", "az version").with_regex(r"azure-cli\s+2\.");
        let runner = RecordingRunner::answering("azure-cli    2.53.0\n");
        let (mut w, out) = walker(vec![code.into()], runner, "");
        w.run().await.unwrap();
        assert!(!text(&out).contains("NOT correct"));
    }

    #[tokio::test]
    async fn test_json_output_compared_as_values() {
        let code = CodeBlock::new("bash", "cat config.json")
            .with_expected("{\"b\": [1, 2], \"a\": true}", None)
            .with_output_language("json");
        let runner = RecordingRunner::answering("{\n  \"a\": true,\n  \"b\": [1, 2]\n}\n");
        let (mut w, out) = walker(vec![code.into()], runner, "");
        w.run().await.unwrap();
        let out = text(&out);
        assert!(out.contains("Expected Results - {\"b\": [1, 2], \"a\": true}"));
        assert!(!out.contains("NOT correct"), "{out}");
    }

    #[tokio::test]
    async fn test_json_expected_but_text_printed() {
        let code = CodeBlock::new("bash", "cat config.json")
            .with_expected("{\"a\": true}", Some("0.1"))
            .with_output_language("json");
        let runner = RecordingRunner::answering("cat: config.json: No such file or directory\n");
        let (mut w, out) = walker(vec![code.into()], runner, "");
        w.run().await.unwrap();
        assert!(text(&out).contains("Output is not valid JSON"));
    }

    #[tokio::test]
    async fn test_incomplete_command_is_not_fatal() {
        let (mut w, out) = walker(
            vec![Block::code("bash", "echo 'unterminated")],
            IncompleteRunner,
            "",
        );
        assert_eq!(w.run().await.unwrap(), WalkOutcome::Completed);
        assert_eq!(
            w.gate().pauses(),
            &[Pause::BeforeExecute, Pause::AfterCommand]
        );
        assert!(text(&out).contains("Incomplete command"));
    }

    #[tokio::test]
    async fn test_closed_session_is_fatal() {
        let (mut w, _) = walker(vec![Block::code("bash", "exit")], ClosedRunner, "");
        let err = w.run().await.unwrap_err();
        assert!(format!("{err:#}").contains("closed unexpectedly"));
    }
}
