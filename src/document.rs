//! Markdown loader producing the [`Block`] sequence.
//!
//! The top-level entry points are [`parse_str`] and [`parse_file`]. Only the
//! constructs a tutorial needs are recognised:
//!
//! | Markdown | Block |
//! |----------|-------|
//! | `# Title` … `###### Title` | [`Block::Heading`] |
//! | consecutive prose lines | [`Block::Paragraph`] |
//! | ```` ```lang ```` fenced code | [`Block::Code`] |
//! | ```` ```output ```` right after a code block | expected output of that block |
//! | ```` ```output json ```` | expected output compared as JSON |
//! | `<!-- expected_similarity=0.8 -->` | similarity threshold for a code block |
//! | `<!-- expected_regex=^v\d+ -->` | pattern the output of a code block must match |
//! | other HTML comments, `---` | [`Block::Other`] |
//!
//! A directive placed after a code block (or after its output fence) applies
//! to that block. Anywhere else it applies to the next code block, unless a
//! heading or paragraph comes first. Text following `-->` on the same line is
//! ordinary prose.

use crate::block::{Block, CodeBlock};
use anyhow::{Context as _, Result};
use std::path::Path;

/// Language tag that marks a fence as the expected output of the previous block.
pub const OUTPUT_LANGUAGE: &str = "output";

const SIMILARITY_DIRECTIVE: &str = "expected_similarity=";
const REGEX_DIRECTIVE: &str = "expected_regex=";

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Unclosed code fence opened on line {line}")]
    UnclosedFence { line: usize },

    #[error("Unclosed HTML comment opened on line {line}")]
    UnclosedComment { line: usize },
}

/// Parse a markdown document from a string slice.
///
/// # Errors
///
/// Returns [`DocumentError`] if a code fence or HTML comment is never closed.
///
/// # Example
///
/// ```
/// use runbook::{Block, parse_str};
///
/// let blocks = parse_str("# Setup\n\nInstall it.\n\n```bash\necho hi\n```\n").unwrap();
/// assert_eq!(blocks.len(), 3);
/// assert_eq!(blocks[0], Block::heading("Setup"));
/// ```
pub fn parse_str(content: &str) -> Result<Vec<Block>, DocumentError> {
    let mut loader = Loader::default();
    let mut lines = content.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let line_num = idx + 1;
        let line = raw.trim();

        if line.is_empty() {
            loader.flush_paragraph();
            continue;
        }

        if let Some((fence, info)) = open_fence(line) {
            loader.flush_paragraph();
            let mut body = Vec::new();
            let mut closed = false;
            for (_, inner) in lines.by_ref() {
                if is_closing_fence(inner.trim(), fence) {
                    closed = true;
                    break;
                }
                body.push(inner);
            }
            if !closed {
                return Err(DocumentError::UnclosedFence { line: line_num });
            }
            loader.push_code(info, body.join("\n"));
            continue;
        }

        if line.starts_with(COMMENT_OPEN) {
            loader.flush_paragraph();
            let mut comment = String::new();
            let mut current = line;
            let mut from = COMMENT_OPEN.len();
            // The comment ends at the first close marker, wherever it is.
            let rest = loop {
                if let Some(pos) = current[from..].find(COMMENT_CLOSE) {
                    let end = from + pos + COMMENT_CLOSE.len();
                    comment.push_str(&current[..end]);
                    break current[end..].trim();
                }
                comment.push_str(current);
                comment.push('\n');
                let (_, next) = lines
                    .next()
                    .ok_or(DocumentError::UnclosedComment { line: line_num })?;
                current = next.trim();
                from = 0;
            };
            loader.push_comment(comment);
            if !rest.is_empty() {
                loader.paragraph.push(rest.to_string());
            }
            continue;
        }

        if let Some(text) = heading_text(line) {
            loader.flush_paragraph();
            loader.push(Block::Heading(text.to_string()));
            continue;
        }

        if is_thematic_break(line) {
            loader.flush_paragraph();
            loader.push(Block::Other(line.to_string()));
            continue;
        }

        loader.paragraph.push(line.to_string());
    }

    loader.flush_paragraph();
    Ok(loader.blocks)
}

/// Parse a markdown document from a file.
///
/// Reads the entire file into memory and delegates to [`parse_str`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Block>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    parse_str(&content).with_context(|| format!("Failed to parse document: {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Similarity,
    Regex,
}

#[derive(Default)]
struct Loader {
    blocks: Vec<Block>,
    paragraph: Vec<String>,
    /// Directives declared before any code block, waiting for the next one.
    pending_similarity: Option<String>,
    pending_regex: Option<String>,
    /// Whether the last block pushed was code, with only blank lines,
    /// its output fence or directives after it.
    after_code: bool,
}

impl Loader {
    fn push(&mut self, block: Block) {
        self.after_code = matches!(block, Block::Code(_));
        if !self.after_code {
            self.pending_similarity = None;
            self.pending_regex = None;
        }
        self.blocks.push(block);
    }

    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let text = self.paragraph.join("\n");
            self.paragraph.clear();
            self.push(Block::Paragraph(text));
        }
    }

    fn push_code(&mut self, info: &str, content: String) {
        let mut words = info.split_whitespace();
        let language = words.next().unwrap_or("");
        if language == OUTPUT_LANGUAGE {
            if let Some(code) = self.last_code() {
                if code.expected_output.is_none() {
                    code.expected_output = Some(content);
                    code.expected_output_language = words.next().map(str::to_string);
                    return;
                }
            }
        }
        let mut code = CodeBlock::new(language, content);
        code.expected_similarity = self.pending_similarity.take();
        code.expected_regex = self.pending_regex.take();
        self.push(Block::Code(code));
    }

    fn push_comment(&mut self, comment: String) {
        let Some((directive, value)) = directive(&comment) else {
            self.push(Block::Other(comment));
            return;
        };
        let value = value.to_string();
        match (directive, self.last_code()) {
            (Directive::Similarity, Some(code)) => code.expected_similarity = Some(value),
            (Directive::Regex, Some(code)) => code.expected_regex = Some(value),
            (Directive::Similarity, None) => self.pending_similarity = Some(value),
            (Directive::Regex, None) => self.pending_regex = Some(value),
        }
    }

    /// The code block directives and output fences still attach to.
    fn last_code(&mut self) -> Option<&mut CodeBlock> {
        if !self.after_code {
            return None;
        }
        match self.blocks.last_mut() {
            Some(Block::Code(code)) => Some(code),
            _ => None,
        }
    }
}

/// Recognise an opening fence, returning the fence marker and its info string.
///
/// A backtick fence whose info string contains a backtick is inline code,
/// not a fence.
fn open_fence(line: &str) -> Option<(&str, &str)> {
    let fence = ["```", "~~~"]
        .into_iter()
        .find(|fence| line.starts_with(*fence))?;
    let ch = fence.chars().next()?;
    let marker_len = line.len() - line.trim_start_matches(ch).len();
    let info = line[marker_len..].trim();
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some((&line[..marker_len], info))
}

fn is_closing_fence(line: &str, fence: &str) -> bool {
    let Some(ch) = fence.chars().next() else {
        return false;
    };
    line.len() >= fence.len() && line.chars().all(|c| c == ch)
}

fn heading_text(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim_end())
}

fn is_thematic_break(line: &str) -> bool {
    ['-', '*', '_'].into_iter().any(|ch| {
        let marks = line.chars().filter(|&c| c == ch).count();
        marks >= 3 && line.chars().all(|c| c == ch || c == ' ')
    })
}

/// Recognise `<!-- expected_similarity=0.8 -->` and `<!-- expected_regex=... -->`.
fn directive(comment: &str) -> Option<(Directive, &str)> {
    let inner = comment
        .strip_prefix(COMMENT_OPEN)?
        .strip_suffix(COMMENT_CLOSE)?
        .trim();
    let (directive, value) = if let Some(value) = inner.strip_prefix(SIMILARITY_DIRECTIVE) {
        (Directive::Similarity, value)
    } else {
        (Directive::Regex, inner.strip_prefix(REGEX_DIRECTIVE)?)
    };
    Some((directive, unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
