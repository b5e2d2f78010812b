//! The [`Block`] sequence a [`Walker`](crate::Walker) plays through.

use std::collections::BTreeSet;

/// Language tags that are executed against the shell session by default.
pub const DEFAULT_EXECUTABLE_LANGUAGES: &[&str] =
    &["bash", "terraform", "azurecli", "azurecli-interactive"];

/// One unit of a parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(String),
    Paragraph(String),
    Code(CodeBlock),
    /// A construct the loader recognised but that is never shown, such as a
    /// thematic break or an HTML comment that is not a directive.
    Other(String),
}

impl Block {
    /// Short name of the block kind, used in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Heading(_) => "heading",
            Block::Paragraph(_) => "paragraph",
            Block::Code(_) => "code",
            Block::Other(_) => "other",
        }
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Block::Heading(text.into())
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph(text.into())
    }

    pub fn code(language: impl Into<String>, content: impl Into<String>) -> Self {
        Block::Code(CodeBlock::new(language, content))
    }
}

/// A fenced code block, optionally carrying the output it is expected to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
    pub expected_output: Option<String>,
    /// Required similarity between observed and expected output, kept as the
    /// raw text it was declared with.
    pub expected_similarity: Option<String>,
    /// Pattern the observed output must match. Takes priority over similarity.
    pub expected_regex: Option<String>,
    /// Language tag of the expected output fence, e.g. `json`.
    pub expected_output_language: Option<String>,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            content: content.into(),
            expected_output: None,
            expected_similarity: None,
            expected_regex: None,
            expected_output_language: None,
        }
    }

    /// Attach an expected output and, optionally, the similarity it must reach.
    pub fn with_expected(mut self, output: impl Into<String>, similarity: Option<&str>) -> Self {
        self.expected_output = Some(output.into());
        self.expected_similarity = similarity.map(str::to_string);
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>) -> Self {
        self.expected_regex = Some(pattern.into());
        self
    }

    pub fn with_output_language(mut self, language: impl Into<String>) -> Self {
        self.expected_output_language = Some(language.into());
        self
    }

    /// Whether the observed output of this block is checked at all.
    pub fn has_expectation(&self) -> bool {
        self.expected_output.is_some() || self.expected_regex.is_some()
    }
}

impl From<CodeBlock> for Block {
    fn from(code: CodeBlock) -> Self {
        Block::Code(code)
    }
}

/// The set of language tags whose code blocks are run in the shell session.
#[derive(Debug, Clone)]
pub struct ExecutableLanguages(BTreeSet<String>);

impl ExecutableLanguages {
    /// Add extra tags on top of [`DEFAULT_EXECUTABLE_LANGUAGES`].
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        set.0.extend(extra.into_iter().map(Into::into));
        set
    }

    pub fn contains(&self, language: &str) -> bool {
        self.0.contains(language)
    }
}

impl Default for ExecutableLanguages {
    fn default() -> Self {
        Self(
            DEFAULT_EXECUTABLE_LANGUAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}
