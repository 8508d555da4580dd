//! Output collaborators of a build: the display sink and the status sink.

use crate::diagnostics::DiagnosticPatterns;
use std::path::PathBuf;

/// Display configuration handed to a sink before a build starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplaySettings {
    pub file_regex: Option<String>,
    pub line_regex: Option<String>,
    /// Directory relative diagnostic paths are resolved against.
    pub base_dir: Option<PathBuf>,
    pub word_wrap: bool,
}

/// Receives the text of a build as it is produced.
pub trait DisplaySink {
    /// Apply display settings for the next build.
    fn configure(&mut self, _settings: &DisplaySettings) {}

    /// Append `text`. `force` writes even into a read-only view;
    /// `scroll_to_end` keeps the newest output visible.
    fn append(&mut self, text: &str, force: bool, scroll_to_end: bool);

    /// Number of diagnostic results in everything displayed so far.
    fn count_matches(&self, patterns: &DiagnosticPatterns) -> usize;
}

/// Receives short notifications (the status bar of an editor).
pub trait StatusSink {
    fn status(&mut self, message: &str);
}

/// In-memory display sink.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    text: String,
    settings: DisplaySettings,
    appends: usize,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.text
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// Number of `append` calls received.
    pub fn append_count(&self) -> usize {
        self.appends
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.appends = 0;
    }
}

impl DisplaySink for BufferSink {
    fn configure(&mut self, settings: &DisplaySettings) {
        self.settings = settings.clone();
    }

    fn append(&mut self, text: &str, _force: bool, _scroll_to_end: bool) {
        self.text.push_str(text);
        self.appends += 1;
    }

    fn count_matches(&self, patterns: &DiagnosticPatterns) -> usize {
        patterns.count_in(&self.text)
    }
}

/// Status sink that keeps every message.
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    messages: Vec<String>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn last(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }
}

impl StatusSink for StatusLog {
    fn status(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn configure(&mut self, settings: &DisplaySettings) {
        (**self).configure(settings);
    }

    fn append(&mut self, text: &str, force: bool, scroll_to_end: bool) {
        (**self).append(text, force, scroll_to_end);
    }

    fn count_matches(&self, patterns: &DiagnosticPatterns) -> usize {
        (**self).count_matches(patterns)
    }
}

impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    fn status(&mut self, message: &str) {
        (**self).status(message);
    }
}
