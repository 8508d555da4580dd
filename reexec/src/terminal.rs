//! Terminal sinks: build output on stdout, status lines on stderr.

use colored::Colorize;
use reexec_common::{DiagnosticPatterns, DisplaySettings, DisplaySink, StatusSink};
use std::io::{self, Write};
use tracing::warn;

/// Streams build output to a writer and keeps a copy for result counting.
pub struct TerminalSink<W> {
    out: W,
    text: String,
    settings: DisplaySettings,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            text: String::new(),
            settings: DisplaySettings::default(),
        }
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// End the output with a newline if the build left the cursor mid-line.
    pub fn finish_line(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.append("\n", true, true);
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for TerminalSink<W> {
    fn configure(&mut self, settings: &DisplaySettings) {
        self.settings = settings.clone();
    }

    fn append(&mut self, text: &str, _force: bool, scroll_to_end: bool) {
        self.text.push_str(text);
        let written = self.out.write_all(text.as_bytes()).and_then(|()| {
            if scroll_to_end {
                self.out.flush()
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            warn!(error = %err, "failed to write build output");
        }
    }

    fn count_matches(&self, patterns: &DiagnosticPatterns) -> usize {
        patterns.count_in(&self.text)
    }
}

/// Writes status messages as colored `reexec:` lines.
pub struct TerminalStatus<W> {
    out: W,
}

impl TerminalStatus<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TerminalStatus<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusSink for TerminalStatus<W> {
    fn status(&mut self, message: &str) {
        let message = if message.starts_with("Build finished with") {
            message.yellow()
        } else if message == "Build finished" {
            message.green()
        } else {
            message.cyan()
        };
        if let Err(err) = writeln!(self.out, "{} {}", "reexec:".bold(), message) {
            warn!(error = %err, "failed to write status");
        }
    }
}
