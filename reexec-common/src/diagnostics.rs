//! Diagnostic-line matching and path rewriting.
//!
//! A diagnostic pattern (the `file_regex` of a build) identifies compiler or
//! tool lines that embed a file path in its first capture group. Those
//! lines are rewritten so the path points into the local checkout.

use crate::path_translate::{PathConvention, translate};
use regex::Regex;

/// Compiled `file_regex` / `line_regex` pair.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticPatterns {
    /// Matched at the start of a line; group 1 is the file path.
    file: Option<Regex>,
    file_anchored: Option<Regex>,
    line: Option<Regex>,
}

impl DiagnosticPatterns {
    /// Compile the patterns. Empty strings count as absent.
    pub fn new(file_regex: Option<&str>, line_regex: Option<&str>) -> Result<Self, regex::Error> {
        let file_regex = file_regex.filter(|p| !p.is_empty());
        let line_regex = line_regex.filter(|p| !p.is_empty());
        Ok(Self {
            file: file_regex.map(Regex::new).transpose()?,
            file_anchored: file_regex
                .map(|p| Regex::new(&format!("^(?:{p})")))
                .transpose()?,
            line: line_regex.map(Regex::new).transpose()?,
        })
    }

    pub fn has_file_pattern(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.line.is_none()
    }

    /// Number of lines in `text` that either pattern finds a result in.
    pub fn count_in(&self, text: &str) -> usize {
        if self.is_empty() {
            return 0;
        }
        text.lines()
            .filter(|line| {
                self.file.as_ref().is_some_and(|re| re.is_match(line))
                    || self.line.as_ref().is_some_and(|re| re.is_match(line))
            })
            .count()
    }

    /// Rewrite the captured path of every line that matches the file
    /// pattern at its start. Returns `None` when no line changed.
    pub fn rewrite_paths(
        &self,
        text: &str,
        anchor: &str,
        foreign: PathConvention,
        local: PathConvention,
    ) -> Option<String> {
        let re = self.file_anchored.as_ref()?;
        let mut changed = false;
        let mut out = String::with_capacity(text.len());

        for line in text.split_inclusive('\n') {
            // `$` in the pattern must see the end of the line, not the newline.
            let body = line.strip_suffix('\n').unwrap_or(line);
            let Some(path) = re.captures(body).and_then(|caps| caps.get(1)) else {
                out.push_str(line);
                continue;
            };
            let local_path = translate(path.as_str(), foreign, anchor, local);
            out.push_str(&line[..path.start()]);
            out.push_str(&local_path);
            out.push_str(&line[path.end()..]);
            changed = true;
        }

        changed.then_some(out)
    }
}
