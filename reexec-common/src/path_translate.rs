//! Foreign-to-local path translation for diagnostic output.
//!
//! Remote tools report paths relative to their own checkout (for example
//! `proj/src/main.c` or `/srv/build/proj/src/main.c`). Translation aligns
//! the components of such a path against a local anchor directory and
//! re-roots the non-shared tail onto the anchor, producing a path that can
//! be opened locally.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static DRIVE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w):").expect("drive letter pattern is valid"));

/// Separator and root syntax of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathConvention {
    /// `/`-separated, rooted at `/`.
    Posix,
    /// `\`-separated (also accepts `/`), optionally rooted at a drive.
    Windows,
}

impl PathConvention {
    /// Convention of the paths of the running platform.
    pub const fn native() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    /// Preferred separator.
    pub const fn separator(self) -> char {
        match self {
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }

    fn is_separator(self, c: char) -> bool {
        match self {
            Self::Posix => c == '/',
            Self::Windows => c == '\\' || c == '/',
        }
    }

    /// Split a path into its root (if any) followed by its named components.
    ///
    /// A single trailing separator is ignored and empty components are
    /// dropped, so `/a//b/` splits to `["/", "a", "b"]`.
    pub fn split(self, path: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut rest = path;

        match self {
            Self::Posix => {
                if rest.starts_with('/') {
                    parts.push("/".to_string());
                    rest = rest.trim_start_matches('/');
                }
            }
            Self::Windows => {
                let bytes = rest.as_bytes();
                if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
                    let drive = &rest[..2];
                    let after = &rest[2..];
                    if after.starts_with(|c| self.is_separator(c)) {
                        parts.push(format!("{drive}{}", self.separator()));
                    } else {
                        parts.push(drive.to_string());
                    }
                    rest = after.trim_start_matches(|c| self.is_separator(c));
                } else if rest.starts_with(|c| self.is_separator(c)) {
                    parts.push(self.separator().to_string());
                    rest = rest.trim_start_matches(|c| self.is_separator(c));
                }
            }
        }

        parts.extend(
            rest.split(|c| self.is_separator(c))
                .filter(|component| !component.is_empty())
                .map(str::to_string),
        );
        parts
    }

    /// Join `components` onto `base` with this convention's separator.
    pub fn join<S: AsRef<str>>(self, base: &str, components: &[S]) -> String {
        let mut joined = base.to_string();
        for component in components {
            if !joined.is_empty() && !joined.ends_with(|c| self.is_separator(c)) {
                joined.push(self.separator());
            }
            joined.push_str(component.as_ref());
        }
        joined
    }
}

/// One entry of a component-level diff between a foreign path and an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentDiff {
    /// Component present in both, aligned.
    Same(String),
    /// Component only present in the foreign path.
    ForeignOnly(String),
    /// Component only present in the local anchor.
    AnchorOnly(String),
}

/// Minimal edit alignment (longest common subsequence) of two component lists.
pub fn diff_components(foreign: &[String], anchor: &[String]) -> Vec<ComponentDiff> {
    let n = foreign.len();
    let m = anchor.len();
    // lcs[i][j] = LCS length of foreign[i..] and anchor[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if foreign[i] == anchor[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut diff = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if foreign[i] == anchor[j] {
            diff.push(ComponentDiff::Same(foreign[i].clone()));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            diff.push(ComponentDiff::ForeignOnly(foreign[i].clone()));
            i += 1;
        } else {
            diff.push(ComponentDiff::AnchorOnly(anchor[j].clone()));
            j += 1;
        }
    }
    diff.extend(foreign[i..].iter().cloned().map(ComponentDiff::ForeignOnly));
    diff.extend(anchor[j..].iter().cloned().map(ComponentDiff::AnchorOnly));
    diff
}

/// Translate `foreign_path` (in `foreign`) to the `local` convention,
/// re-rooting it onto `local_anchor`.
///
/// If the aligned diff ends on a shared component the foreign path denotes
/// the anchor itself and the anchor is returned unchanged. Otherwise the
/// foreign-only components after the last shared one are joined onto the
/// anchor.
pub fn translate(
    foreign_path: &str,
    foreign: PathConvention,
    local_anchor: &str,
    local: PathConvention,
) -> String {
    let diff = diff_components(&foreign.split(foreign_path), &local.split(local_anchor));

    match diff.last() {
        None | Some(ComponentDiff::Same(_)) => return local_anchor.to_string(),
        Some(_) => {}
    }

    let mut tail = Vec::new();
    for entry in diff.iter().rev() {
        match entry {
            ComponentDiff::Same(_) => break,
            ComponentDiff::ForeignOnly(component) => tail.push(component.as_str()),
            ComponentDiff::AnchorOnly(_) => {}
        }
    }
    tail.reverse();

    local.join(local_anchor, &tail)
}

/// Translate a POSIX path reported by a remote tool onto a native anchor.
pub fn translate_to_native(foreign_path: &str, anchor: &Path) -> PathBuf {
    let anchor = anchor.to_string_lossy();
    PathBuf::from(translate(
        foreign_path,
        PathConvention::Posix,
        &anchor,
        PathConvention::native(),
    ))
}

/// Rewrite a Windows path (`c:\path\to\dir`) into the cygwin form
/// (`/cygdrive/c/path/to/dir`) expected by cygwin builds of rsync and ssh.
pub fn to_cygwin_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    DRIVE_LETTER.replace_all(&forward, "/cygdrive/$1").into_owned()
}
