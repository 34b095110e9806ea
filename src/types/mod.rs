//! Core retrieval types shared by the chunking, vector and retrieve layers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Kind tag used for a fragment covering an entire file.
pub const WHOLE_FILE_KIND: &str = "whole-file";

/// Kind tag used for fragments produced by section-delimited formats.
pub const SECTION_KIND: &str = "section";

/// Deterministic hash of a fragment's text.
///
/// Depends on the text bytes alone, never on path or kind, so identical text
/// in two files hashes identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a piece of text (sha256, lowercase hex).
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, hashed, line-addressed unit of source text.
///
/// Lines are 1-indexed and inclusive. Fragments are created once per
/// indexing pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Path relative to the indexed root, `/` separated.
    pub path: String,
    /// Kind tag such as `FunctionDef`, `section` or `whole-file`.
    pub kind: String,
    /// Display name of the construct or section.
    pub name: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub hash: ContentHash,
}

impl Fragment {
    /// Create a fragment, hashing `text`.
    ///
    /// `end_line` is clamped so `start_line <= end_line` always holds.
    pub fn new(
        path: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        let text = text.into();
        let start_line = start_line.max(1);
        Self {
            path: path.into(),
            kind: kind.into(),
            name: name.into(),
            hash: ContentHash::of(&text),
            text,
            start_line,
            end_line: end_line.max(start_line),
        }
    }

    /// A fragment holding the whole of `content`.
    pub fn whole_file(path: &str, content: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        Self::new(
            path,
            WHOLE_FILE_KIND,
            name,
            content,
            1,
            line_count(content),
        )
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A fragment returned by a query, with its similarity in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub path: String,
    pub kind: String,
    pub name: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub score: f32,
}

impl ScoredFragment {
    pub fn new(fragment: &Fragment, score: f32) -> Self {
        Self {
            path: fragment.path.clone(),
            kind: fragment.kind.clone(),
            name: fragment.name.clone(),
            text: fragment.text.clone(),
            start_line: fragment.start_line,
            end_line: fragment.end_line,
            score,
        }
    }
}

/// Number of lines in `content`, at least 1.
///
/// A trailing newline does not open an extra line.
pub fn line_count(content: &str) -> u32 {
    let lines = content.lines().count() as u32;
    lines.max(1)
}
