//! Format-aware segmentation of file content into fragments.
//!
//! Every format is handled by a [`Chunker`] implementation registered in a
//! [`ChunkerRegistry`] under one or more file extensions:
//!
//! - structured code (tree-sitter): one fragment per named construct,
//!   nested constructs included as their own fragments
//! - section-delimited text (Markdown headers, TOML/INI tables, YAML
//!   top-level keys): one fragment per section plus a leading sentinel
//! - anything else: one whole-file fragment
//!
//! Parse failures never escape the registry: the file is returned as a
//! single whole-file fragment instead.

mod code;
mod javascript;
mod markdown;
mod python;
mod rust;
mod sections;

pub use code::{CodeGrammar, TreeSitterChunker};
pub use javascript::{JavaScriptGrammar, TypeScriptGrammar};
pub use markdown::{MARKDOWN_PREAMBLE, MarkdownChunker};
pub use python::PythonGrammar;
pub use rust::RustGrammar;
pub use sections::{INI_PREAMBLE, SectionChunker, YAML_PREAMBLE};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::types::Fragment;

/// Errors raised by individual chunking strategies.
///
/// The registry recovers from all of them by falling back to whole-file
/// fragmentation.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Failed to load {language} grammar: {reason}")]
    Grammar { language: String, reason: String },

    #[error("Syntax error in {path}: {reason}")]
    Parse { path: String, reason: String },
}

pub type ChunkResult<T> = Result<T, ChunkError>;

/// A segmentation strategy for one format class.
pub trait Chunker: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Split `content` into ordered fragments attributed to `path`.
    ///
    /// Returning an empty list means "no structure found"; the registry then
    /// emits a whole-file fragment.
    fn chunk(&self, content: &str, path: &str) -> ChunkResult<Vec<Fragment>>;
}

/// Dispatches files to chunking strategies by extension.
#[derive(Clone, Default)]
pub struct ChunkerRegistry {
    by_extension: HashMap<String, Arc<dyn Chunker>>,
}

impl ChunkerRegistry {
    /// An empty registry: every file becomes a whole-file fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(&["py", "pyi"], TreeSitterChunker::new(PythonGrammar));
        registry.register(&["rs"], TreeSitterChunker::new(RustGrammar));
        registry.register(
            &["js", "jsx", "mjs", "cjs"],
            TreeSitterChunker::new(JavaScriptGrammar),
        );
        registry.register(&["ts", "mts", "cts"], TreeSitterChunker::new(TypeScriptGrammar::ts()));
        registry.register(&["tsx"], TreeSitterChunker::new(TypeScriptGrammar::tsx()));
        registry.register(&["md", "markdown", "mdx"], MarkdownChunker);
        registry.register(&["toml", "ini", "cfg", "conf"], SectionChunker::ini());
        registry.register(&["yaml", "yml"], SectionChunker::yaml());
        registry
    }

    /// Register `chunker` for each extension (case-insensitive, no dot).
    ///
    /// A later registration for the same extension replaces the earlier one.
    pub fn register<C: Chunker + 'static>(&mut self, extensions: &[&str], chunker: C) {
        let chunker: Arc<dyn Chunker> = Arc::new(chunker);
        for ext in extensions {
            self.by_extension
                .insert(ext.trim_start_matches('.').to_ascii_lowercase(), Arc::clone(&chunker));
        }
    }

    /// Strategy registered for the extension of `path`, if any.
    pub fn chunker_for(&self, path: &str) -> Option<&dyn Chunker> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file_name.rsplit_once('.')?;
        self.by_extension
            .get(&ext.to_ascii_lowercase())
            .map(|chunker| chunker.as_ref())
    }

    /// Segment one file.
    ///
    /// Non-empty input always yields at least one fragment. Empty input
    /// yields none.
    pub fn chunk(&self, content: &str, path: &str) -> Vec<Fragment> {
        if content.is_empty() {
            return Vec::new();
        }

        let Some(chunker) = self.chunker_for(path) else {
            return vec![Fragment::whole_file(path, content)];
        };

        match chunker.chunk(content, path) {
            Ok(fragments) if !fragments.is_empty() => {
                tracing::trace!(
                    target: "chunking",
                    "{path}: {} fragments via {}",
                    fragments.len(),
                    chunker.name()
                );
                fragments
            }
            Ok(_) => vec![Fragment::whole_file(path, content)],
            Err(e) => {
                tracing::debug!(target: "chunking", "{e}; indexing {path} as a whole file");
                vec![Fragment::whole_file(path, content)]
            }
        }
    }
}

/// Lines `start..=end` (1-indexed) of `lines`, joined with `\n`.
pub(crate) fn slice_lines(lines: &[&str], start: u32, end: u32) -> String {
    let from = (start.max(1) - 1) as usize;
    let to = (end as usize).min(lines.len());
    if from >= to {
        return String::new();
    }
    lines[from..to].join("\n")
}
