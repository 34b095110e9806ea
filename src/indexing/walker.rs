//! File system walker for discovering files to index
//!
//! Traversal honours `.gitignore` (also outside git repositories), a
//! `.quarryignore` file, and the configured ignore patterns. Every file
//! yielded has passed the [`SourceFilter`].

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;

use super::filter::{FileFilter, SourceFilter};
use crate::config::IndexingConfig;

/// Per-directory ignore file understood in addition to `.gitignore`.
pub const IGNORE_FILE: &str = ".quarryignore";

/// Walks directories to find files eligible for indexing
#[derive(Debug, Clone)]
pub struct SourceWalker {
    filter: SourceFilter,
    ignore_patterns: Vec<String>,
}

impl SourceWalker {
    pub fn new(filter: SourceFilter, ignore_patterns: Vec<String>) -> Self {
        Self {
            filter,
            ignore_patterns,
        }
    }

    pub fn from_config(config: &IndexingConfig) -> Self {
        Self::new(
            SourceFilter::new(config.max_file_size, config.include_hidden),
            config.ignore_patterns.clone(),
        )
    }

    /// Also skip everything under `dir`.
    pub fn exclude_generated(mut self, dir: impl AsRef<Path>) -> Self {
        self.filter = self.filter.exclude_generated(dir);
        self
    }

    pub fn filter(&self) -> &SourceFilter {
        &self.filter
    }

    /// Eligible files under `root`, sorted by path.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);

        builder
            .hidden(!self.filter.include_hidden())
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE);

        let mut overrides = OverrideBuilder::new(root);
        for pattern in &self.ignore_patterns {
            // "!" turns an override into an exclusion
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                tracing::warn!(target: "indexing", "Invalid ignore pattern '{pattern}': {e}");
            }
        }
        match overrides.build() {
            Ok(overrides) => {
                builder.overrides(overrides);
            }
            Err(e) => tracing::warn!(target: "indexing", "Ignoring ignore patterns: {e}"),
        }

        let filter = self.filter.clone();
        builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            entry.depth() == 0 || !is_dir || !filter.skips_dir(entry.path())
        });

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!(target: "indexing", "Walk error: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| self.filter.accepts(path))
            .collect();
        files.sort();

        tracing::debug!(
            target: "indexing",
            "Found {} eligible files under {}",
            files.len(),
            root.display()
        );
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn walker() -> SourceWalker {
        SourceWalker::from_config(&IndexingConfig::default())
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_walk_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("test.py"), "def test(): pass").unwrap();
        fs::write(root.join("README.md"), "# Test").unwrap();

        let files = walker().walk(root);
        assert_eq!(names(&files, root), vec!["README.md", "src/main.rs", "test.py"]);
    }

    #[test]
    fn test_gitignore_respected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        // works without git init due to require_git(false)
        fs::write(root.join(".gitignore"), "ignored.rs\n").unwrap();
        fs::write(root.join("ignored.rs"), "fn ignored() {}").unwrap();
        fs::write(root.join("included.rs"), "fn included() {}").unwrap();

        let files = walker().walk(root);
        assert_eq!(names(&files, root), vec!["included.rs"]);
    }

    #[test]
    fn test_excluded_and_hidden_dirs_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        for dir in ["node_modules/pkg", "target/debug", ".quarry/index", ".github"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join("target/debug/out.rs"), "x").unwrap();
        fs::write(root.join(".quarry/index/vectors.meta.json"), "{}").unwrap();
        fs::write(root.join(".github/ci.yml"), "on: push").unwrap();
        fs::write(root.join("lib.rs"), "pub fn lib() {}").unwrap();

        let files = walker().walk(root);
        assert_eq!(names(&files, root), vec!["lib.rs"]);
    }

    #[test]
    fn test_ignore_patterns_and_secrets() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("fixtures")).unwrap();
        fs::write(root.join("fixtures/data.json"), "{}").unwrap();
        fs::write(root.join("server.pem"), "cert").unwrap();
        fs::write(root.join("app.py"), "import os").unwrap();

        let config = IndexingConfig {
            ignore_patterns: vec!["fixtures/**".to_string()],
            ..IndexingConfig::default()
        };
        let files = SourceWalker::from_config(&config).walk(root);
        assert_eq!(names(&files, root), vec!["app.py"]);
    }

    #[test]
    fn test_generated_dir_excluded() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("out")).unwrap();
        fs::write(root.join("out/summary.md"), "# generated").unwrap();
        fs::write(root.join("notes.md"), "# notes").unwrap();

        let files = walker().exclude_generated(root.join("out")).walk(root);
        assert_eq!(names(&files, root), vec!["notes.md"]);
    }
}
