//! Eligibility rules for files entering the index.
//!
//! A file is indexed only if it is not inside a tool/VCS/build directory,
//! does not look like it holds secrets, is not generated output, and is a
//! reasonably sized text file.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Default upper bound on indexed file size (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Bytes inspected for binary and secret content.
const SNIFF_LEN: usize = 8 * 1024;

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".quarry",
    ".venv",
    "venv",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    ".tox",
    ".next",
    ".cache",
];

/// Lockfiles and other machine-written files.
const GENERATED_FILES: &[&str] = &[
    "Cargo.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "poetry.lock",
    "uv.lock",
    "Pipfile.lock",
    "composer.lock",
    "vectors.idx",
    "vectors.meta.json",
];

static SECRET_NAME: OnceLock<Regex> = OnceLock::new();
static SECRET_CONTENT: OnceLock<Regex> = OnceLock::new();

fn secret_name() -> &'static Regex {
    SECRET_NAME.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:\.env(?:\..+)?|.*\.(?:pem|key|p12|pfx|jks|keystore|kdbx|secret)|id_(?:rsa|dsa|ecdsa|ed25519)(?:\.pub)?|\.?netrc|\.pgpass|credentials(?:\..+)?|secrets?\.(?:json|ya?ml|toml|env))$",
        )
        .expect("valid regex")
    })
}

fn secret_content() -> &'static Regex {
    SECRET_CONTENT.get_or_init(|| {
        Regex::new(
            r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----|\bAKIA[0-9A-Z]{16}\b|\bgh[pousr]_[A-Za-z0-9]{36,}\b|\bxox[abprs]-[A-Za-z0-9-]{10,}",
        )
        .expect("valid regex")
    })
}

/// Boolean eligibility predicate over file paths.
pub trait FileFilter: Send + Sync {
    fn accepts(&self, path: &Path) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn accepts(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Outcome of checking one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    ExcludedDir,
    Hidden,
    Secret,
    Generated,
    Oversized,
    Binary,
    Unreadable,
}

/// The default rule set.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    max_file_size: u64,
    include_hidden: bool,
    generated_roots: Vec<PathBuf>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            include_hidden: false,
            generated_roots: Vec::new(),
        }
    }
}

impl SourceFilter {
    pub fn new(max_file_size: u64, include_hidden: bool) -> Self {
        Self {
            max_file_size,
            include_hidden,
            generated_roots: Vec::new(),
        }
    }

    /// Treat everything under `dir` as generated output (index, caches).
    pub fn exclude_generated(mut self, dir: impl AsRef<Path>) -> Self {
        self.generated_roots.push(absolutize(dir.as_ref()));
        self
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    /// Whether a directory with this name should be pruned from a walk.
    pub fn skips_dir(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if EXCLUDED_DIRS.contains(&name) {
            return true;
        }
        if !self.include_hidden && name.starts_with('.') && name.len() > 1 {
            return true;
        }
        self.is_generated_path(path)
    }

    /// Check one file.
    ///
    /// Directory components are only inspected for relative paths; for
    /// absolute paths the walker has already pruned excluded directories
    /// and the components above the project root are not ours to judge.
    pub fn classify(&self, path: &Path) -> Verdict {
        if path.is_relative() && in_excluded_dir(path) {
            return Verdict::ExcludedDir;
        }

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if secret_name().is_match(name) {
            return Verdict::Secret;
        }
        if !self.include_hidden && name.starts_with('.') {
            return Verdict::Hidden;
        }
        if GENERATED_FILES.contains(&name)
            || name.ends_with(".min.js")
            || name.ends_with(".min.css")
            || name.ends_with(".map")
            || self.is_generated_path(path)
        {
            return Verdict::Generated;
        }

        let size = match path.metadata() {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Verdict::Unreadable,
        };
        if size > self.max_file_size {
            return Verdict::Oversized;
        }

        let mut head = Vec::with_capacity(SNIFF_LEN);
        let read = File::open(path)
            .and_then(|file| file.take(SNIFF_LEN as u64).read_to_end(&mut head));
        if read.is_err() {
            return Verdict::Unreadable;
        }
        if head.contains(&0) {
            return Verdict::Binary;
        }
        if secret_content().is_match(&String::from_utf8_lossy(&head)) {
            return Verdict::Secret;
        }
        Verdict::Accept
    }

    fn is_generated_path(&self, path: &Path) -> bool {
        if self.generated_roots.is_empty() {
            return false;
        }
        let path = absolutize(path);
        self.generated_roots.iter().any(|root| path.starts_with(root))
    }
}

impl FileFilter for SourceFilter {
    fn accepts(&self, path: &Path) -> bool {
        let verdict = self.classify(path);
        if verdict != Verdict::Accept {
            tracing::trace!(target: "indexing", "Skipping {} ({verdict:?})", path.display());
        }
        verdict == Verdict::Accept
    }
}

/// Whether any directory component of `path` is in [`EXCLUDED_DIRS`].
pub fn in_excluded_dir(path: &Path) -> bool {
    let parent = path.parent().unwrap_or(Path::new(""));
    parent.components().any(|c| match c {
        Component::Normal(part) => part
            .to_str()
            .is_some_and(|part| EXCLUDED_DIRS.contains(&part)),
        _ => false,
    })
}

/// Canonical form when the path exists, otherwise made absolute.
fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
