//! File selection: which files in a source tree reach the chunkers.

pub mod filter;
pub mod walker;

pub use filter::{
    DEFAULT_MAX_FILE_SIZE, EXCLUDED_DIRS, FileFilter, SourceFilter, Verdict, in_excluded_dir,
};
pub use walker::{IGNORE_FILE, SourceWalker};
