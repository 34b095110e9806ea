//! Key-based configuration sections: TOML/INI tables and YAML top-level keys.

use std::sync::OnceLock;

use regex::Regex;

use super::{ChunkResult, Chunker, slice_lines};
use crate::types::{Fragment, SECTION_KIND};

/// Name of the TOML/INI section before the first table header.
pub const INI_PREAMBLE: &str = "preamble";

/// Name of the YAML section before the first top-level key.
pub const YAML_PREAMBLE: &str = "header";

static INI_HEADER: OnceLock<Regex> = OnceLock::new();
static YAML_KEY: OnceLock<Regex> = OnceLock::new();

fn ini_header() -> &'static Regex {
    INI_HEADER.get_or_init(|| {
        Regex::new(r"^\s*\[\[?\s*([^\[\]]+?)\s*\]\]?\s*(?:[#;].*)?$").expect("valid regex")
    })
}

fn yaml_key() -> &'static Regex {
    YAML_KEY.get_or_init(|| {
        Regex::new(
            r#"^(?:"([^"]+)"|'([^']+)'|([A-Za-z0-9_][^:#\s]*(?:[ \t]+[^:#\s]+)*))[ \t]*:(?:\s|$)"#,
        )
        .expect("valid regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Ini,
    Yaml,
}

/// Line-delimited section chunker.
#[derive(Debug, Clone, Copy)]
pub struct SectionChunker {
    dialect: Dialect,
}

impl SectionChunker {
    /// `[table]` / `[[array]]` headers (TOML, INI, .cfg).
    pub fn ini() -> Self {
        Self { dialect: Dialect::Ini }
    }

    /// Unindented `key:` lines (YAML).
    pub fn yaml() -> Self {
        Self { dialect: Dialect::Yaml }
    }

    fn preamble(&self) -> &'static str {
        match self.dialect {
            Dialect::Ini => INI_PREAMBLE,
            Dialect::Yaml => YAML_PREAMBLE,
        }
    }

    fn delimiter(&self, line: &str) -> Option<String> {
        match self.dialect {
            Dialect::Ini => ini_header()
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            Dialect::Yaml => {
                if line.starts_with(['-', '#', ' ', '\t']) {
                    return None;
                }
                let caps = yaml_key().captures(line)?;
                (1..=3)
                    .find_map(|i| caps.get(i))
                    .map(|m| m.as_str().to_string())
            }
        }
    }
}

impl Chunker for SectionChunker {
    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Ini => "ini",
            Dialect::Yaml => "yaml",
        }
    }

    fn chunk(&self, content: &str, path: &str) -> ChunkResult<Vec<Fragment>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut fragments = Vec::new();
        let mut current_name = self.preamble().to_string();
        let mut current_start: u32 = 1;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if let Some(name) = self.delimiter(line) {
                fragments.push(section(path, &current_name, &lines, current_start, line_no - 1));
                current_name = name;
                current_start = line_no;
            }
        }
        fragments.push(section(
            path,
            &current_name,
            &lines,
            current_start,
            lines.len() as u32,
        ));
        Ok(fragments)
    }
}

fn section(path: &str, name: &str, lines: &[&str], start: u32, end: u32) -> Fragment {
    if end < start {
        return Fragment::new(path, SECTION_KIND, name, "", start, start);
    }
    Fragment::new(path, SECTION_KIND, name, slice_lines(lines, start, end), start, end)
}
