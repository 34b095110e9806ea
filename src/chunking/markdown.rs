//! Markdown sections delimited by ATX headers.

use super::{ChunkResult, Chunker, slice_lines};
use crate::types::{Fragment, SECTION_KIND};

/// Name of the section holding content before the first header.
pub const MARKDOWN_PREAMBLE: &str = "Introduction";

/// Splits Markdown at each `#`..`######` header line.
///
/// Header lines inside fenced code blocks are ignored, so a `# comment` in a
/// shell snippet does not open a section. Setext headers (`===` underlines)
/// are treated as ordinary content.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownChunker;

impl Chunker for MarkdownChunker {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn chunk(&self, content: &str, path: &str) -> ChunkResult<Vec<Fragment>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut fragments = Vec::new();

        let mut fence: Option<(char, usize)> = None;
        let mut current_name = MARKDOWN_PREAMBLE.to_string();
        let mut current_start: u32 = 1;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx as u32 + 1;

            if let Some(marker) = fence_marker(line) {
                match fence {
                    None => {
                        fence = Some((marker.ch, marker.len));
                        continue;
                    }
                    // only a bare marker run closes
                    Some((ch, len)) if marker.bare && marker.ch == ch && marker.len >= len => {
                        fence = None;
                        continue;
                    }
                    Some(_) => {}
                }
            }
            if fence.is_some() {
                continue;
            }

            if let Some(title) = atx_heading(line) {
                fragments.push(section(path, &current_name, &lines, current_start, line_no - 1));
                current_name = title;
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

/// A section covering lines `start..=end`.
///
/// An empty span (preamble of a file starting with a header) becomes an
/// empty-text fragment anchored at `start`.
fn section(path: &str, name: &str, lines: &[&str], start: u32, end: u32) -> Fragment {
    if end < start {
        return Fragment::new(path, SECTION_KIND, name, "", start, start);
    }
    Fragment::new(path, SECTION_KIND, name, slice_lines(lines, start, end), start, end)
}

/// Title of an ATX header line, if `line` is one.
fn atx_heading(line: &str) -> Option<String> {
    // up to three spaces of indentation are allowed
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let trimmed = &line[indent..];
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    let title = rest.trim();
    // closing sequence: "## Title ##"
    let title = match title.trim_end_matches('#') {
        stripped if stripped.is_empty() || stripped.ends_with([' ', '\t']) => stripped.trim_end(),
        _ => title,
    };
    Some(title.to_string())
}

struct FenceMarker {
    ch: char,
    len: usize,
    /// Nothing but whitespace follows the run.
    bare: bool,
}

/// A line starting with three or more backticks or tildes.
fn fence_marker(line: &str) -> Option<FenceMarker> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == ch).count();
    if len < 3 {
        return None;
    }
    let bare = trimmed[len..].trim().is_empty();
    Some(FenceMarker { ch, len, bare })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str) -> Vec<Fragment> {
        MarkdownChunker.chunk(source, "docs/guide.md").unwrap()
    }

    #[test]
    fn test_headers_split_sections() {
        let fragments = chunk("# H1\nfirst body\n## H2\nsecond body\n");
        let names: Vec<&str> = fragments.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Introduction", "H1", "H2"]);

        assert!(fragments[0].is_blank());
        assert_eq!(fragments[1].text, "# H1\nfirst body");
        assert_eq!((fragments[1].start_line, fragments[1].end_line), (1, 2));
        assert_eq!(fragments[2].text, "## H2\nsecond body");
        assert_eq!((fragments[2].start_line, fragments[2].end_line), (3, 4));
        assert!(fragments.iter().all(|f| f.kind == SECTION_KIND));
    }

    #[test]
    fn test_preamble_keeps_leading_content() {
        let fragments = chunk("Some intro text.\n\n# Usage\nRun it.\n");
        assert_eq!(fragments[0].name, MARKDOWN_PREAMBLE);
        assert_eq!(fragments[0].text, "Some intro text.\n");
        assert_eq!((fragments[0].start_line, fragments[0].end_line), (1, 2));
        assert_eq!(fragments[1].name, "Usage");
    }

    #[test]
    fn test_fenced_hash_is_not_a_header() {
        let source = "# Install\n```sh\n# not a header\nmake\n```\n# Next\n";
        let names: Vec<String> = chunk(source).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Introduction", "Install", "Next"]);
    }

    #[test]
    fn test_fence_with_info_string_does_not_close() {
        let source = "# Notes\n```\n```rust\n# still code\n```\n## After\n";
        let fragments = chunk(source);
        let names: Vec<&str> = fragments.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Introduction", "Notes", "After"]);
        assert_eq!((fragments[1].start_line, fragments[1].end_line), (1, 5));
    }

    #[test]
    fn test_longer_fence_needs_longer_close() {
        let source = "````md\n```\n# inside\n````\n# Outside\n";
        let names: Vec<String> = chunk(source).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Introduction", "Outside"]);
    }

    #[test]
    fn test_no_headers_single_preamble() {
        let fragments = chunk("just text\nmore text");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].name, MARKDOWN_PREAMBLE);
        assert_eq!(fragments[0].end_line, 2);
    }

    #[test]
    fn test_heading_parsing() {
        assert_eq!(atx_heading("## Title ##").as_deref(), Some("Title"));
        assert_eq!(atx_heading("#Title"), None);
        assert_eq!(atx_heading("####### seven"), None);
        assert_eq!(atx_heading("    # indented code"), None);
        assert_eq!(atx_heading("#").as_deref(), Some(""));
        assert_eq!(atx_heading("# C#").as_deref(), Some("C#"));
    }
}
