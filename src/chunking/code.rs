//! Generic tree-sitter chunker for structured code.

use tree_sitter::{Language, Node, Parser};

use super::{ChunkError, ChunkResult, Chunker, slice_lines};
use crate::types::Fragment;

/// Deep syntax trees (generated code, minified bundles) are cut off here.
const MAX_AST_DEPTH: usize = 256;

/// Language-specific knowledge plugged into [`TreeSitterChunker`].
pub trait CodeGrammar: Send + Sync {
    /// Label used in logs and errors.
    fn label(&self) -> &'static str;

    /// The tree-sitter language to parse with.
    fn language(&self) -> Language;

    /// Classify a node as a named construct.
    ///
    /// Returns the fragment kind and display name, or `None` when the node
    /// does not start a fragment. Children are visited either way.
    fn classify(&self, node: Node<'_>, source: &str) -> Option<(&'static str, String)>;
}

/// Chunks code into one fragment per named construct, nested ones included.
pub struct TreeSitterChunker<G> {
    grammar: G,
}

impl<G: CodeGrammar> TreeSitterChunker<G> {
    pub fn new(grammar: G) -> Self {
        Self { grammar }
    }

    fn parser(&self) -> ChunkResult<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar.language())
            .map_err(|e| ChunkError::Grammar {
                language: self.grammar.label().to_string(),
                reason: e.to_string(),
            })?;
        Ok(parser)
    }

    fn collect(
        &self,
        node: Node<'_>,
        source: &str,
        lines: &[&str],
        path: &str,
        depth: usize,
        out: &mut Vec<Fragment>,
    ) {
        if depth > MAX_AST_DEPTH {
            tracing::debug!(
                target: "chunking",
                "{path}: syntax tree deeper than {MAX_AST_DEPTH}, skipping nested constructs"
            );
            return;
        }

        if let Some((kind, name)) = self.grammar.classify(node, source) {
            let (start_line, end_line) = node_lines(node);
            out.push(Fragment::new(
                path,
                kind,
                name,
                slice_lines(lines, start_line, end_line),
                start_line,
                end_line,
            ));
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.collect(child, source, lines, path, depth + 1, out);
        }
    }
}

impl<G: CodeGrammar> Chunker for TreeSitterChunker<G> {
    fn name(&self) -> &'static str {
        self.grammar.label()
    }

    fn chunk(&self, content: &str, path: &str) -> ChunkResult<Vec<Fragment>> {
        let mut parser = self.parser()?;
        let tree = parser.parse(content, None).ok_or_else(|| ChunkError::Parse {
            path: path.to_string(),
            reason: "parser produced no tree".to_string(),
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error(root)
                .map(|n| format!("line {}", n.start_position().row + 1))
                .unwrap_or_else(|| "unknown position".to_string());
            return Err(ChunkError::Parse {
                path: path.to_string(),
                reason: format!("{} syntax error at {position}", self.grammar.label()),
            });
        }

        let lines: Vec<&str> = content.lines().collect();
        let mut fragments = Vec::new();
        self.collect(root, content, &lines, path, 0, &mut fragments);
        Ok(fragments)
    }
}

/// 1-indexed inclusive line span of a node.
///
/// A node ending at column 0 of a later row does not own that row.
fn node_lines(node: Node<'_>) -> (u32, u32) {
    let start = node.start_position();
    let end = node.end_position();
    let start_line = start.row as u32 + 1;
    let mut end_line = end.row as u32 + 1;
    if end.column == 0 && end.row > start.row {
        end_line -= 1;
    }
    (start_line, end_line)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// Text of the `field` child of `node`.
pub(super) fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| child.utf8_text(source.as_bytes()).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
