//! Python constructs, tagged with the names Python's own `ast` module uses.

use tree_sitter::{Language, Node};

use super::code::{CodeGrammar, field_text};

pub const FUNCTION_DEF: &str = "FunctionDef";
pub const ASYNC_FUNCTION_DEF: &str = "AsyncFunctionDef";
pub const CLASS_DEF: &str = "ClassDef";

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonGrammar;

impl CodeGrammar for PythonGrammar {
    fn label(&self) -> &'static str {
        "python"
    }

    fn language(&self) -> Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &str) -> Option<(&'static str, String)> {
        let kind = match node.kind() {
            "function_definition" if is_async(node) => ASYNC_FUNCTION_DEF,
            "function_definition" => FUNCTION_DEF,
            "class_definition" => CLASS_DEF,
            _ => return None,
        };
        Some((kind, field_text(node, "name", source)?))
    }
}

fn is_async(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let first = node.children(&mut cursor).next();
    first.is_some_and(|child| child.kind() == "async")
}

#[cfg(test)]
mod tests {
    use crate::chunking::{Chunker, TreeSitterChunker};
    use crate::types::Fragment;

    fn chunk(source: &str) -> Vec<Fragment> {
        TreeSitterChunker::new(super::PythonGrammar)
            .chunk(source, "pkg/mod.py")
            .unwrap()
    }

    #[test]
    fn test_functions_and_nested_method() {
        let source = "\
def foo():
    return 1


def bar(x):
    return x * 2


class Bar:
    def baz(self):
        return foo()
";
        let fragments = chunk(source);
        let summary: Vec<(&str, &str)> = fragments
            .iter()
            .map(|f| (f.kind.as_str(), f.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("FunctionDef", "foo"),
                ("FunctionDef", "bar"),
                ("ClassDef", "Bar"),
                ("FunctionDef", "baz"),
            ]
        );

        let class = &fragments[2];
        assert_eq!((class.start_line, class.end_line), (9, 11));
        assert!(class.text.starts_with("class Bar:"));
        assert!(class.text.contains("def baz(self):"));

        let method = &fragments[3];
        assert_eq!((method.start_line, method.end_line), (10, 11));
        assert!(fragments.iter().all(|f| f.path == "pkg/mod.py"));
    }

    #[test]
    fn test_fragments_are_ordered_by_start_line() {
        let source = "class A:\n    def a(self):\n        pass\n\n    def b(self):\n        pass\n\ndef c():\n    pass\n";
        let fragments = chunk(source);
        let starts: Vec<u32> = fragments.iter().map(|f| f.start_line).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
        assert_eq!(fragments.len(), 4);
    }

    #[test]
    fn test_async_and_decorated() {
        let source = "\
import functools

@functools.cache
async def fetch(url):
    return url
";
        let fragments = chunk(source);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].kind, "AsyncFunctionDef");
        assert_eq!(fragments[0].name, "fetch");
        assert_eq!(fragments[0].start_line, 4);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let result = TreeSitterChunker::new(super::PythonGrammar).chunk("def broken(:\n", "x.py");
        assert!(result.is_err());
    }

    #[test]
    fn test_script_without_definitions_is_empty() {
        assert!(chunk("print('hello')\nx = 1\n").is_empty());
    }
}
