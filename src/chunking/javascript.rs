//! JavaScript and TypeScript constructs.

use tree_sitter::{Language, Node};

use super::code::{CodeGrammar, field_text};

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptGrammar;

impl CodeGrammar for JavaScriptGrammar {
    fn label(&self) -> &'static str {
        "javascript"
    }

    fn language(&self) -> Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &str) -> Option<(&'static str, String)> {
        classify_common(node, source)
    }
}

/// TypeScript, either plain `.ts` or the TSX dialect.
#[derive(Debug, Clone, Copy)]
pub struct TypeScriptGrammar {
    tsx: bool,
}

impl TypeScriptGrammar {
    pub fn ts() -> Self {
        Self { tsx: false }
    }

    pub fn tsx() -> Self {
        Self { tsx: true }
    }
}

impl CodeGrammar for TypeScriptGrammar {
    fn label(&self) -> &'static str {
        if self.tsx { "tsx" } else { "typescript" }
    }

    fn language(&self) -> Language {
        if self.tsx {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        }
    }

    fn classify(&self, node: Node<'_>, source: &str) -> Option<(&'static str, String)> {
        match node.kind() {
            "abstract_class_declaration" => Some(("class", field_text(node, "name", source)?)),
            "interface_declaration" => Some(("interface", field_text(node, "name", source)?)),
            "type_alias_declaration" => Some(("type", field_text(node, "name", source)?)),
            "enum_declaration" => Some(("enum", field_text(node, "name", source)?)),
            "internal_module" | "module" => Some(("namespace", field_text(node, "name", source)?)),
            _ => classify_common(node, source),
        }
    }
}

fn classify_common(node: Node<'_>, source: &str) -> Option<(&'static str, String)> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            Some(("function", field_text(node, "name", source)?))
        }
        "class_declaration" => Some(("class", field_text(node, "name", source)?)),
        "method_definition" => Some(("method", field_text(node, "name", source)?)),
        // const handler = () => {} / const handler = function () {}
        "variable_declarator" => {
            let value = node.child_by_field_name("value")?;
            match value.kind() {
                "arrow_function" | "function_expression" | "function" => {
                    Some(("function", field_text(node, "name", source)?))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunker, TreeSitterChunker};

    #[test]
    fn test_javascript_constructs() {
        let source = "\
export function load(path) {
  return read(path);
}

class Cache {
  get(key) {
    return this.map[key];
  }
}

const handler = (event) => {
  return event.type;
};

const limit = 10;
";
        let fragments = TreeSitterChunker::new(JavaScriptGrammar)
            .chunk(source, "web/app.js")
            .unwrap();
        let summary: Vec<(&str, &str)> = fragments
            .iter()
            .map(|f| (f.kind.as_str(), f.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("function", "load"),
                ("class", "Cache"),
                ("method", "get"),
                ("function", "handler"),
            ]
        );
    }

    #[test]
    fn test_typescript_types() {
        let source = "\
interface User {
  id: number;
}

type Id = string | number;

enum Color { Red, Green }

export class Repo {
  find(id: Id): User | undefined {
    return undefined;
  }
}
";
        let fragments = TreeSitterChunker::new(TypeScriptGrammar::ts())
            .chunk(source, "src/repo.ts")
            .unwrap();
        let kinds: Vec<&str> = fragments.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["interface", "type", "enum", "class", "method"]);
        assert_eq!(fragments[3].name, "Repo");
    }
}
