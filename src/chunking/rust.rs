//! Rust constructs.

use tree_sitter::{Language, Node};

use super::code::{CodeGrammar, field_text};

#[derive(Debug, Default, Clone, Copy)]
pub struct RustGrammar;

impl CodeGrammar for RustGrammar {
    fn label(&self) -> &'static str {
        "rust"
    }

    fn language(&self) -> Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &str) -> Option<(&'static str, String)> {
        match node.kind() {
            "function_item" | "function_signature_item" => {
                Some(("fn", field_text(node, "name", source)?))
            }
            "struct_item" => Some(("struct", field_text(node, "name", source)?)),
            "enum_item" => Some(("enum", field_text(node, "name", source)?)),
            "union_item" => Some(("union", field_text(node, "name", source)?)),
            "trait_item" => Some(("trait", field_text(node, "name", source)?)),
            "type_item" => Some(("type", field_text(node, "name", source)?)),
            "macro_definition" => Some(("macro", field_text(node, "name", source)?)),
            // `mod foo;` only declares a file, the body lives elsewhere
            "mod_item" if node.child_by_field_name("body").is_some() => {
                Some(("mod", field_text(node, "name", source)?))
            }
            "impl_item" => {
                let ty = field_text(node, "type", source)?;
                let name = match field_text(node, "trait", source) {
                    Some(tr) => format!("{tr} for {ty}"),
                    None => ty,
                };
                Some(("impl", name))
            }
            _ => None,
        }
    }
}
