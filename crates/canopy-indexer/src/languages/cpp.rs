//! C++ basic extractor (tree-sitter-cpp): components only, no relationships.

use canopy_core::{ComponentIdFactory, ComponentType, Language, ParsingLevel};
use tree_sitter::Node;

use crate::extractor::{new_component, node_location, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct CppExtractor {
    parser_pool: ParserPool,
}

impl CppExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn function_name(node: Node, source: &[u8]) -> Option<String> {
    let declarator = node.child_by_field_name("declarator")?;
    let mut cursor = declarator.walk();
    for child in declarator.children(&mut cursor) {
        if child.kind() == "function_declarator" {
            return child.child_by_field_name("declarator")?.utf8_text(source).ok().map(str::to_string);
        }
    }
    if declarator.kind() == "function_declarator" {
        return declarator.child_by_field_name("declarator")?.utf8_text(source).ok().map(str::to_string);
    }
    None
}

fn push(out: &mut ExtractionResult, ids: &mut ComponentIdFactory, path: &str, node: Node, name: &str, kind: ComponentType, source: &[u8]) {
    let loc = node_location(node);
    let id = ids.component_id(path, kind, name, loc.start_line, loc.start_column);
    let code = node.utf8_text(source).ok().map(str::to_string);
    out.components.push(new_component(id, name, kind, Language::Cpp, path, loc, code, ParsingLevel::Basic));
}

fn visit(node: Node, source: &str, path: &str, ids: &mut ComponentIdFactory, out: &mut ExtractionResult) {
    let bytes = source.as_bytes();
    match node.kind() {
        "function_definition" => {
            if let Some(name) = function_name(node, bytes) {
                push(out, ids, path, node, &name, ComponentType::Function, bytes);
            }
        }
        "class_specifier" | "struct_specifier" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(name) = name_node.utf8_text(bytes) {
                    let kind = if node.kind() == "class_specifier" { ComponentType::Class } else { ComponentType::Struct };
                    push(out, ids, path, node, name, kind, bytes);
                }
            }
        }
        "enum_specifier" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(name) = name_node.utf8_text(bytes) {
                    push(out, ids, path, node, name, ComponentType::Enum, bytes);
                }
            }
        }
        "namespace_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(name) = name_node.utf8_text(bytes) {
                    push(out, ids, path, node, name, ComponentType::Namespace, bytes);
                }
            }
        }
        "ERROR" => {
            out.errors.push(ParseError { message: format!("parse error near byte {}", node.start_byte()) });
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, source, path, ids, out);
    }
}

impl LanguageExtractor for CppExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, ranges: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest { language: Language::Cpp, content: text.to_string() });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "cpp parser pool failure".into() });
            return out;
        };
        visit(parsed.tree.root_node(), &parsed.content, project_relative_path, ids, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::create_parser_pool;

    #[test]
    fn extracts_classes_and_namespaces() {
        let extractor = CppExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "namespace geo {\n  class Point {\n   public:\n    int x;\n  };\n}\n";
        let result = extractor.extract("geo.cpp", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "geo" && c.r#type == ComponentType::Namespace));
        assert!(result.components.iter().any(|c| c.name == "Point" && c.r#type == ComponentType::Class));
    }
}
