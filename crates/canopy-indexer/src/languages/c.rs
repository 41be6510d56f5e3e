//! C basic extractor (tree-sitter-c): components only, no relationships.

use canopy_core::{ComponentIdFactory, ComponentType, Language, ParsingLevel};
use tree_sitter::Node;

use crate::extractor::{new_component, node_location, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct CExtractor {
    parser_pool: ParserPool,
}

impl CExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn function_name(node: Node, source: &[u8]) -> Option<String> {
    let declarator = node.child_by_field_name("declarator")?;
    let mut cursor = declarator.walk();
    for child in declarator.children(&mut cursor) {
        if child.kind() == "function_declarator" {
            let inner = child.child_by_field_name("declarator")?;
            return inner.utf8_text(source).ok().map(str::to_string);
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
    out.components.push(new_component(id, name, kind, Language::C, path, loc, code, ParsingLevel::Basic));
}

fn visit(node: Node, source: &str, path: &str, ids: &mut ComponentIdFactory, out: &mut ExtractionResult) {
    let bytes = source.as_bytes();
    match node.kind() {
        "function_definition" => {
            if let Some(name) = function_name(node, bytes) {
                push(out, ids, path, node, &name, ComponentType::Function, bytes);
            }
        }
        "struct_specifier" | "enum_specifier" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(name) = name_node.utf8_text(bytes) {
                    let kind = if node.kind() == "struct_specifier" { ComponentType::Struct } else { ComponentType::Enum };
                    push(out, ids, path, node, name, kind, bytes);
                }
            }
        }
        "type_definition" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "type_identifier" {
                    if let Ok(name) = child.utf8_text(bytes) {
                        push(out, ids, path, node, name, ComponentType::Unknown, bytes);
                    }
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

impl LanguageExtractor for CExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, ranges: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest { language: Language::C, content: text.to_string() });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "c parser pool failure".into() });
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
    fn extracts_functions_and_structs() {
        let extractor = CExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "struct Point { int x; int y; };\n\nint add(int a, int b) {\n    return a + b;\n}\n";
        let result = extractor.extract("geo.c", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "Point" && c.r#type == ComponentType::Struct));
        assert!(result.components.iter().any(|c| c.name == "add" && c.r#type == ComponentType::Function));
    }
}
