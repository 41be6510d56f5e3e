//! Java basic extractor (tree-sitter-java): components only, no relationships.

use canopy_core::{ComponentIdFactory, ComponentType, Language, ParsingLevel};
use tree_sitter::Node;

use crate::extractor::{new_component, node_location, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct JavaExtractor {
    parser_pool: ParserPool,
}

impl JavaExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn visit(node: Node, source: &str, path: &str, ids: &mut ComponentIdFactory, out: &mut ExtractionResult) {
    let bytes = source.as_bytes();
    let kind = match node.kind() {
        "class_declaration" => Some(ComponentType::Class),
        "interface_declaration" => Some(ComponentType::Interface),
        "enum_declaration" => Some(ComponentType::Enum),
        "method_declaration" | "constructor_declaration" => Some(ComponentType::Method),
        _ => None,
    };

    if let Some(kind) = kind {
        if let Some(name_node) = node.child_by_field_name("name") {
            if let Ok(name) = name_node.utf8_text(bytes) {
                let loc = node_location(node);
                let id = ids.component_id(path, kind, name, loc.start_line, loc.start_column);
                let code = node.utf8_text(bytes).ok().map(str::to_string);
                out.components.push(new_component(id, name, kind, Language::Java, path, loc, code, ParsingLevel::Basic));
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, source, path, ids, out);
    }
}

impl LanguageExtractor for JavaExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, ranges: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest { language: Language::Java, content: text.to_string() });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "java parser pool failure".into() });
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
    fn extracts_classes_and_methods() {
        let extractor = JavaExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "class Greeter {\n    void greet() {}\n}\n";
        let result = extractor.extract("Greeter.java", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "Greeter" && c.r#type == ComponentType::Class));
        assert!(result.components.iter().any(|c| c.name == "greet" && c.r#type == ComponentType::Method));
    }
}
