//! JavaScript semantic extractor (tree-sitter-javascript).

use canopy_core::{ComponentIdFactory, ComponentType, Language, ParsingLevel, RelationshipType, SymbolicId};
use tree_sitter::Node;

use crate::extractor::{
    new_component, node_location, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities,
    ProvisionalRelationship,
};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct JavaScriptExtractor {
    parser_pool: ParserPool,
}

impl JavaScriptExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn identifier_child(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" || child.kind() == "property_identifier" {
            return child.utf8_text(source).ok().map(str::to_string);
        }
    }
    None
}

fn import_specifier(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "string" {
            return child.utf8_text(source).ok().map(|s| s.trim_matches(['"', '\'']).to_string());
        }
    }
    None
}

fn visit(node: Node, source: &str, path: &str, ids: &mut ComponentIdFactory, out: &mut ExtractionResult) {
    let bytes = source.as_bytes();
    match node.kind() {
        "function_declaration" | "method_definition" => {
            if let Some(name) = identifier_child(node, bytes) {
                let kind = if node.kind() == "method_definition" { ComponentType::Method } else { ComponentType::Function };
                let loc = node_location(node);
                let id = ids.component_id(path, kind, &name, loc.start_line, loc.start_column);
                let code = node.utf8_text(bytes).ok().map(str::to_string);
                out.components.push(new_component(id, name, kind, Language::JavaScript, path, loc, code, ParsingLevel::Semantic));
            }
        }
        "class_declaration" => {
            if let Some(name) = identifier_child(node, bytes) {
                let loc = node_location(node);
                let id = ids.component_id(path, ComponentType::Class, &name, loc.start_line, loc.start_column);
                let code = node.utf8_text(bytes).ok().map(str::to_string);
                out.components.push(new_component(id, name, ComponentType::Class, Language::JavaScript, path, loc, code, ParsingLevel::Semantic));

                if let Some(heritage) = node.child_by_field_name("superclass") {
                    if let Ok(base) = heritage.utf8_text(bytes) {
                        out.relationships.push(ProvisionalRelationship::new(
                            SymbolicId::Resolved(id),
                            SymbolicId::Symbolic(format!("CLASS:{base}")),
                            RelationshipType::Extends,
                        ));
                    }
                }
            }
        }
        "import_statement" => {
            if let Some(specifier) = import_specifier(node, bytes) {
                let text = node.utf8_text(bytes).unwrap_or_default();
                let import_kind = if text.contains('*') {
                    "namespace"
                } else if text.contains('{') {
                    "named"
                } else if text.contains("import ") && text.contains(" from ") {
                    "default"
                } else {
                    "side_effect"
                };
                let mut rel = ProvisionalRelationship::new(
                    SymbolicId::Symbolic(format!("FILE:{path}")),
                    SymbolicId::Symbolic(format!("RESOLVE:{specifier}")),
                    RelationshipType::ImportsFrom,
                );
                rel.import_kind = Some(import_kind.to_string());
                out.relationships.push(rel);
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

impl LanguageExtractor for JavaScriptExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Semantic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, relationships: true, ranges: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest {
            language: Language::JavaScript,
            content: text.to_string(),
        });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "javascript parser pool failure".into() });
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
    fn extracts_classes_functions_and_imports() {
        let extractor = JavaScriptExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "import React from 'react';\n\nclass User {\n  constructor(name) {\n    this.name = name;\n  }\n  getName() {\n    return this.name;\n  }\n}\n\nfunction createUser(name) {\n  return new User(name);\n}\n";
        let result = extractor.extract("src/user.js", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "User" && c.r#type == ComponentType::Class));
        assert!(result.components.iter().any(|c| c.name == "createUser" && c.r#type == ComponentType::Function));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::ImportsFrom));
    }
}
