//! TypeScript semantic extractor (tree-sitter-typescript).
//!
//! Shares its visitor shape with [`super::javascript`]; kept as a separate
//! parser because `tree-sitter-typescript` is a distinct grammar (adds
//! `interface_declaration`, type annotations) from `tree-sitter-javascript`.

use canopy_core::{ComponentIdFactory, ComponentType, Language, ParsingLevel, RelationshipType, SymbolicId};
use tree_sitter::Node;

use crate::extractor::{
    new_component, node_location, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities,
    ProvisionalRelationship,
};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct TypeScriptExtractor {
    parser_pool: ParserPool,
}

impl TypeScriptExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn name_of(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")?.utf8_text(source).ok().map(str::to_string)
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
            if let Some(name) = name_of(node, bytes) {
                let kind = if node.kind() == "method_definition" { ComponentType::Method } else { ComponentType::Function };
                let loc = node_location(node);
                let id = ids.component_id(path, kind, &name, loc.start_line, loc.start_column);
                let code = node.utf8_text(bytes).ok().map(str::to_string);
                out.components.push(new_component(id, name, kind, Language::TypeScript, path, loc, code, ParsingLevel::Semantic));
            }
        }
        "class_declaration" => {
            if let Some(name) = name_of(node, bytes) {
                let loc = node_location(node);
                let id = ids.component_id(path, ComponentType::Class, &name, loc.start_line, loc.start_column);
                let code = node.utf8_text(bytes).ok().map(str::to_string);
                out.components.push(new_component(id, name.clone(), ComponentType::Class, Language::TypeScript, path, loc, code, ParsingLevel::Semantic));

                if let Some(heritage) = node.child_by_field_name("heritage") {
                    if let Ok(text) = heritage.utf8_text(bytes) {
                        if let Some(rest) = text.strip_prefix("extends ") {
                            let base = rest.split_whitespace().next().unwrap_or(rest).trim_end_matches(',');
                            out.relationships.push(ProvisionalRelationship::new(
                                SymbolicId::Resolved(id),
                                SymbolicId::Symbolic(format!("CLASS:{base}")),
                                RelationshipType::Extends,
                            ));
                        }
                        if text.contains("implements ") {
                            if let Some(rest) = text.split("implements ").nth(1) {
                                for iface in rest.split(',') {
                                    let iface = iface.trim();
                                    if !iface.is_empty() {
                                        out.relationships.push(ProvisionalRelationship::new(
                                            SymbolicId::Resolved(id),
                                            SymbolicId::Symbolic(format!("CLASS:{iface}")),
                                            RelationshipType::Implements,
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        "interface_declaration" => {
            if let Some(name) = name_of(node, bytes) {
                let loc = node_location(node);
                let id = ids.component_id(path, ComponentType::Interface, &name, loc.start_line, loc.start_column);
                let code = node.utf8_text(bytes).ok().map(str::to_string);
                out.components.push(new_component(id, name, ComponentType::Interface, Language::TypeScript, path, loc, code, ParsingLevel::Semantic));
            }
        }
        "import_statement" => {
            if let Some(specifier) = import_specifier(node, bytes) {
                let import_kind = if node.utf8_text(bytes).map(|t| t.contains('{')).unwrap_or(false) {
                    "named"
                } else if node.utf8_text(bytes).map(|t| t.contains('*')).unwrap_or(false) {
                    "namespace"
                } else if node.child_by_field_name("source").is_some()
                    && node.named_child(0).map(|c| c.kind() == "import_clause").unwrap_or(false)
                {
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

impl LanguageExtractor for TypeScriptExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Semantic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, relationships: true, ranges: true, types: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest {
            language: Language::TypeScript,
            content: text.to_string(),
        });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "typescript parser pool failure".into() });
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
    fn extracts_classes_interfaces_and_imports() {
        let extractor = TypeScriptExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "import { Widget } from './widget';\n\ninterface Renderer {}\n\nclass View implements Renderer {\n  render() {}\n}\n";
        let result = extractor.extract("src/view.ts", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "View" && c.r#type == ComponentType::Class));
        assert!(result.components.iter().any(|c| c.name == "Renderer" && c.r#type == ComponentType::Interface));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::ImportsFrom));
    }
}
