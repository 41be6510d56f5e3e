//! Python semantic extractor (tree-sitter-python).

use canopy_core::{ComponentId, ComponentIdFactory, ComponentType, Language, ParsingLevel, RelationshipType, SymbolicId};
use tree_sitter::Node;

use crate::extractor::{
    new_component, node_location, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities,
    ProvisionalRelationship,
};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct PythonExtractor {
    parser_pool: ParserPool,
}

impl PythonExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn decorators_of(node: Node, source: &[u8]) -> Vec<String> {
    let mut decorators = Vec::new();
    if let Some(parent) = node.parent() {
        if parent.kind() == "decorated_definition" {
            let mut cursor = parent.walk();
            for child in parent.children(&mut cursor) {
                if child.kind() == "decorator" {
                    if let Ok(text) = child.utf8_text(source) {
                        decorators.push(text.trim_start_matches('@').trim().to_string());
                    }
                }
            }
        }
    }
    decorators
}

fn visit(
    node: Node,
    source: &str,
    path: &str,
    ids: &mut ComponentIdFactory,
    out: &mut ExtractionResult,
    in_class: Option<(ComponentId, String)>,
) {
    let bytes = source.as_bytes();
    let mut nested_class = in_class.clone();

    match node.kind() {
        "function_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(name) = name_node.utf8_text(bytes) {
                    let kind = if in_class.is_some() { ComponentType::Method } else { ComponentType::Function };
                    let loc = node_location(node);
                    let id = ids.component_id(path, kind, name, loc.start_line, loc.start_column);
                    let code = node.utf8_text(bytes).ok().map(str::to_string);
                    out.components.push(new_component(id, name, kind, Language::Python, path, loc, code, ParsingLevel::Semantic));

                    if let Some((class_id, _)) = &in_class {
                        out.relationships.push(ProvisionalRelationship::new(
                            SymbolicId::Resolved(*class_id),
                            SymbolicId::Resolved(id),
                            RelationshipType::Contains,
                        ));
                    }

                    for decorator in decorators_of(node, bytes) {
                        out.relationships.push(ProvisionalRelationship::new(
                            SymbolicId::Resolved(id),
                            SymbolicId::Symbolic(format!("RESOLVE:{decorator}")),
                            RelationshipType::Uses,
                        ));
                    }
                }
            }
        }
        "class_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(name) = name_node.utf8_text(bytes) {
                    let loc = node_location(node);
                    let id = ids.component_id(path, ComponentType::Class, name, loc.start_line, loc.start_column);
                    let code = node.utf8_text(bytes).ok().map(str::to_string);
                    out.components.push(new_component(id, name, ComponentType::Class, Language::Python, path, loc, code, ParsingLevel::Semantic));

                    if let Some(superclasses) = node.child_by_field_name("superclasses") {
                        if let Ok(text) = superclasses.utf8_text(bytes) {
                            for base in text.trim_matches(['(', ')']).split(',') {
                                let base = base.trim();
                                if !base.is_empty() && base != "object" {
                                    out.relationships.push(ProvisionalRelationship::new(
                                        SymbolicId::Resolved(id),
                                        SymbolicId::Symbolic(format!("CLASS:{base}")),
                                        RelationshipType::Extends,
                                    ));
                                }
                            }
                        }
                    }

                    nested_class = Some((id, name.to_string()));
                }
            }
        }
        "import_statement" => {
            if let Ok(text) = node.utf8_text(bytes) {
                let module = text.trim_start_matches("import").trim();
                out.relationships.push(ProvisionalRelationship::new(
                    SymbolicId::Symbolic(format!("FILE:{path}")),
                    SymbolicId::Symbolic(format!("RESOLVE:{module}")),
                    RelationshipType::ImportsFrom,
                ));
            }
        }
        "import_from_statement" => {
            if let Some(module_node) = node.child_by_field_name("module_name") {
                if let Ok(module) = module_node.utf8_text(bytes) {
                    let module_path = module.replace('.', "/") + ".py";
                    out.relationships.push(ProvisionalRelationship::new(
                        SymbolicId::Symbolic(format!("FILE:{path}")),
                        SymbolicId::Symbolic(format!("FILE:{module_path}")),
                        RelationshipType::ReferencesFile,
                    ));

                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        if child.kind() == "dotted_name" && child != module_node {
                            if let Ok(name) = child.utf8_text(bytes) {
                                out.relationships.push(ProvisionalRelationship::new(
                                    SymbolicId::Symbolic(format!("FILE:{path}")),
                                    SymbolicId::Symbolic(format!("RESOLVE:{module}.{name}")),
                                    RelationshipType::References,
                                ));
                            }
                        }
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
        visit(child, source, path, ids, out, nested_class.clone());
    }
}

impl LanguageExtractor for PythonExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Semantic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, relationships: true, ranges: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest {
            language: Language::Python,
            content: text.to_string(),
        });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "python parser pool failure".into() });
            return out;
        };
        visit(parsed.tree.root_node(), &parsed.content, project_relative_path, ids, &mut out, None);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::create_parser_pool;

    #[test]
    fn extracts_classes_methods_and_from_import_edges() {
        let extractor = PythonExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "from app.models import User\n\nclass Service:\n    def handle(self):\n        return User()\n";
        let result = extractor.extract("app/service.py", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "Service" && c.r#type == ComponentType::Class));
        assert!(result.components.iter().any(|c| c.name == "handle" && c.r#type == ComponentType::Method));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::ReferencesFile));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::References));
    }
}
