//! Rust semantic extractor (tree-sitter-rust).

use canopy_core::{ComponentId, ComponentIdFactory, ComponentType, Language, ParsingLevel, RelationshipType, SymbolicId};
use tree_sitter::Node;

use crate::extractor::{
    node_location, new_component, ExtractionResult, LanguageExtractor, ParseError, ParserCapabilities,
    ProvisionalRelationship,
};
use crate::parser_pool::{ParseRequest, ParserPool};

pub struct RustExtractor {
    parser_pool: ParserPool,
}

impl RustExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

fn ident(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)?.utf8_text(source).ok().map(str::to_string)
}

fn component_for(
    node: Node,
    name: &str,
    kind: ComponentType,
    path: &str,
    source: &str,
    ids: &mut ComponentIdFactory,
) -> (ComponentId, canopy_core::Component) {
    let loc = node_location(node);
    let id = ids.component_id(path, kind, name, loc.start_line, loc.start_column);
    let code = node.utf8_text(source.as_bytes()).ok().map(str::to_string);
    (id, new_component(id, name, kind, Language::Rust, path, loc, code, ParsingLevel::Semantic))
}

fn visit(
    node: Node,
    source: &str,
    path: &str,
    ids: &mut ComponentIdFactory,
    out: &mut ExtractionResult,
    owner: Option<ComponentId>,
) {
    let bytes = source.as_bytes();
    let mut new_owner = owner;

    match node.kind() {
        "function_item" => {
            if let Some(name) = ident(node, "name", bytes) {
                let (id, component) = component_for(node, &name, ComponentType::Function, path, source, ids);
                out.components.push(component);
                if let Some(owner_id) = owner {
                    out.relationships.push(ProvisionalRelationship::new(
                        SymbolicId::Resolved(owner_id),
                        SymbolicId::Resolved(id),
                        RelationshipType::Contains,
                    ));
                }
                new_owner = Some(id);
            }
        }
        "struct_item" | "enum_item" | "trait_item" | "union_item" => {
            if let Some(name) = ident(node, "name", bytes) {
                let kind = match node.kind() {
                    "struct_item" => ComponentType::Struct,
                    "enum_item" => ComponentType::Enum,
                    "trait_item" => ComponentType::Interface,
                    _ => ComponentType::Struct,
                };
                let (id, component) = component_for(node, &name, kind, path, source, ids);
                out.components.push(component);
                if let Some(owner_id) = owner {
                    out.relationships.push(ProvisionalRelationship::new(
                        SymbolicId::Resolved(owner_id),
                        SymbolicId::Resolved(id),
                        RelationshipType::Contains,
                    ));
                }
                new_owner = Some(id);
            }
        }
        "mod_item" => {
            if let Some(name) = ident(node, "name", bytes) {
                let (id, component) = component_for(node, &name, ComponentType::Module, path, source, ids);
                out.components.push(component);
                if let Some(owner_id) = owner {
                    out.relationships.push(ProvisionalRelationship::new(
                        SymbolicId::Resolved(owner_id),
                        SymbolicId::Resolved(id),
                        RelationshipType::Contains,
                    ));
                }
                new_owner = Some(id);
            }
        }
        "impl_item" => {
            // `impl Trait for Type` → an `implements` edge once Type/Trait resolve.
            let type_name = ident(node, "type", bytes);
            let trait_name = ident(node, "trait", bytes);
            if let (Some(type_name), Some(trait_name)) = (&type_name, &trait_name) {
                out.relationships.push(ProvisionalRelationship::new(
                    SymbolicId::Symbolic(format!("CLASS:{type_name}")),
                    SymbolicId::Symbolic(format!("CLASS:{trait_name}")),
                    RelationshipType::Implements,
                ));
            }
        }
        "use_declaration" => {
            if let (Ok(text), Some(owner_id)) = (node.utf8_text(bytes), owner) {
                let specifier = text.trim_start_matches("use").trim().trim_end_matches(';').trim();
                out.relationships.push(ProvisionalRelationship::new(
                    SymbolicId::Resolved(owner_id),
                    SymbolicId::Symbolic(format!("RESOLVE:{specifier}")),
                    RelationshipType::ImportsFrom,
                ));
            }
        }
        "ERROR" => {
            out.errors.push(ParseError { message: format!("parse error near byte {}", node.start_byte()) });
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, source, path, ids, out, new_owner.or(owner));
    }
}

impl LanguageExtractor for RustExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Semantic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, relationships: true, ranges: true, types: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let parsed = self.parser_pool.parse_blocking(ParseRequest {
            language: Language::Rust,
            content: text.to_string(),
        });
        let Ok(parsed) = parsed else {
            out.errors.push(ParseError { message: "rust parser pool failure".into() });
            return out;
        };
        let root = parsed.tree.root_node();
        let file_loc = node_location(root);
        let file_id = ids.component_id(project_relative_path, ComponentType::File, project_relative_path, 1, 1);
        out.components.push(new_component(
            file_id,
            project_relative_path,
            ComponentType::File,
            Language::Rust,
            project_relative_path,
            file_loc,
            None,
            ParsingLevel::Semantic,
        ));
        visit(root, &parsed.content, project_relative_path, ids, &mut out, Some(file_id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::create_parser_pool;

    #[test]
    fn extracts_functions_structs_and_use_edges() {
        let extractor = RustExtractor::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let code = "use std::fmt;\n\nstruct Widget;\n\nfn render(w: &Widget) {\n    println!(\"{:?}\", w);\n}\n";
        let result = extractor.extract("src/widget.rs", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "Widget" && c.r#type == ComponentType::Struct));
        assert!(result.components.iter().any(|c| c.name == "render" && c.r#type == ComponentType::Function));
    }
}
