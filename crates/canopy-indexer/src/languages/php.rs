//! PHP basic extractor: regex token scanner, no tree-sitter grammar in the stack.
//!
//! Operates on the PHP block text the block scanner (C2) carves out of a
//! `<?php ... ?>` region; `self::extract` is always called with PHP-only text.

use std::sync::LazyLock;

use regex::Regex;

use canopy_core::{ComponentIdFactory, ComponentType, Language, Location, ParsingLevel, RelationshipType, SymbolicId};

use crate::extractor::{new_component, ExtractionResult, LanguageExtractor, ParserCapabilities, ProvisionalRelationship};

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(?:abstract\s+|final\s+)?class\s+(\w+)").unwrap());
static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*interface\s+(\w+)").unwrap());
static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:public\s+|private\s+|protected\s+|static\s+)*function\s+(\w+)\s*\(").unwrap());
static USE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*use\s+([\w\\]+)(?:\s+as\s+\w+)?\s*;").unwrap());
static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*namespace\s+([\w\\]+)\s*;").unwrap());

pub struct PhpExtractor;

fn line_of(text: &str, byte_offset: usize) -> u32 {
    text[..byte_offset].matches('\n').count() as u32 + 1
}

impl LanguageExtractor for PhpExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, relationships: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();

        for caps in CLASS_RE.captures_iter(text) {
            let name = &caps[1];
            let line = line_of(text, caps.get(0).unwrap().start());
            let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
            let id = ids.component_id(project_relative_path, ComponentType::Class, name, line, 1);
            out.components.push(new_component(id, name, ComponentType::Class, Language::Php, project_relative_path, loc, None, ParsingLevel::Basic));
        }

        for caps in INTERFACE_RE.captures_iter(text) {
            let name = &caps[1];
            let line = line_of(text, caps.get(0).unwrap().start());
            let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
            let id = ids.component_id(project_relative_path, ComponentType::Interface, name, line, 1);
            out.components.push(new_component(id, name, ComponentType::Interface, Language::Php, project_relative_path, loc, None, ParsingLevel::Basic));
        }

        for caps in FUNCTION_RE.captures_iter(text) {
            let name = &caps[1];
            let line = line_of(text, caps.get(0).unwrap().start());
            let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
            let id = ids.component_id(project_relative_path, ComponentType::Function, name, line, 1);
            out.components.push(new_component(id, name, ComponentType::Function, Language::Php, project_relative_path, loc, None, ParsingLevel::Basic));
        }

        for caps in USE_RE.captures_iter(text) {
            let namespace = &caps[1];
            out.relationships.push(ProvisionalRelationship::new(
                SymbolicId::Symbolic(format!("FILE:{project_relative_path}")),
                SymbolicId::Symbolic(format!("MODULE:{namespace}")),
                RelationshipType::InNamespace,
            ));
            out.relationships.push(ProvisionalRelationship::new(
                SymbolicId::Symbolic(format!("FILE:{project_relative_path}")),
                SymbolicId::Symbolic(format!("RESOLVE:{namespace}")),
                RelationshipType::ImportsFrom,
            ));
        }

        if let Some(caps) = NAMESPACE_RE.captures(text) {
            let namespace = &caps[1];
            out.relationships.push(ProvisionalRelationship::new(
                SymbolicId::Symbolic(format!("FILE:{project_relative_path}")),
                SymbolicId::Symbolic(format!("MODULE:{namespace}")),
                RelationshipType::InNamespace,
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_classes_and_use_statements() {
        let mut ids = ComponentIdFactory::new();
        let code = "<?php\nnamespace App\\Http;\n\nuse App\\Models\\User;\n\nclass Controller {\n    public function index() {}\n}\n";
        let result = PhpExtractor.extract("app/Http/Controller.php", code, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "Controller" && c.r#type == ComponentType::Class));
        assert!(result.components.iter().any(|c| c.name == "index" && c.r#type == ComponentType::Function));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::InNamespace));
    }
}
