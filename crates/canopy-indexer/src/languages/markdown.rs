//! Markdown basic extractor: headings become `section` components with a
//! parent chain by level, fenced code blocks become `embedded_script`
//! (`generic`) components delegated downstream, and relative link targets
//! emit `references_file`.

use std::sync::LazyLock;

use regex::Regex;

use canopy_core::{ComponentIdFactory, ComponentType, Language, Location, ParsingLevel, RelationshipType, SymbolicId};

use crate::extractor::{new_component, ExtractionResult, LanguageExtractor, ParserCapabilities, ProvisionalRelationship};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+?)\s*$").unwrap());
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^```(\w+)?\s*$").unwrap());
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"!?\[[^\]]*\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).unwrap());

pub struct MarkdownExtractor;

fn line_of(text: &str, byte_offset: usize) -> u32 {
    text[..byte_offset].matches('\n').count() as u32 + 1
}

fn is_relative_target(target: &str) -> bool {
    !target.starts_with("http://") && !target.starts_with("https://") && !target.starts_with('#') && !target.starts_with("mailto:")
}

impl LanguageExtractor for MarkdownExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, relationships: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();
        let mut parent_stack: Vec<(u8, canopy_core::ComponentId)> = Vec::new();

        for caps in HEADING_RE.captures_iter(text) {
            let level = caps[1].len() as u8;
            let title = caps[2].trim();
            let line = line_of(text, caps.get(0).unwrap().start());
            let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
            let id = ids.component_id(project_relative_path, ComponentType::Section, title, line, 1);
            out.components.push(new_component(id, title, ComponentType::Section, Language::Markdown, project_relative_path, loc, None, ParsingLevel::Basic));

            parent_stack.retain(|(parent_level, _)| *parent_level < level);
            if let Some((_, parent_id)) = parent_stack.last() {
                out.relationships.push(ProvisionalRelationship::new(
                    SymbolicId::Resolved(*parent_id),
                    SymbolicId::Resolved(id),
                    RelationshipType::Contains,
                ));
            }
            parent_stack.push((level, id));
        }

        for caps in FENCE_RE.captures_iter(text) {
            let fence_lang = caps.get(1).map(|m| m.as_str()).unwrap_or("text");
            let line = line_of(text, caps.get(0).unwrap().start());
            let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
            let name = format!("fence:{fence_lang}@{line}");
            let id = ids.component_id(project_relative_path, ComponentType::Generic, &name, line, 1);
            out.components.push(new_component(id, name, ComponentType::Generic, Language::Markdown, project_relative_path, loc, None, ParsingLevel::Basic));
        }

        for caps in LINK_RE.captures_iter(text) {
            let target = &caps[1];
            if is_relative_target(target) {
                out.relationships.push(ProvisionalRelationship::new(
                    SymbolicId::Symbolic(format!("FILE:{project_relative_path}")),
                    SymbolicId::Symbolic(format!("FILE:{target}")),
                    RelationshipType::ReferencesFile,
                ));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_heading_hierarchy_and_link_edges() {
        let mut ids = ComponentIdFactory::new();
        let text = "# Guide\n\n## Setup\n\nSee [config](./config.md) for details.\n\n```rust\nfn main() {}\n```\n";
        let result = MarkdownExtractor.extract("docs/guide.md", text, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "Guide"));
        assert!(result.components.iter().any(|c| c.name == "Setup"));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::Contains));
        assert!(result.relationships.iter().any(|r| r.r#type == RelationshipType::ReferencesFile));
    }
}
