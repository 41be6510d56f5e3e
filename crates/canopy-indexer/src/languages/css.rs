//! CSS basic extractor: one component per selector group.

use std::sync::LazyLock;

use regex::Regex;

use canopy_core::{ComponentIdFactory, ComponentType, Language, Location, ParsingLevel};

use crate::extractor::{new_component, ExtractionResult, LanguageExtractor, ParserCapabilities};

static RULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*([^{}\n]+)\{").unwrap());

pub struct CssExtractor;

fn line_of(text: &str, byte_offset: usize) -> u32 {
    text[..byte_offset].matches('\n').count() as u32 + 1
}

impl LanguageExtractor for CssExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();

        for caps in RULE_RE.captures_iter(text) {
            let selector = caps[1].trim();
            if selector.is_empty() || selector.starts_with('@') {
                continue;
            }
            let line = line_of(text, caps.get(0).unwrap().start());
            let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
            let id = ids.component_id(project_relative_path, ComponentType::Section, selector, line, 1);
            out.components.push(new_component(id, selector, ComponentType::Section, Language::Css, project_relative_path, loc, None, ParsingLevel::Basic));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_one_component_per_selector_group() {
        let mut ids = ComponentIdFactory::new();
        let css = ".badge {\n  color: red;\n}\n\n#header, .nav {\n  display: flex;\n}\n";
        let result = CssExtractor.extract("app.css", css, &mut ids);
        assert!(result.components.iter().any(|c| c.name == ".badge"));
        assert!(result.components.iter().any(|c| c.name == "#header, .nav"));
    }
}
