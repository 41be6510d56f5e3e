//! HTML basic extractor: elements with `id`/`class` become `section`
//! components. `<script>`/`<style>` bodies and `on*="…"` handlers are carved
//! out by the block scanner (C2) before this runs, so this extractor only
//! sees markup text.

use std::sync::LazyLock;

use regex::Regex;

use canopy_core::{ComponentIdFactory, ComponentType, Language, Location, ParsingLevel};

use crate::extractor::{new_component, ExtractionResult, LanguageExtractor, ParserCapabilities};

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<(\w+)((?:\s+[\w-]+(?:="[^"]*"|='[^']*')?)*)\s*/?>"#).unwrap());
static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bid="([^"]+)""#).unwrap());
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bclass="([^"]+)""#).unwrap());

pub struct HtmlExtractor;

fn line_of(text: &str, byte_offset: usize) -> u32 {
    text[..byte_offset].matches('\n').count() as u32 + 1
}

impl LanguageExtractor for HtmlExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Basic
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities { symbols: true, ..Default::default() }
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let mut out = ExtractionResult::default();

        for caps in TAG_RE.captures_iter(text) {
            let tag = &caps[1];
            let attrs = &caps[2];
            let selector = if let Some(id_caps) = ID_RE.captures(attrs) {
                Some(format!("{tag}#{}", &id_caps[1]))
            } else {
                CLASS_RE.captures(attrs).map(|class_caps| {
                    let first_class = class_caps[1].split_whitespace().next().unwrap_or("");
                    format!("{tag}.{first_class}")
                })
            };

            if let Some(name) = selector {
                let line = line_of(text, caps.get(0).unwrap().start());
                let loc = Location { start_line: line, end_line: line, start_column: 1, end_column: 1 };
                let id = ids.component_id(project_relative_path, ComponentType::Section, &name, line, 1);
                out.components.push(new_component(id, name, ComponentType::Section, Language::Html, project_relative_path, loc, None, ParsingLevel::Basic));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_elements_with_id_or_class() {
        let mut ids = ComponentIdFactory::new();
        let html = "<div id=\"header\">\n  <span class=\"badge primary\">New</span>\n</div>\n";
        let result = HtmlExtractor.extract("index.html", html, &mut ids);
        assert!(result.components.iter().any(|c| c.name == "div#header"));
        assert!(result.components.iter().any(|c| c.name == "span.badge"));
    }
}
