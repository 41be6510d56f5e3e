//! Fallback extractor: emits a single `file` component and nothing else.
//!
//! Used by the registry (C3) when no parser exists for a language, or every
//! registered parser for a block failed.

use canopy_core::{ComponentIdFactory, ComponentType, Language, Location, ParsingLevel};

use crate::extractor::{new_component, ExtractionResult, LanguageExtractor, ParserCapabilities};

pub struct GenericExtractor;

impl LanguageExtractor for GenericExtractor {
    fn parsing_level(&self) -> ParsingLevel {
        ParsingLevel::Initial
    }

    fn capabilities(&self) -> ParserCapabilities {
        ParserCapabilities::default()
    }

    fn extract(&self, project_relative_path: &str, text: &str, ids: &mut ComponentIdFactory) -> ExtractionResult {
        let line_count = text.lines().count().max(1) as u32;
        let loc = Location { start_line: 1, end_line: line_count, start_column: 1, end_column: 1 };
        let id = ids.component_id(project_relative_path, ComponentType::File, project_relative_path, 1, 1);
        let component = new_component(
            id,
            project_relative_path,
            ComponentType::File,
            Language::PlainText,
            project_relative_path,
            loc,
            None,
            ParsingLevel::Initial,
        );
        ExtractionResult { components: vec![component], ..Default::default() }
    }
}
