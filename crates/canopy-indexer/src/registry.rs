//! Parser Registry (C3): dispatches a block to the best available parser at
//! a parsing level, with a structural/basic fallback chain and a
//! `languageStack` cycle guard.

use std::sync::Arc;

use canopy_core::{ComponentIdFactory, Language};

use crate::extractor::{ExtractionResult, LanguageExtractor, ParseWarning};
use crate::languages::{extractors_for, generic::GenericExtractor};
use crate::parser_pool::ParserPool;

/// Re-entrance is bounded (max depth 4, per §4.3) and cycles — the same
/// language appearing twice on the active stack — are rejected outright.
pub const MAX_LANGUAGE_STACK_DEPTH: usize = 4;

pub struct ParserRegistry {
    parser_pool: ParserPool,
}

impl ParserRegistry {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }

    /// Tries the highest-level registered parser for `language`; if none are
    /// registered, or every one fails, falls back to [`GenericExtractor`] and
    /// records a warning.
    pub fn parse_block(
        &self,
        language: Language,
        language_stack: &[Language],
        project_relative_path: &str,
        text: &str,
        ids: &mut ComponentIdFactory,
    ) -> ExtractionResult {
        if language_stack.len() >= MAX_LANGUAGE_STACK_DEPTH || language_stack.contains(&language) {
            let mut result = ExtractionResult::default();
            result.warnings.push(ParseWarning {
                message: format!("rejected re-entrant block for {language:?}: stack depth/cycle guard"),
            });
            return result;
        }

        let candidates = extractors_for(language, &self.parser_pool);
        for extractor in &candidates {
            let mut result = extractor.extract(project_relative_path, text, ids);
            if result.errors.is_empty() {
                result.parsing_level = extractor.parsing_level();
                return result;
            }
        }

        // All registered parsers for this language failed (or none exist):
        // emit a file-level component and a warning rather than losing the
        // file entirely.
        let mut result = GenericExtractor.extract(project_relative_path, text, ids);
        result.parsing_level = GenericExtractor.parsing_level();
        result.warnings.push(ParseWarning {
            message: format!("no parser succeeded for {language:?}; emitted file-level component"),
        });
        result
    }

    pub fn capabilities_for(&self, language: Language) -> Vec<crate::extractor::ParserCapabilities> {
        extractors_for(language, &self.parser_pool).iter().map(|e: &Arc<dyn LanguageExtractor>| e.capabilities()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::create_parser_pool;

    #[test]
    fn falls_back_to_generic_for_unregistered_languages() {
        let registry = ParserRegistry::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let result = registry.parse_block(Language::Yaml, &[], "config.yaml", "key: value\n", &mut ids);
        assert_eq!(result.components.len(), 1);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn rejects_cycles_in_the_language_stack() {
        let registry = ParserRegistry::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let stack = vec![Language::Html, Language::JavaScript];
        let result = registry.parse_block(Language::JavaScript, &stack, "index.html", "console.log(1)", &mut ids);
        assert!(result.components.is_empty());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn dispatches_real_parsers_when_available() {
        let registry = ParserRegistry::new(create_parser_pool(Some(1)));
        let mut ids = ComponentIdFactory::new();
        let result = registry.parse_block(Language::Rust, &[], "src/lib.rs", "fn run() {}", &mut ids);
        assert!(result.components.iter().any(|c| c.name == "run"));
    }
}
