//! Language extractors (C4), one module per grammar/heuristic family.

pub mod c;
pub mod cpp;
pub mod css;
pub mod generic;
pub mod go;
pub mod html;
pub mod java;
pub mod javascript;
pub mod markdown;
pub mod php;
pub mod python;
pub mod rust;
pub mod typescript;

use std::sync::Arc;

use canopy_core::Language;

use crate::extractor::LanguageExtractor;
use crate::parser_pool::ParserPool;

/// A parser keyed by `(language, parsingLevel)`; see [`crate::registry`] for
/// the fallback-chain dispatch built on top of this table.
pub fn extractors_for(language: Language, parser_pool: &ParserPool) -> Vec<Arc<dyn LanguageExtractor>> {
    match language {
        Language::Rust => vec![Arc::new(rust::RustExtractor::new(parser_pool.clone()))],
        Language::TypeScript => vec![Arc::new(typescript::TypeScriptExtractor::new(parser_pool.clone()))],
        Language::JavaScript => vec![Arc::new(javascript::JavaScriptExtractor::new(parser_pool.clone()))],
        Language::Python => vec![Arc::new(python::PythonExtractor::new(parser_pool.clone()))],
        Language::Go => vec![Arc::new(go::GoExtractor::new(parser_pool.clone()))],
        Language::Java => vec![Arc::new(java::JavaExtractor::new(parser_pool.clone()))],
        Language::C => vec![Arc::new(c::CExtractor::new(parser_pool.clone()))],
        Language::Cpp => vec![Arc::new(cpp::CppExtractor::new(parser_pool.clone()))],
        Language::Php => vec![Arc::new(php::PhpExtractor)],
        Language::Markdown => vec![Arc::new(markdown::MarkdownExtractor)],
        Language::Html => vec![Arc::new(html::HtmlExtractor)],
        Language::Css => vec![Arc::new(css::CssExtractor)],
        _ => Vec::new(),
    }
}
