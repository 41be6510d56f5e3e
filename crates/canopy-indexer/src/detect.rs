//! Language Detector (C1): file path + leading bytes → language id.

use canopy_core::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    Extension,
    Shebang,
    Content,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub language: Language,
    pub confidence: f32,
    pub method: DetectionMethod,
}

/// Detects a file's language from its name/extension and, if that's
/// inconclusive, the first ~4 KiB of its content. Never returns a language
/// for genuinely unknown files — callers treat `None` as "data", indexed as
/// one `file` component with no relationships.
pub fn detect(file_name: &str, head: &[u8]) -> Option<Detection> {
    if let Some(lang) = by_exact_name(file_name) {
        return Some(Detection { language: lang, confidence: 1.0, method: DetectionMethod::Extension });
    }
    if let Some(lang) = by_extension(file_name) {
        return Some(Detection { language: lang, confidence: 1.0, method: DetectionMethod::Extension });
    }
    if let Some(lang) = by_shebang(head) {
        return Some(Detection { language: lang, confidence: 0.9, method: DetectionMethod::Shebang });
    }
    by_content(head).map(|lang| Detection { language: lang, confidence: 0.7, method: DetectionMethod::Content })
}

fn by_exact_name(file_name: &str) -> Option<Language> {
    match file_name {
        "Makefile" | "GNUmakefile" | "makefile" => Some(Language::Makefile),
        "Dockerfile" => Some(Language::Dockerfile),
        _ if file_name.starts_with("Dockerfile.") => Some(Language::Dockerfile),
        _ if file_name.ends_with(".mk") => Some(Language::Makefile),
        _ => None,
    }
}

fn by_extension(file_name: &str) -> Option<Language> {
    let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
    Some(match ext.as_str() {
        "rs" => Language::Rust,
        "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "py" | "pyi" => Language::Python,
        "go" => Language::Go,
        "java" => Language::Java,
        "c" | "h" => Language::C,
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
        "php" | "phtml" => Language::Php,
        "html" | "htm" => Language::Html,
        "css" => Language::Css,
        "md" | "mdx" | "markdown" => Language::Markdown,
        "sh" | "bash" | "zsh" | "fish" | "ksh" => Language::Shell,
        "yml" | "yaml" => Language::Yaml,
        "toml" => Language::Toml,
        "json" | "jsonc" => Language::Json,
        "sql" => Language::Sql,
        _ => return None,
    })
}

fn by_shebang(head: &[u8]) -> Option<Language> {
    let text = std::str::from_utf8(head).ok()?;
    let first_line = text.lines().next()?;
    if !first_line.starts_with("#!") {
        return None;
    }
    let interpreter = first_line.trim_start_matches("#!").trim();
    if interpreter.contains("python") {
        Some(Language::Python)
    } else if interpreter.contains("node") {
        Some(Language::JavaScript)
    } else if ["bash", "sh", "zsh", "fish", "ksh"].iter().any(|s| interpreter.contains(s)) {
        Some(Language::Shell)
    } else {
        None
    }
}

fn by_content(head: &[u8]) -> Option<Language> {
    let text = std::str::from_utf8(head).ok()?.trim_start_matches('\u{feff}');
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?php") {
        Some(Language::Php)
    } else if trimmed.to_ascii_lowercase().starts_with("<!doctype html") || trimmed.starts_with("<html") {
        Some(Language::Html)
    } else if trimmed.starts_with("<?xml") {
        Some(Language::Html)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_beats_extension() {
        let d = detect("Dockerfile", b"").unwrap();
        assert_eq!(d.language, Language::Dockerfile);
    }

    #[test]
    fn extension_table_covers_common_languages() {
        assert_eq!(detect("a.ts", b"").unwrap().language, Language::TypeScript);
        assert_eq!(detect("a.py", b"").unwrap().language, Language::Python);
    }

    #[test]
    fn shebang_detects_scripts_without_extension() {
        let d = detect("run", b"#!/usr/bin/env python3\nprint(1)\n").unwrap();
        assert_eq!(d.language, Language::Python);
        assert_eq!(d.method, DetectionMethod::Shebang);
    }

    #[test]
    fn content_heuristics_detect_php_and_html() {
        assert_eq!(detect("index", b"<?php echo 1;").unwrap().language, Language::Php);
        assert_eq!(detect("index", b"<!DOCTYPE html><html>").unwrap().language, Language::Html);
    }

    #[test]
    fn unknown_files_return_none() {
        assert!(detect("README", b"just some prose").is_none());
    }
}
