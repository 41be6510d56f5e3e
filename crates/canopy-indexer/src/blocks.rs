//! Block Scanner (C2): splits one file's bytes into a non-overlapping,
//! fully-covering sequence of `(language, byteRange)` blocks, carving out
//! embedded sub-languages from composite formats.

use std::sync::LazyLock;

use regex::Regex;

use canopy_core::Language;

/// Marks where a block's embedding boundary sits in the outer text; kept so
/// downstream scoping can tell a delegated block apart from a top-level file.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub start_marker: String,
    pub end_marker: String,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub language: Language,
    pub byte_start: usize,
    pub byte_end: usize,
    pub boundary: Option<Boundary>,
}

impl Block {
    pub fn text<'a>(&self, full_text: &'a str) -> &'a str {
        &full_text[self.byte_start..self.byte_end]
    }
}

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<script(?:\s+[^>]*)?>(.*?)</script\s*>"#).unwrap());
static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?is)<style(?:\s+[^>]*)?>(.*?)</style\s*>"#).unwrap());
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?ms)^```(\w*)\r?\n(.*?)^```\s*$").unwrap());
static PHP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<\?php(.*?)(?:\?>|\z)").unwrap());

/// Produces one block for single-language files; for HTML/Markdown/PHP,
/// splits around embedded sub-language regions, with any unterminated
/// embedding closed at EOF (the caller is expected to surface a
/// [`crate::extractor::ParseWarning`] for that case).
pub fn scan(language: Language, text: &str) -> (Vec<Block>, bool) {
    match language {
        Language::Html => scan_html(text),
        Language::Markdown => scan_markdown(text),
        Language::Php => scan_php(text),
        other => (vec![whole_file_block(other, text)], false),
    }
}

fn whole_file_block(language: Language, text: &str) -> Block {
    Block { language, byte_start: 0, byte_end: text.len(), boundary: None }
}

fn scan_html(text: &str) -> (Vec<Block>, bool) {
    let mut cuts: Vec<(usize, usize, Language, Boundary)> = Vec::new();

    for m in SCRIPT_RE.captures_iter(text) {
        let body = m.get(1).unwrap();
        cuts.push((
            body.start(),
            body.end(),
            Language::JavaScript,
            Boundary { start_marker: "<script>".into(), end_marker: "</script>".into() },
        ));
    }
    for m in STYLE_RE.captures_iter(text) {
        let body = m.get(1).unwrap();
        cuts.push((
            body.start(),
            body.end(),
            Language::Css,
            Boundary { start_marker: "<style>".into(), end_marker: "</style>".into() },
        ));
    }
    cuts.sort_by_key(|(start, ..)| *start);

    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    for (start, end, lang, boundary) in cuts {
        if start < cursor {
            continue; // overlapping match (nested tags); keep the first.
        }
        if start > cursor {
            blocks.push(Block { language: Language::Html, byte_start: cursor, byte_end: start, boundary: None });
        }
        blocks.push(Block { language: lang, byte_start: start, byte_end: end, boundary: Some(boundary) });
        cursor = end;
    }
    if cursor < text.len() {
        blocks.push(Block { language: Language::Html, byte_start: cursor, byte_end: text.len(), boundary: None });
    }
    if blocks.is_empty() {
        blocks.push(whole_file_block(Language::Html, text));
    }
    (blocks, false)
}

fn scan_markdown(text: &str) -> (Vec<Block>, bool) {
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    let mut unterminated = false;

    for m in FENCE_RE.captures_iter(text) {
        let whole = m.get(0).unwrap();
        let lang_tag = m.get(1).map(|g| g.as_str()).unwrap_or("");
        let body = m.get(2).unwrap();
        if whole.start() > cursor {
            blocks.push(Block { language: Language::Markdown, byte_start: cursor, byte_end: whole.start(), boundary: None });
        }
        let fence_lang = match lang_tag.to_ascii_lowercase().as_str() {
            "rust" | "rs" => Language::Rust,
            "ts" | "typescript" => Language::TypeScript,
            "js" | "javascript" => Language::JavaScript,
            "py" | "python" => Language::Python,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "php" => Language::Php,
            "html" => Language::Html,
            "css" => Language::Css,
            "" => Language::PlainText,
            _ => Language::PlainText,
        };
        blocks.push(Block {
            language: fence_lang,
            byte_start: body.start(),
            byte_end: body.end(),
            boundary: Some(Boundary { start_marker: "```".into(), end_marker: "```".into() }),
        });
        cursor = whole.end();
    }

    if text[cursor..].contains("```") {
        unterminated = true;
    }

    if cursor < text.len() {
        blocks.push(Block { language: Language::Markdown, byte_start: cursor, byte_end: text.len(), boundary: None });
    }
    if blocks.is_empty() {
        blocks.push(whole_file_block(Language::Markdown, text));
    }
    (blocks, unterminated)
}

fn scan_php(text: &str) -> (Vec<Block>, bool) {
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    let mut unterminated = false;

    for m in PHP_RE.captures_iter(text) {
        let whole = m.get(0).unwrap();
        let body = m.get(1).unwrap();
        if whole.start() > cursor {
            blocks.push(Block { language: Language::Html, byte_start: cursor, byte_end: whole.start(), boundary: None });
        }
        blocks.push(Block {
            language: Language::Php,
            byte_start: body.start(),
            byte_end: body.end(),
            boundary: Some(Boundary { start_marker: "<?php".into(), end_marker: "?>".into() }),
        });
        if !whole.as_str().trim_end().ends_with("?>") {
            unterminated = true;
        }
        cursor = whole.end();
    }

    if cursor < text.len() {
        blocks.push(Block { language: Language::Html, byte_start: cursor, byte_end: text.len(), boundary: None });
    }
    if blocks.is_empty() {
        blocks.push(whole_file_block(Language::Html, text));
    }
    (blocks, unterminated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_language_file_is_one_block() {
        let (blocks, warned) = scan(Language::Rust, "fn main() {}");
        assert_eq!(blocks.len(), 1);
        assert!(!warned);
    }

    #[test]
    fn html_carves_out_script_and_style_blocks() {
        let html = "<html><head><style>body{color:red}</style></head><body><script>console.log(1)</script></body></html>";
        let (blocks, _) = scan(Language::Html, html);
        assert!(blocks.iter().any(|b| b.language == Language::Css));
        assert!(blocks.iter().any(|b| b.language == Language::JavaScript));
        let reconstructed: String = blocks.iter().map(|b| b.text(html)).collect();
        assert_eq!(reconstructed, html);
    }

    #[test]
    fn markdown_carves_out_fenced_blocks() {
        let md = "# Title\n\n```rust\nfn main() {}\n```\n\nText after.\n";
        let (blocks, warned) = scan(Language::Markdown, md);
        assert!(blocks.iter().any(|b| b.language == Language::Rust));
        assert!(!warned);
    }

    #[test]
    fn php_splits_around_tags() {
        let php = "<div><?php echo $x; ?></div>";
        let (blocks, warned) = scan(Language::Php, php);
        assert!(blocks.iter().any(|b| b.language == Language::Php));
        assert!(blocks.iter().any(|b| b.language == Language::Html));
        assert!(!warned);
    }

    #[test]
    fn unterminated_php_tag_is_flagged() {
        let php = "<div><?php echo $x;";
        let (_, warned) = scan(Language::Php, php);
        assert!(warned);
    }
}
