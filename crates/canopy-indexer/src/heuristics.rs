//! Initial Linker (C5): low-confidence cross-file edges for file types
//! without a full parser (shell, Makefile, Dockerfile, Markdown) and as a
//! generic path-token fallback pass for any file.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use canopy_core::{Language, ParsingLevel, RelationshipType, SymbolicId};

use crate::extractor::ProvisionalRelationship;

#[derive(Debug, Clone)]
pub struct InitialEdge {
    pub relationship: ProvisionalRelationship,
    pub precedence_level: ParsingLevel,
}

fn edge(source_path: &str, target: &str, r#type: RelationshipType, confidence: f32) -> InitialEdge {
    let mut rel = ProvisionalRelationship::new(
        SymbolicId::Symbolic(format!("FILE:{source_path}")),
        SymbolicId::Symbolic(format!("FILE:{target}")),
        r#type,
    );
    rel.confidence = confidence;
    InitialEdge { relationship: rel, precedence_level: ParsingLevel::Initial }
}

static SHELL_SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*(?:source|\.)\s+["']?([^\s"'|;&]+)"#).unwrap());
static SHELL_AWK_SED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)\b(?:awk|sed)\s+-f\s+["']?([^\s"'|;&]+)"#).unwrap());
static SHELL_INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*include\s+["']?([^\s"'|;&]+)"#).unwrap());

static MAKE_INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(?:-?include|sinclude)\s+(.+)$").unwrap());
static MAKE_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^([^\s:#][^:#\n]*):\s*([^\n]*)$").unwrap());
static MAKE_VAR_FILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\w+\s*[:+?]?=\s*(.+\.\w+)\s*$").unwrap());

static DOCKER_COPY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*(?:COPY|ADD)\s+(.+?)\s+\S+\s*$").unwrap());
static DOCKER_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*RUN\s+(.+)$").unwrap());
static PATH_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w./-]+\.\w{1,5}").unwrap());

static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"!?\[[^\]]*\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).unwrap());
static MD_FILE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"file:([^\s`]+)").unwrap());

static GENERIC_PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w][\w./-]{2,}\.\w{1,6}").unwrap());

const DEMOTED_EXTENSIONS: &[&str] = &["min.js", "log", "cache", "db", "db-wal", "db-shm", "sqlite", "sqlite3"];

fn is_url_or_vcs(token: &str) -> bool {
    token.starts_with("http://")
        || token.starts_with("https://")
        || token.starts_with("git@")
        || token.contains("://")
        || token.starts_with('$')
        || token.starts_with('%')
}

fn is_demoted(token: &str) -> bool {
    DEMOTED_EXTENSIONS.iter().any(|ext| token.ends_with(ext))
}

/// Validates a candidate target against the real filesystem: it must exist
/// and resolve inside `workspace_root`.
fn validate(workspace_root: &Path, source_dir: &Path, target: &str) -> bool {
    if is_url_or_vcs(target) || is_demoted(target) {
        return false;
    }
    let candidate = if Path::new(target).is_absolute() { Path::new(target).to_path_buf() } else { source_dir.join(target) };
    let Ok(canonical) = candidate.canonicalize() else { return false };
    canonical.starts_with(workspace_root)
}

/// Runs the rule set appropriate to `language` against `text`, emitting
/// `precedenceLevel=initial` edges validated against the real filesystem.
/// `source_path` is project-relative; `absolute_path`/`workspace_root` are
/// used only for the existence/containment check.
pub fn link(
    language: Language,
    source_path: &str,
    text: &str,
    absolute_path: &Path,
    workspace_root: &Path,
) -> Vec<InitialEdge> {
    let source_dir = absolute_path.parent().unwrap_or(workspace_root);
    let mut edges = Vec::new();
    let mut push = |target: &str, r#type: RelationshipType, confidence: f32| {
        if validate(workspace_root, source_dir, target) {
            edges.push(edge(source_path, target, r#type, confidence));
        }
    };

    match language {
        Language::Shell => {
            for caps in SHELL_SOURCE_RE.captures_iter(text) {
                push(&caps[1], RelationshipType::Includes, 0.85);
            }
            for caps in SHELL_AWK_SED_RE.captures_iter(text) {
                push(&caps[1], RelationshipType::DependsOn, 0.80);
            }
            for caps in SHELL_INCLUDE_RE.captures_iter(text) {
                push(&caps[1], RelationshipType::Includes, 0.75);
            }
        }
        Language::Makefile => {
            for caps in MAKE_INCLUDE_RE.captures_iter(text) {
                for token in caps[1].split_whitespace() {
                    push(token, RelationshipType::Includes, 0.90);
                }
            }
            for caps in MAKE_TARGET_RE.captures_iter(text) {
                for dep in caps[2].split_whitespace() {
                    push(dep, RelationshipType::DependsOn, 0.85);
                }
            }
            for caps in MAKE_VAR_FILE_RE.captures_iter(text) {
                push(caps[1].trim(), RelationshipType::ReferencesFile, 0.70);
            }
        }
        Language::Dockerfile => {
            for caps in DOCKER_COPY_RE.captures_iter(text) {
                for token in caps[1].split_whitespace() {
                    if !is_url_or_vcs(token) {
                        push(token, RelationshipType::Copies, 0.90);
                    }
                }
            }
            for caps in DOCKER_RUN_RE.captures_iter(text) {
                for m in PATH_TOKEN_RE.find_iter(&caps[1]) {
                    push(m.as_str(), RelationshipType::Uses, 0.60);
                }
            }
        }
        Language::Markdown => {
            for caps in MD_LINK_RE.captures_iter(text) {
                let target = &caps[1];
                if !target.starts_with('#') && !is_url_or_vcs(target) {
                    push(target, RelationshipType::ReferencesFile, 0.85);
                }
            }
            for caps in MD_FILE_TOKEN_RE.captures_iter(text) {
                push(&caps[1], RelationshipType::ReferencesFile, 0.60);
            }
        }
        _ => {}
    }

    // Generic fallback pass: path-shaped tokens, always run regardless of language.
    for m in GENERIC_PATH_RE.find_iter(text) {
        let token = m.as_str();
        if is_url_or_vcs(token) || is_demoted(token) || token.contains(".git/") {
            continue;
        }
        push(token, RelationshipType::ReferencesFile, 0.50);
    }

    dedupe_by_target(edges)
}

fn dedupe_by_target(edges: Vec<InitialEdge>) -> Vec<InitialEdge> {
    use std::collections::HashMap;
    let mut best: HashMap<(String, String), InitialEdge> = HashMap::new();
    for e in edges {
        let key = (e.relationship.target.to_string(), format!("{:?}", e.relationship.r#type));
        best.entry(key)
            .and_modify(|existing| {
                if e.relationship.confidence > existing.relationship.confidence {
                    *existing = e.clone();
                }
            })
            .or_insert(e);
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn shell_source_statement_emits_includes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.sh"), "echo hi").unwrap();
        let script = dir.path().join("run.sh");
        fs::write(&script, "source ./lib.sh\n").unwrap();

        let edges = link(Language::Shell, "run.sh", "source ./lib.sh\n", &script, dir.path());
        assert!(edges.iter().any(|e| e.relationship.r#type == RelationshipType::Includes && e.relationship.confidence == 0.85));
    }

    #[test]
    fn nonexistent_targets_are_filtered_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        let edges = link(Language::Shell, "run.sh", "source ./missing.sh\n", &script, dir.path());
        assert!(edges.is_empty());
    }

    #[test]
    fn duplicate_targets_collapse_to_highest_confidence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shared.sh"), "").unwrap();
        let script = dir.path().join("run.sh");
        let text = "source ./shared.sh\ninclude ./shared.sh\n";
        let edges = link(Language::Shell, "run.sh", text, &script, dir.path());
        let includes: Vec<_> = edges
            .iter()
            .filter(|e| e.relationship.target.to_string() == "FILE:./shared.sh" && e.relationship.r#type == RelationshipType::Includes)
            .collect();
        assert_eq!(includes.len(), 1);
        assert_eq!(includes[0].relationship.confidence, 0.85);
    }
}
