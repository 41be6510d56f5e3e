//! Stable component ids and content hashing (C12).
//!
//! Component ids and content hashes are both 128-bit xxh3 digests: stable
//! across processes and platforms, which is what lets a resolved relationship
//! or a cached embedding row survive a restart.

use std::collections::HashSet;

use xxhash_rust::xxh3::xxh3_128;

use crate::model::{ComponentId, ComponentType};

/// Builds [`ComponentId`]s, disambiguating collisions within one indexing run.
///
/// A fresh factory should be used per bulk pass; ids are not globally unique
/// without the disambiguation state this struct carries.
#[derive(Debug, Default)]
pub struct ComponentIdFactory {
    seen: HashSet<u128>,
}

impl ComponentIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `hash(projectRelativePosixPath + '|' + type + '|' + name + '|' + startLine + ':' + startColumn)`,
    /// truncated to 128 bits. Collisions are resolved by appending an
    /// incrementing disambiguator to the hashed string.
    pub fn component_id(
        &mut self,
        project_relative_path: &str,
        r#type: ComponentType,
        name: &str,
        start_line: u32,
        start_column: u32,
    ) -> ComponentId {
        let base = format!(
            "{project_relative_path}|{}|{name}|{start_line}:{start_column}",
            type_tag(r#type)
        );
        let mut candidate = xxh3_128(base.as_bytes());
        let mut disambiguator = 1u32;
        while !self.seen.insert(candidate) {
            disambiguator += 1;
            candidate = xxh3_128(format!("{base}#{disambiguator}").as_bytes());
        }
        ComponentId(candidate)
    }
}

fn type_tag(t: ComponentType) -> &'static str {
    use ComponentType::*;
    match t {
        Class => "class",
        Interface => "interface",
        Struct => "struct",
        Enum => "enum",
        Method => "method",
        Function => "function",
        Property => "property",
        Field => "field",
        Event => "event",
        Namespace => "namespace",
        Module => "module",
        File => "file",
        Variable => "variable",
        Comment => "comment",
        Section => "section",
        Import => "import",
        ExternalModule => "external_module",
        StdlibSymbol => "stdlib_symbol",
        Generic => "generic",
        Unknown => "unknown",
    }
}

/// Strips trailing whitespace per line and normalizes line endings to `\n`.
pub fn normalize_code(code: &str) -> String {
    code.replace("\r\n", "\n")
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `hash(type + '|' + name + '|' + normalized(code) + '|' + serialized(stableMetadata))`.
///
/// `stable_metadata_json` must already exclude volatile keys (`updatedAt`,
/// `backend`, `parsingLevel`) — callers build it via
/// [`crate::model::ComponentMetadata`]'s stable projection.
pub fn content_hash(r#type: ComponentType, name: &str, code: &str, stable_metadata_json: &str) -> u128 {
    let normalized = normalize_code(code);
    let input = format!("{}|{name}|{normalized}|{stable_metadata_json}", type_tag(r#type));
    xxh3_128(input.as_bytes())
}

/// Derives a [`crate::model::RelationshipId`] from its aggregation key.
pub fn relationship_key_hash(source: &str, target: &str, rel_type: &str) -> u128 {
    xxh3_128(format!("{source}|{target}|{rel_type}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_type_name_location_is_deterministic() {
        let mut f = ComponentIdFactory::new();
        let a = f.component_id("src/a.ts", ComponentType::Function, "b", 3, 1);
        let mut f2 = ComponentIdFactory::new();
        let b = f2.component_id("src/a.ts", ComponentType::Function, "b", 3, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_yield_different_ids_but_same_content_hash() {
        let mut f = ComponentIdFactory::new();
        let a = f.component_id("src/a.ts", ComponentType::Function, "b", 3, 1);
        let b = f.component_id("src/other.ts", ComponentType::Function, "b", 3, 1);
        assert_ne!(a, b);

        let ha = content_hash(ComponentType::Function, "b", "return 1;", "{}");
        let hb = content_hash(ComponentType::Function, "b", "return 1;", "{}");
        assert_eq!(ha, hb);
    }

    #[test]
    fn collisions_are_disambiguated_within_one_factory() {
        let mut f = ComponentIdFactory::new();
        let a = f.component_id("src/a.ts", ComponentType::Function, "b", 3, 1);
        let b = f.component_id("src/a.ts", ComponentType::Function, "b", 3, 1);
        assert_ne!(a, b, "re-requesting the same key must disambiguate, not collide");
    }

    #[test]
    fn normalize_strips_trailing_whitespace_and_crlf() {
        assert_eq!(normalize_code("a  \r\nb\t\r\n"), "a\nb");
    }
}
