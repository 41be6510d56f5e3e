//! Orchestrates indexing: wires the per-file pipeline (C1 detect → C2 blocks
//! → C3/C4 registry+extractors → C5 heuristics) into a full-workspace initial
//! index, then drives the resolver (C7) to a fixed point.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use rayon::prelude::*;

use canopy_core::{
    Aggregator, ComponentIdFactory, ComponentRepository, EngineConfig, IgnoreEngine, Language,
    ParsingLevel, ProvisionalEdge, RelationshipRepository, SymbolicId, WorkspaceType,
};

use crate::blocks;
use crate::detect;
use crate::extractor::{ParseError, ParseWarning, ProvisionalRelationship};
use crate::heuristics;
use crate::parser_pool::create_parser_pool;
use crate::registry::ParserRegistry;
use crate::resolver::run_resolution_pass;

/// One file's pipeline output, before aggregation.
#[derive(Debug, Default)]
pub struct FileIndex {
    pub components: Vec<canopy_core::Component>,
    pub relationships: Vec<ProvisionalEdge>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexSummary {
    pub files_indexed: usize,
    pub components: usize,
    pub relationships: usize,
    pub resolver_passes: usize,
    pub file_errors: usize,
    pub workspace_type: Option<WorkspaceType>,
}

fn line_of(text: &str, byte_offset: usize) -> u32 {
    text.as_bytes()[..byte_offset].iter().filter(|&&b| b == b'\n').count() as u32 + 1
}

fn to_provisional_edge(rel: ProvisionalRelationship, origin: &str) -> ProvisionalEdge {
    let needs_resolution = matches!(&rel.target, SymbolicId::Symbolic(_)) || matches!(&rel.source, SymbolicId::Symbolic(_));
    ProvisionalEdge {
        source_id: rel.source,
        target_id: rel.target,
        r#type: rel.r#type,
        confidence: rel.confidence,
        metadata: canopy_core::RelationshipMetadata { import_kind: rel.import_kind, imported_name: rel.imported_name, needs_resolution, ..Default::default() },
        producer_metadata: Default::default(),
        origin: origin.to_string(),
    }
}

pub struct Coordinator {
    workspace_root: PathBuf,
    config: EngineConfig,
    ignore: IgnoreEngine,
    registry: ParserRegistry,
    workspace_type: Option<WorkspaceType>,
}

impl Coordinator {
    pub fn new(workspace_root: PathBuf, config: EngineConfig) -> Self {
        let ignore = IgnoreEngine::build(&workspace_root, &config.exclude_extensions);
        let registry = ParserRegistry::new(create_parser_pool(Some(config.workers)));
        let workspace_type = canopy_core::detect_workspace(&workspace_root);
        Coordinator { workspace_root, config, ignore, registry, workspace_type }
    }

    /// Runs C1–C5 for a single file. `project_relative_path` must already be
    /// POSIX-normalized and ignore-checked by the caller.
    pub fn index_file(&self, project_relative_path: &str) -> FileIndex {
        let absolute = self.workspace_root.join(project_relative_path);
        let mut out = FileIndex::default();

        let bytes = match std::fs::read(&absolute) {
            Ok(b) => b,
            Err(e) => {
                out.errors.push(ParseError { message: format!("failed to read {project_relative_path}: {e}") });
                return out;
            }
        };
        let Ok(text) = String::from_utf8(bytes) else {
            out.warnings.push(ParseWarning { message: format!("{project_relative_path} is not valid UTF-8; skipped") });
            return out;
        };

        let file_name = Path::new(project_relative_path).file_name().and_then(|n| n.to_str()).unwrap_or(project_relative_path);
        let head = &text.as_bytes()[..text.len().min(4096)];
        let language = detect::detect(file_name, head).map(|d| d.language).unwrap_or(Language::PlainText);

        let (blocks, unterminated) = blocks::scan(language, &text);
        if unterminated {
            out.warnings.push(ParseWarning { message: format!("{project_relative_path}: unterminated embedded block closed at EOF") });
        }

        let mut ids = ComponentIdFactory::new();
        for block in &blocks {
            let block_text = block.text(&text);
            let mut result = self.registry.parse_block(block.language, &[], project_relative_path, block_text, &mut ids);

            // Extractors number lines relative to the block they're handed, so an
            // embedded block (a `<script>` body, a markdown fence) needs its
            // components' locations and ids rebased onto the outer file before
            // they're stored — ids are a function of (path, type, name, line,
            // column), so shifting the line without recomputing the id would
            // desync a component from the relationships the same extraction
            // pass already pointed at its old id.
            let line_offset = line_of(&text, block.byte_start).saturating_sub(1);
            if line_offset > 0 {
                let mut remap = std::collections::HashMap::new();
                for component in &mut result.components {
                    let old_id = component.id;
                    component.location.start_line += line_offset;
                    component.location.end_line += line_offset;
                    component.id = ids.component_id(
                        project_relative_path,
                        component.r#type,
                        &component.name,
                        component.location.start_line,
                        component.location.start_column,
                    );
                    remap.insert(old_id, component.id);
                }
                for rel in &mut result.relationships {
                    if let SymbolicId::Resolved(id) = &rel.source {
                        if let Some(new_id) = remap.get(id) {
                            rel.source = SymbolicId::Resolved(*new_id);
                        }
                    }
                    if let SymbolicId::Resolved(id) = &rel.target {
                        if let Some(new_id) = remap.get(id) {
                            rel.target = SymbolicId::Resolved(*new_id);
                        }
                    }
                }
            }

            out.components.extend(result.components);
            out.errors.extend(result.errors);
            out.warnings.extend(result.warnings);
            let origin = format!("{:?}:{:?}", block.language, result.parsing_level);
            out.relationships.extend(result.relationships.into_iter().map(|r| to_provisional_edge(r, &origin)));
        }

        let initial_edges = heuristics::link(language, project_relative_path, &text, &absolute, &self.workspace_root);
        out.relationships.extend(initial_edges.into_iter().map(|e| to_provisional_edge(e.relationship, "initial-linker")));

        out
    }

    /// Enumerates files under the workspace root, honoring the ignore engine,
    /// and returns their project-relative POSIX paths.
    fn enumerate_files(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let walker = ignore::WalkBuilder::new(&self.workspace_root).hidden(false).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if self.ignore.should_ignore(path) || IgnoreEngine::is_internal_state_path(path) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if meta.len() > self.config.max_file_size {
                    continue;
                }
            }
            let relative = canopy_core::path_utils::to_project_relative_posix(&self.workspace_root, path);
            paths.push(relative);
        }
        paths
    }

    /// Initial index (§4.10): enumerate → per-file C1–C4 in parallel →
    /// aggregate (C6) → resolve to a fixed point (C7) → persist.
    pub fn run_full_index(
        &self,
        components: &dyn ComponentRepository,
        relationships: &dyn RelationshipRepository,
    ) -> Result<IndexSummary> {
        let paths = self.enumerate_files();
        let aggregator = Mutex::new(Aggregator::new());
        let error_count = Mutex::new(0usize);

        paths.par_iter().for_each(|path| {
            let file_index = self.index_file(path);
            if !file_index.errors.is_empty() {
                *error_count.lock().unwrap() += file_index.errors.len();
            }
            for component in file_index.components {
                components.store(component);
            }
            if !file_index.relationships.is_empty() {
                let mut by_level: std::collections::HashMap<String, (ParsingLevel, Vec<ProvisionalEdge>)> = std::collections::HashMap::new();
                for edge in file_index.relationships {
                    let level = level_from_origin(&edge.origin);
                    by_level.entry(level_key(level)).or_insert_with(|| (level, Vec::new())).1.push(edge);
                }
                let mut agg = aggregator.lock().unwrap();
                for (_, (level, batch)) in by_level {
                    agg.add(batch, level);
                }
            }
        });

        let aggregated = aggregator.into_inner().unwrap().get_all(0.0);
        relationships.upsert_many(aggregated.clone());

        let mut resolver_passes = 0;
        loop {
            let pending: Vec<_> = relationships
                .query_by(&canopy_core::RelationshipQuery::default())
                .into_iter()
                .filter(|r| matches!(r.source_id, SymbolicId::Symbolic(_)) || matches!(r.target_id, SymbolicId::Symbolic(_)))
                .collect();
            if pending.is_empty() || resolver_passes >= 8 {
                break;
            }
            let metrics = run_resolution_pass(pending, components, relationships, &self.config, &self.ignore, &self.workspace_root, self.workspace_type);
            resolver_passes += 1;
            if metrics.resolved == 0 && metrics.external == 0 {
                break;
            }
        }

        Ok(IndexSummary {
            files_indexed: paths.len(),
            components: components.count(),
            relationships: aggregated.len(),
            resolver_passes,
            file_errors: error_count.into_inner().unwrap(),
            workspace_type: self.workspace_type,
        })
    }
}

fn level_key(level: ParsingLevel) -> String {
    format!("{level:?}")
}

/// Recovers the `ParsingLevel` a provisional edge's merge bucket belongs to
/// from the `origin` tag `index_file` stamped it with.
pub fn level_from_origin(origin: &str) -> ParsingLevel {
    if origin == "initial-linker" {
        return ParsingLevel::Initial;
    }
    origin
        .rsplit_once(':')
        .and_then(|(_, level)| match level {
            "Semantic" => Some(ParsingLevel::Semantic),
            "Structural" => Some(ParsingLevel::Structural),
            "Basic" => Some(ParsingLevel::Basic),
            "Initial" => Some(ParsingLevel::Initial),
            _ => None,
        })
        .unwrap_or(ParsingLevel::Semantic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::InMemoryStorage;

    #[test]
    fn indexes_a_small_typescript_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "import {b} from './b';\nexport const x = b();\n").unwrap();
        std::fs::write(dir.path().join("b.ts"), "export function b() { return 1; }\n").unwrap();

        let coordinator = Coordinator::new(dir.path().to_path_buf(), EngineConfig::default());
        let storage = InMemoryStorage::new();
        let summary = coordinator.run_full_index(&storage, &storage).unwrap();

        assert_eq!(summary.files_indexed, 2);
        assert!(summary.components > 0);
    }

    #[test]
    fn skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/lib.js"), "module.exports = {};\n").unwrap();
        std::fs::write(dir.path().join("index.js"), "console.log(1);\n").unwrap();

        let coordinator = Coordinator::new(dir.path().to_path_buf(), EngineConfig::default());
        let files = coordinator.enumerate_files();
        assert!(files.iter().any(|f| f == "index.js"));
        assert!(!files.iter().any(|f| f.contains("node_modules")));
    }
}
