//! Resolver (C7): target and source resolvers that rewrite symbolic
//! relationship endpoints into concrete component ids, upserting external
//! stub components for anything that resolves outside the workspace.

use std::path::Path;
use std::sync::LazyLock;

use xxhash_rust::xxh3::xxh3_128;

use canopy_core::{
    Component, ComponentId, ComponentMetadata, ComponentType, EngineConfig, IgnoreEngine, Language,
    Location, ParsingLevel, PendingUpdate, Relationship, ResolutionContext, ResolutionStatus, SymbolicId,
    WorkspaceType,
};
use canopy_core::storage::{ComponentRepository, RelationshipRepository, SourceUpdate, TargetUpdate};

/// The shape of a `RESOLVE:`-prefixed specifier, per §4.7's classification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecifierClass {
    Path,
    Bare,
    Namespace,
    Junk,
}

fn classify_specifier(specifier: &str) -> SpecifierClass {
    if specifier.contains("class:") || specifier.contains("file:") || specifier.contains(['\n', '{', '}']) {
        return SpecifierClass::Junk;
    }
    if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/') {
        return SpecifierClass::Path;
    }
    if specifier.contains('\\') {
        return SpecifierClass::Namespace;
    }
    SpecifierClass::Bare
}

static NODE_BUILTINS: LazyLock<std::collections::HashSet<&'static str>> = LazyLock::new(|| {
    [
        "fs", "path", "os", "http", "https", "url", "util", "events", "stream", "crypto", "assert",
        "child_process", "buffer", "net", "querystring", "readline", "zlib",
    ]
    .into_iter()
    .collect()
});

static PY_STDLIB: LazyLock<std::collections::HashSet<&'static str>> = LazyLock::new(|| {
    [
        "os", "sys", "re", "json", "math", "collections", "itertools", "functools", "typing",
        "pathlib", "subprocess", "asyncio", "logging", "datetime", "unittest", "abc", "dataclasses",
        "enum", "io", "random", "shutil", "threading",
    ]
    .into_iter()
    .collect()
});

static GO_STDLIB: LazyLock<std::collections::HashSet<&'static str>> = LazyLock::new(|| {
    ["fmt", "os", "io", "net/http", "strings", "strconv", "sync", "context", "errors", "time", "bytes"]
        .into_iter()
        .collect()
});

static RUST_STDLIB: LazyLock<std::collections::HashSet<&'static str>> =
    LazyLock::new(|| ["std", "core", "alloc", "proc_macro", "test"].into_iter().collect());

static JAVA_STDLIB: LazyLock<std::collections::HashSet<&'static str>> =
    LazyLock::new(|| ["java.lang", "java.util", "java.io", "java.nio", "java.time"].into_iter().collect());

fn stdlib_match(language: Language, name: &str) -> bool {
    match language {
        Language::JavaScript | Language::TypeScript => NODE_BUILTINS.contains(name),
        Language::Python => PY_STDLIB.contains(name.split('.').next().unwrap_or(name)),
        Language::Go => GO_STDLIB.contains(name),
        Language::Rust => RUST_STDLIB.contains(name.split("::").next().unwrap_or(name)),
        Language::Java => JAVA_STDLIB.iter().any(|pkg| name.starts_with(pkg)),
        _ => false,
    }
}

/// Deterministic id for an external/stdlib stub, independent of
/// [`canopy_core::ComponentIdFactory`]'s per-run disambiguation — the same
/// logical external id must always map to the same [`ComponentId`] so
/// re-upserting stays idempotent.
fn external_component_id(logical_id: &str) -> ComponentId {
    ComponentId(xxh3_128(logical_id.as_bytes()))
}

/// Upserts (or reuses) the stub component for an npm/composer/pypi/... package,
/// per §4.7's external id schema, and returns its id.
fn upsert_external_module(components: &dyn ComponentRepository, ecosystem: &str, name: &str) -> ComponentId {
    let logical_id = format!("external:module:{ecosystem}:{name}");
    let id = external_component_id(&logical_id);
    if components.get(id).is_none() {
        components.store(Component {
            id,
            name: name.to_string(),
            r#type: ComponentType::ExternalModule,
            language: Language::PlainText,
            file_path: format!("__externals__/{ecosystem}/{name}"),
            location: Location { start_line: 1, end_line: 1, start_column: 1, end_column: 1 },
            code: None,
            metadata: ComponentMetadata {
                is_external: true,
                external_kind: Some(ecosystem.to_string()),
                parsing_level: ParsingLevel::Initial,
                ..Default::default()
            },
        });
    }
    id
}

fn upsert_stdlib_symbol(components: &dyn ComponentRepository, language: Language, name: &str) -> ComponentId {
    let lang_tag = format!("{language:?}").to_lowercase();
    let logical_id = format!("stdlib:{lang_tag}:{name}");
    let id = external_component_id(&logical_id);
    if components.get(id).is_none() {
        components.store(Component {
            id,
            name: name.to_string(),
            r#type: ComponentType::StdlibSymbol,
            language,
            file_path: format!("__stdlib__/{lang_tag}/{name}"),
            location: Location { start_line: 1, end_line: 1, start_column: 1, end_column: 1 },
            code: None,
            metadata: ComponentMetadata { is_external: true, parsing_level: ParsingLevel::Initial, ..Default::default() },
        });
    }
    id
}

/// Tries `candidate`, then the same path with each of `extensions` appended,
/// then `index.<ext>` inside it if it names a directory, honoring a
/// `src`↔`dist` swap when the first attempt misses (§4.7's TS fallback rule).
fn resolve_relative_path(
    components: &dyn ComponentRepository,
    ctx: &ResolutionContext,
    source_dir: &str,
    specifier: &str,
) -> Option<ComponentId> {
    let joined = join_posix(source_dir, specifier);
    let mut candidates = vec![joined.clone()];
    for ext in ["ts", "tsx", "js", "jsx", "py", "php"] {
        candidates.push(format!("{joined}.{ext}"));
        candidates.push(format!("{joined}/index.{ext}"));
    }
    if let Some(swapped) = swap_src_dist(&joined) {
        candidates.push(swapped.clone());
        for ext in ["ts", "js"] {
            candidates.push(format!("{swapped}.{ext}"));
        }
    }

    for candidate in &candidates {
        if let Some(cached) = ctx.component_id_by_file_path.get(candidate) {
            return Some(*cached);
        }
        let hits = components.get_by_file_path(std::slice::from_ref(candidate));
        if let Some(&id) = hits.get(candidate) {
            ctx.component_id_by_file_path.insert(candidate.clone(), id);
            return Some(id);
        }
    }
    None
}

fn join_posix(dir: &str, specifier: &str) -> String {
    let mut parts: Vec<&str> = if dir.is_empty() { Vec::new() } else { dir.split('/').collect() };
    for segment in specifier.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn swap_src_dist(path: &str) -> Option<String> {
    if let Some(rest) = path.strip_prefix("src/") {
        Some(format!("dist/{rest}"))
    } else {
        path.strip_prefix("dist/").map(|rest| format!("src/{rest}"))
    }
}

/// Longest-matching PSR-4 prefix → directory translation, per §4.7's PHP
/// bare-specifier branch.
fn resolve_psr4(config: &EngineConfig, specifier: &str) -> Option<String> {
    let mut best: Option<(&String, &String)> = None;
    for (prefix, dir) in &config.psr4_map {
        if specifier.starts_with(prefix.as_str()) {
            if best.is_none_or(|(p, _)| prefix.len() > p.len()) {
                best = Some((prefix, dir));
            }
        }
    }
    let (prefix, dir) = best?;
    let rest = specifier.strip_prefix(prefix.as_str())?.replace('\\', "/");
    Some(format!("{}/{rest}.php", dir.trim_end_matches('/')))
}

/// Classifies a TS `bare` specifier against `tsconfig.paths`: each entry maps
/// a prefix pattern (`@app/*`) to one or more workspace-relative targets.
fn resolve_ts_paths(config: &EngineConfig, specifier: &str) -> Option<String> {
    for (pattern, targets) in &config.ts_paths {
        let prefix = pattern.trim_end_matches('*');
        if let Some(rest) = specifier.strip_prefix(prefix) {
            if let Some(target) = targets.first() {
                let target_prefix = target.trim_end_matches('*');
                return Some(format!("{target_prefix}{rest}"));
            }
        }
    }
    None
}

fn component_language(components: &dyn ComponentRepository, id: ComponentId) -> Option<Language> {
    components.get(id).map(|c| c.language)
}

/// Outcome of resolving one endpoint: either a rewrite to apply, or a status
/// with nothing to rewrite (unresolved/skipped).
struct Resolution {
    status: ResolutionStatus,
    resolved: Option<ComponentId>,
}

fn unresolved() -> Resolution {
    Resolution { status: ResolutionStatus::Unresolved, resolved: None }
}

/// Shared classification/lookup logic for one symbolic endpoint string, used
/// by both the target and the source resolver (§4.7: "identical
/// classification" for the source side).
fn resolve_symbolic(
    raw: &str,
    language: Language,
    source_file_dir: &str,
    components: &dyn ComponentRepository,
    ctx: &ResolutionContext,
    config: &EngineConfig,
    ignore: &IgnoreEngine,
    workspace_root: &Path,
    workspace_type: Option<WorkspaceType>,
) -> Resolution {
    if let Some(specifier) = raw.strip_prefix("FILE:") {
        let path = specifier.trim_start_matches("./");
        if let Some(id) = resolve_relative_path(components, ctx, "", path) {
            return Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) };
        }
        return unresolved();
    }

    if let Some(name) = raw.strip_prefix("CLASS:").or_else(|| raw.strip_prefix("MODULE:")) {
        if let Some(id) = ctx.component_id_by_name.get(name) {
            return Resolution { status: ResolutionStatus::Resolved, resolved: Some(*id) };
        }
        let hits = components.get_by_name(std::slice::from_ref(&name.to_string()));
        if let Some(&id) = hits.get(name) {
            ctx.component_id_by_name.insert(name.to_string(), id);
            return Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) };
        }
        return unresolved();
    }

    if let Some(name) = raw.strip_prefix("EXTERNAL:") {
        let hits = components.get_by_name(std::slice::from_ref(&name.to_string()));
        if let Some(&id) = hits.get(name) {
            return Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) };
        }
        let id = upsert_external_module(components, "unknown", name);
        return Resolution { status: ResolutionStatus::External, resolved: Some(id) };
    }

    let Some(specifier) = raw.strip_prefix("RESOLVE:") else {
        return unresolved();
    };

    match classify_specifier(specifier) {
        SpecifierClass::Junk => Resolution { status: ResolutionStatus::SkippedJunk, resolved: None },
        SpecifierClass::Path => {
            let candidate_path = join_posix(source_file_dir, specifier);
            if ignore.should_ignore(&workspace_root.join(&candidate_path)) {
                return Resolution { status: ResolutionStatus::SkippedIgnored, resolved: None };
            }
            match resolve_relative_path(components, ctx, source_file_dir, specifier) {
                Some(id) => Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) },
                None => unresolved(),
            }
        }
        SpecifierClass::Namespace => match resolve_psr4(config, specifier) {
            Some(path) => match resolve_relative_path(components, ctx, "", &path) {
                Some(id) => Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) },
                None => {
                    let id = upsert_external_module(components, "composer", specifier);
                    Resolution { status: ResolutionStatus::External, resolved: Some(id) }
                }
            },
            None => {
                let id = upsert_external_module(components, "composer", specifier);
                Resolution { status: ResolutionStatus::External, resolved: Some(id) }
            }
        },
        SpecifierClass::Bare => match language {
            Language::TypeScript | Language::JavaScript => {
                if let Some(mapped) = resolve_ts_paths(config, specifier) {
                    if let Some(id) = resolve_relative_path(components, ctx, "", &mapped) {
                        return Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) };
                    }
                }
                let id = upsert_external_module(components, "npm", specifier);
                Resolution { status: ResolutionStatus::External, resolved: Some(id) }
            }
            Language::Php => match resolve_psr4(config, specifier) {
                Some(path) => match resolve_relative_path(components, ctx, "", &path) {
                    Some(id) => Resolution { status: ResolutionStatus::Resolved, resolved: Some(id) },
                    None => {
                        let id = upsert_external_module(components, "composer", specifier);
                        Resolution { status: ResolutionStatus::External, resolved: Some(id) }
                    }
                },
                None => {
                    let id = upsert_external_module(components, "composer", specifier);
                    Resolution { status: ResolutionStatus::External, resolved: Some(id) }
                }
            },
            other if stdlib_match(other, specifier) => {
                let id = upsert_stdlib_symbol(components, other, specifier);
                Resolution { status: ResolutionStatus::SkippedStdlib, resolved: Some(id) }
            }
            // The source component hasn't resolved yet this pass, so its
            // language is unknown — fall back to the ecosystem the workspace
            // root markers (`package.json`, `go.mod`, `Cargo.toml`) imply
            // rather than deferring every bare specifier to the next pass.
            Language::PlainText => match workspace_type {
                Some(WorkspaceType::Npm) => {
                    let id = upsert_external_module(components, "npm", specifier);
                    Resolution { status: ResolutionStatus::External, resolved: Some(id) }
                }
                Some(WorkspaceType::GoModules) if stdlib_match(Language::Go, specifier) => {
                    let id = upsert_stdlib_symbol(components, Language::Go, specifier);
                    Resolution { status: ResolutionStatus::SkippedStdlib, resolved: Some(id) }
                }
                Some(WorkspaceType::Cargo) if stdlib_match(Language::Rust, specifier) => {
                    let id = upsert_stdlib_symbol(components, Language::Rust, specifier);
                    Resolution { status: ResolutionStatus::SkippedStdlib, resolved: Some(id) }
                }
                _ => unresolved(),
            },
            _ => unresolved(),
        },
    }
}

/// Target resolver: rewrites `relationship.target_id` when symbolic.
pub fn resolve_target(
    relationship: &Relationship,
    components: &dyn ComponentRepository,
    ctx: &ResolutionContext,
    config: &EngineConfig,
    ignore: &IgnoreEngine,
    workspace_root: &Path,
    workspace_type: Option<WorkspaceType>,
) -> ResolutionStatus {
    let SymbolicId::Symbolic(raw) = &relationship.target_id else {
        return ResolutionStatus::Unresolved;
    };
    let (language, source_dir) = match relationship.source_id.resolved().and_then(|id| components.get(id)) {
        Some(source) => {
            let dir = Path::new(&source.file_path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
            (source.language, dir)
        }
        None => (Language::PlainText, String::new()),
    };

    let outcome = resolve_symbolic(raw, language, &source_dir, components, ctx, config, ignore, workspace_root, workspace_type);
    if let Some(resolved_id) = outcome.resolved {
        ctx.queue_update(PendingUpdate { relationship_id: relationship.id, is_target: true, resolved_id });
    }
    outcome.status
}

/// Source resolver: identical classification, applied to `relationship.source_id`
/// for edges synthesized with a symbolic source (§4.7).
pub fn resolve_source(
    relationship: &Relationship,
    components: &dyn ComponentRepository,
    ctx: &ResolutionContext,
    config: &EngineConfig,
    ignore: &IgnoreEngine,
    workspace_root: &Path,
    workspace_type: Option<WorkspaceType>,
) -> ResolutionStatus {
    let SymbolicId::Symbolic(raw) = &relationship.source_id else {
        return ResolutionStatus::Unresolved;
    };
    let language = relationship
        .target_id
        .resolved()
        .and_then(|id| component_language(components, id))
        .unwrap_or(Language::PlainText);

    let outcome = resolve_symbolic(raw, language, "", components, ctx, config, ignore, workspace_root, workspace_type);
    if let Some(resolved_id) = outcome.resolved {
        ctx.queue_update(PendingUpdate { relationship_id: relationship.id, is_target: false, resolved_id });
    }
    outcome.status
}

/// Runs both resolvers over `relationships` in batches of
/// `config.resolver_batch_size`, flushing queued endpoint rewrites to storage
/// after each batch (§4.7's `processInBatches` contract).
pub fn run_resolution_pass(
    relationships: Vec<Relationship>,
    components: &dyn ComponentRepository,
    relationship_repo: &dyn RelationshipRepository,
    config: &EngineConfig,
    ignore: &IgnoreEngine,
    workspace_root: &Path,
    workspace_type: Option<WorkspaceType>,
) -> canopy_core::resolution::ResolutionMetrics {
    let ctx = ResolutionContext::new();

    canopy_core::process_in_batches(
        relationships,
        config.resolver_batch_size,
        |relationship| {
            let target_status = resolve_target(&relationship, components, &ctx, config, ignore, workspace_root, workspace_type);
            ctx.record(target_status);
            let source_status = resolve_source(&relationship, components, &ctx, config, ignore, workspace_root, workspace_type);
            if relationship.source_id.resolved().is_none() {
                ctx.record(source_status);
            }
            target_status
        },
        || {
            ctx.flush(|batch| {
                let mut target_updates = Vec::new();
                let mut source_updates = Vec::new();
                for update in batch {
                    if update.is_target {
                        target_updates.push(TargetUpdate { id: update.relationship_id, resolved_target_id: update.resolved_id });
                    } else {
                        source_updates.push(SourceUpdate { id: update.relationship_id, resolved_source_id: update.resolved_id });
                    }
                }
                relationship_repo.update_targets(target_updates);
                relationship_repo.update_sources(source_updates);
            });
        },
    );

    std::mem::take(&mut *ctx.metrics.lock().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::model::{AggregationMetadata, RelationshipId, RelationshipMetadata, RelationshipType};
    use canopy_core::storage::InMemoryStorage;
    use chrono::Utc;

    fn file_component(id: ComponentId, path: &str) -> Component {
        Component {
            id,
            name: path.to_string(),
            r#type: ComponentType::File,
            language: Language::TypeScript,
            file_path: path.to_string(),
            location: Location { start_line: 1, end_line: 1, start_column: 1, end_column: 1 },
            code: None,
            metadata: ComponentMetadata::default(),
        }
    }

    fn bare_relationship(source: ComponentId, target_raw: &str) -> Relationship {
        Relationship {
            id: RelationshipId(1),
            source_id: SymbolicId::Resolved(source),
            target_id: SymbolicId::Symbolic(target_raw.to_string()),
            r#type: RelationshipType::ImportsFrom,
            metadata: RelationshipMetadata::default(),
            sources: Vec::new(),
            precedence_level: ParsingLevel::Semantic,
            final_confidence: 1.0,
            aggregation_metadata: AggregationMetadata {
                merged_from_count: 1,
                last_updated: Utc::now(),
                consensus_score: 0.0,
                highest_original_confidence: 1.0,
                lowest_original_confidence: 1.0,
            },
        }
    }

    #[test]
    fn bare_npm_specifier_upserts_an_external_component() {
        let storage = InMemoryStorage::new();
        let source_id = ComponentId(1);
        storage.store(file_component(source_id, "src/a.ts"));
        let rel = bare_relationship(source_id, "RESOLVE:react");

        let ctx = ResolutionContext::new();
        let ignore = IgnoreEngine::build(Path::new("/work"), &[]);
        let config = EngineConfig::default();
        let status = resolve_target(&rel, &storage, &ctx, &config, &ignore, Path::new("/work"), None);

        assert_eq!(status, ResolutionStatus::External);
        assert_eq!(ctx.pending_len(), 1);
    }

    #[test]
    fn relative_specifier_resolves_against_source_directory() {
        let storage = InMemoryStorage::new();
        let source_id = ComponentId(1);
        let target_id = ComponentId(2);
        storage.store(file_component(source_id, "src/a.ts"));
        storage.store(file_component(target_id, "src/b.ts"));
        let rel = bare_relationship(source_id, "RESOLVE:./b");

        let ctx = ResolutionContext::new();
        let ignore = IgnoreEngine::build(Path::new("/work"), &[]);
        let config = EngineConfig::default();
        let status = resolve_target(&rel, &storage, &ctx, &config, &ignore, Path::new("/work"), None);

        assert_eq!(status, ResolutionStatus::Resolved);
    }

    #[test]
    fn junk_specifier_is_unresolved() {
        let storage = InMemoryStorage::new();
        let source_id = ComponentId(1);
        storage.store(file_component(source_id, "src/a.ts"));
        let rel = bare_relationship(source_id, "RESOLVE:{\nclass: Foo\n}");

        let ctx = ResolutionContext::new();
        let ignore = IgnoreEngine::build(Path::new("/work"), &[]);
        let config = EngineConfig::default();
        let status = resolve_target(&rel, &storage, &ctx, &config, &ignore, Path::new("/work"), None);

        assert_eq!(status, ResolutionStatus::SkippedJunk);
        assert_eq!(ctx.pending_len(), 0);
    }

    #[test]
    fn bare_python_stdlib_module_upserts_a_stdlib_component() {
        let storage = InMemoryStorage::new();
        let source_id = ComponentId(1);
        storage.store(Component { language: Language::Python, ..file_component(source_id, "src/a.py") });
        let rel = bare_relationship(source_id, "RESOLVE:os");

        let ctx = ResolutionContext::new();
        let ignore = IgnoreEngine::build(Path::new("/work"), &[]);
        let config = EngineConfig::default();
        let status = resolve_target(&rel, &storage, &ctx, &config, &ignore, Path::new("/work"), None);

        assert_eq!(status, ResolutionStatus::SkippedStdlib);
    }

    #[test]
    fn unresolved_source_bare_specifier_falls_back_to_workspace_ecosystem() {
        let storage = InMemoryStorage::new();
        let rel = Relationship {
            id: RelationshipId(1),
            source_id: SymbolicId::Symbolic("FILE:src/a.ts".to_string()),
            target_id: SymbolicId::Symbolic("RESOLVE:lodash".to_string()),
            r#type: RelationshipType::ImportsFrom,
            metadata: RelationshipMetadata::default(),
            sources: Vec::new(),
            precedence_level: ParsingLevel::Semantic,
            final_confidence: 1.0,
            aggregation_metadata: AggregationMetadata {
                merged_from_count: 1,
                last_updated: Utc::now(),
                consensus_score: 0.0,
                highest_original_confidence: 1.0,
                lowest_original_confidence: 1.0,
            },
        };

        let ctx = ResolutionContext::new();
        let ignore = IgnoreEngine::build(Path::new("/work"), &[]);
        let config = EngineConfig::default();

        // With no workspace markers, the source's language is unknown (it
        // hasn't resolved this pass) so the bare specifier stays unresolved.
        let status = resolve_target(&rel, &storage, &ctx, &config, &ignore, Path::new("/work"), None);
        assert_eq!(status, ResolutionStatus::Unresolved);

        // A detected npm workspace lets it resolve a pass earlier.
        let status = resolve_target(&rel, &storage, &ctx, &config, &ignore, Path::new("/work"), Some(WorkspaceType::Npm));
        assert_eq!(status, ResolutionStatus::External);
    }

    #[test]
    fn external_upsert_is_idempotent() {
        let storage = InMemoryStorage::new();
        let first = upsert_external_module(&storage, "npm", "lodash");
        let second = upsert_external_module(&storage, "npm", "lodash");
        assert_eq!(first, second);
        assert_eq!(storage.count(), 1);
    }
}
