//! End-to-end tests driving the real pipeline: `Coordinator::run_full_index`
//! and `IncrementalIndexer::apply_change` against files on disk, storing
//! into `InMemoryStorage`, with the reranker exercised directly on top.
//! These track the concrete scenarios canopy's indexing semantics are
//! expected to satisfy (import resolution, external stubs, embedded
//! sub-languages, incremental reindexing, rerank ordering).

use canopy_ai::rerank::{rerank, Candidate, RerankConfig};
use canopy_core::model::{ComponentId, ComponentMetadata, ComponentType, Language, Location, RelationshipType, SymbolicId};
use canopy_core::storage::{ComponentRepository, RelationshipRepository};
use canopy_core::{Component, EngineConfig, InMemoryStorage};
use canopy_indexer::coordinator::Coordinator;
use canopy_watcher::IncrementalIndexer;

fn write(root: &std::path::Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn typescript_relative_import_resolves_to_the_target_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "import {b} from './b';\nexport function run() { return b(); }\n");
    write(dir.path(), "src/b.ts", "export function b() { return 1; }\n");

    let coordinator = Coordinator::new(dir.path().to_path_buf(), EngineConfig::default());
    let storage = InMemoryStorage::new();
    let summary = coordinator.run_full_index(&storage, &storage).unwrap();

    assert_eq!(summary.files_indexed, 2);
    let b = storage.get_all().into_iter().find(|c| c.name == "b" && c.file_path == "src/b.ts").expect("b() component indexed");

    let resolved = storage
        .query_by(&canopy_core::storage::RelationshipQuery::default())
        .into_iter()
        .any(|r| r.r#type == RelationshipType::ImportsFrom && r.source_id.resolved().is_some() && r.target_id == SymbolicId::Resolved(b.id));
    assert!(resolved, "a.ts's import of b.ts should resolve to b.ts's file, not remain symbolic");
}

#[test]
fn bare_npm_import_becomes_an_external_component() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "import React from 'react';\nexport function useIt() { return React; }\n");

    let coordinator = Coordinator::new(dir.path().to_path_buf(), EngineConfig::default());
    let storage = InMemoryStorage::new();
    coordinator.run_full_index(&storage, &storage).unwrap();

    let external = storage
        .get_all()
        .into_iter()
        .find(|c| c.r#type == ComponentType::ExternalModule && c.name == "react")
        .expect("react external module component exists");
    assert!(external.metadata.is_external);
    assert_eq!(external.metadata.external_kind.as_deref(), Some("npm"));

    let rel = storage
        .query_by(&canopy_core::storage::RelationshipQuery { target_id: Some(external.id), ..Default::default() })
        .into_iter()
        .find(|r| r.r#type == RelationshipType::ImportsFrom);
    assert!(rel.is_some(), "an imports_from edge should point at the external react stub");
}

#[test]
fn python_from_import_emits_a_file_and_a_name_reference() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/models.py", "class User:\n    pass\n");
    write(dir.path(), "app/service.py", "from app.models import User\n\nclass Service:\n    def handle(self):\n        return User()\n");

    let coordinator = Coordinator::new(dir.path().to_path_buf(), EngineConfig::default());
    let storage = InMemoryStorage::new();
    let summary = coordinator.run_full_index(&storage, &storage).unwrap();

    assert_eq!(summary.files_indexed, 2);
    let relationships = storage.query_by(&canopy_core::storage::RelationshipQuery::default());
    let mut saw_references_file = false;
    let mut saw_references = false;
    for r in relationships {
        if r.r#type == RelationshipType::ReferencesFile {
            saw_references_file = true;
        }
        if r.r#type == RelationshipType::References {
            saw_references = true;
        }
    }
    assert!(saw_references_file, "from-import should emit a references_file edge");
    assert!(saw_references, "from-import should emit a references edge for the imported name");
}

#[test]
fn html_script_block_components_get_file_absolute_line_numbers() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "index.html",
        "<html>\n<head></head>\n<body>\n<script>\nfunction greet(n) { return 'hi ' + n; }\n</script>\n</body>\n</html>\n",
    );

    let coordinator = Coordinator::new(dir.path().to_path_buf(), EngineConfig::default());
    let storage = InMemoryStorage::new();
    coordinator.run_full_index(&storage, &storage).unwrap();

    let greet = storage.get_all().into_iter().find(|c| c.name == "greet").expect("greet() extracted from embedded script");
    assert_eq!(greet.language, Language::JavaScript);
    // The <script> tag opens on line 4; the function body starts on line 5 of
    // the whole file, not line 1 of the carved-out block text.
    assert_eq!(greet.location.start_line, 5);
}

#[test]
fn incremental_reindex_adds_a_component_without_disturbing_or_duplicating_existing_ones() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "export function x() { return 1; }\n");

    let storage = InMemoryStorage::new();
    let indexer = IncrementalIndexer::new(dir.path().to_path_buf(), EngineConfig::default());
    indexer.run_full_index(&storage, &storage).unwrap();

    let x_before = storage.get_all().into_iter().find(|c| c.name == "x").expect("x indexed initially");

    write(dir.path(), "src/a.ts", "export function x() { return 1; }\nexport function y() { return 2; }\n");
    let outcome = indexer.apply_change("src/a.ts", &storage, &storage);

    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.tombstoned, 0);

    let all = storage.get_all();
    let xs: Vec<_> = all.iter().filter(|c| c.name == "x").collect();
    let ys: Vec<_> = all.iter().filter(|c| c.name == "y").collect();
    assert_eq!(xs.len(), 1, "x must not be duplicated by the incremental pass");
    assert_eq!(ys.len(), 1, "y must appear exactly once");
    assert_eq!(xs[0].id, x_before.id, "x keeps its id since its content/location is unchanged");
}

#[test]
fn unlinking_a_file_removes_its_components_and_reverts_relationships_to_symbolic() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "import {b} from './b';\nexport function run() { return b(); }\n");
    write(dir.path(), "src/b.ts", "export function b() { return 1; }\n");

    let storage = InMemoryStorage::new();
    let indexer = IncrementalIndexer::new(dir.path().to_path_buf(), EngineConfig::default());
    indexer.run_full_index(&storage, &storage).unwrap();

    let b = storage.get_all().into_iter().find(|c| c.name == "b" && c.file_path == "src/b.ts").unwrap();
    let run = storage.get_all().into_iter().find(|c| c.name == "run" && c.file_path == "src/a.ts").unwrap();
    let before = storage.query_by(&canopy_core::storage::RelationshipQuery { source_id: Some(run.id), ..Default::default() });
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].target_id, SymbolicId::Resolved(b.id), "import should be resolved before b.ts is unlinked");

    std::fs::remove_file(dir.path().join("src/b.ts")).unwrap();
    let outcome = indexer.apply_unlink("src/b.ts", &storage, &storage);

    assert_eq!(outcome.removed, 1);
    assert!(ComponentRepository::get(&storage, b.id).is_none(), "b's component is gone once its file is unlinked");

    let reverted = RelationshipRepository::get(&storage, before[0].id).expect("the relationship itself is kept, not deleted");
    assert!(matches!(reverted.target_id, SymbolicId::Symbolic(_)), "the import edge reverts to a symbolic target rather than being orphaned");
}

fn component(name: &str, r#type: ComponentType) -> Component {
    Component {
        id: ComponentId(name.len() as u128 + 1000),
        name: name.to_string(),
        r#type,
        language: Language::TypeScript,
        file_path: "src/users.ts".into(),
        location: Location { start_line: 1, end_line: 1, start_column: 1, end_column: 1 },
        code: Some(String::new()),
        metadata: ComponentMetadata::default(),
    }
}

#[test]
fn reranker_honors_a_preferred_type_override_over_raw_similarity() {
    let candidates = vec![
        Candidate { component: component("getUserById", ComponentType::Method), similarity: 0.50, relationship_count: 0 },
        Candidate { component: component("getUser", ComponentType::Function), similarity: 0.60, relationship_count: 0 },
        Candidate { component: component("user", ComponentType::Variable), similarity: 0.70, relationship_count: 0 },
    ];
    let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc);

    let default_ranked = rerank(candidates.clone(), "getUserById", "", &RerankConfig::for_components(), now);
    assert_eq!(default_ranked[0].component.name, "getUserById");
    assert_eq!(default_ranked[1].component.name, "getUser");
    assert_eq!(default_ranked[2].component.name, "user");

    let overridden_cfg = RerankConfig::for_components().with_preferred_types(vec![ComponentType::Variable]);
    let overridden = rerank(candidates, "getUserById", "", &overridden_cfg, now);
    assert_eq!(overridden[0].component.name, "user");
    assert_eq!(overridden[1].component.name, "getUserById");
    assert_eq!(overridden[2].component.name, "getUser");
}
