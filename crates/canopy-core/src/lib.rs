//! Canopy Core — the component/relationship data model, the in-memory graph
//! and storage adapters, the relationship aggregator, and the small
//! filesystem-facing utilities (fingerprinting, path normalization, ignore
//! matching, configuration) shared by every other crate in the workspace.

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod graph;
pub mod ignore_engine;
pub mod model;
pub mod path_utils;
pub mod resolution;
pub mod storage;
pub mod workspace;

pub use aggregation::{Aggregator, ProvisionalEdge};
pub use config::EngineConfig;
pub use fingerprint::{content_hash, normalize_code, ComponentIdFactory};
pub use graph::Graph;
pub use ignore_engine::IgnoreEngine;
pub use model::{
    AggregationMetadata, Component, ComponentId, ComponentMetadata, ComponentType, EmbeddingRow,
    Language, Location, ParsingLevel, Relationship, RelationshipId, RelationshipMetadata,
    RelationshipSource, RelationshipType, SymbolicId,
};
pub use resolution::{process_in_batches, PendingUpdate, ResolutionContext, ResolutionStatus};
pub use storage::{
    ComponentQuery, ComponentRepository, EmbeddingRepository, InMemoryStorage, Page, RelationshipQuery,
    RelationshipRepository, SimilarityMatch,
};
pub use workspace::{detect_workspace, WorkspaceType};
