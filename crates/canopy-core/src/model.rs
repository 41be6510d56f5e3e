//! Core data structures for the component/relationship graph.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable, content/location-derived identifier for a component. See [`crate::fingerprint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u128);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Stable identifier for a relationship, derived from its `(sourceId, targetId, type)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u128);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Discriminates what kind of code entity a component represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Class,
    Interface,
    Struct,
    Enum,
    Method,
    Function,
    Property,
    Field,
    Event,
    Namespace,
    Module,
    File,
    Variable,
    Comment,
    Section,
    Import,
    ExternalModule,
    StdlibSymbol,
    Generic,
    Unknown,
}

/// Supported languages for detection and parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    C,
    Cpp,
    Php,
    Html,
    Css,
    Markdown,
    Shell,
    Makefile,
    Dockerfile,
    Yaml,
    Toml,
    Json,
    Sql,
    PlainText,
}

/// A line/column span within a single file. `end_line`/`end_column` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
}

/// The quality tier a component or relationship was produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParsingLevel {
    Initial,
    Basic,
    Structural,
    #[default]
    Semantic,
}

/// The closed set of well-known metadata keys (see design notes on the
/// tagged-union model for parser metadata), plus a catch-all `extra` map for
/// parser-specific fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub parameters: Option<Vec<String>>,
    pub return_type: Option<String>,
    pub accessibility: Option<String>,
    pub is_static: bool,
    pub documentation: Option<String>,
    pub attributes: Vec<String>,
    pub parsing_level: ParsingLevel,
    pub backend: Option<String>,
    pub is_external: bool,
    pub external_kind: Option<String>,
    pub registry_url: Option<String>,
    pub docs_url: Option<String>,
    pub content_hash: Option<u128>,
    pub updated_at: Option<DateTime<Utc>>,
    pub entity_type: Option<String>,
    /// Set by the watcher (§4.10) when a re-parse no longer produces this
    /// component; cleared if it reappears. Actually removed once the grace
    /// period elapses with no remaining reference to it.
    pub tombstoned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// One code entity extracted from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub r#type: ComponentType,
    pub language: Language,
    /// Project-relative POSIX path. `__externals__/<eco>/<name>` or
    /// `__stdlib__/<lang>/<name>` for externals.
    pub file_path: String,
    pub location: Location,
    pub code: Option<String>,
    pub metadata: ComponentMetadata,
}

impl Component {
    pub fn is_external(&self) -> bool {
        self.metadata.is_external
    }
}

/// The kind of directed edge between two components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Contains,
    ImportsFrom,
    Exports,
    Calls,
    Uses,
    References,
    ReferencesFile,
    Extends,
    Implements,
    InNamespace,
    FlowsTo,
    Includes,
    DependsOn,
    Copies,
}

/// Free-form but closed metadata bag for a relationship.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    pub import_kind: Option<String>,
    pub imported_name: Option<String>,
    pub specifier: Option<String>,
    pub resolved_path: Option<String>,
    pub resolution_method: Option<String>,
    pub resolution_error: Option<String>,
    pub is_external: bool,
    pub external_kind: Option<String>,
    pub needs_resolution: bool,
    pub resolved_from: Option<String>,
    /// Preserved symbolic target (`RESOLVE:...`/`EXTERNAL:...`) from before resolution.
    pub original_target: Option<String>,
}

/// Where a single provisional edge came from, before aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSource {
    pub origin: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub producer_metadata: HashMap<String, String>,
}

/// Provenance summary recomputed on every merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationMetadata {
    pub merged_from_count: u32,
    pub last_updated: DateTime<Utc>,
    pub consensus_score: f32,
    pub highest_original_confidence: f32,
    pub lowest_original_confidence: f32,
}

/// Either a concrete, resolved component id, or a symbolic target awaiting resolution
/// (`RESOLVE:./a`, `EXTERNAL:pkg`, `CLASS:Name`, `MODULE:a.b.c`, `FILE:/abs/path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolicId {
    Resolved(ComponentId),
    Symbolic(String),
}

impl SymbolicId {
    pub fn resolved(&self) -> Option<ComponentId> {
        match self {
            SymbolicId::Resolved(id) => Some(*id),
            SymbolicId::Symbolic(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SymbolicId::Resolved(_))
    }
}

impl fmt::Display for SymbolicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicId::Resolved(id) => write!(f, "{id}"),
            SymbolicId::Symbolic(s) => write!(f, "{s}"),
        }
    }
}

/// A canonical, aggregated directed edge between two components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source_id: SymbolicId,
    pub target_id: SymbolicId,
    pub r#type: RelationshipType,
    pub metadata: RelationshipMetadata,
    pub sources: Vec<RelationshipSource>,
    pub precedence_level: ParsingLevel,
    pub final_confidence: f32,
    pub aggregation_metadata: AggregationMetadata,
}

/// `(entityId, entityType, vector, modelVersion, contentHash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub entity_id: ComponentId,
    pub entity_type: String,
    pub vector: Vec<f32>,
    pub model_version: String,
    pub content_hash: u128,
}
