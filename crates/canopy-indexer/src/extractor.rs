//! Language extractor trait (C4) shared by every `languages::*` module.

use canopy_core::{
    Component, ComponentId, ComponentIdFactory, ComponentMetadata, ComponentType, Language, Location,
    ParsingLevel, RelationshipType, SymbolicId,
};

/// Non-fatal condition recorded alongside an extraction result; see §7
/// `ParseWarning`.
#[derive(Debug, Clone)]
pub struct ParseWarning {
    pub message: String,
}

/// Fatal-to-the-block condition; the file still emits a `file` component and
/// relationships found before the error are kept (§7 `ParseError`).
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
}

/// A provisional relationship emitted by a parser. The target may be a
/// symbolic reference (`RESOLVE:`, `EXTERNAL:`, `CLASS:`, `MODULE:`, `FILE:`)
/// that the resolver (C7) rewrites later.
#[derive(Debug, Clone)]
pub struct ProvisionalRelationship {
    pub source: SymbolicId,
    pub target: SymbolicId,
    pub r#type: RelationshipType,
    pub confidence: f32,
    pub import_kind: Option<String>,
    pub imported_name: Option<String>,
}

impl ProvisionalRelationship {
    pub fn new(source: SymbolicId, target: SymbolicId, r#type: RelationshipType) -> Self {
        ProvisionalRelationship {
            source,
            target,
            r#type,
            confidence: 1.0,
            import_kind: None,
            imported_name: None,
        }
    }

    pub fn resolve(target: &str) -> SymbolicId {
        SymbolicId::Symbolic(target.to_string())
    }
}

/// `{components, relationships, errors, warnings, metadata}` per §4.4's
/// behavioral contract shared by every parser.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub components: Vec<Component>,
    pub relationships: Vec<ProvisionalRelationship>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
    /// Stamped by [`crate::registry::ParserRegistry`] with whichever
    /// extractor actually produced this result, so the aggregator (C6) can
    /// weight every relationship by the level that found it.
    pub parsing_level: ParsingLevel,
}

impl ExtractionResult {
    pub fn merge(&mut self, other: ExtractionResult) {
        self.components.extend(other.components);
        self.relationships.extend(other.relationships);
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Capabilities a parser declares about itself (§4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserCapabilities {
    pub symbols: bool,
    pub relationships: bool,
    pub ranges: bool,
    pub types: bool,
    pub control_flow: bool,
    pub incremental: bool,
}

/// Parsers never touch the filesystem; they are pure on `(text, path, stack)`.
///
/// `language_stack` bounds re-entrance into delegated sub-languages (HTML→JS,
/// Markdown→fenced code): max depth 4, cycles rejected by the registry before
/// the parser is ever invoked.
/// Builds a [`Component`] with `parsing_level` already stamped into its
/// metadata; every `languages::*` extractor goes through this instead of
/// constructing the struct literal by hand.
#[allow(clippy::too_many_arguments)]
pub fn new_component(
    id: ComponentId,
    name: impl Into<String>,
    r#type: ComponentType,
    language: Language,
    project_relative_path: &str,
    location: Location,
    code: Option<String>,
    parsing_level: ParsingLevel,
) -> Component {
    Component {
        id,
        name: name.into(),
        r#type,
        language,
        file_path: project_relative_path.to_string(),
        location,
        code,
        metadata: ComponentMetadata { parsing_level, ..Default::default() },
    }
}

/// 1-based, end-exclusive location from a tree-sitter node's `start_position`/`end_position`.
pub fn node_location(node: tree_sitter::Node) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location {
        start_line: start.row as u32 + 1,
        end_line: end.row as u32 + 1,
        start_column: start.column as u32 + 1,
        end_column: end.column as u32 + 1,
    }
}

pub trait LanguageExtractor: Send + Sync {
    fn parsing_level(&self) -> ParsingLevel;
    fn capabilities(&self) -> ParserCapabilities;

    /// `text` is this block's content; `project_relative_path` is the whole
    /// file's path (components carry absolute, file-wide coordinates — the
    /// registry translates block-local offsets before calling this).
    fn extract(
        &self,
        project_relative_path: &str,
        text: &str,
        ids: &mut ComponentIdFactory,
    ) -> ExtractionResult;
}
