//! Relationship Aggregator (C6): merges provisional edges sharing
//! `(sourceId, targetId, type)` into one canonical relationship with combined
//! provenance and confidence.

use std::collections::HashMap;

use chrono::Utc;

use crate::fingerprint::relationship_key_hash;
use crate::model::{
    AggregationMetadata, ParsingLevel, Relationship, RelationshipId, RelationshipMetadata,
    RelationshipSource, RelationshipType, SymbolicId,
};

fn level_weight(level: ParsingLevel) -> f32 {
    match level {
        ParsingLevel::Semantic => 1.0,
        ParsingLevel::Structural => 0.85,
        ParsingLevel::Basic => 0.65,
        ParsingLevel::Initial => 0.55,
    }
}

/// A single provisional edge as emitted by a parser, before aggregation.
#[derive(Debug)]
pub struct ProvisionalEdge {
    pub source_id: SymbolicId,
    pub target_id: SymbolicId,
    pub r#type: RelationshipType,
    pub confidence: f32,
    pub metadata: RelationshipMetadata,
    pub producer_metadata: HashMap<String, String>,
    pub origin: String,
}

/// Process-wide singleton (owned by the indexer, guarded by a mutex at the
/// call site) keyed by `(sourceId, targetId, type)`.
#[derive(Default)]
pub struct Aggregator {
    entries: HashMap<String, Relationship>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(source: &SymbolicId, target: &SymbolicId, r#type: RelationshipType) -> String {
        format!("{source}|{target}|{type:?}")
    }

    /// `add(batch, level, producerMeta)`.
    pub fn add(&mut self, batch: Vec<ProvisionalEdge>, level: ParsingLevel) {
        for edge in batch {
            self.add_one(edge, level);
        }
    }

    fn add_one(&mut self, edge: ProvisionalEdge, level: ParsingLevel) {
        let key = Self::key(&edge.source_id, &edge.target_id, edge.r#type);
        let now = Utc::now();

        match self.entries.get_mut(&key) {
            None => {
                let id = RelationshipId(relationship_key_hash(
                    &edge.source_id.to_string(),
                    &edge.target_id.to_string(),
                    &format!("{:?}", edge.r#type),
                ));
                let confidence = (level_weight(level) * edge.confidence).clamp(0.0, 1.0);
                self.entries.insert(
                    key,
                    Relationship {
                        id,
                        source_id: edge.source_id,
                        target_id: edge.target_id,
                        r#type: edge.r#type,
                        metadata: edge.metadata,
                        sources: vec![RelationshipSource {
                            origin: edge.origin,
                            confidence: edge.confidence,
                            timestamp: now,
                            producer_metadata: edge.producer_metadata,
                        }],
                        precedence_level: level,
                        final_confidence: confidence,
                        aggregation_metadata: AggregationMetadata {
                            merged_from_count: 1,
                            last_updated: now,
                            consensus_score: 0.0,
                            highest_original_confidence: edge.confidence,
                            lowest_original_confidence: edge.confidence,
                        },
                    },
                );
            }
            Some(existing) => {
                // A source is the same piece of evidence re-submitted (not a
                // second, independent confirmation) when it shares its
                // producer's origin and confidence with one already merged
                // in — re-adding an identical batch must be a no-op so
                // `add(batch); add(batch)` converges to exactly `add(batch)`,
                // not a higher consensus bonus from counting the same
                // evidence twice.
                let already_present = existing
                    .sources
                    .iter()
                    .any(|s| s.origin == edge.origin && s.confidence == edge.confidence);
                if already_present {
                    return;
                }
                existing.sources.push(RelationshipSource {
                    origin: edge.origin,
                    confidence: edge.confidence,
                    timestamp: now,
                    producer_metadata: edge.producer_metadata,
                });
                existing.precedence_level = existing.precedence_level.max(level);
                merge_metadata(&mut existing.metadata, &edge.metadata);
                recompute_confidence(existing);
            }
        }
    }

    /// `getAll({confidenceThreshold, keyOrdering})`: sorted snapshot, filtered
    /// below `confidence_threshold`.
    pub fn get_all(&self, confidence_threshold: f32) -> Vec<Relationship> {
        let mut out: Vec<Relationship> = self
            .entries
            .values()
            .filter(|r| r.final_confidence >= confidence_threshold)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.source_id.to_string(), a.target_id.to_string())
                .cmp(&(b.source_id.to_string(), b.target_id.to_string()))
        });
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recomputes `finalConfidence` per the aggregation formula:
///
/// `finalConfidence = clamp(0, 1, levelWeight[level] × max(sources.confidence) × (1 + consensusBonus) × timeDecay)`
fn recompute_confidence(rel: &mut Relationship) {
    let n = rel.sources.len() as f32;
    let max_conf = rel
        .sources
        .iter()
        .map(|s| s.confidence)
        .fold(0.0_f32, f32::max);
    let min_conf = rel
        .sources
        .iter()
        .map(|s| s.confidence)
        .fold(1.0_f32, f32::min);
    let newest = rel.sources.iter().map(|s| s.timestamp).max().unwrap();
    let days_since_newest = (Utc::now() - newest).num_milliseconds() as f32 / 86_400_000.0;
    let time_decay = (1.0 - days_since_newest / 365.0).max(0.5);
    let consensus_bonus = 0.15 * ((n - 1.0) / n);

    rel.final_confidence =
        (level_weight(rel.precedence_level) * max_conf * (1.0 + consensus_bonus) * time_decay)
            .clamp(0.0, 1.0);

    rel.aggregation_metadata = AggregationMetadata {
        merged_from_count: rel.sources.len() as u32,
        last_updated: Utc::now(),
        consensus_score: consensus_bonus,
        highest_original_confidence: max_conf,
        lowest_original_confidence: min_conf,
    };
}

/// Shallow merge preferring the highest-precedence (most recently applied)
/// source's values.
fn merge_metadata(into: &mut RelationshipMetadata, from: &RelationshipMetadata) {
    macro_rules! prefer_incoming {
        ($field:ident) => {
            if from.$field.is_some() {
                into.$field = from.$field.clone();
            }
        };
    }
    prefer_incoming!(import_kind);
    prefer_incoming!(imported_name);
    prefer_incoming!(specifier);
    prefer_incoming!(resolved_path);
    prefer_incoming!(resolution_method);
    prefer_incoming!(resolution_error);
    prefer_incoming!(external_kind);
    prefer_incoming!(resolved_from);
    prefer_incoming!(original_target);
    into.is_external = into.is_external || from.is_external;
    into.needs_resolution = into.needs_resolution || from.needs_resolution;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(conf: f32, origin: &str) -> ProvisionalEdge {
        ProvisionalEdge {
            source_id: SymbolicId::Symbolic("a".into()),
            target_id: SymbolicId::Symbolic("b".into()),
            r#type: RelationshipType::Calls,
            confidence: conf,
            metadata: RelationshipMetadata::default(),
            producer_metadata: HashMap::new(),
            origin: origin.into(),
        }
    }

    #[test]
    fn single_source_uses_level_weight_times_confidence() {
        let mut agg = Aggregator::new();
        agg.add(vec![edge(0.9, "ts-semantic")], ParsingLevel::Semantic);
        let all = agg.get_all(0.0);
        assert_eq!(all.len(), 1);
        assert!((all[0].final_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn merging_never_downgrades_precedence_level() {
        let mut agg = Aggregator::new();
        agg.add(vec![edge(0.9, "semantic")], ParsingLevel::Semantic);
        agg.add(vec![edge(0.95, "basic")], ParsingLevel::Basic);
        let all = agg.get_all(0.0);
        assert_eq!(all[0].precedence_level, ParsingLevel::Semantic);
    }

    #[test]
    fn merged_confidence_is_at_least_best_single_source_times_its_weight() {
        let mut agg = Aggregator::new();
        agg.add(vec![edge(0.6, "a"), edge(0.9, "b")], ParsingLevel::Semantic);
        let all = agg.get_all(0.0);
        assert!(all[0].final_confidence >= level_weight(ParsingLevel::Semantic) * 0.9);
    }

    #[test]
    fn idempotent_add_of_identical_batch_converges() {
        let mut agg = Aggregator::new();
        let batch = || vec![edge(0.8, "x")];
        agg.add(batch(), ParsingLevel::Semantic);
        let once = agg.get_all(0.0)[0].final_confidence;
        let sources_once = agg.get_all(0.0)[0].sources.len();
        agg.add(batch(), ParsingLevel::Semantic);
        let all_twice = agg.get_all(0.0);
        // Re-adding the identical batch is a no-op: same source count, same
        // final confidence, not a second "independent" confirmation.
        assert_eq!(all_twice[0].sources.len(), sources_once);
        assert_eq!(all_twice[0].final_confidence, once);
    }

    #[test]
    fn distinct_sources_for_the_same_edge_do_raise_consensus() {
        let mut agg = Aggregator::new();
        agg.add(vec![edge(0.8, "x")], ParsingLevel::Semantic);
        let once = agg.get_all(0.0)[0].final_confidence;
        agg.add(vec![edge(0.8, "y")], ParsingLevel::Semantic);
        let twice = agg.get_all(0.0)[0].final_confidence;
        assert!(twice >= once);
        assert_eq!(agg.get_all(0.0)[0].sources.len(), 2);
    }
}
