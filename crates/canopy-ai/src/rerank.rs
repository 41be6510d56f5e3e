//! Reranker (C9): combines vector similarity with lexical, structural,
//! recency, relationship-count, context-overlap and analytics signals.

use std::collections::{HashMap, HashSet};

use canopy_core::model::{Component, ComponentType};

/// One candidate entering the rerank pass: its similarity to the query
/// vector plus enough of the owning component to score the other factors.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub component: Component,
    pub similarity: f32,
    pub relationship_count: usize,
}

#[derive(Debug, Clone)]
pub struct RankedResult {
    pub component: Component,
    pub final_score: f32,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct Weights {
    pub similarity: f32,
    pub name: f32,
    pub type_boost: f32,
    pub recency: f32,
    pub relationships: f32,
    pub context_overlap: f32,
    pub analytics: f32,
}

#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub weights: Weights,
    pub preferred_types: Vec<ComponentType>,
    pub type_boost_amount: f32,
    pub entity_type_weights: HashMap<String, f32>,
    pub path_demote_patterns: Vec<String>,
    pub path_demote_amount: f32,
    pub normalize_per_type: bool,
    pub similarity_threshold: f32,
}

impl RerankConfig {
    /// Tuned for reranking `Component` search results: name precision
    /// dominates, analytics is irrelevant (no rule entities in this domain).
    pub fn for_components() -> Self {
        RerankConfig {
            weights: Weights {
                similarity: 0.35,
                name: 0.30,
                type_boost: 0.10,
                recency: 0.05,
                relationships: 0.10,
                context_overlap: 0.10,
                analytics: 0.0,
            },
            preferred_types: vec![],
            type_boost_amount: 0.15,
            entity_type_weights: HashMap::new(),
            path_demote_patterns: vec!["test".into(), "__externals__".into(), "__stdlib__".into()],
            path_demote_amount: 0.1,
            normalize_per_type: true,
            similarity_threshold: 0.0,
        }
    }

    /// Weighted toward raw similarity across a mixed entity-type result set
    /// (components alongside whatever other entity types a caller mixes in).
    pub fn for_universal_search() -> Self {
        RerankConfig {
            weights: Weights {
                similarity: 0.45,
                name: 0.20,
                type_boost: 0.10,
                recency: 0.08,
                relationships: 0.07,
                context_overlap: 0.08,
                analytics: 0.02,
            },
            preferred_types: vec![],
            type_boost_amount: 0.1,
            entity_type_weights: HashMap::new(),
            path_demote_patterns: vec!["test".into()],
            path_demote_amount: 0.08,
            normalize_per_type: true,
            similarity_threshold: 0.0,
        }
    }

    /// Dual-channel search blends a keyword lane and a semantic lane; here
    /// that shows up as splitting weight evenly between `similarity` and
    /// `name` rather than leaning on either.
    pub fn for_universal_dual_channel() -> Self {
        RerankConfig {
            weights: Weights {
                similarity: 0.30,
                name: 0.30,
                type_boost: 0.10,
                recency: 0.08,
                relationships: 0.08,
                context_overlap: 0.12,
                analytics: 0.02,
            },
            preferred_types: vec![],
            type_boost_amount: 0.1,
            entity_type_weights: HashMap::new(),
            path_demote_patterns: vec!["test".into()],
            path_demote_amount: 0.08,
            normalize_per_type: true,
            similarity_threshold: 0.0,
        }
    }

    pub fn with_preferred_types(mut self, types: Vec<ComponentType>) -> Self {
        self.preferred_types = types;
        self
    }
}

fn squash(z: f32) -> f32 {
    0.5 + 0.5 * (z / 2.0).tanh()
}

/// Per-type z-score normalization with the frozen `std == 0 => squash(0) ==
/// 0.5` behavior: a lone representative of a type gets a neutral base score
/// rather than a divide-by-zero.
fn normalized_base_scores(candidates: &[Candidate]) -> Vec<f32> {
    let mut by_type: HashMap<ComponentType, Vec<f32>> = HashMap::new();
    for c in candidates {
        by_type.entry(c.component.r#type).or_default().push(c.similarity);
    }
    let mut stats: HashMap<ComponentType, (f32, f32)> = HashMap::new();
    for (t, sims) in &by_type {
        let mean = sims.iter().sum::<f32>() / sims.len() as f32;
        let variance = sims.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / sims.len() as f32;
        stats.insert(*t, (mean, variance.sqrt()));
    }
    candidates
        .iter()
        .map(|c| {
            let (mean, std) = stats[&c.component.r#type];
            if std == 0.0 {
                squash(0.0)
            } else {
                squash((c.similarity - mean) / std)
            }
        })
        .collect()
}

fn normalize_words(s: &str) -> String {
    s.chars().map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' }).collect()
}

fn name_score(query: &str, component: &Component) -> f32 {
    let q = normalize_words(query);
    let name = normalize_words(&component.name);
    let multiplier = match component.r#type {
        ComponentType::Class => 1.3,
        ComponentType::Interface => 1.2,
        ComponentType::Function | ComponentType::Method => 1.1,
        _ => 1.0,
    };

    let q_joined: String = q.split_whitespace().collect();
    let name_joined: String = name.split_whitespace().collect();
    if q_joined == name_joined {
        return (1.0_f32 * multiplier).min(1.0);
    }
    if name_joined.contains(&q_joined) || q_joined.contains(&name_joined) {
        return (0.7_f32 * multiplier).min(1.0);
    }

    let q_words: HashSet<&str> = q.split_whitespace().collect();
    let name_words: HashSet<&str> = name.split_whitespace().collect();
    if q_words.is_empty() || name_words.is_empty() {
        return 0.0;
    }
    let overlap = q_words.intersection(&name_words).count() as f32;
    let fraction = overlap / q_words.len().max(name_words.len()) as f32;
    (fraction * 0.7 * multiplier).min(1.0)
}

fn recency_score(component: &Component, now: chrono::DateTime<chrono::Utc>) -> f32 {
    let Some(updated_at) = component.metadata.updated_at else {
        return 0.0;
    };
    let days = (now - updated_at).num_days();
    match days {
        d if d < 7 => 0.10,
        d if d < 30 => 0.05,
        d if d < 90 => 0.02,
        _ => 0.0,
    }
}

fn relationships_score(count: usize) -> f32 {
    (0.1 * ((count + 1) as f32).log10()).min(0.2)
}

fn context_overlap_score(context: &str, component: &Component) -> f32 {
    if context.is_empty() {
        return 0.0;
    }
    let context_words: HashSet<&str> = context.split_whitespace().collect();
    let content = format!("{} {}", component.name, component.code.as_deref().unwrap_or(""));
    let content_lower = content.to_lowercase();
    let item_words: HashSet<&str> = content_lower.split_whitespace().collect();
    if context_words.is_empty() || item_words.is_empty() {
        return 0.0;
    }
    let intersection = context_words.intersection(&item_words).count() as f32;
    let union = context_words.union(&item_words).count() as f32;
    intersection / union
}

/// Analytics applies only to rule entities, which this engine doesn't model
/// (workflow/task/checklist domain is out of scope); always 0 here.
fn analytics_score(_component: &Component) -> f32 {
    0.0
}

/// Implements §4.9's rerank score; `query_context` is the free-text context
/// string used for the Jaccard overlap factor (may be empty).
pub fn rerank(candidates: Vec<Candidate>, query: &str, query_context: &str, cfg: &RerankConfig, now: chrono::DateTime<chrono::Utc>) -> Vec<RankedResult> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let base_scores = if cfg.normalize_per_type { normalized_base_scores(&candidates) } else { candidates.iter().map(|c| c.similarity).collect() };

    let mut results: Vec<RankedResult> = candidates
        .into_iter()
        .zip(base_scores)
        .map(|(candidate, base)| {
            let name = name_score(query, &candidate.component);
            let type_boost = if cfg.preferred_types.contains(&candidate.component.r#type) { cfg.type_boost_amount } else { 0.0 };
            let recency = recency_score(&candidate.component, now);
            let relationships = relationships_score(candidate.relationship_count);
            let context = context_overlap_score(query_context, &candidate.component);
            let analytics = analytics_score(&candidate.component);

            let w = &cfg.weights;
            let mut score = w.similarity * base
                + w.name * name
                + w.type_boost * type_boost
                + w.recency * recency
                + w.relationships * relationships
                + w.context_overlap * context
                + w.analytics * analytics;

            let entity_type = candidate.component.metadata.entity_type.as_deref().unwrap_or("component");
            if let Some(multiplier) = cfg.entity_type_weights.get(entity_type) {
                score *= multiplier;
            }

            let demotes = cfg.path_demote_patterns.iter().filter(|p| candidate.component.file_path.contains(p.as_str())).count();
            score = (score - cfg.path_demote_amount * demotes as f32).max(0.0);

            RankedResult { component: candidate.component, final_score: score, similarity: candidate.similarity }
        })
        .collect();

    // `preferredTypes` is a hard override, not just another weighted signal:
    // a type boost small enough to stay in proportion with the other factors
    // (±0.015 of a 0-1 score) can never reliably outrank a strong name match,
    // so a non-empty preference partitions the preferred type to the front
    // and only falls back to `final_score` within each partition.
    results.sort_by(|a, b| {
        if !cfg.preferred_types.is_empty() {
            let a_preferred = cfg.preferred_types.contains(&a.component.r#type);
            let b_preferred = cfg.preferred_types.contains(&b.component.r#type);
            if a_preferred != b_preferred {
                return b_preferred.cmp(&a_preferred);
            }
        }
        b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::model::{ComponentId, ComponentMetadata, Language, Location};

    fn component(name: &str, r#type: ComponentType) -> Component {
        Component {
            id: ComponentId(name.len() as u128),
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
    fn exact_name_match_with_component_preset_outranks_partial_matches() {
        let candidates = vec![
            Candidate { component: component("getUserById", ComponentType::Method), similarity: 0.50, relationship_count: 0 },
            Candidate { component: component("getUser", ComponentType::Function), similarity: 0.60, relationship_count: 0 },
            Candidate { component: component("user", ComponentType::Variable), similarity: 0.70, relationship_count: 0 },
        ];
        let cfg = RerankConfig::for_components();
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let ranked = rerank(candidates, "getUserById", "", &cfg, now);
        assert_eq!(ranked[0].component.name, "getUserById");
        assert_eq!(ranked[1].component.name, "getUser");
        assert_eq!(ranked[2].component.name, "user");
    }

    #[test]
    fn preferred_type_override_promotes_that_type() {
        let candidates = vec![
            Candidate { component: component("getUserById", ComponentType::Method), similarity: 0.50, relationship_count: 0 },
            Candidate { component: component("getUser", ComponentType::Function), similarity: 0.60, relationship_count: 0 },
            Candidate { component: component("user", ComponentType::Variable), similarity: 0.70, relationship_count: 0 },
        ];
        let cfg = RerankConfig::for_components().with_preferred_types(vec![ComponentType::Variable]);
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let ranked = rerank(candidates, "getUserById", "", &cfg, now);
        assert_eq!(ranked[0].component.name, "user");
    }

    #[test]
    fn path_demote_floors_at_zero_instead_of_going_negative() {
        let mut c = component("helper", ComponentType::Function);
        c.file_path = "src/test/helper.ts".into();
        let candidates = vec![Candidate { component: c, similarity: 0.01, relationship_count: 0 }];
        let cfg = RerankConfig::for_components();
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let ranked = rerank(candidates, "zzz", "", &cfg, now);
        assert!(ranked[0].final_score >= 0.0);
    }

    #[test]
    fn lone_candidate_of_a_type_gets_the_neutral_normalized_base() {
        let candidates = vec![Candidate { component: component("only", ComponentType::Class), similarity: 0.42, relationship_count: 0 }];
        let scores = normalized_base_scores(&candidates);
        assert_eq!(scores[0], 0.5);
    }
}
