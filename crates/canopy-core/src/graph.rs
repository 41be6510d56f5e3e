//! In-memory graph: the reference implementation of the three storage
//! repositories (components, relationships, embeddings) from `storage.rs`.
//!
//! Unlike the teacher's index-keyed `Graph`, lookups are keyed by the stable
//! [`ComponentId`]/`(sourceId, targetId, type)`; petgraph indices are an
//! internal implementation detail hidden behind `HashMap`s so components and
//! relationships keep their identity across inserts, removals, and re-parses.

use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::model::{Component, ComponentId, Relationship, RelationshipId, RelationshipType, SymbolicId};

/// The in-memory component/relationship graph for one project.
///
/// A relationship with at least one [`SymbolicId::Symbolic`] endpoint can't
/// live as a petgraph edge (both endpoints must be known node indices), so it
/// sits in `pending` until the resolver rewrites it; once both endpoints are
/// resolved components it's promoted into `inner`.
pub struct Graph {
    inner: StableDiGraph<Component, Relationship>,
    by_id: HashMap<ComponentId, NodeIndex>,
    by_file: HashMap<String, Vec<ComponentId>>,
    pending: HashMap<RelationshipId, Relationship>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("component_count", &self.inner.node_count())
            .field("relationship_count", &(self.inner.edge_count() + self.pending.len()))
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            inner: StableDiGraph::new(),
            by_id: HashMap::new(),
            by_file: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Inserts or replaces a component, keeping its stable id as the lookup key.
    pub fn upsert_component(&mut self, component: Component) -> ComponentId {
        let id = component.id;
        let file = component.file_path.clone();
        if let Some(&idx) = self.by_id.get(&id) {
            self.inner[idx] = component;
        } else {
            let idx = self.inner.add_node(component);
            self.by_id.insert(id, idx);
        }
        self.by_file.entry(file).or_default().push(id);
        id
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.by_id.get(&id).and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.by_id
            .get(&id)
            .copied()
            .and_then(move |idx| self.inner.node_weight_mut(idx))
    }

    pub fn components_in_file(&self, file_path: &str) -> Vec<&Component> {
        self.by_file
            .get(file_path)
            .into_iter()
            .flatten()
            .filter_map(|id| self.component(*id))
            .collect()
    }

    /// Removes a component and every relationship touching it. Returns the
    /// removed component, if present.
    pub fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        let idx = self.by_id.remove(&id)?;
        let removed = self.inner.remove_node(idx);
        if let Some(component) = &removed {
            if let Some(list) = self.by_file.get_mut(&component.file_path) {
                list.retain(|cid| *cid != id);
            }
        }
        removed
    }

    pub fn component_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.edge_count() + self.pending.len()
    }

    pub fn all_components(&self) -> impl Iterator<Item = &Component> {
        self.inner.node_weights()
    }

    pub fn all_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.inner.edge_weights().chain(self.pending.values())
    }

    fn edge_index_of(&self, id: RelationshipId) -> Option<petgraph::stable_graph::EdgeIndex> {
        self.inner.edge_indices().find(|&e| self.inner[e].id == id)
    }

    /// Looks up a relationship wherever it's stored, resolved edge or pending.
    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.pending.get(&id).or_else(|| self.edge_index_of(id).map(|e| &self.inner[e]))
    }

    /// Adds a relationship, promoting it straight to a graph edge if both
    /// endpoints are already-known resolved components; otherwise it sits in
    /// `pending` until the resolver (or a later call here) completes it.
    pub fn add_relationship(&mut self, relationship: Relationship) {
        let endpoints = relationship
            .source_id
            .resolved()
            .zip(relationship.target_id.resolved())
            .and_then(|(s, t)| self.by_id.get(&s).zip(self.by_id.get(&t)).map(|(&s, &t)| (s, t)));
        match endpoints {
            Some((source_idx, target_idx)) => {
                self.inner.add_edge(source_idx, target_idx, relationship);
            }
            None => {
                self.pending.insert(relationship.id, relationship);
            }
        }
    }

    /// Removes a relationship outright, wherever it lives.
    pub fn remove_relationship(&mut self, id: RelationshipId) -> Option<Relationship> {
        if let Some(r) = self.pending.remove(&id) {
            return Some(r);
        }
        self.edge_index_of(id).and_then(|e| self.inner.remove_edge(e))
    }

    /// Reverts one endpoint back to its pre-resolution symbolic form,
    /// demoting the relationship from a graph edge to pending if needed.
    /// Returns `false` if the relationship isn't found.
    pub fn revert_endpoint(&mut self, id: RelationshipId, is_target: bool, symbolic: String) -> bool {
        let mut relationship = match self.pending.remove(&id) {
            Some(r) => r,
            None => match self.edge_index_of(id).and_then(|e| self.inner.remove_edge(e)) {
                Some(r) => r,
                None => return false,
            },
        };
        if is_target {
            relationship.target_id = SymbolicId::Symbolic(symbolic);
            relationship.metadata.original_target = None;
        } else {
            relationship.source_id = SymbolicId::Symbolic(symbolic);
            relationship.metadata.resolved_from = None;
        }
        self.pending.insert(id, relationship);
        true
    }

    pub fn relationships_from(&self, source: ComponentId) -> impl Iterator<Item = &Relationship> {
        let idx = self.by_id.get(&source).copied();
        let from_edges = idx.into_iter().flat_map(move |idx| {
            self.inner
                .edges_directed(idx, Direction::Outgoing)
                .filter_map(move |edge_ref| self.inner.edge_weight(edge_ref.id()))
        });
        let from_pending = self.pending.values().filter(move |r| r.source_id.resolved() == Some(source));
        from_edges.chain(from_pending)
    }

    pub fn relationships_to(&self, target: ComponentId) -> impl Iterator<Item = &Relationship> {
        let idx = self.by_id.get(&target).copied();
        let to_edges = idx.into_iter().flat_map(move |idx| {
            self.inner
                .edges_directed(idx, Direction::Incoming)
                .filter_map(move |edge_ref| self.inner.edge_weight(edge_ref.id()))
        });
        let to_pending = self.pending.values().filter(move |r| r.target_id.resolved() == Some(target));
        to_edges.chain(to_pending)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ComponentId> {
        self.inner
            .node_weights()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Ancestors of `node` following `Contains` relationships.
    pub fn containing_chain(&self, node: ComponentId) -> Vec<ComponentId> {
        let mut chain = Vec::new();
        let mut current = node;
        while let Some(parent) = self
            .relationships_to(current)
            .find(|r| r.r#type == RelationshipType::Contains)
            .and_then(|r| r.source_id.resolved())
        {
            chain.push(parent);
            if parent == current {
                break;
            }
            current = parent;
        }
        chain
    }

    /// Rewrites a symbolic endpoint to a resolved one, as the resolver does
    /// post-parse; promotes the relationship out of `pending` into a real
    /// edge once both endpoints are resolved known components. Returns
    /// `false` if the relationship isn't present.
    pub fn resolve_endpoint(&mut self, relationship_id: RelationshipId, is_target: bool, resolved: ComponentId) -> bool {
        let Some(mut relationship) = self.pending.remove(&relationship_id) else {
            let Some(edge_idx) = self.edge_index_of(relationship_id) else {
                return false;
            };
            apply_resolution(&mut self.inner[edge_idx], is_target, resolved);
            return true;
        };
        apply_resolution(&mut relationship, is_target, resolved);
        self.add_relationship(relationship);
        true
    }
}

fn apply_resolution(r: &mut Relationship, is_target: bool, resolved: ComponentId) {
    let endpoint = if is_target { &mut r.target_id } else { &mut r.source_id };
    let original = endpoint.to_string();
    if is_target {
        r.metadata.original_target.get_or_insert(original);
    } else {
        r.metadata.resolved_from.get_or_insert(original);
    }
    *endpoint = SymbolicId::Resolved(resolved);
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
