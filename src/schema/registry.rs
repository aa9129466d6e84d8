//! Schema registry and validation ordering

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use super::{SchemaEntry, SchemaError};

/// Schema entries keyed by table name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: IndexMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document mapping table name to column rules
    pub fn from_yaml_str(content: &str, origin: &str) -> Result<Self, SchemaError> {
        let entries: IndexMap<String, SchemaEntry> =
            serde_yaml::from_str(content).map_err(|e| SchemaError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { entries })
    }

    /// Load a YAML schema file from disk
    pub fn load_yaml_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content, &path.display().to_string())
    }

    pub fn insert(&mut self, table: impl Into<String>, entry: SchemaEntry) {
        self.entries.insert(table.into(), entry);
    }

    /// Merge another registry; entries in `other` win
    pub fn merge(&mut self, other: SchemaRegistry) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, table: &str) -> Option<&SchemaEntry> {
        self.entries.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order `tables` so every referenced table precedes its referrers.
    ///
    /// Ties keep the input order. References to tables outside `tables`
    /// impose no ordering and self-references are ignored. A cycle is an
    /// error naming the tables involved.
    pub fn validation_order(&self, tables: &[String]) -> Result<Vec<String>, SchemaError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for table in tables {
            nodes
                .entry(table.as_str())
                .or_insert_with(|| graph.add_node(table.as_str()));
        }

        for table in tables {
            let Some(entry) = self.entries.get(table) else {
                continue;
            };
            let target = nodes[table.as_str()];
            for rule in entry.values() {
                if let Some(reference) = &rule.reference
                    && reference.table != *table
                    && let Some(&source) = nodes.get(reference.table.as_str())
                    && graph.find_edge(source, target).is_none()
                {
                    graph.add_edge(source, target, ());
                }
            }
        }

        if toposort(&graph, None).is_err() {
            return Err(SchemaError::ReferenceCycle(Self::cycle_members(&graph)));
        }

        // Kahn's algorithm, always taking the earliest ready table
        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut ordered = Vec::with_capacity(graph.node_count());
        while let Some(next) = ready.pop_first() {
            let node = NodeIndex::new(next);
            ordered.push(graph[node].to_string());
            for child in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    ready.insert(child.index());
                }
            }
        }
        Ok(ordered)
    }

    /// Tables that sit on a cycle, in graph order
    fn cycle_members(graph: &DiGraph<&str, ()>) -> Vec<String> {
        petgraph::algo::tarjan_scc(graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .flat_map(|mut scc| {
                scc.sort();
                scc.into_iter().map(|n| graph[n].to_string())
            })
            .collect()
    }
}
