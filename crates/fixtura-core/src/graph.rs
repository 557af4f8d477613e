use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::{FieldKind, SchemaRegistry};

/// Summary of the collection reference graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceGraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for collection reference ordering.
///
/// A cycle is legal for fixtures; it only means some references on it will
/// be filled in through placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceGraphReport {
    pub summary: ReferenceGraphSummary,
    pub topo_order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

impl ReferenceGraphReport {
    pub fn has_cycle(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Build a deterministic reference report for a schema registry.
///
/// Dynamic references are skipped since their target is only known per
/// fixture.
pub fn build_reference_graph_report(registry: &SchemaRegistry) -> ReferenceGraphReport {
    let graph = build_adjacency(registry);
    let nodes = graph.len();
    let edges = graph.values().map(|targets| targets.len()).sum();
    let summary = ReferenceGraphSummary { nodes, edges };

    match toposort(&graph) {
        Ok(order) => ReferenceGraphReport {
            summary,
            topo_order: Some(order),
            cycle: None,
        },
        Err(cycle) => ReferenceGraphReport {
            summary,
            topo_order: None,
            cycle: Some(cycle),
        },
    }
}

fn build_adjacency(registry: &SchemaRegistry) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for schema in registry.iter() {
        graph.entry(schema.collection.clone()).or_default();

        let mut targets = Vec::new();
        for kind in schema.fields.values() {
            collect_targets(kind, &mut targets);
        }

        for target in targets {
            let Some(referenced) = registry.lookup(&target) else {
                continue;
            };
            graph
                .entry(referenced.collection.clone())
                .or_default()
                .insert(schema.collection.clone());
        }
    }

    graph
}

fn collect_targets(kind: &FieldKind, targets: &mut Vec<String>) {
    match kind {
        FieldKind::Reference { target } => targets.push(target.clone()),
        FieldKind::Nested { fields } => {
            for kind in fields.values() {
                collect_targets(kind, targets);
            }
        }
        FieldKind::Array { of } => collect_targets(of, targets),
        _ => {}
    }
}

fn toposort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<String, usize> = BTreeMap::new();

    for node in graph.keys() {
        indegree.entry(node.clone()).or_insert(0);
    }

    for targets in graph.values() {
        for target in targets {
            *indegree.entry(target.clone()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<String> = indegree
        .iter()
        .filter_map(|(node, count)| (*count == 0).then(|| node.clone()))
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.clone());

        if let Some(targets) = graph.get(&node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target.clone());
                    }
                }
            }
        }
    }

    if order.len() == graph.len() {
        Ok(order)
    } else {
        let cycle_nodes: Vec<String> = indegree
            .into_iter()
            .filter_map(|(node, count)| (count > 0).then_some(node))
            .collect();
        Err(cycle_nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CollectionSchema;

    #[test]
    fn toposort_reports_cycle() {
        let registry = SchemaRegistry::new()
            .with(CollectionSchema::new("User").field("image", FieldKind::reference("Upload")))
            .with(CollectionSchema::new("Upload").field("owner", FieldKind::reference("User")))
            .with(CollectionSchema::new("Shop"));

        let report = build_reference_graph_report(&registry);
        assert!(report.topo_order.is_none());
        let cycle = report.cycle.as_ref().unwrap();
        assert!(cycle.contains(&"users".to_string()));
        assert!(cycle.contains(&"uploads".to_string()));
        assert!(!cycle.contains(&"shops".to_string()));
    }

    #[test]
    fn toposort_orders_dependencies() {
        let registry = SchemaRegistry::new()
            .with(
                CollectionSchema::new("Post").field(
                    "authors",
                    FieldKind::array(FieldKind::reference("User")),
                ),
            )
            .with(CollectionSchema::new("User"));

        let report = build_reference_graph_report(&registry);
        let order = report.topo_order.expect("expected toposort");
        let users_idx = order.iter().position(|item| item == "users").unwrap();
        let posts_idx = order.iter().position(|item| item == "posts").unwrap();
        assert!(users_idx < posts_idx);
        assert_eq!(report.summary.edges, 1);
    }
}
