//! Cleaning and ordering of model-proposed dependency graphs
//!
//! Convention: `dag[a]` lists the skills `a` depends on. A proposed order is
//! trusted only if it passes [`order_respects_dag`]; otherwise it is rebuilt
//! from the graph.

use skillweave_types::{order_respects_dag, ExecutionStep, SkillDag};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// Keep only edges between `valid` ids and give every valid id an entry
pub fn sanitize_dag(raw: &SkillDag, valid: &BTreeSet<String>) -> SkillDag {
    let mut dag: SkillDag = valid.iter().map(|id| (id.clone(), Vec::new())).collect();

    for (node, deps) in raw {
        let Some(entry) = dag.get_mut(node) else {
            debug!("Dropping unknown dag node '{}'", node);
            continue;
        };
        for dep in deps {
            if dep != node && valid.contains(dep) && !entry.contains(dep) {
                entry.push(dep.clone());
            }
        }
    }
    dag
}

/// Drop unknown and repeated ids; single-member groups become single steps
pub fn sanitize_order(raw: &[ExecutionStep], valid: &BTreeSet<String>) -> Vec<ExecutionStep> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();

    for step in raw {
        let mut group: Vec<String> = step
            .ids()
            .into_iter()
            .filter(|id| valid.contains(*id) && seen.insert(id))
            .map(str::to_string)
            .collect();

        match group.len() {
            0 => {}
            1 => order.extend(group.pop().map(ExecutionStep::Single)),
            _ => order.push(ExecutionStep::Parallel(group)),
        }
    }
    order
}

/// Kahn layering: each layer holds every node whose dependencies are all in
/// earlier layers. Layers are sorted; nodes caught in a cycle are appended
/// one by one at the end.
pub fn topological_layers(dag: &SkillDag) -> Vec<ExecutionStep> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = dag
        .iter()
        .map(|(node, deps)| {
            let deps = deps
                .iter()
                .map(String::as_str)
                .filter(|d| dag.contains_key(*d))
                .collect();
            (node.as_str(), deps)
        })
        .collect();

    let mut layers = Vec::new();
    loop {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(node, _)| *node)
            .collect();
        if ready.is_empty() {
            break;
        }

        for node in &ready {
            remaining.remove(node);
        }
        for deps in remaining.values_mut() {
            for node in &ready {
                deps.remove(node);
            }
        }

        layers.push(to_step(ready));
    }

    if !remaining.is_empty() {
        warn!(
            "Dependency cycle among {:?}, appending in name order",
            remaining.keys().collect::<Vec<_>>()
        );
        layers.extend(
            remaining
                .into_keys()
                .map(|node| ExecutionStep::Single(node.to_string())),
        );
    }
    layers
}

fn to_step(mut ids: Vec<&str>) -> ExecutionStep {
    if ids.len() == 1 {
        ExecutionStep::Single(ids.remove(0).to_string())
    } else {
        ExecutionStep::Parallel(ids.into_iter().map(str::to_string).collect())
    }
}

/// Sanitized proposed order if it is consistent with `dag`, else the
/// topological layering of `dag`
pub fn resolve_order(
    dag: &SkillDag,
    proposed: &[ExecutionStep],
    valid: &BTreeSet<String>,
) -> Vec<ExecutionStep> {
    let order = sanitize_order(proposed, valid);
    if !order.is_empty() && order_respects_dag(dag, &order) {
        return order;
    }

    if !order.is_empty() {
        warn!("Proposed execution order contradicts the dependency graph, re-deriving it");
    }
    topological_layers(dag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn dag(edges: &[(&str, &[&str])]) -> SkillDag {
        edges
            .iter()
            .map(|(n, deps)| (n.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    fn single(id: &str) -> ExecutionStep {
        ExecutionStep::Single(id.to_string())
    }

    fn parallel(list: &[&str]) -> ExecutionStep {
        ExecutionStep::Parallel(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_sanitize_dag_drops_unknown_and_fills_missing() {
        let raw = dag(&[("a", &["ghost", "a"]), ("ghost", &["a"]), ("b", &["a", "a"])]);
        let clean = sanitize_dag(&raw, &ids(&["a", "b", "c"]));

        assert_eq!(clean, dag(&[("a", &[]), ("b", &["a"]), ("c", &[])]));
    }

    #[test]
    fn test_sanitize_order_collapses_and_dedups() {
        let raw = vec![single("a"), parallel(&["ghost", "b"]), parallel(&["a", "c", "d"])];
        let order = sanitize_order(&raw, &ids(&["a", "b", "c", "d"]));

        assert_eq!(order, vec![single("a"), single("b"), parallel(&["c", "d"])]);
    }

    #[test]
    fn test_topological_layers() {
        let graph = dag(&[
            ("report", &["charts", "tables"]),
            ("charts", &["tables"]),
            ("tables", &[]),
            ("notes", &[]),
        ]);
        let order = topological_layers(&graph);

        assert_eq!(
            order,
            vec![parallel(&["notes", "tables"]), single("charts"), single("report")]
        );
        assert!(order_respects_dag(&graph, &order));
    }

    #[test]
    fn test_cycle_is_appended() {
        let graph = dag(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let order = topological_layers(&graph);

        assert_eq!(order, vec![single("c"), single("a"), single("b")]);
    }

    #[test]
    fn test_resolve_order_keeps_consistent_proposal() {
        let graph = dag(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
        let proposed = vec![single("a"), parallel(&["c", "b"])];
        let valid = ids(&["a", "b", "c"]);

        assert_eq!(resolve_order(&graph, &proposed, &valid), proposed);
    }

    #[test]
    fn test_resolve_order_repairs_inconsistent_proposal() {
        let graph = dag(&[("a", &[]), ("b", &["a"])]);
        let valid = ids(&["a", "b"]);

        let backwards = vec![single("b"), single("a")];
        assert_eq!(
            resolve_order(&graph, &backwards, &valid),
            vec![single("a"), single("b")]
        );

        let partial = vec![single("a")];
        assert_eq!(
            resolve_order(&graph, &partial, &valid),
            vec![single("a"), single("b")]
        );

        assert_eq!(
            resolve_order(&graph, &[], &valid),
            vec![single("a"), single("b")]
        );
    }
}
