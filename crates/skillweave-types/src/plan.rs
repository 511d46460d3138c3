use crate::skill::SkillCatalog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Dependency map: `dag[a]` lists the skills `a` depends on (its upstreams).
pub type SkillDag = BTreeMap<String, Vec<String>>;

/// One position in an execution order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExecutionStep {
    /// Run a single skill
    Single(String),
    /// Run every skill in the group concurrently
    Parallel(Vec<String>),
}

impl ExecutionStep {
    /// Skill ids covered by this step
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Single(id) => vec![id.as_str()],
            Self::Parallel(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(id) => id.is_empty(),
            Self::Parallel(ids) => ids.is_empty(),
        }
    }
}

/// Every dependency runs in a strictly earlier step than its dependent,
/// every dag node appears in the order, and no id appears twice.
pub fn order_respects_dag(dag: &SkillDag, order: &[ExecutionStep]) -> bool {
    let mut position: HashMap<&str, usize> = HashMap::new();
    for (step_idx, step) in order.iter().enumerate() {
        for id in step.ids() {
            if position.insert(id, step_idx).is_some() {
                return false;
            }
        }
    }

    dag.iter().all(|(node, deps)| {
        let Some(&node_pos) = position.get(node.as_str()) else {
            return false;
        };
        deps.iter().all(|dep| {
            position
                .get(dep.as_str())
                .is_some_and(|&dep_pos| dep_pos < node_pos)
        })
    })
}

/// Per-run counters, owned by a single planner invocation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStats {
    pub llm_calls: u32,
    pub retrieval_rounds: u32,
    pub iterations: u32,
}

/// Outcome of one planning invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillDagResult {
    pub dag: SkillDag,
    pub execution_order: Vec<ExecutionStep>,
    pub selected_skills: SkillCatalog,
    pub is_complete: bool,
    /// Set iff the planner is stuck and needs more input
    pub clarification: Option<String>,
    /// Set iff no skills are needed at all
    pub chat_response: Option<String>,
    #[serde(default)]
    pub stats: PlanStats,
}

impl SkillDagResult {
    /// Conversational answer, nothing to execute
    pub fn chat(response: impl Into<String>) -> Self {
        Self {
            is_complete: true,
            chat_response: Some(response.into()),
            ..Self::default()
        }
    }

    /// Planner could not proceed without more input
    pub fn clarify(message: impl Into<String>) -> Self {
        Self {
            is_complete: false,
            clarification: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_stats(mut self, stats: PlanStats) -> Self {
        self.stats = stats;
        self
    }

    /// Execution order with parallel groups expanded in place
    pub fn flatten_order(&self) -> Vec<&str> {
        self.execution_order
            .iter()
            .flat_map(ExecutionStep::ids)
            .collect()
    }

    /// Ids referenced by the order or the dag that are not selected skills
    pub fn dangling_ids(&self) -> Vec<String> {
        let mut dangling: Vec<String> = self
            .flatten_order()
            .into_iter()
            .chain(
                self.dag
                    .iter()
                    .flat_map(|(k, deps)| std::iter::once(k.as_str()).chain(deps.iter().map(String::as_str))),
            )
            .filter(|id| !self.selected_skills.contains_key(*id))
            .map(str::to_string)
            .collect();
        dangling.sort();
        dangling.dedup();
        dangling
    }

    /// See [`order_respects_dag`]
    pub fn is_consistent(&self) -> bool {
        order_respects_dag(&self.dag, &self.execution_order)
    }

    /// Pretty JSON rendering for CLI output
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
