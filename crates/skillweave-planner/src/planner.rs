//! Skill planner: query → skill DAG
//!
//! Two modes share one entry point, [`AutoSkillsPlanner::plan`]:
//!
//! - **Direct**: the whole catalog goes into one prompt and the model picks
//!   skills and ordering in a single call.
//! - **Search**: a bounded reflection loop over the hybrid retriever,
//!   `Analyze → Retrieve → Evaluate → (Retrieve | Filter | Clarify)`, then
//!   `Filter → (BuildDag | Clarify)`. Filtering is a fast pass over names and
//!   descriptions followed by a deep pass over SKILL.md bodies.

use crate::dag::{resolve_order, sanitize_dag};
use crate::error::{PlannerError, Result};
use crate::prompts;
use crate::response::{
    parse_response, CompletenessEvaluation, DagProposal, DirectSelection, QueryAnalysis,
    SkillFilter,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use skillweave_provider::LlmClient;
use skillweave_retrieval::{HybridRetriever, SearchOptions};
use skillweave_types::{ChatMessage, PlanStats, SkillCatalog, SkillDagResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Catalogs larger than this use search mode under [`PlannerMode::Auto`]
pub const AUTO_SEARCH_THRESHOLD: usize = 10;

/// Returned when the first retrieval round finds nothing
pub const NO_SKILLS_FOUND: &str = "No relevant skills found. Please provide more details.";
/// Returned when direct selection keeps no valid id
pub const NO_SKILLS_SELECTED: &str = "No relevant skills found.";
/// Returned when the filter passes drop every candidate
pub const NO_SKILLS_AFTER_FILTER: &str =
    "No relevant skills found after filtering. Please refine your query.";

const FILTER_REASON_CHARS: usize = 200;

/// How skills are selected
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlannerMode {
    /// Retrieval-augmented reflection loop
    #[default]
    Search,
    /// Whole catalog in one prompt
    Direct,
    /// Search for large catalogs, direct otherwise
    Auto,
}

/// Planner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Selection strategy; [`PlannerMode::Auto`] is resolved against the
    /// catalog size once, see [`AutoSkillsPlanner::mode`]
    pub mode: PlannerMode,
    /// Retrieve/evaluate rounds before the loop gives up and builds the DAG
    pub max_iterations: u32,
    /// Candidates passed to the filter passes and DAG construction
    pub max_candidate_skills: usize,
    /// Per sub-query retrieval options
    pub search: SearchOptions,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: PlannerMode::Search,
            max_iterations: 3,
            max_candidate_skills: 10,
            search: SearchOptions::default().with_min_score(0.8),
        }
    }
}

impl PlannerConfig {
    /// Set the selection strategy
    pub fn with_mode(mut self, mode: PlannerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bound the retrieve/evaluate rounds; `0` behaves like `1` since the
    /// first retrieval always runs
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Options for every retrieval sub-query
    pub fn with_search(mut self, search: SearchOptions) -> Self {
        self.search = search;
        self
    }
}

/// Reflection loop state
#[derive(Debug)]
enum PlannerState {
    Analyze,
    Retrieve,
    Evaluate,
    Filter,
    BuildDag,
    Clarify(String),
    Done(SkillDagResult),
}

/// Mutable state of one search-mode run
struct SearchRun<'q> {
    query: &'q str,
    intent: String,
    pending_queries: Vec<String>,
    issued_queries: BTreeSet<String>,
    collected: BTreeSet<String>,
    /// Survivors of the filter passes
    candidates: BTreeSet<String>,
    stats: PlanStats,
}

impl<'q> SearchRun<'q> {
    fn new(query: &'q str) -> Self {
        Self {
            query,
            intent: query.to_string(),
            pending_queries: Vec::new(),
            issued_queries: BTreeSet::new(),
            collected: BTreeSet::new(),
            candidates: BTreeSet::new(),
            stats: PlanStats::default(),
        }
    }

    /// Queue queries not issued before
    fn queue(&mut self, queries: impl IntoIterator<Item = String>) {
        for q in queries {
            let q = q.trim().to_string();
            if !q.is_empty() && !self.issued_queries.contains(&q) && !self.pending_queries.contains(&q) {
                self.pending_queries.push(q);
            }
        }
    }
}

/// LLM-guided planner over a fixed skill catalog
pub struct AutoSkillsPlanner {
    catalog: SkillCatalog,
    llm: Arc<dyn LlmClient>,
    retriever: Arc<HybridRetriever>,
    config: PlannerConfig,
    corpus: Vec<String>,
    corpus_ids: HashMap<String, String>,
}

impl AutoSkillsPlanner {
    /// Build a planner; the corpus is one `"[id] name: description"`
    /// document per skill and is indexed on the first search
    pub fn new(
        catalog: SkillCatalog,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<HybridRetriever>,
        config: PlannerConfig,
    ) -> Result<Self> {
        if catalog.is_empty() {
            return Err(PlannerError::EmptyCatalog);
        }

        let corpus: Vec<String> = catalog.values().map(|s| s.corpus_document()).collect();
        let corpus_ids = catalog
            .values()
            .zip(&corpus)
            .map(|(skill, doc)| (doc.clone(), skill.id.clone()))
            .collect();

        info!(
            "Skill planner ready: {} skills, mode={:?}",
            catalog.len(),
            config.mode
        );
        Ok(Self {
            catalog,
            llm,
            retriever,
            config,
            corpus,
            corpus_ids,
        })
    }

    /// Skills known to this planner
    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    /// Effective mode after resolving [`PlannerMode::Auto`]
    pub fn mode(&self) -> PlannerMode {
        match self.config.mode {
            PlannerMode::Auto if self.catalog.len() > AUTO_SEARCH_THRESHOLD => PlannerMode::Search,
            PlannerMode::Auto => PlannerMode::Direct,
            mode => mode,
        }
    }

    /// Plan `query` in the configured mode
    pub async fn plan(&self, query: &str) -> Result<SkillDagResult> {
        match self.mode() {
            PlannerMode::Direct => self.direct_select(query).await,
            _ => self.search_plan(query).await,
        }
    }

    async fn ask(&self, prompt: String, stats: &mut PlanStats) -> Result<String> {
        stats.llm_calls += 1;
        let reply = self.llm.generate(&[ChatMessage::user(prompt)]).await?;
        debug!("LLM reply ({} chars)", reply.len());
        Ok(reply)
    }

    /// Direct-selection mode: one call over the whole catalog
    pub async fn direct_select(&self, query: &str) -> Result<SkillDagResult> {
        let mut stats = PlanStats::default();
        let prompt = prompts::direct_select(query, &prompts::all_skills_context(&self.catalog));
        let selection: DirectSelection = parse_response(&self.ask(prompt, &mut stats).await?);

        if !selection.needs_skills {
            info!("Chat-only query, no skills needed");
            return Ok(SkillDagResult::chat(selection.chat_response.unwrap_or_default())
                .with_stats(stats));
        }

        let valid: BTreeSet<String> = selection
            .selected_skill_ids
            .into_iter()
            .filter(|id| {
                let known = self.catalog.contains_key(id);
                if !known {
                    warn!("Dropping unknown skill id '{}'", id);
                }
                known
            })
            .collect();
        info!("Direct selection: {:?}", valid);

        if valid.is_empty() {
            return Ok(SkillDagResult::clarify(NO_SKILLS_SELECTED).with_stats(stats));
        }

        let dag = sanitize_dag(&selection.dag, &valid);
        let execution_order = resolve_order(&dag, &selection.execution_order, &valid);
        Ok(SkillDagResult {
            selected_skills: self.select(&valid),
            dag,
            execution_order,
            is_complete: true,
            clarification: None,
            chat_response: None,
            stats,
        })
    }

    /// Search-augmented mode: the reflection state machine
    pub async fn search_plan(&self, query: &str) -> Result<SkillDagResult> {
        let mut run = SearchRun::new(query);
        let mut state = PlannerState::Analyze;

        loop {
            debug!(iteration = run.stats.iterations, "Planner state: {:?}", state);
            state = match state {
                PlannerState::Analyze => self.analyze(&mut run).await?,
                PlannerState::Retrieve => self.retrieve(&mut run).await?,
                PlannerState::Evaluate => self.evaluate(&mut run).await?,
                PlannerState::Filter => self.filter(&mut run).await?,
                PlannerState::BuildDag => self.build_dag(&mut run).await?,
                PlannerState::Clarify(message) => {
                    info!("Planner needs clarification: {}", message);
                    let mut result = SkillDagResult::clarify(message).with_stats(run.stats);
                    result.selected_skills = self.select(&run.collected);
                    return Ok(result);
                }
                PlannerState::Done(result) => return Ok(result.with_stats(run.stats)),
            };
        }
    }

    async fn analyze(&self, run: &mut SearchRun<'_>) -> Result<PlannerState> {
        let prompt = prompts::analyze_query(run.query, &prompts::skills_overview(&self.catalog));
        let analysis: QueryAnalysis = parse_response(&self.ask(prompt, &mut run.stats).await?);

        if !analysis.needs_skills {
            info!("Chat-only query, no skills needed");
            return Ok(PlannerState::Done(SkillDagResult::chat(
                analysis.chat_response.unwrap_or_default(),
            )));
        }

        if let Some(intent) = analysis.intent_summary.filter(|i| !i.trim().is_empty()) {
            run.intent = intent;
        }
        run.queue(analysis.skill_queries);
        if run.pending_queries.is_empty() {
            run.queue([run.query.to_string()]);
        }
        info!(intent = %run.intent, "Skill queries: {:?}", run.pending_queries);
        Ok(PlannerState::Retrieve)
    }

    async fn retrieve(&self, run: &mut SearchRun<'_>) -> Result<PlannerState> {
        run.stats.iterations += 1;
        run.stats.retrieval_rounds += 1;
        let queries = std::mem::take(&mut run.pending_queries);

        let searches = queries.iter().map(|q| {
            self.retriever
                .search_concurrent(q, Some(self.corpus.as_slice()), &self.config.search)
        });
        let results = join_all(searches).await;

        let before = run.collected.len();
        for hits in results {
            for hit in hits? {
                if let Some(id) = self.skill_id_for(&hit.document) {
                    run.collected.insert(id);
                }
            }
        }
        run.issued_queries.extend(queries);
        info!(
            iteration = run.stats.iterations,
            "Retrieved {} new skills, {} collected",
            run.collected.len() - before,
            run.collected.len()
        );

        if run.collected.is_empty() {
            return Ok(PlannerState::Clarify(NO_SKILLS_FOUND.to_string()));
        }
        Ok(PlannerState::Evaluate)
    }

    async fn evaluate(&self, run: &mut SearchRun<'_>) -> Result<PlannerState> {
        let collected = prompts::format_skills(run.collected.iter().filter_map(|id| self.catalog.get(id)));
        let prompt = prompts::evaluate_completeness(run.query, &run.intent, &collected);
        let evaluation: CompletenessEvaluation = parse_response(&self.ask(prompt, &mut run.stats).await?);

        if let Some(question) = evaluation.clarification() {
            return Ok(PlannerState::Clarify(question.to_string()));
        }
        if evaluation.is_complete {
            return Ok(PlannerState::Filter);
        }
        if !evaluation.missing_capabilities.is_empty() {
            debug!("Missing capabilities: {:?}", evaluation.missing_capabilities);
        }

        run.queue(evaluation.additional_queries);
        if run.pending_queries.is_empty() {
            debug!("No new queries proposed, building DAG");
            return Ok(PlannerState::Filter);
        }
        if run.stats.iterations >= self.config.max_iterations {
            info!(
                "Reached max iterations ({}), building DAG with collected skills",
                self.config.max_iterations
            );
            return Ok(PlannerState::Filter);
        }
        Ok(PlannerState::Retrieve)
    }

    async fn filter(&self, run: &mut SearchRun<'_>) -> Result<PlannerState> {
        let mut candidates = run.collected.clone();
        if candidates.len() > self.config.max_candidate_skills {
            warn!(
                "Too many candidate skills ({}), limiting to {}",
                candidates.len(),
                self.config.max_candidate_skills
            );
            candidates = candidates
                .into_iter()
                .take(self.config.max_candidate_skills)
                .collect();
        }

        // A single candidate is kept as is
        if candidates.len() > 1 {
            candidates = self.filter_pass(run, candidates, false).await?;
        }
        if candidates.len() > 1 {
            candidates = self.filter_pass(run, candidates, true).await?;
        }

        if candidates.is_empty() {
            return Ok(PlannerState::Clarify(NO_SKILLS_AFTER_FILTER.to_string()));
        }
        run.candidates = candidates;
        Ok(PlannerState::BuildDag)
    }

    /// One relevance pass; `deep` also shows SKILL.md bodies and honours
    /// per-skill `can_execute` verdicts
    async fn filter_pass(
        &self,
        run: &mut SearchRun<'_>,
        candidates: BTreeSet<String>,
        deep: bool,
    ) -> Result<BTreeSet<String>> {
        let skills = candidates.iter().filter_map(|id| self.catalog.get(id));
        let prompt = if deep {
            prompts::filter_skills_deep(run.query, &prompts::candidate_details(skills))
        } else {
            prompts::filter_skills_fast(run.query, &prompts::candidate_list(skills))
        };
        let reply: SkillFilter = parse_response(&self.ask(prompt, &mut run.stats).await?);

        let mut kept: BTreeSet<String> = match reply.filtered_skill_ids {
            Some(ids) => ids.into_iter().filter(|id| candidates.contains(id)).collect(),
            None => candidates.clone(),
        };
        if deep {
            for (id, verdict) in &reply.skill_analysis {
                if !verdict.can_execute && kept.remove(id) {
                    info!(
                        skill_id = %id,
                        "Skill cannot execute: {}",
                        prompts::clip(verdict.reason.as_deref().unwrap_or(""), FILTER_REASON_CHARS)
                    );
                }
            }
        }

        info!(
            deep,
            "Filter kept {}/{} skills: {:?}",
            kept.len(),
            candidates.len(),
            kept
        );
        Ok(kept)
    }

    async fn build_dag(&self, run: &mut SearchRun<'_>) -> Result<PlannerState> {
        let candidates = std::mem::take(&mut run.candidates);
        let selected = prompts::format_skills(candidates.iter().filter_map(|id| self.catalog.get(id)));
        let prompt = prompts::build_dag(run.query, &selected);
        let proposal: DagProposal = parse_response(&self.ask(prompt, &mut run.stats).await?);

        let narrowed: BTreeSet<String> = proposal
            .filtered_skill_ids
            .unwrap_or_default()
            .into_iter()
            .filter(|id| candidates.contains(id))
            .collect();
        let valid = if narrowed.is_empty() { candidates } else { narrowed };
        info!("DAG over {} skills", valid.len());

        let dag = sanitize_dag(&proposal.dag, &valid);
        let execution_order = resolve_order(&dag, &proposal.execution_order, &valid);
        Ok(PlannerState::Done(SkillDagResult {
            selected_skills: self.select(&valid),
            dag,
            execution_order,
            is_complete: true,
            clarification: None,
            chat_response: None,
            stats: PlanStats::default(),
        }))
    }

    fn skill_id_for(&self, document: &str) -> Option<String> {
        if let Some(id) = self.corpus_ids.get(document) {
            return Some(id.clone());
        }
        let rest = document.strip_prefix('[')?;
        let id = &rest[..rest.find(']')?];
        self.catalog.contains_key(id).then(|| id.to_string())
    }

    fn select(&self, ids: &BTreeSet<String>) -> SkillCatalog {
        ids.iter()
            .filter_map(|id| self.catalog.get(id).map(|s| (id.clone(), s.clone())))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use skillweave_provider::{HashingEmbedder, ScriptedLlm};
    use skillweave_types::SkillRecord;

    fn catalog(n: usize) -> SkillCatalog {
        (0..n)
            .map(|i| {
                let id = format!("skill-{i}");
                (id.clone(), SkillRecord::new(&id, &id, "does things"))
            })
            .collect()
    }

    fn planner(n: usize, mode: PlannerMode) -> AutoSkillsPlanner {
        AutoSkillsPlanner::new(
            catalog(n),
            Arc::new(ScriptedLlm::new(Vec::<String>::new())),
            Arc::new(HybridRetriever::new(Arc::new(HashingEmbedder::new(32)))),
            PlannerConfig::default().with_mode(mode),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        let result = AutoSkillsPlanner::new(
            SkillCatalog::new(),
            Arc::new(ScriptedLlm::new(Vec::<String>::new())),
            Arc::new(HybridRetriever::new(Arc::new(HashingEmbedder::new(32)))),
            PlannerConfig::default(),
        );
        assert!(matches!(result, Err(PlannerError::EmptyCatalog)));
    }

    #[test]
    fn test_auto_mode_threshold() {
        assert_eq!(planner(10, PlannerMode::Auto).mode(), PlannerMode::Direct);
        assert_eq!(planner(11, PlannerMode::Auto).mode(), PlannerMode::Search);
        assert_eq!(planner(2, PlannerMode::Search).mode(), PlannerMode::Search);
    }

    #[test]
    fn test_skill_id_from_document() {
        let planner = planner(3, PlannerMode::Search);
        assert_eq!(
            planner.skill_id_for("[skill-1] skill-1: does things").as_deref(),
            Some("skill-1")
        );
        assert_eq!(
            planner.skill_id_for("[skill-2] renamed").as_deref(),
            Some("skill-2")
        );
        assert_eq!(planner.skill_id_for("[ghost] ghost: x"), None);
        assert_eq!(planner.skill_id_for("no brackets"), None);
    }

    #[test]
    fn test_default_config() {
        let config = PlannerConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_candidate_skills, 10);
        assert_eq!(config.search.min_score, 0.8);
        assert_eq!(config.search.top_k, 3);
    }

    #[test]
    fn test_search_run_queue_skips_repeats() {
        let mut run = SearchRun::new("q");
        run.issued_queries.insert("pdf".to_string());
        run.queue(["pdf".to_string(), " xlsx ".to_string(), "xlsx".to_string(), String::new()]);
        assert_eq!(run.pending_queries, vec!["xlsx"]);
    }

    #[test]
    fn test_config_builders() {
        let config = PlannerConfig::default()
            .with_mode(PlannerMode::Direct)
            .with_max_iterations(5)
            .with_search(SearchOptions::default().with_min_score(0.1));
        assert_eq!(config.mode, PlannerMode::Direct);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.search.min_score, 0.1);
    }
}
