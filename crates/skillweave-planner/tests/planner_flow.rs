//! End-to-end planner runs against a scripted model and the offline embedder

#![allow(clippy::unwrap_used)]

use skillweave_planner::{AutoSkillsPlanner, PlannerConfig, PlannerMode};
use skillweave_provider::{HashingEmbedder, ScriptedLlm};
use skillweave_retrieval::{HybridRetriever, SearchOptions};
use skillweave_types::{SkillCatalog, SkillRecord};
use std::sync::Arc;

fn catalog() -> SkillCatalog {
    [
        ("pdf", "Extract tables from PDF documents"),
        ("xlsx", "Build spreadsheet reports with charts"),
        ("pptx", "Create slide presentations"),
    ]
    .into_iter()
    .map(|(id, description)| (id.to_string(), SkillRecord::new(id, id, description)))
    .collect()
}

/// Purely lexical, one hit per sub-query
fn lexical_search() -> SearchOptions {
    SearchOptions::default()
        .with_alpha(0.0)
        .with_top_k(1)
        .with_min_score(0.0)
}

fn planner(llm: Arc<ScriptedLlm>, config: PlannerConfig) -> AutoSkillsPlanner {
    let retriever = Arc::new(HybridRetriever::new(Arc::new(HashingEmbedder::new(64))));
    AutoSkillsPlanner::new(catalog(), llm, retriever, config).unwrap()
}

#[tokio::test]
async fn test_chat_only_query() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": false, "chat_response": "Paris"}"#,
    ]));
    let planner = planner(llm.clone(), PlannerConfig::default());

    let result = planner.plan("What is the capital of France?").await.unwrap();

    assert!(result.is_complete);
    assert!(result.selected_skills.is_empty());
    assert_eq!(result.chat_response.as_deref(), Some("Paris"));
    assert!(result.clarification.is_none());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_two_round_reflection() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "intent_summary": "pdf tables to excel", "skill_queries": ["pdf tables"]}"#,
        r#"```json
{"is_complete": false, "missing_capabilities": ["spreadsheet"], "additional_queries": ["spreadsheet"]}
```"#,
        r#"{"is_complete": true, "additional_queries": []}"#,
        r#"{"filtered_skill_ids": ["pdf", "xlsx"]}"#,
        r#"{"filtered_skill_ids": ["pdf", "xlsx"], "skill_analysis": {"pdf": {"can_execute": true}}}"#,
        r#"{"dag": {"pdf": [], "xlsx": ["pdf"]}, "execution_order": ["pdf", "xlsx"]}"#,
    ]));
    let config = PlannerConfig::default().with_search(lexical_search());
    let planner = planner(llm.clone(), config);

    let result = planner
        .plan("Extract the tables from report.pdf and build an Excel report")
        .await
        .unwrap();

    assert!(result.is_complete);
    assert_eq!(
        result.selected_skills.keys().collect::<Vec<_>>(),
        vec!["pdf", "xlsx"]
    );
    assert_eq!(result.flatten_order(), vec!["pdf", "xlsx"]);
    assert_eq!(result.dag["xlsx"], vec!["pdf"]);
    assert!(result.is_consistent());
    assert!(result.dangling_ids().is_empty());

    assert_eq!(result.stats.llm_calls, 6);
    assert_eq!(result.stats.retrieval_rounds, 2);
    assert_eq!(result.stats.iterations, 2);

    // The evaluation prompt lists what has been collected so far
    assert!(llm.prompts()[1].contains("- [pdf] pdf"));
    assert!(!llm.prompts()[1].contains("- [xlsx] xlsx"));
}

#[tokio::test]
async fn test_nothing_retrieved_asks_for_details() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "skill_queries": ["quantum teleportation"]}"#,
    ]));
    let config = PlannerConfig::default().with_search(SearchOptions::default().with_alpha(0.0));
    let planner = planner(llm.clone(), config);

    let result = planner.plan("teleport me").await.unwrap();

    assert!(!result.is_complete);
    assert_eq!(
        result.clarification.as_deref(),
        Some("No relevant skills found. Please provide more details.")
    );
    assert!(result.selected_skills.is_empty());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_max_iterations_bounds_the_loop() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "skill_queries": ["pdf"]}"#,
        r#"{"is_complete": false, "additional_queries": ["slide"]}"#,
        r#"{"is_complete": false, "additional_queries": ["spreadsheet"]}"#,
        r#"{"filtered_skill_ids": null}"#,
        "{}",
        "not json at all",
    ]));
    let config = PlannerConfig::default()
        .with_search(lexical_search())
        .with_max_iterations(2);
    let planner = planner(llm.clone(), config);

    let result = planner.plan("do everything").await.unwrap();

    assert!(result.is_complete);
    assert_eq!(result.stats.retrieval_rounds, 2);
    assert_eq!(result.stats.llm_calls, 6);
    assert_eq!(
        result.selected_skills.keys().collect::<Vec<_>>(),
        vec!["pdf", "pptx"]
    );
    // Malformed DAG reply falls back to an edge-free layering
    assert!(result.is_consistent());
    assert_eq!(result.flatten_order().len(), 2);
}

#[tokio::test]
async fn test_filter_passes_narrow_candidates() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "skill_queries": ["pdf tables", "spreadsheet"]}"#,
        r#"{"is_complete": true}"#,
        r#"{"filtered_skill_ids": ["pdf", "xlsx", "ghost"], "reasoning": "both relevant"}"#,
        r#"{"filtered_skill_ids": ["pdf", "xlsx"],
            "skill_analysis": {"xlsx": {"can_execute": false, "reason": "needs a desktop Excel install"}}}"#,
        r#"{"dag": {"pdf": []}, "execution_order": ["pdf"]}"#,
    ]));
    let config = PlannerConfig::default().with_search(lexical_search());
    let planner = planner(llm.clone(), config);

    let result = planner.plan("Pull the tables out of report.pdf").await.unwrap();

    assert!(result.is_complete);
    assert_eq!(result.selected_skills.keys().collect::<Vec<_>>(), vec!["pdf"]);
    assert_eq!(result.flatten_order(), vec!["pdf"]);
    assert_eq!(result.stats.llm_calls, 5);

    let prompts = llm.prompts();
    // Fast pass sees one line per candidate, deep pass sees the bodies
    assert!(prompts[2].contains("- [pdf] pdf: Extract tables from PDF documents"));
    assert!(prompts[2].contains("- [xlsx] xlsx: "));
    assert!(prompts[3].contains("### [xlsx] xlsx"));
    assert!(prompts[3].contains("can_execute"));
    // Only the survivor reaches DAG construction
    assert!(prompts[4].contains("- [pdf] pdf"));
    assert!(!prompts[4].contains("[xlsx]"));
}

#[tokio::test]
async fn test_everything_filtered_asks_to_refine() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "skill_queries": ["pdf tables", "slide"]}"#,
        r#"{"is_complete": true}"#,
        r#"{"filtered_skill_ids": [], "reasoning": "nothing matches"}"#,
    ]));
    let config = PlannerConfig::default().with_search(lexical_search());
    let planner = planner(llm.clone(), config);

    let result = planner.plan("bake a cake").await.unwrap();

    assert!(!result.is_complete);
    assert_eq!(
        result.clarification.as_deref(),
        Some("No relevant skills found after filtering. Please refine your query.")
    );
    assert!(result.execution_order.is_empty());
    // Deep pass and DAG construction are skipped
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn test_null_fields_do_not_derail_planning() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": false, "chat_response": "Paris", "skill_queries": null}"#,
    ]));
    let result = planner(llm, PlannerConfig::default())
        .plan("What is the capital of France?")
        .await
        .unwrap();
    assert_eq!(result.chat_response.as_deref(), Some("Paris"));

    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "intent_summary": null, "skill_queries": null}"#,
        r#"{"is_complete": true, "missing_capabilities": null, "additional_queries": null, "clarification_needed": null}"#,
        r#"{"dag": null, "execution_order": ["pptx"], "filtered_skill_ids": null}"#,
    ]));
    let config = PlannerConfig::default().with_search(lexical_search());
    let planner = planner(llm.clone(), config);

    let result = planner.plan("slide presentations").await.unwrap();

    // The query itself becomes the only sub-query
    assert!(result.is_complete);
    assert_eq!(result.selected_skills.keys().collect::<Vec<_>>(), vec!["pptx"]);
    assert_eq!(result.flatten_order(), vec!["pptx"]);
    assert_eq!(result.stats.retrieval_rounds, 1);
    // A single candidate skips both filter passes
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn test_evaluation_clarification_stops_planning() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "skill_queries": ["slide presentations"]}"#,
        r#"{"is_complete": false, "clarification_needed": "Which template should the deck use?"}"#,
    ]));
    let config = PlannerConfig::default().with_search(lexical_search());
    let planner = planner(llm.clone(), config);

    let result = planner.plan("make a deck").await.unwrap();

    assert!(!result.is_complete);
    assert_eq!(
        result.clarification.as_deref(),
        Some("Which template should the deck use?")
    );
    assert!(result.selected_skills.contains_key("pptx"));
    assert!(result.execution_order.is_empty());
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn test_direct_mode_drops_unknown_ids() {
    let llm = Arc::new(ScriptedLlm::new([
        r#"{"needs_skills": true, "selected_skill_ids": ["ghost"], "dag": {"ghost": []}, "execution_order": ["ghost"]}"#,
    ]));
    let planner = planner(llm, PlannerConfig::default().with_mode(PlannerMode::Direct));

    let result = planner.plan("summon a ghost").await.unwrap();

    assert!(!result.is_complete);
    assert_eq!(result.clarification.as_deref(), Some("No relevant skills found."));
    assert!(result.selected_skills.is_empty());
    assert!(result.execution_order.is_empty());
}

#[tokio::test]
async fn test_direct_mode_repairs_order_and_is_idempotent() {
    let reply = r#"{
        "needs_skills": true,
        "selected_skill_ids": ["xlsx", "pdf", "ghost"],
        "dag": {"xlsx": ["pdf", "ghost"], "pdf": []},
        "execution_order": ["xlsx", "pdf", "ghost"]
    }"#;
    let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).with_fallback(reply));
    // Auto resolves to direct for a three-skill catalog
    let planner = planner(llm, PlannerConfig::default().with_mode(PlannerMode::Auto));

    let first = planner.plan("pdf to excel").await.unwrap();
    let second = planner.plan("pdf to excel").await.unwrap();

    assert!(first.is_complete);
    assert_eq!(
        first.selected_skills.keys().collect::<Vec<_>>(),
        second.selected_skills.keys().collect::<Vec<_>>()
    );
    assert_eq!(first.dag["xlsx"], vec!["pdf"]);
    assert_eq!(first.flatten_order(), vec!["pdf", "xlsx"]);
    assert!(first.is_consistent());
    assert!(first.dangling_ids().is_empty());
}
