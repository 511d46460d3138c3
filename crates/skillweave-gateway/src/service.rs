use crate::config::Config;
use anyhow::{Context, Result};
use skillweave_executor::{ExecutionInput, GuidedExecutor, SkillContainer, SkillDagRunner};
use skillweave_planner::{AutoSkillsPlanner, PlannerConfig};
use skillweave_provider::{build_embedder, build_llm, LlmClient};
use skillweave_retrieval::HybridRetriever;
use skillweave_skills::SkillsRegistry;
use skillweave_types::{SkillCatalog, SkillDagResult};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Gateway service - plans one query and optionally runs the plan
pub struct GatewayService {
    config: Config,
}

impl GatewayService {
    /// Create a new gateway service
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Discover skills from the configured roots (Phase 1: metadata only)
    fn discover_skills(&self) -> Result<SkillCatalog> {
        let skills = &self.config.skills;
        let mut registry = SkillsRegistry::new();
        for dir in skills.expanded_directories() {
            registry = registry.add_directory(dir);
        }
        if skills.include_personal {
            registry = registry.with_personal_skills();
        }
        if skills.include_project {
            registry = registry.with_project_skills();
        }

        registry.discover().context("Failed to discover skills")?;
        info!("Discovered {} skills", registry.len());

        // Planning prompts carry SKILL.md bodies when they are loaded
        if let Err(e) = registry.load_all() {
            warn!("Failed to load some skill contents: {}", e);
        }
        Ok(registry.catalog())
    }

    fn build_planner(&self, catalog: SkillCatalog, llm: Arc<dyn LlmClient>) -> Result<AutoSkillsPlanner> {
        let embedder = build_embedder(&self.config.embedding.provider(&self.config.llm)?);
        let retriever = HybridRetriever::new(embedder).with_bm25(self.config.retrieval.bm25());

        let section = &self.config.planner;
        let mut planner_config = PlannerConfig::default()
            .with_mode(section.mode)
            .with_max_iterations(section.max_iterations)
            .with_search(self.config.retrieval.search_options());
        planner_config.max_candidate_skills = section.max_candidate_skills;

        Ok(AutoSkillsPlanner::new(
            catalog,
            llm,
            Arc::new(retriever),
            planner_config,
        )?)
    }

    /// Print the plan, or the chat response / clarification in its place
    fn report_plan(plan: &SkillDagResult) -> Result<()> {
        if let Some(response) = &plan.chat_response {
            println!("{}", response);
        } else if let Some(question) = &plan.clarification {
            println!("{}", question);
        } else {
            println!("{}", plan.to_json()?);
        }
        Ok(())
    }

    async fn execute(
        &self,
        plan: &SkillDagResult,
        query: &str,
        llm: Arc<dyn LlmClient>,
    ) -> Result<bool> {
        let execution = &self.config.execution;
        let container = SkillContainer::new(execution.container())?;
        info!(
            workspace = %container.workspace().display(),
            backend = container.backend_name(),
            "Running planned skills"
        );

        let mut runner = SkillDagRunner::new(Arc::new(container))
            .with_stop_on_failure(execution.stop_on_failure);
        if execution.guided {
            runner = runner
                .with_guide(GuidedExecutor::new(llm, query).with_max_attempts(execution.max_attempts));
        }
        let report = runner.run(plan, &ExecutionInput::new()).await;

        for (skill_id, result) in &report.results {
            if result.success {
                info!(skill_id = %skill_id, "Skill succeeded");
            } else {
                error!(
                    skill_id = %skill_id,
                    status = %result.status,
                    "Skill failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let path = runner.container().save_report(None)?;
        info!(
            "DAG run finished in {:.0}ms, report: {}",
            report.total_duration_ms,
            path.display()
        );
        eprintln!("Execution report: {}", path.display());
        Ok(report.success)
    }

    /// Run the gateway for one query; `Ok(false)` when execution failed
    pub async fn run(self, query: &str) -> Result<bool> {
        skillweave_logging::init_logging(&self.config.logging)?;
        info!("Starting Skillweave Gateway");

        let catalog = self.discover_skills()?;
        let llm = build_llm(&self.config.llm.provider()?);
        let planner = self.build_planner(catalog, llm.clone())?;
        info!("Planner initialized, mode={:?}", planner.mode());

        let plan = planner.plan(query).await?;
        info!(
            llm_calls = plan.stats.llm_calls,
            retrieval_rounds = plan.stats.retrieval_rounds,
            iterations = plan.stats.iterations,
            "Planning finished with {} skill(s)",
            plan.selected_skills.len()
        );
        Self::report_plan(&plan)?;

        if !self.config.execution.auto_run || !plan.is_complete || plan.execution_order.is_empty()
        {
            return Ok(true);
        }
        self.execute(&plan, query, llm).await
    }
}
