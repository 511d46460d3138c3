use anyhow::{bail, Context};
use serde::Deserialize;
use skillweave_executor::guided::DEFAULT_MAX_ATTEMPTS;
use skillweave_executor::{ContainerConfig, DockerConfig};
use skillweave_logging::LoggingConfig;
use skillweave_planner::{PlannerConfig, PlannerMode};
use skillweave_retrieval::{Bm25Params, SearchOptions};
use skillweave_skills::registry::expand_home;
use skillweave_types::{EmbeddingProvider, LlmProvider};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config template created when no config exists
const DEFAULT_CONFIG: &str = r#"
[llm]
provider = "openai"  # or "ollama"
model = "gpt-4o-mini"
api_key = ""  # Set via OPENAI_API_KEY env var
base_url = ""  # Optional: Set via OPENAI_BASE_URL env var

[embedding]
provider = "openai"  # or "hashing" for offline use
model = "text-embedding-3-small"
dimensions = 256  # hashing only

[retrieval]
top_k = 3
min_score = 0.8
alpha = 0.7
bm25_k1 = 1.5
bm25_b = 0.75

[planner]
mode = "search"  # search, direct, auto
max_iterations = 3
max_candidate_skills = 10

[skills]
directories = []
include_personal = true  # ~/.skillweave/skills
include_project = true  # ./.skillweave/skills

[execution]
auto_run = false
use_sandbox = true
workspace = ""  # Set via SKILLWEAVE_WORKSPACE env var; temporary when empty
timeout_secs = 300
image = "python:3.11-slim"
memory_limit = "512m"
network_enabled = false
enable_security_check = true
stop_on_failure = true
guided = false  # model writes each skill's commands and repairs failures
max_attempts = 3

[logging]
level = "info"  # trace, debug, info, warn, error
format = "pretty"  # or "json"
"#;

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn provider(&self) -> anyhow::Result<LlmProvider> {
        match self.provider.as_str() {
            "openai" => Ok(LlmProvider::openai_full(
                &self.model,
                non_empty(&self.api_key),
                non_empty(&self.base_url),
            )),
            "ollama" => Ok(LlmProvider::ollama(
                &self.model,
                non_empty(&self.base_url).unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            )),
            other => bail!("Unknown llm provider '{}' (expected openai or ollama)", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 256,
            api_key: None,
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    /// Remote embeddings reuse the LLM credentials unless set here
    pub fn provider(&self, llm: &LlmConfig) -> anyhow::Result<EmbeddingProvider> {
        match self.provider.as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAI {
                model: self.model.clone(),
                api_key: non_empty(&self.api_key).or_else(|| non_empty(&llm.api_key)),
                base_url: non_empty(&self.base_url).or_else(|| non_empty(&llm.base_url)),
            }),
            "hashing" => Ok(EmbeddingProvider::hashing(self.dimensions)),
            other => bail!(
                "Unknown embedding provider '{}' (expected openai or hashing)",
                other
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f64,
    pub alpha: f64,
    pub bm25_k1: f64,
    pub bm25_b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.8,
            alpha: 0.7,
            bm25_k1: 1.5,
            bm25_b: 0.75,
        }
    }
}

impl RetrievalConfig {
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions::default()
            .with_top_k(self.top_k)
            .with_min_score(self.min_score)
            .with_alpha(self.alpha)
    }

    pub fn bm25(&self) -> Bm25Params {
        Bm25Params {
            k1: self.bm25_k1,
            b: self.bm25_b,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlannerSection {
    pub mode: PlannerMode,
    pub max_iterations: u32,
    pub max_candidate_skills: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        let defaults = PlannerConfig::default();
        Self {
            mode: defaults.mode,
            max_iterations: defaults.max_iterations,
            max_candidate_skills: defaults.max_candidate_skills,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SkillsConfig {
    pub directories: Vec<String>,
    pub include_personal: bool,
    pub include_project: bool,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            include_personal: true,
            include_project: true,
        }
    }
}

impl SkillsConfig {
    /// Configured roots with `~` expanded
    pub fn expanded_directories(&self) -> Vec<PathBuf> {
        self.directories
            .iter()
            .filter(|d| !d.trim().is_empty())
            .map(|d| expand_home(d.trim()))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run the planned DAG right after planning
    pub auto_run: bool,
    pub use_sandbox: bool,
    pub workspace: Option<String>,
    pub timeout_secs: u64,
    pub image: String,
    pub memory_limit: String,
    pub network_enabled: bool,
    pub enable_security_check: bool,
    pub stop_on_failure: bool,
    /// Model-written commands with repair instead of the bundled artifact
    pub guided: bool,
    /// Attempts per guided command
    pub max_attempts: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let container = ContainerConfig::default();
        Self {
            auto_run: false,
            use_sandbox: container.use_sandbox,
            workspace: None,
            timeout_secs: container.timeout_secs,
            image: container.docker.image,
            memory_limit: container.docker.memory_limit,
            network_enabled: container.docker.network_enabled,
            enable_security_check: container.enable_security_check,
            stop_on_failure: true,
            guided: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ExecutionConfig {
    pub fn container(&self) -> ContainerConfig {
        ContainerConfig {
            workspace: non_empty(&self.workspace).map(|w| expand_home(&w)),
            timeout_secs: self.timeout_secs,
            use_sandbox: self.use_sandbox,
            enable_security_check: self.enable_security_check,
            docker: DockerConfig {
                image: self.image.clone(),
                memory_limit: self.memory_limit.clone(),
                network_enabled: self.network_enabled,
                ..DockerConfig::default()
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub planner: PlannerSection,
    pub skills: SkillsConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

impl Config {
    /// Get the global config path: ~/.skillweave/skillweave.toml
    fn global_config_path() -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".skillweave").join("skillweave.toml"))
    }

    /// Ensure global config directory and file exist, creating defaults if needed
    fn ensure_global_config() -> anyhow::Result<PathBuf> {
        let config_path = Self::global_config_path()?;
        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir).with_context(|| {
                    format!("Failed to create config directory {}", config_dir.display())
                })?;
                eprintln!("Created config directory: {}", config_dir.display());
            }
        }

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG.trim())?;
            eprintln!("Created default config: {}", config_path.display());
            eprintln!("Please edit this file or set environment variables.");
        }

        Ok(config_path)
    }

    /// Load configuration with layered approach:
    /// 1. Global config: ~/.skillweave/skillweave.toml (auto-created if missing)
    /// 2. Local override: ./skillweave.toml (workspace, optional)
    /// 3. Environment variables (highest priority)
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file from current directory
        dotenvy::dotenv().ok();

        let global_config_path = Self::ensure_global_config()?;
        Self::load_from(&global_config_path, Path::new("skillweave"))
    }

    /// Layered load from explicit files; `local` is looked up without extension
    pub fn load_from(global: &Path, local: &Path) -> anyhow::Result<Self> {
        let mut config_builder = config::Config::builder()
            // Layer 1: Global config (required - created if missing)
            .add_source(config::File::from(global.to_path_buf()))
            // Layer 2: Local workspace config (optional override)
            .add_source(config::File::from(local.to_path_buf()).required(false))
            // Layer 3: Environment variables with SKILLWEAVE__ prefix
            .add_source(config::Environment::with_prefix("SKILLWEAVE").separator("__"));

        // Layer 4: Apply convenience env var overrides (highest priority)
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config_builder = config_builder.set_override("llm.api_key", key)?;
        }

        if let Ok(url) = env::var("OPENAI_BASE_URL") {
            config_builder = config_builder.set_override("llm.base_url", url)?;
        }

        if let Ok(workspace) = env::var("SKILLWEAVE_WORKSPACE") {
            config_builder = config_builder.set_override("execution.workspace", workspace)?;
        }

        let config = config_builder
            .build()
            .with_context(|| format!("Failed to read config from {}", global.display()))?;

        let config: Self = config.try_deserialize()?;
        Ok(config)
    }
}
