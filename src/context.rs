//! Agent Context
//!
//! Explicitly owned bundle of every stateful component: skill registry,
//! guards, memory, browser, desktop, and the LLM client. Passed to the
//! ReAct loop and the CLI instead of living in process globals, so several
//! sessions can coexist.

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::browser::{BrowserConfig, BrowserController, SessionManager};
use crate::config::Config;
use crate::desktop::DesktopAgent;
use crate::guard::{CodeGuard, ModificationLevel, SafetyGuard};
use crate::llm::LlmClient;
use crate::memory::MemoryStore;
use crate::skills::builtin;
use crate::skills::generator::SkillGenerator;
use crate::skills::registry::SkillRegistry;

/// Shared handles for one assistant instance
#[derive(Clone)]
pub struct AgentContext {
    pub config: Config,
    pub llm: LlmClient,
    pub registry: Arc<RwLock<SkillRegistry>>,
    pub safety: Arc<SafetyGuard>,
    pub code_guard: Arc<Mutex<CodeGuard>>,
    pub memory: Arc<Mutex<MemoryStore>>,
    pub generator: Arc<SkillGenerator>,
}

impl AgentContext {
    /// Build every component and register the built-in skills
    pub async fn initialize(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

        let llm = LlmClient::from_config(&config);
        let safety = Arc::new(SafetyGuard::new(&config.audit_log_dir()));

        let base_dir = std::env::current_dir().unwrap_or_else(|_| ".".into());
        let code_guard = Arc::new(Mutex::new(CodeGuard::new(
            &base_dir,
            ModificationLevel::SkillsOnly,
        )));

        let memory = Arc::new(Mutex::new(MemoryStore::open(
            &config.memory_dir(),
            config.max_short_term,
        )?));

        let sessions = Arc::new(Mutex::new(SessionManager::open(
            &config.sessions_dir(),
            None,
        )?));

        let browser = Arc::new(Mutex::new(BrowserController::new(
            BrowserConfig::from_env(),
            safety.clone(),
        )));

        let desktop = Arc::new(DesktopAgent::new(safety.clone()));

        let generator = Arc::new(SkillGenerator::new(llm.clone(), config.skills_dir.clone()));

        let mut registry = SkillRegistry::new();
        builtin::register_all(
            &mut registry,
            builtin::BuiltinDeps {
                llm: llm.clone(),
                memory: memory.clone(),
                browser,
                sessions,
                desktop,
                code_guard: code_guard.clone(),
            },
        );

        let dynamic = registry.load_dynamic_dir(&config.skills_dir).await;
        info!(
            "Context ready: {} skills registered ({} dynamic)",
            registry.len(),
            dynamic
        );

        Ok(Self {
            config,
            llm,
            registry: Arc::new(RwLock::new(registry)),
            safety,
            code_guard,
            memory,
            generator,
        })
    }
}
