//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat-completions API key (bearer token)
    pub llm_api_key: Option<String>,

    /// Chat-completions endpoint URL
    pub llm_base_url: String,

    /// Model identifier sent with every request
    pub llm_model: String,

    /// Root directory for persisted state (memory, sessions, audit logs)
    pub data_dir: PathBuf,

    /// Directory for agent-generated skill files
    pub skills_dir: PathBuf,

    /// Maximum ReAct loop iterations per request
    pub max_iterations: usize,

    /// Short-term memory capacity (entries)
    pub max_short_term: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let llm_api_key = std::env::var("LLM_API_KEY").ok();

        let llm_base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.qnaigc.com/v1/chat/completions".to_string());

        let llm_model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| "deepseek/deepseek-v3.2-251201".to_string());

        let data_dir = std::env::var("NEO_DATA_DIR")
            .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("neo")
            });

        let skills_dir = std::env::var("NEO_SKILLS_DIR")
            .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
            .unwrap_or_else(|_| PathBuf::from("agent_skills"));

        let max_iterations = std::env::var("NEO_MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let max_short_term = std::env::var("NEO_MAX_SHORT_TERM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Ok(Self {
            llm_api_key,
            llm_base_url,
            llm_model,
            data_dir,
            skills_dir,
            max_iterations,
            max_short_term,
        })
    }

    /// Path for the persisted audit log
    pub fn audit_log_dir(&self) -> PathBuf {
        self.data_dir.join("audit_logs")
    }

    /// Path for memory state files
    pub fn memory_dir(&self) -> PathBuf {
        self.data_dir.join("memory")
    }

    /// Path for browser session files
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }
}
