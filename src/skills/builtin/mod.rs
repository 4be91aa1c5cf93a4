//! Built-in Skills
//!
//! The static skill set registered at startup: notes, HTTP/RSS/scraping,
//! web search, open-ended chat, memory access, browser and desktop
//! automation, and the code-guard controls.

pub mod browser;
pub mod chat;
pub mod code_guard;
pub mod desktop;
pub mod http;
pub mod memory;
pub mod notes;

use std::sync::Arc;
use tokio::sync::Mutex;

use super::registry::{SkillRegistry, SkillSource};
use crate::browser::{BrowserController, SessionManager};
use crate::desktop::DesktopAgent;
use crate::guard::CodeGuard;
use crate::llm::LlmClient;
use crate::memory::MemoryStore;

/// Shared handles the built-in skills close over
pub struct BuiltinDeps {
    pub llm: LlmClient,
    pub memory: Arc<Mutex<MemoryStore>>,
    pub browser: Arc<Mutex<BrowserController>>,
    pub sessions: Arc<Mutex<SessionManager>>,
    pub desktop: Arc<DesktopAgent>,
    pub code_guard: Arc<Mutex<CodeGuard>>,
}

/// Register every built-in skill
pub fn register_all(registry: &mut SkillRegistry, deps: BuiltinDeps) {
    let skills: Vec<Arc<dyn super::registry::Skill>> = vec![
        Arc::new(notes::NotesSkill::new()),
        Arc::new(chat::ChatSkill::new(deps.llm.clone())),
        Arc::new(http::HttpRequestSkill::new()),
        Arc::new(http::RssSkill::new()),
        Arc::new(http::WebScraperSkill::new()),
        Arc::new(http::WebSearchSkill::new()),
        Arc::new(memory::MemorySkill::new(deps.memory)),
        Arc::new(browser::BrowserSkill::new(deps.browser)),
        Arc::new(browser::BrowserCredentialSkill::new(deps.sessions.clone())),
        Arc::new(browser::BrowserListSitesSkill::new(deps.sessions)),
        Arc::new(desktop::DesktopSkill::new(deps.desktop.clone())),
        Arc::new(desktop::DesktopAppListSkill::new(deps.desktop)),
        Arc::new(code_guard::CodeGuardStatusSkill::new(deps.code_guard.clone())),
        Arc::new(code_guard::CodeGuardSetLevelSkill::new(deps.code_guard.clone())),
        Arc::new(code_guard::CodeGuardHistorySkill::new(deps.code_guard.clone())),
        Arc::new(code_guard::CodeGuardRollbackSkill::new(deps.code_guard)),
    ];

    for skill in skills {
        registry.register(skill, SkillSource::Static);
    }
}
