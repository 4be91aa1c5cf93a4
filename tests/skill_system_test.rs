//! Skill system integration tests
//!
//! Exercises the full built-in skill set through the registry: search,
//! schema shape, and the generation/validation pipeline.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

use neo_agent::browser::{BrowserConfig, BrowserController, SessionManager};
use neo_agent::desktop::DesktopAgent;
use neo_agent::guard::{CodeGuard, ModificationLevel, SafetyGuard};
use neo_agent::llm::LlmClient;
use neo_agent::memory::MemoryStore;
use neo_agent::skills::builtin::{self, BuiltinDeps};
use neo_agent::skills::{SkillGenerator, SkillRegistry};

fn full_registry(dir: &Path) -> SkillRegistry {
    let llm = LlmClient::new(None, "http://localhost:1/v1/chat/completions", "test");
    let safety = Arc::new(SafetyGuard::new(&dir.join("audit")));

    let deps = BuiltinDeps {
        llm: llm.clone(),
        memory: Arc::new(Mutex::new(
            MemoryStore::open(&dir.join("memory"), 20).unwrap(),
        )),
        browser: Arc::new(Mutex::new(BrowserController::new(
            BrowserConfig::default(),
            safety.clone(),
        ))),
        sessions: Arc::new(Mutex::new(
            SessionManager::open(&dir.join("sessions"), Some("test")).unwrap(),
        )),
        desktop: Arc::new(DesktopAgent::new(safety)),
        code_guard: Arc::new(Mutex::new(CodeGuard::new(dir, ModificationLevel::SkillsOnly))),
    };

    let mut registry = SkillRegistry::new();
    builtin::register_all(&mut registry, deps);
    registry
}

#[test]
fn builtin_skills_all_register() {
    let dir = TempDir::new().unwrap();
    let registry = full_registry(dir.path());

    for name in [
        "notes_operator",
        "chat",
        "http_request",
        "rss_fetcher",
        "web_scraper",
        "web_search",
        "memory_operator",
        "browser_agent",
        "browser_agent_save_credentials",
        "browser_agent_list_sites",
        "desktop_agent",
        "desktop_list_common_apps",
        "code_guard_status",
        "code_guard_set_level",
        "code_guard_history",
        "code_guard_rollback",
    ] {
        assert!(registry.get(name).is_some(), "missing skill: {}", name);
    }
}

#[test]
fn search_finds_notes_skill_by_chinese_keyword() {
    let dir = TempDir::new().unwrap();
    let registry = full_registry(dir.path());

    let results = registry.search("备忘录", 5);
    assert!(!results.is_empty());
    assert_eq!(results[0].name, "notes_operator");
    assert!(results[0].score > 0.0);
}

#[test]
fn search_finds_browser_skill_for_site_queries() {
    let dir = TempDir::new().unwrap();
    let registry = full_registry(dir.path());

    let results = registry.search("看看小红书上有什么", 5);
    assert!(results.iter().any(|m| m.name == "browser_agent"));
}

#[test]
fn every_schema_carries_function_name() {
    let dir = TempDir::new().unwrap();
    let registry = full_registry(dir.path());

    for schema in registry.schemas() {
        assert!(neo_agent::skills::schema::function_name(&schema).is_some());
    }
}

#[tokio::test]
async fn generator_rejects_incomplete_code_and_leaves_registry_unchanged() {
    let dir = TempDir::new().unwrap();
    let generator = SkillGenerator::new(
        LlmClient::new(None, "http://localhost:1", "test"),
        dir.path().join("agent_skills"),
    );
    let guard = CodeGuard::new(dir.path(), ModificationLevel::SkillsOnly);
    let mut registry = full_registry(dir.path());
    let before = registry.len();

    // Missing get_tool_definition
    let result = generator
        .install(&mut registry, &guard, Some("half"), "def run(arguments):\n    return {}")
        .await;
    assert_eq!(result["success"], false);

    // Dangerous pattern
    let evil = "def run(arguments):\n    exec('x')\ndef get_tool_definition():\n    return {}";
    let result = generator
        .install(&mut registry, &guard, Some("evil"), evil)
        .await;
    assert_eq!(result["success"], false);

    assert_eq!(registry.len(), before);
    assert!(!dir.path().join("agent_skills/half.py").exists());
    assert!(!dir.path().join("agent_skills/evil.py").exists());
}

#[tokio::test]
async fn generated_skill_hot_loads_and_replaces_on_name_collision() {
    if !neo_agent::skills::dynamic::interpreter_available().await {
        return;
    }

    let dir = TempDir::new().unwrap();
    let generator = SkillGenerator::new(
        LlmClient::new(None, "http://localhost:1", "test"),
        dir.path().join("agent_skills"),
    );
    let guard = CodeGuard::new(dir.path(), ModificationLevel::SkillsOnly);
    let mut registry = SkillRegistry::new();

    let code_v1 = r#"
def get_tool_definition():
    return {
        "type": "function",
        "function": {
            "name": "fortune",
            "description": "First version",
            "parameters": {"type": "object", "properties": {}, "required": []},
        },
    }

def run(arguments):
    return {"status": "success", "version": 1}
"#;

    let result = generator
        .install(&mut registry, &guard, Some("fortune"), code_v1)
        .await;
    assert_eq!(result["success"], true, "install failed: {}", result);
    assert_eq!(registry.len(), 1);

    let invoked = registry
        .get("fortune")
        .unwrap()
        .invoke(serde_json::json!({}))
        .await;
    assert_eq!(invoked["version"], 1);

    // Same name again: silently replaces
    let code_v2 = code_v1.replace("First version", "Second version").replace(
        "\"version\": 1",
        "\"version\": 2",
    );
    let result = generator
        .install(&mut registry, &guard, Some("fortune"), &code_v2)
        .await;
    assert_eq!(result["success"], true);
    assert_eq!(registry.len(), 1);

    let invoked = registry
        .get("fortune")
        .unwrap()
        .invoke(serde_json::json!({}))
        .await;
    assert_eq!(invoked["version"], 2);
}

#[tokio::test]
async fn dynamic_dir_reloads_skills_at_startup() {
    if !neo_agent::skills::dynamic::interpreter_available().await {
        return;
    }

    let dir = TempDir::new().unwrap();
    let skills_dir = dir.path().join("agent_skills");
    std::fs::create_dir_all(&skills_dir).unwrap();
    std::fs::write(
        skills_dir.join("stored.py"),
        r#"
def get_tool_definition():
    return {
        "type": "function",
        "function": {
            "name": "stored",
            "description": "Loaded from disk",
            "parameters": {"type": "object", "properties": {}, "required": []},
        },
    }

def run(arguments):
    return {"status": "success"}
"#,
    )
    .unwrap();
    // A broken file must be skipped without failing the whole load
    std::fs::write(skills_dir.join("broken.py"), "not python ((((").unwrap();

    let mut registry = SkillRegistry::new();
    let loaded = registry.load_dynamic_dir(&skills_dir).await;
    assert_eq!(loaded, 1);
    assert!(registry.get("stored").is_some());
}
