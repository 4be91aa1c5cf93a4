//! Dynamic Skill Generation
//!
//! Turns a natural-language description into an installed skill: the LLM
//! writes Python source, which passes through fence stripping, marker
//! validation, the code guard's pattern scan, and a syntax check before it
//! is written to disk and hot-loaded. A failure at any stage leaves the
//! registry and the skills directory unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::dynamic::{compile_check, DynamicSkill};
use super::registry::{SkillRegistry, SkillSource};
use crate::guard::CodeGuard;
use crate::llm::LlmClient;

/// Substrings every dynamic skill file must contain
const REQUIRED_MARKERS: &[&str] = &["def run(", "def get_tool_definition("];

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```python\s*").expect("static pattern"));
static FENCE_ANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*").expect("static pattern"));
static DECLARED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""name":\s*"([a-zA-Z_][a-zA-Z0-9_]*)""#).expect("static pattern"));

const GENERATION_PROMPT: &str = r#"你是一个 Python 技能开发专家。用户需要一个新技能来完成任务。

## 任务需求
{task_description}

## 已有技能
{existing_skills}

## 技能开发规范
1. 必须包含 `run(arguments: dict)` 函数 - 执行技能逻辑
2. 必须包含 `get_tool_definition()` 函数 - 返回 OpenAI Tool Schema
3. 使用 Python 标准库优先，必要时使用 requests
4. 返回值必须是 dict 格式，包含 status 和 message/data 字段
5. 处理好异常情况，返回友好的错误信息
6. 技能名称使用下划线命名法，如 `podcast_fetcher`

请根据任务需求，编写一个完整的 Python 技能文件。只输出代码，不要有其他内容。"#;

/// Skill generator backed by the chat endpoint
pub struct SkillGenerator {
    llm: LlmClient,
    skills_dir: PathBuf,
}

impl SkillGenerator {
    pub fn new(llm: LlmClient, skills_dir: PathBuf) -> Self {
        Self { llm, skills_dir }
    }

    pub fn skills_dir(&self) -> &PathBuf {
        &self.skills_dir
    }

    /// Ask the LLM for skill source code
    ///
    /// Returns the raw response; `None` signals a generation failure the
    /// caller reports upward.
    pub async fn generate(&self, description: &str, existing_skills: &str) -> Option<String> {
        let prompt = GENERATION_PROMPT
            .replace("{task_description}", description)
            .replace(
                "{existing_skills}",
                if existing_skills.is_empty() {
                    "暂无已有技能"
                } else {
                    existing_skills
                },
            );

        match self.llm.simple_chat(&prompt, "You are a helpful assistant.").await {
            Ok(code) if !code.trim().is_empty() => Some(code),
            Ok(_) => None,
            Err(e) => {
                warn!("Skill generation failed: {}", e);
                None
            }
        }
    }

    /// Strip markdown code fences from generated source
    pub fn clean_code(code: &str) -> String {
        let code = FENCE_OPEN.replace_all(code, "");
        let code = FENCE_ANY.replace_all(&code, "");
        code.trim().to_string()
    }

    /// Both entry-point markers must appear literally in the source
    pub fn has_required_markers(code: &str) -> bool {
        REQUIRED_MARKERS.iter().all(|m| code.contains(m))
    }

    /// Pull the declared tool name out of the source, if any
    pub fn extract_skill_name(code: &str) -> Option<String> {
        DECLARED_NAME
            .captures(code)
            .map(|c| c[1].to_string())
    }

    /// Fallback name when the code declares none
    pub fn auto_name() -> String {
        format!(
            "auto_skill_{}_{}",
            chrono::Utc::now().timestamp(),
            &uuid::Uuid::new_v4().simple().to_string()[..6]
        )
    }

    /// Validate, persist, hot-load, and register skill source
    ///
    /// Returns the tool-result JSON shape. On any failure nothing is
    /// written and the registry is unchanged.
    pub async fn install(
        &self,
        registry: &mut SkillRegistry,
        guard: &CodeGuard,
        name: Option<&str>,
        raw_code: &str,
    ) -> Value {
        let code = Self::clean_code(raw_code);

        if code.is_empty() {
            return serde_json::json!({"success": false, "error": "技能生成失败：LLM 无响应"});
        }

        if !Self::has_required_markers(&code) {
            return serde_json::json!({
                "success": false,
                "error": "技能代码验证失败：缺少 run() 或 get_tool_definition()",
            });
        }

        let (dangerous, dangers) = guard.check_dangerous(&code);
        if dangerous {
            return serde_json::json!({
                "success": false,
                "error": "代码包含危险模式，禁止创建",
                "dangers": dangers,
            });
        }

        let (suspicious, warnings) = guard.check_suspicious(&code);
        if suspicious {
            warn!("Generated skill contains suspicious patterns: {:?}", warnings);
        }

        match compile_check(&code).await {
            Ok(None) => {}
            Ok(Some(err)) => {
                return serde_json::json!({
                    "success": false,
                    "error": format!("技能代码验证失败：语法错误 ({})", err),
                });
            }
            Err(e) => {
                return serde_json::json!({
                    "success": false,
                    "error": format!("技能代码验证失败：{}", e),
                });
            }
        }

        let skill_name = name
            .map(sanitize_name)
            .filter(|n| !n.is_empty())
            .or_else(|| Self::extract_skill_name(&code))
            .unwrap_or_else(Self::auto_name);

        if let Err(e) = std::fs::create_dir_all(&self.skills_dir) {
            return serde_json::json!({"success": false, "error": format!("技能保存失败: {}", e)});
        }
        let path = self.skills_dir.join(format!("{}.py", skill_name));
        if let Err(e) = std::fs::write(&path, &code) {
            return serde_json::json!({"success": false, "error": format!("技能保存失败: {}", e)});
        }

        // Hot-load; a file that fails its schema probe is removed again so a
        // later stage failure leaves no partial state behind.
        let skill = match DynamicSkill::load(&path).await {
            Ok(s) => s,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return serde_json::json!({
                    "success": false,
                    "error": format!("技能 {} 加载失败: {}", skill_name, e),
                });
            }
        };

        if !registry.register(Arc::new(skill), SkillSource::DynamicFile(path.clone())) {
            let _ = std::fs::remove_file(&path);
            return serde_json::json!({
                "success": false,
                "error": "技能 Schema 格式错误：缺少 function.name",
            });
        }

        info!("New skill installed: {} ({})", skill_name, path.display());
        serde_json::json!({
            "success": true,
            "message": format!("技能 {} 创建成功，现在可以使用", skill_name),
            "skill_name": skill_name,
            "filepath": path.display().to_string(),
            "warnings": warnings,
        })
    }

    /// Generate from a description, then install
    pub async fn generate_and_install(
        &self,
        registry: &mut SkillRegistry,
        guard: &CodeGuard,
        description: &str,
    ) -> Value {
        let existing = registry.summary();
        let code = match self.generate(description, &existing).await {
            Some(c) => c,
            None => {
                return serde_json::json!({"success": false, "error": "技能生成失败：LLM 无响应"})
            }
        };

        self.install(registry, guard, None, &code).await
    }
}

/// Keep names to snake_case alphanumerics
fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::ModificationLevel;
    use tempfile::TempDir;

    #[test]
    fn test_clean_code_strips_fences() {
        let fenced = "```python\ndef run(arguments):\n    return {}\n```";
        let cleaned = SkillGenerator::clean_code(fenced);
        assert!(!cleaned.contains("```"));
        assert!(cleaned.starts_with("def run("));
    }

    #[test]
    fn test_marker_validation() {
        assert!(SkillGenerator::has_required_markers(
            "def run(arguments):\n    pass\ndef get_tool_definition():\n    pass"
        ));
        assert!(!SkillGenerator::has_required_markers("def run(arguments):\n    pass"));
        assert!(!SkillGenerator::has_required_markers("print('hello')"));
    }

    #[test]
    fn test_extract_skill_name() {
        let code = r#"return {"function": {"name": "podcast_fetcher", "description": "x"}}"#;
        assert_eq!(
            SkillGenerator::extract_skill_name(code),
            Some("podcast_fetcher".to_string())
        );
        assert_eq!(SkillGenerator::extract_skill_name("no name here"), None);
    }

    #[test]
    fn test_auto_name_shape() {
        let name = SkillGenerator::auto_name();
        assert!(name.starts_with("auto_skill_"));
        let other = SkillGenerator::auto_name();
        assert_ne!(name, other);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My Skill!"), "myskill");
        assert_eq!(sanitize_name("pod_cast_2"), "pod_cast_2");
    }

    #[tokio::test]
    async fn test_install_rejects_missing_markers() {
        let dir = TempDir::new().unwrap();
        let gen = SkillGenerator::new(
            LlmClient::new(None, "http://localhost:1", "test"),
            dir.path().join("agent_skills"),
        );
        let guard = CodeGuard::new(dir.path(), ModificationLevel::SkillsOnly);
        let mut registry = SkillRegistry::new();

        let result = gen
            .install(&mut registry, &guard, Some("bad"), "print('no markers')")
            .await;

        assert_eq!(result["success"], false);
        assert!(registry.is_empty());
        assert!(!dir.path().join("agent_skills/bad.py").exists());
    }

    #[tokio::test]
    async fn test_install_rejects_dangerous_code() {
        let dir = TempDir::new().unwrap();
        let gen = SkillGenerator::new(
            LlmClient::new(None, "http://localhost:1", "test"),
            dir.path().join("agent_skills"),
        );
        let guard = CodeGuard::new(dir.path(), ModificationLevel::SkillsOnly);
        let mut registry = SkillRegistry::new();

        let code = "def run(arguments):\n    eval(arguments['x'])\ndef get_tool_definition():\n    return {}";
        let result = gen.install(&mut registry, &guard, Some("evil"), code).await;

        assert_eq!(result["success"], false);
        assert!(result["dangers"].as_array().is_some());
        assert!(registry.is_empty());
        assert!(!dir.path().join("agent_skills/evil.py").exists());
    }

    #[tokio::test]
    async fn test_install_valid_skill() {
        if !crate::skills::dynamic::interpreter_available().await {
            return;
        }

        let dir = TempDir::new().unwrap();
        let gen = SkillGenerator::new(
            LlmClient::new(None, "http://localhost:1", "test"),
            dir.path().join("agent_skills"),
        );
        let guard = CodeGuard::new(dir.path(), ModificationLevel::SkillsOnly);
        let mut registry = SkillRegistry::new();

        let code = r#"
def get_tool_definition():
    return {
        "type": "function",
        "function": {
            "name": "greeter",
            "description": "Say hello",
            "parameters": {"type": "object", "properties": {}, "required": []},
        },
    }

def run(arguments):
    return {"status": "success", "message": "hello"}
"#;

        let result = gen.install(&mut registry, &guard, Some("greeter"), code).await;
        assert_eq!(result["success"], true, "install failed: {}", result);
        assert!(registry.get("greeter").is_some());
        assert!(dir.path().join("agent_skills/greeter.py").exists());
    }
}
