//! Notes Skill
//!
//! Creates and appends to macOS Notes through osascript.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::desktop::escape_applescript;
use crate::skills::registry::Skill;
use crate::skills::sandbox::{Sandbox, SandboxConfig};
use crate::skills::schema::ToolSpec;

pub struct NotesSkill {
    sandbox: Sandbox,
}

impl NotesSkill {
    pub fn new() -> Self {
        Self {
            sandbox: Sandbox::new(SandboxConfig::default()),
        }
    }

    async fn run_script(&self, script: &str) -> Value {
        if !cfg!(target_os = "macos") {
            return json!({"success": false, "error": "备忘录操作仅支持 macOS"});
        }

        match self.sandbox.run("osascript", &["-e", script], None).await {
            Ok(r) if r.success => json!({"success": true, "output": r.stdout.trim()}),
            Ok(r) => json!({"success": false, "error": r.stderr.trim()}),
            Err(e) => json!({"success": false, "error": format!("osascript 启动失败: {}", e)}),
        }
    }
}

impl Default for NotesSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for NotesSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "notes_operator",
            "用于在 macOS 备忘录应用中进行操作。当用户想要记录信息、保存备忘、创建清单时使用。",
        )
        .enum_param(
            "action",
            "操作类型。'create'表示新建备忘录，'append'表示在现有备忘录末尾追加内容。",
            &["create", "append"],
            true,
        )
        .string_param("title", "备忘录的标题。仅在 create 模式下必须提供。", false)
        .string_param("content", "备忘录的具体内容。", true)
        .string_param(
            "target_note_name",
            "目标备忘录的名称。仅在 append 模式下需要，用于查找要追加的备忘录。",
            false,
        )
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let action = args["action"].as_str().unwrap_or("");
        let content = args["content"].as_str().unwrap_or("");

        if content.is_empty() {
            return json!({"success": false, "error": "缺少备忘录内容"});
        }

        match action {
            "create" => {
                let title = args["title"].as_str().unwrap_or("新备忘录");
                let script = format!(
                    r#"tell application "Notes" to make new note at folder "Notes" with properties {{name:"{}", body:"{}"}}"#,
                    escape_applescript(title),
                    escape_applescript(content)
                );
                let mut result = self.run_script(&script).await;
                if result["success"] == true {
                    result["message"] = json!(format!("备忘录 \"{}\" 已创建", title));
                }
                result
            }
            "append" => {
                let target = match args["target_note_name"].as_str() {
                    Some(t) if !t.is_empty() => t,
                    _ => return json!({"success": false, "error": "append 模式需要 target_note_name"}),
                };
                let script = format!(
                    r#"tell application "Notes"
    set target to first note whose name is "{}"
    set body of target to (body of target) & "<br>{}"
end tell"#,
                    escape_applescript(target),
                    escape_applescript(content)
                );
                let mut result = self.run_script(&script).await;
                if result["success"] == true {
                    result["message"] = json!(format!("已追加到备忘录 \"{}\"", target));
                }
                result
            }
            other => json!({"success": false, "error": format!("未知操作: {}", other)}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::schema::function_name;

    #[test]
    fn test_definition_contains_search_keywords() {
        let skill = NotesSkill::new();
        let schema = skill.definition();
        assert_eq!(function_name(&schema), Some("notes_operator"));
        assert!(schema["function"]["description"]
            .as_str()
            .unwrap()
            .contains("备忘录"));
    }

    #[tokio::test]
    async fn test_missing_content_rejected() {
        let skill = NotesSkill::new();
        let result = skill.invoke(json!({"action": "create"})).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn test_append_requires_target() {
        let skill = NotesSkill::new();
        let result = skill
            .invoke(json!({"action": "append", "content": "x"}))
            .await;
        assert_eq!(result["success"], false);
    }
}
