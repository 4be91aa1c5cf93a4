//! Code Guard Skills
//!
//! Inspect and control the code-modification guard from the conversation.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::guard::{CodeGuard, ModificationLevel};
use crate::skills::registry::Skill;
use crate::skills::schema::ToolSpec;

pub struct CodeGuardStatusSkill {
    guard: Arc<Mutex<CodeGuard>>,
}

impl CodeGuardStatusSkill {
    pub fn new(guard: Arc<Mutex<CodeGuard>>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Skill for CodeGuardStatusSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "code_guard_status",
            "查看代码保护系统状态：当前保护级别、沙盒目录、修改记录数量。",
        )
        .build()
    }

    async fn invoke(&self, _args: Value) -> Value {
        let status = self.guard.lock().await.status();
        json!({
            "success": true,
            "level": status.level,
            "sandbox_dirs": status.sandbox_dirs,
            "modifications_count": status.modifications_count,
            "backup_dir": status.backup_dir,
        })
    }
}

pub struct CodeGuardSetLevelSkill {
    guard: Arc<Mutex<CodeGuard>>,
}

impl CodeGuardSetLevelSkill {
    pub fn new(guard: Arc<Mutex<CodeGuard>>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Skill for CodeGuardSetLevelSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "code_guard_set_level",
            "设置代码保护级别。none 禁止所有修改，skills_only 只允许技能目录，extensions 增加扩展目录，full_with_approval 任意位置但需确认。",
        )
        .enum_param(
            "level",
            "保护级别",
            &["none", "skills_only", "extensions", "full_with_approval"],
            true,
        )
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let level_str = args["level"].as_str().unwrap_or("");
        let level = match ModificationLevel::parse(level_str) {
            Some(l) => l,
            None => return json!({"success": false, "error": format!("未知级别: {}", level_str)}),
        };

        self.guard.lock().await.set_level(level);
        json!({"success": true, "message": format!("保护级别已设置为 {}", level.as_str())})
    }
}

pub struct CodeGuardHistorySkill {
    guard: Arc<Mutex<CodeGuard>>,
}

impl CodeGuardHistorySkill {
    pub fn new(guard: Arc<Mutex<CodeGuard>>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Skill for CodeGuardHistorySkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "code_guard_history",
            "查看最近的代码修改历史记录。",
        )
        .int_param("limit", "返回记录数量，默认 10", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let limit = args["limit"].as_u64().unwrap_or(10) as usize;
        let records = self.guard.lock().await.history(limit);

        let history: Vec<Value> = records
            .iter()
            .map(|r| {
                json!({
                    "timestamp": r.timestamp,
                    "file": r.file_path,
                    "reason": r.reason,
                    "approved": r.approved,
                })
            })
            .collect();

        json!({"success": true, "history": history})
    }
}

pub struct CodeGuardRollbackSkill {
    guard: Arc<Mutex<CodeGuard>>,
}

impl CodeGuardRollbackSkill {
    pub fn new(guard: Arc<Mutex<CodeGuard>>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Skill for CodeGuardRollbackSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "code_guard_rollback",
            "回滚最近的代码修改，从备份恢复文件。",
        )
        .int_param("steps", "回滚步数，默认 1", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let steps = args["steps"].as_u64().unwrap_or(1) as usize;
        self.guard.lock().await.rollback(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard() -> (TempDir, Arc<Mutex<CodeGuard>>) {
        let dir = TempDir::new().unwrap();
        let guard = Arc::new(Mutex::new(CodeGuard::new(
            dir.path(),
            ModificationLevel::SkillsOnly,
        )));
        (dir, guard)
    }

    #[tokio::test]
    async fn test_status_skill() {
        let (_d, g) = guard();
        let skill = CodeGuardStatusSkill::new(g);
        let result = skill.invoke(json!({})).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["level"], "skills_only");
    }

    #[tokio::test]
    async fn test_set_level_skill() {
        let (_d, g) = guard();
        let skill = CodeGuardSetLevelSkill::new(g.clone());

        let result = skill.invoke(json!({"level": "extensions"})).await;
        assert_eq!(result["success"], true);
        assert_eq!(g.lock().await.level(), ModificationLevel::Extensions);

        let result = skill.invoke(json!({"level": "yolo"})).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn test_rollback_with_no_history() {
        let (_d, g) = guard();
        let skill = CodeGuardRollbackSkill::new(g);
        let result = skill.invoke(json!({})).await;
        assert_eq!(result["success"], false);
    }
}
