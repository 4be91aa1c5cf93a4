//! Memory Skill
//!
//! Lets the model read and write the assistant's memory store directly.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::memory::MemoryStore;
use crate::skills::registry::Skill;
use crate::skills::schema::ToolSpec;

pub struct MemorySkill {
    memory: Arc<Mutex<MemoryStore>>,
}

impl MemorySkill {
    pub fn new(memory: Arc<Mutex<MemoryStore>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Skill for MemorySkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "memory_operator",
            "记忆系统工具。用于保存重要信息、检索相关记忆、查看记忆统计。当用户要求记住某些内容或需要回忆之前的信息时使用。",
        )
        .enum_param(
            "action",
            "操作类型：save 保存记忆，search 检索记忆，stats 查看统计。",
            &["save", "search", "stats"],
            true,
        )
        .string_param("content", "要保存的内容（save 模式）或检索查询（search 模式）。", false)
        .number_param("importance", "记忆重要性 0-1，0.7 及以上进入长期记忆。默认 0.5。", false)
        .int_param("top_k", "检索返回数量，默认 5。", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let action = args["action"].as_str().unwrap_or("");

        match action {
            "save" => {
                let content = args["content"].as_str().unwrap_or("");
                if content.is_empty() {
                    return json!({"success": false, "error": "缺少记忆内容"});
                }
                let importance = args["importance"].as_f64().unwrap_or(0.5);

                let id = self.memory.lock().await.add(
                    content,
                    json!({"type": "explicit", "source": "memory_operator"}),
                    importance,
                );
                json!({"success": true, "id": id, "message": "记忆已保存"})
            }
            "search" => {
                let query = args["content"].as_str().unwrap_or("");
                if query.is_empty() {
                    return json!({"success": false, "error": "缺少检索查询"});
                }
                let top_k = args["top_k"].as_u64().unwrap_or(5) as usize;

                let results = self.memory.lock().await.retrieve_relevant(query, top_k);
                json!({"success": true, "memories": results})
            }
            "stats" => {
                let stats = self.memory.lock().await.stats();
                json!({
                    "success": true,
                    "short_term": stats.short_term_count,
                    "long_term": stats.long_term_count,
                    "index_keywords": stats.index_keywords,
                })
            }
            other => json!({"success": false, "error": format!("未知操作: {}", other)}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn skill() -> (TempDir, MemorySkill) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path(), 20).unwrap();
        (dir, MemorySkill::new(Arc::new(Mutex::new(store))))
    }

    #[tokio::test]
    async fn test_save_and_search() {
        let (_d, skill) = skill();

        let result = skill
            .invoke(json!({"action": "save", "content": "用户喜欢爵士乐", "importance": 0.8}))
            .await;
        assert_eq!(result["success"], true);

        let result = skill
            .invoke(json!({"action": "search", "content": "爵士乐"}))
            .await;
        assert_eq!(result["success"], true);
        assert!(!result["memories"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let (_d, skill) = skill();
        let result = skill.invoke(json!({"action": "stats"})).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["short_term"], 0);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (_d, skill) = skill();
        let result = skill.invoke(json!({"action": "purge"})).await;
        assert_eq!(result["success"], false);
    }
}
