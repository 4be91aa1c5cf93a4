//! Chat Skill
//!
//! Open-ended questions that need no specific capability go straight to
//! the model.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::skills::registry::Skill;
use crate::skills::schema::ToolSpec;

pub struct ChatSkill {
    llm: LlmClient,
}

impl ChatSkill {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Skill for ChatSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "chat",
            "通用聊天工具。用于处理开放性问题、创意生成、建议提供、常识问答等不需要特定功能的任务。",
        )
        .string_param("query", "用户的问题或请求内容。", true)
        .string_param("context", "对话上下文，用于提供额外的背景信息。", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let query = args["query"].as_str().unwrap_or("");
        if query.is_empty() {
            return json!({"success": false, "error": "缺少问题内容"});
        }

        let context = args["context"].as_str().unwrap_or("");
        let prompt = if context.is_empty() {
            query.to_string()
        } else {
            format!("背景信息：{}\n\n问题：{}", context, query)
        };

        match self.llm.simple_chat(&prompt, "你是一个乐于助人的智能助手。").await {
            Ok(reply) => json!({"success": true, "message": reply}),
            Err(e) => json!({"success": false, "error": format!("聊天请求失败: {}", e)}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let skill = ChatSkill::new(LlmClient::new(None, "http://localhost:1", "test"));
        let result = skill.invoke(json!({})).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn test_transport_failure_is_data() {
        let skill = ChatSkill::new(LlmClient::new(None, "http://localhost:1", "test"));
        let result = skill.invoke(json!({"query": "hi"})).await;
        // No API key configured: the failure comes back as JSON, not a panic
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().is_some());
    }
}
