//! Browser Skills
//!
//! The model-facing surface over the browser controller and session
//! manager. Confirm-required operations report back with
//! `requires_confirmation` and a message to relay; a repeat call with
//! `auto_confirm: true` proceeds.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::browser::{BrowserController, SessionManager};
use crate::skills::registry::Skill;
use crate::skills::schema::ToolSpec;

pub struct BrowserSkill {
    controller: Arc<Mutex<BrowserController>>,
}

impl BrowserSkill {
    pub fn new(controller: Arc<Mutex<BrowserController>>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Skill for BrowserSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "browser_agent",
            "浏览器自动化工具。可以访问任何网站获取信息（小红书、微博、知乎、淘宝等），提取页面内容、链接，点击链接、填写并提交表单。当用户要求查看某个网站的内容时使用。",
        )
        .enum_param(
            "action",
            "操作类型",
            &["navigate", "extract", "links", "get_title", "click", "fill", "submit"],
            true,
        )
        .string_param("url", "目标网址（navigate 模式）", false)
        .string_param("selector", "CSS 选择器（extract/click/fill 模式）", false)
        .string_param("value", "输入内容（fill 模式）", false)
        .bool_param("auto_confirm", "用户已确认时设为 true，重试需要确认的操作", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let action = args["action"].as_str().unwrap_or("");
        let auto_confirm = args["auto_confirm"].as_bool().unwrap_or(false);
        let mut controller = self.controller.lock().await;

        match action {
            "navigate" => {
                let url = args["url"].as_str().unwrap_or("");
                if url.is_empty() {
                    return json!({"success": false, "error": "缺少目标网址"});
                }
                controller.navigate(url, auto_confirm).await
            }
            "extract" => controller.extract_text(args["selector"].as_str()),
            "links" => controller.links(20),
            "get_title" => controller.title(),
            "click" => {
                let selector = args["selector"].as_str().unwrap_or("");
                if selector.is_empty() {
                    return json!({"success": false, "error": "缺少选择器"});
                }
                controller.click(selector, auto_confirm).await
            }
            "fill" => {
                let selector = args["selector"].as_str().unwrap_or("");
                let value = args["value"].as_str().unwrap_or("");
                if selector.is_empty() {
                    return json!({"success": false, "error": "缺少选择器"});
                }
                controller.fill(selector, value, auto_confirm)
            }
            "submit" => controller.submit(auto_confirm).await,
            other => json!({"success": false, "error": format!("未知操作: {}", other)}),
        }
    }
}

pub struct BrowserCredentialSkill {
    sessions: Arc<Mutex<SessionManager>>,
}

impl BrowserCredentialSkill {
    pub fn new(sessions: Arc<Mutex<SessionManager>>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Skill for BrowserCredentialSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "browser_agent_save_credentials",
            "保存网站登录凭证（加密存储）。当用户希望记住某个网站的账号密码以便自动登录时使用。",
        )
        .string_param("url", "网站地址", true)
        .string_param("username", "用户名", true)
        .string_param("password", "密码", true)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let url = args["url"].as_str().unwrap_or("");
        let username = args["username"].as_str().unwrap_or("");
        let password = args["password"].as_str().unwrap_or("");

        if url.is_empty() || username.is_empty() || password.is_empty() {
            return json!({"success": false, "error": "缺少网址、用户名或密码"});
        }

        match self.sessions.lock().await.save_credential(url, username, password) {
            Ok(domain) => json!({
                "success": true,
                "message": format!("已为 {} 保存登录凭证", domain),
                "domain": domain,
            }),
            Err(e) => json!({"success": false, "error": format!("凭证保存失败: {}", e)}),
        }
    }
}

pub struct BrowserListSitesSkill {
    sessions: Arc<Mutex<SessionManager>>,
}

impl BrowserListSitesSkill {
    pub fn new(sessions: Arc<Mutex<SessionManager>>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Skill for BrowserListSitesSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "browser_agent_list_sites",
            "列出已保存登录凭证的网站。",
        )
        .build()
    }

    async fn invoke(&self, _args: Value) -> Value {
        let sessions = self.sessions.lock().await;
        let sites: Vec<String> = sessions.list_sites().iter().map(|s| s.to_string()).collect();
        json!({"success": true, "sites": sites})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserConfig;
    use crate::guard::SafetyGuard;
    use std::path::Path;
    use tempfile::TempDir;

    fn browser_skill() -> BrowserSkill {
        let guard = Arc::new(SafetyGuard::new(Path::new("/tmp/neo_test_bskill_audit")));
        let controller = BrowserController::new(BrowserConfig::default(), guard);
        BrowserSkill::new(Arc::new(Mutex::new(controller)))
    }

    #[tokio::test]
    async fn test_navigate_requires_url() {
        let skill = browser_skill();
        let result = skill.invoke(json!({"action": "navigate"})).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn test_unsafe_url_blocked_through_skill() {
        let skill = browser_skill();
        let result = skill
            .invoke(json!({"action": "navigate", "url": "javascript:alert(1)"}))
            .await;
        assert_eq!(result["allowed"], false);
    }

    #[tokio::test]
    async fn test_credentials_roundtrip_via_skills() {
        let dir = TempDir::new().unwrap();
        let sessions = Arc::new(Mutex::new(
            SessionManager::open(dir.path(), Some("test")).unwrap(),
        ));

        let save = BrowserCredentialSkill::new(sessions.clone());
        let result = save
            .invoke(json!({
                "url": "https://example.com",
                "username": "alice",
                "password": "pw",
            }))
            .await;
        assert_eq!(result["success"], true);

        let list = BrowserListSitesSkill::new(sessions);
        let result = list.invoke(json!({})).await;
        assert_eq!(result["sites"][0], "example");
    }
}
