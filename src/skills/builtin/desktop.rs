//! Desktop Skills
//!
//! Model-facing surface over the desktop automation agent.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::desktop::DesktopAgent;
use crate::skills::registry::Skill;
use crate::skills::schema::ToolSpec;

pub struct DesktopSkill {
    agent: Arc<DesktopAgent>,
}

impl DesktopSkill {
    pub fn new(agent: Arc<DesktopAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Skill for DesktopSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "desktop_agent",
            "桌面自动化工具。像真人一样操作 macOS 应用：启动应用、发送按键、点击菜单、读取窗口内容。当用户要求操作本地应用（如打开豆包、微信）时使用。",
        )
        .enum_param(
            "action",
            "操作类型",
            &["launch", "quit", "keystroke", "menu_click", "read_window"],
            true,
        )
        .string_param("app", "应用名称（支持中文别名，如 备忘录、微信）", false)
        .string_param("text", "要输入的文本（keystroke 模式）", false)
        .string_param("menu", "菜单名称（menu_click 模式）", false)
        .string_param("item", "菜单项名称（menu_click 模式）", false)
        .bool_param("auto_confirm", "用户已确认时设为 true，重试需要确认的操作", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let action = args["action"].as_str().unwrap_or("");
        let app = args["app"].as_str().unwrap_or("");
        let auto_confirm = args["auto_confirm"].as_bool().unwrap_or(false);

        match action {
            "launch" => {
                if app.is_empty() {
                    return json!({"success": false, "error": "缺少应用名称"});
                }
                self.agent.launch_app(app, auto_confirm).await
            }
            "quit" => {
                if app.is_empty() {
                    return json!({"success": false, "error": "缺少应用名称"});
                }
                self.agent.quit_app(app, auto_confirm).await
            }
            "keystroke" => {
                let text = args["text"].as_str().unwrap_or("");
                if text.is_empty() {
                    return json!({"success": false, "error": "缺少输入文本"});
                }
                self.agent.keystroke(text, auto_confirm).await
            }
            "menu_click" => {
                let menu = args["menu"].as_str().unwrap_or("");
                let item = args["item"].as_str().unwrap_or("");
                if app.is_empty() || menu.is_empty() || item.is_empty() {
                    return json!({"success": false, "error": "menu_click 需要 app、menu 和 item"});
                }
                self.agent.menu_click(app, menu, item, auto_confirm).await
            }
            "read_window" => {
                if app.is_empty() {
                    return json!({"success": false, "error": "缺少应用名称"});
                }
                self.agent.read_window(app, auto_confirm).await
            }
            other => json!({"success": false, "error": format!("未知操作: {}", other)}),
        }
    }
}

pub struct DesktopAppListSkill {
    agent: Arc<DesktopAgent>,
}

impl DesktopAppListSkill {
    pub fn new(agent: Arc<DesktopAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Skill for DesktopAppListSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "desktop_list_common_apps",
            "列出可以启动的常用 macOS 应用及其中文别名。",
        )
        .build()
    }

    async fn invoke(&self, _args: Value) -> Value {
        self.agent.list_common_apps()
    }
}
