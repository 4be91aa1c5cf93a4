//! Desktop Automation
//!
//! macOS application control through `osascript`: launching and activating
//! applications, sending keystrokes, clicking menu items, and reading the
//! front window. Operations are gated by the safety guard; non-macOS hosts
//! get a structured unsupported-platform error.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::guard::SafetyGuard;
use crate::skills::sandbox::{Sandbox, SandboxConfig};

/// Applications offered to the model as launch targets
pub const COMMON_APPS: &[(&str, &str)] = &[
    ("备忘录", "Notes"),
    ("日历", "Calendar"),
    ("邮件", "Mail"),
    ("音乐", "Music"),
    ("浏览器", "Safari"),
    ("访达", "Finder"),
    ("终端", "Terminal"),
    ("微信", "WeChat"),
    ("豆包", "Doubao"),
];

/// Escape a string for embedding in an AppleScript literal
pub fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Desktop automation driver
pub struct DesktopAgent {
    guard: Arc<SafetyGuard>,
    sandbox: Sandbox,
}

impl DesktopAgent {
    pub fn new(guard: Arc<SafetyGuard>) -> Self {
        Self {
            guard,
            sandbox: Sandbox::new(SandboxConfig::default()),
        }
    }

    fn platform_supported() -> bool {
        cfg!(target_os = "macos")
    }

    async fn run_applescript(&self, script: &str) -> Value {
        if !Self::platform_supported() {
            return json!({"success": false, "error": "桌面自动化仅支持 macOS"});
        }

        debug!("osascript: {}", script.lines().next().unwrap_or(""));
        let result = match self.sandbox.run("osascript", &["-e", script], None).await {
            Ok(r) => r,
            Err(e) => return json!({"success": false, "error": format!("osascript 启动失败: {}", e)}),
        };

        if result.success {
            json!({"success": true, "output": result.stdout.trim()})
        } else {
            json!({"success": false, "error": result.stderr.trim()})
        }
    }

    /// Launch (or bring forward) an application by display or bundle name
    pub async fn launch_app(&self, name: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("launch_app", name, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let app = resolve_app_name(name);
        let script = format!(r#"tell application "{}" to activate"#, escape_applescript(&app));
        let mut result = self.run_applescript(&script).await;
        if result["success"] == true {
            result["app"] = json!(app);
        }
        result
    }

    /// Quit an application
    pub async fn quit_app(&self, name: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("quit_app", name, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let app = resolve_app_name(name);
        let script = format!(r#"tell application "{}" to quit"#, escape_applescript(&app));
        self.run_applescript(&script).await
    }

    /// Type text into the frontmost application
    pub async fn keystroke(&self, text: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("keystroke", "", text, auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let script = format!(
            r#"tell application "System Events" to keystroke "{}""#,
            escape_applescript(text)
        );
        self.run_applescript(&script).await
    }

    /// Click a menu item: app -> menu -> item
    pub async fn menu_click(&self, app: &str, menu: &str, item: &str, auto_confirm: bool) -> Value {
        let target = format!("{}>{}>{}", app, menu, item);
        let decision = self.guard.check_operation("menu_click", &target, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let script = format!(
            r#"tell application "System Events" to tell process "{}" to click menu item "{}" of menu "{}" of menu bar 1"#,
            escape_applescript(&resolve_app_name(app)),
            escape_applescript(item),
            escape_applescript(menu)
        );
        self.run_applescript(&script).await
    }

    /// Read the front window title of an application
    pub async fn read_window(&self, app: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("read_window", app, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let script = format!(
            r#"tell application "System Events" to tell process "{}" to get name of front window"#,
            escape_applescript(&resolve_app_name(app))
        );
        self.run_applescript(&script).await
    }

    /// The launchable applications, with their Chinese aliases
    pub fn list_common_apps(&self) -> Value {
        let apps: Vec<Value> = COMMON_APPS
            .iter()
            .map(|(alias, name)| json!({"alias": alias, "app": name}))
            .collect();
        json!({"success": true, "apps": apps})
    }
}

/// Map a Chinese alias onto its application name; pass others through
fn resolve_app_name(name: &str) -> String {
    COMMON_APPS
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, app)| app.to_string())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_escape_applescript() {
        assert_eq!(escape_applescript(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_applescript(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn test_resolve_app_name() {
        assert_eq!(resolve_app_name("备忘录"), "Notes");
        assert_eq!(resolve_app_name("Safari"), "Safari");
    }

    #[test]
    fn test_list_common_apps() {
        let guard = Arc::new(SafetyGuard::new(Path::new("/tmp/neo_test_desktop_audit")));
        let agent = DesktopAgent::new(guard);
        let result = agent.list_common_apps();
        assert_eq!(result["success"], true);
        assert!(result["apps"].as_array().unwrap().len() >= 5);
    }

    #[tokio::test]
    async fn test_launch_requires_confirmation() {
        let guard = Arc::new(SafetyGuard::new(Path::new("/tmp/neo_test_desktop_audit")));
        let agent = DesktopAgent::new(guard);

        let result = agent.launch_app("Notes", false).await;
        assert_eq!(result["allowed"], false);
        assert_eq!(result["requires_confirmation"], true);
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn test_unsupported_platform() {
        let guard = Arc::new(SafetyGuard::new(Path::new("/tmp/neo_test_desktop_audit")));
        let agent = DesktopAgent::new(guard);

        let result = agent.launch_app("Notes", true).await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("macOS"));
    }
}
