//! Safety Guard
//!
//! Tiered permission classifier for side-effecting operations:
//! - **Safe**: executes without confirmation (navigation, reads)
//! - **ConfirmRequired**: needs user approval once per session
//! - **Forbidden**: never executes, regardless of overrides
//!
//! Every decision lands in an in-memory audit log that can be flushed to a
//! JSON file on session close.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

const MAX_TARGET_LENGTH: usize = 2048;
const MAX_VALUE_LENGTH: usize = 10_000;

static SAFE_OPERATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "navigate", "read", "scroll", "screenshot", "extract", "wait", "get_title", "get_url",
    ]
    .into_iter()
    .collect()
});

static CONFIRM_REQUIRED_OPERATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["click", "fill", "login", "search", "submit", "select", "upload"]
        .into_iter()
        .collect()
});

static FORBIDDEN_OPERATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "payment",
        "delete",
        "publish",
        "modify_settings",
        "download_file",
        "execute_script",
        "install_extension",
    ]
    .into_iter()
    .collect()
});

/// Substrings of targets/values that bump an unknown action to confirm-required
static SENSITIVE_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "payment", "checkout", "buy", "purchase", "pay", "delete", "remove", "trash", "submit",
        "post", "publish", "send", "settings", "config", "admin",
    ]
});

/// URL prefixes that are never navigable
const BLOCKED_URL_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:", "file://", "ftp://"];

/// Operation permission tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationLevel {
    Safe,
    ConfirmRequired,
    Forbidden,
}

impl OperationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::ConfirmRequired => "confirm_required",
            Self::Forbidden => "forbidden",
        }
    }
}

/// Outcome of a guard check
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub level: OperationLevel,
    pub reason: String,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,
}

impl Decision {
    fn denied(level: OperationLevel, reason: &str) -> Self {
        Self {
            allowed: false,
            level,
            reason: reason.to_string(),
            requires_confirmation: false,
            confirmation_message: None,
        }
    }

    fn allowed(level: OperationLevel, reason: &str) -> Self {
        Self {
            allowed: true,
            level,
            reason: reason.to_string(),
            requires_confirmation: false,
            confirmation_message: None,
        }
    }

    /// Render as the JSON shape tool results embed
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("success".to_string(), serde_json::json!(self.allowed));
        }
        value
    }
}

/// One audited guard decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: String,
    pub action: String,
    pub target: String,
    pub level: OperationLevel,
    pub approved: bool,
    pub result: String,
}

/// Aggregated session counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub total_operations: usize,
    pub safe_operations: usize,
    pub confirm_operations: usize,
    pub forbidden_attempts: usize,
    pub approved_operations: usize,
}

struct GuardState {
    session_confirmations: HashMap<String, bool>,
    audit_log: Vec<AuditLogEntry>,
}

/// Tiered safety guard with a per-session confirmation cache
pub struct SafetyGuard {
    audit_dir: PathBuf,
    state: RwLock<GuardState>,
}

impl SafetyGuard {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            audit_dir: audit_dir.to_path_buf(),
            state: RwLock::new(GuardState {
                session_confirmations: HashMap::new(),
                audit_log: Vec::new(),
            }),
        }
    }

    /// Classify an operation into a permission tier
    ///
    /// Forbidden beats safe beats confirm; anything unclassified defaults to
    /// confirm-required.
    pub fn classify(&self, action: &str, target: &str, value: &str) -> OperationLevel {
        let action_lower = action.to_lowercase();
        let target_lower = target.to_lowercase();

        if FORBIDDEN_OPERATIONS.contains(action_lower.as_str()) {
            return OperationLevel::Forbidden;
        }
        for forbidden in FORBIDDEN_OPERATIONS.iter() {
            if action_lower.contains(forbidden) || target_lower.contains(forbidden) {
                return OperationLevel::Forbidden;
            }
        }

        if SAFE_OPERATIONS.contains(action_lower.as_str()) {
            return OperationLevel::Safe;
        }

        if CONFIRM_REQUIRED_OPERATIONS.contains(action_lower.as_str()) {
            return OperationLevel::ConfirmRequired;
        }

        let value_lower = value.to_lowercase();
        for sensitive in SENSITIVE_KEYWORDS.iter() {
            if target_lower.contains(sensitive) || value_lower.contains(sensitive) {
                return OperationLevel::ConfirmRequired;
            }
        }

        OperationLevel::ConfirmRequired
    }

    /// Full check: classification, input validation, session cache, override
    pub fn check_operation(
        &self,
        action: &str,
        target: &str,
        value: &str,
        auto_confirm: bool,
    ) -> Decision {
        let level = self.classify(action, target, value);

        if let Some(reason) = self.validate_inputs(action, target, value) {
            self.log(action, target, level, false, &reason);
            return Decision::denied(level, &reason);
        }

        match level {
            OperationLevel::Forbidden => {
                warn!("Forbidden operation attempted: {} on {}", action, target);
                self.log(action, target, level, false, "blocked by policy");
                Decision::denied(
                    level,
                    &format!("operation '{}' is forbidden by safety policy", action),
                )
            }
            OperationLevel::Safe => {
                self.log(action, target, level, true, "safe operation");
                Decision::allowed(level, "safe operation")
            }
            OperationLevel::ConfirmRequired => {
                let session_key = format!("{}:{}", action, target);

                let already_confirmed = {
                    let state = self.state.read().unwrap();
                    state.session_confirmations.contains_key(&session_key)
                };
                if already_confirmed {
                    self.log(action, target, level, true, "confirmed earlier this session");
                    return Decision::allowed(level, "already confirmed this session");
                }

                if auto_confirm {
                    // An explicit approval: remember it so the identical call
                    // auto-passes for the rest of the session.
                    self.state
                        .write()
                        .unwrap()
                        .session_confirmations
                        .insert(session_key, true);
                    self.log(action, target, level, true, "auto-confirmed");
                    return Decision::allowed(level, "auto-confirmed");
                }

                self.log(action, target, level, false, "awaiting confirmation");
                Decision {
                    allowed: false,
                    level,
                    reason: "user confirmation required".to_string(),
                    requires_confirmation: true,
                    confirmation_message: Some(self.confirmation_message(action, target, value)),
                }
            }
        }
    }

    /// Record a user-granted approval for an (action, target) pair
    pub fn grant(&self, action: &str, target: &str) {
        let session_key = format!("{}:{}", action, target);
        self.state
            .write()
            .unwrap()
            .session_confirmations
            .insert(session_key, true);
        debug!("Session confirmation granted: {}:{}", action, target);
    }

    /// Drop every cached confirmation (the only revocation mechanism)
    pub fn clear_session_confirmations(&self) {
        self.state.write().unwrap().session_confirmations.clear();
    }

    fn validate_inputs(&self, action: &str, target: &str, value: &str) -> Option<String> {
        if target.len() > MAX_TARGET_LENGTH {
            return Some(format!("target exceeds {} characters", MAX_TARGET_LENGTH));
        }
        if value.len() > MAX_VALUE_LENGTH {
            return Some(format!("value exceeds {} characters", MAX_VALUE_LENGTH));
        }
        if action.eq_ignore_ascii_case("navigate") && !target.is_empty() && !is_safe_url(target) {
            return Some("URL scheme not allowed".to_string());
        }
        None
    }

    fn confirmation_message(&self, action: &str, target: &str, value: &str) -> String {
        let desc = match action.to_lowercase().as_str() {
            "click" => format!("点击元素: {}", target),
            "fill" => format!("在 {} 中输入内容", target),
            "login" => "登录到网站".to_string(),
            "search" => format!("搜索: {}", target),
            "submit" => format!("提交表单: {}", target),
            "select" => format!("选择选项: {}", target),
            "upload" => format!("上传文件到: {}", target),
            other => format!("执行操作: {}", other),
        };

        let mut msg = format!("⚠️ 请求确认:\n{}", desc);
        if !value.is_empty() && value.chars().count() < 100 {
            let preview: String = value.chars().take(50).collect();
            msg.push_str(&format!(" (内容: {})", preview));
        }
        msg.push_str("\n\n是否允许此操作？");
        msg
    }

    fn log(&self, action: &str, target: &str, level: OperationLevel, approved: bool, result: &str) {
        let entry = AuditLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            action: action.to_string(),
            target: target.chars().take(200).collect(),
            level,
            approved,
            result: result.to_string(),
        };
        self.state.write().unwrap().audit_log.push(entry);
    }

    /// Flush the in-memory audit log to a timestamped JSON file
    pub fn save_audit_log(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.audit_dir)?;
        let filename = format!("audit_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.audit_dir.join(filename);

        let entries = {
            let state = self.state.read().unwrap();
            serde_json::to_string_pretty(&state.audit_log).unwrap_or_else(|_| "[]".to_string())
        };
        std::fs::write(&path, entries)?;
        Ok(path)
    }

    pub fn session_summary(&self) -> SessionSummary {
        let state = self.state.read().unwrap();
        let mut summary = SessionSummary {
            total_operations: state.audit_log.len(),
            ..Default::default()
        };
        for entry in &state.audit_log {
            match entry.level {
                OperationLevel::Safe => summary.safe_operations += 1,
                OperationLevel::ConfirmRequired => summary.confirm_operations += 1,
                OperationLevel::Forbidden => summary.forbidden_attempts += 1,
            }
            if entry.approved {
                summary.approved_operations += 1;
            }
        }
        summary
    }
}

/// Reject dangerous URL schemes; http/https and relative paths pass
fn is_safe_url(url: &str) -> bool {
    let url_lower = url.trim().to_lowercase();

    for pattern in BLOCKED_URL_SCHEMES {
        if url_lower.starts_with(pattern) {
            return false;
        }
    }

    if url_lower.starts_with("http://") || url_lower.starts_with("https://") {
        return true;
    }

    url_lower.starts_with('/') || url_lower.starts_with('.')
}
