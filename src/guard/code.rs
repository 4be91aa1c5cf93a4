//! Code Modification Guard
//!
//! Protects the assistant's own tree from agent-written code:
//! - protected core paths vs. sandbox directories
//! - dangerous/suspicious pattern scanning of generated skill source
//! - backup, checksummed modification records, and rollback

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How much of the tree the agent may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationLevel {
    /// No modifications at all
    None,
    /// Only the dynamic skills directory
    SkillsOnly,
    /// Skills plus the extensions directory
    Extensions,
    /// Anything, but protected paths need approval
    FullWithApproval,
}

impl ModificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SkillsOnly => "skills_only",
            Self::Extensions => "extensions",
            Self::FullWithApproval => "full_with_approval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "skills_only" => Some(Self::SkillsOnly),
            "extensions" => Some(Self::Extensions),
            "full_with_approval" => Some(Self::FullWithApproval),
            _ => None,
        }
    }
}

/// Directories the agent may write into without approval
const SANDBOX_DIRECTORIES: &[&str] = &["agent_skills", "extensions"];

/// Path prefixes that are never writable below FullWithApproval
const PROTECTED_PREFIXES: &[&str] = &["src", "core", "browser_agent", "desktop_agent", "soul"];

/// Patterns that block generated skill code outright.
///
/// Dynamic skills are Python source, so the rules target Python escape
/// hatches plus attempts to tamper with the guard tables themselves.
static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"os\.system\s*\(",
        r"subprocess\.(call|run|Popen)\s*\([^)]*shell\s*=\s*True",
        r"eval\s*\(",
        r"exec\s*\(",
        r"__import__\s*\(",
        r#"compile\s*\([^)]*,\s*['"]exec['"]"#,
        r"shutil\.rmtree\s*\(",
        r"FORBIDDEN_OPERATIONS\s*=\s*\{[\s}]*\}",
        r"SAFE_OPERATIONS\s*=\s*\{[^}]*\*[^}]*\}",
        r"DANGEROUS_PATTERNS\s*=\s*\[\s*\]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Patterns that only warn
static SUSPICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"curl\s+",
        r"wget\s+",
        r"requests\.(get|post)\s*\([^)]*http",
        r"base64\.b64decode",
        r"pickle\.loads",
        r"marshal\.loads",
        r"socket\.socket",
        r"telnetlib",
        r"ftplib",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// One recorded modification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub timestamp: String,
    pub file_path: String,
    pub backup_path: String,
    pub reason: String,
    pub checksum_before: String,
    pub checksum_after: String,
    pub approved: bool,
}

/// Verdict on whether a path may be written
#[derive(Debug, Clone, Serialize)]
pub struct ModifyVerdict {
    pub allowed: bool,
    pub requires_approval: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Guard status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CodeGuardStatus {
    pub level: String,
    pub sandbox_dirs: Vec<String>,
    pub modifications_count: usize,
    pub backup_dir: String,
}

/// Code modification guard with backup and rollback
pub struct CodeGuard {
    base_dir: PathBuf,
    backup_dir: PathBuf,
    level: ModificationLevel,
    log: Vec<ModificationRecord>,
}

impl CodeGuard {
    pub fn new(base_dir: &Path, level: ModificationLevel) -> Self {
        let backup_dir = base_dir.join("code_backups");
        let log = Self::load_log(&backup_dir);
        Self {
            base_dir: base_dir.to_path_buf(),
            backup_dir,
            level,
            log,
        }
    }

    fn log_file(backup_dir: &Path) -> PathBuf {
        backup_dir.join("modification_log.json")
    }

    fn load_log(backup_dir: &Path) -> Vec<ModificationRecord> {
        std::fs::read_to_string(Self::log_file(backup_dir))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save_log(&self) {
        if std::fs::create_dir_all(&self.backup_dir).is_err() {
            return;
        }
        if let Ok(data) = serde_json::to_string_pretty(&self.log) {
            let _ = std::fs::write(Self::log_file(&self.backup_dir), data);
        }
    }

    pub fn level(&self) -> ModificationLevel {
        self.level
    }

    pub fn set_level(&mut self, level: ModificationLevel) {
        info!("Code guard level set to {}", level.as_str());
        self.level = level;
    }

    /// Scan code for patterns that block it outright
    pub fn check_dangerous(&self, code: &str) -> (bool, Vec<String>) {
        let dangers: Vec<String> = DANGEROUS_PATTERNS
            .iter()
            .filter(|p| p.is_match(code))
            .map(|p| format!("dangerous pattern: {}", p.as_str()))
            .collect();
        (!dangers.is_empty(), dangers)
    }

    /// Scan code for patterns that warrant a warning but not a block
    pub fn check_suspicious(&self, code: &str) -> (bool, Vec<String>) {
        let warnings: Vec<String> = SUSPICIOUS_PATTERNS
            .iter()
            .filter(|p| p.is_match(code))
            .map(|p| format!("suspicious pattern: {}", p.as_str()))
            .collect();
        (!warnings.is_empty(), warnings)
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.base_dir)
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn is_sandbox(&self, path: &Path) -> bool {
        let rel = self.relative_path(path);
        SANDBOX_DIRECTORIES
            .iter()
            .any(|d| rel.starts_with(d))
    }

    pub fn is_protected(&self, path: &Path) -> bool {
        let rel = self.relative_path(path);
        PROTECTED_PREFIXES.iter().any(|d| rel.starts_with(d))
    }

    /// Decide whether a path may be written at the current level
    pub fn can_modify(&self, path: &Path) -> ModifyVerdict {
        if self.level == ModificationLevel::None {
            return ModifyVerdict {
                allowed: false,
                requires_approval: false,
                reason: "all code modification is disabled".to_string(),
                suggestion: None,
            };
        }

        if self.is_protected(path) {
            if self.level == ModificationLevel::FullWithApproval {
                return ModifyVerdict {
                    allowed: true,
                    requires_approval: true,
                    reason: "core file modification needs approval".to_string(),
                    suggestion: None,
                };
            }
            return ModifyVerdict {
                allowed: false,
                requires_approval: false,
                reason: format!(
                    "core file is protected: {}",
                    self.relative_path(path).display()
                ),
                suggestion: Some("create new functionality under agent_skills/ instead".to_string()),
            };
        }

        if self.is_sandbox(path) {
            let sandbox_ok = match self.level {
                ModificationLevel::SkillsOnly => self.relative_path(path).starts_with("agent_skills"),
                _ => true,
            };
            if sandbox_ok {
                return ModifyVerdict {
                    allowed: true,
                    requires_approval: false,
                    reason: "sandbox area".to_string(),
                    suggestion: None,
                };
            }
        }

        match self.level {
            ModificationLevel::SkillsOnly => ModifyVerdict {
                allowed: false,
                requires_approval: false,
                reason: "only agent_skills/ is writable at this level".to_string(),
                suggestion: Some("create the file under agent_skills/".to_string()),
            },
            ModificationLevel::Extensions => ModifyVerdict {
                allowed: false,
                requires_approval: false,
                reason: "only agent_skills/ and extensions/ are writable at this level".to_string(),
                suggestion: Some("create the file under a sandbox directory".to_string()),
            },
            ModificationLevel::FullWithApproval => ModifyVerdict {
                allowed: true,
                requires_approval: true,
                reason: "non-sandbox file modification needs approval".to_string(),
                suggestion: None,
            },
            ModificationLevel::None => unreachable!(),
        }
    }

    fn checksum(path: &Path) -> String {
        std::fs::read(path)
            .map(|bytes| {
                let mut hasher = Sha256::new();
                hasher.update(&bytes);
                hex::encode(hasher.finalize())
            })
            .unwrap_or_default()
    }

    fn backup(&self, path: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.backup_dir)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let backup = self
            .backup_dir
            .join(format!("{}.{}.bak", name, Utc::now().format("%Y%m%d_%H%M%S")));
        std::fs::copy(path, &backup)?;
        Ok(backup)
    }

    /// Write code to a path, recording a backup and checksum trail
    pub fn apply_modification(
        &mut self,
        path: &Path,
        code: &str,
        reason: &str,
        approved: bool,
    ) -> serde_json::Value {
        let verdict = self.can_modify(path);
        if !verdict.allowed {
            return serde_json::json!({"success": false, "error": verdict.reason});
        }
        if verdict.requires_approval && !approved {
            return serde_json::json!({
                "success": false,
                "error": "modification needs user approval",
                "requires_approval": true,
            });
        }

        let (dangerous, dangers) = self.check_dangerous(code);
        if dangerous {
            warn!("Blocked dangerous modification to {}", path.display());
            return serde_json::json!({
                "success": false,
                "error": "code contains dangerous patterns",
                "dangers": dangers,
            });
        }

        let (suspicious, warnings) = self.check_suspicious(code);
        if suspicious {
            warn!("Suspicious modification to {}: {:?}", path.display(), warnings);
        }

        let checksum_before = if path.exists() { Self::checksum(path) } else { String::new() };
        let backup_path = if path.exists() {
            match self.backup(path) {
                Ok(p) => p.display().to_string(),
                Err(e) => {
                    return serde_json::json!({"success": false, "error": format!("backup failed: {}", e)})
                }
            }
        } else {
            String::new()
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return serde_json::json!({"success": false, "error": format!("write failed: {}", e)});
            }
        }
        if let Err(e) = std::fs::write(path, code) {
            return serde_json::json!({"success": false, "error": format!("write failed: {}", e)});
        }

        let record = ModificationRecord {
            timestamp: Utc::now().to_rfc3339(),
            file_path: path.display().to_string(),
            backup_path: backup_path.clone(),
            reason: reason.to_string(),
            checksum_before,
            checksum_after: Self::checksum(path),
            approved,
        };
        self.log.push(record);
        self.save_log();

        serde_json::json!({
            "success": true,
            "message": format!("file modified: {}", path.display()),
            "backup_path": backup_path,
            "warnings": warnings,
        })
    }

    /// Undo the most recent modifications by restoring their backups
    pub fn rollback(&mut self, steps: usize) -> serde_json::Value {
        if self.log.is_empty() {
            return serde_json::json!({"success": false, "error": "no modifications to roll back"});
        }

        let mut rolled_back = Vec::new();
        for _ in 0..steps.min(self.log.len()) {
            let record = match self.log.pop() {
                Some(r) => r,
                None => break,
            };
            if !record.backup_path.is_empty() && Path::new(&record.backup_path).exists() {
                if std::fs::copy(&record.backup_path, &record.file_path).is_ok() {
                    rolled_back.push(record.file_path.clone());
                }
            }
        }
        self.save_log();

        let message = format!("rolled back {} modification(s)", rolled_back.len());
        serde_json::json!({
            "success": true,
            "rolled_back": rolled_back,
            "message": message,
        })
    }

    pub fn history(&self, limit: usize) -> Vec<ModificationRecord> {
        let start = self.log.len().saturating_sub(limit);
        self.log[start..].to_vec()
    }

    pub fn status(&self) -> CodeGuardStatus {
        CodeGuardStatus {
            level: self.level.as_str().to_string(),
            sandbox_dirs: SANDBOX_DIRECTORIES.iter().map(|s| s.to_string()).collect(),
            modifications_count: self.log.len(),
            backup_dir: self.backup_dir.display().to_string(),
        }
    }
}
