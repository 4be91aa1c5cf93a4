//! Safety guard and memory invariants

use std::path::Path;
use tempfile::TempDir;

use neo_agent::guard::{OperationLevel, SafetyGuard};
use neo_agent::memory::MemoryStore;

#[test]
fn forbidden_actions_never_pass() {
    let guard = SafetyGuard::new(Path::new("/tmp/neo_itest_audit"));

    for action in [
        "payment",
        "delete",
        "publish",
        "modify_settings",
        "download_file",
        "execute_script",
        "install_extension",
    ] {
        assert_eq!(
            guard.classify(action, "any target", "any value"),
            OperationLevel::Forbidden
        );
        let decision = guard.check_operation(action, "any target", "any value", true);
        assert!(!decision.allowed, "{} must stay forbidden with auto_confirm", action);
    }
}

#[test]
fn url_scheme_allow_list_under_navigate() {
    let guard = SafetyGuard::new(Path::new("/tmp/neo_itest_audit"));

    for bad in [
        "javascript:alert(1)",
        "data:text/html;base64,xxxx",
        "file:///etc/shadow",
        "ftp://ftp.example.com/file",
        "vbscript:msgbox",
    ] {
        assert!(!guard.check_operation("navigate", bad, "", false).allowed);
    }

    assert!(guard.check_operation("navigate", "https://example.com", "", false).allowed);
    assert!(guard.check_operation("navigate", "http://example.com", "", false).allowed);
}

#[test]
fn session_approval_sticks_per_guard_instance() {
    let guard = SafetyGuard::new(Path::new("/tmp/neo_itest_audit"));

    let first = guard.check_operation("click", "#login", "", false);
    assert!(first.requires_confirmation);
    assert!(first.confirmation_message.is_some());

    assert!(guard.check_operation("click", "#login", "", true).allowed);
    assert!(guard.check_operation("click", "#login", "", false).allowed);

    // A fresh guard knows nothing about earlier approvals
    let other = SafetyGuard::new(Path::new("/tmp/neo_itest_audit"));
    assert!(!other.check_operation("click", "#login", "", false).allowed);
}

#[test]
fn audit_log_flushes_to_json() {
    let dir = TempDir::new().unwrap();
    let guard = SafetyGuard::new(dir.path());

    guard.check_operation("navigate", "https://example.com", "", false);
    guard.check_operation("payment", "cart", "", false);

    let path = guard.save_audit_log().unwrap();
    let data = std::fs::read_to_string(path).unwrap();
    let entries: serde_json::Value = serde_json::from_str(&data).unwrap();

    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "navigate");
    assert_eq!(entries[0]["approved"], true);
    assert_eq!(entries[1]["level"], "forbidden");
    assert_eq!(entries[1]["approved"], false);
}

#[test]
fn memory_tier_placement_follows_importance() {
    let dir = TempDir::new().unwrap();
    let mut memory = MemoryStore::open(dir.path(), 20).unwrap();

    let important = memory.add("重要偏好", serde_json::json!({}), 0.9);
    let casual = memory.add("闲聊", serde_json::json!({}), 0.2);

    assert!(memory.long_term_contains(&important));
    assert!(!memory.long_term_contains(&casual));

    let stats = memory.stats();
    assert_eq!(stats.short_term_count, 2);
    assert_eq!(stats.long_term_count, 1);
}

#[test]
fn memory_eviction_is_importance_ordered() {
    let dir = TempDir::new().unwrap();
    let mut memory = MemoryStore::open(dir.path(), 5).unwrap();

    let lowest = memory.add("least important entry", serde_json::json!({}), 0.05);
    for i in 0..5 {
        memory.add(&format!("entry number {}", i), serde_json::json!({}), 0.5 + i as f64 * 0.05);
    }

    assert_eq!(memory.stats().short_term_count, 5);
    assert!(!memory.short_term_ids().contains(&lowest.as_str()));
    // highest-importance entry survived
    assert!(memory
        .retrieve_relevant("entry number 4", 5)
        .iter()
        .any(|c| c.contains("number 4")));
}

#[test]
fn memory_survives_restart_in_both_tiers() {
    let dir = TempDir::new().unwrap();
    {
        let mut memory = MemoryStore::open(dir.path(), 20).unwrap();
        memory.add("用户喜欢 Rust 和爵士乐", serde_json::json!({}), 0.8);
    }

    let memory = MemoryStore::open(dir.path(), 20).unwrap();
    assert_eq!(memory.stats().long_term_count, 1);
    assert!(!memory.retrieve_relevant("rust", 3).is_empty());
}
