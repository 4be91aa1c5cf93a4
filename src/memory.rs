//! Memory Store
//!
//! Two-tier memory with keyword retrieval:
//! - short-term: insertion-ordered, bounded, lowest-importance evicted first
//! - long-term: unbounded, entries that arrive with importance >= 0.7
//!
//! Entries are write-once; compression is the only deletion path. State is
//! persisted as flat JSON files after every mutation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::tokenizer::{estimate_tokens, extract_keywords};

/// Importance at or above which an entry also enters long-term memory
pub const LONG_TERM_THRESHOLD: f64 = 0.7;

/// One memory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub importance: f64,
    pub timestamp: f64,
    #[serde(default)]
    pub access_count: u64,
}

/// Counters for the `memory` CLI command and the memory skill
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub short_term_count: usize,
    pub long_term_count: usize,
    pub index_keywords: usize,
}

/// Two-tier memory store persisted to flat JSON files
pub struct MemoryStore {
    root_dir: PathBuf,
    max_short_term: usize,
    /// Insertion-ordered short-term entries
    short_term: Vec<MemoryEntry>,
    long_term: HashMap<String, MemoryEntry>,
    /// keyword -> ids that mention it
    index: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    /// Open the store, loading any existing state (tolerating corrupt files)
    pub fn open(root_dir: &Path, max_short_term: usize) -> std::io::Result<Self> {
        std::fs::create_dir_all(root_dir)?;

        let mut store = Self {
            root_dir: root_dir.to_path_buf(),
            max_short_term,
            short_term: Vec::new(),
            long_term: HashMap::new(),
            index: HashMap::new(),
        };
        store.load();
        info!(
            "Memory store opened: {} ({} short-term, {} long-term)",
            root_dir.display(),
            store.short_term.len(),
            store.long_term.len()
        );
        Ok(store)
    }

    fn short_term_file(&self) -> PathBuf {
        self.root_dir.join("short_term.json")
    }

    fn long_term_file(&self) -> PathBuf {
        self.root_dir.join("long_term.json")
    }

    fn index_file(&self) -> PathBuf {
        self.root_dir.join("index.json")
    }

    fn load(&mut self) {
        if let Ok(data) = std::fs::read_to_string(self.short_term_file()) {
            match serde_json::from_str(&data) {
                Ok(entries) => self.short_term = entries,
                Err(e) => warn!("short-term memory file unreadable, starting empty: {}", e),
            }
        }
        if let Ok(data) = std::fs::read_to_string(self.long_term_file()) {
            match serde_json::from_str(&data) {
                Ok(entries) => self.long_term = entries,
                Err(e) => warn!("long-term memory file unreadable, starting empty: {}", e),
            }
        }
        if let Ok(data) = std::fs::read_to_string(self.index_file()) {
            match serde_json::from_str(&data) {
                Ok(index) => self.index = index,
                Err(e) => warn!("memory index unreadable, rebuilding lazily: {}", e),
            }
        }
    }

    fn save(&self) {
        fn write_json<T: Serialize>(path: PathBuf, value: &T) {
            match serde_json::to_string_pretty(value) {
                Ok(data) => {
                    if let Err(e) = std::fs::write(&path, data) {
                        warn!("failed to persist {}: {}", path.display(), e);
                    }
                }
                Err(e) => warn!("failed to serialize {}: {}", path.display(), e),
            }
        }
        write_json(self.short_term_file(), &self.short_term);
        write_json(self.long_term_file(), &self.long_term);
        write_json(self.index_file(), &self.index);
    }

    fn generate_id(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update(format!("{:?}", std::time::SystemTime::now()).as_bytes());
        hex::encode(&hasher.finalize()[..6])
    }

    /// Add a memory entry; returns its id
    ///
    /// Entries with importance >= 0.7 are mirrored into long-term memory.
    /// Exceeding the short-term bound evicts the lowest-importance entries.
    pub fn add(&mut self, content: &str, metadata: Value, importance: f64) -> String {
        let importance = importance.clamp(0.0, 1.0);
        let id = Self::generate_id(content);

        let entry = MemoryEntry {
            id: id.clone(),
            content: content.to_string(),
            metadata,
            importance,
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            access_count: 0,
        };

        for keyword in extract_keywords(content) {
            let ids = self.index.entry(keyword).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }

        if importance >= LONG_TERM_THRESHOLD {
            self.long_term.insert(id.clone(), entry.clone());
        }

        self.short_term.push(entry);
        if self.short_term.len() > self.max_short_term {
            self.evict_short_term();
        }

        self.save();
        debug!("Memory added: {} (importance {:.2})", id, importance);
        id
    }

    /// Record one user/assistant exchange, deriving importance if not given
    pub fn add_interaction(
        &mut self,
        user_input: &str,
        assistant_response: &str,
        tool_names: &[String],
        importance: Option<f64>,
    ) -> String {
        let importance = importance
            .unwrap_or_else(|| Self::interaction_importance(user_input, !tool_names.is_empty()));

        let mut content = format!("用户: {}\n助手: {}", user_input, assistant_response);
        if !tool_names.is_empty() {
            content.push_str(&format!("\n工具: {}", tool_names.join(", ")));
        }

        let metadata = serde_json::json!({
            "type": "interaction",
            "tools": tool_names,
        });

        self.add(&content, metadata, importance)
    }

    /// Importance heuristic: tools used, explicit remember-me phrasing, length
    fn interaction_importance(user_input: &str, used_tools: bool) -> f64 {
        let mut importance: f64 = 0.3;

        if used_tools {
            importance += 0.2;
        }

        const IMPORTANT_MARKERS: &[&str] =
            &["重要", "记住", "保存", "记录", "偏好", "喜欢", "不喜欢", "remember", "important"];
        for marker in IMPORTANT_MARKERS {
            if user_input.contains(marker) {
                importance += 0.15;
            }
        }

        if user_input.chars().count() > 100 {
            importance += 0.1;
        }

        importance.min(1.0)
    }

    fn evict_short_term(&mut self) {
        // Keep the highest-importance entries, preserving insertion order
        // among the survivors.
        let mut ranked: Vec<(usize, f64)> = self
            .short_term
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.importance))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let keep: std::collections::HashSet<usize> = ranked
            .into_iter()
            .take(self.max_short_term)
            .map(|(i, _)| i)
            .collect();

        let mut idx = 0;
        self.short_term.retain(|_| {
            let kept = keep.contains(&idx);
            idx += 1;
            kept
        });
    }

    /// Retrieve the most relevant memory contents for a query
    ///
    /// Relevance is the fraction of query keywords contained in the entry;
    /// long-term hits are weighted 1.2x.
    pub fn retrieve_relevant(&self, query: &str, top_k: usize) -> Vec<String> {
        let query_keywords = extract_keywords(query);
        if query_keywords.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<&str, (f64, &str)> = HashMap::new();

        for entry in &self.short_term {
            let score = Self::relevance(&query_keywords, &entry.content);
            scores.insert(&entry.id, (score, &entry.content));
        }
        for entry in self.long_term.values() {
            let score = Self::relevance(&query_keywords, &entry.content) * 1.2;
            let slot = scores.entry(&entry.id).or_insert((0.0, &entry.content));
            if score > slot.0 {
                *slot = (score, &entry.content);
            }
        }

        let mut ranked: Vec<(f64, &str)> = scores
            .into_values()
            .filter(|(score, _)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(top_k)
            .map(|(_, content)| content.to_string())
            .collect()
    }

    fn relevance(query_keywords: &[String], content: &str) -> f64 {
        let content_lower = content.to_lowercase();
        let matches = query_keywords
            .iter()
            .filter(|kw| content_lower.contains(kw.as_str()))
            .count();
        matches as f64 / query_keywords.len().max(1) as f64
    }

    /// Format relevant memories as a prompt block within a token budget
    pub fn context_for_prompt(&self, query: &str, max_tokens: usize) -> String {
        let relevant = self.retrieve_relevant(query, 5);
        if relevant.is_empty() {
            return String::new();
        }

        let mut parts = vec!["## 相关记忆".to_string()];
        let mut used = 0;
        for memory in relevant {
            let cost = estimate_tokens(&memory);
            if used + cost > max_tokens {
                break;
            }
            let preview: String = memory.chars().take(200).collect();
            parts.push(format!("- {}", preview));
            used += cost;
        }

        parts.join("\n")
    }

    /// Summarize recent short-term memory via the LLM and prune low-importance
    /// entries; the summary itself is stored at importance 0.8.
    pub async fn compress(&mut self, llm: &LlmClient) -> String {
        if self.short_term.len() < 5 {
            return "记忆较少，无需压缩".to_string();
        }

        let recent: Vec<String> = self
            .short_term
            .iter()
            .rev()
            .take(10)
            .map(|m| {
                let kind = m
                    .metadata
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                format!("[{}] {}", kind, m.content)
            })
            .collect();

        let prompt = format!(
            "请总结以下对话记录，提取关键信息：\n\n{}\n\n请以简洁的要点形式输出重要信息，包括：\n1. 用户偏好\n2. 重要事实\n3. 关键决策\n\n只输出要点，每条一行。",
            recent.join("\n\n")
        );

        let summary = match llm.simple_chat(&prompt, "你是一个记忆管理器。").await {
            Ok(s) if !s.is_empty() => s,
            Ok(_) | Err(_) => return "压缩失败".to_string(),
        };

        self.add(&summary, serde_json::json!({"type": "summary"}), 0.8);

        // Drop older low-importance entries, keeping the newest five intact.
        let cutoff = self.short_term.len().saturating_sub(5);
        let mut idx = 0;
        self.short_term.retain(|entry| {
            let drop = idx < cutoff && entry.importance < 0.6;
            idx += 1;
            !drop
        });
        self.save();

        summary
    }

    /// Entry lookup across both tiers
    pub fn get(&self, id: &str) -> Option<&MemoryEntry> {
        self.short_term
            .iter()
            .find(|e| e.id == id)
            .or_else(|| self.long_term.get(id))
    }

    pub fn short_term_ids(&self) -> Vec<&str> {
        self.short_term.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn long_term_contains(&self, id: &str) -> bool {
        self.long_term.contains_key(id)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            short_term_count: self.short_term.len(),
            long_term_count: self.long_term.len(),
            index_keywords: self.index.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(max: usize) -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path(), max).unwrap();
        (dir, store)
    }

    #[test]
    fn test_high_importance_enters_both_tiers() {
        let (_d, mut m) = store(20);
        let id = m.add("用户喜欢简洁的回答", serde_json::json!({}), 0.9);

        assert!(m.short_term_ids().contains(&id.as_str()));
        assert!(m.long_term_contains(&id));
    }

    #[test]
    fn test_low_importance_short_term_only() {
        let (_d, mut m) = store(20);
        let id = m.add("闲聊内容", serde_json::json!({}), 0.3);

        assert!(m.short_term_ids().contains(&id.as_str()));
        assert!(!m.long_term_contains(&id));
    }

    #[test]
    fn test_threshold_boundary() {
        let (_d, mut m) = store(20);
        let id = m.add("边界重要性", serde_json::json!({}), LONG_TERM_THRESHOLD);
        assert!(m.long_term_contains(&id));
    }

    #[test]
    fn test_eviction_drops_lowest_importance() {
        let (_d, mut m) = store(3);
        let low = m.add("low importance entry", serde_json::json!({}), 0.1);
        m.add("medium entry one", serde_json::json!({}), 0.5);
        m.add("medium entry two", serde_json::json!({}), 0.5);
        m.add("high entry", serde_json::json!({}), 0.9);

        assert_eq!(m.stats().short_term_count, 3);
        assert!(!m.short_term_ids().contains(&low.as_str()));
    }

    #[test]
    fn test_retrieve_relevant() {
        let (_d, mut m) = store(20);
        m.add("用户偏好 Rust 编程语言", serde_json::json!({}), 0.8);
        m.add("今天天气不错", serde_json::json!({}), 0.4);

        let results = m.retrieve_relevant("rust", 3);
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("Rust"));
    }

    #[test]
    fn test_interaction_importance_heuristic() {
        let (_d, mut m) = store(20);
        let id = m.add_interaction(
            "请记住我的偏好：重要信息要保存",
            "好的",
            &["notes_operator".to_string()],
            None,
        );
        // tools (+0.2) and several markers push this over the threshold
        assert!(m.long_term_contains(&id));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        {
            let mut m = MemoryStore::open(dir.path(), 20).unwrap();
            m.add("持久化测试内容", serde_json::json!({}), 0.9);
        }

        let m = MemoryStore::open(dir.path(), 20).unwrap();
        assert_eq!(m.stats().short_term_count, 1);
        assert_eq!(m.stats().long_term_count, 1);
        assert!(!m.retrieve_relevant("持久化", 3).is_empty());
    }

    #[test]
    fn test_context_for_prompt_budget() {
        let (_d, mut m) = store(20);
        m.add("用户使用 macOS 系统", serde_json::json!({}), 0.8);

        let context = m.context_for_prompt("macos", 1000);
        assert!(context.contains("相关记忆"));

        let tiny = m.context_for_prompt("macos", 0);
        assert_eq!(tiny.lines().count(), 1);
    }
}
