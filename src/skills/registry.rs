//! Skill Registry
//!
//! Maps skill names to invocable tools and keeps a keyword index over their
//! descriptions for lightweight relevance search. The index is rebuilt
//! wholesale whenever the registry changes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::dynamic::DynamicSkill;
use super::schema::{function_description, function_name, function_properties};
use crate::tokenizer::{extract_keywords, split_identifier};

/// A named callable with a tool-schema descriptor
#[async_trait]
pub trait Skill: Send + Sync {
    /// Tool schema in the function-calling envelope
    fn definition(&self) -> Value;

    /// Invoke with a JSON argument object; errors come back as JSON
    /// (`{"success": false, "error": ...}`), never as panics.
    async fn invoke(&self, args: Value) -> Value;
}

/// Where a registered skill came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillSource {
    /// Compiled into the binary
    Static,
    /// Agent-generated Python file
    DynamicFile(PathBuf),
    /// Markdown-defined skill directory (reserved)
    Markdown(PathBuf),
}

/// Registry entry
#[derive(Clone)]
pub struct InstalledSkill {
    pub name: String,
    pub schema: Value,
    pub source: SkillSource,
    skill: Arc<dyn Skill>,
}

impl InstalledSkill {
    pub async fn invoke(&self, args: Value) -> Value {
        self.skill.invoke(args).await
    }
}

/// A search hit with its relevance score
#[derive(Debug, Clone)]
pub struct SkillMatch {
    pub name: String,
    pub description: String,
    pub score: f64,
}

/// Skill registry with keyword search
pub struct SkillRegistry {
    skills: HashMap<String, InstalledSkill>,
    /// skill name -> keyword set, rebuilt on every change
    keyword_index: HashMap<String, HashSet<String>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
            keyword_index: HashMap::new(),
        }
    }

    /// Register a skill under its schema's `function.name`
    ///
    /// Schemas without `function.name` are rejected. A name collision
    /// silently replaces the previous entry.
    pub fn register(&mut self, skill: Arc<dyn Skill>, source: SkillSource) -> bool {
        let schema = skill.definition();
        let name = match function_name(&schema) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                warn!("Rejected skill registration: schema has no function.name");
                return false;
            }
        };

        if self.skills.contains_key(&name) {
            info!("Skill '{}' re-registered, replacing previous entry", name);
        }

        self.skills.insert(
            name.clone(),
            InstalledSkill {
                name,
                schema,
                source,
                skill,
            },
        );
        self.rebuild_index();
        true
    }

    pub fn get(&self, name: &str) -> Option<&InstalledSkill> {
        self.skills.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// All tool schemas, for the chat request
    pub fn schemas(&self) -> Vec<Value> {
        self.skills.values().map(|s| s.schema.clone()).collect()
    }

    /// One-line listing for prompts and the CLI
    pub fn summary(&self) -> String {
        let mut lines = vec!["## 已加载技能".to_string()];
        for name in self.list() {
            let desc = self
                .skills
                .get(name)
                .and_then(|s| function_description(&s.schema))
                .unwrap_or("无描述");
            let preview: String = desc.chars().take(50).collect();
            lines.push(format!("- **{}**: {}", name, preview));
        }
        lines.join("\n")
    }

    /// Keyword-relevance search over the index
    ///
    /// score = |query ∩ skill| / |query| + 0.1 per substring-containment
    /// pair, capped at 1.0. Only scores above zero are returned.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SkillMatch> {
        let query_keywords = extract_keywords(query);
        if query_keywords.is_empty() {
            return Vec::new();
        }
        let query_set: HashSet<&str> = query_keywords.iter().map(|s| s.as_str()).collect();

        let mut matches: Vec<SkillMatch> = self
            .keyword_index
            .iter()
            .filter_map(|(name, skill_keywords)| {
                let intersection = skill_keywords
                    .iter()
                    .filter(|k| query_set.contains(k.as_str()))
                    .count();
                let base = intersection as f64 / query_keywords.len().max(1) as f64;

                let mut bonus = 0.0;
                for qk in &query_keywords {
                    for sk in skill_keywords {
                        if qk.contains(sk.as_str()) || sk.contains(qk.as_str()) {
                            bonus += 0.1;
                        }
                    }
                }

                let score = (base + bonus).min(1.0);
                if score > 0.0 {
                    let description = self
                        .skills
                        .get(name)
                        .and_then(|s| function_description(&s.schema))
                        .unwrap_or_default()
                        .to_string();
                    Some(SkillMatch {
                        name: name.clone(),
                        description,
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        matches
    }

    /// Rebuild the keyword index from every registered schema
    fn rebuild_index(&mut self) {
        self.keyword_index.clear();

        for (name, installed) in &self.skills {
            let mut keywords: HashSet<String> = HashSet::new();

            if let Some(desc) = function_description(&installed.schema) {
                keywords.extend(extract_keywords(desc));
            }
            keywords.extend(split_identifier(name));

            if let Some(props) = function_properties(&installed.schema) {
                for (param, info) in props {
                    keywords.insert(param.to_lowercase());
                    if let Some(desc) = info.get("description").and_then(|d| d.as_str()) {
                        keywords.extend(extract_keywords(desc));
                    }
                }
            }

            self.keyword_index.insert(name.clone(), keywords);
        }
    }

    /// Load every `*.py` skill file from the dynamic skills directory
    ///
    /// Files that fail to load are skipped with a warning; returns how many
    /// were registered.
    pub async fn load_dynamic_dir(&mut self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return 0,
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "py").unwrap_or(false) {
                match DynamicSkill::load(&path).await {
                    Ok(skill) => {
                        if self.register(Arc::new(skill), SkillSource::DynamicFile(path.clone())) {
                            loaded += 1;
                        }
                    }
                    Err(e) => warn!("Skipping dynamic skill {}: {}", path.display(), e),
                }
            }
        }

        if loaded > 0 {
            info!("Loaded {} dynamic skill(s) from {}", loaded, dir.display());
        }
        loaded
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::schema::ToolSpec;

    struct FakeSkill {
        schema: Value,
    }

    #[async_trait]
    impl Skill for FakeSkill {
        fn definition(&self) -> Value {
            self.schema.clone()
        }

        async fn invoke(&self, args: Value) -> Value {
            serde_json::json!({"success": true, "args": args})
        }
    }

    fn fake(name: &str, description: &str) -> Arc<dyn Skill> {
        Arc::new(FakeSkill {
            schema: ToolSpec::new(name, description)
                .string_param("input", "输入内容", true)
                .build(),
        })
    }

    #[test]
    fn test_register_and_get() {
        let mut reg = SkillRegistry::new();
        assert!(reg.register(fake("web_search", "网络搜索工具"), SkillSource::Static));
        assert!(reg.get("web_search").is_some());
        assert_eq!(reg.list(), vec!["web_search"]);
    }

    #[test]
    fn test_register_rejects_missing_function_name() {
        struct Nameless;

        #[async_trait]
        impl Skill for Nameless {
            fn definition(&self) -> Value {
                serde_json::json!({"type": "function", "function": {"description": "no name"}})
            }
            async fn invoke(&self, _args: Value) -> Value {
                Value::Null
            }
        }

        let mut reg = SkillRegistry::new();
        assert!(!reg.register(Arc::new(Nameless), SkillSource::Static));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_reregister_replaces() {
        let mut reg = SkillRegistry::new();
        reg.register(fake("notes", "first version"), SkillSource::Static);
        reg.register(fake("notes", "second version"), SkillSource::Static);

        assert_eq!(reg.len(), 1);
        let installed = reg.get("notes").unwrap();
        assert_eq!(
            function_description(&installed.schema),
            Some("second version")
        );
    }

    #[test]
    fn test_search_finds_notes_by_cjk_keyword() {
        let mut reg = SkillRegistry::new();
        reg.register(
            fake(
                "notes_operator",
                "用于在 macOS 备忘录应用中进行操作。当用户想要记录信息、保存备忘、创建清单时使用。",
            ),
            SkillSource::Static,
        );
        reg.register(fake("web_search", "网络搜索工具"), SkillSource::Static);

        let results = reg.search("备忘录", 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].name, "notes_operator");
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn test_search_ranks_by_overlap() {
        let mut reg = SkillRegistry::new();
        reg.register(
            fake("weather", "Get current weather forecast for a city"),
            SkillSource::Static,
        );
        reg.register(
            fake("calculator", "Evaluate math expressions"),
            SkillSource::Static,
        );

        let results = reg.search("weather forecast", 5);
        assert_eq!(results[0].name, "weather");
        assert!(results[0].score >= 0.5);
    }

    #[test]
    fn test_search_score_capped() {
        let mut reg = SkillRegistry::new();
        reg.register(
            fake("search", "search search search search"),
            SkillSource::Static,
        );
        let results = reg.search("search", 1);
        assert!(results[0].score <= 1.0);
    }

    #[test]
    fn test_search_no_match() {
        let mut reg = SkillRegistry::new();
        reg.register(fake("weather", "Weather lookups"), SkillSource::Static);
        assert!(reg.search("量子物理", 5).is_empty());
    }

    #[tokio::test]
    async fn test_invoke_through_registry() {
        let mut reg = SkillRegistry::new();
        reg.register(fake("echo", "Echo input"), SkillSource::Static);

        let result = reg
            .get("echo")
            .unwrap()
            .invoke(serde_json::json!({"input": "hi"}))
            .await;
        assert_eq!(result["success"], true);
    }
}
