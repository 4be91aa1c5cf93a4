//! Task Planner
//!
//! LLM-driven decomposition of complex requests into tool-level tasks with
//! dependencies, plus sequential dependency-ordered execution. Simple
//! requests come back undecomposed and go straight to the ReAct loop.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::context::AgentContext;

const PLANNING_PROMPT: &str = r#"你是一个任务规划专家。请分析用户任务并分解为可执行的子任务。

## 用户任务
{task_description}

## 可用工具
{tool_list}

## 规划要求
1. 将复杂任务分解为具体的、可执行的步骤
2. 每个步骤应该明确使用哪个工具
3. 考虑任务之间的依赖关系
4. 如果任务简单，不需要分解

## 输出格式
请以 JSON 格式输出计划:
{
    "need_decomposition": true/false,
    "reasoning": "简要说明为什么需要/不需要分解",
    "tasks": [
        {
            "id": "1",
            "description": "步骤描述",
            "tool": "工具名称",
            "args": {"参数": "值"},
            "depends_on": []
        }
    ]
}

只输出 JSON，不要有其他内容。"#;

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}

/// One planned step
#[derive(Debug, Clone, Deserialize)]
pub struct PlannedTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A full plan
#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub need_decomposition: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
}

/// Execution record for one task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub result: Value,
}

/// LLM task planner
pub struct TaskPlanner {
    ctx: AgentContext,
}

impl TaskPlanner {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Ask the model for a plan
    pub async fn plan(&self, user_input: &str) -> Option<Plan> {
        let tool_list = self.ctx.registry.read().await.summary();
        let prompt = PLANNING_PROMPT
            .replace("{task_description}", user_input)
            .replace("{tool_list}", &tool_list);

        let response = match self.ctx.llm.simple_chat(&prompt, "你是一个任务规划专家。").await {
            Ok(r) => r,
            Err(e) => {
                warn!("Planning failed: {}", e);
                return None;
            }
        };

        let json_str = extract_json_object(&response)?;
        match serde_json::from_str::<Plan>(json_str) {
            Ok(plan) => {
                debug!(
                    "Plan: decompose={}, {} task(s)",
                    plan.need_decomposition,
                    plan.tasks.len()
                );
                Some(plan)
            }
            Err(e) => {
                warn!("Plan response unparseable: {}", e);
                None
            }
        }
    }

    /// Execute a plan sequentially in dependency order
    ///
    /// A task whose dependency failed (or was skipped) is skipped itself.
    pub async fn execute(&self, plan: &Plan) -> Vec<TaskOutcome> {
        let mut outcomes: Vec<TaskOutcome> = Vec::with_capacity(plan.tasks.len());
        let mut status: HashMap<&str, TaskStatus> = HashMap::new();
        let mut done: HashSet<&str> = HashSet::new();

        // Repeated sweeps resolve dependency order without an explicit sort;
        // a cycle leaves its tasks pending and they get skipped at the end.
        let mut progressed = true;
        while progressed && done.len() < plan.tasks.len() {
            progressed = false;

            for task in &plan.tasks {
                if done.contains(task.id.as_str()) {
                    continue;
                }
                if !task.depends_on.iter().all(|d| done.contains(d.as_str())) {
                    continue;
                }

                let blocked = task.depends_on.iter().any(|d| {
                    !matches!(status.get(d.as_str()), Some(TaskStatus::Completed))
                });

                let outcome = if blocked {
                    TaskOutcome {
                        task_id: task.id.clone(),
                        description: task.description.clone(),
                        status: TaskStatus::Skipped,
                        result: json!({"error": "依赖任务未成功，跳过"}),
                    }
                } else {
                    self.run_task(task).await
                };

                status.insert(task.id.as_str(), outcome.status);
                done.insert(task.id.as_str());
                outcomes.push(outcome);
                progressed = true;
            }
        }

        for task in &plan.tasks {
            if !done.contains(task.id.as_str()) {
                outcomes.push(TaskOutcome {
                    task_id: task.id.clone(),
                    description: task.description.clone(),
                    status: TaskStatus::Skipped,
                    result: json!({"error": "依赖关系无法满足"}),
                });
            }
        }

        outcomes
    }

    async fn run_task(&self, task: &PlannedTask) -> TaskOutcome {
        let installed = {
            let registry = self.ctx.registry.read().await;
            registry.get(&task.tool).cloned()
        };
        let installed = match installed {
            Some(s) => s,
            None => {
                return TaskOutcome {
                    task_id: task.id.clone(),
                    description: task.description.clone(),
                    status: TaskStatus::Failed,
                    result: json!({"error": format!("未知工具: {}", task.tool)}),
                }
            }
        };

        let args = if task.args.is_object() {
            task.args.clone()
        } else {
            json!({})
        };
        let result = installed.invoke(args).await;

        let failed = result.get("error").is_some()
            || result.get("success").and_then(|s| s.as_bool()) == Some(false);

        TaskOutcome {
            task_id: task.id.clone(),
            description: task.description.clone(),
            status: if failed { TaskStatus::Failed } else { TaskStatus::Completed },
            result,
        }
    }
}

/// Extract the first balanced JSON object from text
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, c) in s[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if end > start {
        Some(&s[start..end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        let text = "Here is the plan:\n```json\n{\"need_decomposition\": false}\n```";
        assert_eq!(
            extract_json_object(text),
            Some("{\"need_decomposition\": false}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_plan_deserialization() {
        let raw = r#"{
            "need_decomposition": true,
            "reasoning": "multi step",
            "tasks": [
                {"id": "1", "description": "search", "tool": "web_search", "args": {"query": "x"}, "depends_on": []},
                {"id": "2", "description": "save", "tool": "notes_operator", "depends_on": ["1"]}
            ]
        }"#;

        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert!(plan.need_decomposition);
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].depends_on, vec!["1"]);
    }

    #[test]
    fn test_plan_tolerates_missing_fields() {
        let plan: Plan = serde_json::from_str(r#"{"need_decomposition": false}"#).unwrap();
        assert!(plan.tasks.is_empty());
    }
}
