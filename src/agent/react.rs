//! ReAct Loop
//!
//! Reason-act cycle against the chat endpoint: the model either answers
//! directly (terminating the run) or names tools, which execute strictly
//! sequentially with their JSON results appended as tool messages. The
//! built-in `create_skill` tool lets the model extend the registry
//! mid-run; after a successful creation the schema list is refreshed.
//!
//! Termination: a direct answer, the iteration bound, or a transport
//! failure from the endpoint. There is no retry.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::llm::ChatMessage;
use crate::skills::schema::ToolSpec;

/// How many past exchanges are carried into the prompt
const MAX_HISTORY_MESSAGES: usize = 10;

const SYSTEM_PROMPT: &str = r#"你是一个智能助手 Neo，使用 ReAct 模式工作。

## 工作模式
你将通过以下步骤完成任务：
1. **Thought**: 分析当前情况，思考下一步该做什么
2. **Action**: 选择合适的工具并执行
3. **Observation**: 观察执行结果
4. 重复以上步骤直到任务完成

## 核心能力
- 你可以使用 `browser_agent` **访问任何网站**获取信息（小红书、微博、知乎、淘宝等）
- 你可以使用 `desktop_agent` 像真人一样操作macOS应用
- 你可以**自主编写新技能**来解决现有工具无法完成的任务
- 当发现需要新功能时，使用 `create_skill` 工具创建

## 重要规则
- **优先尝试解决问题**：不要轻易说"无法完成"
- **主动使用工具**：当需要访问网站时，直接使用 browser_agent
- 仔细观察工具返回的结果
- 如果工具执行失败，分析原因并尝试其他方法
- 当任务完成时，直接回复用户

## 安全确认机制
当工具返回 `requires_confirmation: true` 时：
1. 向用户展示 `confirmation_message` 的内容
2. 询问用户是否允许此操作
3. 如果用户同意，再次调用**相同的工具**并设置 `auto_confirm: true`
4. 如果用户拒绝，告知用户并停止该操作

## 可用工具
{tool_descriptions}

## 输出格式
当你需要调用工具时，直接使用 function calling。
当你认为任务完成时，直接回复用户。
当需要用户确认时，直接向用户询问，等待用户回复后再继续。"#;

/// One executed tool call in the trace
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub iteration: usize,
    pub tool: String,
    pub args: Value,
    pub result: Value,
}

/// Outcome of a ReAct run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub response: String,
    pub trace: Vec<TraceStep>,
    pub generated_skills: Vec<String>,
    pub message_count: usize,
}

impl RunResult {
    fn finished(success: bool, response: String, run: ReActRun) -> Self {
        Self {
            success,
            response,
            trace: run.trace,
            generated_skills: run.generated_skills,
            message_count: run.message_count,
        }
    }

    /// Human-readable trace summary for the CLI
    pub fn trace_summary(&self) -> String {
        if self.trace.is_empty() {
            return "无执行记录".to_string();
        }

        let mut lines = vec!["## 执行轨迹".to_string()];
        for step in &self.trace {
            lines.push(format!("- 步骤{}: 调用 {}", step.iteration, step.tool));
            let ok = step.result.get("error").is_none()
                && step.result.get("success").and_then(|s| s.as_bool()) != Some(false);
            lines.push(format!("  - 结果: {}", if ok { "✅ 成功" } else { "❌ 失败" }));
        }
        if !self.generated_skills.is_empty() {
            lines.push(format!("\n## 新创建的技能: {}", self.generated_skills.join(", ")));
        }
        lines.join("\n")
    }
}

#[derive(Default)]
struct ReActRun {
    trace: Vec<TraceStep>,
    generated_skills: Vec<String>,
    message_count: usize,
}

/// ReAct agent bound to a context
pub struct ReActAgent {
    ctx: AgentContext,
    max_iterations: usize,
}

impl ReActAgent {
    pub fn new(ctx: AgentContext) -> Self {
        let max_iterations = ctx.config.max_iterations;
        Self { ctx, max_iterations }
    }

    /// Run one request to completion
    pub async fn run(&self, user_input: &str, history: &[ChatMessage]) -> RunResult {
        let mut state = ReActRun::default();

        let mut tool_schemas = self.tool_schemas().await;
        let mut messages = self.initial_messages(user_input, history, &tool_schemas).await;

        for iteration in 1..=self.max_iterations {
            debug!("ReAct iteration {}/{}", iteration, self.max_iterations);

            let reply = match self.ctx.llm.chat(&messages, Some(tool_schemas.as_slice())).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("LLM call failed: {}", e);
                    state.message_count = messages.len();
                    return RunResult::finished(false, format!("LLM 请求失败: {}", e), state);
                }
            };

            let tool_calls = reply.tool_calls.clone().unwrap_or_default();
            messages.push(reply.clone());

            if tool_calls.is_empty() {
                let answer = reply.content.unwrap_or_default();
                state.message_count = messages.len();
                return RunResult::finished(true, answer, state);
            }

            // Tool calls within one turn execute strictly sequentially.
            for call in tool_calls {
                let tool_name = call.function.name.clone();
                let args = call.parse_arguments();
                info!("Executing tool: {} (step {})", tool_name, iteration);

                let result = if tool_name == "create_skill" {
                    let result = self.create_skill(&args).await;
                    if result.get("success").and_then(|s| s.as_bool()) == Some(true) {
                        if let Some(name) = result["skill_name"].as_str() {
                            state.generated_skills.push(name.to_string());
                        }
                        // New skill is immediately callable on the next turn.
                        tool_schemas = self.tool_schemas().await;
                    }
                    result
                } else {
                    self.execute_tool(&tool_name, args.clone()).await
                };

                state.trace.push(TraceStep {
                    iteration,
                    tool: tool_name.clone(),
                    args,
                    result: result.clone(),
                });

                messages.push(ChatMessage::tool_result(&call.id, &tool_name, &result));
            }
        }

        state.message_count = messages.len();
        RunResult::finished(false, "达到最大迭代次数，任务未完成".to_string(), state)
    }

    async fn tool_schemas(&self) -> Vec<Value> {
        let mut schemas = self.ctx.registry.read().await.schemas();
        schemas.push(create_skill_schema());
        schemas
    }

    async fn initial_messages(
        &self,
        user_input: &str,
        history: &[ChatMessage],
        tool_schemas: &[Value],
    ) -> Vec<ChatMessage> {
        let descriptions: Vec<String> = tool_schemas
            .iter()
            .map(|schema| {
                let name = crate::skills::schema::function_name(schema).unwrap_or("unknown");
                let desc =
                    crate::skills::schema::function_description(schema).unwrap_or("无描述");
                format!("- **{}**: {}", name, desc)
            })
            .collect();

        let mut system_content =
            SYSTEM_PROMPT.replace("{tool_descriptions}", &descriptions.join("\n"));

        let memory_context = self
            .ctx
            .memory
            .lock()
            .await
            .context_for_prompt(user_input, 1000);
        if !memory_context.is_empty() {
            system_content.push_str("\n\n");
            system_content.push_str(&memory_context);
        }

        let mut messages = vec![ChatMessage::system(&system_content)];

        let start = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
        for msg in &history[start..] {
            if msg.role == "user" || msg.role == "assistant" {
                messages.push(msg.clone());
            }
        }

        messages.push(ChatMessage::user(user_input));
        messages
    }

    async fn execute_tool(&self, name: &str, args: Value) -> Value {
        let installed = {
            let registry = self.ctx.registry.read().await;
            registry.get(name).cloned()
        };

        match installed {
            Some(skill) => skill.invoke(args).await,
            None => {
                json!({"error": format!("未知工具: {}，你可以使用 create_skill 创建新技能", name)})
            }
        }
    }

    async fn create_skill(&self, args: &Value) -> Value {
        let skill_name = args["skill_name"].as_str().unwrap_or("");
        let skill_code = args["skill_code"].as_str().unwrap_or("");

        if skill_name.is_empty() || skill_code.is_empty() {
            return json!({"success": false, "error": "缺少技能名称或代码"});
        }

        let mut registry = self.ctx.registry.write().await;
        let guard = self.ctx.code_guard.lock().await;
        self.ctx
            .generator
            .install(&mut registry, &guard, Some(skill_name), skill_code)
            .await
    }
}

fn create_skill_schema() -> Value {
    ToolSpec::new(
        "create_skill",
        "创建新技能。当你发现现有工具无法完成任务时，使用此工具编写新技能。新技能创建后会立即可用。",
    )
    .string_param("skill_name", "技能名称，使用下划线命名法，如 podcast_fetcher", true)
    .string_param("skill_description", "技能功能描述，用于语义搜索匹配", true)
    .string_param(
        "skill_code",
        "完整的 Python 技能代码，必须包含 run() 和 get_tool_definition() 函数",
        true,
    )
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_skill_schema_shape() {
        let schema = create_skill_schema();
        assert_eq!(
            crate::skills::schema::function_name(&schema),
            Some("create_skill")
        );
        let required = schema["function"]["parameters"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), 3);
    }

    #[test]
    fn test_trace_summary_formats_failures() {
        let result = RunResult {
            success: true,
            response: "done".to_string(),
            trace: vec![
                TraceStep {
                    iteration: 1,
                    tool: "web_search".to_string(),
                    args: json!({}),
                    result: json!({"success": true}),
                },
                TraceStep {
                    iteration: 2,
                    tool: "notes_operator".to_string(),
                    args: json!({}),
                    result: json!({"error": "boom"}),
                },
            ],
            generated_skills: vec!["auto_skill_x".to_string()],
            message_count: 5,
        };

        let summary = result.trace_summary();
        assert!(summary.contains("web_search"));
        assert!(summary.contains("❌"));
        assert!(summary.contains("auto_skill_x"));
    }
}
