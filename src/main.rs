//! Neo - Entry Point
//!
//! Modes:
//! - Default: interactive chat REPL
//! - --once <prompt>: answer a single request and exit

use std::io::{BufRead, Write};

use neo_agent::llm::ChatMessage;
use neo_agent::{AgentContext, Config, ReActAgent, TaskPlanner};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::WARN);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;
    let ctx = AgentContext::initialize(config).await?;
    let agent = ReActAgent::new(ctx.clone());

    if let Some(pos) = args.iter().position(|a| a == "--once") {
        let prompt = args
            .get(pos + 1)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("--once requires a prompt argument"))?;
        let result = agent.run(&prompt, &[]).await;
        println!("{}", result.response);
        let _ = ctx.safety.save_audit_log();
        return Ok(());
    }

    run_repl(ctx, agent).await
}

async fn run_repl(ctx: AgentContext, agent: ReActAgent) -> anyhow::Result<()> {
    {
        let registry = ctx.registry.read().await;
        println!("🧠 Neo 智能助手");
        println!("基于 ReAct 架构 | 原生 Function Calling | 智能记忆系统");
        println!("已加载技能: {} 个", registry.len());
        println!("输入 'help' 查看帮助，'quit' 退出\n");
    }

    let stdin = std::io::stdin();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        print!("你: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => break,
            "help" => {
                print_repl_help();
                continue;
            }
            "skills" => {
                println!("{}\n", ctx.registry.read().await.summary());
                continue;
            }
            "memory" => {
                let stats = ctx.memory.lock().await.stats();
                println!(
                    "短期记忆: {} 条 | 长期记忆: {} 条 | 索引关键词: {}\n",
                    stats.short_term_count, stats.long_term_count, stats.index_keywords
                );
                continue;
            }
            "status" => {
                let code_status = ctx.code_guard.lock().await.status();
                let summary = ctx.safety.session_summary();
                println!("代码保护级别: {}", code_status.level);
                println!("本次会话操作: {} (拒绝 {})\n",
                    summary.total_operations,
                    summary.total_operations - summary.approved_operations
                );
                continue;
            }
            "clear" => {
                history.clear();
                ctx.safety.clear_session_confirmations();
                println!("对话历史已清空\n");
                continue;
            }
            "compress" => {
                let summary = ctx.memory.lock().await.compress(&ctx.llm).await;
                println!("{}\n", summary);
                continue;
            }
            _ => {}
        }

        // "plan <task>" runs decomposition + dependency-ordered execution
        if let Some(task) = input.strip_prefix("plan ") {
            run_plan(&ctx, &agent, task).await;
            continue;
        }

        let result = agent.run(input, &history).await;
        println!("\nNeo: {}\n", result.response);

        if !result.success && !result.trace.is_empty() {
            println!("{}\n", result.trace_summary());
        }

        let tools: Vec<String> = result.trace.iter().map(|s| s.tool.clone()).collect();
        ctx.memory
            .lock()
            .await
            .add_interaction(input, &result.response, &tools, None);

        history.push(ChatMessage::user(input));
        history.push(ChatMessage::assistant(&result.response));
    }

    match ctx.safety.save_audit_log() {
        Ok(path) => println!("审计日志已保存: {}", path.display()),
        Err(e) => eprintln!("审计日志保存失败: {}", e),
    }
    println!("再见！");
    Ok(())
}

async fn run_plan(ctx: &AgentContext, agent: &ReActAgent, task: &str) {
    let planner = TaskPlanner::new(ctx.clone());

    let plan = match planner.plan(task).await {
        Some(p) => p,
        None => {
            println!("规划失败，直接执行任务\n");
            let result = agent.run(task, &[]).await;
            println!("Neo: {}\n", result.response);
            return;
        }
    };

    if !plan.need_decomposition {
        println!("任务无需分解：{}\n", plan.reasoning);
        let result = agent.run(task, &[]).await;
        println!("Neo: {}\n", result.response);
        return;
    }

    println!("计划（{} 步）: {}", plan.tasks.len(), plan.reasoning);
    for step in &plan.tasks {
        println!("  {}. {} [{}]", step.id, step.description, step.tool);
    }

    let outcomes = planner.execute(&plan).await;
    for outcome in &outcomes {
        println!("步骤 {}: {:?}", outcome.task_id, outcome.status);
    }
    println!();
}

fn print_help() {
    println!("Neo v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: neo [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --once <prompt>  Answer one request and exit");
    println!("  --help, -h       Show this help");
    println!();
    println!("Environment variables:");
    println!("  LLM_API_KEY        Chat-completions API key");
    println!("  LLM_BASE_URL       Chat-completions endpoint");
    println!("  LLM_MODEL          Model identifier");
    println!("  NEO_DATA_DIR       State directory (memory, sessions, audit)");
    println!("  NEO_SKILLS_DIR     Dynamic skills directory");
    println!("  NEO_MAX_ITERATIONS ReAct iteration bound (default 15)");
}

fn print_repl_help() {
    println!("命令:");
    println!("  help    显示帮助信息");
    println!("  skills  列出所有已加载的技能");
    println!("  memory  显示记忆统计");
    println!("  status  显示保护系统状态");
    println!("  clear   清空对话历史和会话确认");
    println!("  compress 压缩短期记忆，提炼长期要点");
    println!("  plan <任务>  先分解任务再按依赖顺序执行");
    println!("  quit    退出程序");
    println!();
    println!("💡 使用示例:");
    println!("  帮我记一条备忘录：明天下午三点开会");
    println!("  看看小红书上有什么好玩的");
    println!("  创建一个查询天气的技能");
    println!();
}
