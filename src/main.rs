//! Seeker 命令行
//!
//! 逐行读取 stdin，每行作为一轮对话流式输出：规划片段、任务进度、回复 token。
//! 会话 state 跨轮保留；`/new` 重置会话，`/quit` 退出。可选第一个参数为配置文件路径。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use futures_util::StreamExt;
use seeker::agent::create_agent_components;
use seeker::config::{load_config, AppConfig};
use seeker::{AgentState, TurnEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    seeker::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });
    let components = create_agent_components(&cfg).context("Failed to create agent")?;

    let name = cfg.app.name.clone().unwrap_or_else(|| "seeker".to_string());
    let mode = if components.mock_mode { ", mock LLM" } else { "" };
    println!("{} ready (tools: {:?}{})", name, components.tool_names, mode);
    println!("Type a question, /new to reset the conversation, /quit to exit.");

    let mut state = AgentState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next_line().await.context("read stdin")? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                state = AgentState::new();
                println!("(new conversation)");
                continue;
            }
            _ => {}
        }

        let mut stream = components.engine.stream_turn(state.clone(), input);
        while let Some(item) = stream.next().await {
            match item {
                Ok(TurnEvent::PlanToken { .. }) => {}
                Ok(TurnEvent::PlanComplete { plan }) => {
                    if plan.requires_tool {
                        println!("\n[plan]\n{}", plan);
                    }
                }
                Ok(TurnEvent::ExecuteProgress { task, success, preview }) => {
                    let status = if success { "ok" } else { "failed" };
                    println!("[{}] {} -> {}", status, task.title, preview);
                }
                Ok(TurnEvent::ExecuteRemaining { remaining }) => {
                    if !remaining.is_empty() {
                        println!("[pending] {} task(s)", remaining.len());
                    }
                }
                Ok(TurnEvent::ResponseToken { token }) => {
                    print!("{}", token);
                    std::io::stdout().flush().context("flush stdout")?;
                }
                Ok(TurnEvent::Final { state: done }) => {
                    state = *done;
                    println!();
                    let (prompt, completion, total) = components.token_usage();
                    if total > 0 {
                        println!(
                            "[tokens] prompt={} completion={} total={}",
                            prompt, completion, total
                        );
                    }
                }
                Err(e) => {
                    // 本轮失败：保留上一轮的会话 state
                    eprintln!("\nerror: {}", e);
                }
            }
        }
    }
    Ok(())
}
