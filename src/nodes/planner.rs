//! Planner：把对话与工具目录转成一个 Plan
//!
//! prompt = 固定 system 指令（决策策略）+ 注入时间戳 / 工具目录 / 查询的指令模板 + 完整对话历史。
//! 通过结构化输出契约请求 Plan JSON；阻塞模式一次往返，流式模式逐片段推送 PlanToken，
//! 流结束后解析并推送 PlanComplete。解析失败与 LLM 失败都直接返回给调用方，不在此层重试。

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::StreamExt;

use crate::core::{AgentError, AgentState, Plan};
use crate::llm::{extract_json_block, LlmClient, OutputSchema};
use crate::memory::{dialogue_turns, Message, Role};
use crate::nodes::{EventSink, TurnEvent};
use crate::tools::ToolRegistry;

/// Planner 默认 system 指令
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are an AI research assistant. Follow these steps to analyze and respond to queries:

1. First, determine if the query can be answered directly without tools:
    - Simple greetings or basic questions
    - General knowledge within your capabilities
    - Questions not requiring real-time or external data

2. If direct response is possible:
    - Respond immediately as the conversational agent
    - Keep the response clear, concise, and natural
    - Ensure the response is contextually appropriate and polite

3. If tools are needed:
    - Create a focused execution plan with:
      a. Brief overview of approach
      b. Specific tool tasks with clear parameters
      c. Structured sequence of actions

Always use the provided datetime for any time-sensitive information.
Ensure that all tool names and parameters are valid and correctly formatted."#;

/// Planner：持有 LLM、system 指令、工具目录与 Plan Schema
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    tool_catalog: String,
    schema: OutputSchema,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, tools: &ToolRegistry) -> Self {
        Self {
            llm,
            system_prompt: PLANNER_SYSTEM_PROMPT.to_string(),
            tool_catalog: tools.catalog(),
            schema: OutputSchema::for_type::<Plan>(
                "plan",
                "Either a direct response or an ordered list of tool tasks",
            ),
        }
    }

    /// 覆盖 system 指令（[llm.planner] system_prompt）
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// 生成一个 Plan 并写入 state（plan 与 remaining_tasks）
    pub async fn plan(&self, state: AgentState, events: &EventSink) -> Result<AgentState, AgentError> {
        let messages = self.build_messages(&state, Utc::now());
        let raw = if events.is_streaming() {
            self.stream_plan(&messages, events).await?
        } else {
            self.llm
                .complete_structured(&messages, &self.schema)
                .await
                .map_err(AgentError::Planning)?
        };

        let plan = parse_plan(&raw)?;
        tracing::info!(
            requires_tool = plan.requires_tool,
            tasks = plan.tasks.len(),
            replanning = state.is_replanning(),
            "plan generated"
        );
        let state = apply_plan(state, plan);
        events
            .emit(TurnEvent::PlanComplete {
                plan: state.plan.clone(),
            })
            .await?;
        Ok(state)
    }

    /// 流式规划：逐片段转发并累积，返回完整 JSON 文本
    async fn stream_plan(&self, messages: &[Message], events: &EventSink) -> Result<String, AgentError> {
        let mut stream = self
            .llm
            .complete_structured_stream(messages, &self.schema)
            .await
            .map_err(AgentError::Planning)?;
        let mut raw = String::new();
        while let Some(token) = stream.next().await {
            let token = token.map_err(AgentError::Planning)?;
            raw.push_str(&token);
            events.emit(TurnEvent::PlanToken { token }).await?;
        }
        Ok(raw)
    }

    /// system 指令 + 指令模板 + 对话历史（历史末尾应为本轮用户输入，缺失时补上）
    pub fn build_messages(&self, state: &AgentState, now: DateTime<Utc>) -> Vec<Message> {
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(self.instruction(state, now)),
        ];
        messages.extend(dialogue_turns(&state.message_history).cloned());

        let input_in_history = state
            .message_history
            .last()
            .map(|m| m.role == Role::User && m.content == state.input)
            .unwrap_or(false);
        if !input_in_history && !state.input.is_empty() {
            messages.push(Message::user(state.input.clone()));
        }
        messages
    }

    fn instruction(&self, state: &AgentState, now: DateTime<Utc>) -> String {
        let mut instruction = format!(
            "<current-datetime>{}</current-datetime>\n\n\
             Available tools:\n{}\n\n\
             Query: {}\n\n\
             Determine if this query:\n\
             1. Can be answered directly (respond without tools)\n\
             2. Requires tool usage (provide structured plan)\n\n\
             Response format:\n\
             - For direct answers: set requires_tool to false and put the answer in direct_response\n\
             - For tool usage: set requires_tool to true, give a brief overview and an ordered list of tasks\n\n\
             Ensure that all tool names and parameters are valid and correctly formatted.",
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.tool_catalog,
            state.input
        );
        if state.is_replanning() {
            instruction.push_str("\n\n");
            instruction.push_str(&progress_section(state));
        }
        instruction
    }
}

/// 重新规划时的进度说明：已执行任务（含失败原因）与待执行任务
fn progress_section(state: &AgentState) -> String {
    let mut lines = vec!["Progress in this turn:".to_string()];
    for (i, executed) in state.executed_tasks.iter().enumerate() {
        let status = if executed.success { "Success" } else { "Failed" };
        let mut line = format!(
            "{}. [{}] {} (tool: {})",
            i + 1,
            status,
            executed.task.title,
            executed.task.tool_name
        );
        if !executed.success {
            line.push_str(&format!(" - Error: {}", executed.result));
        }
        lines.push(line);
    }
    if !state.remaining_tasks.is_empty() {
        lines.push("Pending tasks:".to_string());
        for task in &state.remaining_tasks {
            lines.push(format!("- {}", task));
        }
    }
    lines.push(
        "Plan only the tasks that still need to run: retry, replace or drop failed tasks as needed, \
         and do not repeat tasks that already succeeded. If the results collected so far are enough, \
         set requires_tool to false with an empty task list. The final answer is written in a later \
         step, so leave direct_response empty."
            .to_string(),
    );
    lines.join("\n")
}

/// 解析结构化输出；字段级校验失败即为规划失败，不做强制修正
pub fn parse_plan(raw: &str) -> Result<Plan, AgentError> {
    let json = extract_json_block(raw);
    serde_json::from_str(json).map_err(|e| AgentError::PlanParse(format!("{}: {}", e, json)))
}

/// 写入新 Plan。重新规划时丢弃 direct_response（已有工具结果必须经过合成），空 overview 沿用上一轮。
fn apply_plan(mut state: AgentState, mut plan: Plan) -> AgentState {
    if state.is_replanning() {
        if plan.has_direct_response() {
            tracing::debug!("discarding direct_response produced while re-planning");
            plan.direct_response.clear();
        }
        if plan.overview.is_empty() {
            plan.overview = state.plan.overview.clone();
        }
    }
    state.remaining_tasks = plan.tasks.clone();
    state.plan = plan;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutedTask, Task};
    use crate::llm::{LlmError, MockLlmClient};
    use crate::nodes::TurnItem;
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn planner(mock: Arc<MockLlmClient>) -> Planner {
        Planner::new(mock, &ToolRegistry::new())
    }

    fn turn(input: &str) -> AgentState {
        let mut state = AgentState::with_history(vec![Message::user("earlier"), Message::assistant("reply")]);
        state.begin_turn(input);
        state
    }

    #[test]
    fn test_build_messages_layout() {
        let p = planner(Arc::new(MockLlmClient::new()));
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let messages = p.build_messages(&turn("weather in Seoul?"), now);

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, PLANNER_SYSTEM_PROMPT);
        assert!(messages[1]
            .content
            .contains("<current-datetime>2026-01-02T03:04:05Z</current-datetime>"));
        assert!(messages[1].content.contains("Query: weather in Seoul?"));
        assert!(messages[1].content.contains("(no tools available)"));
        // 历史 2 条 + 本轮输入 1 条，不重复追加
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[4], Message::user("weather in Seoul?"));
    }

    #[test]
    fn test_build_messages_appends_input_missing_from_history() {
        let p = planner(Arc::new(MockLlmClient::new()));
        let state = AgentState {
            input: "bare".into(),
            ..AgentState::default()
        };
        let messages = p.build_messages(&state, Utc::now());
        assert_eq!(messages.last().unwrap(), &Message::user("bare"));
    }

    #[tokio::test]
    async fn test_blocking_plan_sets_remaining_tasks() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_json(json!({
            "requires_tool": true,
            "overview": "search",
            "tasks": [
                {"title": "one", "tool_name": "search", "tool_args": {"queries": ["1"]}},
                {"title": "two", "tool_name": "search", "tool_args": {"queries": ["2"]}}
            ]
        }));
        let state = planner(mock.clone())
            .plan(turn("q"), &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(state.plan.tasks.len(), 2);
        assert_eq!(state.remaining_tasks, state.plan.tasks);
        let request = &mock.requests()[0];
        assert!(request.structured && !request.streaming);
    }

    #[tokio::test]
    async fn test_streaming_emits_tokens_before_plan_complete() {
        let mock = Arc::new(MockLlmClient::new().with_chunk_chars(5));
        mock.push_json(json!({"requires_tool": false, "direct_response": "Hello! How can I help?"}));
        let (tx, mut rx) = mpsc::channel::<TurnItem>(256);
        let state = planner(mock)
            .plan(turn("Hi"), &EventSink::new(tx))
            .await
            .unwrap();

        let mut tokens = String::new();
        let mut kinds = Vec::new();
        while let Ok(item) = rx.try_recv() {
            let event = item.unwrap();
            kinds.push(event.kind());
            if let TurnEvent::PlanToken { token } = event {
                tokens.push_str(&token);
            }
        }
        assert_eq!(kinds.last(), Some(&"plan_complete"));
        assert!(kinds[..kinds.len() - 1].iter().all(|k| *k == "plan_token"));
        assert_eq!(parse_plan(&tokens).unwrap(), state.plan);
    }

    #[tokio::test]
    async fn test_malformed_output_is_plan_parse_error() {
        let mock = Arc::new(MockLlmClient::scripted([r#"{"requires_tool": "maybe"}"#]));
        let err = planner(mock)
            .plan(turn("q"), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::PlanParse(_)));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure(LlmError::Request("503".into()));
        let err = planner(mock)
            .plan(turn("q"), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Planning(LlmError::Request(_))));
    }

    #[tokio::test]
    async fn test_replanning_includes_progress_and_drops_direct_response() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_json(json!({"requires_tool": false, "direct_response": "made up"}));
        let mut state = turn("q");
        state.plan = Plan::with_tasks("original overview", vec![]);
        let failed = Task::new("Find X", "search", json!({"queries": ["X"]}));
        state
            .executed_tasks
            .push(ExecutedTask::failed(failed.clone(), "Tool execution failed: 503"));
        state.remaining_tasks = vec![failed];

        let state = planner(mock.clone())
            .plan(state, &EventSink::disabled())
            .await
            .unwrap();
        assert!(state.plan.direct_response.is_empty());
        assert_eq!(state.plan.overview, "original overview");

        let instruction = &mock.requests()[0].messages[1].content;
        assert!(instruction.contains("1. [Failed] Find X (tool: search) - Error: Tool execution failed: 503"));
        assert!(instruction.contains("Pending tasks:"));
    }
}
