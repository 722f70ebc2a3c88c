//! Responder：生成本轮最终回复
//!
//! - plan 带 direct_response：原样输出，不调用模型（流式模式按 100 字符切片推送）
//! - 否则：把已执行任务整理成合成上下文（附去重编号的引用 URL），经流式接口调用模型并逐 token 转发
//!
//! 完成后写入 state.response，并向 message_history 追加一条 assistant 消息。

use std::sync::Arc;

use futures_util::StreamExt;

use crate::core::{AgentError, AgentState};
use crate::llm::LlmClient;
use crate::memory::{dialogue_turns, Message, Role};
use crate::nodes::{EventSink, TurnEvent};
use crate::tools::ToolResult;

pub const RESPONDER_SYSTEM_PROMPT: &str = r#"You are an AI research assistant. Generate a comprehensive response based on the following cases:

1. For direct responses (no tools used):
   - Use the provided direct_response as is
   - Maintain the original tone and content

2. For tool-based responses:
   - Synthesize information from all executed tasks
   - Provide clear, well-structured answers
   - Include relevant details from each task result
   - Maintain a natural, conversational tone

Ensure responses are clear, concise, and directly address the original query."#;

/// 直接回复的切片长度（字符）
const DIRECT_CHUNK_CHARS: usize = 100;

/// 合成上下文：任务结果文本 + 引用列表（`[n] url`）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisContext {
    pub context: String,
    pub citations: Vec<String>,
}

pub struct Responder {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    chunk_chars: usize,
}

impl Responder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: RESPONDER_SYSTEM_PROMPT.to_string(),
            chunk_chars: DIRECT_CHUNK_CHARS,
        }
    }

    /// 覆盖 system 指令（[llm.responder] system_prompt）
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub async fn respond(&self, mut state: AgentState, events: &EventSink) -> Result<AgentState, AgentError> {
        let response = if state.plan.has_direct_response() {
            tracing::info!("emitting direct response");
            let text = state.plan.direct_response.clone();
            for chunk in chunk_chars(&text, self.chunk_chars) {
                events.emit(TurnEvent::ResponseToken { token: chunk }).await?;
            }
            text
        } else {
            tracing::info!(executed = state.executed_tasks.len(), "synthesizing response");
            self.synthesize(&state, events).await?
        };

        state.message_history.push(Message::assistant(response.clone()));
        state.response = response;
        Ok(state)
    }

    async fn synthesize(&self, state: &AgentState, events: &EventSink) -> Result<String, AgentError> {
        let messages = self.build_messages(state);
        let mut stream = self
            .llm
            .complete_stream(&messages)
            .await
            .map_err(AgentError::Synthesis)?;
        let mut response = String::new();
        while let Some(token) = stream.next().await {
            let token = token.map_err(AgentError::Synthesis)?;
            if token.is_empty() {
                continue;
            }
            response.push_str(&token);
            events.emit(TurnEvent::ResponseToken { token }).await?;
        }
        Ok(response)
    }

    /// system 指令 + 合成指令 + 对话历史
    pub fn build_messages(&self, state: &AgentState) -> Vec<Message> {
        let synthesis = build_context(state);
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(instruction(&state.input, &synthesis)),
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
}

fn instruction(query: &str, synthesis: &SynthesisContext) -> String {
    let citations = if synthesis.citations.is_empty() {
        "(none)".to_string()
    } else {
        synthesis.citations.join("\n")
    };
    format!(
        "Generate a comprehensive response based on the search results.\n\n\
         Here is the user query:\n{query}\n\n\
         Here are the search results to use:\n{context}\n\n\
         Here are the source URLs to cite in [#] format:\n{citations}\n\n\
         Guidelines for your response:\n\
         1. Analyze and summarize key points from the tool results\n\
         2. Generate a clear and informative response that addresses the user's query, \
         uses a natural conversational tone and includes inline citations [#] when referencing sources\n\
         3. Only include information from the provided search results\n\
         4. Cite sources immediately after referenced information\n\
         5. Use markdown formatting for lists and emphasis if needed\n\
         6. Respond in the same language as the query\n\
         7. If some tasks failed, say which information could not be gathered\n\
         Please generate a comprehensive response based on the above information.",
        query = query,
        context = synthesis.context,
        citations = citations,
    )
}

/// 整理已执行任务：成功任务给出文本摘要，失败任务给出错误；Search 结果的 URL 按首次出现去重编号
pub fn build_context(state: &AgentState) -> SynthesisContext {
    let mut parts = vec![format!(
        "Plan overview: {}\n\nExecuted tasks and their results:",
        state.plan.overview
    )];
    let mut urls: Vec<&str> = Vec::new();

    for executed in &state.executed_tasks {
        parts.push(format!("Task: {}", executed.task.title));
        if !executed.success {
            parts.push("Status: Failed".to_string());
            parts.push(format!("Error: {}", executed.result));
            continue;
        }
        parts.push("Status: Success".to_string());
        match &executed.result {
            ToolResult::Search(bundle) => {
                for url in bundle.urls() {
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
                parts.push(bundle.llm_text.clone());
            }
            other => parts.push(other.to_string()),
        }
    }

    SynthesisContext {
        context: parts.join("\n"),
        citations: urls
            .iter()
            .enumerate()
            .map(|(i, url)| format!("[{}] {}", i + 1, url))
            .collect(),
    }
}

/// 按字符切片（不截断多字节字符）
fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}
