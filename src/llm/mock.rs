//! Mock LLM 客户端（用于测试与离线模式，无需 API）
//!
//! 按顺序消费预设回复；脚本耗尽后回显最后一条 User 消息（结构化请求则返回直接回复型 Plan）。
//! 所有请求都会被记录，便于测试断言 prompt 内容与调用次数。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, OutputSchema, TokenStream};
use crate::memory::{Message, Role};

/// 预设回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 文本（结构化请求时即 JSON 文本）
    Text(String),
    /// 模拟调用失败
    Fail(LlmError),
}

/// Mock 请求记录
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub messages: Vec<Message>,
    pub structured: bool,
    pub streaming: bool,
}

/// Mock 客户端：脚本化回复 + 回显兜底
#[derive(Debug)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<MockRequest>>,
    chunk_chars: usize,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            chunk_chars: 4,
        }
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以文本回复序列构造
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for reply in replies {
            mock.push_text(reply);
        }
        mock
    }

    /// 流式输出时每段字符数
    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn push_text(&self, reply: impl Into<String>) {
        self.push(MockReply::Text(reply.into()));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(MockReply::Text(value.to_string()));
    }

    pub fn push_failure(&self, error: LlmError) {
        self.push(MockReply::Fail(error));
    }

    fn push(&self, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// 已收到的请求
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_reply(
        &self,
        messages: &[Message],
        structured: bool,
        streaming: bool,
    ) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(MockRequest {
                messages: messages.to_vec(),
                structured,
                streaming,
            });
        }
        let scripted = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match scripted {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(err)) => Err(err),
            None => Ok(echo_reply(messages, structured)),
        }
    }

    fn chunked(&self, content: String) -> TokenStream {
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<Result<String, LlmError>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        Box::pin(stream::iter(chunks))
    }
}

fn echo_reply(messages: &[Message], structured: bool) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)");
    let text = format!("Echo from Mock: {}", last_user);
    if structured {
        serde_json::json!({ "requires_tool": false, "direct_response": text }).to_string()
    } else {
        text
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.next_reply(messages, false, false)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let content = self.next_reply(messages, false, true)?;
        Ok(self.chunked(content))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<String, LlmError> {
        self.next_reply(messages, true, false)
    }

    async fn complete_structured_stream(
        &self,
        messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<TokenStream, LlmError> {
        let content = self.next_reply(messages, true, true)?;
        Ok(self.chunked(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_scripted_replies_in_order_then_echo() {
        let mock = MockLlmClient::scripted(["first", "second"]);
        let msgs = vec![Message::user("ping")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "second");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: ping");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_chunks_concatenate() {
        let mock = MockLlmClient::scripted(["abcdefghij"]).with_chunk_chars(3);
        let chunks: Vec<String> = mock
            .complete_stream(&[Message::user("x")])
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["abc", "def", "ghi", "j"]);
    }

    #[tokio::test]
    async fn test_failure_reply() {
        let mock = MockLlmClient::new();
        mock.push_failure(LlmError::Request("down".into()));
        assert!(mock.complete(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_structured_echo_is_direct_plan() {
        let mock = MockLlmClient::new();
        let schema = OutputSchema {
            name: "plan".into(),
            description: String::new(),
            schema: serde_json::Value::Null,
        };
        let out = mock
            .complete_structured(&[Message::user("Hi")], &schema)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["requires_tool"], false);
        assert_eq!(value["direct_response"], "Echo from Mock: Hi");
        assert!(mock.requests()[0].structured);
    }
}
