//! LLM 客户端抽象
//!
//! 所有后端实现 LlmClient：complete（非流式）、complete_stream（流式 Token）、
//! complete_structured / complete_structured_stream（按 JSON Schema 约束的结构化输出）。
//! 不支持原生结构化输出的后端使用默认实现：把 Schema 写进 system 消息，再从回复中提取 JSON。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use schemars::{schema_for, JsonSchema};
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误，原样向上传递
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// 按生成顺序产出的 Token 流
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// 结构化输出约束：名称、描述与 JSON Schema
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl OutputSchema {
    /// 由 schemars 为类型 T 生成 Schema
    pub fn for_type<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    /// 写入 system 消息的格式约束（用于没有原生结构化输出的后端）
    pub fn prompt_instruction(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            "Respond with a single JSON object named `{}` ({}). \
             Output only the JSON object, no Markdown and no extra text. \
             It must validate against this JSON Schema:\n{}",
            self.name, self.description, schema
        )
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError>;

    /// 结构化完成：返回符合 schema 的 JSON 文本
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<String, LlmError> {
        let output = self.complete(&with_schema_instruction(messages, schema)).await?;
        Ok(extract_json_block(&output).to_string())
    }

    /// 结构化流式完成：按生成顺序产出 JSON 片段，拼接后即完整 JSON
    async fn complete_structured_stream(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<TokenStream, LlmError> {
        let content = self.complete_structured(messages, schema).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 在首条 system 消息后追加格式约束；没有 system 消息时插到最前
pub fn with_schema_instruction(messages: &[Message], schema: &OutputSchema) -> Vec<Message> {
    let instruction = schema.prompt_instruction();
    let mut out = messages.to_vec();
    match out
        .iter_mut()
        .find(|m| m.role == crate::memory::Role::System)
    {
        Some(system) => {
            system.content = format!("{}\n\n{}", system.content, instruction);
        }
        None => out.insert(0, Message::system(instruction)),
    }
    out
}

/// 从 LLM 文本中提取 JSON：```json 代码块、或首个 '{' 到最后一个 '}'；找不到时返回去空白的原文
pub fn extract_json_block(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Probe {
        /// probe field
        field: String,
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nbye";
        assert_eq!(extract_json_block(text), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_surrounding_text() {
        assert_eq!(extract_json_block("plan: {\"a\": {\"b\": 2}} ok"), "{\"a\": {\"b\": 2}}");
        assert_eq!(extract_json_block("  no json  "), "no json");
    }

    #[test]
    fn test_schema_for_type_contains_properties() {
        let schema = OutputSchema::for_type::<Probe>("probe", "a probe");
        assert!(schema.schema["properties"]["field"].is_object());
        assert!(schema.prompt_instruction().contains("probe"));
    }

    #[test]
    fn test_schema_instruction_appends_to_system() {
        let schema = OutputSchema::for_type::<Probe>("probe", "a probe");
        let messages = vec![Message::system("base"), Message::user("hi")];
        let out = with_schema_instruction(&messages, &schema);
        assert_eq!(out.len(), 2);
        assert!(out[0].content.starts_with("base"));
        assert!(out[0].content.contains("JSON Schema"));

        let out = with_schema_instruction(&messages[1..], &schema);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, crate::memory::Role::System);
    }
}
