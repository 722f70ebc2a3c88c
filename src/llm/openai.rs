//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DeepSeek、自建代理等。
//! 结构化输出优先使用 json_schema response_format；端点不支持时可切换为 json_object + Schema 提示。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionStreamOptions, CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::traits::with_schema_instruction;
use crate::llm::{extract_json_block, LlmClient, LlmError, OutputSchema, TokenStream};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 结构化输出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructuredOutputMode {
    /// response_format = json_schema（OpenAI 等）
    #[default]
    JsonSchema,
    /// response_format = json_object，Schema 写入 system 消息（DeepSeek 等）
    JsonObject,
}

impl StructuredOutputMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json_object" | "object" => StructuredOutputMode::JsonObject,
            _ => StructuredOutputMode::JsonSchema,
        }
    }
}

/// 采样参数
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    sampling: SamplingParams,
    structured_mode: StructuredOutputMode,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            sampling: SamplingParams::default(),
            structured_mode: StructuredOutputMode::default(),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_structured_mode(mut self, mode: StructuredOutputMode) -> Self {
        self.structured_mode = mode;
        self
    }

    /// 整个请求（含流式读取）的超时
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        self.client = self.client.with_http_client(http);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let message = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                message.map_err(|e| LlmError::Request(e.to_string()))
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[Message],
        response_format: Option<ResponseFormat>,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .temperature(self.sampling.temperature)
            .max_completion_tokens(self.sampling.max_tokens);
        if let Some(format) = response_format {
            builder.response_format(format);
        }
        if stream {
            // 最后一个 chunk 携带整次请求的 usage
            builder.stream(true).stream_options(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }
        builder.build().map_err(|e| LlmError::Request(e.to_string()))
    }

    /// 结构化请求：按模式决定 response_format 与是否把 Schema 写进 prompt
    fn structured_request(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        match self.structured_mode {
            StructuredOutputMode::JsonSchema => {
                let format = ResponseFormat::JsonSchema {
                    json_schema: ResponseFormatJsonSchema {
                        description: Some(schema.description.clone()),
                        name: schema.name.clone(),
                        schema: Some(schema.schema.clone()),
                        strict: None,
                    },
                };
                self.build_request(messages, Some(format), stream)
            }
            StructuredOutputMode::JsonObject => self.build_request(
                &with_schema_instruction(messages, schema),
                Some(ResponseFormat::JsonObject),
                stream,
            ),
        }
    }

    async fn send(&self, request: CreateChatCompletionRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))
    }

    async fn send_stream(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<TokenStream, LlmError> {
        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(map_openai_error)?;

        let usage = self.usage.clone();
        let tokens = stream.filter_map(move |chunk| {
            let usage = usage.clone();
            async move {
                match chunk {
                    Ok(response) => {
                        if let Some(u) = &response.usage {
                            usage.add(u.prompt_tokens as u64, u.completion_tokens as u64);
                        }
                        response
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.clone())
                            .filter(|token| !token.is_empty())
                            .map(Ok)
                    }
                    Err(e) => Some(Err(LlmError::Stream(e.to_string()))),
                }
            }
        });
        Ok(Box::pin(tokens))
    }
}

fn map_openai_error(err: OpenAIError) -> LlmError {
    let text = err.to_string();
    if text.to_lowercase().contains("rate limit") {
        LlmError::RateLimited {
            retry_after_ms: 1000,
        }
    } else {
        LlmError::Request(text)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = self.build_request(messages, None, false)?;
        self.send(request).await
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let request = self.build_request(messages, None, true)?;
        self.send_stream(request).await
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<String, LlmError> {
        let request = self.structured_request(messages, schema, false)?;
        let output = self.send(request).await?;
        Ok(extract_json_block(&output).to_string())
    }

    async fn complete_structured_stream(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<TokenStream, LlmError> {
        let request = self.structured_request(messages, schema, true)?;
        self.send_stream(request).await
    }
}
