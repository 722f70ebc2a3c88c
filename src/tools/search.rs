//! Web 搜索工具：一次任务携带多个查询词，有界并发扇出，结果按原查询顺序重组
//!
//! 搜索服务通过 SearchBackend 抽象，默认实现为 Tavily 兼容 HTTP API。
//! 返回 ToolResult::Search：结构化命中列表 + 供 LLM 阅读的文本摘要（llm_text）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{SearchBundle, SearchHit, Tool, ToolResult};

/// 搜索参数格式（仅用于 Schema 生成；解析时也接受单个字符串）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct SearchInput {
    /// A list of query strings for web search. Each query must be in English and
    /// specific enough to yield relevant results; prefer clear questions or keyword combinations.
    queries: Vec<String>,
}

/// 搜索服务抽象：单个查询词 -> 命中列表
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String>;
}

/// Tavily 兼容搜索后端
pub struct TavilyBackend {
    client: Client,
    base_url: String,
    api_key: String,
    max_results: usize,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Default, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TavilyHit {
    title: String,
    url: String,
    content: String,
    score: f64,
    published_date: Option<String>,
}

impl TavilyResponse {
    fn into_hits(self, query: &str) -> Vec<SearchHit> {
        self.results
            .into_iter()
            .map(|hit| SearchHit {
                query: query.to_string(),
                title: hit.title,
                content: hit.content,
                url: hit.url,
                score: hit.score,
                published_date: hit.published_date.unwrap_or_default(),
            })
            .collect()
    }
}

impl TavilyBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        max_results: usize,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest {
                query,
                max_results: self.max_results,
            })
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        Ok(body.into_hits(query))
    }
}

/// Web 搜索工具
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    max_concurrency: usize,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>, max_concurrency: usize) -> Self {
        Self {
            backend,
            max_concurrency: max_concurrency.max(1),
        }
    }
}

/// 解析查询词：支持 {"queries": [...]}、{"queries": "..."} 与 {"query": "..."}
fn parse_queries(args: &Value) -> Result<Vec<String>, String> {
    let raw = args.get("queries").or_else(|| args.get("query"));
    let queries: Vec<String> = match raw {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    let queries: Vec<String> = queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if queries.is_empty() {
        return Err("Missing queries".to_string());
    }
    Ok(queries)
}

/// 单个查询的 LLM 文本摘要
fn format_digest(query: &str, hits: &[SearchHit]) -> String {
    let mut parts = vec![format!("Results for: {}", query)];
    for hit in hits {
        parts.push(format!("title: {}", hit.title));
        parts.push(format!("description: {}", hit.content));
        parts.push(format!("url: {}", hit.url));
        parts.push(String::new());
    }
    parts.join("\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information. Accepts several English queries at once; \
         returns titles, snippets and source URLs for each query."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(SearchInput)).unwrap_or(Value::Null)
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let queries = parse_queries(&args)?;
        tracing::info!(queries = ?queries, concurrency = self.max_concurrency, "web_search fan-out");

        let backend = self.backend.as_ref();
        // buffered 保持输入顺序，同时最多 max_concurrency 个查询在途
        let per_query: Vec<Result<(Vec<SearchHit>, String), String>> = stream::iter(queries)
            .map(|query| async move {
                let hits = backend
                    .search(&query)
                    .await
                    .map_err(|e| format!("search '{}' failed: {}", query, e))?;
                let digest = format_digest(&query, &hits);
                Ok::<_, String>((hits, digest))
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut results = Vec::new();
        let mut digests = Vec::new();
        for item in per_query {
            let (hits, digest) = item?;
            results.extend(hits);
            digests.push(digest);
        }

        Ok(ToolResult::Search(SearchBundle {
            results,
            llm_text: digests.join("\n\n"),
        }))
    }
}
