//! 工具结果：带标签的联合类型
//!
//! Responder 按标签分派：Search 结果可提取引用 URL，Text 原样放入上下文，Error 记录失败原因。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 单条搜索命中
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    /// 产生该结果的查询词
    pub query: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub score: f64,
    pub published_date: String,
}

/// 搜索结果包：结构化命中列表 + 预先格式化的 LLM 文本摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchBundle {
    pub results: Vec<SearchHit>,
    pub llm_text: String,
}

impl SearchBundle {
    /// 命中中非空的 URL，按出现顺序（未去重）
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .map(|hit| hit.url.trim())
            .filter(|url| !url.is_empty())
    }
}

/// 工具调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResult {
    /// 结构化搜索结果
    Search(SearchBundle),
    /// 普通文本结果
    Text { text: String },
    /// 失败原因（仅由 Executor 在记录失败任务时构造）
    Error { message: String },
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        ToolResult::Text { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
        }
    }

    /// 截断后的预览，用于事件与日志
    pub fn preview(&self, max_chars: usize) -> String {
        let full = self.to_string();
        if full.chars().count() > max_chars {
            format!("{}...", full.chars().take(max_chars).collect::<String>())
        } else {
            full
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolResult::Search(bundle) => write!(f, "{}", bundle.llm_text),
            ToolResult::Text { text } => write!(f, "{}", text),
            ToolResult::Error { message } => write!(f, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_urls_skip_empty() {
        let bundle = SearchBundle {
            results: vec![
                SearchHit {
                    url: "http://a".into(),
                    ..SearchHit::default()
                },
                SearchHit::default(),
                SearchHit {
                    url: " http://b ".into(),
                    ..SearchHit::default()
                },
            ],
            llm_text: String::new(),
        };
        assert_eq!(bundle.urls().collect::<Vec<_>>(), vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let result = ToolResult::text("日本語のテキスト");
        assert_eq!(result.preview(3), "日本語...");
        assert_eq!(result.preview(100), "日本語のテキスト");
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(ToolResult::error("boom")).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "boom");
    }
}
