//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SEEKER__*` 覆盖（双下划线表示嵌套，如 `SEEKER__LLM__MODEL=gpt-4o`）。
//! API Key 未在配置中给出时回退到 `OPENAI_API_KEY` / `TAVILY_API_KEY`。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、每轮规划上限、事件通道容量
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_max_planner_rounds")]
    pub max_planner_rounds: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_planner_rounds: default_max_planner_rounds(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_max_planner_rounds() -> usize {
    5
}

fn default_event_buffer() -> usize {
    64
}

/// [llm] 段：后端、模型、采样参数、超时与结构化输出模式
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（任意 OpenAI 兼容端点）/ mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// json_schema / json_object
    #[serde(default = "default_structured_output")]
    pub structured_output: String,
    #[serde(default)]
    pub planner: RoleModelSection,
    #[serde(default)]
    pub responder: RoleModelSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            structured_output: default_structured_output(),
            planner: RoleModelSection::default(),
            responder: RoleModelSection::default(),
        }
    }
}

impl LlmSection {
    /// 配置中的 key，缺省时读 OPENAI_API_KEY；空串视为未设置
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok()))
    }

    pub fn planner_model(&self) -> &str {
        self.planner.model.as_deref().unwrap_or(&self.model)
    }

    pub fn responder_model(&self) -> &str {
        self.responder.model.as_deref().unwrap_or(&self.model)
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_structured_output() -> String {
    "json_schema".to_string()
}

/// [llm.planner] / [llm.responder]：按角色覆盖模型与 system 指令
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleModelSection {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

impl RoleModelSection {
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// [tools] 段：工具超时与搜索后端
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search: SearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.search] 段：Tavily 兼容搜索后端
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    /// 每个查询最多返回条数
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// 同一任务内并发查询数
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: default_search_base_url(),
            max_results: default_max_results(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

impl SearchSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var("TAVILY_API_KEY").ok()))
    }
}

fn default_true() -> bool {
    true
}

fn default_search_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_max_concurrency() -> usize {
    3
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 从 config 目录加载配置，环境变量 SEEKER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SEEKER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SEEKER")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
