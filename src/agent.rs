//! Agent 装配
//!
//! 从 AppConfig 构建 LLM 客户端（planner / responder 可用不同模型）、工具注册表与工作流引擎；
//! process_message 供无界面调用方对单条输入跑完整一轮。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, AgentState};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, SamplingParams, StructuredOutputMode};
use crate::nodes::{Executor, Planner, Responder};
use crate::tools::{TavilyBackend, ToolExecutor, ToolRegistry, WebSearchTool};
use crate::workflow::WorkflowEngine;

/// 预构建的 Agent 组件，可多会话共享
pub struct AgentComponents {
    pub engine: WorkflowEngine,
    pub tool_names: Vec<String>,
    /// 是否运行在 Mock LLM 上（无 API Key）
    pub mock_mode: bool,
    /// 引擎使用的客户端（共享时只出现一次），用于汇总 token 统计
    llms: Vec<Arc<dyn LlmClient>>,
}

impl AgentComponents {
    /// 累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llms.iter().fold((0, 0, 0), |acc, llm| {
            let (p, c, t) = llm.token_usage();
            (acc.0 + p, acc.1 + c, acc.2 + t)
        })
    }
}

/// 按配置创建 LLM；provider = mock 或没有 API Key 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match cfg.llm.resolved_api_key() {
        Some(key) if provider != "mock" => {
            tracing::info!(model, "Using OpenAI-compatible LLM");
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), model, Some(&key))
                    .with_sampling(SamplingParams {
                        temperature: cfg.llm.temperature,
                        max_tokens: cfg.llm.max_tokens,
                    })
                    .with_structured_mode(StructuredOutputMode::parse(&cfg.llm.structured_output))
                    .with_timeout(cfg.llm.timeout_secs),
            )
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

fn is_mock(cfg: &AppConfig) -> bool {
    cfg.llm.provider.eq_ignore_ascii_case("mock") || cfg.llm.resolved_api_key().is_none()
}

/// 工具注册表：web_search 需启用且有 Key
pub fn create_tool_registry(cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    let search = &cfg.tools.search;
    if !search.enabled {
        tracing::info!("web_search disabled by config");
    } else if let Some(key) = search.resolved_api_key() {
        let backend = TavilyBackend::new(
            search.base_url.clone(),
            key,
            search.max_results,
            search.timeout_secs,
        );
        tools.register(WebSearchTool::new(Arc::new(backend), search.max_concurrency));
    } else {
        tracing::warn!("TAVILY_API_KEY not set, web_search unavailable");
    }
    tools
}

/// 用给定 LLM 与工具组装引擎（测试与嵌入场景可直接注入）
pub fn build_engine(
    cfg: &AppConfig,
    planner_llm: Arc<dyn LlmClient>,
    responder_llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
) -> WorkflowEngine {
    let mut planner = Planner::new(planner_llm, &tools);
    if let Some(prompt) = cfg.llm.planner.system_prompt() {
        planner = planner.with_system_prompt(prompt);
    }
    let mut responder = Responder::new(responder_llm);
    if let Some(prompt) = cfg.llm.responder.system_prompt() {
        responder = responder.with_system_prompt(prompt);
    }
    let executor = Executor::new(Arc::new(ToolExecutor::new(
        Arc::new(tools),
        cfg.tools.tool_timeout_secs,
    )));
    WorkflowEngine::new(planner, executor, responder)
        .with_max_planner_rounds(cfg.app.max_planner_rounds)
        .with_event_buffer(cfg.app.event_buffer)
}

/// 从配置创建全部组件
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    if cfg.tools.search.enabled && cfg.tools.search.max_concurrency == 0 {
        return Err(AgentError::ConfigError(
            "tools.search.max_concurrency must be at least 1".to_string(),
        ));
    }
    let mock_mode = is_mock(cfg);
    let (planner_llm, responder_llm) = if mock_mode {
        let mock: Arc<dyn LlmClient> = create_llm_from_config(cfg, &cfg.llm.model);
        (mock.clone(), mock)
    } else {
        (
            create_llm_from_config(cfg, cfg.llm.planner_model()),
            create_llm_from_config(cfg, cfg.llm.responder_model()),
        )
    };
    let mut llms = vec![planner_llm.clone()];
    if !mock_mode {
        llms.push(responder_llm.clone());
    }

    let tools = create_tool_registry(cfg);
    let tool_names = tools.tool_names();
    tracing::info!(tools = ?tool_names, mock_mode, "agent components ready");

    Ok(AgentComponents {
        engine: build_engine(cfg, planner_llm, responder_llm, tools),
        tool_names,
        mock_mode,
        llms,
    })
}

/// 处理单条用户消息（阻塞模式），返回更新后的会话 state
pub async fn process_message(
    components: &AgentComponents,
    state: AgentState,
    user_input: &str,
) -> Result<AgentState, AgentError> {
    components.engine.run_turn(state, user_input).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.tools.search.enabled = false;
        cfg
    }

    #[tokio::test]
    async fn test_mock_components_answer_offline() {
        let components = create_agent_components(&mock_config()).unwrap();
        assert!(components.mock_mode);
        assert!(components.tool_names.is_empty());

        let state = process_message(&components, AgentState::new(), "ping").await.unwrap();
        assert_eq!(state.response, "Echo from Mock: ping");
        let state = process_message(&components, state, "again").await.unwrap();
        assert_eq!(state.message_history.len(), 4);
        // Mock 不计 token，且共享客户端只汇总一次
        assert_eq!(components.llms.len(), 1);
        assert_eq!(components.token_usage(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_role_prompts_from_config() {
        let mut cfg = mock_config();
        cfg.llm.planner.system_prompt = Some("Plan tersely.".into());
        let mock = Arc::new(MockLlmClient::new());
        let engine = build_engine(&cfg, mock.clone(), mock.clone(), ToolRegistry::new());

        engine.run_turn(AgentState::new(), "hi").await.unwrap();
        let request = &mock.requests()[0];
        assert_eq!(request.messages[0].content, "Plan tersely.");
    }

    #[test]
    fn test_search_registered_with_key() {
        let mut cfg = mock_config();
        cfg.tools.search.enabled = true;
        cfg.tools.search.api_key = Some("tvly-test".into());
        assert_eq!(create_tool_registry(&cfg).tool_names(), vec!["web_search"]);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut cfg = mock_config();
        cfg.tools.search.enabled = true;
        cfg.tools.search.max_concurrency = 0;
        assert!(matches!(
            create_agent_components(&cfg),
            Err(AgentError::ConfigError(_))
        ));
    }
}
