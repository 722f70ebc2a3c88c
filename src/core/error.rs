//! Agent 错误类型
//!
//! 规划 / 合成阶段的错误对整轮对话是致命的；工具相关错误只影响单个任务，由 Executor 记录后继续。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// Planner 调用 LLM 失败（原样携带 LlmError）
    #[error("Planning failed: {0}")]
    Planning(#[source] LlmError),

    /// 结构化输出无法解析为 Plan
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    /// Responder 合成回复失败
    #[error("Response synthesis failed: {0}")]
    Synthesis(#[source] LlmError),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 规划轮数超过上限（工具持续失败时防止 planner ⇄ executor 死循环）
    #[error("Max replanning attempts exceeded ({0} planner rounds)")]
    MaxPlannerRounds(usize),

    /// 事件流的消费端已关闭，生产端停止输出
    #[error("Turn cancelled: event stream closed")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 仅影响单个任务、不会中止整轮对话的错误
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound(_)
                | AgentError::ToolExecutionFailed(_)
                | AgentError::ToolTimeout(_)
        )
    }

    /// 失败任务是否值得放回队列：工具名无法解析时重试也不会成功
    pub fn is_retryable_task_failure(&self) -> bool {
        matches!(
            self,
            AgentError::ToolExecutionFailed(_) | AgentError::ToolTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_local_classification() {
        assert!(AgentError::ToolNotFound("x".into()).is_task_local());
        assert!(AgentError::ToolTimeout("search".into()).is_task_local());
        assert!(!AgentError::MaxPlannerRounds(5).is_task_local());
        assert!(!AgentError::Synthesis(LlmError::Request("boom".into())).is_task_local());
    }

    #[test]
    fn test_unknown_tool_is_not_retryable() {
        assert!(!AgentError::ToolNotFound("x".into()).is_retryable_task_failure());
        assert!(AgentError::ToolExecutionFailed("503".into()).is_retryable_task_failure());
    }

    #[test]
    fn test_planning_error_keeps_llm_message() {
        let err = AgentError::Planning(LlmError::RateLimited { retry_after_ms: 500 });
        assert!(err.to_string().contains("500"));
    }
}
