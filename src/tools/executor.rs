//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时，execute(tool_name, args) 在超时内调用 registry.invoke；
//! 超时转为 ToolTimeout，每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolRegistry, ToolResult};

/// 工具执行器：对每次调用施加超时并记录审计日志
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具；工具名为空或未注册时返回 ToolNotFound（不计入超时）
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<ToolResult, AgentError> {
        if tool_name.trim().is_empty() {
            return Err(AgentError::ToolNotFound("(empty tool name)".to_string()));
        }
        self.registry.resolve(tool_name)?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.invoke(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<ToolResult, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::text("late"))
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::with_timeout(Arc::new(registry), Duration::from_millis(20));
        let err = executor.execute("slow", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref t) if t == "slow"));
    }

    #[tokio::test]
    async fn test_empty_and_unknown_names() {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()), 1);
        assert!(matches!(
            executor.execute("", Value::Null).await,
            Err(AgentError::ToolNotFound(_))
        ));
        assert!(matches!(
            executor.execute("nope", Value::Null).await,
            Err(AgentError::ToolNotFound(ref n)) if n == "nope"
        ));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        assert!(args_preview(&long).ends_with("..."));
    }
}
