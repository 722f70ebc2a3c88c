//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与解析。
//! 注册表构建完成后只读，以 Arc 在各轮对话间共享；本层不加超时，超时由 ToolExecutor 负责。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::ToolResult;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（Task.tool_name 引用该名称）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；失败时返回原因文本
    async fn execute(&self, args: Value) -> Result<ToolResult, String>;
}

/// 工具注册表：保持注册顺序，按名称索引
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具原位替换
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => {
                tracing::warn!(tool = %name, "tool re-registered, replacing previous entry");
                self.tools[slot] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// 按名称解析工具
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.index
            .get(name)
            .map(|&slot| self.tools[slot].clone())
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// 解析并调用；工具返回的失败原因转为 ToolExecutionFailed
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolResult, AgentError> {
        let tool = self.resolve(name)?;
        tool.execute(args)
            .await
            .map_err(AgentError::ToolExecutionFailed)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 供 Planner prompt 使用的工具目录：每个工具一行描述 + 参数 schema
    pub fn catalog(&self) -> String {
        if self.tools.is_empty() {
            return "(no tools available)".to_string();
        }
        self.tools
            .iter()
            .map(|tool| {
                format!(
                    "- {}: {}\n  Args schema: {}",
                    tool.name(),
                    tool.description(),
                    tool.parameters_schema()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
