//! 任务与计划：Planner 的结构化输出
//!
//! Plan 要么是直接回复（requires_tool = false），要么是按优先级排好序的工具任务列表。
//! 字段名为 snake_case，同时兼容 camelCase 别名（toolName / requiresTool 等）。

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单个原子任务：一次工具调用及其参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Task {
    /// The title of the task
    pub title: String,
    /// The name of the tool to use for this task (must be one of the available tools)
    #[serde(alias = "toolName")]
    pub tool_name: String,
    /// The arguments to be passed to the tool, matching the tool's argument schema
    #[serde(alias = "toolArgs")]
    pub tool_args: Map<String, Value>,
    /// The detailed description of what needs to be done
    pub description: String,
}

impl Task {
    pub fn new(title: impl Into<String>, tool_name: impl Into<String>, tool_args: Value) -> Self {
        let tool_args = match tool_args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            title: title.into(),
            tool_name: tool_name.into(),
            tool_args,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 工具参数作为 JSON 对象
    pub fn args_value(&self) -> Value {
        Value::Object(self.tool_args.clone())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.title.is_empty() {
            parts.push(self.title.clone());
        }
        if !self.tool_name.is_empty() {
            parts.push(format!("[Tool: {}]", self.tool_name));
            parts.push(format!("[Args: {}]", self.args_value()));
        }
        if !self.description.is_empty() {
            parts.push(format!("[{}]", self.description));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Plan consists of tasks to complete a given query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Plan {
    /// Whether the plan requires a tool to execute
    #[serde(alias = "requiresTool")]
    pub requires_tool: bool,
    /// Direct response if no tool is required
    #[serde(alias = "directResponse")]
    pub direct_response: String,
    /// Brief overview of the plan
    pub overview: String,
    /// List of tasks to execute, in priority order
    pub tasks: Vec<Task>,
}

impl Plan {
    /// 直接回复型 Plan
    pub fn direct(response: impl Into<String>) -> Self {
        Self {
            requires_tool: false,
            direct_response: response.into(),
            ..Self::default()
        }
    }

    /// 工具型 Plan
    pub fn with_tasks(overview: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            requires_tool: true,
            direct_response: String::new(),
            overview: overview.into(),
            tasks,
        }
    }

    pub fn has_direct_response(&self) -> bool {
        !self.direct_response.is_empty()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requires Tool: {}", self.requires_tool)?;
        if !self.direct_response.is_empty() {
            writeln!(f, "Direct Response: {}", self.direct_response)?;
        }
        if !self.overview.is_empty() {
            writeln!(f, "Overview: {}", self.overview)?;
        }
        if !self.tasks.is_empty() {
            writeln!(f, "Tasks:")?;
        }
        for (i, task) in self.tasks.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, task.title)?;
            if !task.tool_name.is_empty() {
                writeln!(f, "   Tool: {}", task.tool_name)?;
                writeln!(f, "   Args: {}", task.args_value())?;
            }
            if !task.description.is_empty() {
                writeln!(f, "   Description: {}", task.description)?;
            }
        }
        Ok(())
    }
}
