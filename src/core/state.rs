//! AgentState：在工作流各节点之间传递的唯一上下文
//!
//! 节点按值接收 state 并返回替换后的 state，不存在跨节点共享的可变内存。

use serde::{Deserialize, Serialize};

use crate::core::plan::{Plan, Task};
use crate::memory::Message;
use crate::tools::ToolResult;

/// 一次任务执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTask {
    pub task: Task,
    pub result: ToolResult,
    pub success: bool,
}

impl ExecutedTask {
    pub fn succeeded(task: Task, result: ToolResult) -> Self {
        Self {
            task,
            result,
            success: true,
        }
    }

    pub fn failed(task: Task, reason: impl Into<String>) -> Self {
        Self {
            task,
            result: ToolResult::error(reason),
            success: false,
        }
    }
}

/// 一轮对话的执行上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// 当前用户输入
    pub input: String,
    /// 最近一轮规划得到的 Plan
    pub plan: Plan,
    /// 本轮已执行任务（按执行顺序累积）
    pub executed_tasks: Vec<ExecutedTask>,
    /// 本轮尚未尝试的任务，失败重排的任务追加在末尾
    pub remaining_tasks: Vec<Task>,
    /// 最终回复
    pub response: String,
    /// 会话历史（user / assistant），只追加
    pub message_history: Vec<Message>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带历史的初始状态（跨轮次延续会话）
    pub fn with_history(message_history: Vec<Message>) -> Self {
        Self {
            message_history,
            ..Self::default()
        }
    }

    /// 开始新一轮：清空上一轮的计划与执行记录，并把用户输入写入历史
    pub fn begin_turn(&mut self, input: impl Into<String>) {
        let input = input.into();
        self.plan = Plan::default();
        self.executed_tasks.clear();
        self.remaining_tasks.clear();
        self.response.clear();
        self.message_history.push(Message::user(input.clone()));
        self.input = input;
    }

    /// 本轮是否已经执行过工具（用于判断当前是否为重新规划）
    pub fn is_replanning(&self) -> bool {
        !self.executed_tasks.is_empty()
    }

    /// 最近一次执行是否失败（没有执行记录时为 false）
    pub fn last_execution_failed(&self) -> bool {
        self.executed_tasks.last().map(|t| !t.success).unwrap_or(false)
    }
}
