//! 工作流状态机
//!
//! Planner → (Executor → Planner)* → Responder → End。路由函数只读 state，不产生副作用。

use crate::core::AgentState;

/// 工作流节点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Planner,
    Executor,
    Responder,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Planner => "planner",
            Node::Executor => "executor",
            Node::Responder => "responder",
            Node::End => "end",
        }
    }
}

/// 条件边的取值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Execute,
    Plan,
    Respond,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Execute => "execute",
            Route::Plan => "plan",
            Route::Respond => "respond",
        }
    }

    /// 边指向的节点
    pub fn target(&self) -> Node {
        match self {
            Route::Execute => Node::Executor,
            Route::Plan => Node::Planner,
            Route::Respond => Node::Responder,
        }
    }
}

/// Planner 之后：需要工具且有任务时执行，否则直接回复
pub fn check_execution_needed(state: &AgentState) -> Route {
    if state.plan.requires_tool && !state.plan.tasks.is_empty() {
        Route::Execute
    } else {
        Route::Respond
    }
}

/// Executor 之后：还有剩余任务（含重排的失败任务）则重新规划，否则回复
pub fn check_next_step(state: &AgentState) -> Route {
    if state.remaining_tasks.is_empty() {
        Route::Respond
    } else {
        Route::Plan
    }
}

/// 给定当前节点与 state，求下一个节点
pub fn next_node(current: Node, state: &AgentState) -> Node {
    match current {
        Node::Planner => check_execution_needed(state).target(),
        Node::Executor => check_next_step(state).target(),
        Node::Responder | Node::End => Node::End,
    }
}
