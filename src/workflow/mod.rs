//! 工作流：状态机路由 + 驱动引擎

pub mod engine;
pub mod graph;

pub use engine::{TurnStream, WorkflowEngine};
pub use graph::{check_execution_needed, check_next_step, next_node, Node, Route};
