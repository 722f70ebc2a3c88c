//! Seeker - 规划 / 执行 / 回复三段式研究助手智能体
//!
//! 模块划分：
//! - **agent**: 按配置装配 LLM、工具与工作流引擎
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: AgentState、Plan / Task 与错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话消息
//! - **nodes**: Planner、Executor、Responder 三个节点与流式事件
//! - **observability**: 日志初始化
//! - **tools**: 工具注册表、执行器与 web_search
//! - **workflow**: 状态机路由与驱动引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod nodes;
pub mod observability;
pub mod tools;
pub mod workflow;

pub use crate::core::{AgentError, AgentState, Plan, Task};
pub use nodes::TurnEvent;
pub use workflow::WorkflowEngine;
