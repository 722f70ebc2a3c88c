//! 单轮对话的流式事件
//!
//! 每轮一个有界 mpsc 通道，单生产者按顺序发送；Final 是唯一权威的结束信号，致命错误以一条 Err 结束流。
//! 消费端丢弃接收端即视为取消：下一次 emit 返回 AgentError::Cancelled，生产端随即停止。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::{AgentError, AgentState, Plan, Task};

/// 流式事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Planner 结构化输出的一个片段
    PlanToken { token: String },
    /// 本轮规划完成
    PlanComplete { plan: Plan },
    /// 一个任务执行完毕
    ExecuteProgress {
        task: Task,
        success: bool,
        preview: String,
    },
    /// 执行后剩余的任务队列
    ExecuteRemaining { remaining: Vec<Task> },
    /// 最终回复的一个片段
    ResponseToken { token: String },
    /// 本轮结束，携带完整状态
    Final { state: Box<AgentState> },
}

impl TurnEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TurnEvent::PlanToken { .. } => "plan_token",
            TurnEvent::PlanComplete { .. } => "plan_complete",
            TurnEvent::ExecuteProgress { .. } => "execute_progress",
            TurnEvent::ExecuteRemaining { .. } => "execute_remaining",
            TurnEvent::ResponseToken { .. } => "response_token",
            TurnEvent::Final { .. } => "final",
        }
    }
}

/// 通道中的条目
pub type TurnItem = Result<TurnEvent, AgentError>;

/// 节点向外推送事件的句柄；disabled 时为阻塞模式，不产生任何事件
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TurnItem>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<TurnItem>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// 是否处于流式模式
    pub fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    /// 按顺序发送事件；消费端已关闭时返回 Cancelled
    pub async fn emit(&self, event: TurnEvent) -> Result<(), AgentError> {
        match &self.tx {
            None => Ok(()),
            Some(tx) => tx.send(Ok(event)).await.map_err(|_| AgentError::Cancelled),
        }
    }

    /// 发送致命错误（流的最后一项）
    pub async fn fail(&self, error: AgentError) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(error)).await;
        }
    }
}
