//! 工作流引擎
//!
//! 显式循环驱动状态机：每个节点按值接收 state 并返回新 state，路由函数决定下一个节点。
//! 阻塞模式（run_turn）直接返回最终 state；流式模式（stream_turn）在后台任务中驱动，
//! 通过有界 mpsc 通道按顺序输出事件，最后一项为 Final 或一个 Err。

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{stream, Stream};
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{AgentError, AgentState};
use crate::nodes::{EventSink, Executor, Planner, Responder, TurnEvent, TurnItem};
use crate::workflow::graph::{next_node, Node};

pub const DEFAULT_MAX_PLANNER_ROUNDS: usize = 5;
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// 一轮对话的事件流
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnItem> + Send>>;

/// 工作流引擎：持有三个节点，可廉价克隆并在多个会话间共享
#[derive(Clone)]
pub struct WorkflowEngine {
    planner: Arc<Planner>,
    executor: Arc<Executor>,
    responder: Arc<Responder>,
    max_planner_rounds: usize,
    event_buffer: usize,
}

impl WorkflowEngine {
    pub fn new(planner: Planner, executor: Executor, responder: Responder) -> Self {
        Self {
            planner: Arc::new(planner),
            executor: Arc::new(executor),
            responder: Arc::new(responder),
            max_planner_rounds: DEFAULT_MAX_PLANNER_ROUNDS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// 每轮最多规划次数（至少 1）
    pub fn with_max_planner_rounds(mut self, rounds: usize) -> Self {
        self.max_planner_rounds = rounds.max(1);
        self
    }

    /// 事件通道容量
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn max_planner_rounds(&self) -> usize {
        self.max_planner_rounds
    }

    /// 开始新一轮（写入用户输入）并阻塞到结束
    pub async fn run_turn(
        &self,
        mut state: AgentState,
        input: impl Into<String>,
    ) -> Result<AgentState, AgentError> {
        state.begin_turn(input);
        self.drive(state, &EventSink::disabled()).await
    }

    /// 开始新一轮并返回事件流。丢弃返回的流即取消本轮：生产端在下一次发送时停止。
    pub fn stream_turn(&self, mut state: AgentState, input: impl Into<String>) -> TurnStream {
        state.begin_turn(input);
        let (tx, rx) = mpsc::channel::<TurnItem>(self.event_buffer);
        let engine = self.clone();

        tokio::spawn(async move {
            let sink = EventSink::new(tx);
            let outcome = match engine.drive(state, &sink).await {
                Ok(state) => {
                    sink.emit(TurnEvent::Final {
                        state: Box::new(state),
                    })
                    .await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {}
                Err(AgentError::Cancelled) => tracing::debug!("event stream dropped, turn stopped"),
                Err(e) => {
                    tracing::warn!(error = %e, "turn failed");
                    sink.fail(e).await;
                }
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    async fn drive(&self, state: AgentState, events: &EventSink) -> Result<AgentState, AgentError> {
        let span = tracing::info_span!("turn", turn_id = %Uuid::new_v4());
        self.run_graph(state, events).instrument(span).await
    }

    /// 计入上限的规划轮：首轮与紧跟失败执行的重新规划；成功执行之后的重新规划不计数
    async fn run_graph(&self, mut state: AgentState, events: &EventSink) -> Result<AgentState, AgentError> {
        let mut node = Node::Planner;
        let mut counted_rounds = 0usize;

        loop {
            state = match node {
                Node::Planner => {
                    if !state.is_replanning() || state.last_execution_failed() {
                        counted_rounds += 1;
                    }
                    if counted_rounds > self.max_planner_rounds {
                        tracing::warn!(rounds = self.max_planner_rounds, "planner round limit reached");
                        return Err(AgentError::MaxPlannerRounds(self.max_planner_rounds));
                    }
                    self.planner.plan(state, events).await?
                }
                Node::Executor => self.executor.execute_next(state, events).await?,
                Node::Responder => self.responder.respond(state, events).await?,
                Node::End => break,
            };
            let next = next_node(node, &state);
            tracing::info!(from = node.as_str(), to = next.as_str(), "transition");
            node = next;
        }
        Ok(state)
    }
}
