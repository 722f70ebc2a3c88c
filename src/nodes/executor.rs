//! Executor：每次调用只执行一个待办任务
//!
//! 取 plan.tasks 队首（FIFO），经 ToolExecutor 调用工具：
//! - 成功：记录 success=true；
//! - 调用失败 / 超时：记录 success=false，并把同一任务放回 remaining_tasks 末尾，交给下一轮规划决定去留；
//! - 工具名为空或未注册：记录失败但不放回（重试不可能成功）。
//! executed_tasks 在整轮内累积；remaining_tasks 每次整体替换为「未尝试的任务 + 重排任务」。

use std::sync::Arc;

use crate::core::{AgentError, AgentState, ExecutedTask};
use crate::nodes::{EventSink, TurnEvent};
use crate::tools::ToolExecutor;

/// 事件中结果预览的最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

pub struct Executor {
    tools: Arc<ToolExecutor>,
}

impl Executor {
    pub fn new(tools: Arc<ToolExecutor>) -> Self {
        Self { tools }
    }

    /// 执行队首任务并返回更新后的 state；没有待办任务时原样返回
    pub async fn execute_next(
        &self,
        mut state: AgentState,
        events: &EventSink,
    ) -> Result<AgentState, AgentError> {
        if state.plan.tasks.is_empty() {
            tracing::debug!("no tasks to execute");
            return Ok(state);
        }

        let task = state.plan.tasks.remove(0);
        tracing::info!(task = %task.title, tool = %task.tool_name, "executing task");

        let mut requeue = None;
        let record = match self.tools.execute(&task.tool_name, task.args_value()).await {
            Ok(result) => ExecutedTask::succeeded(task, result),
            Err(e) if e.is_retryable_task_failure() => {
                tracing::warn!(task = %task.title, error = %e, "task failed, re-queued");
                requeue = Some(task.clone());
                ExecutedTask::failed(task, e.to_string())
            }
            Err(e) if e.is_task_local() => {
                tracing::warn!(task = %task.title, error = %e, "task dropped");
                ExecutedTask::failed(task, e.to_string())
            }
            Err(e) => return Err(e),
        };

        events
            .emit(TurnEvent::ExecuteProgress {
                task: record.task.clone(),
                success: record.success,
                preview: record.result.preview(RESULT_PREVIEW_CHARS),
            })
            .await?;
        state.executed_tasks.push(record);

        let mut remaining = state.plan.tasks.clone();
        remaining.extend(requeue);
        state.remaining_tasks = remaining;

        events
            .emit(TurnEvent::ExecuteRemaining {
                remaining: state.remaining_tasks.clone(),
            })
            .await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Plan, Task};
    use crate::tools::{Tool, ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// 记录调用顺序；参数 fail=true 时返回错误
    #[derive(Default)]
    struct RecordingTool {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Tool for Arc<RecordingTool> {
        fn name(&self) -> &str {
            "record"
        }

        fn description(&self) -> &str {
            "records calls"
        }

        async fn execute(&self, args: Value) -> Result<ToolResult, String> {
            let id = args["id"].as_str().unwrap_or_default().to_string();
            self.calls.lock().unwrap().push(id.clone());
            if args["fail"].as_bool().unwrap_or(false) {
                Err(format!("{} exploded", id))
            } else {
                Ok(ToolResult::text(format!("done {}", id)))
            }
        }
    }

    fn setup() -> (Executor, Arc<RecordingTool>) {
        let tool = Arc::new(RecordingTool::default());
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        let executor = Executor::new(Arc::new(ToolExecutor::new(Arc::new(registry), 5)));
        (executor, tool)
    }

    fn task(id: &str, fail: bool) -> Task {
        Task::new(format!("task {}", id), "record", json!({"id": id, "fail": fail}))
    }

    fn planned(tasks: Vec<Task>) -> AgentState {
        let mut state = AgentState::new();
        state.remaining_tasks = tasks.clone();
        state.plan = Plan::with_tasks("overview", tasks);
        state
    }

    #[tokio::test]
    async fn test_tasks_run_in_fifo_order_one_per_call() {
        let (executor, tool) = setup();
        let mut state = planned(vec![task("a", false), task("b", false), task("c", false)]);

        state = executor.execute_next(state, &EventSink::disabled()).await.unwrap();
        assert_eq!(*tool.calls.lock().unwrap(), vec!["a"]);
        assert_eq!(state.remaining_tasks.len(), 2);

        state = executor.execute_next(state, &EventSink::disabled()).await.unwrap();
        state = executor.execute_next(state, &EventSink::disabled()).await.unwrap();
        assert_eq!(*tool.calls.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(state.remaining_tasks.is_empty());
        assert_eq!(state.executed_tasks.len(), 3);
        assert!(state.executed_tasks.iter().all(|t| t.success));
    }

    #[tokio::test]
    async fn test_failed_task_is_requeued_at_back() {
        let (executor, _) = setup();
        let state = planned(vec![task("a", true), task("b", false)]);
        let state = executor.execute_next(state, &EventSink::disabled()).await.unwrap();

        let record = &state.executed_tasks[0];
        assert!(!record.success);
        assert!(record.result.to_string().contains("a exploded"));
        let titles: Vec<&str> = state.remaining_tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["task b", "task a"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recorded_and_dropped() {
        let (executor, tool) = setup();
        let ghost = Task::new("ghost", "does_not_exist", json!({}));
        let state = executor
            .execute_next(planned(vec![ghost]), &EventSink::disabled())
            .await
            .unwrap();
        assert!(tool.calls.lock().unwrap().is_empty());
        assert!(!state.executed_tasks[0].success);
        assert!(state.executed_tasks[0].result.to_string().contains("Unknown tool"));
        assert!(state.remaining_tasks.is_empty());
    }

    #[tokio::test]
    async fn test_empty_tool_name_is_dropped() {
        let (executor, _) = setup();
        let state = executor
            .execute_next(planned(vec![Task::new("no tool", "", json!({}))]), &EventSink::disabled())
            .await
            .unwrap();
        assert!(!state.executed_tasks[0].success);
        assert!(state.remaining_tasks.is_empty());
    }

    #[tokio::test]
    async fn test_executed_tasks_accumulate_across_calls() {
        let (executor, _) = setup();
        let mut state = planned(vec![task("a", false)]);
        state
            .executed_tasks
            .push(ExecutedTask::failed(task("earlier", true), "old failure"));
        let state = executor.execute_next(state, &EventSink::disabled()).await.unwrap();
        assert_eq!(state.executed_tasks.len(), 2);
        assert_eq!(state.executed_tasks[1].task.title, "task a");
    }
}
