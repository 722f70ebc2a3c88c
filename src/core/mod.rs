//! 核心数据层：错误类型、任务/计划模型、AgentState

pub mod error;
pub mod plan;
pub mod state;

pub use error::AgentError;
pub use plan::{Plan, Task};
pub use state::{AgentState, ExecutedTask};
