//! 工作流节点：Planner / Executor / Responder，以及节点向外推送的流式事件

pub mod events;
pub mod executor;
pub mod planner;
pub mod responder;

pub use events::{EventSink, TurnEvent, TurnItem};
pub use executor::Executor;
pub use planner::{parse_plan, Planner, PLANNER_SYSTEM_PROMPT};
pub use responder::{build_context, Responder, SynthesisContext, RESPONDER_SYSTEM_PROMPT};
