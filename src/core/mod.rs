//! 核心层：步骤协议、状态机、编排循环与恢复控制

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod steps;

pub use error::AgentError;
pub use orchestrator::Orchestrator;
pub use recovery::RecoveryController;
pub use state::{RunPhase, RunState};
pub use steps::{step_channel, AgentStep, StepKind, StepSender, STEP_CHANNEL_CAPACITY};
