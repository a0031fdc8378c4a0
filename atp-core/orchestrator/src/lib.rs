//! ATP 编排器
//!
//! 按注册顺序运行多个命名场景, 每个场景可重复多次。
//! 单次运行的失败只记录到批次结果中, 不会中断后续场景。

pub mod orchestrator;
pub mod report;

pub use orchestrator::Orchestrator;
pub use report::{BatchReport, ErrorDescriptor, ScenarioOutcome};

use atp_executor::ExecutorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("场景名称重复: {0}")]
    DuplicateName(String),

    #[error("无效场景: {0}")]
    InvalidScenario(String),

    #[error("未注册的场景: {0}")]
    UnknownScenario(String),

    #[error("重复次数必须不小于 1, 实际为 {0}")]
    InvalidRepetitions(u32),

    #[error("执行器错误: {0}")]
    Executor(#[from] ExecutorError),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
