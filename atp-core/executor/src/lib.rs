//! ATP 执行器
//!
//! 离散事件调度与仿真驱动引擎:
//! - 按时间排序的事件队列
//! - 驱动外部仿真完成一次场景运行的驱动器
//! - 采集与数据记录器的生命周期协调

pub mod capture;
pub mod config;
pub mod driver;
pub mod event;
pub mod run_config;
pub mod schedule;
pub mod scenario;
pub mod script;

pub use capture::{plan_capture, CapturePlan, MAX_DIGITAL_CHANNELS, MIN_CAPTURE_SAMPLES};
pub use config::AutomatorConfig;
pub use driver::{DriverState, EventRecord, SimulationDriver, DATA_LOGGER_NAME};
pub use event::{CallbackEvent, ScheduledEvent, SetInputEvent, SimEvent, StopEvent};
pub use run_config::{RunConfiguration, MAX_TIMESTEP};
pub use schedule::EventSchedule;
pub use scenario::{LifecycleAdapter, LifecycleScenario, Scenario};
pub use script::{CaptureWindow, ScriptedEvent, ScriptedScenario};

use atp_hil::HilError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("无效事件: {0}")]
    InvalidEvent(String),

    #[error("事件队列为空")]
    EmptySchedule,

    #[error("场景契约错误: {0}")]
    ScenarioContract(String),

    #[error("仿真启动失败: {0}")]
    Startup(String),

    #[error("仿真在 {sim_time:.6}s 意外停止")]
    UnexpectedStop { sim_time: f64 },

    #[error("仿真停止失败: {0}")]
    Shutdown(String),

    #[error("采集启动失败: {0}")]
    CaptureStart(String),

    #[error("采集停止失败: {0}")]
    CaptureStop(String),

    #[error("数据记录器错误: {0}")]
    DataLogger(String),

    #[error("输入写入被拒绝: {name} = {value}")]
    InputRejected { name: String, value: f64 },

    #[error("事件执行失败 [{time:.6}] {description}: {source}")]
    EventFailed {
        time: f64,
        description: String,
        #[source]
        source: Box<ExecutorError>,
    },

    #[error("驱动器状态错误: {0}")]
    InvalidState(String),

    #[error("运行超时: 超过 {0:?}")]
    Timeout(Duration),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("设备错误: {0}")]
    Device(#[from] HilError),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(String),

    #[error("场景执行失败: {0}")]
    ScenarioFailed(String),
}

impl ExecutorError {
    /// 错误类别名, 用于报告
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::InvalidEvent(_) => "InvalidEvent",
            ExecutorError::EmptySchedule => "EmptySchedule",
            ExecutorError::ScenarioContract(_) => "ScenarioContract",
            ExecutorError::Startup(_) => "Startup",
            ExecutorError::UnexpectedStop { .. } => "UnexpectedStop",
            ExecutorError::Shutdown(_) => "Shutdown",
            ExecutorError::CaptureStart(_) => "CaptureStart",
            ExecutorError::CaptureStop(_) => "CaptureStop",
            ExecutorError::DataLogger(_) => "DataLogger",
            ExecutorError::InputRejected { .. } => "InputRejected",
            ExecutorError::EventFailed { .. } => "EventFailed",
            ExecutorError::InvalidState(_) => "InvalidState",
            ExecutorError::Timeout(_) => "Timeout",
            ExecutorError::ConfigError(_) => "Config",
            ExecutorError::Device(_) => "Device",
            ExecutorError::IoError(_) => "Io",
            ExecutorError::SerdeError(_) => "Serde",
            ExecutorError::ScenarioFailed(_) => "ScenarioFailed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
