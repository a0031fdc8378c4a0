//! ATP HIL 设备层
//!
//! 定义自动化核心调用的外部设备能力接口:
//! - 仿真控制 (启动/停止/时间/输入)
//! - 信号采集 (capture)
//! - 数据记录器 (data logger)
//!
//! 同时提供纯软件实现的虚拟 HIL，用于无硬件环境和测试。

pub mod session;
pub mod traits;
pub mod vhil;

pub use session::HilSession;
pub use traits::{
    CaptureControl, CaptureSettings, CaptureTrigger, DataLoggerControl, SimulationControl,
};
pub use vhil::{ClockMode, VhilFaults, VirtualHil};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HilError {
    #[error("设备通信失败: {0}")]
    CommunicationFailed(String),

    #[error("设备未连接")]
    NotConnected,

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HilError>;
