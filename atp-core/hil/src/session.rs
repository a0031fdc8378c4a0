//! 设备会话

use std::sync::Arc;

use crate::{CaptureControl, DataLoggerControl, SimulationControl};

/// 设备会话上下文
///
/// 持有一次连接内的三种设备能力，由调用方显式传入驱动器。
#[derive(Clone)]
pub struct HilSession {
    /// 仿真控制
    pub simulation: Arc<dyn SimulationControl>,

    /// 信号采集
    pub capture: Arc<dyn CaptureControl>,

    /// 数据记录器
    pub data_logger: Arc<dyn DataLoggerControl>,
}

impl HilSession {
    /// 由独立的能力实现组装会话
    pub fn new(
        simulation: Arc<dyn SimulationControl>,
        capture: Arc<dyn CaptureControl>,
        data_logger: Arc<dyn DataLoggerControl>,
    ) -> Self {
        Self {
            simulation,
            capture,
            data_logger,
        }
    }

    /// 由同时实现三种能力的设备创建会话
    pub fn from_device<D>(device: Arc<D>) -> Self
    where
        D: SimulationControl + CaptureControl + DataLoggerControl + 'static,
    {
        Self {
            simulation: device.clone(),
            capture: device.clone(),
            data_logger: device,
        }
    }
}

impl std::fmt::Debug for HilSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HilSession").finish_non_exhaustive()
    }
}
