//! 设备能力接口
//!
//! 传输层故障返回 `Err`，设备拒绝执行返回 `Ok(false)`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::Result;

/// 仿真控制
#[async_trait]
pub trait SimulationControl: Send + Sync {
    /// 启动仿真时钟
    async fn start_simulation(&self) -> Result<bool>;

    /// 停止仿真时钟
    async fn stop_simulation(&self) -> Result<bool>;

    /// 仿真是否在运行
    async fn is_simulation_running(&self) -> Result<bool>;

    /// 当前仿真时间 (秒)
    async fn simulation_time(&self) -> Result<f64>;

    /// 当前仿真步数
    async fn simulation_step(&self) -> Result<u64>;

    /// 设置 SCADA 输入值
    async fn set_input_value(&self, name: &str, value: f64) -> Result<bool>;
}

/// 采集触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTrigger {
    /// 到达 execute_at 时强制触发
    Forced,
}

/// 采集参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// 抽取因子
    pub decimation: u32,

    /// 模拟量通道
    pub analog_channels: Vec<String>,

    /// 数字量通道
    pub digital_channels: Vec<String>,

    /// 采样点数 (偶数, 不少于最小值)
    pub sample_count: u64,

    /// 起始仿真步
    pub start_step: u64,

    /// 起始仿真时间 (秒)
    pub execute_at: f64,

    /// 触发方式
    pub trigger: CaptureTrigger,

    /// 输出文件
    pub output_file: PathBuf,
}

/// 信号采集
#[async_trait]
pub trait CaptureControl: Send + Sync {
    async fn start_capture(&self, settings: &CaptureSettings) -> Result<bool>;

    async fn stop_capture(&self) -> Result<bool>;

    async fn capture_in_progress(&self) -> Result<bool>;
}

/// 数据记录器
#[async_trait]
pub trait DataLoggerControl: Send + Sync {
    /// 注册记录器
    async fn add_logger(&self, name: &str, file: &std::path::Path, signals: &[String])
        -> Result<bool>;

    async fn start_logger(&self, name: &str) -> Result<bool>;

    async fn stop_logger(&self, name: &str) -> Result<bool>;

    async fn remove_logger(&self, name: &str) -> Result<bool>;
}
