//! 调度事件
//!
//! `ScheduledEvent` 创建后不可变, 由事件队列独占, 执行后即丢弃。

use async_trait::async_trait;

use crate::driver::SimulationDriver;
use crate::{ExecutorError, Result};

/// 事件动作
///
/// 执行时以驱动器为唯一参数, 可以继续调度事件、写设备输入或置停止信号。
#[async_trait]
pub trait SimEvent: Send + Sync {
    async fn invoke(&self, driver: &mut SimulationDriver) -> Result<()>;
}

/// 调度事件
pub struct ScheduledEvent {
    due_time: f64,
    description: String,
    action: Box<dyn SimEvent>,
}

impl ScheduledEvent {
    /// 创建事件, 描述为空或时间非法时失败
    pub fn new(due_time: f64, description: &str, action: Box<dyn SimEvent>) -> Result<Self> {
        if description.trim().is_empty() {
            return Err(ExecutorError::InvalidEvent("事件描述不能为空".to_string()));
        }
        if !due_time.is_finite() || due_time < 0.0 {
            return Err(ExecutorError::InvalidEvent(format!(
                "事件 '{}' 的触发时间无效: {}",
                description, due_time
            )));
        }

        Ok(Self {
            due_time,
            description: description.to_string(),
            action,
        })
    }

    pub fn due_time(&self) -> f64 {
        self.due_time
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 拆出动作用于执行
    pub(crate) fn into_parts(self) -> (f64, String, Box<dyn SimEvent>) {
        (self.due_time, self.description, self.action)
    }
}

impl std::fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("due_time", &self.due_time)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// 同步回调事件
pub struct CallbackEvent<F>(F);

impl<F> CallbackEvent<F>
where
    F: Fn(&mut SimulationDriver) -> Result<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

#[async_trait]
impl<F> SimEvent for CallbackEvent<F>
where
    F: Fn(&mut SimulationDriver) -> Result<()> + Send + Sync,
{
    async fn invoke(&self, driver: &mut SimulationDriver) -> Result<()> {
        (self.0)(driver)
    }
}

/// 写 SCADA 输入
#[derive(Debug, Clone)]
pub struct SetInputEvent {
    pub name: String,
    pub value: f64,
}

impl SetInputEvent {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[async_trait]
impl SimEvent for SetInputEvent {
    async fn invoke(&self, driver: &mut SimulationDriver) -> Result<()> {
        driver.set_input_value(&self.name, self.value).await
    }
}

/// 置停止信号
#[derive(Debug, Clone, Copy, Default)]
pub struct StopEvent;

#[async_trait]
impl SimEvent for StopEvent {
    async fn invoke(&self, driver: &mut SimulationDriver) -> Result<()> {
        driver.set_stop_signal();
        Ok(())
    }
}
