//! 单开关合分闸场景

use async_trait::async_trait;
use atp_executor::{
    ExecutorError, LifecycleScenario, Result, SetInputEvent, SimulationDriver,
};
use tracing::info;

use crate::{capture_if_configured, ScenarioRng};

/// 受控开关的 SCADA 输入
pub const SWITCH_NAME: &str = "Sw_ctrl";

pub const DEFAULT_DURATION: f64 = 1.0;

/// 采集窗口在合闸前开始的提前量
pub const CAPTURE_LEAD: f64 = 0.05;

/// 采集窗口长度
pub const CAPTURE_LENGTH: f64 = 0.1;

/// 前半段随机合闸, 后半段随机分闸
pub struct SwitchingScenario {
    duration: f64,
    rng: ScenarioRng,
}

impl SwitchingScenario {
    pub fn new(duration: f64, rng: ScenarioRng) -> Self {
        Self { duration, rng }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn name(&self) -> String {
        "switching".to_string()
    }

    /// 合闸时刻的下限, 保证采集窗口起点大于 0
    fn earliest_close(&self) -> f64 {
        2.0 * CAPTURE_LEAD
    }
}

#[async_trait]
impl LifecycleScenario for SwitchingScenario {
    async fn set_up_scenario(&self, driver: &mut SimulationDriver) -> Result<()> {
        let half = self.duration / 2.0;
        let close_time = self.rng.uniform(self.earliest_close(), half).await;
        let open_time = self.rng.uniform(half, self.duration).await;

        driver.schedule_input(close_time, SWITCH_NAME, 1.0)?;
        driver.schedule_input(open_time, SWITCH_NAME, 0.0)?;
        capture_if_configured(driver, close_time - CAPTURE_LEAD, CAPTURE_LENGTH).await?;
        driver.declare_duration(self.duration)?;

        driver
            .invoke_now("初始分闸", Box::new(SetInputEvent::new(SWITCH_NAME, 0.0)))
            .await?;

        info!(
            "开关场景: {:.6}s 合闸, {:.6}s 分闸",
            close_time, open_time
        );
        Ok(())
    }

    async fn tear_down_scenario(&self, _driver: &mut SimulationDriver) -> Result<()> {
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration / 2.0 <= self.earliest_close() {
            return Err(ExecutorError::ScenarioContract(format!(
                "开关场景时长必须大于 {}s: {}",
                4.0 * CAPTURE_LEAD,
                self.duration
            )));
        }
        Ok(())
    }
}
