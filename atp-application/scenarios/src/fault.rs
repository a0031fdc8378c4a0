//! 短路故障场景

use async_trait::async_trait;
use atp_executor::{ExecutorError, Result, Scenario, SimulationDriver};
use tracing::info;

use crate::ringbus::{self, FaultType, GenOpMode};
use crate::{capture_if_configured, ScenarioRng, MAX_JITTER};

/// 场景时长 (秒)
pub const FAULT_SCENARIO_DURATION: f64 = 10.0;

/// 故障发生的基准时刻
pub const FAULT_ONSET: f64 = 5.0;

/// 故障清除的基准时刻
pub const FAULT_CLEAR: f64 = 7.0;

/// 采集窗口在故障发生前开始的提前量
pub const CAPTURE_LEAD: f64 = 0.1;

/// 采集窗口长度
pub const CAPTURE_LENGTH: f64 = 0.5;

/// 负荷依次投入的基准时刻
const LOAD_CONNECT_TIMES: [f64; 4] = [2.0, 2.5, 3.0, 3.5];

/// 短路故障场景
///
/// 机组构网运行, 负荷全部投入后施加故障, 随后清除, 采集窗口覆盖故障发生时刻。
pub struct FaultScenario {
    fault: FaultType,
    rng: ScenarioRng,
}

impl FaultScenario {
    pub fn new(fault: FaultType, rng: ScenarioRng) -> Self {
        Self { fault, rng }
    }

    pub fn fault(&self) -> FaultType {
        self.fault
    }

    pub fn name(&self) -> String {
        format!("fault_{}", self.fault.label())
    }
}

#[async_trait]
impl Scenario for FaultScenario {
    async fn setup(&self, driver: &mut SimulationDriver) -> Result<()> {
        driver.declare_duration(FAULT_SCENARIO_DURATION)?;
        ringbus::apply_defaults(driver).await?;

        driver.schedule_input(0.0, ringbus::GEN_ON, 1.0)?;
        driver.schedule_input(1.0, ringbus::GEN_OP_MODE, GenOpMode::GridForming.value())?;

        for (switch, base) in ringbus::LOAD_SWITCHES.iter().zip(LOAD_CONNECT_TIMES) {
            let time = self.rng.jitter(base, MAX_JITTER).await;
            driver.schedule_input(time, switch, ringbus::SWITCH_ON)?;
        }

        let onset = self.rng.jitter(FAULT_ONSET, MAX_JITTER).await;
        let clear = self.rng.jitter(FAULT_CLEAR, MAX_JITTER).await;
        driver.schedule_input(onset, ringbus::FAULT_CTRL, self.fault.value())?;
        driver.schedule_input(clear, ringbus::FAULT_CTRL, FaultType::None.value())?;

        capture_if_configured(driver, onset - CAPTURE_LEAD, CAPTURE_LENGTH).await?;

        info!(
            "故障场景 {}: {:.6}s 发生, {:.6}s 清除",
            self.fault, onset, clear
        );
        Ok(())
    }

    async fn teardown(&self, _driver: &mut SimulationDriver) -> Result<()> {
        info!("故障场景 {} 结束", self.fault);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.fault == FaultType::None {
            return Err(ExecutorError::ScenarioContract(
                "故障场景必须指定故障类型".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> Option<String> {
        Some(format!(
            "{} 短路故障, 约 {}s 发生, 约 {}s 清除",
            self.fault, FAULT_ONSET, FAULT_CLEAR
        ))
    }
}
