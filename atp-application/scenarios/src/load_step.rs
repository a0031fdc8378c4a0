//! 随机负荷投切场景

use async_trait::async_trait;
use atp_executor::{Result, Scenario, SimulationDriver};
use tracing::info;

use crate::ringbus::{self, GenOpMode};
use crate::{ScenarioRng, MAX_JITTER};

/// 场景时长 (秒)
pub const LOAD_STEP_DURATION: f64 = 20.0;

/// 电源投运完成后第一次投切的基准时刻
pub const FIRST_LOAD_STEP: f64 = 8.5;

/// 投切次数
pub const LOAD_STEP_COUNT: usize = 10;

/// 相邻两次投切的最大间隔
pub const MAX_STEP_INTERVAL: f64 = 1.0;

/// 投运的电源组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMix {
    /// 机组构网, 光伏与储能跟网
    AllSources,
    /// 储能构网, 光伏跟网
    PvEss,
    /// 仅储能构网
    EssOnly,
    /// 仅机组构网
    GensetOnly,
}

impl SourceMix {
    pub const ALL: [SourceMix; 4] = [
        SourceMix::AllSources,
        SourceMix::PvEss,
        SourceMix::EssOnly,
        SourceMix::GensetOnly,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceMix::AllSources => "all_sources",
            SourceMix::PvEss => "pv_ess",
            SourceMix::EssOnly => "ess_only",
            SourceMix::GensetOnly => "genset_only",
        }
    }
}

/// 随机负荷投切场景
///
/// 7~8s 投运电源, 从 8.5s 起随机挑选负荷开关翻转状态, 每次间隔 `[0, 1)` 秒。
pub struct LoadStepScenario {
    mix: SourceMix,
    rng: ScenarioRng,
}

impl LoadStepScenario {
    pub fn new(mix: SourceMix, rng: ScenarioRng) -> Self {
        Self { mix, rng }
    }

    pub fn mix(&self) -> SourceMix {
        self.mix
    }

    pub fn name(&self) -> String {
        format!("load_step_{}", self.mix.label())
    }

    /// 电源投运事件
    async fn schedule_sources(&self, driver: &mut SimulationDriver) -> Result<()> {
        match self.mix {
            SourceMix::AllSources => {
                driver.schedule_input(0.0, ringbus::GEN_ON, 1.0)?;
                driver.schedule_input(7.0, ringbus::GEN_OP_MODE, GenOpMode::GridForming.value())?;
                self.schedule_pv(driver).await?;
                let ess_on = self.rng.jitter(8.0, MAX_JITTER).await;
                driver.schedule_input(ess_on, ringbus::ESS_ON, 1.0)?;
            }
            SourceMix::PvEss => {
                driver.schedule_input(0.0, ringbus::ESS_OP_MODE, ringbus::ESS_GRID_FORMING)?;
                driver.schedule_input(7.0, ringbus::ESS_ON, 1.0)?;
                self.schedule_pv(driver).await?;
            }
            SourceMix::EssOnly => {
                driver.schedule_input(0.0, ringbus::ESS_OP_MODE, ringbus::ESS_GRID_FORMING)?;
                driver.schedule_input(7.0, ringbus::ESS_ON, 1.0)?;
            }
            SourceMix::GensetOnly => {
                driver.schedule_input(0.0, ringbus::GEN_ON, 1.0)?;
                driver.schedule_input(7.0, ringbus::GEN_OP_MODE, GenOpMode::GridForming.value())?;
            }
        }
        Ok(())
    }

    async fn schedule_pv(&self, driver: &mut SimulationDriver) -> Result<()> {
        let connect = self.rng.jitter(7.5, MAX_JITTER).await;
        let enable = self.rng.jitter(7.5, MAX_JITTER).await;
        driver.schedule_input(connect, ringbus::PV_CONNECT, 1.0)?;
        driver.schedule_input(enable, ringbus::PV_ENABLE, 1.0)
    }
}

#[async_trait]
impl Scenario for LoadStepScenario {
    async fn setup(&self, driver: &mut SimulationDriver) -> Result<()> {
        driver.declare_duration(LOAD_STEP_DURATION)?;
        ringbus::apply_defaults(driver).await?;
        self.schedule_sources(driver).await?;

        let mut states = [false; ringbus::LOAD_SWITCHES.len()];
        let mut time = FIRST_LOAD_STEP;
        for _ in 0..LOAD_STEP_COUNT {
            let index = self.rng.index(states.len()).await;
            states[index] = !states[index];
            time += self.rng.uniform(0.0, MAX_STEP_INTERVAL).await;

            let value = if states[index] {
                ringbus::SWITCH_ON
            } else {
                ringbus::SWITCH_OFF
            };
            driver.schedule_input(time, ringbus::LOAD_SWITCHES[index], value)?;
        }

        info!(
            "负荷投切场景 {}: {} 次投切, 最后一次 {:.6}s",
            self.mix.label(),
            LOAD_STEP_COUNT,
            time
        );
        Ok(())
    }

    async fn teardown(&self, _driver: &mut SimulationDriver) -> Result<()> {
        Ok(())
    }

    fn description(&self) -> Option<String> {
        Some(format!(
            "{} 电源组合下的 {} 次随机负荷投切",
            self.mix.label(),
            LOAD_STEP_COUNT
        ))
    }
}
