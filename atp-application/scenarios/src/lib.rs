//! ATP 场景库
//!
//! 环形母线微电网的内置场景:
//! - 各类短路故障
//! - 随机负荷投切
//! - 单开关合分闸
//!
//! 事件时刻带随机抖动, 随机数由种子确定, 相同种子复现同一批次。

pub mod fault;
pub mod load_step;
pub mod ringbus;
pub mod switching;

pub use fault::FaultScenario;
pub use load_step::{LoadStepScenario, SourceMix};
pub use ringbus::FaultType;
pub use switching::SwitchingScenario;

use atp_executor::{LifecycleAdapter, Scenario, SimulationDriver};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 事件时刻的最大抖动 (秒)
pub const MAX_JITTER: f64 = 0.16;

/// 场景内的随机源
///
/// 场景以 `&self` 运行, 随机状态放在锁后面, 每次 setup 重新抽样。
pub struct ScenarioRng {
    inner: Mutex<ChaCha8Rng>,
}

impl ScenarioRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// 从系统熵初始化
    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// `[low, high)` 上的均匀分布
    pub async fn uniform(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.lock().await.gen_range(low..high)
    }

    /// `base` 加上 `[0, max_delay)` 的随机延迟
    pub async fn jitter(&self, base: f64, max_delay: f64) -> f64 {
        base + self.uniform(0.0, max_delay).await
    }

    /// `[0, len)` 上的随机下标
    pub async fn index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.inner.lock().await.gen_range(0..len)
    }
}

/// 配置了采集信号时预约采集窗口, 否则跳过
pub async fn capture_if_configured(
    driver: &mut SimulationDriver,
    start_time: f64,
    duration: f64,
) -> atp_executor::Result<bool> {
    let config = driver.config();
    if config.analog_signals.is_empty() && config.digital_signals.is_empty() {
        debug!("未配置采集信号, 跳过 {:.6}s 起的采集窗口", start_time);
        return Ok(false);
    }
    driver
        .schedule_capture_at_sample_rate(start_time, duration)
        .await?;
    Ok(true)
}

/// 内置场景, 名称唯一且按固定顺序排列
///
/// 每个场景使用 `seed` 派生的独立随机源, 过滤掉部分场景不影响其余场景的抽样。
pub fn builtin_scenarios(seed: u64) -> Vec<(String, Arc<dyn Scenario>)> {
    let mut scenarios: Vec<(String, Arc<dyn Scenario>)> = Vec::new();
    let mut next_seed = {
        let mut derived = seed;
        move || {
            let current = derived;
            derived = derived.wrapping_add(1);
            current
        }
    };

    for fault in FaultType::ALL {
        let scenario = FaultScenario::new(fault, ScenarioRng::from_seed(next_seed()));
        scenarios.push((scenario.name(), Arc::new(scenario)));
    }

    for mix in SourceMix::ALL {
        let scenario = LoadStepScenario::new(mix, ScenarioRng::from_seed(next_seed()));
        scenarios.push((scenario.name(), Arc::new(scenario)));
    }

    let switching = SwitchingScenario::new(
        switching::DEFAULT_DURATION,
        ScenarioRng::from_seed(next_seed()),
    );
    scenarios.push((switching.name(), Arc::new(LifecycleAdapter::new(switching))));

    info!("内置场景 {} 个 (种子 {})", scenarios.len(), seed);
    scenarios
}
