//! 场景能力接口
//!
//! 场景通过 `setup` 向驱动器注册事件并声明时长, 运行结束后由 `teardown` 收尾。
//! 使用 `set_up_scenario` / `tear_down_scenario` 命名的场景实现
//! [`LifecycleScenario`], 经 [`LifecycleAdapter`] 当作同一能力使用。

use async_trait::async_trait;

use crate::driver::SimulationDriver;
use crate::Result;

/// 场景
#[async_trait]
pub trait Scenario: Send + Sync {
    /// 注册事件, 必须调用 `driver.declare_duration(d)` 且 `d > 0`
    async fn setup(&self, driver: &mut SimulationDriver) -> Result<()>;

    /// 运行循环退出后调用
    async fn teardown(&self, driver: &mut SimulationDriver) -> Result<()>;

    /// 注册前的静态检查
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// 场景描述
    fn description(&self) -> Option<String> {
        None
    }
}

/// 另一种命名约定的场景
#[async_trait]
pub trait LifecycleScenario: Send + Sync {
    async fn set_up_scenario(&self, driver: &mut SimulationDriver) -> Result<()>;

    async fn tear_down_scenario(&self, driver: &mut SimulationDriver) -> Result<()>;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// 把 [`LifecycleScenario`] 适配为 [`Scenario`]
pub struct LifecycleAdapter<S> {
    inner: S,
}

impl<S: LifecycleScenario> LifecycleAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: LifecycleScenario> Scenario for LifecycleAdapter<S> {
    async fn setup(&self, driver: &mut SimulationDriver) -> Result<()> {
        self.inner.set_up_scenario(driver).await
    }

    async fn teardown(&self, driver: &mut SimulationDriver) -> Result<()> {
        self.inner.tear_down_scenario(driver).await
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }
}
