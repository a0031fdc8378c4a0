//! 场景编排器

use atp_executor::{
    AutomatorConfig, ExecutorError, LifecycleAdapter, LifecycleScenario, RunConfiguration,
    Scenario, SimulationDriver,
};
use atp_hil::HilSession;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::report::{BatchReport, ErrorDescriptor, ScenarioOutcome};
use crate::{OrchestratorError, Result};

/// 已注册场景
struct RegisteredScenario {
    name: String,
    scenario: Arc<dyn Scenario>,
}

/// 场景编排器
///
/// 持有唯一的仿真驱动器, 保证场景之间严格串行, 不会同时操作同一设备。
pub struct Orchestrator {
    /// 设备会话
    session: HilSession,

    /// 全局配置
    config: AutomatorConfig,

    /// 仿真驱动器
    driver: SimulationDriver,

    /// 场景注册表 (保持注册顺序)
    registry: Vec<RegisteredScenario>,

    /// 批次运行结果
    outcomes: Vec<ScenarioOutcome>,

    /// 全局运行序号
    run_index: u64,

    batch_id: Uuid,
    batch_started: DateTime<Utc>,
}

impl Orchestrator {
    /// 创建编排器, 配置无效时失败
    pub fn new(session: HilSession, config: AutomatorConfig) -> Result<Self> {
        config.validate()?;

        let run_config = config.run_configuration(
            config.output.dir.join("datalog.csv"),
            config.output.dir.join("capture.csv"),
        );
        let driver = SimulationDriver::new(session.clone(), run_config)
            .with_poll_interval(config.poll_interval())
            .with_update_interval(config.update_interval())
            .with_capture_stop_timeout(config.capture_stop_timeout())
            .with_run_timeout(config.max_wall_time());

        Ok(Self {
            session,
            config,
            driver,
            registry: Vec::new(),
            outcomes: Vec::new(),
            run_index: 0,
            batch_id: Uuid::new_v4(),
            batch_started: Utc::now(),
        })
    }

    pub fn config(&self) -> &AutomatorConfig {
        &self.config
    }

    // ============================================
    // 场景注册表
    // ============================================

    /// 注册场景
    ///
    /// 名称重复时保留先注册的场景。
    pub fn add_scenario(&mut self, name: &str, scenario: Arc<dyn Scenario>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::InvalidScenario(
                "场景名称不能为空".to_string(),
            ));
        }
        if self.contains(name) {
            return Err(OrchestratorError::DuplicateName(name.to_string()));
        }
        if let Err(e) = scenario.validate() {
            return Err(OrchestratorError::InvalidScenario(format!("{}: {}", name, e)));
        }

        info!("注册场景: {}", name);
        self.registry.push(RegisteredScenario {
            name: name.to_string(),
            scenario,
        });
        Ok(())
    }

    /// 注册 set_up_scenario / tear_down_scenario 约定的场景
    pub fn add_lifecycle_scenario<S>(&mut self, name: &str, scenario: S) -> Result<()>
    where
        S: LifecycleScenario + 'static,
    {
        self.add_scenario(name, Arc::new(LifecycleAdapter::new(scenario)))
    }

    /// 注销场景
    pub fn remove_scenario(&mut self, name: &str) -> Result<()> {
        let index = self
            .registry
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| OrchestratorError::UnknownScenario(name.to_string()))?;
        self.registry.remove(index);
        info!("注销场景: {}", name);
        Ok(())
    }

    /// 已注册场景名 (注册顺序)
    pub fn scenario_names(&self) -> Vec<String> {
        self.registry.iter().map(|entry| entry.name.clone()).collect()
    }

    pub fn scenario_count(&self) -> usize {
        self.registry.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.iter().any(|entry| entry.name == name)
    }

    // ============================================
    // 批量运行
    // ============================================

    /// 按注册顺序运行全部场景, 返回本次失败的运行数
    pub async fn run_all(&mut self, repetitions: u32) -> Result<usize> {
        if repetitions < 1 {
            return Err(OrchestratorError::InvalidRepetitions(repetitions));
        }

        let entries: Vec<(String, Arc<dyn Scenario>)> = self
            .registry
            .iter()
            .map(|entry| (entry.name.clone(), entry.scenario.clone()))
            .collect();

        info!(
            "开始批量运行: {} 个场景, 每个重复 {} 次",
            entries.len(),
            repetitions
        );

        let mut failures = 0;
        for (name, scenario) in &entries {
            failures += self.repeat(name, scenario.as_ref(), repetitions).await;
        }

        info!(
            "批量运行结束: {} 次运行, {} 次失败",
            entries.len() * repetitions as usize,
            failures
        );
        Ok(failures)
    }

    /// 运行单个场景, 返回本次失败的运行数
    pub async fn run_scenario(&mut self, name: &str, repetitions: u32) -> Result<usize> {
        if repetitions < 1 {
            return Err(OrchestratorError::InvalidRepetitions(repetitions));
        }
        let scenario = self
            .registry
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.scenario.clone())
            .ok_or_else(|| OrchestratorError::UnknownScenario(name.to_string()))?;

        Ok(self.repeat(name, scenario.as_ref(), repetitions).await)
    }

    async fn repeat(&mut self, name: &str, scenario: &dyn Scenario, repetitions: u32) -> usize {
        let mut failures = 0;
        for repetition in 1..=repetitions {
            if !self.run_once(name, scenario, repetition).await {
                failures += 1;
            }
        }
        failures
    }

    /// 单次运行, 失败只记录不抛出
    async fn run_once(&mut self, name: &str, scenario: &dyn Scenario, repetition: u32) -> bool {
        self.run_index += 1;
        let run_index = self.run_index;
        let (data_log_file, capture_file) = self.output_paths(name, run_index);

        info!("运行场景 {} (第 {} 次, 序号 {})", name, repetition, run_index);
        let started_at = Utc::now();
        let clock = Instant::now();

        let run_config = self
            .config
            .run_configuration(data_log_file.clone(), capture_file.clone());
        let result = self.execute(scenario, run_config).await;

        let outcome = ScenarioOutcome {
            name: name.to_string(),
            repetition,
            run_index,
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(ErrorDescriptor::from),
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            events_invoked: self.driver.invoked_events().len(),
            data_log_file,
            capture_file,
        };

        match &result {
            Ok(()) => info!("场景 {} 运行成功", name),
            Err(e) => error!("场景 {} 运行失败: {}", name, e),
        }

        self.outcomes.push(outcome);
        result.is_ok()
    }

    /// initialize -> run -> finalize
    ///
    /// 运行失败时先强制停止设备资源再收尾; 收尾失败不覆盖原始错误。
    async fn execute(
        &mut self,
        scenario: &dyn Scenario,
        run_config: RunConfiguration,
    ) -> std::result::Result<(), ExecutorError> {
        tokio::fs::create_dir_all(&self.config.output.dir).await?;
        self.driver.configure(run_config)?;

        let run_result = match self.driver.initialize(scenario).await {
            Ok(()) => self.driver.run().await,
            Err(e) => Err(e),
        };

        if run_result.is_err() {
            self.driver.abort().await;
        }

        let finalize_result = self.driver.finalize(scenario).await;

        match (run_result, finalize_result) {
            (Err(e), Err(cleanup)) => {
                warn!("收尾失败: {}", cleanup);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// 生成本次运行的输出文件名 (场景名 + 时间戳 + 运行序号)
    fn output_paths(&self, name: &str, run_index: u64) -> (PathBuf, PathBuf) {
        let stem = format!(
            "{}_{}_r{:04}",
            sanitize(name),
            Utc::now().format("%Y%m%d-%H%M%S"),
            run_index
        );
        let dir = &self.config.output.dir;
        (
            dir.join(format!("{}_datalog.csv", stem)),
            dir.join(format!("{}_capture.csv", stem)),
        )
    }

    // ============================================
    // 批次结果
    // ============================================

    pub fn get_outcomes(&self) -> &[ScenarioOutcome] {
        &self.outcomes
    }

    /// 清空结果并开始新批次
    pub fn clear_outcomes(&mut self) {
        self.outcomes.clear();
        self.batch_id = Uuid::new_v4();
        self.batch_started = Utc::now();
    }

    /// 生成批次报告
    pub fn report(&self) -> BatchReport {
        BatchReport::new(self.batch_id, self.batch_started, self.outcomes.clone())
    }

    /// 停止仍在运行的仿真
    pub async fn shutdown(&mut self) -> Result<()> {
        let simulation = self.session.simulation.clone();
        if simulation
            .is_simulation_running()
            .await
            .map_err(ExecutorError::from)?
        {
            info!("关闭前停止仿真");
            simulation
                .stop_simulation()
                .await
                .map_err(ExecutorError::from)?;
        }
        Ok(())
    }
}

/// 文件名中只保留字母、数字和 `_.-`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("fault A-B"), "fault_A-B");
        assert_eq!(sanitize("load/step:1"), "load_step_1");
        assert_eq!(sanitize("故障"), "__");
        assert_eq!(sanitize("ok_1.2"), "ok_1.2");
    }
}
