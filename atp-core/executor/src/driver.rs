//! 仿真驱动器
//!
//! 把一个场景绑定到一台运行中的外部仿真设备上, 并带它走完一个有界的时间窗口:
//!
//! ```text
//! Idle --initialize--> Initializing --run--> Running --finalize--> Stopping --> Idle
//! ```
//!
//! 轮询循环每轮读取一次外部仿真时间, 执行所有已到期的事件, 直到停止信号置位。

use atp_hil::HilSession;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::event::{CallbackEvent, ScheduledEvent, SetInputEvent, SimEvent, StopEvent};
use crate::run_config::RunConfiguration;
use crate::scenario::Scenario;
use crate::schedule::EventSchedule;
use crate::{ExecutorError, Result};

/// 设备端数据记录器名称
pub const DATA_LOGGER_NAME: &str = "DATA_LOGGER";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// 驱动器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Idle,
    Initializing,
    Running,
    Stopping,
}

/// 已执行事件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 计划触发时间
    pub due_time: f64,

    /// 实际执行时观测到的仿真时间
    pub observed_time: f64,

    /// 事件描述
    pub description: String,
}

/// 仿真驱动器
pub struct SimulationDriver {
    /// 设备会话
    session: HilSession,

    /// 当前运行配置
    config: RunConfiguration,

    /// 事件队列
    schedule: EventSchedule,

    state: DriverState,
    stop_signal: bool,

    /// 场景声明的时长 (秒)
    duration: f64,

    /// 最近一次观测到的仿真时间
    last_time: f64,

    /// 本次运行已执行的事件
    invoked: Vec<EventRecord>,

    /// 设备上有已预约的采集
    pub(crate) capture_armed: bool,

    /// 设备上注册了数据记录器
    pub(crate) logger_registered: bool,

    /// 轮询间隔, 为零时只让出调度
    poll_interval: Duration,

    /// 进度日志间隔
    update_interval: Duration,

    /// finalize 时等待采集完成的时长
    capture_stop_timeout: Duration,

    /// 单次运行的墙钟时间上限
    run_timeout: Option<Duration>,

    run_started: Option<Instant>,
    run_deadline: Option<tokio::time::Instant>,
}

impl SimulationDriver {
    /// 创建驱动器
    pub fn new(session: HilSession, config: RunConfiguration) -> Self {
        Self {
            session,
            config,
            schedule: EventSchedule::new(),
            state: DriverState::Idle,
            stop_signal: false,
            duration: 0.0,
            last_time: 0.0,
            invoked: Vec::new(),
            capture_armed: false,
            logger_registered: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            capture_stop_timeout: DEFAULT_CAPTURE_STOP_TIMEOUT,
            run_timeout: None,
            run_started: None,
            run_deadline: None,
        }
    }

    /// 设置轮询间隔
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 设置进度日志间隔
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// 设置采集停止等待时长
    pub fn with_capture_stop_timeout(mut self, timeout: Duration) -> Self {
        self.capture_stop_timeout = timeout;
        self
    }

    /// 设置单次运行墙钟时间上限
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// 替换运行配置, 运行中不允许
    pub fn configure(&mut self, config: RunConfiguration) -> Result<()> {
        if matches!(self.state, DriverState::Running | DriverState::Stopping) {
            return Err(ExecutorError::InvalidState(format!(
                "运行中不能修改配置: {:?}",
                self.state
            )));
        }
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn session(&self) -> &HilSession {
        &self.session
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    // ============================================
    // 场景回调接口
    // ============================================

    /// 声明场景时长, 必须为正数
    pub fn declare_duration(&mut self, duration: f64) -> Result<()> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ExecutorError::ScenarioContract(format!(
                "场景时长必须大于 0: {}",
                duration
            )));
        }
        self.duration = duration;
        Ok(())
    }

    pub fn declared_duration(&self) -> f64 {
        self.duration
    }

    pub fn set_stop_signal(&mut self) {
        self.stop_signal = true;
    }

    pub fn clear_stop_signal(&mut self) {
        self.stop_signal = false;
    }

    pub fn stop_signal(&self) -> bool {
        self.stop_signal
    }

    /// 调度事件
    pub fn schedule_event(
        &mut self,
        time: f64,
        description: &str,
        action: Box<dyn SimEvent>,
    ) -> Result<()> {
        debug!("调度事件 [{:.6}] {}", time, description);
        self.schedule.add(time, description, action)
    }

    /// 调度同步回调
    pub fn schedule_callback<F>(&mut self, time: f64, description: &str, callback: F) -> Result<()>
    where
        F: Fn(&mut SimulationDriver) -> Result<()> + Send + Sync + 'static,
    {
        self.schedule_event(time, description, Box::new(CallbackEvent::new(callback)))
    }

    /// 调度 SCADA 输入写入
    pub fn schedule_input(&mut self, time: f64, name: &str, value: f64) -> Result<()> {
        let description = format!("设置 {} = {}", name, value);
        self.schedule_event(time, &description, Box::new(SetInputEvent::new(name, value)))
    }

    /// 丢弃所有待执行事件, 包括时长结束事件
    ///
    /// 下一轮轮询发现队列为空即结束运行。
    pub fn cancel_pending_events(&mut self) {
        info!("取消 {} 个待执行事件", self.schedule.count());
        self.schedule.clear();
    }

    /// 待执行事件数
    pub fn pending_events(&self) -> usize {
        self.schedule.count()
    }

    /// 待执行事件 (时间, 描述)
    pub fn pending(&self) -> Vec<(f64, String)> {
        self.schedule.pending()
    }

    /// 本次运行已执行的事件
    pub fn invoked_events(&self) -> &[EventRecord] {
        &self.invoked
    }

    /// 最近一次观测到的仿真时间
    pub fn current_time(&self) -> f64 {
        self.last_time
    }

    /// 读取设备仿真时间
    pub async fn simulation_time(&mut self) -> Result<f64> {
        let time = self.session.simulation.simulation_time().await?;
        self.last_time = time;
        Ok(time)
    }

    /// 写 SCADA 输入, 设备拒绝时失败
    pub async fn set_input_value(&mut self, name: &str, value: f64) -> Result<()> {
        if !self.session.simulation.set_input_value(name, value).await? {
            return Err(ExecutorError::InputRejected {
                name: name.to_string(),
                value,
            });
        }
        Ok(())
    }

    /// 立即执行一个动作, 与调度事件走相同的日志和失败路径
    pub async fn invoke_now(&mut self, description: &str, action: Box<dyn SimEvent>) -> Result<()> {
        let event = ScheduledEvent::new(self.last_time, description, action)?;
        let observed = self.last_time;
        self.invoke(event, observed).await
    }

    // ============================================
    // 生命周期
    // ============================================

    fn reset(&mut self) {
        self.schedule.clear();
        self.stop_signal = false;
        self.duration = 0.0;
        self.last_time = 0.0;
        self.invoked.clear();
        self.run_started = None;
        self.run_deadline = None;
    }

    /// 绑定场景: 清空状态, 执行 setup, 预约时长结束事件
    pub async fn initialize(&mut self, scenario: &dyn Scenario) -> Result<()> {
        if matches!(self.state, DriverState::Running | DriverState::Stopping) {
            return Err(ExecutorError::InvalidState(format!(
                "驱动器正忙: {:?}",
                self.state
            )));
        }

        self.reset();
        self.state = DriverState::Initializing;

        let result = self.setup_scenario(scenario).await;
        if result.is_err() {
            self.state = DriverState::Idle;
        }
        result
    }

    async fn setup_scenario(&mut self, scenario: &dyn Scenario) -> Result<()> {
        if let Err(e) = scenario.setup(self).await {
            error!("场景 setup 失败: {}", e);
            return Err(e);
        }

        if self.duration <= 0.0 {
            return Err(ExecutorError::ScenarioContract(
                "setup 未声明有效的场景时长".to_string(),
            ));
        }

        self.schedule
            .add(self.duration, "场景时长结束", Box::new(StopEvent))?;

        info!(
            "场景已初始化: 时长 {:.3}s, 待执行事件 {} 个",
            self.duration,
            self.schedule.count()
        );
        Ok(())
    }

    /// 启动数据记录器和仿真时钟, 进入轮询循环
    pub async fn run(&mut self) -> Result<()> {
        if self.state != DriverState::Initializing {
            return Err(ExecutorError::InvalidState(format!(
                "run() 之前必须成功 initialize(), 当前状态: {:?}",
                self.state
            )));
        }

        self.state = DriverState::Running;
        self.run_started = Some(Instant::now());
        self.run_deadline = self
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        self.start_data_logger().await?;

        let simulation = self.session.simulation.clone();
        if simulation.is_simulation_running().await? {
            return Err(ExecutorError::Startup("仿真已在运行".to_string()));
        }
        if !simulation.start_simulation().await? {
            return Err(ExecutorError::Startup("设备拒绝启动仿真".to_string()));
        }
        info!("仿真已启动");

        self.poll_loop().await
    }

    async fn poll_loop(&mut self) -> Result<()> {
        let simulation = self.session.simulation.clone();
        let mut last_update = Instant::now();

        while !self.stop_signal {
            let now = simulation.simulation_time().await?;
            self.last_time = now;

            if !simulation.is_simulation_running().await? && !self.stop_signal {
                error!("仿真在 {:.6}s 被外部停止", now);
                return Err(ExecutorError::UnexpectedStop { sim_time: now });
            }

            if self.schedule.is_empty() {
                info!("事件队列已空, 在 {:.6}s 结束运行", now);
                self.stop_signal = true;
                break;
            }

            self.dispatch_due(now).await?;

            if last_update.elapsed() >= self.update_interval {
                info!("仿真时间: {:.3}s / {:.3}s", now, self.duration);
                last_update = Instant::now();
            }

            if let (Some(deadline), Some(timeout)) = (self.run_deadline, self.run_timeout) {
                if tokio::time::Instant::now() >= deadline {
                    error!("运行超过墙钟时间上限 {:?}", timeout);
                    return Err(ExecutorError::Timeout(timeout));
                }
            }

            if !self.stop_signal {
                if self.poll_interval.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Ok(())
    }

    /// 按顺序执行所有 due_time <= now 的事件
    async fn dispatch_due(&mut self, now: f64) -> Result<()> {
        loop {
            match self.schedule.peek_next_time() {
                Ok(next) if next <= now => {
                    let event = self.schedule.pop_next()?;
                    self.invoke(event, now).await?;
                }
                _ => return Ok(()),
            }
        }
    }

    async fn invoke(&mut self, event: ScheduledEvent, observed_time: f64) -> Result<()> {
        let (due_time, description, action) = event.into_parts();
        info!("[{:.6}] {}", due_time, description);

        self.invoked.push(EventRecord {
            due_time,
            observed_time,
            description: description.clone(),
        });

        if let Err(e) = action.invoke(self).await {
            error!("事件执行失败 [{:.6}] {}: {}", due_time, description, e);
            return Err(ExecutorError::EventFailed {
                time: due_time,
                description,
                source: Box::new(e),
            });
        }
        Ok(())
    }

    /// 收尾: 停止时钟、记录器、采集, 再执行 teardown
    ///
    /// 每一步都会尝试, 返回最后一个失败。
    pub async fn finalize(&mut self, scenario: &dyn Scenario) -> Result<()> {
        self.state = DriverState::Stopping;
        let mut last_error = None;

        if let Err(e) = self.stop_clock().await {
            error!("停止仿真失败: {}", e);
            last_error = Some(e);
        }

        self.stop_data_logger().await;

        if self.capture_armed {
            if let Err(e) = self.stop_capture(self.capture_stop_timeout).await {
                error!("停止采集失败: {}", e);
                last_error = Some(e);
            }
        }

        if let Err(e) = scenario.teardown(self).await {
            error!("场景 teardown 失败: {}", e);
            last_error = Some(e);
        }

        if let Some(started) = self.run_started.take() {
            info!(
                "场景运行结束, 仿真时间 {:.6}s, 耗时 {:.3}s",
                self.last_time,
                started.elapsed().as_secs_f64()
            );
        }
        self.state = DriverState::Idle;

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 强制停止时钟、记录器和采集, 失败只记录日志
    pub async fn abort(&mut self) {
        warn!("强制停止仿真资源");

        if let Err(e) = self.stop_clock().await {
            error!("强制停止仿真失败: {}", e);
        }
        self.stop_data_logger().await;
        if self.capture_armed {
            if let Err(e) = self.stop_capture(Duration::ZERO).await {
                error!("强制停止采集失败: {}", e);
            }
        }
    }

    async fn stop_clock(&mut self) -> Result<()> {
        let simulation = self.session.simulation.clone();
        let running = match simulation.is_simulation_running().await {
            Ok(running) => running,
            Err(e) => {
                warn!("查询仿真状态失败, 仍尝试停止: {}", e);
                true
            }
        };
        if !running {
            return Ok(());
        }

        if !simulation.stop_simulation().await? {
            return Err(ExecutorError::Shutdown("设备拒绝停止仿真".to_string()));
        }
        info!("仿真已停止");
        Ok(())
    }
}

impl std::fmt::Debug for SimulationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationDriver")
            .field("state", &self.state)
            .field("duration", &self.duration)
            .field("stop_signal", &self.stop_signal)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}
