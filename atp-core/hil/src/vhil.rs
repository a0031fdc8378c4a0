//! 虚拟 HIL
//!
//! 纯软件的设备替身:
//! - 仿真时钟只在被读取时推进 (步进模式) 或按墙钟推进 (实时模式)
//! - 数据记录器在每次时间推进时对信号采样，停止时写出 CSV
//! - 采集在到达 execute_at 后按抽取间隔采样，采满或被硬停止时写出 CSV
//! - 可注入故障，并记录全部生命周期调用供测试核对顺序

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    CaptureControl, CaptureSettings, DataLoggerControl, HilError, Result, SimulationControl,
};

/// 默认模型步长 (秒)
const DEFAULT_TIMESTEP: f64 = 20e-6;

/// 时钟模式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockMode {
    /// 运行中每次读取时间推进固定增量 (秒)
    Stepped { increment: f64 },

    /// 仿真时间 = 启动后的墙钟时间 * rate
    RealTime { rate: f64 },
}

impl Default for ClockMode {
    fn default() -> Self {
        ClockMode::Stepped { increment: 1e-3 }
    }
}

/// 故障注入
#[derive(Debug, Clone, Default)]
pub struct VhilFaults {
    /// 仿真时间到达该值时设备自行停止
    pub halt_at: Option<f64>,

    /// 停止仿真时返回通信错误
    pub fail_stop_simulation: bool,

    /// 拒绝启动采集
    pub reject_capture: bool,

    /// 拒绝注册/启动记录器
    pub reject_logger_start: bool,

    /// 拒绝停止记录器
    pub reject_logger_stop: bool,

    /// 拒绝写入的输入名
    pub rejected_inputs: Vec<String>,
}

impl VhilFaults {
    pub fn halt_at(mut self, time: f64) -> Self {
        self.halt_at = Some(time);
        self
    }

    pub fn fail_stop_simulation(mut self) -> Self {
        self.fail_stop_simulation = true;
        self
    }

    pub fn reject_capture(mut self) -> Self {
        self.reject_capture = true;
        self
    }

    pub fn reject_logger_start(mut self) -> Self {
        self.reject_logger_start = true;
        self
    }

    pub fn reject_logger_stop(mut self) -> Self {
        self.reject_logger_stop = true;
        self
    }

    pub fn reject_input(mut self, name: &str) -> Self {
        self.rejected_inputs.push(name.to_string());
        self
    }
}

type Rows = Vec<(f64, Vec<f64>)>;

struct LoggerState {
    file: PathBuf,
    signals: Vec<String>,
    active: bool,
    rows: Rows,
}

struct CaptureState {
    settings: CaptureSettings,
    next_sample: f64,
    rows: Rows,
    finished: bool,
}

impl CaptureState {
    fn channels(&self) -> Vec<String> {
        self.settings
            .analog_channels
            .iter()
            .chain(self.settings.digital_channels.iter())
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct State {
    running: bool,
    time: f64,
    started_at: Option<Instant>,
    inputs: HashMap<String, f64>,
    input_writes: Vec<(f64, String, f64)>,
    loggers: HashMap<String, LoggerState>,
    capture: Option<CaptureState>,
    calls: Vec<String>,
}

/// 虚拟 HIL 设备
pub struct VirtualHil {
    clock: ClockMode,
    timestep: f64,
    faults: VhilFaults,
    state: Mutex<State>,
}

impl VirtualHil {
    /// 创建虚拟设备
    pub fn new(clock: ClockMode) -> Self {
        Self {
            clock,
            timestep: DEFAULT_TIMESTEP,
            faults: VhilFaults::default(),
            state: Mutex::new(State::default()),
        }
    }

    /// 设置模型步长
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        if timestep.is_finite() && timestep > 0.0 {
            self.timestep = timestep;
        } else {
            warn!("忽略无效的模型步长: {}", timestep);
        }
        self
    }

    /// 设置故障注入
    pub fn with_faults(mut self, faults: VhilFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// 生命周期调用记录 (按发生顺序)
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// 读取输入当前值
    pub async fn input(&self, name: &str) -> Option<f64> {
        self.state.lock().await.inputs.get(name).copied()
    }

    /// 输入写入历史 (仿真时间, 名称, 值)
    pub async fn input_writes(&self) -> Vec<(f64, String, f64)> {
        self.state.lock().await.input_writes.clone()
    }

    /// 不推进时钟读取当前仿真时间
    pub async fn peek_time(&self) -> f64 {
        self.state.lock().await.time
    }

    /// 直接置位运行状态, 模拟带外启动/停止
    pub async fn set_running(&self, running: bool) {
        let mut state = self.state.lock().await;
        state.running = running;
        if running && state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
    }

    /// 已注册的记录器名
    pub async fn logger_names(&self) -> Vec<String> {
        self.state.lock().await.loggers.keys().cloned().collect()
    }

    async fn advance(&self, state: &mut State) -> Result<()> {
        if !state.running {
            return Ok(());
        }

        state.time = match self.clock {
            ClockMode::Stepped { increment } => state.time + increment,
            ClockMode::RealTime { rate } => state
                .started_at
                .map(|start| start.elapsed().as_secs_f64() * rate)
                .unwrap_or(state.time),
        };

        if let Some(halt) = self.faults.halt_at {
            if state.time >= halt {
                warn!("虚拟 HIL 在 {:.6}s 停止运行", state.time);
                state.running = false;
                state.calls.push("halt".to_string());
            }
        }

        let now = state.time;
        for logger in state.loggers.values_mut().filter(|l| l.active) {
            let values = logger
                .signals
                .iter()
                .map(|s| state.inputs.get(s).copied().unwrap_or(0.0))
                .collect();
            logger.rows.push((now, values));
        }

        let mut completed = None;
        if let Some(capture) = state.capture.as_mut().filter(|c| !c.finished) {
            let interval = f64::from(capture.settings.decimation.max(1)) * self.timestep;
            let channels = capture.channels();
            while capture.next_sample <= now
                && (capture.rows.len() as u64) < capture.settings.sample_count
            {
                let values = channels
                    .iter()
                    .map(|s| state.inputs.get(s).copied().unwrap_or(0.0))
                    .collect();
                capture.rows.push((capture.next_sample, values));
                capture.next_sample += interval;
            }
            if capture.rows.len() as u64 >= capture.settings.sample_count {
                capture.finished = true;
                completed = Some((capture.settings.output_file.clone(), channels));
            }
        }

        if let Some((file, channels)) = completed {
            if let Some(capture) = state.capture.as_ref() {
                info!("采集完成: {} 个采样点", capture.rows.len());
                write_csv(&file, &channels, &capture.rows).await?;
            }
        }

        Ok(())
    }
}

impl Default for VirtualHil {
    fn default() -> Self {
        Self::new(ClockMode::default())
    }
}

#[async_trait]
impl SimulationControl for VirtualHil {
    async fn start_simulation(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("start_simulation".to_string());
        if state.running {
            return Ok(false);
        }
        state.running = true;
        state.time = 0.0;
        state.started_at = Some(Instant::now());
        debug!("虚拟 HIL 仿真启动");
        Ok(true)
    }

    async fn stop_simulation(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("stop_simulation".to_string());
        if self.faults.fail_stop_simulation {
            return Err(HilError::CommunicationFailed(
                "停止仿真命令无响应".to_string(),
            ));
        }
        state.running = false;
        debug!("虚拟 HIL 仿真停止于 {:.6}s", state.time);
        Ok(true)
    }

    async fn is_simulation_running(&self) -> Result<bool> {
        Ok(self.state.lock().await.running)
    }

    async fn simulation_time(&self) -> Result<f64> {
        let mut state = self.state.lock().await;
        self.advance(&mut state).await?;
        Ok(state.time)
    }

    async fn simulation_step(&self) -> Result<u64> {
        let state = self.state.lock().await;
        Ok((state.time / self.timestep).floor() as u64)
    }

    async fn set_input_value(&self, name: &str, value: f64) -> Result<bool> {
        if self.faults.rejected_inputs.iter().any(|n| n == name) {
            return Ok(false);
        }
        let mut state = self.state.lock().await;
        let time = state.time;
        state.inputs.insert(name.to_string(), value);
        state.input_writes.push((time, name.to_string(), value));
        Ok(true)
    }
}

#[async_trait]
impl CaptureControl for VirtualHil {
    async fn start_capture(&self, settings: &CaptureSettings) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("start_capture".to_string());
        if self.faults.reject_capture {
            return Ok(false);
        }
        if state.capture.as_ref().is_some_and(|c| !c.finished) {
            warn!("已有采集在进行中");
            return Ok(false);
        }
        state.capture = Some(CaptureState {
            settings: settings.clone(),
            next_sample: settings.execute_at,
            rows: Vec::new(),
            finished: false,
        });
        Ok(true)
    }

    async fn stop_capture(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("stop_capture".to_string());
        if let Some(capture) = state.capture.take() {
            if !capture.finished {
                write_csv(
                    &capture.settings.output_file,
                    &capture.channels(),
                    &capture.rows,
                )
                .await?;
            }
        }
        Ok(true)
    }

    async fn capture_in_progress(&self) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.capture.as_ref().is_some_and(|c| !c.finished))
    }
}

#[async_trait]
impl DataLoggerControl for VirtualHil {
    async fn add_logger(&self, name: &str, file: &Path, signals: &[String]) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("add_logger".to_string());
        if self.faults.reject_logger_start {
            return Ok(false);
        }
        state.loggers.insert(
            name.to_string(),
            LoggerState {
                file: file.to_path_buf(),
                signals: signals.to_vec(),
                active: false,
                rows: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn start_logger(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("start_logger".to_string());
        if self.faults.reject_logger_start {
            return Ok(false);
        }
        match state.loggers.get_mut(name) {
            Some(logger) => {
                logger.active = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stop_logger(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("stop_logger".to_string());
        if self.faults.reject_logger_stop {
            return Ok(false);
        }
        match state.loggers.get_mut(name) {
            Some(logger) if logger.active => {
                logger.active = false;
                write_csv(&logger.file, &logger.signals, &logger.rows).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_logger(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.calls.push("remove_logger".to_string());
        Ok(state.loggers.remove(name).is_some())
    }
}

async fn write_csv(path: &Path, columns: &[String], rows: &[(f64, Vec<f64>)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut out = String::from("time");
    for column in columns {
        out.push(',');
        out.push_str(column);
    }
    out.push('\n');
    for (time, values) in rows {
        out.push_str(&format!("{:.6}", time));
        for value in values {
            out.push_str(&format!(",{}", value));
        }
        out.push('\n');
    }

    tokio::fs::write(path, out).await?;
    debug!("写出 {} 行到 {:?}", rows.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureTrigger;

    fn stepped(increment: f64) -> VirtualHil {
        VirtualHil::new(ClockMode::Stepped { increment })
    }

    #[tokio::test]
    async fn test_stepped_clock_only_advances_while_running() {
        let hil = stepped(0.5);
        assert_eq!(hil.simulation_time().await.unwrap(), 0.0);

        assert!(hil.start_simulation().await.unwrap());
        assert_eq!(hil.simulation_time().await.unwrap(), 0.5);
        assert_eq!(hil.simulation_time().await.unwrap(), 1.0);
        assert_eq!(hil.peek_time().await, 1.0);
        assert_eq!(hil.peek_time().await, 1.0);

        hil.stop_simulation().await.unwrap();
        assert_eq!(hil.simulation_time().await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let hil = stepped(0.5);
        assert!(hil.start_simulation().await.unwrap());
        assert!(!hil.start_simulation().await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_resets_time() {
        let hil = stepped(0.25);
        hil.start_simulation().await.unwrap();
        hil.simulation_time().await.unwrap();
        hil.stop_simulation().await.unwrap();
        hil.start_simulation().await.unwrap();
        assert_eq!(hil.simulation_time().await.unwrap(), 0.25);
    }

    #[tokio::test]
    async fn test_halt_fault() {
        let hil = stepped(1.0).with_faults(VhilFaults::default().halt_at(2.0));
        hil.start_simulation().await.unwrap();
        hil.simulation_time().await.unwrap();
        assert!(hil.is_simulation_running().await.unwrap());
        hil.simulation_time().await.unwrap();
        assert!(!hil.is_simulation_running().await.unwrap());
        assert_eq!(hil.calls().await.last().map(String::as_str), Some("halt"));
    }

    #[tokio::test]
    async fn test_rejected_input() {
        let hil = stepped(1.0).with_faults(VhilFaults::default().reject_input("Sw_ctrl"));
        assert!(!hil.set_input_value("Sw_ctrl", 1.0).await.unwrap());
        assert!(hil.set_input_value("Fault_Ctrl", 3.0).await.unwrap());
        assert_eq!(hil.input("Fault_Ctrl").await, Some(3.0));
        assert_eq!(hil.input("Sw_ctrl").await, None);
    }

    #[tokio::test]
    async fn test_capture_completes_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("capture.csv");
        let hil = stepped(0.25).with_timestep(0.125);

        let settings = CaptureSettings {
            decimation: 1,
            analog_channels: vec!["Va".to_string()],
            digital_channels: vec![],
            sample_count: 4,
            start_step: 8,
            execute_at: 1.0,
            trigger: CaptureTrigger::Forced,
            output_file: file.clone(),
        };
        assert!(hil.start_capture(&settings).await.unwrap());
        hil.start_simulation().await.unwrap();

        // 0.25, 0.5, 0.75, 1.0 (1 个点), 1.25 (3 个点), 1.5 (4 个点, 完成)
        for _ in 0..5 {
            hil.simulation_time().await.unwrap();
            assert!(hil.capture_in_progress().await.unwrap());
        }
        hil.simulation_time().await.unwrap();
        assert!(!hil.capture_in_progress().await.unwrap());

        let content = std::fs::read_to_string(&file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "time,Va");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "1.000000,0");
    }

    #[tokio::test]
    async fn test_logger_writes_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out").join("log.csv");
        let hil = stepped(1.0);
        let signals = vec!["Gen_On".to_string()];

        assert!(hil.add_logger("DATA_LOGGER", &file, &signals).await.unwrap());
        assert!(hil.start_logger("DATA_LOGGER").await.unwrap());
        assert_eq!(hil.logger_names().await, vec!["DATA_LOGGER".to_string()]);
        hil.start_simulation().await.unwrap();
        hil.set_input_value("Gen_On", 1.0).await.unwrap();
        hil.simulation_time().await.unwrap();
        hil.simulation_time().await.unwrap();
        assert!(hil.stop_logger("DATA_LOGGER").await.unwrap());
        assert!(hil.remove_logger("DATA_LOGGER").await.unwrap());
        assert!(hil.logger_names().await.is_empty());

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, "time,Gen_On\n1.000000,1\n2.000000,1\n");
    }

    #[tokio::test]
    async fn test_stop_logger_unknown_name() {
        let hil = VirtualHil::default();
        assert!(!hil.stop_logger("missing").await.unwrap());
    }
}
