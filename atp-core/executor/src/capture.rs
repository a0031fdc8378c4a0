//! 采集与数据记录器协调
//!
//! 采集窗口和数据记录器会话的生命周期都绑定在一次场景运行上:
//! 采集在 setup 中预约, 记录器在 run 中启动, 两者都在 finalize 中停止。

use atp_hil::{CaptureSettings, CaptureTrigger};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::driver::{SimulationDriver, DATA_LOGGER_NAME};
use crate::run_config::RunConfiguration;
use crate::{ExecutorError, Result};

/// 设备要求的最小采样点数
pub const MIN_CAPTURE_SAMPLES: u64 = 256;

/// 数字量采集通道上限
pub const MAX_DIGITAL_CHANNELS: usize = 32;

/// 等待采集完成的轮询间隔
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 采集计划
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePlan {
    /// 起始仿真步
    pub start_step: u64,

    /// 请求的结束仿真步
    pub end_step: u64,

    /// 采样点数 (偶数, 不少于最小值)
    pub sample_count: u64,

    /// 抽取因子
    pub decimation: u32,

    /// 起始仿真时间 (秒)
    pub execute_at: f64,

    /// 是否因点数不足被延长
    pub extended: bool,
}

impl CapturePlan {
    /// 实际采集时长 (秒)
    pub fn duration(&self, timestep: f64) -> f64 {
        self.sample_count as f64 * f64::from(self.decimation) * timestep
    }
}

/// 计算采集计划
///
/// 起止时间经 [`RunConfiguration::simtime_to_simstep`] 换算为仿真步。
/// 点数不足最小值时自动延长, 奇数点数加一。
pub fn plan_capture(
    start_time: f64,
    duration: f64,
    decimation: u32,
    config: &RunConfiguration,
) -> Result<CapturePlan> {
    if !start_time.is_finite() || start_time <= 0.0 {
        return Err(ExecutorError::CaptureStart(format!(
            "采集起始时间必须大于 0: {}",
            start_time
        )));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ExecutorError::CaptureStart(format!(
            "采集时长必须大于 0: {}",
            duration
        )));
    }
    if decimation < 1 {
        return Err(ExecutorError::CaptureStart(
            "抽取因子必须不小于 1".to_string(),
        ));
    }
    if config.digital_signals.len() > MAX_DIGITAL_CHANNELS {
        return Err(ExecutorError::CaptureStart(format!(
            "数字量通道数 {} 超过上限 {}",
            config.digital_signals.len(),
            MAX_DIGITAL_CHANNELS
        )));
    }
    config
        .check_timestep()
        .map_err(|e| ExecutorError::CaptureStart(e.to_string()))?;
    if config.analog_signals.is_empty() && config.digital_signals.is_empty() {
        return Err(ExecutorError::CaptureStart(
            "未配置任何采集信号".to_string(),
        ));
    }

    let to_step = |time: f64| {
        config
            .simtime_to_simstep(time)
            .map_err(|e| ExecutorError::CaptureStart(e.to_string()))
    };
    let start_step = to_step(start_time)?;
    let end_step = to_step(start_time + duration)?;
    let mut sample_count = end_step.saturating_sub(start_step) / u64::from(decimation);

    let mut extended = false;
    if sample_count < MIN_CAPTURE_SAMPLES {
        warn!(
            "采集点数 {} 少于最小值 {}, 延长采集时长",
            sample_count, MIN_CAPTURE_SAMPLES
        );
        sample_count = MIN_CAPTURE_SAMPLES;
        extended = true;
    }
    if sample_count % 2 == 1 {
        sample_count += 1;
    }

    Ok(CapturePlan {
        start_step,
        end_step,
        sample_count,
        decimation,
        execute_at: start_time,
        extended,
    })
}

impl SimulationDriver {
    /// 预约采集窗口
    pub async fn schedule_capture(
        &mut self,
        start_time: f64,
        duration: f64,
        decimation: u32,
    ) -> Result<CapturePlan> {
        let plan = plan_capture(start_time, duration, decimation, self.config())?;
        let settings = CaptureSettings {
            decimation: plan.decimation,
            analog_channels: self.config().analog_signals.clone(),
            digital_channels: self.config().digital_signals.clone(),
            sample_count: plan.sample_count,
            start_step: plan.start_step,
            execute_at: plan.execute_at,
            trigger: CaptureTrigger::Forced,
            output_file: self.config().capture_file.clone(),
        };

        let capture = self.session().capture.clone();
        if !capture.start_capture(&settings).await? {
            return Err(ExecutorError::CaptureStart(format!(
                "设备拒绝采集请求: {:?}",
                settings.output_file
            )));
        }
        self.capture_armed = true;

        info!(
            "采集已预约: {:.6}s 起 {} 个采样点 (抽取 {}), 输出 {:?}",
            plan.execute_at, plan.sample_count, plan.decimation, settings.output_file
        );
        Ok(plan)
    }

    /// 按配置的采样率预约采集窗口
    pub async fn schedule_capture_at_sample_rate(
        &mut self,
        start_time: f64,
        duration: f64,
    ) -> Result<CapturePlan> {
        let decimation = self
            .config()
            .decimation_for_sample_rate()
            .map_err(|e| ExecutorError::CaptureStart(e.to_string()))?;
        self.schedule_capture(start_time, duration, decimation).await
    }

    /// 停止采集
    ///
    /// `timeout` 非零时先等待采集自然结束, 超时、结束或查询失败后都发出硬停止。
    /// 查询失败时在硬停止之后返回查询错误。
    pub async fn stop_capture(&mut self, timeout: Duration) -> Result<()> {
        let capture = self.session().capture.clone();
        let mut poll_error = None;

        if !timeout.is_zero() {
            let deadline = Instant::now() + timeout;
            let mut completed = false;
            loop {
                match capture.capture_in_progress().await {
                    Ok(false) => {
                        completed = true;
                        break;
                    }
                    Ok(true) => {}
                    Err(e) => {
                        warn!("查询采集状态失败, 强制停止: {}", e);
                        poll_error = Some(ExecutorError::from(e));
                        break;
                    }
                }
                if Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(CAPTURE_POLL_INTERVAL).await;
            }
            if !completed && poll_error.is_none() {
                warn!("采集在 {:?} 内未完成, 强制停止", timeout);
            }
        }

        self.capture_armed = false;
        if !capture.stop_capture().await? {
            return Err(ExecutorError::CaptureStop(
                "设备拒绝停止采集".to_string(),
            ));
        }
        debug!("采集已停止");
        match poll_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 注册并启动数据记录器, 未配置信号时跳过
    pub(crate) async fn start_data_logger(&mut self) -> Result<()> {
        if self.config().data_logger_signals.is_empty() {
            debug!("未配置数据记录信号, 跳过数据记录器");
            return Ok(());
        }

        let logger = self.session().data_logger.clone();
        let file = self.config().data_log_file.clone();
        let signals = self.config().data_logger_signals.clone();

        if !logger.add_logger(DATA_LOGGER_NAME, &file, &signals).await? {
            return Err(ExecutorError::DataLogger(format!(
                "注册数据记录器失败: {:?}",
                file
            )));
        }
        self.logger_registered = true;

        if !logger.start_logger(DATA_LOGGER_NAME).await? {
            return Err(ExecutorError::DataLogger(
                "启动数据记录器失败".to_string(),
            ));
        }

        info!("数据记录器已启动: {} 个信号, 输出 {:?}", signals.len(), file);
        Ok(())
    }

    /// 停止并注销数据记录器, 失败只记录日志
    pub(crate) async fn stop_data_logger(&mut self) {
        if !self.logger_registered {
            return;
        }
        self.logger_registered = false;

        let logger = self.session().data_logger.clone();
        match logger.stop_logger(DATA_LOGGER_NAME).await {
            Ok(true) => info!("数据记录器已停止"),
            Ok(false) => error!("数据记录器停止失败"),
            Err(e) => error!("数据记录器停止失败: {}", e),
        }
        if let Err(e) = logger.remove_logger(DATA_LOGGER_NAME).await {
            warn!("注销数据记录器失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2^-16 秒步长, 时间与步数换算无舍入误差
    const TIMESTEP: f64 = 1.0 / 65536.0;

    fn config() -> RunConfiguration {
        RunConfiguration {
            analog_signals: vec!["Va".to_string(), "Vb".to_string()],
            digital_signals: vec!["Breaker".to_string()],
            timestep: TIMESTEP,
            ..Default::default()
        }
    }

    fn samples(n: u64) -> f64 {
        n as f64 * TIMESTEP
    }

    #[test]
    fn test_short_capture_extended_to_minimum() {
        let plan = plan_capture(1.0, samples(255), 1, &config()).unwrap();
        assert_eq!(plan.start_step, 65536);
        assert_eq!(plan.sample_count, 256);
        assert!(plan.extended);
    }

    #[test]
    fn test_odd_sample_count_made_even() {
        let plan = plan_capture(1.0, samples(301), 1, &config()).unwrap();
        assert_eq!(plan.sample_count, 302);
        assert!(!plan.extended);

        let plan = plan_capture(1.0, samples(400), 1, &config()).unwrap();
        assert_eq!(plan.sample_count, 400);
    }

    #[test]
    fn test_decimation_divides_sample_count() {
        let plan = plan_capture(0.5, samples(2000), 4, &config()).unwrap();
        assert_eq!(plan.sample_count, 500);
        assert_eq!(plan.duration(TIMESTEP), samples(2000));
    }

    #[test]
    fn test_sample_count_always_even_and_above_minimum() {
        for n in [1u64, 17, 255, 256, 257, 511, 1023, 4099] {
            let plan = plan_capture(0.25, samples(n), 1, &config()).unwrap();
            assert!(plan.sample_count >= MIN_CAPTURE_SAMPLES);
            assert_eq!(plan.sample_count % 2, 0);
        }
    }

    #[test]
    fn test_plan_steps_match_time_conversion() {
        let cfg = config();
        let plan = plan_capture(0.3, 0.01, 1, &cfg).unwrap();
        assert_eq!(plan.start_step, cfg.simtime_to_simstep(0.3).unwrap());
        assert_eq!(plan.end_step, cfg.simtime_to_simstep(0.3 + 0.01).unwrap());
    }

    #[test]
    fn test_invalid_requests() {
        let cfg = config();
        assert!(plan_capture(0.0, 1.0, 1, &cfg).is_err());
        assert!(plan_capture(1.0, 0.0, 1, &cfg).is_err());
        assert!(plan_capture(1.0, -1.0, 1, &cfg).is_err());
        assert!(plan_capture(1.0, 1.0, 0, &cfg).is_err());

        let mut cfg = config();
        cfg.digital_signals = (0..33).map(|i| format!("D{}", i)).collect();
        assert!(matches!(
            plan_capture(1.0, 1.0, 1, &cfg),
            Err(ExecutorError::CaptureStart(_))
        ));

        let mut cfg = config();
        cfg.timestep = 0.0;
        assert!(matches!(
            plan_capture(1.0, 1.0, 1, &cfg),
            Err(ExecutorError::CaptureStart(_))
        ));

        let mut cfg = config();
        cfg.analog_signals.clear();
        cfg.digital_signals.clear();
        assert!(plan_capture(1.0, 1.0, 1, &cfg).is_err());
    }
}
