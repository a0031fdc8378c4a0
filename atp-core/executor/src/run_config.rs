//! 单次运行配置
//!
//! 由编排器在每次运行前根据全局配置和唯一文件名生成。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{ExecutorError, Result};

/// 允许的最大模型步长 (秒)
pub const MAX_TIMESTEP: f64 = 20e-6;

/// 单次运行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// 数据记录信号
    pub data_logger_signals: Vec<String>,

    /// 数据记录输出文件
    pub data_log_file: PathBuf,

    /// 采集模拟量信号
    pub analog_signals: Vec<String>,

    /// 采集数字量信号
    pub digital_signals: Vec<String>,

    /// 采集输出文件
    pub capture_file: PathBuf,

    /// 模型步长 (秒)
    pub timestep: f64,

    /// 采集采样率 (Hz)
    pub sample_frequency: f64,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            data_logger_signals: Vec::new(),
            data_log_file: PathBuf::from("datalog.csv"),
            analog_signals: Vec::new(),
            digital_signals: Vec::new(),
            capture_file: PathBuf::from("capture.csv"),
            timestep: MAX_TIMESTEP,
            sample_frequency: 10_000.0,
        }
    }
}

impl RunConfiguration {
    /// 检查模型步长
    pub fn check_timestep(&self) -> Result<f64> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(ExecutorError::ConfigError(format!(
                "模型步长必须为正数: {}",
                self.timestep
            )));
        }
        if self.timestep > MAX_TIMESTEP {
            return Err(ExecutorError::ConfigError(format!(
                "模型步长 {} 超过上限 {}",
                self.timestep, MAX_TIMESTEP
            )));
        }
        Ok(self.timestep)
    }

    /// 仿真时间转仿真步 (向下取整)
    pub fn simtime_to_simstep(&self, time: f64) -> Result<u64> {
        let timestep = self.check_timestep()?;
        if !time.is_finite() || time < 0.0 {
            return Err(ExecutorError::ConfigError(format!("无效的仿真时间: {}", time)));
        }
        Ok((time / timestep).floor() as u64)
    }

    /// 仿真步转仿真时间
    pub fn simstep_to_simtime(&self, step: u64) -> Result<f64> {
        let timestep = self.check_timestep()?;
        Ok(step as f64 * timestep)
    }

    /// 按采样率计算的抽取因子, 至少为 1
    pub fn decimation_for_sample_rate(&self) -> Result<u32> {
        let timestep = self.check_timestep()?;
        if !self.sample_frequency.is_finite() || self.sample_frequency <= 0.0 {
            return Err(ExecutorError::ConfigError(format!(
                "采样率必须为正数: {}",
                self.sample_frequency
            )));
        }
        let decimation = (1.0 / (timestep * self.sample_frequency)).floor();
        Ok((decimation as u32).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timestep: f64) -> RunConfiguration {
        RunConfiguration {
            timestep,
            ..Default::default()
        }
    }

    #[test]
    fn test_time_step_conversion() {
        let config = config(1.0 / 65536.0);
        assert_eq!(config.simtime_to_simstep(1.0).unwrap(), 65536);
        assert_eq!(config.simtime_to_simstep(0.0).unwrap(), 0);
        assert_eq!(config.simstep_to_simtime(32768).unwrap(), 0.5);
    }

    #[test]
    fn test_invalid_timestep() {
        assert!(config(0.0).simtime_to_simstep(1.0).is_err());
        assert!(config(-1e-6).simstep_to_simtime(1).is_err());
        assert!(config(1e-3).simtime_to_simstep(1.0).is_err());
    }

    #[test]
    fn test_decimation_for_sample_rate() {
        let mut config = config(20e-6);
        config.sample_frequency = 10_000.0;
        assert_eq!(config.decimation_for_sample_rate().unwrap(), 5);

        // 采样率高于模型频率时不抽取
        config.sample_frequency = 1_000_000.0;
        assert_eq!(config.decimation_for_sample_rate().unwrap(), 1);

        config.sample_frequency = 0.0;
        assert!(config.decimation_for_sample_rate().is_err());
    }
}
