//! 自动化配置管理
//!
//! 支持从多个源加载配置:
//! - 环境变量 (优先级最高)
//! - 配置文件 (TOML/YAML/JSON)
//! - 默认值 (优先级最低)
//!
//! 配置文件搜索路径 (按优先级):
//! 1. `ATP_CONFIG` 环境变量指定的路径
//! 2. `./atp.toml` / `./atp.yaml` (当前目录)
//! 3. `~/.config/atp/automator.toml` (用户配置目录)
//! 4. `/etc/atp/automator.toml` (系统配置目录)

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::run_config::{RunConfiguration, MAX_TIMESTEP};
use crate::{ExecutorError, Result};

// ============================================
// 核心配置结构
// ============================================

/// 自动化配置 (顶层)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomatorConfig {
    /// 环境配置
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// 模型配置
    #[serde(default)]
    pub model: ModelConfig,

    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,

    /// 数据记录配置
    #[serde(default)]
    pub data_logger: DataLoggerConfig,

    /// 采集配置
    #[serde(default)]
    pub capture: CaptureConfig,

    /// 运行行为配置
    #[serde(default)]
    pub run: RunBehaviorConfig,

    /// 虚拟 HIL 配置
    #[serde(default)]
    pub vhil: VhilConfig,
}

/// 环境配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// 模型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 模型名称
    #[serde(default = "default_model_name")]
    pub name: String,

    /// 模型步长 (秒)
    #[serde(default = "default_timestep")]
    pub timestep: f64,

    /// 采集采样率 (Hz)
    #[serde(default = "default_sample_frequency")]
    pub sample_frequency: f64,
}

/// 输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出目录
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

/// 数据记录配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataLoggerConfig {
    /// 记录信号
    #[serde(default)]
    pub signals: Vec<String>,
}

/// 采集配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// 模拟量信号
    #[serde(default)]
    pub analog_signals: Vec<String>,

    /// 数字量信号
    #[serde(default)]
    pub digital_signals: Vec<String>,

    /// 停止采集时等待完成的时长 (秒)
    #[serde(default = "default_capture_stop_timeout")]
    pub stop_timeout: u64,
}

/// 运行行为配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunBehaviorConfig {
    /// 每个场景的重复次数
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    /// 轮询间隔 (毫秒), 0 表示只让出调度
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 进度日志间隔 (秒)
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// 单次运行墙钟时间上限 (秒)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_time: Option<u64>,

    /// 脚本场景目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_dir: Option<PathBuf>,
}

/// 虚拟 HIL 时钟
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VhilClock {
    /// 每次读取时间推进固定增量
    Stepped,

    /// 按墙钟时间推进
    RealTime,
}

/// 虚拟 HIL 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VhilConfig {
    #[serde(default = "default_vhil_clock")]
    pub clock: VhilClock,

    /// 步进模式下每次读取推进的仿真时间 (秒)
    #[serde(default = "default_step_increment")]
    pub step_increment: f64,

    /// 实时模式下的速率倍数
    #[serde(default = "default_rate")]
    pub rate: f64,
}

// ============================================
// 默认值函数
// ============================================

fn default_log_level() -> String {
    "info".to_string()
}
fn default_model_name() -> String {
    "ringbus".to_string()
}
fn default_timestep() -> f64 {
    MAX_TIMESTEP
}
fn default_sample_frequency() -> f64 {
    10_000.0
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_capture_stop_timeout() -> u64 {
    10
}
fn default_repetitions() -> u32 {
    1
}
fn default_poll_interval_ms() -> u64 {
    1
}
fn default_update_interval() -> u64 {
    30
}
fn default_vhil_clock() -> VhilClock {
    VhilClock::Stepped
}
fn default_step_increment() -> f64 {
    1e-3
}
fn default_rate() -> f64 {
    1.0
}

// ============================================
// Default 实现
// ============================================

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            timestep: default_timestep(),
            sample_frequency: default_sample_frequency(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            analog_signals: Vec::new(),
            digital_signals: Vec::new(),
            stop_timeout: default_capture_stop_timeout(),
        }
    }
}

impl Default for RunBehaviorConfig {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            poll_interval_ms: default_poll_interval_ms(),
            update_interval: default_update_interval(),
            max_wall_time: None,
            scenario_dir: None,
        }
    }
}

impl Default for VhilConfig {
    fn default() -> Self {
        Self {
            clock: default_vhil_clock(),
            step_increment: default_step_increment(),
            rate: default_rate(),
        }
    }
}

// ============================================
// 配置加载实现
// ============================================

impl AutomatorConfig {
    /// 从多个源加载配置 (优先级: 环境变量 > 配置文件 > 默认值)
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::debug!("Loading config from: {:?}", path);
                Self::load_from_file(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从指定文件加载配置, 再应用环境变量
    pub fn load_with_overrides(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // 根据文件扩展名选择解析器
        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {:?}", path))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {:?}", path))?,
            _ => anyhow::bail!("Unsupported config file format: {:?}", path),
        };

        Ok(config)
    }

    /// 保存为 TOML
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file() -> Option<PathBuf> {
        // 1. 环境变量指定的路径
        if let Ok(path) = env::var("ATP_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        // 2. 当前目录
        let paths = [
            PathBuf::from("./atp.toml"),
            PathBuf::from("./atp.yaml"),
            PathBuf::from("./atp.json"),
        ];
        if let Some(path) = paths.iter().find(|p| p.exists()) {
            return Some(path.clone());
        }

        // 3. 用户配置目录
        if let Some(home) = dirs::home_dir() {
            let user_paths = [
                home.join(".config/atp/automator.toml"),
                home.join(".config/atp/automator.yaml"),
            ];
            if let Some(path) = user_paths.iter().find(|p| p.exists()) {
                return Some(path.clone());
            }
        }

        // 4. 系统配置目录 (Linux)
        #[cfg(target_os = "linux")]
        {
            let system_path = PathBuf::from("/etc/atp/automator.toml");
            if system_path.exists() {
                return Some(system_path);
            }
        }

        None
    }

    /// 从环境变量覆盖配置
    fn apply_env_vars(&mut self) -> anyhow::Result<()> {
        if let Ok(level) = env::var("ATP_LOG_LEVEL") {
            self.environment.log_level = level;
        }
        if let Ok(dir) = env::var("ATP_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Ok(repetitions) = env::var("ATP_REPETITIONS") {
            self.run.repetitions = repetitions
                .parse()
                .context("Invalid ATP_REPETITIONS value")?;
        }
        if let Ok(timestep) = env::var("ATP_MODEL_TIMESTEP") {
            self.model.timestep = timestep
                .parse()
                .context("Invalid ATP_MODEL_TIMESTEP value")?;
        }
        Ok(())
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        let timestep = self.model.timestep;
        if !timestep.is_finite() || timestep <= 0.0 || timestep > MAX_TIMESTEP {
            return Err(ExecutorError::ConfigError(format!(
                "model.timestep 必须在 (0, {}] 范围内: {}",
                MAX_TIMESTEP, timestep
            )));
        }
        if !self.model.sample_frequency.is_finite() || self.model.sample_frequency <= 0.0 {
            return Err(ExecutorError::ConfigError(format!(
                "model.sample_frequency 必须为正数: {}",
                self.model.sample_frequency
            )));
        }
        if self.capture.digital_signals.len() > crate::capture::MAX_DIGITAL_CHANNELS {
            return Err(ExecutorError::ConfigError(format!(
                "capture.digital_signals 最多 {} 个",
                crate::capture::MAX_DIGITAL_CHANNELS
            )));
        }
        if self.run.repetitions < 1 {
            return Err(ExecutorError::ConfigError(
                "run.repetitions 必须不小于 1".to_string(),
            ));
        }
        match self.vhil.clock {
            VhilClock::Stepped if !(self.vhil.step_increment > 0.0) => {
                return Err(ExecutorError::ConfigError(format!(
                    "vhil.step_increment 必须为正数: {}",
                    self.vhil.step_increment
                )));
            }
            VhilClock::RealTime if !(self.vhil.rate > 0.0) => {
                return Err(ExecutorError::ConfigError(format!(
                    "vhil.rate 必须为正数: {}",
                    self.vhil.rate
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// 生成单次运行配置
    pub fn run_configuration(&self, data_log_file: PathBuf, capture_file: PathBuf) -> RunConfiguration {
        RunConfiguration {
            data_logger_signals: self.data_logger.signals.clone(),
            data_log_file,
            analog_signals: self.capture.analog_signals.clone(),
            digital_signals: self.capture.digital_signals.clone(),
            capture_file,
            timestep: self.model.timestep,
            sample_frequency: self.model.sample_frequency,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.run.poll_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.run.update_interval)
    }

    pub fn capture_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.capture.stop_timeout)
    }

    pub fn max_wall_time(&self) -> Option<Duration> {
        self.run.max_wall_time.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AutomatorConfig::default();
        assert_eq!(config.environment.log_level, "info");
        assert_eq!(config.model.timestep, MAX_TIMESTEP);
        assert_eq!(config.output.dir, PathBuf::from("./output"));
        assert_eq!(config.capture.stop_timeout, 10);
        assert_eq!(config.run.repetitions, 1);
        assert_eq!(config.run.update_interval, 30);
        assert_eq!(config.vhil.clock, VhilClock::Stepped);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_with_partial_sections() {
        let toml_str = r#"
[model]
timestep = 1e-5

[data_logger]
signals = ["Va", "Vb"]

[capture]
analog_signals = ["Ia"]
stop_timeout = 2

[run]
repetitions = 3
max_wall_time = 60

[vhil]
clock = "real_time"
rate = 2.0
"#;
        let config: AutomatorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.timestep, 1e-5);
        assert_eq!(config.model.sample_frequency, 10_000.0);
        assert_eq!(config.data_logger.signals, vec!["Va", "Vb"]);
        assert_eq!(config.capture.stop_timeout, 2);
        assert!(config.capture.digital_signals.is_empty());
        assert_eq!(config.run.repetitions, 3);
        assert_eq!(config.max_wall_time(), Some(Duration::from_secs(60)));
        assert_eq!(config.run.poll_interval_ms, 1);
        assert_eq!(config.vhil.clock, VhilClock::RealTime);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atp.yaml");
        fs::write(&path, "output:\n  dir: /tmp/hil\nrun:\n  repetitions: 2\n").unwrap();

        let config = AutomatorConfig::load_from_file(&path).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("/tmp/hil"));
        assert_eq!(config.run.repetitions, 2);
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atp.ini");
        fs::write(&path, "x=1").unwrap();
        assert!(AutomatorConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("automator.toml");
        let mut config = AutomatorConfig::default();
        config.capture.analog_signals = vec!["Va".to_string()];
        config.run.max_wall_time = Some(5);

        config.save_to_file(&path).unwrap();
        let loaded = AutomatorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = AutomatorConfig::default();
        config.model.timestep = 1e-3;
        assert!(config.validate().is_err());

        let mut config = AutomatorConfig::default();
        config.run.repetitions = 0;
        assert!(config.validate().is_err());

        let mut config = AutomatorConfig::default();
        config.capture.digital_signals = (0..40).map(|i| format!("D{}", i)).collect();
        assert!(config.validate().is_err());

        let mut config = AutomatorConfig::default();
        config.vhil.step_increment = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_configuration() {
        let mut config = AutomatorConfig::default();
        config.data_logger.signals = vec!["Va".to_string()];
        config.capture.digital_signals = vec!["Brk".to_string()];

        let run = config.run_configuration(PathBuf::from("a.csv"), PathBuf::from("b.csv"));
        assert_eq!(run.data_logger_signals, vec!["Va"]);
        assert_eq!(run.digital_signals, vec!["Brk"]);
        assert_eq!(run.data_log_file, PathBuf::from("a.csv"));
        assert_eq!(run.capture_file, PathBuf::from("b.csv"));
        assert_eq!(run.timestep, MAX_TIMESTEP);
    }
}
