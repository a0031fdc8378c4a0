//! 脚本场景
//!
//! 用 YAML/JSON 声明的场景:
//!
//! ```yaml
//! name: "close-breaker"
//! duration: 2.0
//! initial:
//!   Sw_ctrl: 0
//! events:
//!   - action: set_input
//!     time: 0.5
//!     name: Sw_ctrl
//!     value: 1
//!   - action: stop
//!     time: 1.5
//! capture:
//!   start: 0.45
//!   duration: 0.1
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::driver::SimulationDriver;
use crate::event::{SetInputEvent, StopEvent};
use crate::scenario::Scenario;
use crate::{ExecutorError, Result};

/// 脚本场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedScenario {
    /// 场景名称
    pub name: String,

    /// 场景描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 标签
    #[serde(default)]
    pub tags: Vec<String>,

    /// 场景时长 (秒)
    pub duration: f64,

    /// 启动前写入的输入值
    #[serde(default)]
    pub initial: BTreeMap<String, f64>,

    /// 定时事件
    #[serde(default)]
    pub events: Vec<ScriptedEvent>,

    /// 采集窗口
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureWindow>,
}

/// 脚本事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptedEvent {
    /// 写 SCADA 输入
    SetInput {
        time: f64,
        name: String,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// 提前结束
    Stop {
        time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl ScriptedEvent {
    pub fn time(&self) -> f64 {
        match self {
            ScriptedEvent::SetInput { time, .. } | ScriptedEvent::Stop { time, .. } => *time,
        }
    }

    fn describe(&self) -> String {
        match self {
            ScriptedEvent::SetInput {
                name,
                value,
                description,
                ..
            } => description
                .clone()
                .unwrap_or_else(|| format!("设置 {} = {}", name, value)),
            ScriptedEvent::Stop { description, .. } => {
                description.clone().unwrap_or_else(|| "停止".to_string())
            }
        }
    }
}

/// 采集窗口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureWindow {
    /// 起始时间 (秒)
    pub start: f64,

    /// 时长 (秒)
    pub duration: f64,

    /// 抽取因子, 未指定时按配置的采样率计算
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimation: Option<u32>,
}

impl ScriptedScenario {
    /// 从 YAML 文件加载场景
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// 从 YAML 字符串加载场景
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 从 JSON 文件加载场景
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载场景
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 按扩展名加载 (yaml/yml/json)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(ExecutorError::SerdeError(format!(
                "不支持的场景文件格式: {:?}",
                path
            ))),
        }
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }
}

#[async_trait]
impl Scenario for ScriptedScenario {
    async fn setup(&self, driver: &mut SimulationDriver) -> Result<()> {
        driver.declare_duration(self.duration)?;

        for (name, value) in &self.initial {
            driver.set_input_value(name, *value).await?;
        }

        for event in &self.events {
            let description = event.describe();
            match event {
                ScriptedEvent::SetInput {
                    time, name, value, ..
                } => driver.schedule_event(
                    *time,
                    &description,
                    Box::new(SetInputEvent::new(name, *value)),
                )?,
                ScriptedEvent::Stop { time, .. } => {
                    driver.schedule_event(*time, &description, Box::new(StopEvent))?
                }
            }
        }

        if let Some(window) = &self.capture {
            match window.decimation {
                Some(decimation) => {
                    driver
                        .schedule_capture(window.start, window.duration, decimation)
                        .await?;
                }
                None => {
                    driver
                        .schedule_capture_at_sample_rate(window.start, window.duration)
                        .await?;
                }
            }
        }

        Ok(())
    }

    async fn teardown(&self, _driver: &mut SimulationDriver) -> Result<()> {
        debug!("脚本场景 {} 结束", self.name);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ExecutorError::ScenarioContract("场景名称不能为空".to_string()));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ExecutorError::ScenarioContract(format!(
                "场景 {} 的时长必须大于 0: {}",
                self.name, self.duration
            )));
        }
        for event in &self.events {
            let time = event.time();
            if !time.is_finite() || time < 0.0 {
                return Err(ExecutorError::InvalidEvent(format!(
                    "场景 {} 的事件时间无效: {}",
                    self.name, time
                )));
            }
            if let ScriptedEvent::SetInput { name, .. } = event {
                if name.trim().is_empty() {
                    return Err(ExecutorError::InvalidEvent(format!(
                        "场景 {} 的输入名不能为空",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }
}
