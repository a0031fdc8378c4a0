//! CLI 配置管理
//!
//! 配置文件格式与搜索顺序见 [`AutomatorConfig`]。这里负责:
//! - 按命令行参数或搜索路径加载配置
//! - 由配置构造虚拟 HIL 会话
//! - 扫描脚本场景目录
//! - 生成环形母线模型的配置模板

use anyhow::{Context, Result};
use atp_executor::config::VhilClock;
use atp_executor::{AutomatorConfig, ScriptedScenario};
use atp_hil::{ClockMode, HilSession, VirtualHil};
use atp_scenarios::ringbus;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// 默认脚本场景目录
pub const DEFAULT_SCENARIO_DIR: &str = "./scenarios";

/// `config init` 的默认输出路径
pub const DEFAULT_CONFIG_FILE: &str = "./atp.toml";

/// 加载配置
///
/// 指定路径时只读该文件 (仍应用环境变量), 否则按搜索路径查找。
pub fn load_config(path: Option<&Path>) -> Result<AutomatorConfig> {
    let config = match path {
        Some(path) => AutomatorConfig::load_with_overrides(path)
            .with_context(|| format!("加载配置文件失败: {:?}", path))?,
        None => AutomatorConfig::load()?,
    };
    config.validate().context("配置无效")?;
    Ok(config)
}

/// 由配置构造虚拟 HIL 会话
pub fn build_session(config: &AutomatorConfig) -> HilSession {
    let clock = match config.vhil.clock {
        VhilClock::Stepped => ClockMode::Stepped {
            increment: config.vhil.step_increment,
        },
        VhilClock::RealTime => ClockMode::RealTime {
            rate: config.vhil.rate,
        },
    };
    debug!("虚拟 HIL 时钟: {:?}, 步长 {}", clock, config.model.timestep);

    let device = Arc::new(VirtualHil::new(clock).with_timestep(config.model.timestep));
    HilSession::from_device(device)
}

/// 环形母线模型的配置模板
pub fn ringbus_template() -> AutomatorConfig {
    let mut config = AutomatorConfig::default();
    config.model.name = "ringbus".to_string();
    config.model.sample_frequency = ringbus::SAMPLE_FREQUENCY;
    config.data_logger.signals = ringbus::streaming_signals();
    config.capture.analog_signals = ["Va_inst", "Vb_inst", "Vc_inst", "Ia_inst", "Ib_inst", "Ic_inst"]
        .iter()
        .map(|signal| format!("{}.{}", ringbus::DATA_BLOCK_NAMES[0], signal))
        .collect();
    config.capture.digital_signals = vec![ringbus::FAULT_INDICATOR.to_string()];
    config.run.scenario_dir = Some(PathBuf::from(DEFAULT_SCENARIO_DIR));
    config
}

// ============================================
// 脚本场景目录
// ============================================

/// 场景目录中的一个文件
#[derive(Debug)]
pub struct ScenarioFile {
    pub path: PathBuf,
    pub scenario: std::result::Result<ScriptedScenario, String>,
}

impl ScenarioFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

fn is_scenario_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml") | Some("json")
    )
}

/// 扫描目录下的 YAML/JSON 场景, 按文件名排序
///
/// 解析或校验失败的文件也会返回, 由调用方决定跳过还是报错。
pub fn scan_scenario_dir(dir: &Path) -> Result<Vec<ScenarioFile>> {
    let entries = fs::read_dir(dir).with_context(|| format!("读取场景目录失败: {:?}", dir))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_scenario_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let scenario = load_scripted(&path);
            ScenarioFile { path, scenario }
        })
        .collect())
}

/// 加载并校验单个脚本场景
pub fn load_scripted(path: &Path) -> std::result::Result<ScriptedScenario, String> {
    use atp_executor::Scenario;

    let scenario = ScriptedScenario::from_file(path).map_err(|e| e.to_string())?;
    scenario.validate().map_err(|e| e.to_string())?;
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
name: "close-breaker"
duration: 1.0
events:
  - action: set_input
    time: 0.5
    name: Sw_ctrl
    value: 1
"#;

    #[test]
    fn test_ringbus_template_is_valid() {
        let config = ringbus_template();
        assert!(config.validate().is_ok());
        assert_eq!(config.data_logger.signals.len(), 90);
        assert_eq!(config.capture.analog_signals[0], "Data_F3_Gen.Va_inst");
        assert_eq!(config.model.sample_frequency, 3840.0);
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atp.toml");
        ringbus_template().save_to_file(&path).unwrap();

        let loaded = AutomatorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, ringbus_template());
    }

    #[test]
    fn test_scan_scenario_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_close.yaml"), SCRIPT).unwrap();
        fs::write(dir.path().join("a_broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(
            dir.path().join("c_zero.yml"),
            "name: zero\nduration: 0.0\n",
        )
        .unwrap();

        let files = scan_scenario_dir(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a_broken.json", "b_close.yaml", "c_zero.yml"]);

        assert!(files[0].scenario.is_err());
        assert_eq!(files[1].scenario.as_ref().unwrap().name, "close-breaker");
        assert!(files[2].scenario.is_err());
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_scenario_dir(&dir.path().join("missing")).is_err());
    }
}
