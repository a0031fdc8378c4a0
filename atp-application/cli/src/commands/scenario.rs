//! Scenario 命令处理

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use atp_executor::{Scenario, ScriptedEvent, ScriptedScenario};

use super::output::{output_formatted, TableRow};
use crate::config::{load_config, load_scripted, scan_scenario_dir, DEFAULT_SCENARIO_DIR};
use crate::ScenarioAction;

pub async fn handle(action: ScenarioAction) -> Result<()> {
    match action {
        ScenarioAction::List { dir, format } => list_scenarios(dir, &format),
        ScenarioAction::Validate { file } => validate_scenario(&file),
    }
}

/// 场景列表中的一行
#[derive(Debug, Serialize)]
pub struct ScenarioRow {
    pub name: String,
    pub source: String,
    pub description: String,
}

impl TableRow for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "来源", "描述"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.source.clone(),
            self.description.clone(),
        ]
    }
}

/// 内置场景行
pub fn builtin_rows() -> Vec<ScenarioRow> {
    atp_scenarios::builtin_scenarios(0)
        .into_iter()
        .map(|(name, scenario)| ScenarioRow {
            name,
            source: "builtin".to_string(),
            description: scenario.description().unwrap_or_default(),
        })
        .collect()
}

/// 脚本场景行, 无效文件的描述为错误信息
pub fn scripted_rows(dir: &Path) -> Result<Vec<ScenarioRow>> {
    Ok(scan_scenario_dir(dir)?
        .into_iter()
        .map(|file| {
            let source = file.file_name();
            match file.scenario {
                Ok(scenario) => ScenarioRow {
                    name: scenario.name,
                    source,
                    description: scenario.description.unwrap_or_default(),
                },
                Err(e) => ScenarioRow {
                    name: "-".to_string(),
                    source,
                    description: format!("无效: {}", e),
                },
            }
        })
        .collect())
}

fn list_scenarios(dir: Option<PathBuf>, format: &str) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => load_config(None)?
            .run
            .scenario_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCENARIO_DIR)),
    };

    let mut rows = builtin_rows();
    if dir.exists() {
        rows.extend(scripted_rows(&dir)?);
    } else if format == "table" {
        println!("{}", format!("场景目录不存在: {:?}", dir).yellow());
        println!("可以通过配置文件中的 run.scenario_dir 或 --dir 指定场景目录\n");
    }

    output_formatted(&rows, format)
}

fn validate_scenario(file: &Path) -> Result<()> {
    let scenario = match load_scripted(file) {
        Ok(scenario) => scenario,
        Err(e) => {
            println!("{} {}", "✗".red().bold(), e.red());
            bail!("场景文件无效: {:?}", file);
        }
    };

    println!(
        "{} 场景有效: {}",
        "✓".green().bold(),
        scenario.name.cyan().bold()
    );
    print_details(&scenario);
    Ok(())
}

fn print_details(scenario: &ScriptedScenario) {
    if let Some(desc) = &scenario.description {
        println!("描述: {}", desc.bright_black());
    }
    println!("时长: {} s", scenario.duration.to_string().yellow());
    if !scenario.tags.is_empty() {
        println!("标签: {}", scenario.tags.join(", ").bright_black());
    }
    if !scenario.initial.is_empty() {
        println!("初值: {}", scenario.initial.len().to_string().yellow());
    }
    println!("事件: {}", scenario.events.len().to_string().yellow());
    for event in &scenario.events {
        match event {
            ScriptedEvent::SetInput {
                time, name, value, ..
            } => println!("  [{:.6}] {} = {}", time, name, value),
            ScriptedEvent::Stop { time, .. } => println!("  [{:.6}] 停止", time),
        }
    }
    if let Some(window) = &scenario.capture {
        println!(
            "采集: {:.6}s 起 {:.6}s",
            window.start, window.duration
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rows() {
        let rows = builtin_rows();
        assert_eq!(rows.len(), 12);
        assert!(rows.iter().all(|row| row.source == "builtin"));
        assert!(rows[0].description.contains("A-B"));
    }

    #[test]
    fn test_scripted_rows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("close.yaml"),
            "name: close\ndescription: 合闸\nduration: 1.0\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("empty.json"), "{}").unwrap();

        let rows = scripted_rows(dir.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "close");
        assert_eq!(rows[0].description, "合闸");
        assert_eq!(rows[1].name, "-");
        assert!(rows[1].description.starts_with("无效"));
    }

    #[test]
    fn test_validate_scenario_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "name: good\nduration: 2.0\n").unwrap();
        assert!(validate_scenario(&good).is_ok());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "name: bad\nduration: -1.0\n").unwrap();
        assert!(validate_scenario(&bad).is_err());
    }
}
