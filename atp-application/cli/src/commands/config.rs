//! Config 命令处理

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::config::{load_config, ringbus_template, DEFAULT_CONFIG_FILE};
use crate::ConfigAction;

pub async fn handle(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { config } => show_config(config.as_deref()),
        ConfigAction::Init { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            init_config(&path, force)?;
            println!(
                "{} 配置文件已生成: {}",
                "✓".green().bold(),
                path.display().to_string().cyan()
            );
            Ok(())
        }
    }
}

/// 输出生效的配置 (已合并环境变量)
fn show_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let content = toml::to_string_pretty(&config).context("序列化配置失败")?;
    println!("{}", content);
    Ok(())
}

/// 写入环形母线模型的配置模板
fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("配置文件已存在: {:?} (使用 --force 覆盖)", path);
    }
    ringbus_template().save_to_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_executor::AutomatorConfig;

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("atp.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();

        let loaded = AutomatorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.model.name, "ringbus");
    }
}
