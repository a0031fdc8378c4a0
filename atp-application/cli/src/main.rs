//! ATP CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "atp")]
#[command(about = "ATP - 电网 HIL 场景自动化", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (trace/debug/info/warn/error), RUST_LOG 优先, 未指定时读取配置
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 批量运行场景
    Run(RunArgs),

    /// 场景管理
    Scenario {
        #[command(subcommand)]
        action: ScenarioAction,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ScenarioAction {
    /// 列出内置场景和脚本场景
    List {
        /// 脚本场景目录
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 输出格式 (table/json/yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// 校验脚本场景文件
    Validate {
        /// 场景文件路径 (.yaml/.yml/.json)
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// 显示生效的配置
    Show {
        /// 配置文件路径
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 生成配置模板
    Init {
        /// 输出路径, 默认 ./atp.toml
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let log_level = cli.log_level.clone().unwrap_or_else(|| {
        config::load_config(None)
            .map(|config| config.environment.log_level)
            .unwrap_or_else(|_| "info".to_string())
    });
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ATP CLI 启动");

    // 处理命令
    match cli.command {
        Commands::Run(args) => commands::run::handle(args).await?,
        Commands::Scenario { action } => commands::scenario::handle(action).await?,
        Commands::Config { action } => commands::config::handle(action).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "atp", "-l", "debug", "run", "--no-builtin", "-f", "^fault", "-r", "3", "-s", "42",
            "--report", "out.json",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Run(args) => {
                assert!(args.no_builtin);
                assert_eq!(args.filter.as_deref(), Some("^fault"));
                assert_eq!(args.repetitions, Some(3));
                assert_eq!(args.seed, Some(42));
                assert_eq!(args.report, Some(PathBuf::from("out.json")));
            }
            _ => panic!("应解析为 run 命令"),
        }
    }
}
