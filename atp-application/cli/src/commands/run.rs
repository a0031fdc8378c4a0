//! Run 命令处理
//!
//! 在虚拟 HIL 上批量运行内置场景与脚本场景。

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use atp_executor::Scenario;
use atp_orchestrator::{BatchReport, Orchestrator, ScenarioOutcome};

use super::output::{print_table, TableRow};
use crate::config::{build_session, load_config, scan_scenario_dir};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 脚本场景目录 (覆盖配置中的 run.scenario_dir)
    #[arg(short = 'd', long)]
    pub scenario_dir: Option<PathBuf>,

    /// 不注册内置场景
    #[arg(long)]
    pub no_builtin: bool,

    /// 只运行名称匹配该正则的场景
    #[arg(short, long)]
    pub filter: Option<String>,

    /// 每个场景的重复次数 (覆盖配置)
    #[arg(short, long)]
    pub repetitions: Option<u32>,

    /// 随机种子, 相同种子复现同一批次
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// 报告输出路径 (.json/.yaml)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// 注册结果
#[derive(Debug, Default)]
pub struct Registration {
    pub registered: Vec<String>,
    /// (名称, 原因)
    pub skipped: Vec<(String, String)>,
}

/// 按过滤条件注册候选场景, 注册失败的场景跳过
pub fn register_all(
    orchestrator: &mut Orchestrator,
    candidates: Vec<(String, Arc<dyn Scenario>)>,
    filter: Option<&Regex>,
) -> Registration {
    let mut registration = Registration::default();
    for (name, scenario) in candidates {
        if let Some(filter) = filter {
            if !filter.is_match(&name) {
                continue;
            }
        }
        match orchestrator.add_scenario(&name, scenario) {
            Ok(()) => registration.registered.push(name),
            Err(e) => {
                warn!("跳过场景 {}: {}", name, e);
                registration.skipped.push((name, e.to_string()));
            }
        }
    }
    registration
}

/// 脚本场景目录中的场景, 无法加载的文件记为跳过
fn scripted_candidates(
    dir: &Path,
    registration: &mut Registration,
) -> Result<Vec<(String, Arc<dyn Scenario>)>> {
    let mut candidates: Vec<(String, Arc<dyn Scenario>)> = Vec::new();
    for file in scan_scenario_dir(dir)? {
        let file_name = file.file_name();
        match file.scenario {
            Ok(scenario) => {
                let name = scenario.name.clone();
                candidates.push((name, Arc::new(scenario)));
            }
            Err(e) => {
                warn!("无法加载场景文件 {:?}: {}", file.path, e);
                registration.skipped.push((file_name, e));
            }
        }
    }
    Ok(candidates)
}

pub async fn handle(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let repetitions = args.repetitions.unwrap_or(config.run.repetitions);
    let seed = args.seed.unwrap_or_else(rand::random);
    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("无效的过滤表达式")?;

    let session = build_session(&config);
    let mut orchestrator = Orchestrator::new(session, config.clone())?;

    let mut candidates = Vec::new();
    if !args.no_builtin {
        candidates.extend(atp_scenarios::builtin_scenarios(seed));
    }

    let mut registration = Registration::default();
    let scenario_dir = args.scenario_dir.clone().or_else(|| config.run.scenario_dir.clone());
    if let Some(dir) = &scenario_dir {
        if dir.exists() {
            candidates.extend(scripted_candidates(dir, &mut registration)?);
        } else if args.scenario_dir.is_some() {
            bail!("场景目录不存在: {:?}", dir);
        } else {
            info!("场景目录 {:?} 不存在, 只运行内置场景", dir);
        }
    }

    let registered = register_all(&mut orchestrator, candidates, filter.as_ref());
    registration.registered = registered.registered;
    registration.skipped.extend(registered.skipped);

    for (name, reason) in &registration.skipped {
        println!("{} 跳过 {}: {}", "⊘".yellow(), name, reason.bright_black());
    }
    if registration.registered.is_empty() {
        bail!("没有可运行的场景");
    }

    println!(
        "\n{} 个场景, 每个重复 {} 次, 随机种子 {}\n",
        registration.registered.len().to_string().cyan(),
        repetitions.to_string().cyan(),
        seed.to_string().yellow()
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")?);
    spinner.set_message("运行场景...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = orchestrator.run_all(repetitions).await;
    spinner.finish_and_clear();
    let failures = result?;

    let report = orchestrator.report();
    print_summary(&report);

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| config.output.dir.join(format!("batch_{}.json", report.batch_id)));
    report
        .save(&report_path)
        .with_context(|| format!("保存报告失败: {:?}", report_path))?;
    println!("报告: {}", report_path.display().to_string().cyan());

    orchestrator.shutdown().await?;

    if failures > 0 {
        bail!("{} 次运行失败", failures);
    }
    Ok(())
}

// ============================================
// 输出
// ============================================

struct OutcomeRow<'a> {
    outcome: &'a ScenarioOutcome,
}

impl TableRow for OutcomeRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["序号", "场景", "重复", "结果", "事件", "耗时(ms)"]
    }

    fn row(&self) -> Vec<String> {
        let outcome = self.outcome;
        vec![
            outcome.run_index.to_string(),
            outcome.name.clone(),
            outcome.repetition.to_string(),
            if outcome.succeeded { "成功" } else { "失败" }.to_string(),
            outcome.events_invoked.to_string(),
            outcome.duration_ms.to_string(),
        ]
    }
}

fn print_summary(report: &BatchReport) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "批次报告".bold());
    println!("{}", "=".repeat(60));
    println!();

    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|outcome| OutcomeRow { outcome })
        .collect();
    print_table(&rows);
    println!();

    println!("运行统计:");
    println!("  总运行: {}", report.total_runs.to_string().bright_blue());
    println!("  成功:   {}", report.succeeded.to_string().green());
    println!("  失败:   {}", report.failed.to_string().red());

    let failures: Vec<&ScenarioOutcome> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("失败详情:");
        for outcome in failures {
            if let Some(error) = &outcome.error {
                println!(
                    "{} {} #{}: [{}] {}",
                    "✗".red().bold(),
                    outcome.name,
                    outcome.repetition,
                    error.kind.yellow(),
                    error.message.red()
                );
            }
        }
    }

    println!("{}", "=".repeat(60));
    let status = if report.is_success() {
        format!("{} 全部运行成功", "✓".green().bold())
    } else {
        format!("{} 存在失败的运行", "✗".red().bold())
    };
    println!("{}", status);
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_executor::AutomatorConfig;
    use atp_hil::{ClockMode, HilSession, VirtualHil};

    fn orchestrator() -> Orchestrator {
        let device = Arc::new(VirtualHil::new(ClockMode::Stepped { increment: 1e-3 }));
        Orchestrator::new(HilSession::from_device(device), AutomatorConfig::default()).unwrap()
    }

    #[test]
    fn test_register_with_filter() {
        let mut orchestrator = orchestrator();
        let filter = Regex::new("^fault_A-B").unwrap();
        let registration = register_all(
            &mut orchestrator,
            atp_scenarios::builtin_scenarios(0),
            Some(&filter),
        );

        assert_eq!(
            registration.registered,
            vec!["fault_A-B", "fault_A-B-C", "fault_A-B-Gnd", "fault_A-B-C-Gnd"]
        );
        assert!(registration.skipped.is_empty());
        assert_eq!(orchestrator.scenario_count(), 4);
    }

    #[test]
    fn test_register_duplicate_skipped() {
        let mut orchestrator = orchestrator();
        let mut candidates = atp_scenarios::builtin_scenarios(0);
        candidates.extend(atp_scenarios::builtin_scenarios(1));
        let total = candidates.len() / 2;

        let registration = register_all(&mut orchestrator, candidates, None);
        assert_eq!(registration.registered.len(), total);
        assert_eq!(registration.skipped.len(), total);
        assert_eq!(orchestrator.scenario_count(), total);
    }

    #[test]
    fn test_scripted_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("close.yaml"),
            "name: close\nduration: 1.0\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "name: bad\n").unwrap();

        let mut registration = Registration::default();
        let candidates = scripted_candidates(dir.path(), &mut registration).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, "close");
        assert_eq!(registration.skipped.len(), 1);
        assert_eq!(registration.skipped[0].0, "bad.yaml");
    }
}
