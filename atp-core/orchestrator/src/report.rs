//! 批次报告

use atp_executor::ExecutorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{OrchestratorError, Result};

/// 错误描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// 错误类别
    pub kind: String,

    /// 错误信息
    pub message: String,
}

impl From<&ExecutorError> for ErrorDescriptor {
    fn from(error: &ExecutorError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// 单次运行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    /// 场景名称
    pub name: String,

    /// 第几次重复 (从 1 开始)
    pub repetition: u32,

    /// 全局运行序号
    pub run_index: u64,

    /// 是否成功
    pub succeeded: bool,

    /// 失败原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,

    /// 开始时间
    pub started_at: DateTime<Utc>,

    /// 墙钟耗时 (毫秒)
    pub duration_ms: u64,

    /// 已执行事件数
    pub events_invoked: usize,

    /// 数据记录文件
    pub data_log_file: PathBuf,

    /// 采集文件
    pub capture_file: PathBuf,
}

/// 批次报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// 批次 ID
    pub batch_id: Uuid,

    /// 开始时间
    pub started_at: DateTime<Utc>,

    /// 结束时间
    pub finished_at: DateTime<Utc>,

    /// 总运行次数
    pub total_runs: usize,

    /// 成功次数
    pub succeeded: usize,

    /// 失败次数
    pub failed: usize,

    /// 运行结果列表
    pub outcomes: Vec<ScenarioOutcome>,
}

impl BatchReport {
    /// 由运行结果生成报告
    pub fn new(batch_id: Uuid, started_at: DateTime<Utc>, outcomes: Vec<ScenarioOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            total_runs: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    /// 全部运行成功
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.total_runs > 0
    }

    /// 失败的运行
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| OrchestratorError::SerdeError(e.to_string()))
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| OrchestratorError::SerdeError(e.to_string()))
    }

    /// 保存报告, 扩展名为 yaml/yml 时写 YAML, 否则写 JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => self.to_yaml()?,
            _ => self.to_json()?,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, error: Option<ExecutorError>) -> ScenarioOutcome {
        ScenarioOutcome {
            name: name.to_string(),
            repetition: 1,
            run_index: 1,
            succeeded: error.is_none(),
            error: error.as_ref().map(ErrorDescriptor::from),
            started_at: Utc::now(),
            duration_ms: 12,
            events_invoked: 3,
            data_log_file: PathBuf::from("a_datalog.csv"),
            capture_file: PathBuf::from("a_capture.csv"),
        }
    }

    #[test]
    fn test_report_counts() {
        let report = BatchReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![
                outcome("a", None),
                outcome("b", Some(ExecutorError::EmptySchedule)),
                outcome("c", None),
            ],
        );
        assert_eq!(report.total_runs, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());
        assert_eq!(report.failures().next().map(|o| o.name.as_str()), Some("b"));
    }

    #[test]
    fn test_empty_report_is_not_success() {
        let report = BatchReport::new(Uuid::new_v4(), Utc::now(), vec![]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_error_descriptor() {
        let error = ExecutorError::UnexpectedStop { sim_time: 1.5 };
        let descriptor = ErrorDescriptor::from(&error);
        assert_eq!(descriptor.kind, "UnexpectedStop");
        assert!(descriptor.message.contains("1.500000"));
    }

    #[test]
    fn test_save_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let report = BatchReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![outcome("a", Some(ExecutorError::Startup("busy".to_string())))],
        );

        let json_path = dir.path().join("report.json");
        report.save(&json_path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["outcomes"][0]["error"]["kind"], "Startup");

        let yaml_path = dir.path().join("out").join("report.yaml");
        report.save(&yaml_path).unwrap();
        let loaded: BatchReport =
            serde_yaml::from_str(&std::fs::read_to_string(&yaml_path).unwrap()).unwrap();
        assert_eq!(loaded.batch_id, report.batch_id);
        assert_eq!(loaded.outcomes.len(), 1);
    }
}
