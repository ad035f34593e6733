//! 交付流水线领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 流水线运行状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

/// 发布推进阶段
///
/// 只允许向前推进：Built -> Pushed -> Pulled -> Running
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Built,
    Pushed,
    Pulled,
    Running,
}

impl RunPhase {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Built => "built",
            RunPhase::Pushed => "pushed",
            RunPhase::Pulled => "pulled",
            RunPhase::Running => "running",
        }
    }

    /// 推进序号，用于禁止回退
    fn rank(&self) -> u8 {
        match self {
            RunPhase::Built => 0,
            RunPhase::Pushed => 1,
            RunPhase::Pulled => 2,
            RunPhase::Running => 3,
        }
    }
}

/// 步骤状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 流水线步骤记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageReport {
    /// 步骤标识 (e.g., "rds-api:docker_build", "compose_pull")
    pub name: String,
    /// 显示名称 (e.g., "Build rds-api", "Compose Pull")
    pub display_name: String,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    /// 步骤状态
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl StageReport {
    /// 创建新的待执行步骤
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行步骤
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成步骤
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过步骤
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 一次流水线运行的完整记录
#[derive(Clone, Debug, Serialize)]
pub struct PipelineRun {
    pub id: String,
    /// 触发本次运行的提交引用
    pub commit_ref: Option<String>,
    /// 已发布的镜像 (service -> tag)
    pub image_tags: HashMap<String, String>,
    /// 当前推进阶段，发布出第一个制品前为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<RunPhase>,
    /// 发布目标主机
    pub host: Option<String>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 步骤详情
    #[serde(default)]
    pub stages: Vec<StageReport>,
}

impl PipelineRun {
    /// 创建新的运行记录
    pub fn new(id: String, commit_ref: Option<String>, host: Option<String>) -> Self {
        Self {
            id,
            commit_ref,
            image_tags: HashMap::new(),
            phase: None,
            host,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        }
    }

    /// 推进阶段，忽略任何回退尝试
    pub fn advance_phase(&mut self, next: RunPhase) {
        match self.phase {
            Some(current) if next.rank() <= current.rank() => {
                tracing::warn!(
                    run_id = %self.id,
                    current = current.as_str(),
                    attempted = next.as_str(),
                    "Ignoring backwards phase transition"
                );
            }
            _ => self.phase = Some(next),
        }
    }

    /// 记录已发布的镜像 tag
    pub fn record_image_tag(&mut self, service: &str, tag: &str) {
        self.image_tags.insert(service.to_string(), tag.to_string());
    }

    /// 设置运行完成
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// 日志行
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | stderr
    pub content: String,
}

impl LogLine {
    /// 创建新日志行
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    /// 创建 stdout 日志行
    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    /// 创建 stderr 日志行
    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new("stderr", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_as_str() {
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert_eq!(RunStatus::Success.as_str(), "success");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_run_status_is_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_stage_report_lifecycle() {
        let mut stage = StageReport::new("test", "Test Stage");
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(true, Some("Done".to_string()));
        assert_eq!(stage.status, StageStatus::Success);
        assert!(stage.finished_at.is_some());
        assert!(stage.duration_ms.is_some());
    }

    #[test]
    fn test_phase_only_advances_forward() {
        let mut run = PipelineRun::new("run-1".to_string(), None, None);
        assert!(run.phase.is_none());

        run.advance_phase(RunPhase::Built);
        assert_eq!(run.phase, Some(RunPhase::Built));

        run.advance_phase(RunPhase::Pulled);
        assert_eq!(run.phase, Some(RunPhase::Pulled));

        // 回退被忽略
        run.advance_phase(RunPhase::Pushed);
        assert_eq!(run.phase, Some(RunPhase::Pulled));

        run.advance_phase(RunPhase::Running);
        assert_eq!(run.phase, Some(RunPhase::Running));
    }

    #[test]
    fn test_record_image_tag() {
        let mut run = PipelineRun::new("run-1".to_string(), Some("abc123".to_string()), None);
        run.record_image_tag("rds-api", "registry.example.com/cloudlab-rds-api:abc123");
        assert_eq!(run.image_tags.len(), 1);
        assert!(run.image_tags["rds-api"].ends_with(":abc123"));
    }

    #[test]
    fn test_log_line_creation() {
        let line = LogLine::stdout("Hello");
        assert_eq!(line.stream, "stdout");
        assert_eq!(line.content, "Hello");

        let line = LogLine::stderr("Error");
        assert_eq!(line.stream, "stderr");
        assert_eq!(line.content, "Error");
    }
}
