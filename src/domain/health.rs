//! 健康检查领域模型

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 探测目标：关系型数据库或键值缓存
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTarget {
    Relational,
    Cache,
}

impl ProbeTarget {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeTarget::Relational => "relational",
            ProbeTarget::Cache => "cache",
        }
    }

    /// 对外展示的后端名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ProbeTarget::Relational => "Backend RDS",
            ProbeTarget::Cache => "Backend Redis",
        }
    }

    /// 探测成功时的固定响应文案
    ///
    /// 两个后端使用各自独立的文案
    pub fn success_message(&self) -> &'static str {
        match self {
            ProbeTarget::Relational => "Connection to Backend RDS is successful!",
            ProbeTarget::Cache => "Connection to Backend Redis is successful!",
        }
    }
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 单次探测结果
///
/// 每次请求新建，渲染或返回后即丢弃，绝不缓存。
/// `reachable=true` 仅在本次请求内完成了一次同步往返后成立。
#[derive(Clone, Debug, Serialize)]
pub struct HealthCheckResult {
    pub target: ProbeTarget,
    pub reachable: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    /// 探测成功
    pub fn success(target: ProbeTarget) -> Self {
        Self {
            target,
            reachable: true,
            message: target.success_message().to_string(),
            timestamp: Utc::now(),
        }
    }

    /// 探测失败
    pub fn failure(target: ProbeTarget, message: impl Into<String>) -> Self {
        Self {
            target,
            reachable: false,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_messages_are_distinct() {
        assert_eq!(
            ProbeTarget::Relational.success_message(),
            "Connection to Backend RDS is successful!"
        );
        assert_eq!(
            ProbeTarget::Cache.success_message(),
            "Connection to Backend Redis is successful!"
        );
        assert_ne!(
            ProbeTarget::Relational.success_message(),
            ProbeTarget::Cache.success_message()
        );
    }

    #[test]
    fn test_success_result_is_idempotent() {
        let first = HealthCheckResult::success(ProbeTarget::Relational);
        let second = HealthCheckResult::success(ProbeTarget::Relational);
        assert!(first.reachable);
        assert_eq!(first.message, second.message);
    }

    #[test]
    fn test_failure_result() {
        let result = HealthCheckResult::failure(ProbeTarget::Cache, "connection refused");
        assert!(!result.reachable);
        assert_eq!(result.target, ProbeTarget::Cache);
        assert_eq!(result.message, "connection refused");
    }
}
