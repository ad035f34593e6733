//! 可达性探测
//!
//! 两个健康检查后端共用同一个探测抽象：`ReachabilityProbe` 描述
//! 一次到后端存储的往返，`run_probe` 统一加超时并产出结果。

pub mod cache;
pub mod relational;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::health::{HealthCheckResult, ProbeTarget};

pub use cache::CacheProbe;
pub use relational::RelationalProbe;

/// 探测失败
#[derive(Debug, Error)]
pub enum ProbeError {
    /// 往返失败（连接拒绝、认证失败、查询出错等）
    #[error("{target} round-trip failed: {reason}")]
    Unreachable { target: ProbeTarget, reason: String },
    /// 超过探测超时
    #[error("{target} probe timed out after {secs}s")]
    Timeout { target: ProbeTarget, secs: u64 },
}

impl ProbeError {
    /// 对外展示的失败文案
    pub fn user_message(&self) -> String {
        match self {
            ProbeError::Unreachable { target, reason } => {
                format!("Connection to {} failed: {}", target, reason)
            }
            ProbeError::Timeout { target, secs } => {
                format!("Connection to {} timed out after {}s", target, secs)
            }
        }
    }
}

/// 一次到后端存储的往返探测
///
/// 实现者只负责真正的往返，超时与结果组装由 `run_probe` 处理
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// 探测目标
    fn target(&self) -> ProbeTarget;

    /// 执行一次同步往返，连接在本次调用内获取并释放
    async fn check(&self) -> Result<(), ProbeError>;
}

/// 执行一次带超时的探测
///
/// 成功时返回固定成功文案的结果；失败或超时返回 `ProbeError`，
/// 由调用方映射为失败响应。结果每次新建，不做任何缓存。
pub async fn run_probe(
    probe: &dyn ReachabilityProbe,
    timeout_secs: u64,
) -> Result<HealthCheckResult, ProbeError> {
    let target = probe.target();

    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), probe.check()).await;

    match outcome {
        Ok(Ok(())) => {
            let result = HealthCheckResult::success(target);
            tracing::debug!(target = target.as_str(), "Probe round-trip succeeded");
            Ok(result)
        }
        Ok(Err(err)) => {
            tracing::warn!(target = target.as_str(), error = %err, "Probe round-trip failed");
            Err(err)
        }
        Err(_) => {
            tracing::warn!(
                target = target.as_str(),
                timeout_secs,
                "Probe timed out"
            );
            Err(ProbeError::Timeout {
                target,
                secs: timeout_secs,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkProbe(ProbeTarget);

    #[async_trait]
    impl ReachabilityProbe for OkProbe {
        fn target(&self) -> ProbeTarget {
            self.0
        }

        async fn check(&self) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    struct FailProbe(ProbeTarget);

    #[async_trait]
    impl ReachabilityProbe for FailProbe {
        fn target(&self) -> ProbeTarget {
            self.0
        }

        async fn check(&self) -> Result<(), ProbeError> {
            Err(ProbeError::Unreachable {
                target: self.0,
                reason: "connection refused".to_string(),
            })
        }
    }

    /// 永不返回的探测，用于验证超时边界
    struct HangProbe(ProbeTarget);

    #[async_trait]
    impl ReachabilityProbe for HangProbe {
        fn target(&self) -> ProbeTarget {
            self.0
        }

        async fn check(&self) -> Result<(), ProbeError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_reachable_probe_returns_fixed_message() {
        let probe = OkProbe(ProbeTarget::Relational);
        let result = run_probe(&probe, 5).await.unwrap();
        assert!(result.reachable);
        assert_eq!(result.message, "Connection to Backend RDS is successful!");
    }

    #[tokio::test]
    async fn test_repeated_probes_yield_identical_message() {
        let probe = OkProbe(ProbeTarget::Cache);
        let first = run_probe(&probe, 5).await.unwrap();
        let second = run_probe(&probe, 5).await.unwrap();
        assert_eq!(first.message, second.message);
        assert_eq!(second.message, "Connection to Backend Redis is successful!");
    }

    #[tokio::test]
    async fn test_unreachable_probe_reports_failure() {
        let probe = FailProbe(ProbeTarget::Cache);
        let err = run_probe(&probe, 5).await.unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable { .. }));
        assert!(err.user_message().contains("Backend Redis"));
        assert!(err.user_message().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_within_bound() {
        let probe = HangProbe(ProbeTarget::Relational);
        let err = run_probe(&probe, 2).await.unwrap_err();
        match err {
            ProbeError::Timeout { secs, .. } => assert_eq!(secs, 2),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }
}
