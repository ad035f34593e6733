//! 键值缓存探测
//!
//! 每次探测从 `redis::Client` 新取一条连接发送 `PING`，
//! 连接在本次请求结束时随作用域释放，不跨请求持有。

use async_trait::async_trait;

use crate::config::CacheConfig;
use crate::domain::health::ProbeTarget;

use super::{ProbeError, ReachabilityProbe};

/// 键值缓存探测器
#[derive(Clone)]
pub struct CacheProbe {
    client: redis::Client,
}

impl CacheProbe {
    /// 从配置构建探测器
    ///
    /// `Client::open` 只解析 URL，不建立连接
    pub fn from_config(config: &CacheConfig) -> Result<Self, ProbeError> {
        let url = config.url();
        let client = redis::Client::open(url.as_str()).map_err(|e| ProbeError::Unreachable {
            target: ProbeTarget::Cache,
            reason: format!("invalid redis url: {}", e),
        })?;

        tracing::debug!(url = %redact_url(&url), "Cache probe configured");

        Ok(Self { client })
    }
}

#[async_trait]
impl ReachabilityProbe for CacheProbe {
    fn target(&self) -> ProbeTarget {
        ProbeTarget::Cache
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ProbeError::Unreachable {
                target: ProbeTarget::Cache,
                reason: e.to_string(),
            })?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ProbeError::Unreachable {
                target: ProbeTarget::Cache,
                reason: format!("PING failed: {}", e),
            })?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(ProbeError::Unreachable {
                target: ProbeTarget::Cache,
                reason: format!("unexpected PING reply: {}", pong),
            })
        }
    }
}

/// 打码连接 URL 中的密码，用于日志输出
fn redact_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let prefix = &url[..=colon_pos];
            let suffix = &url[at_pos..];
            return format!("{}***{}", prefix, suffix);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_with_password() {
        assert_eq!(
            redact_url("redis://:secret@localhost:6379/0"),
            "redis://:***@localhost:6379/0"
        );
    }

    #[test]
    fn test_redact_url_without_password() {
        assert_eq!(redact_url("redis://localhost:6379/0"), "redis://localhost:6379/0");
    }

    #[test]
    fn test_from_config_accepts_valid_url() {
        let config = CacheConfig {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        };
        assert!(CacheProbe::from_config(&config).is_ok());
    }
}
