//! 关系型数据库探测
//!
//! 通过 sqlx 连接池执行一次 `SELECT 1` 往返。连接池按需建连
//! （`connect_lazy_with`），进程启动不依赖数据库就绪，容忍编排
//! 运行时的乱序启动。

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use crate::config::env::constants::DB_POOL_MAX_CONNECTIONS;
use crate::config::DatabaseConfig;
use crate::domain::health::ProbeTarget;

use super::{ProbeError, ReachabilityProbe};

/// 关系型数据库探测器
#[derive(Clone)]
pub struct RelationalProbe {
    pool: PgPool,
}

impl RelationalProbe {
    /// 从配置构建探测器
    ///
    /// `acquire_timeout` 与探测超时对齐，保证失败在请求生命周期内返回
    pub fn from_config(config: &DatabaseConfig, probe_timeout_secs: u64) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(DB_POOL_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(probe_timeout_secs))
            .connect_lazy_with(options);

        tracing::debug!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Relational probe configured (lazy pool)"
        );

        Self { pool }
    }
}

#[async_trait]
impl ReachabilityProbe for RelationalProbe {
    fn target(&self) -> ProbeTarget {
        ProbeTarget::Relational
    }

    async fn check(&self) -> Result<(), ProbeError> {
        // 连接从池中取出，作用域结束自动归还
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ProbeError::Unreachable {
                target: ProbeTarget::Relational,
                reason: e.to_string(),
            })?;

        let health: i32 = row.get("health");
        if health == 1 {
            Ok(())
        } else {
            Err(ProbeError::Unreachable {
                target: ProbeTarget::Relational,
                reason: format!("unexpected round-trip response: {}", health),
            })
        }
    }
}
