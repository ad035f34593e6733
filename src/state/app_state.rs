//! 应用状态

use chrono::{DateTime, Utc};

use crate::config::EnvConfig;
use crate::infra::StatusNotifier;
use crate::probe::{CacheProbe, ProbeError, RelationalProbe};

use super::run_store::RunStore;

/// 应用状态
///
/// 所有角色共用同一结构：探测器按需建连，未用到的成员没有开销
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 关系型数据库探测器
    pub relational_probe: RelationalProbe,
    /// 键值缓存探测器
    pub cache_probe: CacheProbe,
    /// 流水线运行存储
    pub run_store: RunStore,
    /// 运行状态回调客户端
    pub notifier: StatusNotifier,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(config: EnvConfig) -> Result<Self, ProbeError> {
        tracing::info!(
            db_host = %config.database.host,
            db_name = %config.database.name,
            redis_host = %config.cache.host,
            probe_timeout_secs = config.probe_timeout_secs,
            cors_origins = config.cors_allowed_origins.len(),
            webhook = config.webhook_url.is_some(),
            "Loaded configuration"
        );

        let relational_probe =
            RelationalProbe::from_config(&config.database, config.probe_timeout_secs);
        let cache_probe = CacheProbe::from_config(&config.cache)?;
        let notifier = StatusNotifier::new(config.webhook_url.clone());

        Ok(Self {
            config,
            started_at: Utc::now(),
            relational_probe,
            cache_probe,
            run_store: RunStore::new(),
            notifier,
        })
    }

    /// 运行时长（秒）
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::config::env::{CacheConfig, DatabaseConfig, PipelineConfig, PortConfig};
    use std::sync::Arc;

    /// 测试用配置，不触发任何网络连接
    pub fn test_config() -> EnvConfig {
        EnvConfig {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "cloudlab".to_string(),
                user: "postgres".to_string(),
                password: "postgres".to_string(),
            },
            cache: CacheConfig {
                host: "localhost".to_string(),
                port: 6379,
                db: 0,
                password: None,
            },
            ports: PortConfig {
                rds_api: 8000,
                cache_api: 8001,
                frontend: 8080,
                agent: 9000,
            },
            cors_allowed_origins: Vec::new(),
            probe_timeout_secs: 5,
            static_dir: "./static".to_string(),
            rds_api_url: "http://localhost:8000".to_string(),
            cache_api_url: "http://localhost:8001".to_string(),
            pipeline: PipelineConfig {
                registry_url: "registry.example.com".to_string(),
                image_prefix: "cloudlab".to_string(),
                deploy_host: Some("demo.example.com".to_string()),
                deploy_user: "ubuntu".to_string(),
                compose_dir: "~/cloudlab".to_string(),
            },
            webhook_url: None,
        }
    }

    /// 测试用应用状态
    pub fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(test_config()).expect("test state"))
    }
}
