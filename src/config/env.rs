//! 环境变量配置加载

use std::env;
use tracing::warn;

/// 环境配置
///
/// 进程启动时构建一次，随后以引用传递，不使用全局可变状态
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 关系型数据库连接配置
    pub database: DatabaseConfig,
    /// 键值缓存连接配置
    pub cache: CacheConfig,
    /// 各角色监听端口
    pub ports: PortConfig,
    /// 允许的跨域来源，为空时放行所有来源
    pub cors_allowed_origins: Vec<String>,
    /// 单次探测超时（秒）
    pub probe_timeout_secs: u64,
    /// 前端静态资源目录
    pub static_dir: String,
    /// 前端探测的两个后端地址
    pub rds_api_url: String,
    pub cache_api_url: String,
    /// 交付流水线配置
    pub pipeline: PipelineConfig,
    /// 运行状态回调 URL（可选）
    pub webhook_url: Option<String>,
}

/// 监听端口配置
#[derive(Clone, Debug)]
pub struct PortConfig {
    pub rds_api: u16,
    pub cache_api: u16,
    pub frontend: u16,
    pub agent: u16,
}

/// 关系型数据库配置
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// 键值缓存配置
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    /// 数据库序号
    pub db: u32,
    pub password: Option<String>,
}

impl CacheConfig {
    /// 组装 redis 连接 URL
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// 交付流水线配置
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// 镜像仓库地址 (e.g. 123456789.dkr.ecr.us-east-1.amazonaws.com)
    pub registry_url: String,
    /// 镜像名前缀 (e.g. cloudlab)
    pub image_prefix: String,
    /// 发布目标主机
    pub deploy_host: Option<String>,
    /// 远程登录用户
    pub deploy_user: String,
    /// 远程 compose 工作目录
    pub compose_dir: String,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let database = DatabaseConfig {
            host: load_with_fallback("DB_HOST", "POSTGRES_HOST")
                .unwrap_or_else(|| "localhost".to_string()),
            port: env::var("DB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5432),
            name: load_with_fallback("DB_NAME", "POSTGRES_DB")
                .unwrap_or_else(|| "cloudlab".to_string()),
            user: load_with_fallback("DB_USER", "POSTGRES_USER")
                .unwrap_or_else(|| "postgres".to_string()),
            password: load_with_fallback("DB_PASSWORD", "POSTGRES_PASSWORD")
                .unwrap_or_else(|| "postgres".to_string()),
        };
        if env::var("POSTGRES_HOST").is_ok() {
            warn!("POSTGRES_* variables are deprecated here. Please use DB_*");
        }

        let cache = CacheConfig {
            host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6379),
            db: env::var("REDIS_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
        };

        let ports = PortConfig {
            rds_api: port_from_env("RDS_API_PORT", 8000),
            cache_api: port_from_env("CACHE_API_PORT", 8001),
            frontend: port_from_env("FRONTEND_PORT", 8080),
            agent: port_from_env("AGENT_PORT", 9000),
        };

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| parse_origin_list(&v))
            .unwrap_or_default();

        let probe_timeout_secs = env::var("PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::DEFAULT_PROBE_TIMEOUT_SECS);

        let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());

        let rds_api_url = env::var("RDS_API_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", ports.rds_api));
        let cache_api_url = env::var("CACHE_API_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", ports.cache_api));

        let pipeline = PipelineConfig::from_env();

        let webhook_url = env::var("PIPELINE_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            database,
            cache,
            ports,
            cors_allowed_origins,
            probe_timeout_secs,
            static_dir,
            rds_api_url,
            cache_api_url,
            pipeline,
            webhook_url,
        }
    }
}

impl PipelineConfig {
    /// 从环境变量加载流水线配置
    pub fn from_env() -> Self {
        Self {
            registry_url: env::var("REGISTRY_URL").unwrap_or_else(|_| "localhost:5000".to_string()),
            image_prefix: env::var("IMAGE_PREFIX").unwrap_or_else(|_| "cloudlab".to_string()),
            deploy_host: env::var("DEPLOY_HOST").ok().filter(|s| !s.is_empty()),
            deploy_user: env::var("DEPLOY_USER").unwrap_or_else(|_| "ubuntu".to_string()),
            compose_dir: env::var("DEPLOY_COMPOSE_DIR")
                .unwrap_or_else(|_| "~/cloudlab".to_string()),
        }
    }
}

/// 解析逗号分隔的来源列表，忽略空项
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 读取端口号环境变量
fn port_from_env(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 默认探测超时（秒）
    pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

    /// 数据库连接池大小
    pub const DB_POOL_MAX_CONNECTIONS: u32 = 5;

    /// 单个镜像构建超时（秒）
    pub const BUILD_TIMEOUT_SECS: u64 = 1800; // 30 分钟

    /// 镜像推送超时（秒）
    pub const PUSH_TIMEOUT_SECS: u64 = 600;

    /// 单条远程命令超时（秒）
    pub const ROLLOUT_TIMEOUT_SECS: u64 = 600; // 10 分钟

    /// 整次流水线运行超时（秒）
    pub const RUN_TIMEOUT_SECS: u64 = 3600;

    /// 运行历史最大保存数量
    pub const MAX_RUN_HISTORY: usize = 50;

    /// 日志通道容量
    pub const LOG_CHANNEL_CAPACITY: usize = 256;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_fallback() {
        // 设置测试环境变量
        env::set_var("TEST_PRIMARY", "primary_value");
        env::set_var("TEST_FALLBACK", "fallback_value");

        assert_eq!(
            load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"),
            Some("primary_value".to_string())
        );

        env::remove_var("TEST_PRIMARY");
        assert_eq!(
            load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"),
            Some("fallback_value".to_string())
        );

        env::remove_var("TEST_FALLBACK");
        assert_eq!(load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"), None);
    }

    #[test]
    fn test_parse_origin_list() {
        let origins = parse_origin_list("http://localhost:8080, https://demo.example.com/ ,");
        assert_eq!(
            origins,
            vec![
                "http://localhost:8080".to_string(),
                "https://demo.example.com".to_string()
            ]
        );
        assert!(parse_origin_list("").is_empty());
    }

    #[test]
    fn test_cache_url_with_password() {
        let cache = CacheConfig {
            host: "redis".to_string(),
            port: 6379,
            db: 1,
            password: Some("secret".to_string()),
        };
        assert_eq!(cache.url(), "redis://:secret@redis:6379/1");
    }

    #[test]
    fn test_cache_url_without_password() {
        let cache = CacheConfig {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        };
        assert_eq!(cache.url(), "redis://localhost:6379/0");
    }
}
