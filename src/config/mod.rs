//! 配置模块
//!
//! 环境变量解析与配置管理

pub mod env;
pub mod services;

pub use env::{CacheConfig, DatabaseConfig, EnvConfig, PipelineConfig};
pub use services::{release_services, ReleaseService};
