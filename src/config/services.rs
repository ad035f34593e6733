//! 发布服务清单
//!
//! 流水线第一阶段要构建并发布的三个应用服务

use std::env;

use super::env::PipelineConfig;

/// 单个待发布服务
#[derive(Clone, Debug, PartialEq)]
pub struct ReleaseService {
    /// 服务名 (e.g. "rds-api")
    pub name: String,
    /// Dockerfile 路径（相对仓库根目录）
    pub dockerfile: String,
    /// 构建上下文
    pub build_context: String,
    /// compose 中对应的服务名
    pub compose_service: String,
}

impl ReleaseService {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dockerfile: "Dockerfile".to_string(),
            build_context: ".".to_string(),
            compose_service: name.to_string(),
        }
    }

    /// 完整镜像名（不含 tag）
    pub fn image(&self, pipeline: &PipelineConfig) -> String {
        format!(
            "{}/{}-{}",
            pipeline.registry_url, pipeline.image_prefix, self.name
        )
    }
}

/// 默认的三个应用服务
const DEFAULT_SERVICES: [&str; 3] = ["rds-api", "cache-api", "frontend"];

/// 加载发布服务清单
///
/// `RELEASE_SERVICES` 可以用逗号分隔的服务名收窄清单（调试用），
/// 未设置时发布全部三个服务
pub fn release_services() -> Vec<ReleaseService> {
    let selected = env::var("RELEASE_SERVICES").ok();

    let names: Vec<String> = match &selected {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| {
                let known = DEFAULT_SERVICES.contains(&s.as_str());
                if !known {
                    tracing::warn!(service = %s, "Ignoring unknown service in RELEASE_SERVICES");
                }
                known
            })
            .collect(),
        None => DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
    };

    names.iter().map(|name| ReleaseService::new(name)).collect()
}
