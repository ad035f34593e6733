//! API 模块
//!
//! HTTP handlers 和各角色的路由组装

pub mod connection;
pub mod health;
pub mod release;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::state::AppState;

/// 关系型健康后端（rds-api 角色）
pub fn rds_api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(connection::rds_router())
        .merge(health::router("rds-api"))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .with_state(state)
}

/// 缓存健康后端（cache-api 角色）
pub fn cache_api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(connection::cache_router())
        .merge(health::router("cache-api"))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .with_state(state)
}

/// 静态前端（frontend 角色）
///
/// 静态资源用 `ServeDir` 兜底，`/config.js` 动态注入两个后端地址
pub fn frontend_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config.js", get(config_js))
        .merge(health::router("frontend"))
        .fallback_service(ServeDir::new(state.config.static_dir.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 交付代理（agent 角色）
pub fn agent_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(release::router())
        .merge(health::router("agent"))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .with_state(state)
}

/// 按配置构建跨域层
///
/// 未配置来源列表时放行所有来源（训练演示的默认行为）
fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(origins)
    }
}

/// 前端运行时配置
///
/// GET /config.js
async fn config_js(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = format!(
        "window.CLOUDLAB = {{ rdsApiUrl: {}, cacheApiUrl: {} }};\n",
        serde_json::json!(state.config.rds_api_url),
        serde_json::json!(state.config.cache_api_url),
    );

    (
        [(header::CONTENT_TYPE, "application/javascript")],
        body,
    )
}
