//! 进程自身的存活检查
//!
//! 与 `/test_connection/` 不同，这里不触达任何后端存储，
//! 只报告进程本身的状态，供编排运行时做存活探测

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::state::AppState;

/// 存活检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
    uptime_secs: i64,
    /// 当前活跃的流水线运行（仅 agent 角色会有值）
    #[serde(skip_serializing_if = "Option::is_none")]
    active_run: Option<String>,
}

/// 创建存活检查路由
pub fn router(service: &'static str) -> Router<Arc<AppState>> {
    Router::new().route(
        "/health",
        get(move |state: State<Arc<AppState>>| health_check(service, state)),
    )
}

/// 存活检查
///
/// GET /health
async fn health_check(
    service: &'static str,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let active_run = state.run_store.active_run_id().await;

    Json(HealthResponse {
        status: "ok",
        service,
        version: VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: state.uptime_secs(),
        active_run,
    })
}
