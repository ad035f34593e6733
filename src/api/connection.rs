//! 存储连通性检查 API
//!
//! 两个后端各暴露一个 `GET /test_connection/`，对各自的存储做一次
//! 带超时的同步往返。成功返回固定文案，失败返回 503 与失败描述。

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::probe::{self, ReachabilityProbe};
use crate::state::AppState;

/// 连通性检查响应
#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub message: String,
}

/// 关系型后端路由
pub fn rds_router() -> Router<Arc<AppState>> {
    Router::new().route("/test_connection/", get(rds_test_connection))
}

/// 缓存后端路由
pub fn cache_router() -> Router<Arc<AppState>> {
    Router::new().route("/test_connection/", get(cache_test_connection))
}

/// 关系型数据库连通性检查
///
/// GET /test_connection/
async fn rds_test_connection(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ConnectionResponse>> {
    test_connection(&state.relational_probe, &state).await
}

/// 键值缓存连通性检查
///
/// GET /test_connection/
async fn cache_test_connection(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ConnectionResponse>> {
    test_connection(&state.cache_probe, &state).await
}

/// 两个后端共用的检查逻辑
///
/// 结果每次新建并在响应后丢弃；失败经 `ProbeError -> ApiError`
/// 映射为 503
async fn test_connection(
    probe: &dyn ReachabilityProbe,
    state: &AppState,
) -> ApiResult<Json<ConnectionResponse>> {
    let result = probe::run_probe(probe, state.config.probe_timeout_secs).await?;

    Ok(Json(ConnectionResponse {
        message: result.message,
    }))
}
