//! 流水线管理 API（agent 角色）
//!
//! 包含 /pipeline/trigger, /pipeline/runs/* 端点

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::release::PipelineRun;
use crate::error::{ApiError, ApiResult};
use crate::pipeline;
use crate::state::AppState;

/// 触发流水线请求
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    /// 提交引用（tag 镜像用，缺省只推 latest）
    pub commit_ref: Option<String>,
    /// 只发布不上线
    #[serde(default)]
    pub skip_rollout: bool,
}

/// 触发流水线响应
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: String,
    pub status: String,
    pub stream_url: String,
}

/// 运行历史查询参数
#[derive(Debug, Deserialize)]
pub struct RunHistoryQuery {
    /// 返回数量限制，默认 20
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// 状态过滤 (success, failed, running)
    pub status: Option<String>,
}

fn default_limit() -> usize {
    20
}

/// 运行历史响应
#[derive(Debug, Serialize)]
pub struct RunHistoryResponse {
    pub runs: Vec<PipelineRun>,
    pub total: usize,
}

/// 创建流水线管理路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pipeline/trigger", post(trigger_run))
        .route("/pipeline/runs", get(recent_runs))
        .route("/pipeline/runs/:run_id", get(get_run))
        .route("/pipeline/runs/:run_id/stream", get(stream_logs))
}

/// 触发一次流水线运行
///
/// POST /pipeline/trigger
///
/// 同一时刻只允许一次运行；已有运行时返回 409。
/// 实际执行在 pipeline 模块，后台进行，立即返回 run_id
async fn trigger_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<impl IntoResponse> {
    if state.run_store.has_active().await {
        return Err(ApiError::conflict("A pipeline run is already in progress"));
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let run = PipelineRun::new(
        run_id.clone(),
        request.commit_ref.clone(),
        state.config.pipeline.deploy_host.clone(),
    );
    state.run_store.create(run).await;

    tracing::info!(
        run_id = %run_id,
        commit_ref = ?request.commit_ref,
        skip_rollout = request.skip_rollout,
        "Pipeline run triggered"
    );

    // 在后台执行（非阻塞）
    let state_clone = state.clone();
    let run_id_clone = run_id.clone();
    tokio::spawn(async move {
        pipeline::execute(
            state_clone,
            run_id_clone,
            request.commit_ref,
            request.skip_rollout,
        )
        .await;
    });

    Ok(Json(TriggerResponse {
        stream_url: format!("/pipeline/runs/{}/stream", run_id),
        run_id,
        status: "running".to_string(),
    }))
}

/// 获取运行详情
///
/// GET /pipeline/runs/:run_id
///
/// 活跃运行与历史记录都可查到
async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run = state
        .run_store
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Run '{}'", run_id)))?;

    Ok(Json(run))
}

/// 获取最近的运行
///
/// GET /pipeline/runs
async fn recent_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunHistoryQuery>,
) -> impl IntoResponse {
    let runs = state
        .run_store
        .recent(query.limit, query.status.as_deref())
        .await;
    let total = runs.len();

    Json(RunHistoryResponse { runs, total })
}

/// 流式日志
///
/// GET /pipeline/runs/:run_id/stream
async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut rx = state.run_store.subscribe(&run_id).await.ok_or_else(|| {
        ApiError::not_found(format!("Run '{}' not found or already completed", run_id))
    })?;

    let state_clone = state.clone();
    let run_id_clone = run_id.clone();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(log_line) => {
                    let json = serde_json::to_string(&log_line).unwrap_or_default();
                    yield Ok(Event::default().data(json));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(run_id = %run_id_clone, lagged = n, "Log subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // 发送结束事件
                    if let Some(run) = state_clone.run_store.get(&run_id_clone).await {
                        yield Ok(Event::default().event("complete").data(
                            serde_json::json!({
                                "status": run.status.as_str(),
                                "phase": run.phase.map(|p| p.as_str()),
                            }).to_string()
                        ));
                    }
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}
