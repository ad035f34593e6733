//! CloudLab - DevOps 训练演示栈
//!
//! 一个二进制承载全部进程角色：
//! - rds-api / cache-api：两个健康检查后端
//! - frontend：静态探测页面
//! - agent：可通过 HTTP 触发的交付流水线
//! - release：流水线的一次性 CLI 入口（CI 使用）

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod pipeline;
pub mod probe;
pub mod state;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;
use crate::domain::release::{PipelineRun, RunStatus};
use crate::state::AppState;

/// 进程角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    RdsApi,
    CacheApi,
    Frontend,
    Agent,
    Release,
    /// 演示模式：rds-api + cache-api + frontend 同进程并发
    Demo,
}

/// 命令行运行配置
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub role: Role,
    pub port_override: Option<u16>,
    pub commit_ref: Option<String>,
    pub skip_rollout: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            role: Role::Demo,
            port_override: None,
            commit_ref: None,
            skip_rollout: false,
        }
    }
}

/// 初始化并运行指定角色，返回进程退出码
pub async fn init_and_run(runtime: RuntimeConfig) -> i32 {
    init_tracing();

    let config = EnvConfig::from_env();
    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            return 1;
        }
    };

    let ports = state.config.ports.clone();
    let result = match runtime.role {
        Role::RdsApi => {
            serve(
                api::rds_api_router(state.clone()),
                runtime.port_override.unwrap_or(ports.rds_api),
                "rds-api",
            )
            .await
        }
        Role::CacheApi => {
            serve(
                api::cache_api_router(state.clone()),
                runtime.port_override.unwrap_or(ports.cache_api),
                "cache-api",
            )
            .await
        }
        Role::Frontend => {
            serve(
                api::frontend_router(state.clone()),
                runtime.port_override.unwrap_or(ports.frontend),
                "frontend",
            )
            .await
        }
        Role::Agent => {
            serve(
                api::agent_router(state.clone()),
                runtime.port_override.unwrap_or(ports.agent),
                "agent",
            )
            .await
        }
        Role::Demo => run_demo(state).await,
        Role::Release => {
            return run_release(state, runtime.commit_ref, runtime.skip_rollout).await;
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Server terminated with error");
            1
        }
    }
}

/// 初始化 tracing 订阅器
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cloudlab=info,tower_http=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 启动一个 HTTP 服务
async fn serve(
    router: axum::Router,
    port: u16,
    role: &'static str,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(role, port, "Listening");
    axum::serve(listener, router).await
}

/// 演示模式：三个服务并发，任一退出即整体退出
async fn run_demo(state: Arc<AppState>) -> Result<(), std::io::Error> {
    let ports = state.config.ports.clone();
    tracing::info!("Starting demo mode (rds-api + cache-api + frontend)");

    tokio::try_join!(
        serve(api::rds_api_router(state.clone()), ports.rds_api, "rds-api"),
        serve(
            api::cache_api_router(state.clone()),
            ports.cache_api,
            "cache-api"
        ),
        serve(
            api::frontend_router(state.clone()),
            ports.frontend,
            "frontend"
        ),
    )?;

    Ok(())
}

/// CLI 一次性流水线运行，日志回显到控制台
async fn run_release(
    state: Arc<AppState>,
    commit_ref: Option<String>,
    skip_rollout: bool,
) -> i32 {
    let run_id = uuid::Uuid::new_v4().to_string();
    let run = PipelineRun::new(
        run_id.clone(),
        commit_ref.clone(),
        state.config.pipeline.deploy_host.clone(),
    );
    let log_tx = state.run_store.create(run).await;

    // 把运行日志回显到控制台，直到通道关闭。
    // 订阅后立刻释放本地发送端，否则通道永远不会关闭
    let mut rx = log_tx.subscribe();
    drop(log_tx);
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => {
                    if line.stream == "stderr" {
                        eprintln!("{}", line.content);
                    } else {
                        println!("{}", line.content);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let status = pipeline::execute(state, run_id, commit_ref, skip_rollout).await;
    let _ = printer.await;

    match status {
        RunStatus::Success => 0,
        _ => 1,
    }
}
