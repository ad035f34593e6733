//! 流水线运行上下文
//!
//! 统一的运行执行上下文，封装运行标识、日志通道与取消令牌

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::domain::release::{LogLine, PipelineRun, RunPhase, RunStatus, StageReport};
use crate::state::AppState;

/// 流水线运行上下文
#[derive(Clone)]
pub struct RunContext {
    /// 运行 ID
    pub run_id: String,
    /// 应用状态
    pub state: Arc<AppState>,
    /// 日志发送通道
    pub log_tx: broadcast::Sender<LogLine>,
    /// 取消令牌
    pub cancel_token: CancellationToken,
}

impl RunContext {
    /// 发送日志
    pub fn log(&self, stream: &str, content: &str) {
        let _ = self.log_tx.send(LogLine::new(stream, content));
    }

    /// 发送 stdout 日志
    pub fn log_stdout(&self, content: &str) {
        self.log("stdout", content);
    }

    /// 发送 stderr 日志
    pub fn log_stderr(&self, content: &str) {
        self.log("stderr", content);
    }

    /// 更新步骤详情
    pub async fn update_stages(&self, stages: Vec<StageReport>) {
        self.state.run_store.update_stages(&self.run_id, stages).await;
    }

    /// 推进运行阶段
    pub async fn advance_phase(&self, phase: RunPhase) {
        self.state.run_store.advance_phase(&self.run_id, phase).await;
    }

    /// 记录已发布的镜像 tag
    pub async fn record_image_tag(&self, service: &str, tag: &str) {
        self.state
            .run_store
            .record_image_tag(&self.run_id, service, tag)
            .await;
    }

    /// 结束运行并推送回调
    pub async fn finish(&self, status: RunStatus) -> Option<PipelineRun> {
        let run = self.state.run_store.finish(&self.run_id, status).await;

        if let Some(ref run) = run {
            self.state.notifier.notify_run(run).await;
        }

        run
    }

    /// 检查是否被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
