//! 流水线运行存储
//!
//! 管理活跃运行、历史记录和每次运行的日志广播通道。
//! 运行进入终态时通道随之关闭，SSE 订阅端据此收尾。

use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, RwLock};

use crate::config::env::constants::{LOG_CHANNEL_CAPACITY, MAX_RUN_HISTORY};
use crate::domain::release::{LogLine, PipelineRun, RunPhase, RunStatus, StageReport};

/// 运行存储
pub struct RunStore {
    /// 活跃运行 (run_id -> PipelineRun)
    active: RwLock<HashMap<String, PipelineRun>>,
    /// 历史记录，新的在前
    history: RwLock<VecDeque<PipelineRun>>,
    /// 日志通道 (run_id -> sender)，终态时移除
    channels: RwLock<HashMap<String, broadcast::Sender<LogLine>>>,
    /// 最大历史记录数
    max_history: usize,
}

impl RunStore {
    /// 创建新的运行存储
    pub fn new() -> Self {
        Self::with_capacity(MAX_RUN_HISTORY)
    }

    /// 使用自定义历史容量创建
    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            channels: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    /// 登记新运行，返回其日志发送端
    pub async fn create(&self, run: PipelineRun) -> broadcast::Sender<LogLine> {
        let run_id = run.id.clone();

        {
            let mut active = self.active.write().await;
            active.insert(run_id.clone(), run);
        }

        let (sender, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let mut channels = self.channels.write().await;
        channels.insert(run_id, sender.clone());
        sender
    }

    /// 是否存在活跃运行
    pub async fn has_active(&self) -> bool {
        let active = self.active.read().await;
        !active.is_empty()
    }

    /// 获取运行（优先活跃，再查历史）
    pub async fn get(&self, run_id: &str) -> Option<PipelineRun> {
        {
            let active = self.active.read().await;
            if let Some(run) = active.get(run_id) {
                return Some(run.clone());
            }
        }
        let history = self.history.read().await;
        history.iter().find(|r| r.id == run_id).cloned()
    }

    /// 获取当前活跃运行的 ID
    pub async fn active_run_id(&self) -> Option<String> {
        let active = self.active.read().await;
        active.keys().next().cloned()
    }

    /// 最近的运行，活跃在前，支持状态过滤
    pub async fn recent(&self, limit: usize, status: Option<&str>) -> Vec<PipelineRun> {
        let mut runs: Vec<PipelineRun> = {
            let active = self.active.read().await;
            active.values().cloned().collect()
        };
        {
            let history = self.history.read().await;
            runs.extend(history.iter().cloned());
        }

        runs.into_iter()
            .filter(|run| status.map_or(true, |s| run.status.as_str() == s))
            .take(limit)
            .collect()
    }

    /// 更新活跃运行的步骤详情
    pub async fn update_stages(&self, run_id: &str, stages: Vec<StageReport>) {
        let mut active = self.active.write().await;
        if let Some(run) = active.get_mut(run_id) {
            run.stages = stages;
        }
    }

    /// 推进活跃运行的阶段
    pub async fn advance_phase(&self, run_id: &str, phase: RunPhase) {
        let mut active = self.active.write().await;
        if let Some(run) = active.get_mut(run_id) {
            run.advance_phase(phase);
        }
    }

    /// 记录已发布的镜像 tag
    pub async fn record_image_tag(&self, run_id: &str, service: &str, tag: &str) {
        let mut active = self.active.write().await;
        if let Some(run) = active.get_mut(run_id) {
            run.record_image_tag(service, tag);
        }
    }

    /// 结束运行：移入历史并关闭日志通道
    pub async fn finish(&self, run_id: &str, status: RunStatus) -> Option<PipelineRun> {
        let run = {
            let mut active = self.active.write().await;
            active.remove(run_id).map(|mut run| {
                run.complete(status);
                run
            })
        };

        // 移除发送端即关闭通道，订阅者收到 Closed
        {
            let mut channels = self.channels.write().await;
            channels.remove(run_id);
        }

        if let Some(run) = run {
            let mut history = self.history.write().await;
            history.push_front(run.clone());
            while history.len() > self.max_history {
                history.pop_back();
            }
            Some(run)
        } else {
            None
        }
    }

    /// 订阅运行日志，运行不存在或已结束时返回 None
    pub async fn subscribe(&self, run_id: &str) -> Option<broadcast::Receiver<LogLine>> {
        let channels = self.channels.read().await;
        channels.get(run_id).map(|tx| tx.subscribe())
    }

    /// 获取日志发送端
    pub async fn sender(&self, run_id: &str) -> Option<broadcast::Sender<LogLine>> {
        let channels = self.channels.read().await;
        channels.get(run_id).map(|tx| tx.clone())
    }

    /// 历史记录总数
    pub async fn history_count(&self) -> usize {
        let history = self.history.read().await;
        history.len()
    }
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = RunStore::new();

        let run = PipelineRun::new("run-1".to_string(), Some("abc123".to_string()), None);
        let sender = store.create(run).await;
        assert!(store.has_active().await);

        // 日志通道可订阅
        let mut rx = store.subscribe("run-1").await.unwrap();
        let _ = sender.send(LogLine::stdout("building"));
        assert_eq!(rx.recv().await.unwrap().content, "building");

        // 结束运行
        let finished = store.finish("run-1", RunStatus::Success).await.unwrap();
        assert_eq!(finished.status, RunStatus::Success);
        assert!(finished.finished_at.is_some());
        assert!(!store.has_active().await);

        // 历史可查，通道已关闭
        let from_history = store.get("run-1").await.unwrap();
        assert_eq!(from_history.status, RunStatus::Success);
        assert!(store.subscribe("run-1").await.is_none());
    }

    #[tokio::test]
    async fn test_history_limit() {
        let store = RunStore::with_capacity(5);

        for i in 0..10 {
            let run = PipelineRun::new(format!("run-{}", i), None, None);
            store.create(run).await;
            store.finish(&format!("run-{}", i), RunStatus::Success).await;
        }

        // 只保留最近 5 个
        assert_eq!(store.history_count().await, 5);
        assert!(store.get("run-9").await.is_some());
        assert!(store.get("run-0").await.is_none());
    }

    #[tokio::test]
    async fn test_recent_filters_by_status() {
        let store = RunStore::new();

        let run = PipelineRun::new("ok".to_string(), None, None);
        store.create(run).await;
        store.finish("ok", RunStatus::Success).await;

        let run = PipelineRun::new("bad".to_string(), None, None);
        store.create(run).await;
        store.finish("bad", RunStatus::Failed).await;

        let failed = store.recent(10, Some("failed")).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "bad");

        let all = store.recent(10, None).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_phase_updates_apply_to_active_run() {
        let store = RunStore::new();
        let run = PipelineRun::new("run-1".to_string(), None, None);
        store.create(run).await;

        store.advance_phase("run-1", RunPhase::Built).await;
        store
            .record_image_tag("run-1", "rds-api", "registry/cloudlab-rds-api:latest")
            .await;

        let run = store.get("run-1").await.unwrap();
        assert_eq!(run.phase, Some(RunPhase::Built));
        assert_eq!(run.image_tags.len(), 1);
    }
}
