//! 运行状态回调
//!
//! 流水线运行结束后向可选的 webhook 推送结果，复用连接池。
//! 回调失败只记日志，绝不影响流水线本身的结果。

use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::release::PipelineRun;

/// 回调重试次数
const NOTIFY_ATTEMPTS: u32 = 3;

/// 状态回调客户端
#[derive(Clone)]
pub struct StatusNotifier {
    client: Client,
    webhook_url: Option<String>,
}

/// 回调请求体
#[derive(Serialize)]
struct RunNotification<'a> {
    run_id: &'a str,
    status: &'a str,
    commit_ref: Option<&'a str>,
    image_tags: &'a HashMap<String, String>,
    host: Option<&'a str>,
    finished_at: Option<String>,
}

impl StatusNotifier {
    /// 创建回调客户端
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .build()
            .unwrap_or_default();

        Self {
            client,
            webhook_url,
        }
    }

    /// 是否配置了回调地址
    pub fn has_webhook(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// 推送运行结果，带重试
    pub async fn notify_run(&self, run: &PipelineRun) {
        let url = match &self.webhook_url {
            Some(url) => url,
            None => return, // 未配置回调，静默返回
        };

        let body = RunNotification {
            run_id: &run.id,
            status: run.status.as_str(),
            commit_ref: run.commit_ref.as_deref(),
            image_tags: &run.image_tags,
            host: run.host.as_deref(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
        };

        for attempt in 1..=NOTIFY_ATTEMPTS {
            match self.client.post(url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        run_id = %run.id,
                        status = run.status.as_str(),
                        attempt,
                        "Notified pipeline webhook"
                    );
                    return;
                }
                Ok(resp) => {
                    warn!(
                        run_id = %run.id,
                        status = %resp.status(),
                        attempt,
                        "Pipeline webhook returned non-success status"
                    );
                }
                Err(e) => {
                    warn!(
                        run_id = %run.id,
                        error = %e,
                        attempt,
                        "Failed to reach pipeline webhook"
                    );
                }
            }

            if attempt < NOTIFY_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        warn!(
            run_id = %run.id,
            "Giving up on pipeline webhook after {} attempts",
            NOTIFY_ATTEMPTS
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_without_webhook() {
        let notifier = StatusNotifier::new(None);
        assert!(!notifier.has_webhook());
    }

    #[test]
    fn test_notifier_with_webhook() {
        let notifier = StatusNotifier::new(Some("https://example.com/hook".to_string()));
        assert!(notifier.has_webhook());
    }

    #[tokio::test]
    async fn test_notify_without_webhook_is_noop() {
        let notifier = StatusNotifier::new(None);
        let run = PipelineRun::new("run-1".to_string(), None, None);
        // 未配置回调时立即返回，不产生网络请求
        notifier.notify_run(&run).await;
    }
}
