//! 交付流水线
//!
//! 两阶段顺序工作流：发布（构建并推送三个服务镜像）与发布上线
//! （远程拉取并重启）。第二阶段的进入条件由代码显式判定：只有
//! 第一阶段对全部服务成功后才会发出任何远程命令。

pub mod context;
pub mod publish;
pub mod rollout;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::env::constants::RUN_TIMEOUT_SECS;
use crate::config::ReleaseService;
use crate::domain::release::{RunPhase, RunStatus, StageReport};
use crate::infra::{CommandError, CommandRunner};
use crate::state::AppState;

pub use context::RunContext;

/// 流水线步骤的命令执行接口
///
/// 真实实现经由 `CommandRunner` 调用外部进程；测试用脚本化
/// 实现验证第二阶段的准入门
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// 执行一条命令，返回退出码
    async fn run(
        &self,
        ctx: &RunContext,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<i32, CommandError>;
}

/// 默认执行器：调用外部进程并流式转发输出
pub struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(
        &self,
        ctx: &RunContext,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<i32, CommandError> {
        CommandRunner::run_streamed(program, args, &ctx.log_tx, &ctx.cancel_token, timeout).await
    }
}

/// 执行一次完整的流水线运行
///
/// 调用方需已通过 `RunStore::create` 登记运行并创建日志通道。
/// 返回最终状态，运行记录与回调在内部收尾。
pub async fn execute(
    state: Arc<AppState>,
    run_id: String,
    commit_ref: Option<String>,
    skip_rollout: bool,
) -> RunStatus {
    let log_tx = match state.run_store.sender(&run_id).await {
        Some(tx) => tx,
        None => {
            tracing::error!(run_id = %run_id, "No log channel for run, aborting");
            return RunStatus::Failed;
        }
    };

    let cancel_token = CancellationToken::new();
    let timeout_guard = spawn_timeout(run_id.clone(), cancel_token.clone());

    let ctx = RunContext {
        run_id: run_id.clone(),
        state: state.clone(),
        log_tx,
        cancel_token,
    };

    let services = crate::config::release_services();
    let status = run_pipeline(
        &ctx,
        &ShellExecutor,
        &services,
        commit_ref.as_deref(),
        skip_rollout,
    )
    .await;

    timeout_guard.abort();

    ctx.finish(status.clone()).await;

    tracing::info!(
        run_id = %run_id,
        status = status.as_str(),
        "Pipeline run finished"
    );

    status
}

/// 两阶段流水线核心
///
/// 阶段一：三个服务并发构建推送，全部完成后才继续。
/// 准入门：任何发布失败都会把全部上线步骤置为 Skipped 并结束运行，
/// 不发出任何远程命令。
/// 阶段二：远程 compose pull / up / prune，失败即终止，不回滚。
pub async fn run_pipeline(
    ctx: &RunContext,
    exec: &dyn CommandExecutor,
    services: &[ReleaseService],
    commit: Option<&str>,
    skip_rollout: bool,
) -> RunStatus {
    let pipeline = ctx.state.config.pipeline.clone();

    ctx.log_stdout("=== CloudLab Delivery Pipeline ===");
    ctx.log_stdout(&format!("Registry: {}", pipeline.registry_url));
    ctx.log_stdout(&format!("Commit: {}", commit.unwrap_or("(none)")));
    ctx.log_stdout(&format!(
        "Services: {}",
        services
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));

    // ---- Stage 1: Publish ----
    let outcomes = join_all(
        services
            .iter()
            .map(|svc| publish::publish_service(ctx, exec, svc, commit)),
    )
    .await;

    let mut stages: Vec<StageReport> = outcomes.iter().flat_map(|o| o.stages.clone()).collect();
    ctx.update_stages(stages.clone()).await;

    for outcome in &outcomes {
        if let Some(ref tag) = outcome.tag {
            ctx.record_image_tag(&outcome.service, tag).await;
        }
    }

    let all_built = !outcomes.is_empty() && outcomes.iter().all(|o| o.built);
    let all_pushed = !outcomes.is_empty() && outcomes.iter().all(|o| o.pushed);
    if all_built {
        ctx.advance_phase(RunPhase::Built).await;
    }
    if all_pushed {
        ctx.advance_phase(RunPhase::Pushed).await;
    }

    // ---- The gate: stage 2 only after a fully successful stage 1 ----
    if !all_pushed {
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.pushed)
            .map(|o| o.service.as_str())
            .collect();
        ctx.log_stderr(&format!(
            "Publish stage failed for: {}. Rollout will not start.",
            failed.join(", ")
        ));
        stages.extend(rollout::skipped_stages("publish stage failed"));
        ctx.update_stages(stages).await;
        return RunStatus::Failed;
    }

    ctx.log_stdout("Publish stage complete for all services");

    if skip_rollout {
        ctx.log_stdout("Rollout skipped by request");
        stages.extend(rollout::skipped_stages("skipped by request"));
        ctx.update_stages(stages).await;
        return RunStatus::Success;
    }

    let host = match pipeline.deploy_host.clone() {
        Some(host) => host,
        None => {
            ctx.log_stderr("No deploy host configured (DEPLOY_HOST); cannot roll out");
            stages.extend(rollout::skipped_stages("no deploy host configured"));
            ctx.update_stages(stages).await;
            return RunStatus::Failed;
        }
    };

    // ---- Stage 2: Rollout ----
    let rollout_ok = rollout::run(ctx, exec, &pipeline, &host, &mut stages).await;

    if rollout_ok {
        RunStatus::Success
    } else {
        RunStatus::Failed
    }
}

/// 运行级超时保护
fn spawn_timeout(run_id: String, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(RUN_TIMEOUT_SECS)).await;
        tracing::error!(
            run_id = %run_id,
            "Pipeline run timed out after {} minutes",
            RUN_TIMEOUT_SECS / 60
        );
        cancel_token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::release_services;
    use crate::domain::release::{PipelineRun, StageStatus};
    use crate::state::app_state::test_support::test_state;
    use std::sync::Mutex;

    /// 脚本化执行器：记录每条命令，按规则决定成败
    struct ScriptedExecutor {
        /// (program, args) 调用记录
        calls: Mutex<Vec<(String, Vec<String>)>>,
        /// 命令行包含此子串时返回非零退出码
        fail_on: Option<String>,
    }

    impl ScriptedExecutor {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(needle: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(needle.to_string()),
            }
        }

        fn recorded(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }

        fn programs(&self) -> Vec<String> {
            self.recorded().into_iter().map(|(p, _)| p).collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(
            &self,
            _ctx: &RunContext,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<i32, CommandError> {
            let line = format!("{} {}", program, args.join(" "));
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));

            match &self.fail_on {
                Some(needle) if line.contains(needle.as_str()) => Ok(1),
                _ => Ok(0),
            }
        }
    }

    /// 在测试状态中登记一次运行并构建上下文
    async fn test_run_context(id: &str) -> RunContext {
        let state = test_state();
        let run = PipelineRun::new(
            id.to_string(),
            Some("abc1234".to_string()),
            state.config.pipeline.deploy_host.clone(),
        );
        let log_tx = state.run_store.create(run).await;

        RunContext {
            run_id: id.to_string(),
            state,
            log_tx,
            cancel_token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_happy_path_runs_rollout_in_order() {
        let ctx = test_run_context("run-ok").await;
        let exec = ScriptedExecutor::succeeding();
        let services = release_services();

        let status = run_pipeline(&ctx, &exec, &services, Some("abc1234"), false).await;
        assert_eq!(status, RunStatus::Success);

        // 远程命令按 pull -> up -> prune 顺序
        let ssh_cmds: Vec<String> = exec
            .recorded()
            .into_iter()
            .filter(|(p, _)| p == "ssh")
            .map(|(_, args)| args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(ssh_cmds.len(), 3);
        assert!(ssh_cmds[0].contains("docker compose pull"));
        assert!(ssh_cmds[1].contains("docker compose up -d"));
        assert!(ssh_cmds[2].contains("docker image prune -f"));

        // 阶段推进到 Running，镜像 tag 全部记录
        let run = ctx.state.run_store.get("run-ok").await.unwrap();
        assert_eq!(run.phase, Some(RunPhase::Running));
        assert_eq!(run.image_tags.len(), services.len());
        for tag in run.image_tags.values() {
            assert!(tag.ends_with(":abc1234"));
        }
    }

    #[tokio::test]
    async fn test_failed_build_blocks_rollout_entirely() {
        let ctx = test_run_context("run-gate").await;
        // cache-api 的构建失败
        let exec = ScriptedExecutor::failing_on("cloudlab-cache-api:latest -f");
        let services = release_services();

        let status = run_pipeline(&ctx, &exec, &services, None, false).await;
        assert_eq!(status, RunStatus::Failed);

        // 没有任何远程命令被发出
        assert!(!exec.programs().iter().any(|p| p == "ssh"));

        // 上线步骤全部 Skipped
        let run = ctx.state.run_store.get("run-gate").await.unwrap();
        let rollout_stages: Vec<_> = run
            .stages
            .iter()
            .filter(|s| ["compose_pull", "compose_up", "image_prune"].contains(&s.name.as_str()))
            .collect();
        assert_eq!(rollout_stages.len(), 3);
        assert!(rollout_stages
            .iter()
            .all(|s| s.status == StageStatus::Skipped));

        // 阶段未达到 Pushed
        assert_ne!(run.phase, Some(RunPhase::Pushed));
    }

    #[tokio::test]
    async fn test_skip_rollout_succeeds_without_remote_commands() {
        let ctx = test_run_context("run-skip").await;
        let exec = ScriptedExecutor::succeeding();
        let services = release_services();

        let status = run_pipeline(&ctx, &exec, &services, None, true).await;
        assert_eq!(status, RunStatus::Success);
        assert!(!exec.programs().iter().any(|p| p == "ssh"));

        let run = ctx.state.run_store.get("run-skip").await.unwrap();
        assert_eq!(run.phase, Some(RunPhase::Pushed));
    }

    #[tokio::test]
    async fn test_failed_remote_command_fails_run_without_rollback() {
        let ctx = test_run_context("run-remote").await;
        let exec = ScriptedExecutor::failing_on("docker compose up");
        let services = release_services();

        let status = run_pipeline(&ctx, &exec, &services, None, false).await;
        assert_eq!(status, RunStatus::Failed);

        // pull 已执行，up 失败后 prune 不再尝试
        let ssh_cmds: Vec<String> = exec
            .recorded()
            .into_iter()
            .filter(|(p, _)| p == "ssh")
            .map(|(_, args)| args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(ssh_cmds.len(), 2);

        let run = ctx.state.run_store.get("run-remote").await.unwrap();
        let prune = run
            .stages
            .iter()
            .find(|s| s.name == "image_prune")
            .unwrap();
        assert_eq!(prune.status, StageStatus::Skipped);

        // 阶段停在 Pulled，不会回退
        assert_eq!(run.phase, Some(RunPhase::Pulled));
    }

    #[tokio::test]
    async fn test_no_commit_ref_pushes_latest_only() {
        let ctx = test_run_context("run-latest").await;
        let exec = ScriptedExecutor::succeeding();
        let services = release_services();

        let status = run_pipeline(&ctx, &exec, &services, None, true).await;
        assert_eq!(status, RunStatus::Success);

        // 没有 docker tag 调用，记录的 tag 均为 :latest
        assert!(!exec
            .recorded()
            .iter()
            .any(|(p, args)| p == "docker" && args.first().map(String::as_str) == Some("tag")));

        let run = ctx.state.run_store.get("run-latest").await.unwrap();
        for tag in run.image_tags.values() {
            assert!(tag.ends_with(":latest"));
        }
    }
}
