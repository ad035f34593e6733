//! Rollout stage execution
//!
//! Opens one remote session per step against the deploy host and
//! replaces the running containers with the freshly published images
//! (stop-then-start via compose, then prune the leftovers).

use std::time::Duration;

use crate::config::env::constants::ROLLOUT_TIMEOUT_SECS;
use crate::config::PipelineConfig;
use crate::domain::release::{RunPhase, StageReport};

use super::context::RunContext;
use super::CommandExecutor;

/// The fixed rollout steps, in execution order
const ROLLOUT_STEPS: [(&str, &str, &str, Option<RunPhase>); 3] = [
    (
        "compose_pull",
        "Compose Pull",
        "docker compose pull",
        Some(RunPhase::Pulled),
    ),
    (
        "compose_up",
        "Compose Up",
        "docker compose up -d",
        Some(RunPhase::Running),
    ),
    ("image_prune", "Image Prune", "docker image prune -f", None),
];

/// Rollout stages in the skipped state, for runs that never reach stage 2
pub fn skipped_stages(reason: &str) -> Vec<StageReport> {
    ROLLOUT_STEPS
        .iter()
        .map(|(name, display_name, _, _)| {
            let mut stage = StageReport::new(name, display_name);
            stage.skip(Some(reason.to_string()));
            stage
        })
        .collect()
}

/// Execute the rollout against the deploy host
///
/// Appends its stage reports to `stages` and publishes progress after
/// every step. Any remote failure stops the sequence; the host keeps
/// whatever state the executed commands left.
pub async fn run(
    ctx: &RunContext,
    exec: &dyn CommandExecutor,
    pipeline: &PipelineConfig,
    host: &str,
    stages: &mut Vec<StageReport>,
) -> bool {
    let target = format!("{}@{}", pipeline.deploy_user, host);

    ctx.log_stdout("=== Rollout ===");
    ctx.log_stdout(&format!("Remote host: {}", target));
    ctx.log_stdout(&format!("Compose directory: {}", pipeline.compose_dir));

    let base = stages.len();
    for (name, display_name, _, _) in ROLLOUT_STEPS.iter() {
        stages.push(StageReport::new(name, display_name));
    }
    ctx.update_stages(stages.clone()).await;

    for (idx, (_, _, remote_cmd, phase)) in ROLLOUT_STEPS.iter().enumerate() {
        let stage_idx = base + idx;
        stages[stage_idx].start();
        ctx.update_stages(stages.clone()).await;

        let remote = format!("cd {} && {}", pipeline.compose_dir, remote_cmd);
        ctx.log_stdout(&format!(">>> ssh {} '{}'", target, remote));

        let args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            target.clone(),
            remote,
        ];

        let ok = match exec
            .run(ctx, "ssh", &args, Duration::from_secs(ROLLOUT_TIMEOUT_SECS))
            .await
        {
            Ok(0) => true,
            Ok(code) => {
                ctx.log_stderr(&format!("Remote command exited with code {}", code));
                false
            }
            Err(e) => {
                ctx.log_stderr(&format!("Remote session failed: {}", e));
                false
            }
        };

        stages[stage_idx].finish(ok, (!ok).then(|| "remote command failed".to_string()));
        ctx.update_stages(stages.clone()).await;

        if !ok {
            // No automatic rollback; remaining steps are not attempted
            for stage in stages.iter_mut().skip(stage_idx + 1) {
                stage.skip(Some("previous step failed".to_string()));
            }
            ctx.update_stages(stages.clone()).await;
            return false;
        }

        if let Some(phase) = phase {
            ctx.advance_phase(*phase).await;
        }
    }

    ctx.log_stdout("Rollout complete");
    true
}
