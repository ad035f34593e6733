//! Publish stage execution
//!
//! Builds one service image, tags it and pushes it to the registry.
//! The three services run through this independently; the gate to the
//! rollout stage is owned by the pipeline module.

use std::time::Duration;

use crate::config::env::constants::{BUILD_TIMEOUT_SECS, PUSH_TIMEOUT_SECS};
use crate::config::ReleaseService;
use crate::domain::release::StageReport;

use super::context::RunContext;
use super::CommandExecutor;

/// Typed result of publishing a single service
pub struct PublishOutcome {
    pub service: String,
    pub stages: Vec<StageReport>,
    /// Registry tag recorded for this service (most specific one pushed)
    pub tag: Option<String>,
    pub built: bool,
    pub pushed: bool,
}

/// Build, tag and push one service image
pub async fn publish_service(
    ctx: &RunContext,
    exec: &dyn CommandExecutor,
    svc: &ReleaseService,
    commit: Option<&str>,
) -> PublishOutcome {
    let pipeline = &ctx.state.config.pipeline;
    let image = svc.image(pipeline);
    let latest_tag = format!("{}:latest", image);
    let commit_tag = commit.map(|c| format!("{}:{}", image, c));

    let mut stages = vec![
        StageReport::new(
            &format!("{}:docker_build", svc.name),
            &format!("Build {}", svc.name),
        ),
        StageReport::new(
            &format!("{}:docker_push", svc.name),
            &format!("Push {}", svc.name),
        ),
    ];
    if commit_tag.is_some() {
        stages.push(StageReport::new(
            &format!("{}:docker_push_commit", svc.name),
            &format!("Push {} commit tag", svc.name),
        ));
    }

    let mut outcome = PublishOutcome {
        service: svc.name.clone(),
        stages: Vec::new(),
        tag: None,
        built: false,
        pushed: false,
    };

    ctx.log_stdout(&format!("=== Publish {} ===", svc.name));
    ctx.log_stdout(&format!("Target image: {}", latest_tag));

    // Build
    stages[0].start();
    ctx.log_stdout(&format!(
        ">>> docker build -t {} -f {} {}",
        latest_tag, svc.dockerfile, svc.build_context
    ));
    let build_ok = run_step(
        ctx,
        exec,
        "docker",
        &[
            "build".to_string(),
            "-t".to_string(),
            latest_tag.clone(),
            "-f".to_string(),
            svc.dockerfile.clone(),
            svc.build_context.clone(),
        ],
        Duration::from_secs(BUILD_TIMEOUT_SECS),
    )
    .await;
    stages[0].finish(build_ok, (!build_ok).then(|| "docker build failed".to_string()));

    if !build_ok {
        ctx.log_stderr(&format!("Error: failed to build {}", svc.name));
        skip_rest(&mut stages, 1);
        outcome.stages = stages;
        return outcome;
    }
    outcome.built = true;
    ctx.log_stdout(&format!("Image built: {}", latest_tag));

    // Tag with the commit ref when one was given
    if let Some(ref commit_tag) = commit_tag {
        ctx.log_stdout(&format!(">>> docker tag {} {}", latest_tag, commit_tag));
        let tag_ok = run_step(
            ctx,
            exec,
            "docker",
            &[
                "tag".to_string(),
                latest_tag.clone(),
                commit_tag.clone(),
            ],
            Duration::from_secs(PUSH_TIMEOUT_SECS),
        )
        .await;
        if !tag_ok {
            ctx.log_stderr(&format!("Error: failed to tag {}", commit_tag));
            stages[1].skip(Some("tagging failed".to_string()));
            skip_rest(&mut stages, 2);
            outcome.stages = stages;
            return outcome;
        }
    }

    // Push latest
    stages[1].start();
    ctx.log_stdout(&format!(">>> docker push {}", latest_tag));
    let push_ok = run_step(
        ctx,
        exec,
        "docker",
        &["push".to_string(), latest_tag.clone()],
        Duration::from_secs(PUSH_TIMEOUT_SECS),
    )
    .await;
    stages[1].finish(push_ok, (!push_ok).then(|| "docker push failed".to_string()));

    if !push_ok {
        ctx.log_stderr(&format!("Error: failed to push {}", latest_tag));
        skip_rest(&mut stages, 2);
        outcome.stages = stages;
        return outcome;
    }
    outcome.tag = Some(latest_tag.clone());

    // Push the commit tag
    if let Some(ref commit_tag) = commit_tag {
        stages[2].start();
        ctx.log_stdout(&format!(">>> docker push {}", commit_tag));
        let push_commit_ok = run_step(
            ctx,
            exec,
            "docker",
            &["push".to_string(), commit_tag.clone()],
            Duration::from_secs(PUSH_TIMEOUT_SECS),
        )
        .await;
        stages[2].finish(
            push_commit_ok,
            (!push_commit_ok).then(|| "docker push failed".to_string()),
        );

        if !push_commit_ok {
            ctx.log_stderr(&format!("Error: failed to push {}", commit_tag));
            outcome.stages = stages;
            return outcome;
        }
        outcome.tag = Some(commit_tag.clone());
    }

    outcome.pushed = true;
    ctx.log_stdout(&format!("Published {}", svc.name));
    outcome.stages = stages;
    outcome
}

/// Run one step through the executor, mapping any error to failure
async fn run_step(
    ctx: &RunContext,
    exec: &dyn CommandExecutor,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> bool {
    match exec.run(ctx, program, args, timeout).await {
        Ok(0) => true,
        Ok(code) => {
            ctx.log_stderr(&format!("{} exited with code {}", program, code));
            false
        }
        Err(e) => {
            ctx.log_stderr(&format!("{} failed: {}", program, e));
            false
        }
    }
}

/// Mark every stage from `from` onwards as skipped
fn skip_rest(stages: &mut [StageReport], from: usize) {
    for stage in stages.iter_mut().skip(from) {
        stage.skip(Some("previous step failed".to_string()));
    }
}
