//! 命令执行器
//!
//! 流水线各步骤统一经由这里调用外部进程，支持：
//! - 实时日志流式输出
//! - 超时控制
//! - 取消支持

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::domain::release::LogLine;

/// 命令执行错误
#[derive(Debug, Error)]
pub enum CommandError {
    /// 命令启动失败
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// 命令超时
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    /// 命令被取消
    #[error("command was cancelled")]
    Cancelled,
    /// 等待命令完成失败
    #[error("failed to wait for command: {0}")]
    Wait(std::io::Error),
}

/// 命令执行器
pub struct CommandRunner;

impl CommandRunner {
    /// 执行命令，stdout/stderr 逐行转发到日志通道
    ///
    /// 返回进程退出码；超时或取消时先杀掉子进程再返回错误
    pub async fn run_streamed(
        program: &str,
        args: &[String],
        log_tx: &broadcast::Sender<LogLine>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<i32, CommandError> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout_task = spawn_line_reader(child.stdout.take(), "stdout", log_tx.clone());
        let stderr_task = spawn_line_reader(child.stderr.take(), "stderr", log_tx.clone());

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(program, "Command cancelled, killing process");
                let _ = child.kill().await;
                Err(CommandError::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                error!(program, ?timeout, "Command timed out, killing process");
                let _ = child.kill().await;
                Err(CommandError::Timeout(timeout))
            }
            status = child.wait() => {
                let status = status.map_err(CommandError::Wait)?;
                Ok(status.code().unwrap_or(-1))
            }
        };

        // 等待日志读取完成，避免丢失尾部输出
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        result
    }

    /// 执行简单命令，收集完整输出（无流式转发）
    pub async fn run_simple(
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<std::process::Output, CommandError> {
        let output = Command::new(program).args(args).output();

        tokio::select! {
            result = output => result.map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            }),
            _ = tokio::time::sleep(timeout) => Err(CommandError::Timeout(timeout)),
        }
    }
}

/// 启动一个逐行读取任务，把输出转发到广播通道
fn spawn_line_reader<R>(
    source: Option<R>,
    stream: &'static str,
    log_tx: broadcast::Sender<LogLine>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Some(source) = source {
            let reader = BufReader::new(source);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = log_tx.send(LogLine::new(stream, line));
            }
        }
    })
}
