// src/exec/command.rs

//! Shell-command step handler.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{EtlDagError, Result};
use crate::exec::handler::{Artifact, ExecutionError, StepContext, StepFuture, StepHandler};
use crate::exec::template::render;

/// Environment variable holding the dependency artifacts, one per line.
pub const DEPENDENCIES_ENV: &str = "ETLDAG_DEPENDENCIES";
/// Environment variable holding the step's own artifact reference.
pub const ARTIFACT_ENV: &str = "ETLDAG_ARTIFACT";
/// Environment variable holding the full step id.
pub const STEP_ENV: &str = "ETLDAG_STEP";

/// Runs one shell command per step, chosen by channel.
///
/// A zero exit status means success and yields the rendered artifact
/// template. If cancellation is signalled while the command runs, the
/// child process is killed and the step fails with
/// [`ExecutionError::Cancelled`].
#[derive(Debug, Clone)]
pub struct CommandHandler {
    default_cmd: Option<String>,
    channel_cmds: BTreeMap<String, String>,
    artifact: String,
}

impl CommandHandler {
    pub fn new(cmd: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            default_cmd: Some(cmd.into()),
            channel_cmds: BTreeMap::new(),
            artifact: artifact.into(),
        }
    }

    /// Build from a validated config. Fails if no command is configured at
    /// all.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        if cfg.handler.cmd.is_none() && cfg.handler.channels.is_empty() {
            return Err(EtlDagError::ConfigError(
                "[handler].cmd must be set to execute steps".to_string(),
            ));
        }
        Ok(Self {
            default_cmd: cfg.handler.cmd.clone(),
            channel_cmds: cfg.handler.channels.clone(),
            artifact: cfg.handler.artifact.clone(),
        })
    }

    pub fn with_channel(mut self, channel: impl Into<String>, cmd: impl Into<String>) -> Self {
        self.channel_cmds.insert(channel.into(), cmd.into());
        self
    }

    fn template_for(&self, channel: &str) -> Option<&str> {
        self.channel_cmds
            .get(channel)
            .map(String::as_str)
            .or(self.default_cmd.as_deref())
    }

    async fn run(&self, ctx: StepContext) -> std::result::Result<Artifact, ExecutionError> {
        let channel = ctx.step.channel().as_str().to_string();
        let template = self.template_for(&channel).ok_or_else(|| {
            ExecutionError::Launch(format!("no command configured for channel '{channel}'"))
        })?;

        let command_line = render(template, &ctx.step);
        let artifact = Artifact::new(render(&self.artifact, &ctx.step));
        let dependencies = ctx
            .dependencies
            .iter()
            .map(|(_, a)| a.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        info!(step = %ctx.step, cmd = %command_line, "starting step process");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&command_line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&command_line);
            c
        };

        cmd.env(STEP_ENV, ctx.step.to_string())
            .env(ARTIFACT_ENV, artifact.as_str())
            .env(DEPENDENCIES_ENV, dependencies)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::Launch(format!("spawning '{command_line}': {e}")))?;

        // Drain both pipes so the child never blocks on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            let step = ctx.step.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(step = %step, "stdout: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let step = ctx.step.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(step = %step, "stderr: {}", line);
                }
            });
        }

        let mut cancel = ctx.cancel.clone();

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    ExecutionError::Launch(format!("waiting for '{command_line}': {e}"))
                })?;
                let code = status.code().unwrap_or(-1);

                info!(
                    step = %ctx.step,
                    exit_code = code,
                    success = status.success(),
                    "step process exited"
                );

                if status.success() {
                    Ok(artifact)
                } else {
                    Err(ExecutionError::CommandFailed { code })
                }
            }

            _ = cancel.cancelled() => {
                info!(step = %ctx.step, "cancellation requested; killing step process");
                if let Err(e) = child.kill().await {
                    warn!(step = %ctx.step, error = %e, "failed to kill step process");
                }
                Err(ExecutionError::Cancelled)
            }
        }
    }
}

impl StepHandler for CommandHandler {
    fn execute(&self, ctx: StepContext) -> StepFuture<'_> {
        Box::pin(self.run(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::HandlerSection;

    #[test]
    fn channel_override_wins_over_default() {
        let handler = CommandHandler::new("run {id}", "out").with_channel("grapher", "upload {id}");
        assert_eq!(handler.template_for("grapher"), Some("upload {id}"));
        assert_eq!(handler.template_for("garden"), Some("run {id}"));
    }

    #[test]
    fn from_config_requires_a_command() {
        let cfg = ConfigFile::default();
        assert!(matches!(
            CommandHandler::from_config(&cfg),
            Err(EtlDagError::ConfigError(_))
        ));

        let mut cfg = ConfigFile::default();
        cfg.handler = HandlerSection {
            cmd: Some("true".to_string()),
            ..HandlerSection::default()
        };
        assert!(CommandHandler::from_config(&cfg).is_ok());
    }
}
