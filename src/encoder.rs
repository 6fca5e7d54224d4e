//! The ffmpeg invocation seam.

use anyhow::{anyhow, Context, Result};
use std::process::Command as ProcCommand;

use crate::plan::RenderPlan;

/// Executes a render plan. The run loop only depends on this trait, so
/// tests can count invocations without spawning anything.
pub trait Encoder {
    fn encode(&self, plan: &RenderPlan) -> Result<()>;
}

/// Spawns the real ffmpeg binary and waits for it to exit.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    command: String,
}

impl FfmpegEncoder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, plan: &RenderPlan) -> Result<()> {
        let status = ProcCommand::new(&self.command)
            .args(&plan.args)
            .status()
            .with_context(|| format!("running {}", self.command))?;
        if !status.success() {
            return Err(anyhow!(
                "{} exited with {} for {}",
                self.command,
                status,
                plan.output.display()
            ));
        }
        Ok(())
    }
}
