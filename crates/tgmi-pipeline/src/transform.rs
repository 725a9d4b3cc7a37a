//! Hand-off to the external transformation tool.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::TransformError;

/// The downstream transform over the warehouse tables.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Runs the transform to completion. Any error is stage-fatal.
    async fn run(&self) -> Result<(), TransformError>;
}

/// Runs `<program> run` then `<program> test` inside `workdir`.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: String,
    workdir: PathBuf,
}

const STEPS: [&str; 2] = ["run", "test"];

impl CommandTransform {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn run(&self) -> Result<(), TransformError> {
        for step in STEPS {
            tracing::info!(program = %self.program, step, workdir = %self.workdir.display(), "running transform step");

            let output = tokio::process::Command::new(&self.program)
                .arg(step)
                .current_dir(&self.workdir)
                .output()
                .await
                .map_err(|source| TransformError::Spawn {
                    program: self.program.clone(),
                    step,
                    source,
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                return Err(TransformError::Failed {
                    program: self.program.clone(),
                    step,
                    status: output.status.to_string(),
                    stderr,
                });
            }
        }
        Ok(())
    }
}
