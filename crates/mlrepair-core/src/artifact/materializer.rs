use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::MaterializerConfig;
use crate::error::{RepairError, Result};

/// Turns a program source file into trainable artifacts.
///
/// For a source `<work_dir>/<name>.py` the materializer must create
/// `<out_dir>/<name>.py/` holding the model and hyperparameter files.
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn materialize(&self, source: &Path, work_dir: &Path, out_dir: &Path) -> Result<()>;
}

/// Runs the configured external command.
pub struct CommandMaterializer {
    config: MaterializerConfig,
}

impl CommandMaterializer {
    pub fn new(config: MaterializerConfig) -> Self {
        Self { config }
    }

    fn argv(&self, source: &Path, work_dir: &Path, out_dir: &Path) -> Vec<String> {
        let source = source.display().to_string();
        let work_dir = work_dir.display().to_string();
        let out_dir = out_dir.display().to_string();
        self.config
            .command
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{work_dir}", &work_dir)
                    .replace("{out_dir}", &out_dir)
            })
            .collect()
    }
}

#[async_trait]
impl Materializer for CommandMaterializer {
    async fn materialize(&self, source: &Path, work_dir: &Path, out_dir: &Path) -> Result<()> {
        let argv = self.argv(source, work_dir, out_dir);
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| RepairError::Config("materializer.command is empty".to_string()))?;

        let start = Instant::now();
        let child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                RepairError::Materialize(format!(
                    "timed out after {} seconds",
                    self.config.timeout_secs
                ))
            })??
        } else {
            child.wait_with_output().await?
        };

        tracing::debug!(
            source = %source.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            status = %output.status,
            "materializer finished"
        );
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepairError::Materialize(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
