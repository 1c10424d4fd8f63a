//! Camera capture
//!
//! A [`Camera`] produces one decoded frame per call. [`CommandCamera`] shells
//! out to a capture program such as `fswebcam`, which writes the frame to a
//! file that is then decoded with the `image` crate.

use async_trait::async_trait;
use image::DynamicImage;
use micro3d_core::constants::OUTPUT_PLACEHOLDER;
use micro3d_core::{CaptureError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Source of still frames
#[async_trait]
pub trait Camera: Send {
    /// Wait `warmup` for exposure to settle, then grab one frame
    async fn capture(&mut self, warmup: Duration) -> Result<DynamicImage>;
}

/// Camera driven by an external capture program
///
/// Every argument containing `{output}` has it replaced by the path of a fresh
/// PNG file in a private temporary directory.
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    scratch: TempDir,
    frames: u64,
}

impl CommandCamera {
    /// Build from `[program, args...]`
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| CaptureError::Device {
            reason: "capture command is empty".to_string(),
        })?;
        let scratch = TempDir::new().map_err(|e| CaptureError::Device {
            reason: format!("cannot create scratch directory: {}", e),
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            scratch,
            frames: 0,
        })
    }

    fn arguments_for(&self, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }

    fn next_frame_path(&mut self) -> PathBuf {
        self.frames += 1;
        self.scratch.path().join(format!("frame_{:06}.png", self.frames))
    }
}

#[async_trait]
impl Camera for CommandCamera {
    async fn capture(&mut self, warmup: Duration) -> Result<DynamicImage> {
        tokio::time::sleep(warmup).await;

        let path = self.next_frame_path();
        let output = tokio::process::Command::new(&self.program)
            .args(self.arguments_for(&path))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::Device {
                reason: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Device {
                reason: format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            }
            .into());
        }

        let decoded = tokio::task::spawn_blocking(move || {
            let image = image::open(&path);
            let _ = std::fs::remove_file(&path);
            image
        })
        .await
        .map_err(|e| CaptureError::Decode {
            reason: format!("decoder task failed: {}", e),
        })?
        .map_err(|e| CaptureError::Decode {
            reason: e.to_string(),
        })?;

        tracing::debug!(
            width = decoded.width(),
            height = decoded.height(),
            "Captured frame {}",
            self.frames
        );
        Ok(decoded)
    }
}
