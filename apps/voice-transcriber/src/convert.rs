use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::ConversionError;
use crate::ports::AudioConverter;

/// Transcodes audio with an external ffmpeg process
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
	binary: PathBuf,
}

impl FfmpegConverter {
	pub fn new(binary: impl Into<PathBuf>) -> Self {
		Self { binary: binary.into() }
	}

	/// Arguments producing mono, 16 kHz, signed 16-bit PCM
	fn args(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
		let mut args: Vec<std::ffi::OsString> = vec!["-i".into(), input.into()];
		args.extend(["-acodec", "pcm_s16le", "-ac", "1", "-ar", "16000", "-loglevel", "error", "-y"].map(std::ffi::OsString::from));
		args.push(output.into());
		args
	}

	/// Log whether ffmpeg can be launched at all
	pub async fn probe(&self) -> bool {
		match Command::new(&self.binary).arg("-version").stdout(Stdio::null()).stderr(Stdio::null()).status().await {
			Ok(status) if status.success() => {
				info!(binary = %self.binary.display(), "✅ FFmpeg is available");
				true
			}
			Ok(status) => {
				error!(binary = %self.binary.display(), %status, "❌ FFmpeg probe failed - audio conversion will fail");
				false
			}
			Err(e) => {
				error!(binary = %self.binary.display(), error = %e, "❌ FFmpeg is not available or not in PATH - audio conversion will fail");
				false
			}
		}
	}
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
	async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
		let result = Command::new(&self.binary)
			.args(Self::args(input, output))
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|e| ConversionError::Spawn(e.to_string()))?;

		if result.status.success() {
			debug!(output = %output.display(), "FFmpeg conversion finished");
			return Ok(());
		}

		let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
		error!(status = %result.status, stderr = %stderr, "FFmpeg error");

		match result.status.code() {
			Some(status) => Err(ConversionError::NonZeroExit { status, stderr }),
			None => Err(ConversionError::Terminated),
		}
	}
}
