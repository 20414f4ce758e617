use thiserror::Error;

use crate::job::JobStage;

/// Reasons the submission gateway turns a request away.
///
/// These are returned synchronously to the caller, which decides how (and
/// whether) to tell the sender.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
	#[error("sender {0} is not allowed to submit audio")]
	PermissionDenied(String),
	#[error("file too large: {size} bytes exceeds the {limit} byte limit")]
	FileTooLarge { size: u64, limit: u64 },
	#[error("queue full")]
	QueueFull,
	#[error("service is shutting down")]
	ShuttingDown,
}

impl Rejection {
	/// Short label used for metric attributes and logs
	#[must_use]
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::PermissionDenied(_) => "permission_denied",
			Self::FileTooLarge { .. } => "file_too_large",
			Self::QueueFull => "queue_full",
			Self::ShuttingDown => "shutting_down",
		}
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
	#[error("remote file not found: {0}")]
	NotFound(String),
	#[error("transport failure: {0}")]
	Transport(String),
	#[error("failed to write temp file: {0}")]
	Io(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
	#[error("converter exited with status {status}: {stderr}")]
	NonZeroExit { status: i32, stderr: String },
	#[error("converter terminated by signal")]
	Terminated,
	#[error("failed to launch converter: {0}")]
	Spawn(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
	#[error("failed to read audio: {0}")]
	Audio(String),
	#[error("engine failure: {0}")]
	Engine(String),
	#[error("transcription task aborted: {0}")]
	Aborted(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
	#[error("messaging backend rejected the message: {0}")]
	Rejected(String),
	#[error("transport failure: {0}")]
	Transport(String),
}

/// Failure of a single pipeline stage. The worker inspects the variant rather
/// than relying on propagation to decide what to log and reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
	#[error("download failed: {0}")]
	Download(#[from] DownloadError),
	#[error("audio conversion failed: {0}")]
	Conversion(#[from] ConversionError),
	#[error("transcription failed: {0}")]
	Transcription(#[from] TranscriptionError),
	#[error("delivery failed: {0}")]
	Delivery(#[from] DeliveryError),
}

impl StageError {
	/// Stage in which the error was raised
	#[must_use]
	pub const fn stage(&self) -> JobStage {
		match self {
			Self::Download(_) => JobStage::Downloading,
			Self::Conversion(_) => JobStage::Converting,
			Self::Transcription(_) => JobStage::Transcribing,
			Self::Delivery(_) => JobStage::Delivering,
		}
	}
}
