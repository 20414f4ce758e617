//! Collaborator interfaces consumed by the pipeline.
//!
//! The pipeline only ever talks to the messaging backend, the transcoder and
//! the speech engine through these traits, so each can be swapped for an
//! in-process fake.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{ConversionError, DeliveryError, DownloadError, TranscriptionError};
use crate::job::{ChatId, FileRef, MessageId, Segment};

/// Fetches the raw bytes of a remote audio object
#[async_trait]
pub trait AudioFetcher: Send + Sync {
	async fn fetch(&self, file_ref: &FileRef) -> Result<Vec<u8>, DownloadError>;
}

/// Transcodes an audio file into mono 16 kHz PCM16 WAV at `output`
#[async_trait]
pub trait AudioConverter: Send + Sync {
	async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

/// Synchronous, CPU-bound speech recognition.
///
/// Never call this from an async context directly; the pipeline dispatches it
/// onto the blocking pool.
pub trait SpeechRecognizer: Send + Sync {
	/// Recognize speech in a 16 kHz mono WAV file, returning segments in order
	fn transcribe(&self, wav_path: &Path, language: Option<&str>) -> Result<Vec<Segment>, TranscriptionError>;

	/// Identifier of the loaded model
	fn model_id(&self) -> &str;
}

/// Outbound messages to the origin chat
#[async_trait]
pub trait ReplySink: Send + Sync {
	async fn send(&self, chat_id: ChatId, text: &str, reply_to: Option<MessageId>) -> Result<(), DeliveryError>;

	/// Signal that work has started (e.g. a "typing" indicator)
	async fn notify_processing(&self, _chat_id: ChatId) -> Result<(), DeliveryError> {
		Ok(())
	}
}
