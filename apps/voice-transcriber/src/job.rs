use std::fmt;
use std::time::{Duration, Instant};

/// Opaque handle to a remote audio object, addressed by the messaging backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(String);

impl FileRef {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for FileRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A single admitted transcription request
///
/// Once enqueued, a job is immutable. It is consumed by the worker and
/// dropped when its pipeline run ends, whatever the outcome.
#[derive(Debug, Clone)]
pub struct Job {
	/// Admission sequence number, assigned by the queue
	pub seq: u64,

	pub file_ref: FileRef,
	pub chat_id: ChatId,
	pub message_id: MessageId,

	/// Size reported by the backend, if it reported one
	pub file_size: Option<u64>,

	/// When the job was admitted; only used for latency reporting
	pub submitted_at: Instant,
}

impl Job {
	#[must_use]
	pub fn new(file_ref: FileRef, chat_id: ChatId, message_id: MessageId, file_size: Option<u64>) -> Self {
		Self {
			seq: 0,
			file_ref,
			chat_id,
			message_id,
			file_size,
			submitted_at: Instant::now(),
		}
	}

	/// How long this job has been waiting since admission
	#[must_use]
	pub fn queue_latency(&self) -> Duration {
		self.submitted_at.elapsed()
	}
}

/// Per-job state machine
///
/// `Admitted → Downloading → Converting → Transcribing → Delivering → Done`,
/// any of which may go to `Failed`, which always passes through `CleaningUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
	Admitted,
	Downloading,
	Converting,
	Transcribing,
	Delivering,
	Failed,
	CleaningUp,
	Done,
}

impl JobStage {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Admitted => "admitted",
			Self::Downloading => "downloading",
			Self::Converting => "converting",
			Self::Transcribing => "transcribing",
			Self::Delivering => "delivering",
			Self::Failed => "failed",
			Self::CleaningUp => "cleaning_up",
			Self::Done => "done",
		}
	}
}

impl fmt::Display for JobStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One span of recognized speech, as reported by the engine adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
	pub index: usize,
	pub text: String,
	pub start_offset: Option<Duration>,
	pub end_offset: Option<Duration>,
}

impl Segment {
	pub fn new(index: usize, text: impl Into<String>) -> Self {
		Self {
			index,
			text: text.into(),
			start_offset: None,
			end_offset: None,
		}
	}

	#[must_use]
	pub const fn with_offsets(mut self, start: Duration, end: Duration) -> Self {
		self.start_offset = Some(start);
		self.end_offset = Some(end);
		self
	}
}

#[derive(Debug, Clone)]
pub struct TranscriptionResult {
	pub text: String,
	/// Wall-clock time of the transcribe stage only
	pub processing_time: Duration,
	pub language: String,
	pub model: String,
	pub segments: Option<Vec<Segment>>,
}

impl TranscriptionResult {
	/// Assemble a result from engine segments.
	///
	/// Segment texts are trimmed and joined with a single space, in order.
	#[must_use]
	pub fn from_segments(segments: Vec<Segment>, processing_time: Duration, language: String, model: String) -> Self {
		let text = segments.iter().map(|s| s.text.trim()).collect::<Vec<_>>().join(" ");

		let segments: Vec<Segment> = segments
			.into_iter()
			.map(|s| Segment {
				text: s.text.trim().to_string(),
				..s
			})
			.collect();

		Self {
			text,
			processing_time,
			language,
			model,
			segments: if segments.is_empty() { None } else { Some(segments) },
		}
	}
}
