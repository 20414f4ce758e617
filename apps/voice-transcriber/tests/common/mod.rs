#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use voice_transcriber::config::PipelineSettings;
use voice_transcriber::error::{ConversionError, DeliveryError, DownloadError, TranscriptionError};
use voice_transcriber::job::{ChatId, FileRef, MessageId, Segment};
use voice_transcriber::observability::TranscriberMetrics;
use voice_transcriber::pipeline::{Collaborators, Pipeline};
use voice_transcriber::ports::{AudioConverter, AudioFetcher, ReplySink, SpeechRecognizer};
use voice_transcriber::state::TranscriberState;

// Helper to build settings rooted in a test temp dir
pub fn settings(tmp: &Path, allowed: &[&str]) -> PipelineSettings {
	PipelineSettings {
		allowed_senders: Arc::new(allowed.iter().map(|s| (*s).to_string()).collect::<HashSet<_>>()),
		tmp_path: tmp.to_path_buf(),
		model: "tiny".to_string(),
		..PipelineSettings::default()
	}
}

pub fn leftover_files(dir: &Path) -> Vec<PathBuf> {
	match std::fs::read_dir(dir) {
		Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
		Err(_) => Vec::new(),
	}
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_for(condition: impl Fn() -> bool) {
	let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
	while !condition() {
		assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

#[derive(Default)]
pub struct FakeFetcher {
	pub fail: Option<DownloadError>,
	/// Panic on this (1-based) call
	pub panic_on_call: Option<usize>,
	pub fetched: Mutex<Vec<FileRef>>,
}

impl FakeFetcher {
	pub fn failing(err: DownloadError) -> Self {
		Self {
			fail: Some(err),
			..Self::default()
		}
	}
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
	async fn fetch(&self, file_ref: &FileRef) -> Result<Vec<u8>, DownloadError> {
		let call = {
			let mut fetched = self.fetched.lock().unwrap();
			fetched.push(file_ref.clone());
			fetched.len()
		};
		if self.panic_on_call == Some(call) {
			panic!("fetcher crashed");
		}

		match &self.fail {
			Some(err) => Err(err.clone()),
			None => Ok(format!("OggS:{file_ref}").into_bytes()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertMode {
	/// Writes the output file and succeeds
	Succeed,
	/// Writes partial output, then exits non-zero
	FailWithPartialOutput,
	/// Puts a directory where the output file should be; cleanup cannot remove it
	OutputIsDirectory,
}

pub struct FakeConverter {
	pub mode: ConvertMode,
	pub calls: AtomicUsize,
}

impl FakeConverter {
	pub fn new(mode: ConvertMode) -> Self {
		Self {
			mode,
			calls: AtomicUsize::new(0),
		}
	}
}

#[async_trait]
impl AudioConverter for FakeConverter {
	async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		assert!(input.exists(), "converter input must exist");

		match self.mode {
			ConvertMode::Succeed => {
				std::fs::write(output, b"RIFF....WAVE").unwrap();
				Ok(())
			}
			ConvertMode::FailWithPartialOutput => {
				std::fs::write(output, b"RIFF").unwrap();
				Err(ConversionError::NonZeroExit {
					status: 1,
					stderr: "Invalid data found when processing input".to_string(),
				})
			}
			ConvertMode::OutputIsDirectory => {
				std::fs::create_dir(output).unwrap();
				Ok(())
			}
		}
	}
}

pub struct FakeRecognizer {
	pub segments: Vec<Segment>,
	pub delay: Duration,
	pub fail: Option<TranscriptionError>,
	/// Panic on this (1-based) call
	pub panic_on_call: Option<usize>,
	pub calls: AtomicUsize,
	pub active: AtomicUsize,
	pub max_active: AtomicUsize,
	pub languages: Mutex<Vec<Option<String>>>,
}

impl FakeRecognizer {
	pub fn saying(texts: &[&str]) -> Self {
		Self {
			segments: texts.iter().enumerate().map(|(i, t)| Segment::new(i, *t)).collect(),
			delay: Duration::ZERO,
			fail: None,
			panic_on_call: None,
			calls: AtomicUsize::new(0),
			active: AtomicUsize::new(0),
			max_active: AtomicUsize::new(0),
			languages: Mutex::new(Vec::new()),
		}
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn failing(err: TranscriptionError) -> Self {
		Self {
			fail: Some(err),
			..Self::saying(&[])
		}
	}
}

impl SpeechRecognizer for FakeRecognizer {
	fn transcribe(&self, wav_path: &Path, language: Option<&str>) -> Result<Vec<Segment>, TranscriptionError> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
		let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_active.fetch_max(now_active, Ordering::SeqCst);
		self.languages.lock().unwrap().push(language.map(str::to_string));

		std::thread::sleep(self.delay);
		let exists = wav_path.exists();
		self.active.fetch_sub(1, Ordering::SeqCst);

		if self.panic_on_call == Some(call) {
			panic!("engine crashed");
		}
		assert!(exists, "recognizer input must exist");

		match &self.fail {
			Some(err) => Err(err.clone()),
			None => Ok(self.segments.clone()),
		}
	}

	fn model_id(&self) -> &str {
		"tiny"
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
	pub chat_id: ChatId,
	pub text: String,
	pub reply_to: Option<MessageId>,
}

#[derive(Default)]
pub struct RecordingSink {
	pub sent: Mutex<Vec<Sent>>,
	/// Fail every send whose text contains this marker
	pub fail_on: Option<String>,
	pub typing: AtomicUsize,
}

impl RecordingSink {
	pub fn failing_on(marker: &str) -> Self {
		Self {
			fail_on: Some(marker.to_string()),
			..Self::default()
		}
	}

	pub fn sent(&self) -> Vec<Sent> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl ReplySink for RecordingSink {
	async fn send(&self, chat_id: ChatId, text: &str, reply_to: Option<MessageId>) -> Result<(), DeliveryError> {
		if self.fail_on.as_deref().is_some_and(|m| text.contains(m)) {
			return Err(DeliveryError::Rejected("Bad Request: chat not found".to_string()));
		}
		self.sent.lock().unwrap().push(Sent {
			chat_id,
			text: text.to_string(),
			reply_to,
		});
		Ok(())
	}

	async fn notify_processing(&self, _chat_id: ChatId) -> Result<(), DeliveryError> {
		self.typing.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

pub struct Harness {
	pub fetcher: Arc<FakeFetcher>,
	pub converter: Arc<FakeConverter>,
	pub recognizer: Arc<FakeRecognizer>,
	pub sink: Arc<RecordingSink>,
	pub state: Arc<TranscriberState>,
}

impl Harness {
	pub fn new(fetcher: FakeFetcher, converter: FakeConverter, recognizer: FakeRecognizer, sink: RecordingSink) -> Self {
		Self {
			fetcher: Arc::new(fetcher),
			converter: Arc::new(converter),
			recognizer: Arc::new(recognizer),
			sink: Arc::new(sink),
			state: TranscriberState::new(),
		}
	}

	pub fn happy(texts: &[&str]) -> Self {
		Self::new(
			FakeFetcher::default(),
			FakeConverter::new(ConvertMode::Succeed),
			FakeRecognizer::saying(texts),
			RecordingSink::default(),
		)
	}

	pub fn pipeline(&self, settings: PipelineSettings) -> Pipeline {
		let collaborators = Collaborators {
			fetcher: self.fetcher.clone(),
			converter: self.converter.clone(),
			recognizer: self.recognizer.clone(),
			sink: self.sink.clone(),
		};
		Pipeline::new(collaborators, settings, self.state.clone(), TranscriberMetrics::from_global())
	}
}
