mod chunking;
mod temp_files;

pub use chunking::split_message;
pub use temp_files::TempFiles;

use opentelemetry::KeyValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::PipelineSettings;
use crate::error::{DeliveryError, DownloadError, StageError, TranscriptionError};
use crate::job::{ChatId, Job, JobStage, MessageId, TranscriptionResult};
use crate::observability::TranscriberMetrics;
use crate::ports::{AudioConverter, AudioFetcher, ReplySink, SpeechRecognizer};
use crate::state::TranscriberState;

/// Sent instead of an empty message when the engine found no speech
pub const NO_SPEECH_NOTICE: &str = "🔇 No speech detected in this audio.";

/// Error details in replies are cut to this many characters
pub const ERROR_DETAIL_LIMIT: usize = 200;

/// External services one pipeline run talks to
#[derive(Clone)]
pub struct Collaborators {
	pub fetcher: Arc<dyn AudioFetcher>,
	pub converter: Arc<dyn AudioConverter>,
	pub recognizer: Arc<dyn SpeechRecognizer>,
	pub sink: Arc<dyn ReplySink>,
}

/// What a successful run delivered
#[derive(Debug, Clone)]
pub struct Delivery {
	pub chunks: usize,
	pub processing_time: Duration,
	pub language: String,
	pub model: String,
}

/// Outcome of one pipeline run, after cleanup
#[derive(Debug)]
pub struct JobReport {
	pub seq: u64,
	pub outcome: Result<Delivery, StageError>,
	/// Temp files that could not be removed
	pub cleanup_failures: usize,
	pub elapsed: Duration,
}

/// Download → Convert → Transcribe → Deliver → Cleanup for one job
pub struct Pipeline {
	collaborators: Collaborators,
	settings: PipelineSettings,
	/// Single transcription slot. Held only while the engine runs, never
	/// across download, conversion or delivery.
	transcription_permit: Arc<Semaphore>,
	state: Arc<TranscriberState>,
	metrics: TranscriberMetrics,
}

impl Pipeline {
	#[must_use]
	pub fn new(collaborators: Collaborators, settings: PipelineSettings, state: Arc<TranscriberState>, metrics: TranscriberMetrics) -> Self {
		Self {
			collaborators,
			settings,
			transcription_permit: Arc::new(Semaphore::new(1)),
			state,
			metrics,
		}
	}

	/// Share a transcription slot with other pipelines
	#[must_use]
	pub fn with_transcription_permit(mut self, permit: Arc<Semaphore>) -> Self {
		self.transcription_permit = permit;
		self
	}

	#[must_use]
	pub const fn settings(&self) -> &PipelineSettings {
		&self.settings
	}

	/// Run every stage for `job`. Never fails: stage errors are reported to the
	/// chat and returned in the report, and cleanup always runs.
	pub async fn run(&self, job: Job) -> JobReport {
		let span = tracing::info_span!("job", seq = job.seq, chat_id = %job.chat_id, message_id = %job.message_id);
		self.run_inner(job).instrument(span).await
	}

	async fn run_inner(&self, job: Job) -> JobReport {
		let started = Instant::now();
		let mut temp = TempFiles::new(&self.settings.tmp_path);

		let outcome = self.execute(&job, &mut temp).await;

		match &outcome {
			Ok(delivery) => {
				info!(
					chunks = delivery.chunks,
					processing_time_ms = delivery.processing_time.as_millis() as u64,
					language = %delivery.language,
					"✅ Transcript delivered"
				);
				self.state.increment_jobs_completed();
				self.metrics.jobs_completed.add(1, &[]);
			}
			Err(e) => {
				error!(stage = %e.stage(), next = %JobStage::Failed, error = %e, "❌ Job failed");
				self.state.increment_jobs_failed();
				self.metrics.jobs_failed.add(1, &[KeyValue::new("stage", e.stage().as_str())]);
				self.reply_error(&job, e).await;
			}
		}

		debug!(stage = %JobStage::CleaningUp, files = temp.paths().len(), "Cleaning up");
		let cleanup_failures = temp.cleanup().await;
		if cleanup_failures > 0 {
			for _ in 0..cleanup_failures {
				self.state.increment_cleanup_failures();
			}
			self.metrics.cleanup_failures.add(cleanup_failures as u64, &[]);
		}

		let elapsed = started.elapsed();
		self.metrics.job_latency.record(elapsed.as_secs_f64() * 1000.0, &[]);
		debug!(stage = %JobStage::Done, elapsed_ms = elapsed.as_millis() as u64, "Job finished");

		JobReport {
			seq: job.seq,
			outcome,
			cleanup_failures,
			elapsed,
		}
	}

	async fn execute(&self, job: &Job, temp: &mut TempFiles) -> Result<Delivery, StageError> {
		let audio_path = self.download(job, temp).await?;
		let wav_path = self.convert(&audio_path, temp).await?;
		let result = self.transcribe(wav_path).await?;
		let chunks = self.deliver(job, &result).await?;

		Ok(Delivery {
			chunks,
			processing_time: result.processing_time,
			language: result.language,
			model: result.model,
		})
	}

	async fn download(&self, job: &Job, temp: &mut TempFiles) -> Result<PathBuf, DownloadError> {
		debug!(stage = %JobStage::Downloading, file_ref = %job.file_ref, "📥 Downloading audio");

		if let Err(e) = self.collaborators.sink.notify_processing(job.chat_id).await {
			debug!(error = %e, "Could not send typing indicator");
		}

		tokio::fs::create_dir_all(&self.settings.tmp_path).await.map_err(|e| DownloadError::Io(e.to_string()))?;

		let path = temp.allocate("audio", "ogg");
		let bytes = self.collaborators.fetcher.fetch(&job.file_ref).await?;
		tokio::fs::write(&path, &bytes).await.map_err(|e| DownloadError::Io(e.to_string()))?;

		debug!(bytes = bytes.len(), path = %path.display(), "Audio saved");
		Ok(path)
	}

	async fn convert(&self, audio_path: &Path, temp: &mut TempFiles) -> Result<PathBuf, StageError> {
		debug!(stage = %JobStage::Converting, "🎛️ Converting to 16 kHz mono WAV");

		let wav_path = temp.track(audio_path.with_extension("wav"));
		self.collaborators.converter.convert(audio_path, &wav_path).await?;

		Ok(wav_path)
	}

	async fn transcribe(&self, wav_path: PathBuf) -> Result<TranscriptionResult, TranscriptionError> {
		let permit = Arc::clone(&self.transcription_permit)
			.acquire_owned()
			.await
			.map_err(|_| TranscriptionError::Aborted("transcription slot closed".to_string()))?;

		info!(stage = %JobStage::Transcribing, "🎤 Starting transcription");

		let recognizer = Arc::clone(&self.collaborators.recognizer);
		let language = self.settings.default_language.clone();
		let state = Arc::clone(&self.state);
		let started = Instant::now();

		// The permit moves into the blocking task so the slot stays taken until
		// the engine call actually returns, even if this future is dropped
		let joined = tokio::task::spawn_blocking(move || {
			let _permit = permit;
			state.set_transcribing(true);
			let segments = recognizer.transcribe(&wav_path, language.as_deref());
			state.set_transcribing(false);
			segments
		})
		.await;

		let processing_time = started.elapsed();
		self.metrics.transcription_latency.record(processing_time.as_secs_f64() * 1000.0, &[]);

		let segments = joined.map_err(|e| {
			self.state.set_transcribing(false);
			TranscriptionError::Aborted(e.to_string())
		})??;

		debug!(segments = segments.len(), processing_time_ms = processing_time.as_millis() as u64, "Transcription finished");

		Ok(TranscriptionResult::from_segments(
			segments,
			processing_time,
			self.settings.effective_language().to_string(),
			self.collaborators.recognizer.model_id().to_string(),
		))
	}

	async fn deliver(&self, job: &Job, result: &TranscriptionResult) -> Result<usize, DeliveryError> {
		debug!(stage = %JobStage::Delivering, text_chars = result.text.chars().count(), "📤 Delivering transcript");

		let chunks = if result.text.trim().is_empty() {
			warn!("⚠️ No speech recognized - audio may be silence");
			vec![NO_SPEECH_NOTICE.to_string()]
		} else {
			split_message(&result.text, self.settings.max_message_length)
		};

		for (i, chunk) in chunks.iter().enumerate() {
			let reply_to = (i == 0).then_some(job.message_id);
			self.collaborators.sink.send(job.chat_id, chunk, reply_to).await?;
			self.metrics.chunks_delivered.add(1, &[]);
		}

		Ok(chunks.len())
	}

	/// Account for a run that ended without a report because its task
	/// panicked, and tell the chat. Temp files were already removed by the
	/// drop guard while the task unwound.
	pub async fn report_aborted(&self, chat_id: ChatId, message_id: MessageId, detail: &str) {
		self.state.increment_jobs_failed();
		self.state.set_transcribing(false);
		self.metrics.jobs_failed.add(1, &[KeyValue::new("stage", "aborted")]);
		self.send_failure(chat_id, message_id, &failure_text(detail)).await;
	}

	async fn reply_error(&self, job: &Job, err: &StageError) {
		self.send_failure(job.chat_id, job.message_id, &error_reply(err)).await;
	}

	/// Best effort: a failure here is only logged
	async fn send_failure(&self, chat_id: ChatId, message_id: MessageId, text: &str) {
		if let Err(e) = self.collaborators.sink.send(chat_id, text, Some(message_id)).await {
			warn!(error = %e, "Failed to send error reply");
		}
	}
}

/// User-facing text for a failed job
#[must_use]
pub fn error_reply(err: &StageError) -> String {
	failure_text(&err.to_string())
}

fn failure_text(detail: &str) -> String {
	let detail: String = detail.chars().take(ERROR_DETAIL_LIMIT).collect();
	format!("❌ Processing Error\n\nFailed to transcribe audio. Please try again.\nError: {detail}")
}
