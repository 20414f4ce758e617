use anyhow::{Context, Result};
use std::borrow::Cow;
use std::os::raw::c_int;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperError};

use crate::audio;
use crate::error::TranscriptionError;
use crate::job::Segment;
use crate::ports::SpeechRecognizer;

/// whisper.cpp timestamps are in centiseconds
const TIMESTAMP_UNIT_MS: u64 = 10;

/// Load Whisper model from disk
pub fn load_model(model_path: &Path, threads: i32) -> Result<WhisperContext> {
	info!("🔄 Loading Whisper model from {}...", model_path.display());
	let start = Instant::now();

	let path = model_path.to_str().context("model path is not valid UTF-8")?;
	let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
		.with_context(|| format!("failed to load Whisper model {}", model_path.display()))?;

	let load_time = start.elapsed();
	info!(load_time_ms = load_time.as_millis() as u64, threads, "✅ Whisper model loaded");

	Ok(ctx)
}

/// Speech recognizer backed by a loaded whisper.cpp context
pub struct WhisperRecognizer {
	ctx: WhisperContext,
	model: String,
	threads: i32,
	translate: bool,
}

impl WhisperRecognizer {
	#[must_use]
	pub fn new(ctx: WhisperContext, model: impl Into<String>, threads: i32, translate: bool) -> Self {
		info!(whisper_threads = threads, translate, "🔧 Whisper configured");
		Self {
			ctx,
			model: model.into(),
			threads,
			translate,
		}
	}

	/// Create Whisper transcription parameters
	fn params<'a>(&self, language: &'a str) -> FullParams<'a, 'static> {
		let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
		params.set_n_threads(self.threads);
		params.set_translate(self.translate);
		params.set_no_context(true);
		params.set_language(Some(language));
		params.set_print_special(false);
		params.set_print_progress(false);
		params.set_print_realtime(false);
		params.set_print_timestamps(false);
		params
	}
}

impl SpeechRecognizer for WhisperRecognizer {
	fn transcribe(&self, wav_path: &Path, language: Option<&str>) -> Result<Vec<Segment>, TranscriptionError> {
		let audio = audio::load_wav(wav_path)?;
		let duration_secs = audio.len() as f64 / f64::from(audio::TARGET_SAMPLE_RATE);

		info!(audio_samples = audio.len(), duration_secs = format!("{:.2}", duration_secs), "🎬 Beginning transcription...");
		let start = Instant::now();

		let mut state = self
			.ctx
			.create_state()
			.map_err(|e| TranscriptionError::Engine(format!("failed to create Whisper state: {e}")))?;

		// "auto" asks whisper.cpp to detect the language itself
		let params = self.params(language.unwrap_or("auto"));

		// Blocking FFI call - cannot be interrupted
		state.full(params, &audio).map_err(|e| TranscriptionError::Engine(e.to_string()))?;

		let elapsed = start.elapsed().as_secs_f64();
		info!(
			transcribe_latency_ms = format!("{:.0}", elapsed * 1000.0),
			realtime_factor = format!("{:.2}x", if duration_secs > 0.0 { elapsed / duration_secs } else { 0.0 }),
			"✅ Whisper run completed"
		);

		let num_segments = state.full_n_segments();
		if num_segments == 0 {
			warn!("⚠️ No segments extracted - audio may be silence");
			return Ok(Vec::new());
		}

		let mut segments = Vec::new();
		for i in 0..num_segments {
			let segment = state
				.get_segment(i)
				.ok_or_else(|| TranscriptionError::Engine(format!("segment {i} of {num_segments} is out of bounds")))?;

			let text = segment_text(i, segment.to_str_lossy())?;

			let index = segments.len();
			let mut seg = Segment::new(index, text);
			if let (Some(t0), Some(t1)) = (timestamp(segment.start_timestamp()), timestamp(segment.end_timestamp())) {
				seg = seg.with_offsets(t0, t1);
			}
			segments.push(seg);
		}

		debug!(num_segments = segments.len(), "📋 Extracted segments");
		Ok(segments)
	}

	fn model_id(&self) -> &str {
		&self.model
	}
}

/// Segment text with any broken UTF-8 replaced by U+FFFD.
///
/// whisper.cpp may cut a multibyte character across two segments; both halves
/// are kept rather than dropping the segment.
fn segment_text(index: c_int, raw: Result<Cow<'_, str>, WhisperError>) -> Result<String, TranscriptionError> {
	let text = raw.map_err(|e| TranscriptionError::Engine(format!("no text for segment {index}: {e}")))?;
	if text.contains(char::REPLACEMENT_CHARACTER) {
		debug!(segment = index, "Segment contains invalid UTF-8, replaced");
	}
	Ok(text.trim().to_string())
}

fn timestamp(centis: i64) -> Option<Duration> {
	u64::try_from(centis).ok().map(|c| Duration::from_millis(c * TIMESTAMP_UNIT_MS))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_segment_text_keeps_split_multibyte_characters() {
		// "canción" cut inside the two-byte "ó"
		let bytes = "canción".as_bytes();
		let (head, tail) = bytes.split_at(6);

		let first = segment_text(0, Ok(String::from_utf8_lossy(head))).expect("first half kept");
		let second = segment_text(1, Ok(String::from_utf8_lossy(tail))).expect("second half kept");

		assert_eq!(first, "canci\u{FFFD}");
		assert_eq!(second, "\u{FFFD}n");
	}

	#[test]
	fn test_segment_text_trims_valid_text() {
		assert_eq!(segment_text(0, Ok(Cow::Borrowed("  hola mundo "))).unwrap(), "hola mundo");
	}

	#[test]
	fn test_segment_text_null_pointer_is_engine_error() {
		let err = segment_text(3, Err(WhisperError::NullPointer)).unwrap_err();
		assert!(matches!(err, TranscriptionError::Engine(ref msg) if msg.contains("segment 3")));
	}

	#[test]
	fn test_timestamp_converts_centiseconds() {
		assert_eq!(timestamp(150), Some(Duration::from_millis(1500)));
		assert_eq!(timestamp(-1), None);
	}
}
