use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::TranscriptionError;

/// Sample rate whisper.cpp expects
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Load a PCM WAV file as mono f32 samples in [-1.0, 1.0]
pub fn load_wav(path: &Path) -> Result<Vec<f32>, TranscriptionError> {
	let mut reader = WavReader::open(path).map_err(|e| TranscriptionError::Audio(format!("failed to open {}: {e}", path.display())))?;
	let spec = reader.spec();

	debug!(
		sample_rate = spec.sample_rate,
		channels = spec.channels,
		bits_per_sample = spec.bits_per_sample,
		"📊 WAV format detected"
	);

	let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
		(SampleFormat::Int, 16) => reader
			.samples::<i16>()
			.map(|s| s.map(|sample| f32::from(sample) / 32768.0))
			.collect::<Result<Vec<f32>, _>>(),
		(SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<f32>, _>>(),
		(format, bits) => return Err(TranscriptionError::Audio(format!("unsupported sample format {format:?}/{bits} bit"))),
	}
	.map_err(|e| TranscriptionError::Audio(e.to_string()))?;

	if spec.sample_rate != TARGET_SAMPLE_RATE {
		warn!(sample_rate = spec.sample_rate, "⚠️ Sample rate differs from 16 kHz - results may be poor");
	}

	Ok(downmix(samples, spec.channels))
}

/// Average interleaved channels into mono
fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
	match channels {
		0 | 1 => samples,
		n => {
			let n = usize::from(n);
			samples.chunks_exact(n).map(|frame| frame.iter().sum::<f32>() / n as f32).collect()
		}
	}
}
