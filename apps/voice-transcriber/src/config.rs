use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Telegram caps bot downloads at 20 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Telegram's hard limit is 4096; leave headroom
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

#[derive(Parser, Debug, Clone)]
#[command(name = "voice-transcriber")]
#[command(about = "Transcribes Telegram voice messages with whisper.cpp", long_about = None)]
pub struct Config {
	/// Telegram bot token
	#[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
	pub telegram_token: String,

	/// Comma separated chat ids allowed to use the bot (empty denies everyone)
	#[arg(long, env = "ALLOWED_CHAT_IDS", value_delimiter = ',', default_value = "")]
	pub allowed_chat_ids: Vec<String>,

	/// Directory for downloaded and converted audio
	#[arg(long, env = "TMP_PATH", default_value = "/tmp/telegram_whisper_bot")]
	pub tmp_path: PathBuf,

	/// Whisper model name (tiny, base, small, medium, large, with optional .en suffix)
	#[arg(long, env = "WHISPER_MODEL", default_value = "base")]
	pub whisper_model: String,

	/// Directory containing ggml-<model>.bin files
	#[arg(long, env = "WHISPER_MODELS_PATH", default_value = "./models")]
	pub whisper_models_path: PathBuf,

	/// Default spoken language; empty or unset means auto-detect
	#[arg(long, env = "AUDIO_LANGUAGE")]
	pub language: Option<String>,

	/// Number of threads for Whisper processing
	#[arg(long, env = "WHISPER_THREADS", default_value_t = default_threads())]
	pub whisper_threads: i32,

	/// Translate to English instead of transcribing
	#[arg(long, env = "WHISPER_TRANSLATE", default_value_t = false)]
	pub whisper_translate: bool,

	/// Maximum number of pending jobs before new submissions are turned away
	#[arg(long, env = "QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
	pub queue_capacity: usize,

	/// Maximum accepted audio size in bytes
	#[arg(long, env = "MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
	pub max_file_size: u64,

	/// Maximum characters per delivered message
	#[arg(long, env = "MAX_MESSAGE_LENGTH", default_value_t = DEFAULT_MAX_MESSAGE_LENGTH)]
	pub max_message_length: usize,

	/// ffmpeg binary used for transcoding
	#[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
	pub ffmpeg_path: PathBuf,

	/// Service name for observability
	#[arg(long, env = "OTEL_SERVICE_NAME", default_value = "voice-transcriber")]
	pub service_name: String,

	/// OTLP collector endpoint; export is disabled when unset
	#[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
	pub otlp_endpoint: Option<String>,

	/// Heartbeat interval in seconds
	#[arg(long, env = "HEARTBEAT_INTERVAL", default_value = "30")]
	pub heartbeat_interval_secs: u64,
}

fn default_threads() -> i32 {
	let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
	i32::try_from(cpus.min(4)).unwrap_or(1)
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		if self.telegram_token.trim().is_empty() {
			return Err("TELEGRAM_BOT_TOKEN must not be empty".to_string());
		}

		if self.whisper_threads < 1 {
			return Err("whisper_threads must be at least 1".to_string());
		}

		if self.queue_capacity == 0 {
			return Err("queue_capacity must be greater than 0".to_string());
		}

		if self.max_file_size == 0 {
			return Err("max_file_size must be greater than 0".to_string());
		}

		if self.max_message_length == 0 {
			return Err("max_message_length must be greater than 0".to_string());
		}

		if self.heartbeat_interval_secs == 0 {
			return Err("heartbeat_interval_secs must be greater than 0".to_string());
		}

		Ok(())
	}

	/// Path of the ggml model file for the configured model name
	#[must_use]
	pub fn model_file(&self) -> PathBuf {
		self.whisper_models_path.join(format!("ggml-{}.bin", self.whisper_model))
	}

	/// Freeze the values the pipeline components need
	#[must_use]
	pub fn pipeline_settings(&self) -> PipelineSettings {
		let allowed_senders = self.allowed_chat_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()).map(str::to_string).collect();

		PipelineSettings {
			allowed_senders: Arc::new(allowed_senders),
			queue_capacity: self.queue_capacity,
			max_file_size: self.max_file_size,
			max_message_length: self.max_message_length,
			default_language: self.language.as_deref().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string),
			tmp_path: self.tmp_path.clone(),
			model: self.whisper_model.clone(),
			whisper_threads: self.whisper_threads,
			translate: self.whisper_translate,
		}
	}
}

/// Immutable settings handed to the gateway, pipeline and front-end at
/// construction
#[derive(Debug, Clone)]
pub struct PipelineSettings {
	/// Empty set denies every sender
	pub allowed_senders: Arc<HashSet<String>>,
	pub queue_capacity: usize,
	pub max_file_size: u64,
	pub max_message_length: usize,
	pub default_language: Option<String>,
	pub tmp_path: PathBuf,
	pub model: String,
	pub whisper_threads: i32,
	pub translate: bool,
}

impl PipelineSettings {
	/// Language reported in results when nothing was configured
	#[must_use]
	pub fn effective_language(&self) -> &str {
		self.default_language.as_deref().unwrap_or("auto")
	}
}

impl Default for PipelineSettings {
	fn default() -> Self {
		Self {
			allowed_senders: Arc::new(HashSet::new()),
			queue_capacity: DEFAULT_QUEUE_CAPACITY,
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
			default_language: None,
			tmp_path: std::env::temp_dir().join("telegram_whisper_bot"),
			model: "base".to_string(),
			whisper_threads: 1,
			translate: false,
		}
	}
}
