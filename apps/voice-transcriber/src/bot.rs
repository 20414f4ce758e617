use std::path::Path;
use std::sync::Arc;
use sysinfo::Disks;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineSettings;
use crate::error::Rejection;
use crate::gateway::{Submission, SubmissionGateway};
use crate::job::{ChatId, FileRef, MessageId};
use crate::ports::ReplySink;
use crate::state::TranscriberState;
use crate::telegram::types::Message;
use crate::telegram::TelegramClient;

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

pub const PERMISSION_DENIED_TEXT: &str = "❌ Sorry, you don't have permission to use this bot.";
pub const QUEUE_FULL_TEXT: &str = "⏳ Too many audio messages are waiting to be transcribed. Please try again in a few minutes.";
pub const SHUTTING_DOWN_TEXT: &str = "🛑 The bot is restarting. Please send your audio again shortly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	Start,
	Help,
	Status,
	Model,
}

impl Command {
	/// `/help` and `/model` are public; the rest expose this deployment's
	/// settings or load
	#[must_use]
	pub const fn requires_permission(self) -> bool {
		matches!(self, Self::Start | Self::Status)
	}
}

/// What an incoming message asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Command(Command),
	Audio {
		file_id: String,
		file_size: Option<u64>,
		duration: u32,
	},
	Ignored,
}

impl Inbound {
	#[must_use]
	pub fn classify(message: &Message) -> Self {
		if let Some(voice) = &message.voice {
			return Self::Audio {
				file_id: voice.file_id.clone(),
				file_size: voice.file_size,
				duration: voice.duration,
			};
		}

		if let Some(audio) = &message.audio {
			return Self::Audio {
				file_id: audio.file_id.clone(),
				file_size: audio.file_size,
				duration: audio.duration,
			};
		}

		message.text.as_deref().and_then(parse_command).map_or(Self::Ignored, Self::Command)
	}
}

/// Parse `/cmd` or `/cmd@botname`, ignoring arguments
fn parse_command(text: &str) -> Option<Command> {
	let word = text.split_whitespace().next()?.strip_prefix('/')?;
	let name = word.split('@').next().unwrap_or(word);

	match name.to_ascii_lowercase().as_str() {
		"start" => Some(Command::Start),
		"help" => Some(Command::Help),
		"status" => Some(Command::Status),
		"model" => Some(Command::Model),
		_ => None,
	}
}

/// Telegram front-end: polls updates, answers commands and feeds audio into
/// the gateway. Each update is handled on its own task.
#[derive(Clone)]
pub struct Bot {
	client: TelegramClient,
	replies: Arc<dyn ReplySink>,
	gateway: SubmissionGateway,
	settings: PipelineSettings,
	state: Arc<TranscriberState>,
}

impl Bot {
	#[must_use]
	pub fn new(client: TelegramClient, replies: Arc<dyn ReplySink>, gateway: SubmissionGateway, settings: PipelineSettings, state: Arc<TranscriberState>) -> Self {
		Self {
			client,
			replies,
			gateway,
			settings,
			state,
		}
	}

	/// Poll until cancelled
	pub async fn run(self, cancellation_token: CancellationToken) {
		let mut offset = self.skip_pending_updates().await;
		info!("🎧 Polling Telegram for audio messages...");

		loop {
			let updates = tokio::select! {
				() = cancellation_token.cancelled() => {
					info!("🛑 Update polling stopped");
					break;
				}
				result = self.client.get_updates(offset, POLL_TIMEOUT_SECS) => result,
			};

			match updates {
				Ok(updates) => {
					for update in updates {
						offset = Some(update.update_id + 1);
						if let Some(message) = update.message {
							let bot = self.clone();
							tokio::spawn(async move { bot.handle_message(message).await });
						}
					}
				}
				Err(e) => {
					warn!(error = %e, "Failed to fetch updates");
					tokio::select! {
						() = cancellation_token.cancelled() => break,
						() = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
					}
				}
			}
		}
	}

	/// Messages that arrived while the bot was down are not processed
	async fn skip_pending_updates(&self) -> Option<i64> {
		match self.client.get_updates(Some(-1), 0).await {
			Ok(updates) => {
				let next = updates.last().map(|u| u.update_id + 1);
				if next.is_some() {
					info!("Dropped pending updates from before startup");
				}
				next
			}
			Err(e) => {
				warn!(error = %e, "Could not skip pending updates");
				None
			}
		}
	}

	pub async fn handle_message(&self, message: Message) {
		let chat_id = ChatId(message.chat.id);
		let message_id = MessageId(message.message_id);

		match Inbound::classify(&message) {
			Inbound::Audio { file_id, file_size, duration } => {
				info!(chat = %chat_id, size = ?file_size, duration, "Processing audio");

				let submission = Submission {
					sender_id: chat_id.to_string(),
					file_ref: FileRef::new(file_id),
					chat_id,
					message_id,
					file_size,
				};

				if let Err(rejection) = self.gateway.submit(submission) {
					self.answer_rejection(chat_id, message_id, &rejection).await;
				}
			}
			Inbound::Command(command) => {
				let text = if !command.requires_permission() || self.gateway.is_allowed(&chat_id.to_string()) {
					self.command_text(command)
				} else {
					warn!(chat = %chat_id, ?command, "Unauthorized command");
					PERMISSION_DENIED_TEXT.to_string()
				};
				self.reply(chat_id, &text, Some(message_id)).await;
			}
			Inbound::Ignored => debug!(chat = %chat_id, "Ignoring message"),
		}
	}

	async fn answer_rejection(&self, chat_id: ChatId, message_id: MessageId, rejection: &Rejection) {
		let text = match rejection {
			// Unknown senders get silence, not a hint that the bot exists
			Rejection::PermissionDenied(_) => return,
			Rejection::FileTooLarge { limit, .. } => format!("❌ File too large. Maximum size is {}MB.", limit / (1024 * 1024)),
			Rejection::QueueFull => QUEUE_FULL_TEXT.to_string(),
			Rejection::ShuttingDown => SHUTTING_DOWN_TEXT.to_string(),
		};
		self.reply(chat_id, &text, Some(message_id)).await;
	}

	async fn reply(&self, chat_id: ChatId, text: &str, reply_to: Option<MessageId>) {
		if let Err(e) = self.replies.send(chat_id, text, reply_to).await {
			warn!(chat = %chat_id, error = %e, "Failed to send reply");
		}
	}

	#[must_use]
	pub fn command_text(&self, command: Command) -> String {
		let settings = &self.settings;
		match command {
			Command::Start => format!(
				"🎤 Whisper Transcription Bot\n\n\
				 Send me an audio message or audio file, and I'll transcribe it for you.\n\n\
				 Commands:\n\
				 /start - Show this message\n\
				 /help - Show help\n\
				 /status - Check bot status\n\
				 /model - Show current model info\n\n\
				 Current settings:\n\
				 • Model: {}\n\
				 • Language: {}\n\
				 • Threads: {}",
				settings.model,
				settings.effective_language(),
				settings.whisper_threads
			),
			Command::Help => format!(
				"How to use:\n\
				 1. Send an audio message or audio file\n\
				 2. Wait for transcription\n\
				 3. Receive the text as a reply\n\n\
				 Supported formats:\n\
				 • Audio messages (OGG)\n\
				 • Audio files (MP3, M4A, WAV, etc.)\n\n\
				 Limits:\n\
				 • Max file size: {}MB\n\
				 • Up to {} audio messages can wait in line\n\n\
				 Note: long recordings take longer to process.",
				settings.max_file_size / (1024 * 1024),
				settings.queue_capacity
			),
			Command::Status => {
				let stats = self.state.snapshot();
				format!(
					"Bot Status\n\n\
					 • Model: {}\n\
					 • Language: {}\n\
					 • Queue: {}/{}\n\
					 • Transcribing: {}\n\
					 • Completed: {}\n\
					 • Failed: {}\n\
					 • Rejected: {}\n\
					 • Temp folder: {}\n\
					 • Disk free: {}\n\
					 • Allowed chats: {}\n\
					 • Status: ✅ Online",
					settings.model,
					settings.effective_language(),
					self.gateway.queue_depth(),
					self.gateway.queue_capacity(),
					if stats.is_transcribing { "yes" } else { "no" },
					stats.jobs_completed,
					stats.jobs_failed,
					stats.jobs_rejected,
					settings.tmp_path.display(),
					disk_free(&settings.tmp_path).map_or_else(|| "unknown".to_string(), |bytes| format!("{} GB", bytes / GIB)),
					settings.allowed_senders.len()
				)
			}
			Command::Model => format!(
				"Model Information\n\n\
				 • Name: {}\n\
				 • Language: {}\n\
				 • Threads: {}\n\
				 • Translate: {}\n\n\
				 Available models:\n\
				 • tiny (~75MB)\n\
				 • base (~142MB)\n\
				 • small (~466MB)\n\
				 • medium (~1.5GB)\n\
				 • large (~3.1GB)\n\n\
				 Add .en for English-only models",
				settings.model,
				settings.effective_language(),
				settings.whisper_threads,
				settings.translate
			),
		}
	}
}

const GIB: u64 = 1024 * 1024 * 1024;

/// Free space on the filesystem holding `path`
fn disk_free(path: &Path) -> Option<u64> {
	let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
	let disks = Disks::new_with_refreshed_list();
	free_space_on(&path, disks.list().iter().map(|d| (d.mount_point(), d.available_space())))
}

/// Pick the mount with the longest mount point that contains `path`
fn free_space_on<'a>(path: &Path, mounts: impl Iterator<Item = (&'a Path, u64)>) -> Option<u64> {
	mounts
		.filter(|(mount, _)| path.starts_with(mount))
		.max_by_key(|(mount, _)| mount.components().count())
		.map(|(_, free)| free)
}
