//! Minimal Telegram Bot API client: long polling, file download and replies.

pub mod types;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryError, DownloadError};
use crate::job::{ChatId, FileRef, MessageId};
use crate::ports::{AudioFetcher, ReplySink};
use types::{ApiResponse, BotUser, File, GetFile, GetUpdates, ReplyParameters, SendChatAction, SendMessage, Update};

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const CONNECT_MAX_RETRIES: u32 = 5;
const CONNECT_INITIAL_BACKOFF_MS: u64 = 500;

/// Long polls hold the request open; the HTTP timeout must outlast them
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Error, Debug)]
pub enum TelegramError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("Bot API error {code}: {description}")]
	Api { code: i32, description: String },
	#[error("Bot API returned no result for {0}")]
	MissingResult(&'static str),
}

impl TelegramError {
	/// Strip the request URL (which embeds the bot token) from transport errors
	fn from_http(e: reqwest::Error) -> Self {
		Self::Http(e.without_url())
	}
}

#[derive(Clone)]
pub struct TelegramClient {
	http: reqwest::Client,
	api_url: String,
	file_url: String,
}

impl TelegramClient {
	pub fn new(token: &str) -> Result<Self, TelegramError> {
		Self::with_base_url(token, DEFAULT_API_URL)
	}

	/// Point the client at a different Bot API server (e.g. a local one)
	pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, TelegramError> {
		let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(TelegramError::from_http)?;
		let base_url = base_url.trim_end_matches('/');

		Ok(Self {
			http,
			api_url: format!("{base_url}/bot{token}"),
			file_url: format!("{base_url}/file/bot{token}"),
		})
	}

	async fn call<P, R>(&self, method: &'static str, params: &P) -> Result<R, TelegramError>
	where
		P: Serialize + Sync,
		R: DeserializeOwned,
	{
		let response = self
			.http
			.post(format!("{}/{method}", self.api_url))
			.json(params)
			.send()
			.await
			.map_err(TelegramError::from_http)?;

		let body: ApiResponse<R> = response.json().await.map_err(TelegramError::from_http)?;

		if !body.ok {
			return Err(TelegramError::Api {
				code: body.error_code.unwrap_or_default(),
				description: body.description.unwrap_or_default(),
			});
		}

		body.result.ok_or(TelegramError::MissingResult(method))
	}

	pub async fn get_me(&self) -> Result<BotUser, TelegramError> {
		self.call("getMe", &serde_json::json!({})).await
	}

	pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
		let params = GetUpdates {
			offset,
			timeout: timeout_secs,
			allowed_updates: vec!["message"],
		};
		self.call("getUpdates", &params).await
	}

	pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
		self.call("getFile", &GetFile { file_id }).await
	}

	pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TelegramError> {
		let response = self
			.http
			.get(format!("{}/{file_path}", self.file_url))
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(TelegramError::from_http)?;

		let bytes = response.bytes().await.map_err(TelegramError::from_http)?;
		Ok(bytes.to_vec())
	}

	pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<(), TelegramError> {
		let params = SendMessage {
			chat_id,
			text,
			reply_parameters: reply_to.map(|message_id| ReplyParameters {
				message_id,
				allow_sending_without_reply: true,
			}),
		};
		let _: serde_json::Value = self.call("sendMessage", &params).await?;
		Ok(())
	}

	pub async fn send_chat_action(&self, chat_id: i64, action: &'static str) -> Result<(), TelegramError> {
		let _: bool = self.call("sendChatAction", &SendChatAction { chat_id, action }).await?;
		Ok(())
	}
}

/// Verify the bot token, retrying transient failures with exponential backoff.
///
/// An API error (bad token) is returned immediately.
pub async fn connect_with_retry(client: &TelegramClient) -> Result<BotUser, TelegramError> {
	let mut attempt = 1;
	loop {
		match client.get_me().await {
			Ok(me) => {
				info!(bot_id = me.id, username = ?me.username, "✅ Connected to Telegram");
				return Ok(me);
			}
			Err(e @ TelegramError::Api { .. }) => {
				error!(error = %e, "❌ Telegram rejected the bot token - service cannot continue");
				return Err(e);
			}
			Err(e) if attempt >= CONNECT_MAX_RETRIES => {
				error!(error = %e, "❌ Failed to reach Telegram after {} attempts - service cannot continue", CONNECT_MAX_RETRIES);
				return Err(e);
			}
			Err(e) => {
				let backoff = CONNECT_INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
				warn!(
					attempt,
					max_retries = CONNECT_MAX_RETRIES,
					backoff_ms = backoff,
					error = %e,
					"⚠️ Telegram connection failed, retrying..."
				);
				tokio::time::sleep(Duration::from_millis(backoff)).await;
				attempt += 1;
			}
		}
	}
}

#[async_trait]
impl AudioFetcher for TelegramClient {
	async fn fetch(&self, file_ref: &FileRef) -> Result<Vec<u8>, DownloadError> {
		let file = self.get_file(file_ref.as_str()).await.map_err(|e| match e {
			TelegramError::Api { description, .. } => DownloadError::NotFound(description),
			other => DownloadError::Transport(other.to_string()),
		})?;

		let file_path = file.file_path.ok_or_else(|| DownloadError::NotFound(format!("no download path for {file_ref}")))?;
		debug!(file_path = %file_path, file_size = ?file.file_size, "Fetching audio from Telegram");

		self.download_file(&file_path).await.map_err(|e| DownloadError::Transport(e.to_string()))
	}
}

#[async_trait]
impl ReplySink for TelegramClient {
	async fn send(&self, chat_id: ChatId, text: &str, reply_to: Option<MessageId>) -> Result<(), DeliveryError> {
		self.send_message(chat_id.0, text, reply_to.map(|m| m.0)).await.map_err(|e| match e {
			TelegramError::Api { description, .. } => DeliveryError::Rejected(description),
			other => DeliveryError::Transport(other.to_string()),
		})
	}

	async fn notify_processing(&self, chat_id: ChatId) -> Result<(), DeliveryError> {
		self.send_chat_action(chat_id.0, "typing").await.map_err(|e| DeliveryError::Transport(e.to_string()))
	}
}
