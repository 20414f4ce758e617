use serde::{Deserialize, Serialize};

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
	pub ok: bool,
	pub result: Option<T>,
	pub description: Option<String>,
	pub error_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
	pub update_id: i64,
	pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
	pub message_id: i64,
	pub chat: Chat,
	pub from: Option<User>,
	pub text: Option<String>,
	pub voice: Option<Voice>,
	pub audio: Option<Audio>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
	pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
	pub id: i64,
	pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
	pub file_id: String,
	pub file_size: Option<u64>,
	#[serde(default)]
	pub duration: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Audio {
	pub file_id: String,
	pub file_size: Option<u64>,
	#[serde(default)]
	pub duration: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
	pub file_id: String,
	pub file_size: Option<u64>,
	pub file_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
	pub id: i64,
	pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetUpdates {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub offset: Option<i64>,
	pub timeout: u64,
	pub allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct GetFile<'a> {
	pub file_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
	pub chat_id: i64,
	pub text: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reply_parameters: Option<ReplyParameters>,
}

#[derive(Debug, Serialize)]
pub struct ReplyParameters {
	pub message_id: i64,
	/// Still deliver if the original message was deleted meanwhile
	pub allow_sending_without_reply: bool,
}

#[derive(Debug, Serialize)]
pub struct SendChatAction {
	pub chat_id: i64,
	pub action: &'static str,
}
