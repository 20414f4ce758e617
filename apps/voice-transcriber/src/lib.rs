//! Voice message transcription service.
//!
//! Audio submissions pass through a [`gateway::SubmissionGateway`] into a
//! bounded [`worker::JobQueue`]. A single [`worker::Worker`] drains the queue
//! and runs each job through the [`pipeline::Pipeline`]:
//! download, convert, transcribe, deliver, cleanup.

pub mod audio;
pub mod bot;
pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod job;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod state;
pub mod telegram;
#[cfg(feature = "whisper")]
pub mod transcription;
pub mod worker;
