use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::worker::JobSender;

/// Shared service counters, read by `/status` and the gauge callbacks
#[derive(Default)]
pub struct TranscriberState {
	// Admission
	pub jobs_admitted: AtomicU64,
	pub jobs_rejected: AtomicU64,

	// Pipeline outcomes
	pub jobs_completed: AtomicU64,
	pub jobs_failed: AtomicU64,
	pub cleanup_failures: AtomicU64,

	// Worker state
	pub is_transcribing: AtomicBool,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
	pub jobs_admitted: u64,
	pub jobs_rejected: u64,
	pub jobs_completed: u64,
	pub jobs_failed: u64,
	pub cleanup_failures: u64,
	pub is_transcribing: bool,
}

impl TranscriberState {
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Register OpenTelemetry gauge callbacks
	pub fn register_gauges(self: &Arc<Self>, queue: &JobSender) -> Result<()> {
		let meter = opentelemetry::global::meter("voice-transcriber");

		// Queue depth gauge
		let sender = queue.clone();
		let _queue_depth_reg = meter
			.u64_observable_gauge("transcriber.queue.depth")
			.with_description("Jobs waiting for the worker")
			.with_callback(move |observer| {
				observer.observe(sender.depth() as u64, &[]);
			})
			.build();

		// Worker busy gauge
		let state_clone = Arc::clone(self);
		let _worker_busy_reg = meter
			.u64_observable_gauge("transcriber.worker.busy")
			.with_description("1 while a transcription is running")
			.with_callback(move |observer| {
				observer.observe(u64::from(state_clone.is_transcribing()), &[]);
			})
			.build();

		// Heartbeat gauge
		let _heartbeat_reg = meter
			.u64_observable_gauge("transcriber.heartbeat")
			.with_description("Last heartbeat timestamp (unix seconds)")
			.with_callback(move |observer| {
				let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map_or(0, |d| d.as_secs());
				observer.observe(timestamp, &[]);
			})
			.build();

		Ok(())
	}

	pub fn set_transcribing(&self, value: bool) {
		self.is_transcribing.store(value, Ordering::Relaxed);
	}

	pub fn is_transcribing(&self) -> bool {
		self.is_transcribing.load(Ordering::Relaxed)
	}

	pub fn increment_jobs_admitted(&self) {
		self.jobs_admitted.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_jobs_rejected(&self) {
		self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_jobs_completed(&self) {
		self.jobs_completed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_jobs_failed(&self) {
		self.jobs_failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_cleanup_failures(&self) {
		self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> StateSnapshot {
		StateSnapshot {
			jobs_admitted: self.jobs_admitted.load(Ordering::Relaxed),
			jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
			jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
			jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
			cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
			is_transcribing: self.is_transcribing(),
		}
	}
}
