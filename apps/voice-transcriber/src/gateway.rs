use opentelemetry::KeyValue;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PipelineSettings;
use crate::error::Rejection;
use crate::job::{ChatId, FileRef, Job, MessageId};
use crate::observability::TranscriberMetrics;
use crate::state::TranscriberState;
use crate::worker::{JobSender, TryEnqueueError};

/// An inbound audio message, as seen by the gateway
#[derive(Debug, Clone)]
pub struct Submission {
	pub sender_id: String,
	pub file_ref: FileRef,
	pub chat_id: ChatId,
	pub message_id: MessageId,
	pub file_size: Option<u64>,
}

/// Admission control in front of the job queue.
///
/// Performs no I/O: it checks the allow-list and the size ceiling, then makes
/// one non-blocking enqueue attempt. Cheap to clone; every clone feeds the
/// same queue.
#[derive(Clone)]
pub struct SubmissionGateway {
	allowed_senders: Arc<HashSet<String>>,
	max_file_size: u64,
	queue: JobSender,
	state: Arc<TranscriberState>,
	metrics: TranscriberMetrics,
}

impl SubmissionGateway {
	#[must_use]
	pub fn new(settings: &PipelineSettings, queue: JobSender, state: Arc<TranscriberState>, metrics: TranscriberMetrics) -> Self {
		Self {
			allowed_senders: Arc::clone(&settings.allowed_senders),
			max_file_size: settings.max_file_size,
			queue,
			state,
			metrics,
		}
	}

	/// Fail-closed membership check: an empty allow-list admits nobody
	#[must_use]
	pub fn is_allowed(&self, sender_id: &str) -> bool {
		!self.allowed_senders.is_empty() && self.allowed_senders.contains(sender_id)
	}

	/// Validate and try to admit a submission. Returns the job's sequence
	/// number on success.
	pub fn submit(&self, submission: Submission) -> Result<u64, Rejection> {
		let result = self.admit(submission);

		match &result {
			Ok(seq) => {
				self.state.increment_jobs_admitted();
				self.metrics.jobs_admitted.add(1, &[]);
				info!(seq, queue_depth = self.queue.depth(), "📬 Job admitted");
			}
			Err(rejection) => {
				self.state.increment_jobs_rejected();
				self.metrics.jobs_rejected.add(1, &[KeyValue::new("reason", rejection.as_str())]);
				match rejection {
					Rejection::PermissionDenied(sender) => warn!(sender = %sender, "Unauthorized submission"),
					other => info!(reason = other.as_str(), "Submission rejected"),
				}
			}
		}

		result
	}

	fn admit(&self, submission: Submission) -> Result<u64, Rejection> {
		if !self.is_allowed(&submission.sender_id) {
			if self.allowed_senders.is_empty() {
				debug!("No allowed chats configured, denying all");
			}
			return Err(Rejection::PermissionDenied(submission.sender_id));
		}

		if let Some(size) = submission.file_size {
			if size > self.max_file_size {
				return Err(Rejection::FileTooLarge { size, limit: self.max_file_size });
			}
		}

		let job = Job::new(submission.file_ref, submission.chat_id, submission.message_id, submission.file_size);

		self.queue.try_enqueue(job).map_err(|e| match e {
			TryEnqueueError::Full(_) => Rejection::QueueFull,
			TryEnqueueError::Closed(_) => Rejection::ShuttingDown,
		})
	}

	#[must_use]
	pub fn queue_depth(&self) -> usize {
		self.queue.depth()
	}

	#[must_use]
	pub fn queue_capacity(&self) -> usize {
		self.queue.capacity()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::DEFAULT_MAX_FILE_SIZE;
	use crate::worker::{JobQueue, JobReceiver};

	fn gateway(allowed: &[&str], capacity: usize) -> (SubmissionGateway, JobReceiver) {
		let settings = PipelineSettings {
			allowed_senders: Arc::new(allowed.iter().map(|s| (*s).to_string()).collect()),
			queue_capacity: capacity,
			..PipelineSettings::default()
		};
		let mut queue = JobQueue::new(capacity);
		let rx = queue.take_receiver().expect("receiver");
		let gateway = SubmissionGateway::new(&settings, queue.sender(), TranscriberState::new(), TranscriberMetrics::from_global());
		(gateway, rx)
	}

	fn submission(sender: &str, message_id: i64, size: Option<u64>) -> Submission {
		Submission {
			sender_id: sender.to_string(),
			file_ref: FileRef::new(format!("file-{message_id}")),
			chat_id: ChatId(sender.parse().unwrap_or(0)),
			message_id: MessageId(message_id),
			file_size: size,
		}
	}

	#[test]
	fn test_sender_outside_allow_list_is_denied() {
		let (gateway, _rx) = gateway(&["123"], 10);

		assert_eq!(gateway.submit(submission("456", 1, Some(10))), Err(Rejection::PermissionDenied("456".to_string())));
		assert_eq!(gateway.queue_depth(), 0);
	}

	#[test]
	fn test_empty_allow_list_denies_everyone() {
		let (gateway, _rx) = gateway(&[], 10);

		for sender in ["123", "456", ""] {
			assert!(matches!(gateway.submit(submission(sender, 1, None)), Err(Rejection::PermissionDenied(_))));
		}
		assert_eq!(gateway.queue_depth(), 0);
	}

	#[test]
	fn test_oversized_file_rejected_before_queue() {
		let (gateway, _rx) = gateway(&["123"], 1);

		let too_big = DEFAULT_MAX_FILE_SIZE + 1;
		assert_eq!(
			gateway.submit(submission("123", 1, Some(too_big))),
			Err(Rejection::FileTooLarge {
				size: too_big,
				limit: DEFAULT_MAX_FILE_SIZE
			})
		);
		assert_eq!(gateway.queue_depth(), 0);

		// Exactly at the limit is fine
		assert_eq!(gateway.submit(submission("123", 2, Some(DEFAULT_MAX_FILE_SIZE))), Ok(0));
	}

	#[test]
	fn test_unknown_size_is_admitted() {
		let (gateway, _rx) = gateway(&["123"], 1);
		assert_eq!(gateway.submit(submission("123", 1, None)), Ok(0));
	}

	#[tokio::test]
	async fn test_eleventh_submission_gets_queue_full() {
		let (gateway, mut rx) = gateway(&["123"], 10);

		for n in 0..10 {
			assert_eq!(gateway.submit(submission("123", n, Some(1))), Ok(n as u64));
		}
		assert_eq!(gateway.submit(submission("123", 10, Some(1))), Err(Rejection::QueueFull));
		assert_eq!(gateway.queue_depth(), 10);

		for n in 0..10 {
			assert_eq!(rx.dequeue().await.expect("job").message_id, MessageId(n));
		}
	}

	#[tokio::test]
	async fn test_concurrent_submitters_never_overfill() {
		let (gateway, mut rx) = gateway(&["123"], 10);

		let handles: Vec<_> = (0..50)
			.map(|n| {
				let gateway = gateway.clone();
				tokio::spawn(async move { gateway.submit(submission("123", n, Some(1))) })
			})
			.collect();

		let mut admitted = 0;
		let mut full = 0;
		for handle in handles {
			match handle.await.expect("task") {
				Ok(_) => admitted += 1,
				Err(Rejection::QueueFull) => full += 1,
				Err(other) => panic!("unexpected rejection {other:?}"),
			}
		}

		assert_eq!(admitted, 10);
		assert_eq!(full, 40);
		assert_eq!(gateway.queue_depth(), 10);

		let mut seqs = Vec::new();
		for _ in 0..10 {
			seqs.push(rx.dequeue().await.expect("job").seq);
		}
		assert_eq!(seqs, (0..10).collect::<Vec<u64>>());
	}

	#[test]
	fn test_closed_queue_reports_shutdown() {
		let (gateway, mut rx) = gateway(&["123"], 2);
		rx.close();
		assert_eq!(gateway.submit(submission("123", 1, None)), Err(Rejection::ShuttingDown));
	}
}
