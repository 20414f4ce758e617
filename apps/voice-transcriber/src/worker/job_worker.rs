use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::queue::JobReceiver;
use crate::job::Job;
use crate::observability::{Heartbeat, TranscriberMetrics};
use crate::pipeline::Pipeline;
use crate::state::TranscriberState;

/// Totals reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
	pub processed: u64,
	/// Jobs still queued when shutdown was requested
	pub abandoned: usize,
}

/// The single consumer of the job queue.
///
/// Runs one pipeline at a time, start to finish including cleanup, before
/// taking the next job. Shutdown is only observed between jobs.
pub struct Worker {
	receiver: JobReceiver,
	pipeline: Arc<Pipeline>,
	state: Arc<TranscriberState>,
	metrics: TranscriberMetrics,
	heartbeat: Heartbeat,
	cancellation_token: CancellationToken,
}

/// Spawn the worker loop on the runtime
pub fn start_worker(worker: Worker) -> JoinHandle<WorkerStats> {
	info!("🏭 Starting job worker");
	tokio::spawn(worker.run())
}

impl Worker {
	#[must_use]
	pub fn new(
		receiver: JobReceiver,
		pipeline: Arc<Pipeline>,
		state: Arc<TranscriberState>,
		metrics: TranscriberMetrics,
		heartbeat: Heartbeat,
		cancellation_token: CancellationToken,
	) -> Self {
		Self {
			receiver,
			pipeline,
			state,
			metrics,
			heartbeat,
			cancellation_token,
		}
	}

	pub async fn run(mut self) -> WorkerStats {
		info!("🔄 Worker loop started, waiting for jobs...");

		let mut stats = WorkerStats::default();
		let mut ticker = tokio::time::interval(self.heartbeat.interval());
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			let job = tokio::select! {
				biased;

				() = self.cancellation_token.cancelled() => {
					info!("🛑 Worker shutting down (cancellation requested)");
					break;
				}
				job = self.receiver.dequeue() => match job {
					Some(job) => job,
					None => {
						info!("🛑 Worker shutting down (queue closed)");
						break;
					}
				},
				_ = ticker.tick() => {
					self.heartbeat.maybe_log(self.state.snapshot(), self.receiver.depth());
					continue;
				}
			};

			self.process(job).await;
			stats.processed += 1;
		}

		stats.abandoned = self.receiver.close();
		if stats.abandoned > 0 {
			warn!(abandoned = stats.abandoned, "⚠️ Pending jobs dropped at shutdown");
		}

		info!(processed = stats.processed, "✅ Worker exiting");
		stats
	}

	async fn process(&self, job: Job) {
		let seq = job.seq;
		let queue_latency = job.queue_latency();
		self.metrics.queue_latency.record(queue_latency.as_secs_f64() * 1000.0, &[]);

		info!(
			seq,
			queue_latency_ms = queue_latency.as_millis() as u64,
			queue_depth = self.receiver.depth(),
			"📥 Processing job from queue"
		);

		// Own task so a panicking stage surfaces as a join error instead of
		// taking the loop down
		let (chat_id, message_id) = (job.chat_id, job.message_id);
		let pipeline = Arc::clone(&self.pipeline);
		match tokio::spawn(async move { pipeline.run(job).await }).await {
			Ok(report) => {
				if report.cleanup_failures > 0 {
					warn!(seq, cleanup_failures = report.cleanup_failures, "Temp files left behind");
				}
				if let Err(e) = &report.outcome {
					info!(seq, stage = %e.stage(), elapsed_ms = report.elapsed.as_millis() as u64, "Job ended with failure");
				}
			}
			Err(e) => {
				error!(seq, error = %e, "❌ Pipeline run aborted");
				self.pipeline.report_aborted(chat_id, message_id, &e.to_string()).await;
			}
		}
	}
}
