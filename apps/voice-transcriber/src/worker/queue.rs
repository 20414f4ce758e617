use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::job::Job;

/// Why a job could not be placed on the queue
#[derive(Debug)]
pub enum TryEnqueueError {
	/// Queue is at capacity; the job is handed back untouched
	Full(Job),
	/// Receiver is gone - the worker has shut down
	Closed(Job),
}

/// Bounded FIFO for admitted jobs
///
/// Uses bounded MPSC to enforce backpressure instead of hiding overload.
/// Producers get a cloneable [`JobSender`], the single worker takes the
/// [`JobReceiver`].
pub struct JobQueue {
	sender: JobSender,
	rx: Option<mpsc::Receiver<Job>>,
}

impl JobQueue {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (tx, rx) = mpsc::channel(capacity);

		Self {
			sender: JobSender {
				tx,
				next_seq: Arc::new(Mutex::new(0)),
			},
			rx: Some(rx),
		}
	}

	/// Get the sender handle (for producers)
	#[must_use]
	pub fn sender(&self) -> JobSender {
		self.sender.clone()
	}

	/// Take the receiver (for the worker - can only be called once)
	pub fn take_receiver(&mut self) -> Option<JobReceiver> {
		self.rx.take().map(|rx| JobReceiver { rx })
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.sender.capacity()
	}
}

/// Producer side of the job queue. Safe to clone and share across tasks.
#[derive(Clone)]
pub struct JobSender {
	tx: mpsc::Sender<Job>,
	/// Guards sequence assignment together with the send, so sequence order
	/// is admission order even under concurrent producers
	next_seq: Arc<Mutex<u64>>,
}

impl JobSender {
	/// Try to enqueue a job (non-blocking)
	///
	/// Returns the assigned sequence number, or hands the job back if the
	/// queue is full or closed.
	pub fn try_enqueue(&self, mut job: Job) -> Result<u64, TryEnqueueError> {
		let mut next_seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);

		let seq = *next_seq;
		job.seq = seq;

		match self.tx.try_send(job) {
			Ok(()) => {
				*next_seq += 1;
				Ok(seq)
			}
			Err(mpsc::error::TrySendError::Full(job)) => Err(TryEnqueueError::Full(job)),
			Err(mpsc::error::TrySendError::Closed(job)) => Err(TryEnqueueError::Closed(job)),
		}
	}

	/// Number of jobs currently waiting
	#[must_use]
	pub fn depth(&self) -> usize {
		self.tx.max_capacity() - self.tx.capacity()
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.tx.max_capacity()
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Consumer side of the job queue; owned by the single worker loop
pub struct JobReceiver {
	rx: mpsc::Receiver<Job>,
}

impl JobReceiver {
	/// Wait for the next job. Returns `None` once the queue is closed and
	/// drained, or every sender has been dropped.
	pub async fn dequeue(&mut self) -> Option<Job> {
		self.rx.recv().await
	}

	/// Number of jobs currently waiting
	#[must_use]
	pub fn depth(&self) -> usize {
		self.rx.len()
	}

	/// Stop accepting new jobs and discard whatever is still pending.
	///
	/// Returns the number of jobs that were abandoned.
	pub fn close(&mut self) -> usize {
		self.rx.close();

		let mut abandoned = 0;
		while self.rx.try_recv().is_ok() {
			abandoned += 1;
		}
		abandoned
	}
}
