mod common;

use common::{leftover_files, settings, wait_for, ConvertMode, FakeConverter, FakeFetcher, FakeRecognizer, Harness, RecordingSink};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use voice_transcriber::error::Rejection;
use voice_transcriber::gateway::{Submission, SubmissionGateway};
use voice_transcriber::job::{ChatId, FileRef, MessageId};
use voice_transcriber::observability::{Heartbeat, TranscriberMetrics};
use voice_transcriber::worker::{start_worker, JobQueue, Worker};

fn submission(message_id: i64) -> Submission {
	Submission {
		sender_id: "42".to_string(),
		file_ref: FileRef::new(format!("file-{message_id}")),
		chat_id: ChatId(42),
		message_id: MessageId(message_id),
		file_size: Some(4096),
	}
}

struct Service {
	gateway: SubmissionGateway,
	worker: Worker,
	token: CancellationToken,
}

fn service(harness: &Harness, tmp: &std::path::Path) -> Service {
	let settings = settings(tmp, &["42"]);
	let mut queue = JobQueue::new(settings.queue_capacity);
	let receiver = queue.take_receiver().unwrap();
	let metrics = TranscriberMetrics::from_global();
	let pipeline = Arc::new(harness.pipeline(settings.clone()));
	let token = CancellationToken::new();

	let worker = Worker::new(receiver, pipeline, harness.state.clone(), metrics.clone(), Heartbeat::new(60), token.clone());
	let gateway = SubmissionGateway::new(&settings, queue.sender(), harness.state.clone(), metrics);

	Service { gateway, worker, token }
}

#[tokio::test]
async fn test_full_queue_drains_in_admission_order() {
	let tmp = tempfile::tempdir().unwrap();
	let harness = Harness::happy(&["transcribed"]);
	let Service { gateway, worker, token } = service(&harness, tmp.path());

	// Nothing consumes yet, so the queue fills up
	for id in 0..10 {
		assert_eq!(gateway.submit(submission(id)), Ok(id as u64));
	}
	assert_eq!(gateway.submit(submission(10)), Err(Rejection::QueueFull));
	assert_eq!(gateway.queue_depth(), 10);

	let handle = start_worker(worker);
	let sink = Arc::clone(&harness.sink);
	wait_for(|| sink.sent().len() == 10).await;

	token.cancel();
	let stats = handle.await.unwrap();
	assert_eq!(stats.processed, 10);
	assert_eq!(stats.abandoned, 0);

	let replied_to: Vec<_> = harness.sink.sent().iter().map(|s| s.reply_to).collect();
	let expected: Vec<_> = (0..10).map(|id| Some(MessageId(id))).collect();
	assert_eq!(replied_to, expected);

	let state = harness.state.snapshot();
	assert_eq!(state.jobs_admitted, 10);
	assert_eq!(state.jobs_rejected, 1);
	assert_eq!(state.jobs_completed, 10);
	assert!(leftover_files(tmp.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_finishes_in_flight_job_and_drops_the_rest() {
	let tmp = tempfile::tempdir().unwrap();
	let harness = Harness::new(
		FakeFetcher::default(),
		FakeConverter::new(ConvertMode::Succeed),
		FakeRecognizer::saying(&["first"]).with_delay(Duration::from_millis(300)),
		RecordingSink::default(),
	);
	let Service { gateway, worker, token } = service(&harness, tmp.path());

	gateway.submit(submission(1)).unwrap();
	gateway.submit(submission(2)).unwrap();

	let handle = start_worker(worker);
	let recognizer = Arc::clone(&harness.recognizer);
	wait_for(|| recognizer.active.load(Ordering::SeqCst) == 1).await;

	token.cancel();
	let stats = handle.await.unwrap();

	assert_eq!(stats.processed, 1);
	assert_eq!(stats.abandoned, 1);

	// The in-flight job ran to the end, reply and cleanup included
	let sent = harness.sink.sent();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].text, "first");
	assert_eq!(sent[0].reply_to, Some(MessageId(1)));
	assert!(leftover_files(tmp.path()).is_empty());

	assert_eq!(gateway.submit(submission(3)), Err(Rejection::ShuttingDown));
}

#[tokio::test]
async fn test_worker_survives_a_crashing_job() {
	let tmp = tempfile::tempdir().unwrap();
	let mut recognizer = FakeRecognizer::saying(&["second try"]);
	recognizer.panic_on_call = Some(1);
	let harness = Harness::new(FakeFetcher::default(), FakeConverter::new(ConvertMode::Succeed), recognizer, RecordingSink::default());
	let Service { gateway, worker, token } = service(&harness, tmp.path());

	let handle = start_worker(worker);
	gateway.submit(submission(1)).unwrap();
	gateway.submit(submission(2)).unwrap();

	let sink = Arc::clone(&harness.sink);
	wait_for(|| sink.sent().len() == 2).await;
	token.cancel();
	assert_eq!(handle.await.unwrap().processed, 2);

	let sent = harness.sink.sent();
	assert!(sent[0].text.starts_with("❌ Processing Error"));
	assert_eq!(sent[0].reply_to, Some(MessageId(1)));
	assert_eq!(sent[1].text, "second try");

	let state = harness.state.snapshot();
	assert_eq!(state.jobs_failed, 1);
	assert_eq!(state.jobs_completed, 1);
}

#[tokio::test]
async fn test_crash_outside_engine_answers_the_chat() {
	let tmp = tempfile::tempdir().unwrap();
	let fetcher = FakeFetcher {
		panic_on_call: Some(1),
		..FakeFetcher::default()
	};
	let harness = Harness::new(fetcher, FakeConverter::new(ConvertMode::Succeed), FakeRecognizer::saying(&["fine"]), RecordingSink::default());
	let Service { gateway, worker, token } = service(&harness, tmp.path());

	let handle = start_worker(worker);
	gateway.submit(submission(1)).unwrap();
	gateway.submit(submission(2)).unwrap();

	let sink = Arc::clone(&harness.sink);
	wait_for(|| sink.sent().len() == 2).await;
	token.cancel();
	assert_eq!(handle.await.unwrap().processed, 2);

	let sent = harness.sink.sent();
	assert!(sent[0].text.starts_with("❌ Processing Error"));
	assert_eq!(sent[0].reply_to, Some(MessageId(1)));
	assert_eq!(sent[1].text, "fine");
	assert_eq!(sent[1].reply_to, Some(MessageId(2)));

	let state = harness.state.snapshot();
	assert_eq!(state.jobs_failed, 1);
	assert_eq!(state.jobs_completed, 1);
	assert!(!state.is_transcribing);
	assert!(leftover_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_idle_worker_stops_on_cancel() {
	let tmp = tempfile::tempdir().unwrap();
	let harness = Harness::happy(&["unused"]);
	let Service { worker, token, .. } = service(&harness, tmp.path());

	let handle = start_worker(worker);
	tokio::time::sleep(Duration::from_millis(20)).await;
	token.cancel();

	let stats = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
	assert_eq!(stats.processed, 0);
	assert_eq!(stats.abandoned, 0);
}
