use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use voice_transcriber::bot::Bot;
use voice_transcriber::config::Config;
use voice_transcriber::convert::FfmpegConverter;
use voice_transcriber::gateway::SubmissionGateway;
use voice_transcriber::observability::{self, Heartbeat, TelemetryGuard, TranscriberMetrics};
use voice_transcriber::pipeline::{Collaborators, Pipeline};
use voice_transcriber::state::TranscriberState;
use voice_transcriber::telegram::{self, TelegramClient};
use voice_transcriber::transcription::{self, WhisperRecognizer};
use voice_transcriber::worker::{start_worker, JobQueue, Worker};

#[tokio::main]
async fn main() -> Result<()> {
	// Load environment variables
	dotenvy::dotenv().ok();

	// Parse CLI arguments; a missing bot token stops us here
	let config = Config::parse();
	config.validate().map_err(anyhow::Error::msg)?;

	let (telemetry, metrics) = init_observability_with_fallback(&config);

	info!(
		service = %config.service_name,
		whisper_model = %config.whisper_model,
		tmp_path = %config.tmp_path.display(),
		"🎯 Starting voice transcriber"
	);

	let settings = config.pipeline_settings();
	if settings.allowed_senders.is_empty() {
		warn!("⚠️ No allowed chats configured. Bot will not process any messages.");
	} else {
		info!(allowed_chats = settings.allowed_senders.len(), "🔐 Allow-list loaded");
	}

	// Check the token before doing anything expensive
	let client = TelegramClient::new(&config.telegram_token)?;
	telegram::connect_with_retry(&client).await?;

	let converter = FfmpegConverter::new(&config.ffmpeg_path);
	converter.probe().await;

	tokio::fs::create_dir_all(&settings.tmp_path)
		.await
		.with_context(|| format!("failed to create temp dir {}", settings.tmp_path.display()))?;

	// Load Whisper model
	let whisper_ctx = transcription::load_model(&config.model_file(), config.whisper_threads)?;
	let recognizer = WhisperRecognizer::new(whisper_ctx, &config.whisper_model, config.whisper_threads, config.whisper_translate);

	let state = TranscriberState::new();
	let mut queue = JobQueue::new(settings.queue_capacity);
	state.register_gauges(&queue.sender())?;
	let receiver = queue.take_receiver().context("job receiver already taken")?;

	let client = Arc::new(client);
	let collaborators = Collaborators {
		fetcher: client.clone(),
		converter: Arc::new(converter),
		recognizer: Arc::new(recognizer),
		sink: client.clone(),
	};
	let pipeline = Arc::new(Pipeline::new(collaborators, settings.clone(), state.clone(), metrics.clone()));

	// Create cancellation token for cooperative shutdown
	let cancellation_token = CancellationToken::new();

	let worker = Worker::new(
		receiver,
		pipeline,
		state.clone(),
		metrics.clone(),
		Heartbeat::new(config.heartbeat_interval_secs),
		cancellation_token.clone(),
	);
	let mut worker_handle = start_worker(worker);

	let gateway = SubmissionGateway::new(&settings, queue.sender(), state.clone(), metrics);
	let bot = Bot::new((*client).clone(), client, gateway, settings, state);
	let bot_handle = tokio::spawn(bot.run(cancellation_token.clone()));

	let worker_result = tokio::select! {
		() = wait_for_shutdown_signal() => {
			info!("🛑 Shutdown signal received (SIGTERM/SIGINT)");
			cancellation_token.cancel();

			// The worker only looks at the token between jobs, so this waits
			// for the in-flight job, including its cleanup
			info!("⏳ Waiting for the in-flight job to finish...");
			worker_handle.await
		}
		result = &mut worker_handle => {
			error!("Worker exited unexpectedly: {:?}", result);
			cancellation_token.cancel();
			result
		}
	};

	if let Err(e) = bot_handle.await {
		error!(error = %e, "Update polling task failed");
	}

	telemetry.shutdown();

	let stats = worker_result.context("worker task failed")?;
	info!(processed = stats.processed, abandoned = stats.abandoned, "👋 Voice transcriber stopped");
	Ok(())
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				error!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}

fn init_observability_with_fallback(config: &Config) -> (TelemetryGuard, TranscriberMetrics) {
	let Some(endpoint) = config.otlp_endpoint.as_deref() else {
		let metrics = observability::create_local_metrics();
		info!("OTLP endpoint not configured, metrics stay local");
		return (TelemetryGuard::default(), metrics);
	};

	// Vendors (OTLP/gRPC) already have retry logic built-in
	// We'll try once, and if it fails, continue with local-only metrics
	match observability::init_observability(&config.service_name, endpoint) {
		Ok((guard, metrics)) => {
			info!("✅ Observability initialized with OTLP export");
			(guard, metrics)
		}
		Err(e) => {
			let metrics = observability::create_local_metrics();
			warn!(
				error = %e,
				"⚠️ OTLP observability failed to initialize, falling back to local metrics only"
			);
			warn!("   Traces and metrics will NOT be exported (service will continue)");
			(TelemetryGuard::default(), metrics)
		}
	}
}
