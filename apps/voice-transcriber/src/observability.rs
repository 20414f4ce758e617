use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{
	global,
	metrics::{Counter, Histogram, Meter},
	KeyValue,
};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
	metrics::{PeriodicReader, SdkMeterProvider},
	trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
	Resource,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::state::StateSnapshot;

const METER_NAME: &str = "voice-transcriber";
const DEFAULT_FILTER: &str = "info,voice_transcriber=debug";

/// Metrics for the transcriber service
#[derive(Clone)]
pub struct TranscriberMetrics {
	// Counters
	pub jobs_admitted: Counter<u64>,
	pub jobs_rejected: Counter<u64>,
	pub jobs_completed: Counter<u64>,
	pub jobs_failed: Counter<u64>,
	pub cleanup_failures: Counter<u64>,
	pub chunks_delivered: Counter<u64>,

	// Histograms
	pub queue_latency: Histogram<f64>,
	pub transcription_latency: Histogram<f64>,
	pub job_latency: Histogram<f64>,
}

impl TranscriberMetrics {
	#[must_use]
	pub fn new(meter: &Meter) -> Self {
		Self {
			jobs_admitted: meter.u64_counter("transcriber.jobs.admitted").with_description("Jobs accepted into the queue").build(),
			jobs_rejected: meter
				.u64_counter("transcriber.jobs.rejected")
				.with_description("Submissions turned away by the gateway")
				.build(),
			jobs_completed: meter
				.u64_counter("transcriber.jobs.completed")
				.with_description("Jobs whose transcript was delivered")
				.build(),
			jobs_failed: meter.u64_counter("transcriber.jobs.failed").with_description("Jobs that failed at some stage").build(),
			cleanup_failures: meter
				.u64_counter("transcriber.cleanup.failures")
				.with_description("Temporary files that could not be removed")
				.build(),
			chunks_delivered: meter
				.u64_counter("transcriber.chunks.delivered")
				.with_description("Messages sent back to chats")
				.build(),

			queue_latency: meter
				.f64_histogram("transcriber.queue.latency")
				.with_description("Time between admission and pickup by the worker (ms)")
				.build(),
			transcription_latency: meter
				.f64_histogram("transcriber.transcription.latency")
				.with_description("Time spent in the speech engine (ms)")
				.build(),
			job_latency: meter
				.f64_histogram("transcriber.job.latency")
				.with_description("Time to run the whole pipeline for one job (ms)")
				.build(),
		}
	}

	/// Metrics bound to whatever meter provider is installed globally.
	///
	/// With nothing installed these are no-ops, which is what tests want.
	#[must_use]
	pub fn from_global() -> Self {
		Self::new(&global::meter(METER_NAME))
	}
}

/// Keeps the exporters alive; flushes them on shutdown
#[derive(Default)]
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
	meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
	pub fn shutdown(self) {
		if let Some(provider) = self.tracer_provider {
			if let Err(e) = provider.shutdown() {
				warn!(error = %e, "Failed to flush trace exporter");
			}
		}
		if let Some(provider) = self.meter_provider {
			if let Err(e) = provider.shutdown() {
				warn!(error = %e, "Failed to flush metric exporter");
			}
		}
	}
}

/// Initialize OpenTelemetry with OTLP exporters
pub fn init_observability(service_name: &str, otlp_endpoint: &str) -> Result<(TelemetryGuard, TranscriberMetrics)> {
	info!("🔧 Initializing OpenTelemetry");
	info!("   Service: {}", service_name);
	info!("   OTLP Endpoint: {}", otlp_endpoint);

	let resource = Resource::builder()
		.with_service_name(service_name.to_string())
		.with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
		.build();

	// Initialize tracing (spans)
	let span_exporter = SpanExporter::builder()
		.with_tonic()
		.with_endpoint(otlp_endpoint)
		.build()
		.map_err(|e| anyhow::anyhow!("Failed to initialize span exporter: {}", e))?;

	let tracer_provider = SdkTracerProvider::builder()
		.with_batch_exporter(span_exporter)
		.with_sampler(Sampler::AlwaysOn)
		.with_id_generator(RandomIdGenerator::default())
		.with_resource(resource.clone())
		.build();

	let tracer = tracer_provider.tracer(METER_NAME);

	// Initialize metrics
	let metric_exporter = MetricExporter::builder()
		.with_tonic()
		.with_endpoint(otlp_endpoint)
		.build()
		.map_err(|e| anyhow::anyhow!("Failed to initialize metric exporter: {}", e))?;

	let reader = PeriodicReader::builder(metric_exporter).with_interval(Duration::from_secs(10)).build();

	let meter_provider = SdkMeterProvider::builder().with_reader(reader).with_resource(resource).build();

	global::set_meter_provider(meter_provider.clone());

	let metrics = TranscriberMetrics::from_global();

	// Initialize tracing subscriber with OpenTelemetry layer
	let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(telemetry_layer)
		.with(tracing_subscriber::fmt::layer().with_target(true))
		.try_init()?;

	info!("✅ OpenTelemetry initialized successfully");

	Ok((
		TelemetryGuard {
			tracer_provider: Some(tracer_provider),
			meter_provider: Some(meter_provider),
		},
		metrics,
	))
}

/// Create local-only metrics when OTLP export is off or failed
pub fn create_local_metrics() -> TranscriberMetrics {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

	// A subscriber may already be installed if OTLP init got that far
	let _ = tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer().with_target(true))
		.try_init();

	TranscriberMetrics::from_global()
}

/// Heartbeat logger - call this periodically to track service health
pub struct Heartbeat {
	last_heartbeat: std::time::Instant,
	interval: Duration,
}

impl Heartbeat {
	#[must_use]
	pub fn new(interval_secs: u64) -> Self {
		Self {
			last_heartbeat: std::time::Instant::now(),
			interval: Duration::from_secs(interval_secs),
		}
	}

	#[must_use]
	pub const fn interval(&self) -> Duration {
		self.interval
	}

	/// Check if it's time for a heartbeat and log stats if so
	pub fn maybe_log(&mut self, stats: StateSnapshot, queue_depth: usize) -> bool {
		if self.last_heartbeat.elapsed() >= self.interval {
			info!(
				jobs_admitted = stats.jobs_admitted,
				jobs_rejected = stats.jobs_rejected,
				jobs_completed = stats.jobs_completed,
				jobs_failed = stats.jobs_failed,
				cleanup_failures = stats.cleanup_failures,
				queue_depth,
				"💓 Heartbeat"
			);
			self.last_heartbeat = std::time::Instant::now();
			true
		} else {
			false
		}
	}
}
