//! Logging and trace export for gatelap processes.
//!
//! [`init_tracing`] installs the global `tracing` subscriber once at startup.
//! Every crate in the workspace logs through `tracing` macros with structured
//! fields (`id`, `region`, `lap`, ...), so the same call sites feed the
//! console, JSON log shippers and an OTLP collector.
//!
//! Lap execution runs inside a [`lap_span`], so a collector shows one trace
//! per lap with the checkpoint and waypoint counts attached.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). Enables span export over HTTP. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `GATELAP_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `GATELAP_OTLP_EXPORT=batch` | Export spans from a background thread instead of inline. |
//!
//! # Example
//!
//! ```rust,no_run
//! use gatelap_runtime::telemetry::{ExportMode, TelemetryOptions, init_with};
//!
//! // A long recording loop batches exports; one-shot tools call
//! // `init_tracing`, which defaults to inline export.
//! let opts = TelemetryOptions::from_env("gatelap-recorder").with_export_mode(ExportMode::Batch);
//! let _guard = init_with(opts);
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing::{Span, info_span};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Env var selecting the log line format.
pub const LOG_FORMAT_ENV: &str = "GATELAP_LOG_FORMAT";
/// Env var selecting the span export mode.
pub const EXPORT_MODE_ENV: &str = "GATELAP_OTLP_EXPORT";
/// Instrumentation scope name for every gatelap span.
pub const TRACER_NAME: &str = "gatelap";

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// How finished spans reach the OTLP exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Export inline as each span closes.  Nothing is lost when a one-shot
    /// command exits quickly.
    #[default]
    Simple,
    /// Queue spans and export them from the SDK's background thread, keeping
    /// export latency out of the control tick.
    Batch,
}

impl ExportMode {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("batch") => ExportMode::Batch,
            _ => ExportMode::Simple,
        }
    }
}

/// Subscriber setup for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryOptions {
    pub service_name: String,
    pub json_logs: bool,
    /// OTLP collector base URL; `None` disables span export.
    pub otlp_endpoint: Option<String>,
    pub export_mode: ExportMode,
}

impl TelemetryOptions {
    /// Read the options from the process environment.
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            json_logs: json_logs_requested(std::env::var(LOG_FORMAT_ENV).ok().as_deref()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|e| !e.trim().is_empty()),
            export_mode: ExportMode::from_env_value(std::env::var(EXPORT_MODE_ENV).ok().as_deref()),
        }
    }

    pub fn with_export_mode(mut self, mode: ExportMode) -> Self {
        self.export_mode = mode;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global subscriber configured from the environment.
///
/// Keep the returned [`TracerProviderGuard`] alive until exit.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_with(TelemetryOptions::from_env(service_name))
}

/// Install the global subscriber from explicit options.
pub fn init_with(options: TelemetryOptions) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = build_provider(&options);

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));
    let (json_layer, compact_layer) = if options.json_logs {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer().compact()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .init();

    TracerProviderGuard(provider)
}

/// Span wrapping one flown lap.
pub fn lap_span(lap: u32, checkpoints: usize, waypoints: usize) -> Span {
    info_span!("course_lap", lap, checkpoints, waypoints)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the OTel [`SdkTracerProvider`] down on drop, flushing queued spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[gatelap] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

fn json_logs_requested(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

/// Exporter failures are printed to stderr and yield `None`; the subscriber
/// is not installed yet at this point, so `tracing` cannot report them.
fn build_provider(options: &TelemetryOptions) -> Option<SdkTracerProvider> {
    let endpoint = options.otlp_endpoint.clone()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[gatelap] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(options.service_name.clone())
        .build();

    let builder = SdkTracerProvider::builder().with_resource(resource);
    let builder = match options.export_mode {
        ExportMode::Simple => builder.with_simple_exporter(exporter),
        ExportMode::Batch => builder.with_batch_exporter(exporter),
    };
    Some(builder.build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn options(endpoint: Option<&str>) -> TelemetryOptions {
        TelemetryOptions {
            service_name: "gatelap-test".to_string(),
            json_logs: false,
            otlp_endpoint: endpoint.map(str::to_string),
            export_mode: ExportMode::Simple,
        }
    }

    #[test]
    fn no_provider_without_endpoint() {
        assert!(build_provider(&options(None)).is_none());
    }

    #[test]
    fn empty_guard_drops_cleanly() {
        drop(TracerProviderGuard(None));
    }

    #[test]
    fn log_format_selection() {
        assert!(json_logs_requested(Some("json")));
        assert!(json_logs_requested(Some(" JSON ")));
        assert!(!json_logs_requested(Some("compact")));
        assert!(!json_logs_requested(None));
    }

    #[test]
    fn export_mode_selection() {
        assert_eq!(ExportMode::from_env_value(Some("batch")), ExportMode::Batch);
        assert_eq!(ExportMode::from_env_value(Some(" Batch")), ExportMode::Batch);
        assert_eq!(ExportMode::from_env_value(Some("simple")), ExportMode::Simple);
        assert_eq!(ExportMode::from_env_value(None), ExportMode::Simple);
        let opts = options(None).with_export_mode(ExportMode::Batch);
        assert_eq!(opts.export_mode, ExportMode::Batch);
    }

    #[test]
    fn lap_span_carries_lap_metadata() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = lap_span(2, 5, 7);
            let meta = span.metadata().expect("span enabled");
            assert_eq!(meta.name(), "course_lap");
            for field in ["lap", "checkpoints", "waypoints"] {
                assert!(meta.fields().field(field).is_some(), "missing field {field}");
            }
        });
    }
}
