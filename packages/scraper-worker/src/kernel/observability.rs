//! Logging and trace export setup.
//!
//! Console logging is always installed. With observability enabled, spans are
//! also exported over OTLP/gRPC and console output switches to JSON so log
//! lines carry the active span.

use std::collections::HashMap;

use anyhow::{Context, Result};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

const DEFAULT_FILTER: &str = "info,scraper_core=debug,scraper_worker=debug";

/// Keeps the tracer provider alive; flushes pending spans on drop.
pub struct Observability {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for Observability {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to flush trace exporter");
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber. Call once, from a binary.
///
/// A failing exporter never prevents start-up: the error is logged and the
/// worker continues with console logging only.
pub fn init_observability(config: &ObservabilityConfig) -> Observability {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
        tracing::info!("observability disabled, console logging only");
        return Observability {
            tracer_provider: None,
        };
    }

    match build_tracer_provider(config) {
        Ok(provider) => {
            let tracer = provider.tracer(config.service_name.clone());
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().json().with_current_span(true).with_span_list(false))
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
            opentelemetry::global::set_tracer_provider(provider.clone());
            tracing::info!(
                service_name = %config.service_name,
                endpoint = %config.otlp_endpoint,
                "trace export enabled"
            );
            Observability {
                tracer_provider: Some(provider),
            }
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_target(true).with_line_number(true))
                .init();
            tracing::error!(error = %e, "failed to initialize OTLP exporter, continuing without export");
            Observability {
                tracer_provider: None,
            }
        }
    }
}

fn build_tracer_provider(config: &ObservabilityConfig) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()
        .context("OTLP trace exporter error")?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build())
}

/// Parse a W3C `traceparent` value into a parent context.
///
/// Returns `None` when the value is not a valid traceparent.
pub fn extract_parent_context(traceparent: &str) -> Option<opentelemetry::Context> {
    use opentelemetry::trace::TraceContextExt;

    let mut carrier = HashMap::new();
    carrier.insert("traceparent".to_string(), traceparent.trim().to_string());

    let context = TraceContextPropagator::new().extract(&carrier);
    let valid = context.span().span_context().is_valid();
    valid.then_some(context)
}
