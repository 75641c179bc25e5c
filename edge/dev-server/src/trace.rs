use miette::{IntoDiagnostic, Result};
use opentelemetry_sdk::trace::SdkTracerProvider;

pub struct TraceGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        let Some(tracer_provider) = &self.tracer_provider else {
            return;
        };
        if let Err(err) = tracer_provider.shutdown() {
            eprintln!("Failed to shutdown tracer provider: {err}");
        }
    }
}

/// Log to stderr, and export spans over OTLP when `otlp` is set.
pub fn setup_tracing(otlp: bool) -> Result<TraceGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

    let fmt_layer = fmt::layer()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (otel_layer, tracer_provider) = if otlp {
        use opentelemetry::trace::TracerProvider;

        let tracer_provider = setup_otel_tracer_provider()?;

        let tracer = tracer_provider.tracer("kv-assets-dev-server");
        let layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::DEBUG.into())
            .parse("debug,kv_assets=trace,kv_assets_dev_server=trace")
            .into_diagnostic()?;
        let layer = layer.with_filter(filter);

        (Some(layer), Some(tracer_provider))
    } else {
        (None, None)
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let fmt_layer = fmt_layer.with_filter(filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Ok(TraceGuard { tracer_provider })
}

fn setup_otel_tracer_provider() -> Result<SdkTracerProvider> {
    use opentelemetry::{KeyValue, global};
    use opentelemetry_otlp::SpanExporter;
    use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator};
    use opentelemetry_semantic_conventions::{SCHEMA_URL, attribute::SERVICE_VERSION};

    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::builder()
        .with_service_name("kv-assets-dev-server")
        .with_schema_url(
            [KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION"))],
            SCHEMA_URL,
        )
        .build();

    let exporter = SpanExporter::builder()
        .with_http()
        .build()
        .into_diagnostic()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}
