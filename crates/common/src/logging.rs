use std::env;

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub const OTLP_URL_ENVVAR: &str = "CAIRN_OTLP_URL";
pub const SVC_LABEL_ENVVAR: &str = "CAIRN_SVC_LABEL";

pub struct LoggerConfig {
    whoami: String,
    otel_url: Option<String>,
}

impl LoggerConfig {
    pub fn new(whoami: String) -> Self {
        Self {
            whoami,
            otel_url: None,
        }
    }

    /// Creates a config for the given service basename, picking up the
    /// standard envvars for the service label and the OTLP endpoint.
    pub fn with_base_name(base: &str) -> Self {
        let whoami = match env::var(SVC_LABEL_ENVVAR).ok() {
            Some(label) => format!("{base}%{label}"),
            None => base.to_string(),
        };
        let mut config = Self::new(whoami);
        config.otel_url = env::var(OTLP_URL_ENVVAR).ok();
        config
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("(cairn-service)")
    }
}

/// Initializes the logging subsystem with the provided config.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::from_default_env();
    let stdout_sub = tracing_subscriber::fmt::layer().compact().with_filter(filt);

    if let Some(otel_url) = &config.otel_url {
        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(otel_url);

        let tp = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
            .expect("init: opentelemetry");

        let otel_sub = tracing_opentelemetry::layer().with_tracer(tp.tracer("cairn-log"));

        tracing_subscriber::registry()
            .with(stdout_sub)
            .with(otel_sub)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_sub).init();
    }

    info!(whoami = %config.whoami, "logging started");
}
