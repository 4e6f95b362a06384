//! Stdout logging and optional OTLP trace export for the gateway.
use std::env;

use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Environment variable name for the OTLP collector endpoint.
pub const OTLP_URL_ENVVAR: &str = "GATEWAY_OTLP_URL";

/// Environment variable name for the label that tells replicas of the gateway apart.
pub const SVC_LABEL_ENVVAR: &str = "GATEWAY_SVC_LABEL";

/// Where logs and traces go, and what the process calls itself there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Reported as the `service.name` resource attribute.
    service_name: String,

    /// Replica label, reported as `service.instance.id`.
    instance: Option<String>,

    /// OTLP collector endpoint. Traces are only exported when set.
    otlp_url: Option<String>,
}

impl LoggerConfig {
    /// Builds the config for `service_name`, taking the replica label and collector endpoint from
    /// the environment.
    pub fn from_env(service_name: &str) -> Self {
        Self::from_parts(
            service_name,
            env::var(SVC_LABEL_ENVVAR).ok(),
            env::var(OTLP_URL_ENVVAR).ok(),
        )
    }

    fn from_parts(service_name: &str, instance: Option<String>, otlp_url: Option<String>) -> Self {
        // An exported-but-empty variable counts as unset.
        let non_empty = |v: Option<String>| v.filter(|v| !v.trim().is_empty());
        Self {
            service_name: service_name.to_owned(),
            instance: non_empty(instance),
            otlp_url: non_empty(otlp_url),
        }
    }

    /// The name logs are tagged with, `service%label` when a replica label is set.
    pub fn whoami(&self) -> String {
        match &self.instance {
            Some(label) => format!("{}%{label}", self.service_name),
            None => self.service_name.clone(),
        }
    }

    fn resource_attributes(&self) -> Vec<KeyValue> {
        let mut attrs = vec![KeyValue::new("service.name", self.service_name.clone())];
        if let Some(label) = &self.instance {
            attrs.push(KeyValue::new("service.instance.id", label.clone()));
        }
        attrs
    }
}

/// Installs the global subscriber: compact stdout logs filtered by `RUST_LOG`, plus OTLP span
/// export when the config has a collector endpoint.
///
/// # Panics
///
/// If a global subscriber has already been installed or the OTLP exporter cannot be built.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::from_default_env();

    let log_file = env::var("LOG_FILE").is_ok_and(|v| v == "1");
    let log_line_num = env::var("LOG_LINE_NUM").is_ok_and(|v| v == "1");

    let stdout_sub = tracing_subscriber::fmt::layer()
        .compact()
        .event_format(
            tracing_subscriber::fmt::format()
                .with_file(log_file)
                .with_line_number(log_line_num),
        )
        .with_filter(filt);

    let whoami = config.whoami();
    match &config.otlp_url {
        Some(otlp_url) => {
            let resource = Resource::builder()
                .with_attributes(config.resource_attributes())
                .build();

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(otlp_url)
                .build()
                .expect("must be able to initialize exporter");

            let tp = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_resource(resource)
                .with_batch_exporter(exporter)
                .build();

            let otel_sub =
                tracing_opentelemetry::layer().with_tracer(tp.tracer(config.service_name.clone()));

            tracing_subscriber::registry()
                .with(stdout_sub)
                .with(otel_sub)
                .init();

            info!(%whoami, %otlp_url, "logging started, exporting traces");
        }
        None => {
            tracing_subscriber::registry().with(stdout_sub).init();
            info!(%whoami, "logging started");
        }
    }
}
