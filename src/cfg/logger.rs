// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Event, Subscriber};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields, FormattedFields,
        format::{FmtSpan, JsonFields, Writer},
    },
    layer::SubscriberExt,
};

#[derive(Debug, Deserialize, Clone)]
struct LoggerFile {
    logger: LogConfig,
}

/// `logger:` section of the logger YAML.
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub level: String,
    /// `stdout`, `stderr` or `file`.
    pub output: String,
    #[serde(default)]
    pub is_show_line: bool,
    #[serde(default)]
    pub is_show_module_path: bool,
    #[serde(default)]
    pub is_show_target: bool,
    pub file: Option<LogFileConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogFileConfig {
    pub path: String,
    /// `minutely`, `hourly`, `daily`; anything else never rotates.
    pub rotation_frequency: Option<String>,
}

impl LogConfig {
    pub fn load(config_path: &str) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path}"))?;
        let file: LoggerFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path}"))?;
        Ok(file.logger)
    }
}

// One JSON object per event.
struct JsonFormatter {
    config: Arc<LogConfig>,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    fields: serde_json::Map<String, Value>,
}

impl LogEntry {
    fn new(config: &LogConfig, event: &Event, fields: serde_json::Map<String, Value>) -> Self {
        let meta = event.metadata();
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: meta.level().to_string(),
            target: config.is_show_target.then(|| meta.target().to_string()),
            module_path: config
                .is_show_module_path
                .then(|| meta.module_path().unwrap_or("").to_string()),
            line: if config.is_show_line { meta.line() } else { None },
            fields,
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.fields;

        // Span fields (e.g. the device path of a copy job) are merged in.
        if let Some(scope) = ctx.event_scope() {
            let mut span_names = vec![];
            for span in scope.from_root() {
                span_names.push(span.name().to_string());
                if let Some(ext) = span.extensions().get::<FormattedFields<JsonFields>>() {
                    let v: HashMap<String, Value> =
                        serde_json::from_str(&ext.fields).unwrap_or_default();
                    fields.extend(v);
                }
            }
            fields.insert("span_names".to_string(), json!(span_names));
        }

        let entry = LogEntry::new(&self.config, event, fields);
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?
        )
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: serde_json::Map<String, Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{value:?}")));
    }
}

fn rotation(freq: Option<&str>) -> Rotation {
    match freq {
        Some("minutely") => Rotation::MINUTELY,
        Some("hourly") => Rotation::HOURLY,
        Some("daily") => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

fn make_writer(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    Ok(match config.output.as_str() {
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        "stderr" => tracing_appender::non_blocking(std::io::stderr()),
        "file" => {
            let file = config
                .file
                .as_ref()
                .context("logger output is `file` but no `file` section given")?;
            let path = Path::new(&file.path);
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            let name = path
                .file_name()
                .with_context(|| format!("log path {:?} has no file name", file.path))?;
            let appender =
                RollingFileAppender::new(rotation(file.rotation_frequency.as_deref()), dir, name);
            tracing_appender::non_blocking(appender)
        },
        other => bail!("Invalid log output specified: {other}"),
    })
}

/// Install the global JSON subscriber described by the YAML at
/// `config_path`. Keep the returned guard alive or buffered lines are lost.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let config = LogConfig::load(config_path)?;
    let (writer, guard) = make_writer(&config)?;

    let env_filter =
        EnvFilter::try_new(&config.level).context("Failed to parse log level from config")?;

    let layer = fmt::layer()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .json()
        .event_format(JsonFormatter {
            config: Arc::new(config),
        })
        .fmt_fields(JsonFields::default());

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    Ok(guard)
}
