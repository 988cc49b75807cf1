//! Tracing subscriber setup for stackctl.
//!
//! Console logs go to stderr so stdout stays reserved for command output
//! (status tables, `logs`, `config`). Configuration comes from environment
//! variables:
//!
//! - `STACKCTL_LOG_LEVEL`   filter directive, default `warn` (`RUST_LOG` wins)
//! - `STACKCTL_LOG_OUTPUT`  `console`, `file` or `both`
//! - `STACKCTL_LOG_FORMAT`  `human` or `json`
//! - `STACKCTL_LOG_FILE`    log file path, rotated daily
//! - `STACKCTL_LOG_SERVICE` only keep events inside spans whose `service`
//!   field matches (comma separated, `*` for any)

use std::{
    collections::HashMap,
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{field::Visit, span, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Context, Layer},
    prelude::*,
    registry, EnvFilter,
};

const DEFAULT_LOG_FILE: &str = "/tmp/stackctl.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub output: LogOutput,
    pub json: bool,
    pub file: PathBuf,
    pub services: Vec<String>,
}

impl LogConfig {
    /// Read the configuration from the process environment.
    ///
    /// `debug` raises the default level when no level is set explicitly.
    pub fn from_env(debug: bool) -> Self {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("STACKCTL_LOG_"))
            .collect();
        Self::from_vars(&vars, debug)
    }

    pub fn from_vars(vars: &HashMap<String, String>, debug: bool) -> Self {
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_string());

        let default_level = if debug { "debug" } else { "warn" };
        let level = get("STACKCTL_LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default_level.to_string());

        let output = match get("STACKCTL_LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some("off") | Some("none") => LogOutput::Off,
            _ => LogOutput::Console,
        };

        let json = get("STACKCTL_LOG_FORMAT").as_deref() == Some("json");
        let file = get("STACKCTL_LOG_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        let services = get("STACKCTL_LOG_SERVICE")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            level,
            output,
            json,
            file,
            services,
        }
    }
}

// --- Tee writer for console + file ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

// --- Service span filtering ---

/// Drops events that are not inside a span carrying a matching `service`
/// field. Disabled when no services are configured.
struct ServiceFilterLayer {
    services: Vec<String>,
}

impl ServiceFilterLayer {
    fn matches(&self, value: &str) -> bool {
        let value = value.trim_matches('"');
        self.services
            .iter()
            .any(|wanted| wanted == "*" || wanted == value)
    }
}

impl<S> Layer<S> for ServiceFilterLayer
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut fields = HashMap::new();
            let mut visitor = FieldVisitor(&mut fields);
            attrs.record(&mut visitor);
            span.extensions_mut().insert(fields);
        }
    }

    fn enabled(&self, meta: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        if self.services.is_empty() || meta.is_span() {
            return true;
        }

        let scope = match ctx.current_span().id().and_then(|id| ctx.span_scope(id)) {
            Some(scope) => scope,
            None => return false,
        };

        for span_ref in scope {
            if let Some(fields) = span_ref.extensions().get::<HashMap<String, String>>() {
                if let Some(service) = fields.get("service") {
                    return self.matches(service);
                }
            }
        }
        false
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Initializes the global tracing subscriber from the environment.
///
/// The returned guard must be held for the lifetime of the process when
/// file output is enabled, otherwise buffered lines are lost.
pub fn init_subscriber(debug: bool) -> Option<WorkerGuard> {
    init_with(LogConfig::from_env(debug))
}

pub fn init_with(config: LogConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let service_layer = ServiceFilterLayer {
        services: config.services.clone(),
    };
    let subscriber = registry().with(env_filter).with(service_layer);

    let log_dir = config.file.parent().unwrap_or_else(|| Path::new("/tmp"));
    let log_filename = config
        .file
        .file_name()
        .unwrap_or_else(|| "stackctl.log".as_ref());

    let mut guard: Option<WorkerGuard> = None;

    // `try_init` so a second initialisation (tests, embedding) is harmless.
    match config.output {
        LogOutput::Both => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker);

            let tee_writer = MakeTee {
                make_a: std::io::stderr,
                make_b: non_blocking,
            };
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
            if config.json {
                let _ = subscriber.with(fmt_layer.json()).try_init();
            } else {
                let _ = subscriber.with(fmt_layer.compact()).try_init();
            }
        }
        LogOutput::Console => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if config.json {
                let _ = subscriber.with(fmt_layer.json()).try_init();
            } else {
                let _ = subscriber.with(fmt_layer.compact()).try_init();
            }
        }
        LogOutput::File => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if config.json {
                let _ = subscriber.with(fmt_layer.json()).try_init();
            } else {
                let _ = subscriber.with(fmt_layer).try_init();
            }
        }
        LogOutput::Off => {
            let _ = subscriber.try_init();
        }
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = LogConfig::from_vars(&HashMap::new(), false);
        assert_eq!(config.level, "warn");
        assert_eq!(config.output, LogOutput::Console);
        assert!(!config.json);
        assert_eq!(config.file, PathBuf::from(DEFAULT_LOG_FILE));
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_debug_raises_default_level_only() {
        assert_eq!(LogConfig::from_vars(&HashMap::new(), true).level, "debug");
        let explicit = vars(&[("STACKCTL_LOG_LEVEL", "info")]);
        assert_eq!(LogConfig::from_vars(&explicit, true).level, "info");
    }

    #[test]
    fn test_parses_output_format_and_services() {
        let config = LogConfig::from_vars(
            &vars(&[
                ("STACKCTL_LOG_OUTPUT", "both"),
                ("STACKCTL_LOG_FORMAT", "json"),
                ("STACKCTL_LOG_FILE", "/var/log/stackctl/run.log"),
                ("STACKCTL_LOG_SERVICE", "backend, database,"),
            ]),
            false,
        );
        assert_eq!(config.output, LogOutput::Both);
        assert!(config.json);
        assert_eq!(config.file, PathBuf::from("/var/log/stackctl/run.log"));
        assert_eq!(config.services, vec!["backend", "database"]);
    }

    #[test]
    fn test_service_filter_matching() {
        let layer = ServiceFilterLayer {
            services: vec!["backend".into()],
        };
        assert!(layer.matches("backend"));
        assert!(layer.matches("\"backend\""));
        assert!(!layer.matches("database"));

        let any = ServiceFilterLayer {
            services: vec!["*".into()],
        };
        assert!(any.matches("nginx"));
    }
}
