use crate::api::{LogLevel, SampleSink};
use crate::plugins::MonitorManager;
use env_logger::filter;
use log::{self, LevelFilter, Metadata, Record, SetLoggerError};
use std::sync::Arc;

/// Forwards records of the `log` crate into the host's log through a `SampleSink`.
///
/// Third-party crates a monitor depends on can be chatty (websocket frames, TLS handshakes).
/// Rather than mutating other loggers, quiet them here with `quiet_module`:
///
/// ```
/// use monitor_plugin::{HostLoggerBuilder, MemorySink};
/// use log::LevelFilter;
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::new());
/// let logger = HostLoggerBuilder::new(sink)
///     .filter_level(LevelFilter::Info)
///     .quiet_module("tungstenite")
///     .build();
/// assert_eq!(logger.filter(), LevelFilter::Info);
/// ```
pub struct HostLoggerBuilder {
    filter: filter::Builder,
    prefix: Option<&'static str>,
    sink: Arc<dyn SampleSink>,
}

impl HostLoggerBuilder {
    pub fn new(sink: Arc<dyn SampleSink>) -> Self {
        HostLoggerBuilder {
            filter: filter::Builder::new(),
            prefix: None,
            sink,
        }
    }

    pub fn try_init(&mut self) -> Result<(), SetLoggerError> {
        let logger = self.build();
        log::set_max_level(logger.filter());
        log::set_boxed_logger(Box::new(logger))
    }

    pub fn build(&mut self) -> HostLogger {
        HostLogger {
            filter: self.filter.build(),
            prefix: self.prefix,
            sink: self.sink.clone(),
        }
    }

    /// Prefixes every forwarded line with the monitor's name
    pub fn prefix_monitor<T: MonitorManager>(&mut self) -> &mut Self {
        self.prefix = Some(T::name());
        self
    }

    pub fn filter_level(&mut self, level: LevelFilter) -> &mut Self {
        self.filter.filter_level(level);
        self
    }

    pub fn filter_module(&mut self, module: &str, level: LevelFilter) -> &mut Self {
        self.filter.filter_module(module, level);
        self
    }

    /// Only let errors through from `module` (and its submodules)
    pub fn quiet_module(&mut self, module: &str) -> &mut Self {
        self.filter_module(module, LevelFilter::Error)
    }

    pub fn filter(&mut self, module: Option<&str>, level: LevelFilter) -> &mut Self {
        self.filter.filter(module, level);
        self
    }

    /// Parses directives in the `RUST_LOG` format, e.g. `info,ureq=warn`
    pub fn parse(&mut self, filters: &str) -> &mut Self {
        self.filter.parse(filters);
        self
    }
}

pub struct HostLogger {
    filter: filter::Filter,
    prefix: Option<&'static str>,
    sink: Arc<dyn SampleSink>,
}

impl log::Log for HostLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if self.matches(record) {
            let lvl = LogLevel::from(record.level());
            let s = match self.prefix {
                Some(p) => format!("{}: {}", p, record.args()),
                None => format!("{}", record.args()),
            };
            self.sink.log(lvl, &s);
        }
    }

    fn flush(&self) {}
}

impl HostLogger {
    /// Checks if this record matches the configured filter.
    pub fn matches(&self, record: &Record<'_>) -> bool {
        self.filter.matches(record)
    }

    /// Returns the maximum `LevelFilter` that this logger instance is configured to output.
    pub fn filter(&self) -> LevelFilter {
        self.filter.filter()
    }
}
