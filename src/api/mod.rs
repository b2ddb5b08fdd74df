pub use self::config::{ConfigItem, ConfigValue};
pub use self::logger::{HostLogger, HostLoggerBuilder};
use crate::errors::SubmitError;
use chrono::prelude::*;
use log::{Level, LevelFilter};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

mod config;
mod logger;

/// The levels at which a monitor can write into the host's log.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl From<Level> for LogLevel {
    fn from(lvl: Level) -> Self {
        match lvl {
            Level::Error => LogLevel::Error,
            Level::Warn => LogLevel::Warning,
            Level::Info => LogLevel::Info,
            Level::Debug | Level::Trace => LogLevel::Debug,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        };
        f.write_str(s)
    }
}

/// The value that a monitor reports can be any one of the following types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Whole numbers: counters, clock frequencies in MHz, hop counts.
    Integer(i64),

    /// A GAUGE value is simply stored as-is. This is the right choice for values which may
    /// increase as well as decrease, such as temperatures or voltages
    Gauge(f64),

    /// Textual state such as a printer status ("Printing") or a bit string.
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Integer(x) => write!(f, "{}", x),
            Value::Gauge(x) => write!(f, "{}", x),
            Value::Text(ref x) => f.write_str(x),
        }
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Integer(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Gauge(x)
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::Text(x)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(x: &'a str) -> Self {
        Value::Text(String::from(x))
    }
}

/// One emission to the host: a metric name, its value and the extra fields that qualify it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: Value,

    /// Additional key value pairs attached to the log line of the sample, e.g. which tool of a
    /// printer a temperature belongs to.
    pub extra_fields: BTreeMap<String, String>,

    /// The timestamp at which the value was collected
    pub time: DateTime<Utc>,
}

/// Documents a metric a monitor may emit. Hosts use these to render monitor documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub extra_fields: &'static [&'static str],
}

impl MetricDefinition {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        MetricDefinition {
            name,
            description,
            extra_fields: &[],
        }
    }

    pub const fn with_extra_fields(mut self, extra_fields: &'static [&'static str]) -> Self {
        self.extra_fields = extra_fields;
        self
    }
}

/// The two capabilities the host exposes to a monitor: accepting samples and accepting log
/// lines. Implementations must be shareable across the monitor threads the host runs.
pub trait SampleSink: Send + Sync {
    /// Hands a sample to the host's logging pipeline.
    fn emit(&self, sample: Sample) -> Result<(), SubmitError>;

    /// Writes a line to the host's own log.
    fn log(&self, lvl: LogLevel, message: &str);
}

/// Creates a sample to report to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuilder<'a> {
    name: &'a str,
    value: Value,
    extra_fields: BTreeMap<String, String>,
    time: Option<DateTime<Utc>>,
}

impl<'a> SampleBuilder<'a> {
    /// Primes a sample for submission. `name` is the dotted metric name, e.g.
    /// `rpi.soc.temperature`
    pub fn new<T: Into<&'a str>>(name: T, value: Value) -> SampleBuilder<'a> {
        SampleBuilder {
            name: name.into(),
            value,
            extra_fields: BTreeMap::new(),
            time: None,
        }
    }

    /// Attaches a single extra field. A later field with the same key replaces the earlier one.
    pub fn extra_field<K: Into<String>, V: Into<String>>(
        mut self,
        key: K,
        value: V,
    ) -> SampleBuilder<'a> {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    pub fn extra_fields<I, K, V>(mut self, fields: I) -> SampleBuilder<'a>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra_fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The timestamp at which the value was collected. Defaults to the moment of `submit`.
    pub fn time(mut self, dt: DateTime<Utc>) -> SampleBuilder<'a> {
        self.time = Some(dt);
        self
    }

    /// Validates the sample and hands it to the host
    pub fn submit(self, sink: &dyn SampleSink) -> Result<(), SubmitError> {
        sink.emit(self.build()?)
    }

    pub fn build(self) -> Result<Sample, SubmitError> {
        if self.name.trim().is_empty() {
            return Err(SubmitError::EmptyName);
        }

        if let Some(key) = self.extra_fields.keys().find(|k| k.trim().is_empty()) {
            return Err(SubmitError::Field(self.name.to_owned(), key.clone()));
        }

        Ok(Sample {
            name: self.name.to_owned(),
            value: self.value,
            extra_fields: self.extra_fields,
            time: self.time.unwrap_or_else(Utc::now),
        })
    }
}

/// A sink that keeps everything in memory. Useful for hosts that batch samples and for
/// exercising monitors without a running agent.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Mutex<Vec<Sample>>,
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Default::default()
    }

    /// All samples emitted so far, in emission order
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All log lines written so far, in order
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Log lines written at exactly `lvl`
    pub fn lines_at(&self, lvl: LogLevel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == lvl)
            .map(|(_, msg)| msg)
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines_at(LogLevel::Warning)
    }
}

impl SampleSink for MemorySink {
    fn emit(&self, sample: Sample) -> Result<(), SubmitError> {
        match self.samples.lock() {
            Ok(mut samples) => {
                samples.push(sample);
                Ok(())
            }
            Err(_) => Err(SubmitError::Rejected(String::from("sample buffer poisoned"))),
        }
    }

    fn log(&self, lvl: LogLevel, message: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.push((lvl, message.to_owned()));
    }
}

/// Returns if the string is empty or not
///
/// # Examples
///
/// ```
/// use monitor_plugin::empty_to_none;
///
/// assert_eq!(None, empty_to_none(""));
///
/// let s = "hi";
/// assert_eq!(Some("hi"), empty_to_none(s));
/// ```
pub fn empty_to_none(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
