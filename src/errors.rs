use std::error;
use std::fmt;
#[allow(deprecated)]
use std::panic::PanicInfo;

/// Errors when turning the host's monitor configuration into `ConfigItem`s or when a monitor
/// rejects its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The monitor configuration was not a JSON object
    NotAnObject,

    /// The key holds a value that can't be expressed as a configuration value (e.g. nested
    /// arrays)
    UnsupportedValue(String),

    /// The value was read but the monitor can't work with it
    InvalidValue { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConfigError::NotAnObject => write!(f, "monitor configuration must be an object"),
            ConfigError::UnsupportedValue(ref key) => {
                write!(f, "unsupported value for config key: {}", key)
            }
            ConfigError::InvalidValue { key, ref reason } => {
                write!(f, "invalid value for {}: {}", key, reason)
            }
        }
    }
}

impl error::Error for ConfigError {}

/// Errors that occur when submitting samples to the host
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    /// Samples need a metric name
    EmptyName,

    /// An extra field of the named metric had an empty key
    Field(String, String),

    /// The host refused the sample
    Rejected(String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SubmitError::EmptyName => write!(f, "sample submitted without a metric name"),
            SubmitError::Field(ref metric, ref key) => {
                write!(f, "metric {} has an invalid extra field: `{}`", metric, key)
            }
            SubmitError::Rejected(ref reason) => write!(f, "host rejected sample: {}", reason),
        }
    }
}

impl error::Error for SubmitError {}

/// If a monitor advertises that it supports a certain functionality, but doesn't implement the
/// necessary `Monitor` function, this error is returned.
#[derive(Clone, Copy, Debug)]
pub struct NotImplemented;

impl fmt::Display for NotImplemented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function is not implemented")
    }
}

impl error::Error for NotImplemented {}

/// Errors that occur on the boundary between the host and a monitor
#[derive(Debug)]
pub enum HostError {
    /// Represents a monitor that panicked. A monitor that panics has a logic bug that should be
    /// fixed so that the monitor can better log and recover
    Panic,

    /// Panic message captured by the panic hook
    PanicHook(String),

    /// An error from the monitor. This is a "normal" error that the monitor has surfaced, like
    /// the host refusing a sample.
    Monitor(Box<dyn error::Error>),

    /// The monitor refused its configuration
    Config(Box<dyn error::Error>),
}

impl HostError {
    #[allow(deprecated)]
    pub(crate) fn from_panic_info(info: &PanicInfo<'_>) -> HostError {
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("<unknown panic payload>"));

        match info.location() {
            Some(loc) => HostError::PanicHook(format!("{} ({}:{})", msg, loc.file(), loc.line())),
            None => HostError::PanicHook(msg),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HostError::Panic => write!(f, "monitor panicked"),
            HostError::PanicHook(ref msg) => write!(f, "monitor panicked: {}", msg),
            HostError::Monitor(ref e) => write!(f, "monitor errored out: {}", e),
            HostError::Config(ref e) => write!(f, "monitor configuration rejected: {}", e),
        }
    }
}

impl error::Error for HostError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            HostError::Monitor(ref e) | HostError::Config(ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
