//! Decoders for the one line answers of the `vcgencmd` firmware tool.
use monitor_plugin::Value;
use std::error;
use std::fmt;

/// A decoded firmware answer
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Clock frequency in MHz
    Clock(u64),

    /// Voltage, rounded to two decimal places
    Volts(f64),

    /// Temperature in Celsius
    Temperature(f64),

    /// Throttle state as an unpadded bit string, e.g. `"1010000000000000101"`
    Throttle(String),
}

impl From<Reading> for Value {
    fn from(reading: Reading) -> Self {
        match reading {
            Reading::Clock(x) => Value::Integer(x as i64),
            Reading::Volts(x) | Reading::Temperature(x) => Value::Gauge(x),
            Reading::Throttle(x) => Value::Text(x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The answer didn't start with the expected `key=` prefix
    UnexpectedFormat { expected: &'static str, output: String },

    /// The payload after the prefix is not a number
    InvalidNumber(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DecodeError::UnexpectedFormat { expected, ref output } => {
                write!(f, "expected output of the form `{}`, got: {}", expected, output)
            }
            DecodeError::InvalidNumber(ref output) => {
                write!(f, "unable to parse number from: {}", output)
            }
        }
    }
}

impl error::Error for DecodeError {}

/// Which decoder a firmware command's output goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Clock,
    Volts,
    Temperature,
    Throttled,
}

impl Decoder {
    pub fn decode(self, output: &str) -> Result<Reading, DecodeError> {
        match self {
            Decoder::Clock => parse_clock(output).map(Reading::Clock),
            Decoder::Volts => parse_volts(output).map(Reading::Volts),
            Decoder::Temperature => parse_temperature(output).map(Reading::Temperature),
            Decoder::Throttled => parse_throttled(output).map(Reading::Throttle),
        }
    }
}

fn strip<'a>(output: &'a str, prefix: &str, suffix: &str, expected: &'static str) -> Result<&'a str, DecodeError> {
    output
        .trim()
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .ok_or_else(|| DecodeError::UnexpectedFormat {
            expected,
            output: output.to_owned(),
        })
}

/// `frequency(48)=1800404352` → `1800` (MHz)
pub fn parse_clock(output: &str) -> Result<u64, DecodeError> {
    const EXPECTED: &str = "frequency(N)=HZ";
    let rest = strip(output, "frequency(", "", EXPECTED)?;
    let hz = rest
        .find(')')
        .and_then(|idx| rest[idx + 1..].strip_prefix('='))
        .ok_or_else(|| DecodeError::UnexpectedFormat {
            expected: EXPECTED,
            output: output.to_owned(),
        })?;

    let hz: u64 = hz
        .trim()
        .parse()
        .map_err(|_| DecodeError::InvalidNumber(output.to_owned()))?;
    Ok(hz / 1_000_000)
}

/// `volt=0.9400V` → `0.94`
pub fn parse_volts(output: &str) -> Result<f64, DecodeError> {
    let volts: f64 = strip(output, "volt=", "V", "volt=VALUEV")?
        .parse()
        .map_err(|_| DecodeError::InvalidNumber(output.to_owned()))?;
    Ok((volts * 100.0).round_ties_even() / 100.0)
}

/// `temp=49.0'C` → `49.0`
pub fn parse_temperature(output: &str) -> Result<f64, DecodeError> {
    strip(output, "temp=", "'C", "temp=VALUE'C")?
        .parse()
        .map_err(|_| DecodeError::InvalidNumber(output.to_owned()))
}

/// `throttled=0x50005` → `"1010000000000000101"`
pub fn parse_throttled(output: &str) -> Result<String, DecodeError> {
    let raw = strip(output, "throttled=", "", "throttled=0xHEX")?.trim();
    let lower = raw.to_ascii_lowercase();
    let (digits, radix) = if let Some(x) = lower.strip_prefix("0x") {
        (x, 16)
    } else if let Some(x) = lower.strip_prefix("0o") {
        (x, 8)
    } else if let Some(x) = lower.strip_prefix("0b") {
        (x, 2)
    } else {
        (lower.as_str(), 10)
    };

    u64::from_str_radix(digits, radix)
        .map(|x| format!("{:b}", x))
        .map_err(|_| DecodeError::InvalidNumber(output.to_owned()))
}
