use crate::api::LogLevel;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use std::fmt;
use std::str::FromStr;

/// Level names are matched case-insensitively; `trace` folds into `Debug` because the host has
/// nothing finer.
impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("error") || s.eq_ignore_ascii_case("err") {
            Ok(LogLevel::Error)
        } else if s.eq_ignore_ascii_case("warn") || s.eq_ignore_ascii_case("warning") {
            Ok(LogLevel::Warning)
        } else if s.eq_ignore_ascii_case("info") {
            Ok(LogLevel::Info)
        } else if s.eq_ignore_ascii_case("debug") || s.eq_ignore_ascii_case("trace") {
            Ok(LogLevel::Debug)
        } else {
            Err(format!("unknown log level `{}`", s))
        }
    }
}

struct LevelNameVisitor;

impl<'de> Visitor<'de> for LevelNameVisitor {
    type Value = LogLevel;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("one of error, warn, info, debug")
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<LogLevel, E> {
        s.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(LevelNameVisitor)
    }
}
