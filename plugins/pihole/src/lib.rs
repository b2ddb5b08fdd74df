//! Anonymized DNS query statistics from a Pi-hole admin API.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use monitor_plugin::{
    empty_to_none, ConfigError, ConfigItem, HostContext, LogLevel, MetricDefinition, Monitor,
    MonitorCapabilities, MonitorManager, MonitorRegistration, SampleBuilder, SampleSink, Value,
};
use serde::Deserialize;
use serde_json::Map;
use std::error;
use std::sync::Arc;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Counters reported as whole numbers, in emission order
const COUNTERS: &[&str] = &["dns_queries_today", "ads_blocked_today"];
const TOTALS: &[&str] = &[
    "domains_being_blocked",
    "queries_cached",
    "queries_forwarded",
    "unique_domains",
    "unique_clients",
];

const METRICS: &[MetricDefinition] = &[
    MetricDefinition::new("pihole.dns_queries_today", "DNS queries answered today."),
    MetricDefinition::new("pihole.ads_blocked_today", "Queries blocked today."),
    MetricDefinition::new(
        "pihole.ads_percentage_today",
        "Percentage of today's queries that were blocked.",
    ),
    MetricDefinition::new("pihole.domains_being_blocked", "Domains on the blocklist."),
    MetricDefinition::new("pihole.queries_cached", "Queries answered from cache today."),
    MetricDefinition::new("pihole.queries_forwarded", "Queries forwarded upstream today."),
    MetricDefinition::new("pihole.unique_domains", "Distinct domains queried today."),
    MetricDefinition::new("pihole.unique_clients", "Distinct clients seen today."),
    MetricDefinition::new("pihole.status", "Whether blocking is enabled."),
];

#[derive(Deserialize, Debug)]
struct PiHoleConfig {
    base_url: String,
    basic_auth: Option<String>,
}

/// Builds the `Authorization` header out of `user:password`
fn basic_auth_header(credentials: &str) -> Result<String, ConfigError> {
    let parts: Vec<&str> = credentials.split(':').collect();
    if parts.len() != 2 {
        return Err(ConfigError::InvalidValue {
            key: "basic_auth",
            reason: String::from("credentials must be in username:password notation"),
        });
    }

    Ok(format!("Basic {}", STANDARD.encode(credentials)))
}

/// Whole number out of a summary field. Older Pi-hole releases format numbers as strings with
/// thousands separators.
fn as_integer(value: &serde_json::Value) -> Option<i64> {
    match *value {
        serde_json::Value::Number(ref n) => n.as_i64().or_else(|| n.as_f64().map(|x| x as i64)),
        serde_json::Value::String(ref s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

fn as_float(value: &serde_json::Value) -> Option<f64> {
    match *value {
        serde_json::Value::Number(ref n) => n.as_f64(),
        serde_json::Value::String(ref s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

/// Percentage rounded to one decimal place, ties to even
fn as_percentage(value: &serde_json::Value) -> Option<f64> {
    as_float(value).map(|x| (x * 10.0).round_ties_even() / 10.0)
}

pub struct PiHoleMonitor {
    url: String,
    authorization: Option<String>,
    agent: ureq::Agent,
    sink: Arc<dyn SampleSink>,
}

impl PiHoleMonitor {
    fn fetch(&self) -> Option<Map<String, serde_json::Value>> {
        let mut req = self.agent.get(&self.url);
        if let Some(ref auth) = self.authorization {
            req = req.set("Authorization", auth);
        }

        let resp = match req.call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to retrieve Pi-hole data (status {}): {}", code, body),
                );
                return None;
            }
            Err(e) => {
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to retrieve Pi-hole data: {}", e),
                );
                return None;
            }
        };

        match resp.into_json::<Map<String, serde_json::Value>>() {
            Ok(data) => Some(data),
            Err(e) => {
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to decode Pi-hole data: {}", e),
                );
                None
            }
        }
    }

    fn emit(&self, key: &str, value: Option<Value>) -> Result<(), Box<dyn error::Error>> {
        match value {
            Some(value) => {
                let name = format!("pihole.{}", key);
                SampleBuilder::new(name.as_str(), value).submit(self.sink.as_ref())?;
            }
            None => log::debug!("summary is missing {}", key),
        }

        Ok(())
    }
}

impl MonitorManager for PiHoleMonitor {
    fn name() -> &'static str {
        "pihole_monitor"
    }

    fn metrics() -> &'static [MetricDefinition] {
        METRICS
    }

    fn monitors(
        config: Option<&[ConfigItem<'_>]>,
        ctx: &HostContext,
    ) -> Result<MonitorRegistration, Box<dyn error::Error>> {
        let config: PiHoleConfig = monitor_plugin::de::from_config(config.unwrap_or_default())?;
        let base_url = config.base_url.strip_suffix('/').unwrap_or(&config.base_url);
        let authorization = config
            .basic_auth
            .as_deref()
            .and_then(empty_to_none)
            .map(basic_auth_header)
            .transpose()?;

        Ok(MonitorRegistration::Single(Box::new(PiHoleMonitor {
            url: format!("{}/admin/api.php", base_url),
            authorization,
            agent: ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
            sink: ctx.sink(),
        })))
    }
}

impl Monitor for PiHoleMonitor {
    fn capabilities(&self) -> MonitorCapabilities {
        MonitorCapabilities::READ
    }

    fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
        let data = match self.fetch() {
            Some(data) => data,
            None => return Ok(()),
        };

        for key in COUNTERS {
            self.emit(key, data.get(*key).and_then(as_integer).map(Value::Integer))?;
        }

        let percentage = data
            .get("ads_percentage_today")
            .and_then(as_percentage)
            .map(Value::Gauge);
        self.emit("ads_percentage_today", percentage)?;

        for key in TOTALS {
            self.emit(key, data.get(*key).and_then(as_integer).map(Value::Integer))?;
        }

        let status = data
            .get("status")
            .and_then(|x| x.as_str())
            .map(Value::from);
        self.emit("status", status)?;

        Ok(())
    }
}
