//! 3D printer status and temperatures from the OctoPrint REST API.
use monitor_plugin::{
    ConfigItem, HostContext, LogLevel, MetricDefinition, Monitor, MonitorCapabilities,
    MonitorManager, MonitorRegistration, SampleBuilder, SampleSink, Value,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error;
use std::sync::Arc;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const METRICS: &[MetricDefinition] = &[
    MetricDefinition::new("octoprint.state", "3D printer status."),
    MetricDefinition::new(
        "octoprint.bed.temperature.actual",
        "3D printer actual bed temperature.",
    ),
    MetricDefinition::new(
        "octoprint.bed.temperature.target",
        "3D printer target bed temperature.",
    ),
    MetricDefinition::new(
        "octoprint.tool.temperature.actual",
        "3D printer actual tool temperature.",
    )
    .with_extra_fields(&["tool"]),
    MetricDefinition::new(
        "octoprint.tool.temperature.target",
        "3D printer target tool temperature.",
    )
    .with_extra_fields(&["tool"]),
];

#[derive(Deserialize, Debug)]
struct OctoPrintConfig {
    base_url: String,
    api_key: String,
}

/// The subset of `GET /api/printer` that is reported
#[derive(Deserialize, Debug, Default)]
struct PrinterResponse {
    state: Option<PrinterState>,
    #[serde(default)]
    temperature: BTreeMap<String, serde_json::Value>,
}

impl PrinterResponse {
    /// Readings of one heater. An entry that isn't a readings object is skipped without
    /// affecting the others.
    fn readings(&self, key: &str) -> Option<Temperature> {
        let raw = self.temperature.get(key)?;
        match Temperature::deserialize(raw) {
            Ok(temps) => Some(temps),
            Err(e) => {
                log::debug!("skipping temperature {}: {}", key, e);
                None
            }
        }
    }
}

#[derive(Deserialize, Debug)]
struct PrinterState {
    text: Option<String>,
    #[serde(default)]
    flags: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
struct Temperature {
    actual: Option<f64>,
    target: Option<f64>,
}

/// Flags are reported the way OctoPrint's own Python stack renders booleans
fn render_flag(value: &serde_json::Value) -> String {
    match *value {
        serde_json::Value::Bool(true) => String::from("True"),
        serde_json::Value::Bool(false) => String::from("False"),
        serde_json::Value::String(ref s) => s.clone(),
        ref x => x.to_string(),
    }
}

pub struct OctoPrintMonitor {
    url: String,
    api_key: String,
    agent: ureq::Agent,
    sink: Arc<dyn SampleSink>,
}

impl OctoPrintMonitor {
    fn fetch(&self) -> Option<PrinterResponse> {
        let resp = match self.agent.get(&self.url).set("X-Api-Key", &self.api_key).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to retrieve printer data (status {}): {}", code, body),
                );
                return None;
            }
            Err(e) => {
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to retrieve printer data: {}", e),
                );
                return None;
            }
        };

        match resp.into_json::<PrinterResponse>() {
            Ok(data) => Some(data),
            Err(e) => {
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to decode printer data: {}", e),
                );
                None
            }
        }
    }

    fn emit_temperatures(
        &self,
        prefix: &str,
        temps: Temperature,
        tool: Option<&str>,
    ) -> Result<(), Box<dyn error::Error>> {
        let readings = [("actual", temps.actual), ("target", temps.target)];
        for (kind, reading) in readings.iter() {
            let value = match reading {
                Some(x) => *x,
                None => {
                    log::debug!("no {} reading for {}", kind, tool.unwrap_or(prefix));
                    continue;
                }
            };

            let name = format!("{}.temperature.{}", prefix, kind);
            let mut builder = SampleBuilder::new(name.as_str(), Value::Gauge(value));
            if let Some(tool) = tool {
                builder = builder.extra_field("tool", tool);
            }
            builder.submit(self.sink.as_ref())?;
        }

        Ok(())
    }
}

impl MonitorManager for OctoPrintMonitor {
    fn name() -> &'static str {
        "octoprint_monitor"
    }

    fn metrics() -> &'static [MetricDefinition] {
        METRICS
    }

    fn monitors(
        config: Option<&[ConfigItem<'_>]>,
        ctx: &HostContext,
    ) -> Result<MonitorRegistration, Box<dyn error::Error>> {
        let config: OctoPrintConfig = monitor_plugin::de::from_config(config.unwrap_or_default())?;
        let base_url = config.base_url.strip_suffix('/').unwrap_or(&config.base_url);

        Ok(MonitorRegistration::Single(Box::new(OctoPrintMonitor {
            url: format!("{}/api/printer", base_url),
            api_key: config.api_key,
            agent: ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
            sink: ctx.sink(),
        })))
    }
}

impl Monitor for OctoPrintMonitor {
    fn capabilities(&self) -> MonitorCapabilities {
        MonitorCapabilities::READ
    }

    fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
        let mut data = match self.fetch() {
            Some(data) => data,
            None => return Ok(()),
        };

        if let Some(state) = data.state.take() {
            match state.text {
                Some(text) => {
                    SampleBuilder::new("octoprint.state", Value::Text(text))
                        .extra_fields(state.flags.iter().map(|(k, v)| (k.as_str(), render_flag(v))))
                        .submit(self.sink.as_ref())?;
                }
                None => log::debug!("printer state has no text"),
            }
        }

        if let Some(bed) = data.readings("bed") {
            self.emit_temperatures("octoprint.bed", bed, None)?;
        }

        // BTreeMap iteration keeps the tools sorted
        for key in data.temperature.keys().filter(|k| k.starts_with("tool")) {
            if let Some(temps) = data.readings(key) {
                self.emit_temperatures("octoprint.tool", temps, Some(key))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_flag() {
        assert_eq!(render_flag(&serde_json::Value::Bool(true)), "True");
        assert_eq!(render_flag(&serde_json::Value::Bool(false)), "False");
        assert_eq!(render_flag(&serde_json::json!("x")), "x");
        assert_eq!(render_flag(&serde_json::json!(1)), "1");
    }

    #[test]
    fn test_decode_partial_response() {
        let data: PrinterResponse =
            serde_json::from_str(r#"{"temperature": {"bed": {"actual": 20.5}, "chamber": null}}"#)
                .unwrap();
        assert!(data.state.is_none());
        assert_eq!(data.temperature.len(), 2);
        let bed = data.readings("bed").unwrap();
        assert_eq!(bed.actual, Some(20.5));
        assert_eq!(bed.target, None);
        assert!(data.readings("chamber").is_none());
    }

    #[test]
    fn test_odd_temperature_entry_is_skipped() {
        let data: PrinterResponse = serde_json::from_str(
            r#"{"temperature": {"bed": {"actual": 60.0, "target": 60.0}, "tool0": 215.0, "tool1": {"actual": 24.1}}}"#,
        )
        .unwrap();
        assert!(data.readings("tool0").is_none());
        assert_eq!(data.readings("tool1").unwrap().actual, Some(24.1));
        assert_eq!(data.readings("bed").unwrap().target, Some(60.0));
    }
}
