use httpmock::prelude::*;
use monitor_plugin::internal::{monitor_gather, register_monitors};
use monitor_plugin::{ConfigItem, HostContext, MemorySink, Sample, Value};
use octoprint::OctoPrintMonitor;
use std::collections::BTreeMap;
use std::sync::Arc;

const API_PRINTER: &str = include_str!("fixtures/api_printer.json");

fn gather(base_url: &str, api_key: &str) -> Arc<MemorySink> {
    let sink = Arc::new(MemorySink::new());
    let ctx = HostContext::new(sink.clone());
    let raw = serde_json::json!({
        "module": "octoprint_monitor",
        "base_url": base_url,
        "api_key": api_key,
    });
    let items = ConfigItem::from_json(&raw).unwrap();
    let mut monitors = register_monitors::<OctoPrintMonitor>(Some(&items), &ctx).unwrap();
    monitor_gather(&mut monitors[0], &ctx).unwrap();
    sink
}

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (String::from(*k), String::from(*v)))
        .collect()
}

fn simplify(samples: Vec<Sample>) -> Vec<(String, Value, BTreeMap<String, String>)> {
    samples
        .into_iter()
        .map(|s| (s.name, s.value, s.extra_fields))
        .collect()
}

#[test]
fn gather_sample_success() {
    let server = MockServer::start();
    let printer = server.mock(|when, then| {
        when.method(GET)
            .path("/api/printer")
            .header("X-Api-Key", "valid");
        then.status(200)
            .header("content-type", "application/json")
            .body(API_PRINTER);
    });

    // trailing slash is stripped
    let sink = gather(&format!("{}/", server.base_url()), "valid");
    printer.assert();

    let flags = fields(&[
        ("cancelling", "False"),
        ("closedOrError", "False"),
        ("error", "False"),
        ("finishing", "False"),
        ("operational", "True"),
        ("paused", "False"),
        ("pausing", "False"),
        ("printing", "True"),
        ("ready", "False"),
        ("resuming", "False"),
        ("sdReady", "False"),
    ]);

    let expected = vec![
        (String::from("octoprint.state"), Value::from("Printing"), flags),
        (
            String::from("octoprint.bed.temperature.actual"),
            Value::Gauge(59.97),
            BTreeMap::new(),
        ),
        (
            String::from("octoprint.bed.temperature.target"),
            Value::Gauge(60.0),
            BTreeMap::new(),
        ),
        (
            String::from("octoprint.tool.temperature.actual"),
            Value::Gauge(209.92),
            fields(&[("tool", "tool0")]),
        ),
        (
            String::from("octoprint.tool.temperature.target"),
            Value::Gauge(210.0),
            fields(&[("tool", "tool0")]),
        ),
    ];

    assert_eq!(simplify(sink.samples()), expected);
    assert!(sink.warnings().is_empty());
}

#[test]
fn gather_sample_invalid_auth() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/printer");
        then.status(401).body("Invalid API key");
    });

    let sink = gather(&server.base_url(), "invalid");
    assert!(sink.samples().is_empty());

    let warnings = sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("401"));
}

#[test]
fn each_tool_reports_its_own_readings() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/printer");
        then.status(200).json_body(serde_json::json!({
            "temperature": {
                "tool1": {"actual": 180.5, "target": 200.0},
                "bed": {"actual": 40.0, "target": 50.0},
                "tool0": {"actual": 150.0, "target": 210.0},
                "chamber": {"actual": 30.0, "target": null}
            }
        }));
    });

    let sink = gather(&server.base_url(), "valid");
    let actual: Vec<(String, Value, Option<String>)> = sink
        .samples()
        .into_iter()
        .map(|s| (s.name, s.value, s.extra_fields.get("tool").cloned()))
        .collect();

    let tool = |name: &str| Some(String::from(name));
    assert_eq!(
        actual,
        vec![
            (String::from("octoprint.bed.temperature.actual"), Value::Gauge(40.0), None),
            (String::from("octoprint.bed.temperature.target"), Value::Gauge(50.0), None),
            (String::from("octoprint.tool.temperature.actual"), Value::Gauge(150.0), tool("tool0")),
            (String::from("octoprint.tool.temperature.target"), Value::Gauge(210.0), tool("tool0")),
            (String::from("octoprint.tool.temperature.actual"), Value::Gauge(180.5), tool("tool1")),
            (String::from("octoprint.tool.temperature.target"), Value::Gauge(200.0), tool("tool1")),
        ]
    );
}

#[test]
fn malformed_temperature_entry_skips_only_that_heater() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/printer");
        then.status(200).json_body(serde_json::json!({
            "state": {"text": "Operational", "flags": {"ready": true}},
            "temperature": {
                "bed": {"actual": 40.0, "target": 50.0},
                "tool0": "offline",
                "tool1": {"actual": 180.5, "target": 200.0}
            }
        }));
    });

    let sink = gather(&server.base_url(), "valid");
    let names: Vec<(String, Option<String>)> = sink
        .samples()
        .into_iter()
        .map(|s| (s.name, s.extra_fields.get("tool").cloned()))
        .collect();

    let tool1 = || Some(String::from("tool1"));
    assert_eq!(
        names,
        vec![
            (String::from("octoprint.state"), None),
            (String::from("octoprint.bed.temperature.actual"), None),
            (String::from("octoprint.bed.temperature.target"), None),
            (String::from("octoprint.tool.temperature.actual"), tool1()),
            (String::from("octoprint.tool.temperature.target"), tool1()),
        ]
    );
    assert!(sink.warnings().is_empty());
}

#[test]
fn undecodable_body_warns() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/printer");
        then.status(200).body("<html>login</html>");
    });

    let sink = gather(&server.base_url(), "valid");
    assert!(sink.samples().is_empty());
    assert_eq!(sink.warnings().len(), 1);
}

#[test]
fn unreachable_server_warns() {
    // nothing listens on the discard port
    let sink = gather("http://127.0.0.1:9", "valid");
    assert!(sink.samples().is_empty());
    assert_eq!(sink.warnings().len(), 1);
}

#[test]
fn missing_api_key_is_rejected() {
    let sink = Arc::new(MemorySink::new());
    let ctx = HostContext::new(sink);
    let raw = serde_json::json!({ "base_url": "http://octopi.local" });
    let items = ConfigItem::from_json(&raw).unwrap();
    assert!(register_monitors::<OctoPrintMonitor>(Some(&items), &ctx).is_err());
}
