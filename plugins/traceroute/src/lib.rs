//! Reports the number of hops and the per-hop round trip times towards a destination, as
//! discovered by a disposable `fast-mda-traceroute` container.
pub mod decode;

use crate::decode::TracerouteResult;
use chrono::Utc;
use itertools::Itertools;
use monitor_plugin::{
    ConfigError, ConfigItem, HostContext, LogLevel, MetricDefinition, Monitor,
    MonitorCapabilities, MonitorManager, MonitorRegistration, SampleBuilder, SampleSink, Value,
};
use serde::Deserialize;
use std::error;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const IMAGE: &str = "ghcr.io/dioptra-io/fast-mda-traceroute";

static INVOCATIONS: AtomicU64 = AtomicU64::new(0);

const METRICS: &[MetricDefinition] = &[MetricDefinition::new(
    "traceroute.hops",
    "Number of hops to the destination",
)
.with_extra_fields(&[
    "destination",
    "destination_original",
    "label",
    "hops",
    "hop_rtts",
    "total_rtt",
    "method",
])];

#[derive(Deserialize, Debug)]
struct TracerouteConfig {
    destination: String,
    label: Option<String>,
    #[serde(default = "default_docker_path")]
    docker_path: String,
}

fn default_docker_path() -> String {
    String::from("docker")
}

/// Only IPv4 is supported by the probe, so the destination is resolved up front instead of
/// letting the container pick an IPv6 address.
fn resolve_ipv4(destination: &str) -> Result<Ipv4Addr, ConfigError> {
    if let Ok(IpAddr::V4(ip)) = destination.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs = (destination, 0)
        .to_socket_addrs()
        .map_err(|e| ConfigError::InvalidValue {
            key: "destination",
            reason: format!("unable to resolve {}: {}", destination, e),
        })?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "destination",
            reason: format!("{} has no IPv4 address", destination),
        })
}

/// Container names must not collide when polls overlap
fn container_name() -> String {
    format!(
        "fast-mda-traceroute-{}-{}",
        Utc::now().timestamp(),
        INVOCATIONS.fetch_add(1, Ordering::SeqCst)
    )
}

/// Arguments handed to `docker` for one probe
pub fn probe_args(name: &str, destination: Ipv4Addr) -> Vec<String> {
    let mut args: Vec<String> = ["run", "--rm", "--name", name, IMAGE]
        .iter()
        .map(|x| String::from(*x))
        .collect();
    args.extend(
        ["--format", "scamper-json", "--max-round", "10", "--wait", "3000"]
            .iter()
            .map(|x| String::from(*x)),
    );
    args.push(destination.to_string());
    args
}

pub struct TracerouteMonitor {
    destination: String,
    destination_ipv4: Ipv4Addr,
    label: String,
    docker_path: String,
    sink: Arc<dyn SampleSink>,
}

impl TracerouteMonitor {
    fn warn(&self, msg: &str) {
        self.sink.log(LogLevel::Warning, msg);
    }

    fn run_traceroute(&self) -> Option<TracerouteResult> {
        let args = probe_args(&container_name(), self.destination_ipv4);
        log::debug!("running {} {}", self.docker_path, args.join(" "));

        let output = match Command::new(&self.docker_path).args(&args).output() {
            Ok(output) => output,
            Err(e) => {
                self.warn(&format!(
                    "Failed to perform traceroute for destination {}: {}",
                    self.destination, e
                ));
                return None;
            }
        };

        if !output.status.success() {
            self.warn(&format!(
                "Failed to perform traceroute for destination {}: {}",
                self.destination,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
            return None;
        }

        match decode::parse_output(&output.stdout) {
            Ok(result) => Some(result),
            Err(e) => {
                self.warn(&format!(
                    "Failed to parse traceroute output for destination {}: {}. Output: {}",
                    self.destination,
                    e,
                    String::from_utf8_lossy(&output.stdout)
                ));
                None
            }
        }
    }
}

impl MonitorManager for TracerouteMonitor {
    fn name() -> &'static str {
        "traceroute_monitor"
    }

    fn metrics() -> &'static [MetricDefinition] {
        METRICS
    }

    fn monitors(
        config: Option<&[ConfigItem<'_>]>,
        ctx: &HostContext,
    ) -> Result<MonitorRegistration, Box<dyn error::Error>> {
        let config: TracerouteConfig =
            monitor_plugin::de::from_config(config.unwrap_or_default())?;
        let destination_ipv4 = resolve_ipv4(&config.destination)?;

        Ok(MonitorRegistration::Single(Box::new(TracerouteMonitor {
            destination: config.destination,
            destination_ipv4,
            label: config.label.unwrap_or_default(),
            docker_path: config.docker_path,
            sink: ctx.sink(),
        })))
    }
}

impl Monitor for TracerouteMonitor {
    fn capabilities(&self) -> MonitorCapabilities {
        MonitorCapabilities::READ
    }

    fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
        let result = match self.run_traceroute() {
            Some(result) => result,
            None => return Ok(()),
        };

        let total_rtt = result.total_rtt();
        SampleBuilder::new("traceroute.hops", Value::Integer(result.hops_count as i64))
            .extra_field("destination", result.destination)
            .extra_field("destination_original", self.destination.as_str())
            .extra_field("label", self.label.as_str())
            .extra_field("hops", result.hops.join(","))
            .extra_field("hop_rtts", result.hop_rtts.iter().join(","))
            .extra_field("total_rtt", total_rtt.to_string())
            .extra_field("method", result.method)
            .submit(self.sink.as_ref())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_args() {
        let args = probe_args("fast-mda-traceroute-1-0", Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(
            args.join(" "),
            "run --rm --name fast-mda-traceroute-1-0 ghcr.io/dioptra-io/fast-mda-traceroute \
             --format scamper-json --max-round 10 --wait 3000 1.1.1.1"
        );
    }

    #[test]
    fn test_container_names_are_unique() {
        assert_ne!(container_name(), container_name());
    }

    #[test]
    fn test_resolve_ipv4() {
        assert_eq!(resolve_ipv4("8.8.4.4").unwrap(), Ipv4Addr::new(8, 8, 4, 4));
        assert!(resolve_ipv4("::1").is_err());
    }
}
