//! Raspberry Pi firmware metrics: SoC temperature, clock frequencies, voltages and the throttle
//! state, as reported by `vcgencmd`.
//!
//! The firmware scales the ARM clock with demand, so short bursts of work only show up in the
//! clock metrics when the sample interval is short enough to catch them.
pub mod command;
pub mod decode;

use crate::decode::Decoder;
use monitor_plugin::{
    ConfigError, ConfigItem, HostContext, LogLevel, MetricDefinition, Monitor,
    MonitorCapabilities, MonitorManager, MonitorRegistration, SampleBuilder, SampleSink,
};
use serde::Deserialize;
use std::error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single `vcgencmd` invocation
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// A firmware query and the metric its answer is reported under
#[derive(Debug, Clone, Copy)]
pub struct FirmwareCommand {
    pub metric: &'static str,
    pub args: &'static [&'static str],
    pub decoder: Decoder,
}

const fn cmd(metric: &'static str, args: &'static [&'static str], decoder: Decoder) -> FirmwareCommand {
    FirmwareCommand {
        metric,
        args,
        decoder,
    }
}

/// Queried in this order every sample
pub const COMMANDS: &[FirmwareCommand] = &[
    cmd("rpi.status.throttled_state", &["get_throttled"], Decoder::Throttled),
    cmd("rpi.soc.temperature", &["measure_temp"], Decoder::Temperature),
    cmd("rpi.arm.clock", &["measure_clock", "arm"], Decoder::Clock),
    cmd("rpi.core.clock", &["measure_clock", "core"], Decoder::Clock),
    cmd("rpi.h264.clock", &["measure_clock", "H264"], Decoder::Clock),
    cmd("rpi.sd.clock", &["measure_clock", "emmc"], Decoder::Clock),
    cmd("rpi.vec.clock", &["measure_clock", "vec"], Decoder::Clock),
    cmd("rpi.core.volts", &["measure_volts", "core"], Decoder::Volts),
    cmd("rpi.sdram_c.volts", &["measure_volts", "sdram_c"], Decoder::Volts),
    cmd("rpi.sdram_i.volts", &["measure_volts", "sdram_i"], Decoder::Volts),
    cmd("rpi.sdram_p.volts", &["measure_volts", "sdram_p"], Decoder::Volts),
];

const METRICS: &[MetricDefinition] = &[
    MetricDefinition::new(
        "rpi.status.throttled_state",
        "Bit value for the throttle state metric.",
    ),
    MetricDefinition::new("rpi.soc.temperature", "SoC temperature in Celsius"),
    MetricDefinition::new("rpi.arm.clock", "Clock for the ARM cores in MHz"),
    MetricDefinition::new("rpi.core.clock", "Clock for the VC4 scaler cores in MHz"),
    MetricDefinition::new("rpi.h264.clock", "Clock for the h264 block in MHz"),
    MetricDefinition::new("rpi.sd.clock", "Clock for the SD card interface in MHz"),
    MetricDefinition::new("rpi.vec.clock", "Clock for the analogue video encoder in MHz"),
    MetricDefinition::new("rpi.core.volts", "Voltage for VC4 core in Volts"),
    MetricDefinition::new("rpi.sdram_c.volts", "Voltage for SDRAM core in Volts"),
    MetricDefinition::new("rpi.sdram_i.volts", "Voltage for SDRAM I/O in Volts"),
    MetricDefinition::new("rpi.sdram_p.volts", "Voltage for SDRAM Phy in Volts"),
];

#[derive(Deserialize, Debug)]
struct RaspberryPiConfig {
    #[serde(default = "default_vcgencmd_path")]
    vcgencmd_path: PathBuf,
}

fn default_vcgencmd_path() -> PathBuf {
    PathBuf::from("/opt/vc/bin/vcgencmd")
}

pub struct RaspberryPiMonitor {
    vcgencmd_path: PathBuf,
    timeout: Duration,
    sink: Arc<dyn SampleSink>,
}

impl RaspberryPiMonitor {
    /// Runs a single firmware query. Failures are logged as warnings so the remaining metrics
    /// of the cycle are still gathered.
    fn gather_one(&self, command: &FirmwareCommand) -> Result<(), Box<dyn error::Error>> {
        let output =
            match command::run_with_timeout(&self.vcgencmd_path, command.args, self.timeout) {
                Ok(output) => output,
                Err(e) => {
                    self.sink.log(
                        LogLevel::Warning,
                        &format!("Failed to retrieve value for metric {}: {}", command.metric, e),
                    );
                    return Ok(());
                }
            };

        match command.decoder.decode(&output) {
            Ok(reading) => {
                SampleBuilder::new(command.metric, reading.into()).submit(self.sink.as_ref())?;
            }
            Err(e) => self.sink.log(
                LogLevel::Warning,
                &format!("Failed to parse value for metric {}: {}", command.metric, e),
            ),
        }

        Ok(())
    }
}

impl MonitorManager for RaspberryPiMonitor {
    fn name() -> &'static str {
        "raspberry_pi_monitor"
    }

    fn metrics() -> &'static [MetricDefinition] {
        METRICS
    }

    fn monitors(
        config: Option<&[ConfigItem<'_>]>,
        ctx: &HostContext,
    ) -> Result<MonitorRegistration, Box<dyn error::Error>> {
        let config: RaspberryPiConfig =
            monitor_plugin::de::from_config(config.unwrap_or_default())?;

        if !config.vcgencmd_path.is_file() {
            Err(ConfigError::InvalidValue {
                key: "vcgencmd_path",
                reason: format!("binary path {} doesn't exist", config.vcgencmd_path.display()),
            })?;
        }

        log::debug!("using vcgencmd at {}", config.vcgencmd_path.display());
        Ok(MonitorRegistration::Single(Box::new(RaspberryPiMonitor {
            vcgencmd_path: config.vcgencmd_path,
            timeout: COMMAND_TIMEOUT,
            sink: ctx.sink(),
        })))
    }
}

impl Monitor for RaspberryPiMonitor {
    fn capabilities(&self) -> MonitorCapabilities {
        MonitorCapabilities::READ
    }

    fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
        for command in COMMANDS {
            self.gather_one(command)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_table_matches_metrics() {
        let commands: Vec<&str> = COMMANDS.iter().map(|c| c.metric).collect();
        let metrics: Vec<&str> = METRICS.iter().map(|m| m.name).collect();
        assert_eq!(commands, metrics);
    }

    #[test]
    fn test_missing_binary_is_config_error() {
        let sink = Arc::new(monitor_plugin::MemorySink::new());
        let ctx = HostContext::new(sink);
        let raw = serde_json::json!({ "vcgencmd_path": "/does/not/exist/vcgencmd" });
        let items = ConfigItem::from_json(&raw).unwrap();
        let err = RaspberryPiMonitor::monitors(Some(&items), &ctx)
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("/does/not/exist/vcgencmd"));
    }
}
