//! Real time electricity consumption (in watts) from a Tibber Pulse.
//!
//! Tibber streams a measurement every couple of seconds over a websocket. The feed runs on a
//! background thread for as long as the monitor lives, and only every `sample_write_interval`
//! seconds is a measurement written as a sample.
pub mod api;
pub mod feed;

use crate::api::{TibberApi, DEFAULT_API_URL};
use crate::feed::{StopSignal, SystemClock};
use monitor_plugin::{
    ConfigItem, HostContext, HostLoggerBuilder, LogLevel, MetricDefinition, Monitor,
    MonitorCapabilities, MonitorManager, MonitorRegistration, RunState, SampleSink,
};
use serde::Deserialize;
use std::error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const METRICS: &[MetricDefinition] = &[MetricDefinition::new(
    "tibber.consumption",
    "Current electricity consumption in watts",
)
.with_extra_fields(&["home", "voltage_phase"])];

/// Crates that log every frame and handshake at debug level
const NOISY_MODULES: &[&str] = &["tungstenite", "tokio_tungstenite", "rustls", "ureq"];

#[derive(Deserialize, Debug)]
struct TibberConfig {
    access_token: String,
    #[serde(default = "default_sample_write_interval")]
    sample_write_interval: u64,
    home_id: Option<String>,
    #[serde(default = "default_api_url")]
    api_url: String,
    log_level: Option<LogLevel>,
}

fn default_sample_write_interval() -> u64 {
    30
}

fn default_api_url() -> String {
    String::from(DEFAULT_API_URL)
}

pub struct TibberPulseMonitor {
    api: TibberApi,
    access_token: String,
    home_id: Option<String>,
    sample_write_interval: u64,
    sink: Arc<dyn SampleSink>,
    run_state: RunState,
    stopped: Arc<AtomicBool>,
    feed: Option<JoinHandle<()>>,
}

impl TibberPulseMonitor {
    fn feed_running(&self) -> bool {
        self.feed.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    fn start_feed(&mut self) -> Result<(), Box<dyn error::Error>> {
        let target = match self.api.feed_target(self.home_id.as_deref()) {
            Ok(target) => target,
            Err(e) => {
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Failed to look up Tibber live feed: {}", e),
                );
                return Ok(());
            }
        };

        log::info!("following live feed of home {}", target.home_id);
        let access_token = self.access_token.clone();
        let sink = self.sink.clone();
        let stop = StopSignal::new(self.stopped.clone(), self.run_state.clone());
        let interval = self.sample_write_interval;

        let handle = thread::Builder::new()
            .name(String::from("tibber-live-feed"))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        sink.log(
                            LogLevel::Warning,
                            &format!("Failed to start Tibber live feed runtime: {}", e),
                        );
                        return;
                    }
                };

                let res = rt.block_on(feed::run(
                    target,
                    access_token,
                    sink.clone(),
                    stop,
                    SystemClock,
                    interval,
                ));

                if let Err(e) = res {
                    sink.log(LogLevel::Warning, &format!("Tibber live feed failed: {}", e));
                }
            })?;

        self.feed = Some(handle);
        Ok(())
    }
}

impl MonitorManager for TibberPulseMonitor {
    fn name() -> &'static str {
        "tibber_pulse_monitor"
    }

    fn metrics() -> &'static [MetricDefinition] {
        METRICS
    }

    fn monitors(
        config: Option<&[ConfigItem<'_>]>,
        ctx: &HostContext,
    ) -> Result<MonitorRegistration, Box<dyn error::Error>> {
        let config: TibberConfig = monitor_plugin::de::from_config(config.unwrap_or_default())?;

        let mut logger = HostLoggerBuilder::new(ctx.sink());
        logger
            .prefix_monitor::<Self>()
            .filter_level(config.log_level.unwrap_or(LogLevel::Info).into());
        for module in NOISY_MODULES {
            logger.quiet_module(module);
        }

        if logger.try_init().is_err() {
            log::debug!("a logger is already installed");
        }

        Ok(MonitorRegistration::Single(Box::new(TibberPulseMonitor {
            api: TibberApi::new(&config.api_url, &config.access_token),
            access_token: config.access_token,
            home_id: config.home_id,
            sample_write_interval: config.sample_write_interval,
            sink: ctx.sink(),
            run_state: ctx.run_state(),
            stopped: Arc::new(AtomicBool::new(false)),
            feed: None,
        })))
    }
}

impl Monitor for TibberPulseMonitor {
    fn capabilities(&self) -> MonitorCapabilities {
        MonitorCapabilities::READ | MonitorCapabilities::STREAM | MonitorCapabilities::STOP
    }

    /// Samples are written by the feed thread. This only (re)starts the feed when it isn't
    /// running.
    fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
        if self.stopped.load(Ordering::SeqCst) || !self.run_state.is_running() {
            return Ok(());
        }

        if self.feed_running() {
            return Ok(());
        }

        if self.feed.take().is_some() {
            log::info!("live feed ended, restarting");
        }

        self.start_feed()
    }

    fn stop(&mut self) -> Result<(), Box<dyn error::Error>> {
        self.stopped.store(true, Ordering::SeqCst);

        // the writer notices the flag on its next measurement, no need to wait for it here
        self.feed.take();
        Ok(())
    }
}
