use crate::api::{ConfigItem, MetricDefinition, SampleSink};
use crate::errors::NotImplemented;
use bitflags::bitflags;
use std::error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

bitflags! {
    /// Bitflags of capabilities that a monitor advertises to the host.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MonitorCapabilities: u32 {
        /// The host should call `gather_sample` every sample interval
        const READ =   0b0000_0001;

        /// The monitor pushes samples from its own background task once started
        const STREAM = 0b0000_0010;

        /// The monitor holds resources that `stop` releases
        const STOP =   0b0000_0100;
    }
}

impl MonitorCapabilities {
    pub fn has_read(self) -> bool {
        self.intersects(MonitorCapabilities::READ)
    }

    pub fn has_stream(self) -> bool {
        self.intersects(MonitorCapabilities::STREAM)
    }

    pub fn has_stop(self) -> bool {
        self.intersects(MonitorCapabilities::STOP)
    }
}

/// The host's running flag. Cleared when the agent shuts down; long lived tasks inside a monitor
/// poll it to know when to wind down.
#[derive(Debug, Clone)]
pub struct RunState(Arc<AtomicBool>);

impl RunState {
    pub fn new() -> Self {
        RunState(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::new()
    }
}

/// Everything the host hands a monitor when it is created.
#[derive(Clone)]
pub struct HostContext {
    sink: Arc<dyn SampleSink>,
    run_state: RunState,
}

impl HostContext {
    pub fn new(sink: Arc<dyn SampleSink>) -> Self {
        HostContext {
            sink,
            run_state: RunState::new(),
        }
    }

    pub fn with_run_state(sink: Arc<dyn SampleSink>, run_state: RunState) -> Self {
        HostContext { sink, run_state }
    }

    /// Where samples and log lines go
    pub fn sink(&self) -> Arc<dyn SampleSink> {
        self.sink.clone()
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.clone()
    }
}

/// How many monitors a `MonitorManager` built from its configuration
pub enum MonitorRegistration {
    /// A single monitor, registered under the manager's name
    Single(Box<dyn Monitor>),

    /// Several monitors; each is registered as `<manager name>/<id>`
    Multiple(Vec<(String, Box<dyn Monitor>)>),
}

/// Defines a monitor family: its name, the metrics it documents and how to build monitors out of
/// the host's configuration.
pub trait MonitorManager {
    /// Name of the monitor module, e.g. `octoprint_monitor`. Used as the `monitor` log field.
    fn name() -> &'static str;

    /// Metrics the monitors may emit. Purely descriptive.
    fn metrics() -> &'static [MetricDefinition] {
        &[]
    }

    /// Returns the monitors to register. An error here means the monitor is misconfigured and
    /// the host must not start it.
    fn monitors(
        config: Option<&[ConfigItem<'_>]>,
        ctx: &HostContext,
    ) -> Result<MonitorRegistration, Box<dyn error::Error>>;
}

/// A single polling unit.
pub trait Monitor: Send {
    /// A monitor's capabilities. By default a monitor does nothing, but can advertise that it can
    /// report values and / or needs stopping.
    fn capabilities(&self) -> MonitorCapabilities {
        MonitorCapabilities::default()
    }

    /// Called by the host every sample interval. Transport and parse failures are reported as
    /// warnings through the sink and are not errors: returning `Err` is reserved for failures of
    /// the monitor itself (e.g. the host refusing a sample).
    fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
        Err(NotImplemented)?
    }

    /// Called once when the host shuts the monitor down.
    fn stop(&mut self) -> Result<(), Box<dyn error::Error>> {
        Err(NotImplemented)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_capabilities() {
        let capabilities = MonitorCapabilities::READ | MonitorCapabilities::STOP;
        assert_eq!(capabilities.has_read(), true);
        assert_eq!(capabilities.has_stop(), true);
        assert_eq!(capabilities.has_stream(), false);

        let capabilities = MonitorCapabilities::READ;
        assert_eq!(capabilities.has_read(), true);
        assert_eq!(capabilities.has_stop(), false);
    }

    #[test]
    fn test_run_state_shared() {
        let state = RunState::new();
        let other = state.clone();
        assert!(other.is_running());
        state.stop();
        assert!(!other.is_running());
    }

    struct Idle;
    impl Monitor for Idle {}

    #[test]
    fn test_default_monitor_not_implemented() {
        let mut idle = Idle;
        assert!(idle.capabilities().is_empty());
        let err = idle.gather_sample().unwrap_err();
        assert_eq!(err.to_string(), "function is not implemented");
    }
}
