//! Entry points a host uses to drive monitors. Every call is guarded so a misbehaving monitor
//! (error or panic) is logged to the host instead of taking the agent down with it.
use crate::api::{ConfigItem, LogLevel, SampleSink};
use crate::errors::HostError;
use crate::plugins::{HostContext, Monitor, MonitorManager, MonitorRegistration};
use std::error::Error;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A monitor ready to be scheduled, along with the name it was registered under.
pub struct RegisteredMonitor {
    pub name: String,
    pub monitor: Box<dyn Monitor>,
}

fn log_err(sink: &dyn SampleSink, prefix: &str, err: &HostError) {
    let mut msg = format!("{} error: {}", prefix, err);
    let mut source = err.source();
    while let Some(e) = source {
        msg.push_str(&format!("; caused by: {}", e));
        source = e.source();
    }

    sink.log(LogLevel::Error, &msg);
}

/// Builds the manager's monitors from configuration. A configuration the manager rejects is
/// logged and returned so the host refuses to start the monitor.
pub fn register_monitors<T: MonitorManager>(
    config: Option<&[ConfigItem<'_>]>,
    ctx: &HostContext,
) -> Result<Vec<RegisteredMonitor>, HostError> {
    let res = catch_unwind(AssertUnwindSafe(|| T::monitors(config, ctx)))
        .map_err(|_| HostError::Panic)
        .and_then(|reged| reged.map_err(HostError::Config))
        .map(|registration| match registration {
            MonitorRegistration::Single(monitor) => vec![RegisteredMonitor {
                name: T::name().to_owned(),
                monitor,
            }],
            MonitorRegistration::Multiple(v) => v
                .into_iter()
                .map(|(id, monitor)| RegisteredMonitor {
                    name: format!("{}/{}", T::name(), id),
                    monitor,
                })
                .collect(),
        });

    if let Err(ref e) = res {
        log_err(ctx.sink().as_ref(), T::name(), e);
    }

    res
}

/// Runs one sampling cycle of a monitor that advertised `READ`.
pub fn monitor_gather(registered: &mut RegisteredMonitor, ctx: &HostContext) -> Result<(), HostError> {
    if !registered.monitor.capabilities().has_read() {
        return Ok(());
    }

    let monitor = &mut registered.monitor;
    let res = catch_unwind(AssertUnwindSafe(|| monitor.gather_sample()))
        .map_err(|_| HostError::Panic)
        .and_then(|x| x.map_err(HostError::Monitor));

    if let Err(ref e) = res {
        log_err(ctx.sink().as_ref(), &format!("{} read", registered.name), e);
    }

    res
}

/// Stops a monitor that advertised `STOP`.
pub fn monitor_stop(registered: &mut RegisteredMonitor, ctx: &HostContext) -> Result<(), HostError> {
    if !registered.monitor.capabilities().has_stop() {
        return Ok(());
    }

    let monitor = &mut registered.monitor;
    let res = catch_unwind(AssertUnwindSafe(|| monitor.stop()))
        .map_err(|_| HostError::Panic)
        .and_then(|x| x.map_err(HostError::Monitor));

    if let Err(ref e) = res {
        log_err(ctx.sink().as_ref(), &format!("{} stop", registered.name), e);
    }

    res
}

/// Routes panic messages into the host's log. The default hook writes to stderr, which the host
/// may not capture.
pub fn register_panic_handler(sink: Arc<dyn SampleSink>) {
    panic::set_hook(Box::new(move |info| {
        log_err(sink.as_ref(), "panic hook", &HostError::from_panic_info(info));
    }));
}
