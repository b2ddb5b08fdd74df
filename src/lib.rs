//! Monitors are small polling units that a host logging agent loads, configures and drives on a
//! fixed interval. This crate is the contract between the two: the host hands a monitor its
//! configuration and a [`SampleSink`], and the monitor reports [`Sample`]s and warnings back into
//! that sink.
//!
//! A monitor crate implements [`MonitorManager`] (how to build monitors from configuration) and
//! [`Monitor`] (what to do every interval).
//!
//! ```
//! use monitor_plugin::{
//!     ConfigItem, HostContext, MemorySink, Monitor, MonitorCapabilities, MonitorManager,
//!     MonitorRegistration, SampleBuilder, SampleSink, Value,
//! };
//! use serde::Deserialize;
//! use std::error;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct GreetingConfig {
//!     #[serde(default = "default_greeting")]
//!     greeting: String,
//! }
//!
//! fn default_greeting() -> String {
//!     String::from("hello")
//! }
//!
//! struct GreetingMonitor {
//!     greeting: String,
//!     sink: Arc<dyn SampleSink>,
//! }
//!
//! impl MonitorManager for GreetingMonitor {
//!     fn name() -> &'static str {
//!         "greeting_monitor"
//!     }
//!
//!     fn monitors(
//!         config: Option<&[ConfigItem<'_>]>,
//!         ctx: &HostContext,
//!     ) -> Result<MonitorRegistration, Box<dyn error::Error>> {
//!         let config: GreetingConfig =
//!             monitor_plugin::de::from_config(config.unwrap_or_default())?;
//!         Ok(MonitorRegistration::Single(Box::new(GreetingMonitor {
//!             greeting: config.greeting,
//!             sink: ctx.sink(),
//!         })))
//!     }
//! }
//!
//! impl Monitor for GreetingMonitor {
//!     fn capabilities(&self) -> MonitorCapabilities {
//!         MonitorCapabilities::READ
//!     }
//!
//!     fn gather_sample(&mut self) -> Result<(), Box<dyn error::Error>> {
//!         SampleBuilder::new("greeting", Value::from(self.greeting.as_str()))
//!             .submit(self.sink.as_ref())?;
//!         Ok(())
//!     }
//! }
//!
//! let sink = Arc::new(MemorySink::new());
//! let ctx = HostContext::new(sink.clone());
//! let mut monitors = monitor_plugin::internal::register_monitors::<GreetingMonitor>(None, &ctx)
//!     .unwrap();
//! monitor_plugin::internal::monitor_gather(&mut monitors[0], &ctx).unwrap();
//! assert_eq!(sink.samples()[0].value, Value::Text(String::from("hello")));
//! ```
mod api;
pub mod de;
mod errors;
pub mod internal;
mod plugins;
mod ser;

pub use crate::api::{
    empty_to_none, ConfigItem, ConfigValue, HostLogger, HostLoggerBuilder, LogLevel, MemorySink,
    MetricDefinition, Sample, SampleBuilder, SampleSink, Value,
};
pub use crate::errors::{ConfigError, HostError, NotImplemented, SubmitError};
pub use crate::plugins::{
    HostContext, Monitor, MonitorCapabilities, MonitorManager, MonitorRegistration, RunState,
};
