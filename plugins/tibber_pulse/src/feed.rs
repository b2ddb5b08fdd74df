//! The live measurement feed: a websocket reader speaking the `graphql-transport-ws` protocol
//! and a writer that turns measurements into rate limited samples.
use crate::api::{FeedTarget, USER_AGENT};
use futures_util::{SinkExt, StreamExt};
use monitor_plugin::{RunState, SampleBuilder, SampleSink, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};

pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Measurements buffered between the reader and the writer
const CHANNEL_CAPACITY: usize = 16;

const SUBSCRIPTION_ID: &str = "1";

const LIVE_MEASUREMENT_QUERY: &str = "subscription($homeId: ID!) { \
    liveMeasurement(homeId: $homeId) { timestamp power voltagePhase1 } }";

#[derive(Debug)]
pub enum FeedError {
    Websocket(tungstenite::Error),
    Decode(serde_json::Error),

    /// The server broke the protocol, e.g. no `connection_ack` after `connection_init`
    Protocol(String),

    /// The server reported errors for the subscription
    Subscription(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FeedError::Websocket(ref e) => write!(f, "websocket error: {}", e),
            FeedError::Decode(ref e) => write!(f, "unable to decode feed message: {}", e),
            FeedError::Protocol(ref msg) => write!(f, "unexpected feed message: {}", msg),
            FeedError::Subscription(ref msg) => write!(f, "subscription failed: {}", msg),
        }
    }
}

impl error::Error for FeedError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            FeedError::Websocket(ref e) => Some(e),
            FeedError::Decode(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for FeedError {
    fn from(e: tungstenite::Error) -> Self {
        FeedError::Websocket(e)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveMeasurement {
    /// Consumption at the moment, in watts
    pub power: f64,
    pub voltage_phase1: Option<f64>,
    pub timestamp: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage<'a> {
    ConnectionInit {
        payload: serde_json::Value,
    },
    Subscribe {
        id: &'a str,
        payload: serde_json::Value,
    },
    Pong,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    Next { payload: NextPayload },
    Error { payload: serde_json::Value },
    Complete,
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct NextPayload {
    data: Option<LiveData>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct LiveData {
    live_measurement: Option<LiveMeasurement>,
}

pub fn decode_message(text: &str) -> Result<ServerMessage, FeedError> {
    serde_json::from_str(text).map_err(FeedError::Decode)
}

impl NextPayload {
    /// The measurement carried by a `next` message. GraphQL errors in the payload fail the
    /// subscription.
    pub fn into_measurement(self) -> Result<Option<LiveMeasurement>, FeedError> {
        if !self.errors.is_empty() {
            let errors = serde_json::Value::from(self.errors);
            return Err(FeedError::Subscription(errors.to_string()));
        }

        Ok(self.data.and_then(|d| d.live_measurement))
    }
}

/// Source of unix timestamps (seconds)
pub trait Clock: Send {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Lets a sample through only when more than `interval` seconds passed since the last one.
/// The first sample always goes through.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: i64,
    last_written: i64,
}

impl RateLimiter {
    pub fn new(interval: u64) -> Self {
        RateLimiter {
            interval: i64::try_from(interval).unwrap_or(i64::MAX),
            last_written: 0,
        }
    }

    pub fn should_write(&mut self, now: i64) -> bool {
        if self.last_written.saturating_add(self.interval) < now {
            self.last_written = now;
            true
        } else {
            false
        }
    }
}

/// When the feed has to wind down: the monitor was stopped or the host is shutting down
#[derive(Debug, Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    run_state: RunState,
}

impl StopSignal {
    pub fn new(stopped: Arc<AtomicBool>, run_state: RunState) -> Self {
        StopSignal { stopped, run_state }
    }

    pub fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || !self.run_state.is_running()
    }
}

/// Turns measurements into `tibber.consumption` samples of a home
pub struct SampleWriter {
    home_id: String,
    sink: Arc<dyn SampleSink>,
}

impl SampleWriter {
    pub fn new(home_id: &str, sink: Arc<dyn SampleSink>) -> Self {
        SampleWriter {
            home_id: home_id.to_owned(),
            sink,
        }
    }

    fn write(&self, measurement: &LiveMeasurement) {
        let mut builder = SampleBuilder::new("tibber.consumption", Value::Gauge(measurement.power))
            .extra_field("home", self.home_id.as_str());
        if let Some(voltage) = measurement.voltage_phase1 {
            builder = builder.extra_field("voltage_phase", voltage.to_string());
        }

        if let Err(e) = builder.submit(self.sink.as_ref()) {
            log::warn!("unable to submit consumption sample: {}", e);
        }
    }
}

/// Drains measurements until the channel closes or `stop` fires. The stop condition is checked
/// for every delivered measurement.
pub async fn write_samples<C: Clock>(
    mut rx: mpsc::Receiver<LiveMeasurement>,
    writer: SampleWriter,
    stop: StopSignal,
    clock: C,
    interval: u64,
) {
    let mut limiter = RateLimiter::new(interval);
    while let Some(measurement) = rx.recv().await {
        if stop.should_stop() {
            log::info!("stopping live feed");
            break;
        }

        if limiter.should_write(clock.now()) {
            writer.write(&measurement);
        }
    }
}

async fn send(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    msg: &ClientMessage<'_>,
) -> Result<(), FeedError> {
    let text = serde_json::to_string(msg).map_err(FeedError::Decode)?;
    ws.send(Message::Text(text)).await?;
    Ok(())
}

/// Subscribes to the home's live measurements and forwards them into `tx`. Returns once the
/// server ends the subscription or the writer hangs up.
pub async fn read_feed(
    target: &FeedTarget,
    access_token: &str,
    tx: mpsc::Sender<LiveMeasurement>,
) -> Result<(), FeedError> {
    let mut request = target.websocket_url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
    headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

    let (mut ws, _) = tokio_tungstenite::connect_async(request).await?;
    log::debug!("connected to {}", target.websocket_url);

    let init = ClientMessage::ConnectionInit {
        payload: json!({ "token": access_token }),
    };
    send(&mut ws, &init).await?;

    let subscribe = ClientMessage::Subscribe {
        id: SUBSCRIPTION_ID,
        payload: json!({
            "query": LIVE_MEASUREMENT_QUERY,
            "variables": { "homeId": target.home_id },
        }),
    };

    let mut acked = false;
    while let Some(msg) = ws.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                log::debug!("feed closed by server: {:?}", frame);
                return Ok(());
            }
            _ => continue,
        };

        match decode_message(&text)? {
            ServerMessage::ConnectionAck => {
                acked = true;
                send(&mut ws, &subscribe).await?;
            }
            ServerMessage::Next { payload } if acked => {
                if let Some(measurement) = payload.into_measurement()? {
                    if tx.send(measurement).await.is_err() {
                        // writer is gone
                        return Ok(());
                    }
                }
            }
            ServerMessage::Ping => send(&mut ws, &ClientMessage::Pong).await?,
            ServerMessage::Error { payload } => {
                return Err(FeedError::Subscription(payload.to_string()))
            }
            ServerMessage::Complete => return Ok(()),
            ServerMessage::Pong | ServerMessage::Unknown => {}
            ServerMessage::Next { .. } => {
                return Err(FeedError::Protocol(String::from(
                    "measurement received before connection_ack",
                )))
            }
        }
    }

    Ok(())
}

/// Runs the reader and the writer until both finish. The writer drains what the reader
/// delivered before the subscription ended; a stopped writer ends the reader on its next
/// measurement.
pub async fn run<C: Clock>(
    target: FeedTarget,
    access_token: String,
    sink: Arc<dyn SampleSink>,
    stop: StopSignal,
    clock: C,
    interval: u64,
) -> Result<(), FeedError> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = SampleWriter::new(&target.home_id, sink);

    let (res, ()) = tokio::join!(
        read_feed(&target, &access_token, tx),
        write_samples(rx, writer, stop, clock, interval),
    );
    res
}
