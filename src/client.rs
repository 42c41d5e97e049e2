use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::IntesisBoxConfig;
use crate::connection::{self, Connection, LineReader};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    Command, DEFAULT_PORT, Frame, decode, encode_get, encode_keepalive, encode_limits_query,
    encode_set,
};
use crate::registry::{AttributeRegistry, SetpointRange};
use crate::types::*;
use crate::{Error, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

pub struct IntesisBoxClientBuilder {
    host: String,
    port: u16,
    poll_interval: Duration,
    connect_timeout: Duration,
    event_callbacks: Vec<EventCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl IntesisBoxClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Period of the keepalive/reconnect tick.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> IntesisBoxClient {
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => match MessageLogger::new(mode, &path) {
                Ok(logger) => Some(Mutex::new(logger)),
                Err(e) => {
                    warn!(path = %path, "message log disabled, cannot open file: {e}");
                    None
                }
            },
            _ => None,
        };

        IntesisBoxClient {
            shared: Arc::new(Shared {
                host: self.host,
                port: self.port,
                poll_interval: self.poll_interval,
                connect_timeout: self.connect_timeout,
                link: tokio::sync::Mutex::new(LinkSlot::default()),
                tick_lock: tokio::sync::Mutex::new(()),
                session: Mutex::new(Session::default()),
                poller: Mutex::new(None),
                event_callbacks: self.event_callbacks,
                logger,
            }),
        }
    }
}

/// Client for one IntesisBox gateway, addressing AC unit 1.
///
/// Cheap to clone; clones share the same connection and state.
#[derive(Clone)]
pub struct IntesisBoxClient {
    shared: Arc<Shared>,
}

struct Shared {
    host: String,
    port: u16,
    poll_interval: Duration,
    connect_timeout: Duration,
    link: tokio::sync::Mutex<LinkSlot>,
    tick_lock: tokio::sync::Mutex<()>,
    session: Mutex<Session>,
    poller: Mutex<Option<Poller>>,
    event_callbacks: Vec<EventCallback>,
    logger: Option<Mutex<MessageLogger>>,
}

/// The write half only exists while connected.
#[derive(Default)]
enum Link {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        connection: Connection,
        generation: u64,
    },
}

#[derive(Default)]
struct LinkSlot {
    link: Link,
    /// `None` until the first connect attempt resolves, so the first state is
    /// always reported.
    online: Option<bool>,
    generation: u64,
}

impl LinkSlot {
    fn state(&self) -> ConnectionState {
        match self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting => ConnectionState::Connecting,
            Link::Connected { .. } => ConnectionState::Connected,
        }
    }
}

#[derive(Default)]
struct Session {
    registry: AttributeRegistry,
    values: BTreeMap<Function, AttributeValue>,
}

struct Poller {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl IntesisBoxClient {
    pub fn builder(host: impl Into<String>) -> IntesisBoxClientBuilder {
        IntesisBoxClientBuilder::new(host)
    }

    /// Builder pre-filled from a validated configuration.
    pub fn from_config(config: &IntesisBoxConfig) -> Result<IntesisBoxClientBuilder> {
        let host = config.validate()?;
        Ok(IntesisBoxClientBuilder::new(host)
            .port(config.port)
            .poll_interval(config.poll_interval())
            .connect_timeout(config.connect_timeout()))
    }

    pub fn host(&self) -> &str {
        &self.shared.host
    }

    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Spawn the periodic tick: runs immediately, then once per poll interval.
    /// Must be called from within a tokio runtime. No-op if already started.
    pub fn start(&self) {
        let mut poller = self.shared.poller.lock();
        if poller.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(shared.poll_interval.max(Duration::from_millis(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = shared.tick() => {}
                }
            }
            debug!("poll task stopped");
        });

        info!(host = %self.shared.host, port = self.shared.port, "IntesisBox client started");
        *poller = Some(Poller { cancel, task });
    }

    /// Stop the periodic tick, close the connection and go offline.
    pub async fn shutdown(&self) {
        let poller = self.shared.poller.lock().take();
        if let Some(poller) = poller {
            poller.cancel.cancel();
            if let Err(e) = poller.task.await {
                warn!("poll task ended abnormally: {e}");
            }
        }

        let _tick = self.shared.tick_lock.lock().await;
        let mut slot = self.shared.link.lock().await;
        self.shared.disconnect_locked(&mut slot);
        info!("IntesisBox client shut down");
    }

    /// Connect if needed, then send a keepalive query.
    pub async fn tick(&self) {
        self.shared.tick().await;
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.link.lock().await.state()
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Send a SET for `function`. Commands that cannot be sent are dropped and
    /// reported through [`Dispatch::Dropped`]; only a failed write is an error.
    pub async fn set_attribute(&self, function: Function, value: AttributeValue) -> Result<Dispatch> {
        if !self.is_connected().await {
            debug!(%function, %value, "not connected, dropping command");
            return Ok(Dispatch::Dropped(DropReason::Offline));
        }

        let wire_value = {
            let session = self.shared.session.lock();
            command_value(&session.registry, function, &value)
        };
        match wire_value {
            Ok(wire_value) => self.shared.send(encode_set(function, &wire_value)).await,
            Err(reason) => {
                warn!(%function, %value, ?reason, "could not send command");
                Ok(Dispatch::Dropped(reason))
            }
        }
    }

    /// Ask the gateway for the current value; the answer arrives as a CHN line.
    pub async fn refresh_attribute(&self, function: Function) -> Result<Dispatch> {
        self.shared.send(encode_get(function)).await
    }

    /// Feed one raw line as if it had been received from the gateway.
    pub fn on_line_received(&self, line: &str) {
        self.shared.dispatch_line(line, None);
    }

    /// Last value reported by the gateway.
    pub fn attribute(&self, function: Function) -> Option<AttributeValue> {
        self.shared.session.lock().values.get(&function).cloned()
    }

    pub fn attributes(&self) -> BTreeMap<Function, AttributeValue> {
        self.shared.session.lock().values.clone()
    }

    /// Values the gateway accepts for an enumerated function, sorted.
    pub fn allowed_values(&self, function: Function) -> Option<Vec<String>> {
        self.shared.session.lock().registry.allowed_values(function)
    }

    pub fn setpoint_range(&self) -> Option<SetpointRange> {
        self.shared.session.lock().registry.setpoint_range()
    }
}

impl Shared {
    async fn tick(self: &Arc<Self>) {
        let _tick = self.tick_lock.lock().await;

        let connected = self.link.lock().await.state() == ConnectionState::Connected;
        if !connected {
            self.connect().await;
        }

        match self.send(encode_keepalive()).await {
            Ok(Dispatch::Sent(_)) => debug!("keepalive sent"),
            Ok(Dispatch::Dropped(_)) => debug!("keepalive skipped, not connected"),
            Err(e) => debug!("keepalive failed: {e}"),
        }
    }

    async fn connect(self: &Arc<Self>) {
        {
            let mut slot = self.link.lock().await;
            if let Link::Connected { .. } = slot.link {
                return;
            }
            slot.link = Link::Connecting;
        }

        // Limits are only valid for the session that reported them.
        self.session.lock().registry.clear();

        let result = connection::open(&self.host, self.port, self.connect_timeout).await;

        let mut slot = self.link.lock().await;
        match result {
            Ok((connection, reader)) => {
                self.log_sent(&encode_limits_query());
                slot.generation += 1;
                let generation = slot.generation;
                slot.link = Link::Connected {
                    connection,
                    generation,
                };
                info!(host = %self.host, port = self.port, generation, "connected to IntesisBox");
                self.set_online(&mut slot, true);
                tokio::spawn(Arc::clone(self).receive_loop(reader, generation));
            }
            Err(e) => {
                warn!(host = %self.host, port = self.port, "connect failed: {e}");
                slot.link = Link::Disconnected;
                self.set_online(&mut slot, false);
            }
        }
    }

    async fn receive_loop(self: Arc<Self>, mut reader: LineReader, generation: u64) {
        let cancel = reader.cancel_token().clone();
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(generation, "receive loop cancelled");
                    return;
                }
                result = reader.read_line() => result,
            };

            match result {
                Ok(Some(line)) => self.dispatch_line(&line, Some(&cancel)),
                Ok(None) => {
                    warn!(generation, "connection closed by gateway");
                    break;
                }
                Err(e) => {
                    warn!(generation, "read failed: {e}");
                    break;
                }
            }
        }
        self.mark_disconnected(generation).await;
    }

    /// Only the receive task of the current generation may take the link down.
    async fn mark_disconnected(&self, generation: u64) {
        let mut slot = self.link.lock().await;
        let current = match &slot.link {
            Link::Connected { generation, .. } => Some(*generation),
            _ => None,
        };
        if current == Some(generation) {
            self.disconnect_locked(&mut slot);
        } else {
            debug!(generation, "stale receive loop exited");
        }
    }

    fn disconnect_locked(&self, slot: &mut LinkSlot) {
        if let Link::Connected { mut connection, .. } = std::mem::take(&mut slot.link) {
            connection.close();
        }
        self.set_online(slot, false);
    }

    async fn send(&self, line: String) -> Result<Dispatch> {
        let mut slot = self.link.lock().await;
        let Link::Connected { connection, .. } = &mut slot.link else {
            debug!(line = %line, "not connected, dropping line");
            return Ok(Dispatch::Dropped(DropReason::Offline));
        };

        match connection.send_line(&line).await {
            Ok(()) => {
                debug!(line = %line, "sent");
                self.log_sent(&line);
                Ok(Dispatch::Sent(line))
            }
            Err(e) => {
                warn!(line = %line, "write failed: {e}");
                self.disconnect_locked(&mut slot);
                Err(e)
            }
        }
    }

    /// Handle one inbound line. Failures only ever discard that line.
    fn dispatch_line(&self, line: &str, cancel: Option<&CancellationToken>) {
        match self.process_line(line, cancel) {
            Ok(Some(event)) => {
                // A superseded connection must not publish late updates.
                if superseded(cancel) {
                    return;
                }
                if let Event::AttributeChanged { function, value } = &event {
                    self.session.lock().values.insert(*function, value.clone());
                }
                self.emit(&event);
            }
            Ok(None) => {}
            Err(e) => warn!(line = %line, "discarding line: {e}"),
        }
    }

    fn process_line(
        &self,
        line: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Event>> {
        let frame = decode(line);
        self.log_received(line, frame.as_ref().ok());

        let message = match frame? {
            Frame::Ack => return Ok(None),
            Frame::Message(m) => m,
        };

        match message.command {
            Command::Limits => {
                let values = message.limits_values()?;
                if superseded(cancel) {
                    return Ok(None);
                }
                self.session
                    .lock()
                    .registry
                    .apply_limits(message.function, values);
                Ok(None)
            }
            Command::Chn => {
                let value = attribute_value(message.function, &message.value)?;
                debug!(function = %message.function, %value, "received update");
                Ok(Some(Event::AttributeChanged {
                    function: message.function,
                    value,
                }))
            }
            other => {
                trace!(command = %other, function = %message.function, "ignoring message");
                Ok(None)
            }
        }
    }

    fn set_online(&self, slot: &mut LinkSlot, online: bool) {
        if slot.online == Some(online) {
            return;
        }
        slot.online = Some(online);
        info!(online, "IntesisBox connectivity changed");
        if let Some(logger) = &self.logger {
            logger.lock().log_link(online);
        }
        self.emit(&Event::ConnectivityChanged { online });
    }

    /// A panicking callback is logged and skipped; it must not take down the
    /// receive task or the tick that triggered it.
    fn emit(&self, event: &Event) {
        for cb in &self.event_callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| cb(event))).is_err() {
                warn!(?event, "event callback panicked");
            }
        }
    }

    fn log_sent(&self, line: &str) {
        if let Some(logger) = &self.logger {
            logger.lock().log_sent(line);
        }
    }

    fn log_received(&self, line: &str, frame: Option<&Frame>) {
        if let Some(logger) = &self.logger {
            logger.lock().log_received(line, frame);
        }
    }
}

fn superseded(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

/// Wire value for a SET, or why it must not be sent.
///
/// SETPTEMP is clamped into the device range and never checked against the
/// enumerated limits. Non-finite or negative setpoints have no wire form.
fn command_value(
    registry: &AttributeRegistry,
    function: Function,
    value: &AttributeValue,
) -> std::result::Result<String, DropReason> {
    if function.is_read_only() {
        return Err(DropReason::ReadOnly);
    }
    match (function, value) {
        (Function::OnOff, AttributeValue::Power(on)) => {
            Ok(if *on { "ON" } else { "OFF" }.to_string())
        }
        (Function::Setpoint, AttributeValue::Temperature(temp)) => {
            if !temp.celsius().is_finite() || temp.to_tenths() < 0 {
                return Err(DropReason::InvalidValue);
            }
            Ok(registry.clamp_setpoint(temp.to_tenths()).to_string())
        }
        (f, AttributeValue::Text(s)) if f.is_enumerated() => {
            if registry.is_allowed(f, s) {
                Ok(s.clone())
            } else {
                Err(DropReason::NotAllowed)
            }
        }
        _ => Err(DropReason::InvalidValue),
    }
}

/// Typed value of a CHN payload.
fn attribute_value(function: Function, raw: &str) -> Result<AttributeValue> {
    match function {
        Function::OnOff => match raw {
            "ON" => Ok(AttributeValue::Power(true)),
            "OFF" => Ok(AttributeValue::Power(false)),
            _ => Err(Error::Protocol(format!("invalid ONOFF value: {raw}"))),
        },
        Function::Setpoint | Function::AmbientTemperature => raw
            .parse::<i32>()
            .map(|tenths| AttributeValue::Temperature(Temperature::from_tenths(tenths)))
            .map_err(|_| Error::Protocol(format!("invalid {function} value: {raw}"))),
        _ => Ok(AttributeValue::Text(raw.to_string())),
    }
}
