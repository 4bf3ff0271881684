//! Connection Supervisor, Protocol State Machine, and public API tying
//! every other component into a single running shard.
//!
//! # Implementation flow
//!
//! [`Shard::run`] owns the transport for as long as the shard lives. Each
//! iteration of its inner loop:
//!
//! 1. Reconnects if the previous iteration left the shard [disconnected];
//! 2. Races a heartbeat tick, a message from the [user channel], and the
//!    next frame from the transport, in that precedence;
//! 3. Feeds transport frames through the [Decoder Pipeline] and hands the
//!    resulting envelope to [`Shard::process`];
//! 4. On a close frame, classifies it as resumable or not and loops back
//!    to step 1 after the fixed [reconnect cooldown].
//!
//! [disconnected]: ConnectionStatus::Disconnected
//! [user channel]: MessageSender
//! [Decoder Pipeline]: crate::compression::Compression
//! [reconnect cooldown]: crate::future::ReconnectDelayFuture

use crate::{
    channel::{MessageChannel, MessageSender},
    command::{self, Command, Heartbeat, Identify, OpCode, Resume},
    compression::Compression,
    config::{Config, IdentifyProperties, ShardId},
    error::{
        ProcessError, ProcessErrorType, ReceiveMessageError, ReceiveMessageErrorType, SendError,
        SendErrorType, ShardInitializeError, ShardInitializeErrorType,
    },
    future::{NextMessageFuture, NextMessageFutureOutput},
    heartbeat::Heartbeater,
    message::{CloseFrame, Message},
    ratelimiter::CommandRatelimiter,
    session::Session,
    Connection, Envelope, Latency,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::{protocol::WebSocketConfig, Message as TungsteniteMessage};
use url::Url;

/// Configuration used for every Websocket connection the shard opens.
///
/// Frame and message size limits are left uncapped: the transport frame
/// size is bounded by the Decoder Pipeline's own accumulation buffer cap
/// instead.
const WEBSOCKET_CONFIG: WebSocketConfig = WebSocketConfig {
    accept_unmasked_frames: false,
    max_frame_size: None,
    max_message_size: None,
    max_send_queue: None,
};

/// Disconnect a shard, optionally discarding its session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Disconnect {
    /// Disconnect and discard the session; the next connection identifies
    /// from scratch.
    Reidentify,
    /// Disconnect but keep the session; the next connection resumes it.
    Resume,
}

impl Disconnect {
    /// Create a disconnect action based on whether the session may be
    /// resumed.
    const fn from_resumable(resumable: bool) -> Self {
        if resumable {
            Self::Resume
        } else {
            Self::Reidentify
        }
    }
}

/// Current status of a shard.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    /// Shard is connected.
    ///
    /// Note that this does not mean the shard has an active gateway
    /// session; it may still be awaiting HELLO or an identify response.
    Connected,
    /// Shard is disconnected but will reconnect on the next call to
    /// [`Shard::run`], unless the shard was explicitly [closed].
    ///
    /// [closed]: Shard::close
    Disconnected,
    /// Shard has fatally closed, such as due to an invalid token, and will
    /// not reconnect.
    FatallyClosed,
}

impl ConnectionStatus {
    /// Whether the shard is currently connected.
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the shard has disconnected but may reconnect in the future.
    pub const fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Whether the shard has fatally closed.
    pub const fn is_fatally_closed(self) -> bool {
        matches!(self, Self::FatallyClosed)
    }
}

/// Payload of a HELLO frame.
#[derive(Debug, Deserialize)]
struct Hello {
    /// Interval, in milliseconds, at which heartbeats must be sent.
    heartbeat_interval: u64,
    /// Server trace supplied alongside the interval.
    #[serde(rename = "_trace", default)]
    trace: Vec<String>,
}

/// Payload of a READY dispatch, so far as the core cares about it.
#[derive(Debug, Deserialize)]
struct Ready {
    /// ID of the newly created session.
    session_id: String,
    /// Server trace supplied alongside the session.
    #[serde(rename = "_trace", default)]
    trace: Vec<String>,
}

/// A single persistent duplex connection to a chat platform's gateway.
///
/// A shard opens a Websocket connection, authenticates, maintains liveness
/// via bidirectional heartbeats, decodes a compressed stream of JSON event
/// frames, and dispatches them to a configured callback, automatically
/// recovering from transport faults via a resume-or-reidentify state
/// machine.
///
/// # Using a shard in multiple tasks
///
/// [`Shard::run`] takes `&mut self` for as long as the shard is running.
/// To interact with a running shard from another task, clone a
/// [`MessageSender`] via [`Shard::sender`]; sending a [`Message::Close`]
/// over it requests a graceful shutdown.
///
/// # Examples
///
/// Refer to the [crate documentation][`crate`] for a complete example.
#[derive(Debug)]
pub struct Shard {
    /// Decoder Pipeline state for the current transport connection.
    compression: Compression,
    /// User provided configuration.
    config: Config,
    /// Current transport connection.
    connection: Connection,
    /// Whether HELLO has been received on the current transport connection.
    hello_received: bool,
    /// Heartbeat Supervisor state, present once HELLO has been received.
    heartbeater: Option<Heartbeater>,
    /// ID of the shard.
    id: ShardId,
    /// Send Gate, present if ratelimiting was enabled via
    /// [`Config::ratelimit_messages`].
    ratelimiter: Option<CommandRatelimiter>,
    /// Active gateway session, if any.
    session: Option<Session>,
    /// Whether the user has requested a graceful shutdown.
    shutdown: bool,
    /// Current connection status.
    status: ConnectionStatus,
    /// Most recently observed server trace.
    trace: Vec<String>,
    /// Channel for other tasks to send messages over this shard.
    user_channel: MessageChannel,
}

impl Shard {
    /// Create a new shard with the default configuration.
    ///
    /// # Errors
    ///
    /// Refer to [`Shard::with_config`] for possible errors.
    pub async fn new(id: ShardId, token: String) -> Result<Self, ShardInitializeError> {
        Self::with_config(id, Config::new(token)).await
    }

    /// Create a new shard with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardInitializeErrorType::UrlMissing`] error type if no
    /// gateway URL was configured via [`ConfigBuilder::gateway_url`].
    ///
    /// Returns a [`ShardInitializeErrorType::UrlInvalid`] error type if the
    /// configured gateway URL could not be parsed once the wire's query
    /// parameters were appended.
    ///
    /// Returns a [`ShardInitializeErrorType::Establishing`] error type if
    /// the connection could not be established, such as due to network or
    /// TLS errors.
    ///
    /// [`ConfigBuilder::gateway_url`]: crate::config::ConfigBuilder::gateway_url
    pub async fn with_config(id: ShardId, config: Config) -> Result<Self, ShardInitializeError> {
        let session = config.session().cloned();
        let connection = connect(id, &config).await?;

        Ok(Self {
            compression: Compression::new(config.max_persistent_buffer_size()),
            config,
            connection,
            hello_received: false,
            heartbeater: None,
            id,
            ratelimiter: None,
            session,
            shutdown: false,
            status: ConnectionStatus::Connected,
            trace: Vec::new(),
            user_channel: MessageChannel::new(),
        })
    }

    /// Immutable reference to the configuration used to instantiate this
    /// shard.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// ID of the shard.
    pub const fn id(&self) -> ShardId {
        self.id
    }

    /// Current connection status of the shard.
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Shard latency statistics, including average latency and recent
    /// heartbeat round-trip times.
    ///
    /// Returns `None` until HELLO has been received at least once.
    pub fn latency(&self) -> Option<&Latency> {
        self.heartbeater.as_ref().map(Heartbeater::latency)
    }

    /// Statistics about the number of available commands and when the
    /// Send Gate will next refill.
    ///
    /// This won't be present if ratelimiting was disabled via
    /// [`ConfigBuilder::ratelimit_messages`].
    ///
    /// [`ConfigBuilder::ratelimit_messages`]: crate::config::ConfigBuilder::ratelimit_messages
    pub const fn ratelimiter(&self) -> Option<&CommandRatelimiter> {
        self.ratelimiter.as_ref()
    }

    /// Immutable reference to the active gateway session.
    ///
    /// An active session may not be present if the shard has recently
    /// disconnected or had its session invalidated and has not yet
    /// completed a reconnect.
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Server trace most recently supplied in HELLO or READY.
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Run the shard until [`Shard::close`] is called or a fatal close
    /// code is received.
    ///
    /// Every dispatched event is forwarded to the sink configured via
    /// [`ConfigBuilder::dispatch`]. Recoverable faults (resumable or not)
    /// are handled internally: the transport is reopened, the fixed
    /// reconnect cooldown is observed, and the session is resumed or
    /// reidentified as appropriate.
    ///
    /// # Errors
    ///
    /// Returns a [`ReceiveMessageErrorType::FatallyClosed`] error type if
    /// the gateway closed the connection with a close code configured via
    /// [`ConfigBuilder::fatal_close_codes`] as terminal.
    ///
    /// [`ConfigBuilder::dispatch`]: crate::config::ConfigBuilder::dispatch
    /// [`ConfigBuilder::fatal_close_codes`]: crate::config::ConfigBuilder::fatal_close_codes
    pub async fn run(&mut self) -> Result<(), ReceiveMessageError> {
        while !self.shutdown {
            if let Err(error) = self.next_message().await {
                if error.is_fatal(self.config.fatal_close_codes()) {
                    self.status = ConnectionStatus::FatallyClosed;

                    return Err(error);
                }

                tracing::warn!(id = %self.id, error = %error, "recoverable error, retrying");
            }
        }

        Ok(())
    }

    /// Wait for and process the next raw message from the transport,
    /// reconnecting first if the shard is currently disconnected.
    ///
    /// # Errors
    ///
    /// Returns a [`ReceiveMessageErrorType::Reconnect`] error type if a
    /// reconnect was necessary but failed.
    ///
    /// Returns a [`ReceiveMessageErrorType::Process`] error type if the
    /// shard failed to process a received message.
    ///
    /// Returns a [`ReceiveMessageErrorType::SendingMessage`] error type if
    /// the shard failed to send a message over the transport, such as a
    /// heartbeat or an identify.
    async fn next_message(&mut self) -> Result<Message, ReceiveMessageError> {
        if self.status.is_disconnected() {
            self.reconnect().await?;
        }

        let message = loop {
            let future = NextMessageFuture::new(
                self.user_channel.rx_mut(),
                self.connection.next(),
                self.heartbeater.as_ref().map(Heartbeater::interval),
                self.heartbeater.as_ref().and_then(|h| h.latency().sent()),
            );

            match future.await {
                NextMessageFutureOutput::Message(Some(tungstenite_message)) => {
                    if let Some(message) = Message::from_tungstenite(tungstenite_message) {
                        break message;
                    }
                }
                NextMessageFutureOutput::Message(None) => {
                    tracing::debug!(id = %self.id, "transport closed or errored");
                    self.disconnect(Disconnect::Reidentify);

                    break Message::Close(None);
                }
                NextMessageFutureOutput::SendHeartbeat => {
                    if self.heartbeater.as_ref().is_some_and(Heartbeater::is_zombie) {
                        tracing::warn!(id = %self.id, "heartbeat zombied, reconnecting");
                        self.disconnect(Disconnect::Resume);

                        let frame = Some(CloseFrame::HEARTBEAT_ZOMBIE);
                        let _ = self.send(Message::Close(frame.clone())).await;

                        break Message::Close(frame);
                    }

                    self.heartbeat().await.map_err(ReceiveMessageError::from_send)?;
                }
                NextMessageFutureOutput::UserChannelMessage(Message::Close(frame)) => {
                    self.shutdown = true;
                    self.status = ConnectionStatus::Disconnected;
                    self.send(Message::Close(frame.clone()))
                        .await
                        .map_err(ReceiveMessageError::from_send)?;

                    break Message::Close(frame);
                }
                NextMessageFutureOutput::UserChannelMessage(message) => {
                    self.send(message).await.map_err(ReceiveMessageError::from_send)?;
                }
            }
        };

        match &message {
            Message::Binary(bytes) => {
                self.compression.extend(bytes);

                self.process().await.map_err(|source| ReceiveMessageError {
                    kind: ReceiveMessageErrorType::Process,
                    source: Some(Box::new(source)),
                })?;
            }
            Message::Text(text) => {
                self.process_decoded(text.clone().into_bytes())
                    .await
                    .map_err(|source| ReceiveMessageError {
                        kind: ReceiveMessageErrorType::Process,
                        source: Some(Box::new(source)),
                    })?;
            }
            Message::Close(close) => {
                if !self.shutdown {
                    if let Some(code) = close.as_ref().map(|frame| frame.code()) {
                        if self.config.fatal_close_codes().contains(&code) {
                            return Err(ReceiveMessageError::from_fatally_closed(code));
                        }
                    }

                    let resumable = close.as_ref().map_or(true, |frame| frame.code() < 4000);
                    self.disconnect(Disconnect::from_resumable(resumable));
                }
            }
        }

        Ok(match message {
            Message::Binary(_) => Message::Binary(self.compression.take()),
            other => other,
        })
    }

    /// Send a command over the gateway.
    ///
    /// # Errors
    ///
    /// Returns a [`SendErrorType::Sending`] error type if the message
    /// could not be sent over the transport. This indicates the shard is
    /// either currently restarting or closed and will restart.
    ///
    /// Returns a [`SendErrorType::Serializing`] error type if the
    /// provided command failed to serialize.
    pub async fn command(&mut self, command: &impl Command) -> Result<(), SendError> {
        let message = command::prepare(command)?;

        self.send(message).await
    }

    /// Send a raw message over the transport.
    ///
    /// Ordinary traffic passes through the Send Gate if ratelimiting is
    /// enabled; close frames bypass it entirely, since a shutdown must
    /// never be delayed by a saturated budget.
    ///
    /// # Errors
    ///
    /// Returns a [`SendErrorType::Sending`] error type if the message
    /// could not be sent over the transport.
    pub async fn send(&mut self, message: Message) -> Result<(), SendError> {
        if !matches!(message, Message::Close(_)) {
            if let Some(ratelimiter) = self.ratelimiter.as_ref() {
                ratelimiter.acquire_one().await;
            }
        }

        self.send_now(message).await
    }

    /// Send a heartbeat, bypassing the ordinary Send Gate in favor of its
    /// reserved single-slot lane.
    async fn send_heartbeat(&mut self, message: Message) -> Result<(), SendError> {
        if let Some(ratelimiter) = self.ratelimiter.as_ref() {
            ratelimiter.acquire_heartbeat().await;
        }

        self.send_now(message).await
    }

    /// Write a message over the transport without consulting the Send
    /// Gate.
    async fn send_now(&mut self, message: Message) -> Result<(), SendError> {
        self.connection
            .send(message.into_tungstenite())
            .await
            .map_err(|source| SendError {
                kind: SendErrorType::Sending,
                source: Some(Box::new(source)),
            })
    }

    /// Retrieve a channel to send messages over the shard from other
    /// tasks.
    ///
    /// Sending a [`Message::Close`] over the returned sender requests a
    /// graceful shutdown of [`Shard::run`].
    pub fn sender(&self) -> MessageSender {
        self.user_channel.sender()
    }

    /// Request a graceful shutdown of the shard.
    ///
    /// Sends a close frame and, if `block` is `true`, waits for the
    /// transport to confirm the close before returning.
    ///
    /// # Errors
    ///
    /// Returns a [`SendErrorType::Sending`] error type if the close frame
    /// could not be sent.
    pub async fn close(&mut self, block: bool) -> Result<Option<Session>, SendError> {
        self.shutdown = true;
        self.send_now(Message::Close(Some(CloseFrame::NORMAL))).await?;
        self.status = ConnectionStatus::Disconnected;

        if block {
            while let Some(Ok(message)) = self.connection.next().await {
                if matches!(message, TungsteniteMessage::Close(_)) {
                    break;
                }
            }
        }

        Ok(self.session.clone())
    }

    /// Open a fresh transport connection, resetting per-connection state.
    async fn reconnect(&mut self) -> Result<(), ReceiveMessageError> {
        crate::future::ReconnectDelayFuture::new().await;

        self.connection = connect(self.id, &self.config)
            .await
            .map_err(ReceiveMessageError::from_reconnect)?;
        self.compression = Compression::new(self.config.max_persistent_buffer_size());
        self.heartbeater = None;
        self.hello_received = false;
        self.status = ConnectionStatus::Connected;

        Ok(())
    }

    /// Disconnect the transport, optionally discarding the session.
    fn disconnect(&mut self, disconnect: Disconnect) {
        tracing::debug!(id = %self.id, ?disconnect, "disconnected");
        self.status = ConnectionStatus::Disconnected;

        if disconnect == Disconnect::Reidentify {
            self.session = None;
            self.trace.clear();
        }
    }

    /// Send a heartbeat carrying the last observed sequence.
    async fn heartbeat(&mut self) -> Result<(), SendError> {
        let sequence = self.session.as_ref().map(Session::sequence);
        let message = command::prepare(&Heartbeat::new(sequence))?;

        let send_started_at = Instant::now();
        self.send_heartbeat(message).await?;

        if let Some(heartbeater) = self.heartbeater.as_mut() {
            heartbeater.track_sent(send_started_at);
        }

        Ok(())
    }

    /// Identify a new session with the gateway.
    async fn identify(&mut self) -> Result<(), SendError> {
        let properties = if self.config.incognito() {
            IdentifyProperties::redacted()
        } else {
            self.config.identify_properties().clone()
        };

        let shard_info = (self.id.total() > 1).then_some([self.id.current(), self.id.total()]);

        let identify = Identify::new(
            self.config.token().to_owned(),
            shard_info,
            &properties,
            self.config.large_threshold(),
            self.config.presence().cloned(),
        );

        self.command(&identify).await
    }

    /// Resume the active session with the gateway.
    ///
    /// # Panics
    ///
    /// Panics if called without an active session.
    async fn resume(&mut self) -> Result<(), SendError> {
        let session = self
            .session
            .as_ref()
            .expect("resume is only attempted with an active session");

        let resume = Resume::new(
            self.config.token().to_owned(),
            session.id().to_owned(),
            session.sequence(),
        );

        self.command(&resume).await
    }

    /// Process a fully inflated binary message, if the accumulation buffer
    /// currently ends in the sync-flush sentinel.
    async fn process(&mut self) -> Result<(), ProcessError> {
        let buffer = match self.compression.message_mut() {
            Ok(Some(buffer)) => buffer,
            Ok(None) => return Ok(()),
            Err(source) => return Err(ProcessError::from_compression(source)),
        };

        let envelope = match crate::envelope::parse(buffer) {
            Ok(envelope) => envelope,
            Err(source) => return self.handle_parsing_error(source).await,
        };

        self.handle_envelope(envelope).await
    }

    /// Process an already-decoded text message, bypassing the decoder.
    async fn process_decoded(&mut self, json: Vec<u8>) -> Result<(), ProcessError> {
        let envelope = match crate::envelope::parse(&json) {
            Ok(envelope) => envelope,
            Err(source) => return self.handle_parsing_error(source).await,
        };

        self.handle_envelope(envelope).await
    }

    /// React to a failure to parse the wire envelope.
    ///
    /// A root value that isn't a JSON object is a protocol violation with a
    /// defined recovery: close 1007 and reidentify. Anything else (invalid
    /// JSON) is surfaced to the caller as an ordinary process failure.
    async fn handle_parsing_error(
        &mut self,
        source: crate::envelope::EnvelopeParsingError,
    ) -> Result<(), ProcessError> {
        if matches!(
            source.kind(),
            crate::envelope::EnvelopeParsingErrorType::NotAnObject
        ) {
            tracing::warn!(id = %self.id, "received envelope with a non-object root");
            self.disconnect(Disconnect::Reidentify);
            self.send(Message::Close(Some(CloseFrame::INVALID_ENVELOPE)))
                .await
                .map_err(ProcessError::from_send)?;

            return Ok(());
        }

        Err(ProcessError::from_parsing(source))
    }

    /// Interpret a parsed envelope, enforcing that the very first frame of
    /// a connection is HELLO.
    async fn handle_envelope(&mut self, envelope: Envelope) -> Result<(), ProcessError> {
        if !self.hello_received {
            if envelope.op != OpCode::Hello as u8 {
                tracing::warn!(id = %self.id, op = envelope.op, "first frame wasn't hello");
                self.disconnect(Disconnect::Resume);
                self.send(Message::Close(Some(CloseFrame::PROTOCOL_VIOLATION)))
                    .await
                    .map_err(ProcessError::from_send)?;

                return Ok(());
            }

            self.hello_received = true;

            return self.handle_hello(envelope.d).await;
        }

        match envelope.op {
            op if op == OpCode::Dispatch as u8 => self.handle_dispatch(envelope).await,
            op if op == OpCode::Heartbeat as u8 => {
                let ack = command::prepare_raw(OpCode::HeartbeatAck as u8, &serde_json::Value::Null)
                    .map_err(ProcessError::from_send)?;

                self.send(ack).await.map_err(ProcessError::from_send)
            }
            op if op == OpCode::Reconnect as u8 => {
                tracing::info!(id = %self.id, "gateway requested a reconnect");
                self.disconnect(Disconnect::Reidentify);
                self.send(Message::Close(Some(CloseFrame::REIDENTIFYING)))
                    .await
                    .map_err(ProcessError::from_send)
            }
            op if op == OpCode::InvalidSession as u8 => {
                tracing::warn!(id = %self.id, "session invalidated");
                self.disconnect(Disconnect::Reidentify);
                self.send(Message::Close(Some(CloseFrame::REIDENTIFYING)))
                    .await
                    .map_err(ProcessError::from_send)
            }
            op if op == OpCode::HeartbeatAck as u8 => {
                if let Some(heartbeater) = self.heartbeater.as_mut() {
                    heartbeater.track_ack();
                }

                Ok(())
            }
            other => {
                tracing::warn!(id = %self.id, opcode = other, "received unknown opcode");

                Ok(())
            }
        }
    }

    /// Handle HELLO: record the heartbeat interval and trace, then
    /// identify or resume.
    async fn handle_hello(&mut self, payload: serde_json::Value) -> Result<(), ProcessError> {
        let hello: Hello = serde_json::from_value(payload).map_err(|source| ProcessError {
            kind: ProcessErrorType::ParsingPayload,
            source: Some(Box::new(source)),
        })?;

        let interval = Duration::from_millis(hello.heartbeat_interval);
        self.heartbeater = Some(Heartbeater::new(interval));

        if !hello.trace.is_empty() {
            self.trace = hello.trace;
        }

        tracing::debug!(id = %self.id, ?interval, trace = ?self.trace, "received hello");

        self.ratelimiter = self
            .config
            .ratelimit_messages()
            .then(CommandRatelimiter::default_budget);

        let has_session = self.session.is_some();

        let result = if has_session {
            self.resume().await
        } else {
            self.identify().await
        };

        result.map_err(ProcessError::from_send)
    }

    /// Handle DISPATCH: update the sequence before the callback runs, and
    /// forward `(t, d)` to the dispatch sink.
    async fn handle_dispatch(&mut self, envelope: Envelope) -> Result<(), ProcessError> {
        if let Some(sequence) = envelope.s {
            if let Some(session) = self.session.as_mut() {
                session.set_sequence(sequence);
            }
        }

        let event_name = envelope.t.as_deref().unwrap_or_default();

        if event_name == "READY" {
            if let Ok(ready) = serde_json::from_value::<Ready>(envelope.d.clone()) {
                if !ready.trace.is_empty() {
                    self.trace = ready.trace;
                }

                let sequence = envelope.s.unwrap_or_default();
                let mut session = Session::new(ready.session_id, sequence);
                session.set_trace(self.trace.clone());
                self.session = Some(session);
            }
        }

        if let Some(dispatch) = self.config.dispatch() {
            dispatch(event_name, &envelope.d);
        }

        Ok(())
    }
}

/// Append the wire's fixed query parameters to a gateway base URL.
fn configure_url(url: &mut String) {
    url.push_str("?v=");
    url.push_str(&crate::API_VERSION.to_string());
    url.push_str("&encoding=json");
    url.push_str(crate::compression::COMPRESSION_FEATURES);
}

/// Connect to the configured gateway.
///
/// # Errors
///
/// Returns a [`ShardInitializeErrorType::UrlMissing`] error type if no
/// gateway URL was configured.
///
/// Returns a [`ShardInitializeErrorType::UrlInvalid`] error type if the
/// fully built URL could not be parsed.
///
/// Returns a [`ShardInitializeErrorType::Establishing`] error type if the
/// connection could not be established.
async fn connect(id: ShardId, config: &Config) -> Result<Connection, ShardInitializeError> {
    let base_url = config.gateway_url().ok_or(ShardInitializeError {
        kind: ShardInitializeErrorType::UrlMissing,
        source: None,
    })?;

    let mut raw_url = base_url.to_owned();
    configure_url(&mut raw_url);

    let url = Url::parse(&raw_url).map_err(|source| ShardInitializeError {
        kind: ShardInitializeErrorType::UrlInvalid {
            url: raw_url.clone(),
        },
        source: Some(Box::new(source)),
    })?;

    tracing::debug!(%id, %url, "connecting to gateway");

    let (stream, _) = tokio_tungstenite::connect_async_tls_with_config(
        url,
        Some(WEBSOCKET_CONFIG),
        Some(config.tls().connector()),
    )
    .await
    .map_err(|source| ShardInitializeError {
        kind: ShardInitializeErrorType::Establishing,
        source: Some(Box::new(source)),
    })?;

    tracing::debug!(%id, "connected to gateway");

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::{Disconnect, SendError, SendErrorType, Shard, ShardInitializeError, ShardInitializeErrorType};
    use crate::API_VERSION;
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug};

    assert_impl_all!(SendErrorType: Debug, Send, Sync);
    assert_impl_all!(SendError: Error, Send, Sync);
    assert_impl_all!(ShardInitializeErrorType: Debug, Send, Sync);
    assert_impl_all!(ShardInitializeError: Error, Send, Sync);
    assert_impl_all!(Shard: Debug, Send, Sync);

    #[test]
    fn test_configure_url() {
        let mut buf = String::new();
        super::configure_url(&mut buf);

        assert_eq!(
            format!("?v={API_VERSION}&encoding=json&compression=zlib-stream"),
            buf
        );
    }

    #[test]
    fn disconnect_from_resumable() {
        assert_eq!(Disconnect::Resume, Disconnect::from_resumable(true));
        assert_eq!(Disconnect::Reidentify, Disconnect::from_resumable(false));
    }
}
