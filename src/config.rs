//! Customizable configuration for shards.

use super::session::Session;
use crate::tls::TlsContainer;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
};

/// Maximum value of an acceptable [large threshold].
///
/// [large threshold]: ConfigBuilder::large_threshold
pub const LARGE_THRESHOLD_MAXIMUM: u64 = 250;

/// Minimum value of an acceptable [large threshold].
///
/// [large threshold]: ConfigBuilder::large_threshold
pub const LARGE_THRESHOLD_MINIMUM: u64 = 50;

/// Default cap on the decoder's accumulation buffer, in bytes.
pub const DEFAULT_MAX_PERSISTENT_BUFFER_SIZE: usize = 3 * 1024 * 1024;

/// Default outbound frame budget per 60-second window.
pub const DEFAULT_RATELIMIT_PER_MINUTE: u32 = 119;

/// Fixed string substituted for identify properties when [incognito] is set.
///
/// [incognito]: ConfigBuilder::incognito
const INCOGNITO_REDACTION: &str = "redacted";

/// Close codes that the supervisor must treat as terminal rather than retry.
///
/// Authentication failure (4004), invalid shard (4010), and disallowed
/// intents (4014) are used as a representative default; platforms with a
/// different code table should override this via
/// [`ConfigBuilder::fatal_close_codes`].
const DEFAULT_FATAL_CLOSE_CODES: [u16; 3] = [4004, 4010, 4014];

/// Identifier of a [shard], including the shard's ID and the total number of
/// shards in use by the bot.
///
/// [shard]: super::Shard
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardId {
    /// Current ID of the shard, 0-indexed.
    current: u64,
    /// Total number of shards used by the bot, 1-indexed.
    total: u64,
}

impl ShardId {
    /// ID of a bot that has only one shard.
    ///
    /// This should *only* be used by small bots in under one or two thousand
    /// guilds.
    pub const ONE: ShardId = ShardId::new(0, 1);

    /// Create a new identifier for a shard.
    ///
    /// The current shard is 0-indexed while the total number of shards is
    /// 1-indexed. This means that a current shard of 7 with a total of 8 is
    /// valid, while a current shard value of 8 out of 8 total shards is
    /// invalid.
    ///
    /// # Examples
    ///
    /// Create a new shard with a current index of 13 out of 24 shards:
    ///
    /// ```
    /// use gateway_shard::ShardId;
    ///
    /// let id = ShardId::new(13, 24);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the current shard is greater than or equal to the total number
    /// of shards, or if the total number of shards is zero.
    pub const fn new(current: u64, total: u64) -> Self {
        assert!(total > 0, "total must be greater than zero");
        assert!(
            current < total,
            "current shard (0-indexed) must be less than total (1-indexed)",
        );

        Self { current, total }
    }

    /// Create a new identifier for a shard if the shard indexes are valid.
    ///
    /// The current shard is 0-indexed while the total number of shards is
    /// 1-indexed. This means that a current shard of 7 with a total of 8 is
    /// valid, while a current shard value of 8 out of 8 total shards is
    /// invalid.
    pub const fn new_checked(current: u64, total: u64) -> Option<Self> {
        let is_total_nonzero = total > 0;
        let is_current_valid = current < total;

        if is_total_nonzero && is_current_valid {
            Some(Self { current, total })
        } else {
            None
        }
    }

    /// ID of the shard, 0-indexed.
    pub const fn current(self) -> u64 {
        self.current
    }

    /// Total number of shards, 1-indexed.
    pub const fn total(self) -> u64 {
        self.total
    }
}

/// Display the shard ID.
///
/// Formats as `shard {current}/{total}`.
impl Display for ShardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("shard ")?;
        Display::fmt(&self.current, f)?;
        f.write_str("/")?;

        Display::fmt(&self.total, f)
    }
}

/// Operating system, client library, and runtime identity sent in IDENTIFY.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentifyProperties {
    /// Operating system the shard is running on.
    pub os: Box<str>,
    /// Name of the client library.
    pub browser: Box<str>,
    /// Runtime or device the client library is running in.
    pub device: Box<str>,
}

impl IdentifyProperties {
    /// Construct new identify properties.
    pub fn new(os: impl Into<Box<str>>, browser: impl Into<Box<str>>, device: impl Into<Box<str>>) -> Self {
        Self {
            os: os.into(),
            browser: browser.into(),
            device: device.into(),
        }
    }

    /// Best-effort runtime introspection, resolved once at construction time.
    ///
    /// Per the design notes, this is never re-resolved per connection: the
    /// identity presented to the server is fixed for the shard's lifetime.
    fn detected() -> Self {
        Self::new(std::env::consts::OS, "gateway-shard", "rust")
    }

    /// Fixed redaction used when [`ConfigBuilder::incognito`] is enabled.
    pub(crate) fn redacted() -> Self {
        Self::new(INCOGNITO_REDACTION, INCOGNITO_REDACTION, INCOGNITO_REDACTION)
    }
}

/// Non-blocking sink invoked with every dispatched `(event_name, payload)`.
pub type DispatchFn = dyn Fn(&str, &serde_json::Value) + Send + Sync;

/// Configuration used by the shard to identify with the gateway and operate.
///
/// Use [`Config::builder`] to start configuring a shard.
#[derive(Clone)]
pub struct Config {
    /// Non-blocking sink called with every dispatched event.
    dispatch: Option<Arc<DispatchFn>>,
    /// Fatal close codes that stop the supervisor from retrying.
    fatal_close_codes: Arc<[u16]>,
    /// URL used to connect to the gateway.
    gateway_url: Option<Box<str>>,
    /// Identification properties the shard will use.
    identify_properties: IdentifyProperties,
    /// If true, identify properties are replaced with a fixed redaction.
    incognito: bool,
    /// When the gateway will stop sending a guild's member list in
    /// Guild Create events.
    large_threshold: u64,
    /// Maximum capacity the decoder's accumulation buffer may retain.
    max_persistent_buffer_size: usize,
    /// Presence to set when identifying with the gateway.
    presence: Option<serde_json::Value>,
    /// Whether outbound message ratelimiting is enabled.
    ratelimit_messages: bool,
    /// Session information to resume a shard on initialization.
    session: Option<Session>,
    /// TLS connector for Websocket connections.
    tls: TlsContainer,
    /// Token used to authenticate when identifying with the gateway.
    token: Box<str>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Config")
            .field("fatal_close_codes", &self.fatal_close_codes)
            .field("gateway_url", &self.gateway_url)
            .field("identify_properties", &self.identify_properties)
            .field("incognito", &self.incognito)
            .field("large_threshold", &self.large_threshold)
            .field("max_persistent_buffer_size", &self.max_persistent_buffer_size)
            .field("presence", &self.presence)
            .field("ratelimit_messages", &self.ratelimit_messages)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Create a new default configuration for a shard.
    ///
    /// Shortcut for calling [`builder`][`Self::builder`] and immediately
    /// finalizing the builder.
    pub fn new(token: String) -> Self {
        Self::builder(token).build()
    }

    /// Create a builder to customize the configuration for a shard.
    pub fn builder(token: String) -> ConfigBuilder {
        ConfigBuilder::new(token)
    }

    /// Non-blocking sink invoked with every dispatched event, if configured.
    pub fn dispatch(&self) -> Option<&Arc<DispatchFn>> {
        self.dispatch.as_ref()
    }

    /// Close codes that the supervisor treats as terminal.
    pub fn fatal_close_codes(&self) -> &[u16] {
        &self.fatal_close_codes
    }

    /// Return an immutable reference to the url used to connect to the gateway.
    pub fn gateway_url(&self) -> Option<&str> {
        self.gateway_url.as_deref()
    }

    /// Identify properties presented when identifying with the gateway.
    ///
    /// Redacted per [`ConfigBuilder::incognito`] if enabled.
    pub const fn identify_properties(&self) -> &IdentifyProperties {
        &self.identify_properties
    }

    /// Whether identify properties are replaced with a fixed redaction string.
    pub const fn incognito(&self) -> bool {
        self.incognito
    }

    /// Maximum threshold at which point the gateway will stop sending a guild's
    /// member list in Guild Create events.
    pub const fn large_threshold(&self) -> u64 {
        self.large_threshold
    }

    /// Maximum capacity the decoder's accumulation buffer may retain between
    /// messages before it is released and reallocated.
    pub const fn max_persistent_buffer_size(&self) -> usize {
        self.max_persistent_buffer_size
    }

    /// Return an immutable reference to the presence to set when identifying
    /// with the gateway.
    pub const fn presence(&self) -> Option<&serde_json::Value> {
        self.presence.as_ref()
    }

    /// Whether outgoing message ratelimiting is enabled.
    pub const fn ratelimit_messages(&self) -> bool {
        self.ratelimit_messages
    }

    /// Session information to resume a shard on initialization.
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Immutable reference to the TLS connector in use by the shard.
    pub(crate) const fn tls(&self) -> &TlsContainer {
        &self.tls
    }

    /// Immutable reference to the token used to authenticate when identifying
    /// with the gateway.
    pub const fn token(&self) -> &str {
        &self.token
    }
}

/// Builder to customize the operation of a shard.
#[must_use = "builder must be completed to be used"]
pub struct ConfigBuilder {
    /// Inner configuration being modified.
    inner: Config,
}

impl std::fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConfigBuilder").field("inner", &self.inner).finish()
    }
}

impl ConfigBuilder {
    /// Create a new builder to configure and construct a shard.
    ///
    /// Refer to each method to learn their default values.
    pub fn new(token: String) -> Self {
        Self {
            inner: Config {
                dispatch: None,
                fatal_close_codes: Arc::from(&DEFAULT_FATAL_CLOSE_CODES[..]),
                gateway_url: None,
                identify_properties: IdentifyProperties::detected(),
                incognito: false,
                large_threshold: 50,
                max_persistent_buffer_size: DEFAULT_MAX_PERSISTENT_BUFFER_SIZE,
                presence: None,
                ratelimit_messages: true,
                session: None,
                tls: TlsContainer::new().expect("failed to build tls"),
                token: token.into_boxed_str(),
            },
        }
    }

    /// Create a new builder from an existing configuration.
    pub const fn with_config(config: Config) -> Self {
        Self { inner: config }
    }

    /// Consume the builder, constructing a shard.
    #[allow(clippy::missing_const_for_fn)]
    pub fn build(self) -> Config {
        self.inner
    }

    /// Set the non-blocking sink invoked with every dispatched event.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_shard::Config;
    ///
    /// let config = Config::builder("token".to_owned())
    ///     .dispatch(|name, payload| {
    ///         println!("{name}: {payload}");
    ///     })
    ///     .build();
    /// ```
    pub fn dispatch(mut self, dispatch: impl Fn(&str, &serde_json::Value) + Send + Sync + 'static) -> Self {
        self.inner.dispatch = Some(Arc::new(dispatch));

        self
    }

    /// Override the close codes the supervisor treats as terminal.
    pub fn fatal_close_codes(mut self, fatal_close_codes: impl Into<Arc<[u16]>>) -> Self {
        self.inner.fatal_close_codes = fatal_close_codes.into();

        self
    }

    /// Set the URL used for connecting to the gateway.
    pub fn gateway_url(mut self, gateway_url: Option<String>) -> Self {
        self.inner.gateway_url = gateway_url.map(String::into_boxed_str);

        self
    }

    /// Set the properties to identify with.
    ///
    /// This may be used if you want to set a different operating system, for
    /// example.
    ///
    /// # Examples
    ///
    /// Set the identify properties for a shard:
    ///
    /// ```no_run
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use std::env::{self, consts::OS};
    /// use gateway_shard::config::{Config, IdentifyProperties};
    ///
    /// let token = env::var("GATEWAY_TOKEN")?;
    /// let properties = IdentifyProperties::new("my-client", "my-client", OS);
    ///
    /// let config = Config::builder(token)
    ///     .identify_properties(properties)
    ///     .build();
    /// # Ok(()) }
    /// ```
    pub fn identify_properties(mut self, identify_properties: IdentifyProperties) -> Self {
        self.inner.identify_properties = identify_properties;

        self
    }

    /// Set whether identify properties are replaced with a fixed redaction
    /// string before being sent to the server.
    ///
    /// Defaults to `false`.
    pub const fn incognito(mut self, incognito: bool) -> Self {
        self.inner.incognito = incognito;

        self
    }

    /// Set the maximum number of members in a guild to load the member list.
    ///
    /// Default value is `50`. The minimum value is `50` and the maximum is
    /// `250`.
    ///
    /// # Panics
    ///
    /// Panics if the provided value is below 50 or above 250.
    pub const fn large_threshold(mut self, large_threshold: u64) -> Self {
        assert!(
            large_threshold >= LARGE_THRESHOLD_MINIMUM
                && large_threshold <= LARGE_THRESHOLD_MAXIMUM,
            "large threshold isn't in the accepted range"
        );

        self.inner.large_threshold = large_threshold;

        self
    }

    /// Set the cap on the decoder's accumulation buffer, in bytes.
    ///
    /// Default value is 3 MiB. After each successfully inflated message, if
    /// the buffer's capacity exceeds this value it is released and
    /// reallocated, instead of merely truncated, so a single oversized event
    /// cannot permanently pin memory.
    pub const fn max_persistent_buffer_size(mut self, max_persistent_buffer_size: usize) -> Self {
        self.inner.max_persistent_buffer_size = max_persistent_buffer_size;

        self
    }

    /// Set the presence to use automatically when starting a new session.
    ///
    /// Default is no presence, which defaults to strictly being "online"
    /// with no special qualities.
    pub fn presence(mut self, presence: serde_json::Value) -> Self {
        self.inner.presence = Some(presence);

        self
    }

    /// Set whether or not outgoing messages will be ratelimited.
    ///
    /// Useful when running behind a proxy gateway. Running without a
    /// functional ratelimiter **will** get you ratelimited.
    ///
    /// Defaults to being enabled.
    pub const fn ratelimit_messages(mut self, ratelimit_messages: bool) -> Self {
        self.inner.ratelimit_messages = ratelimit_messages;

        self
    }

    /// Set the gateway session to use when connecting to the gateway.
    ///
    /// In practice this will result in the shard attempting to send a
    /// RESUME to the gateway instead of identifying and creating a new
    /// session. Refer to the documentation for [`Session`] for more
    /// information.
    pub fn session(mut self, session: Session) -> Self {
        self.inner.session = Some(session);

        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, IdentifyProperties, ShardId};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Config: Clone, Debug, Send, Sync);
    assert_impl_all!(IdentifyProperties: Clone, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    const fn test_shard_id() {
        let id = ShardId::new(2, 4);

        assert!(id.current() == 2);
        assert!(id.total() == 4);
    }

    #[should_panic]
    #[test]
    const fn test_shard_id_current_equal_invalid() {
        ShardId::new(4, 4);
    }

    #[should_panic]
    #[test]
    const fn test_shard_id_current_greater_invalid() {
        ShardId::new(10, 4);
    }

    #[should_panic]
    #[test]
    const fn test_shard_id_total_zero_invalid() {
        ShardId::new(0, 0);
    }

    #[test]
    const fn test_shard_id_new_checked() {
        assert!(ShardId::new_checked(0, 1).is_some());
        assert!(ShardId::new_checked(1, 1).is_none());
        assert!(ShardId::new_checked(2, 1).is_none());
        assert!(ShardId::new_checked(0, 0).is_none());
    }

    #[test]
    fn test_shard_id_display() {
        assert_eq!("shard 0/1", ShardId::ONE.to_string());
        assert_eq!("shard 2/4", ShardId::new(2, 4).to_string());
        assert_eq!("shard 13/102", ShardId::new(13, 102).to_string());
    }

    #[test]
    fn test_incognito_redacts_properties() {
        let config = Config::builder("token".to_owned()).incognito(true).build();

        assert!(config.incognito());
    }

    #[test]
    fn test_default_fatal_close_codes() {
        let config = Config::new("token".to_owned());

        assert!(config.fatal_close_codes().contains(&4004));
    }
}
