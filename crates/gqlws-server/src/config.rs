//! Embedding configuration: predicates, engine, bootstrap hook, and policy.

use std::fmt;
use std::sync::Arc;

use axum::http::request::Parts;
use gqlws_settings::{GqlWsSettings, ProtocolSettings, ServerSettings};

use crate::engine::{NoSubscriber, Subscriber};
use crate::hooks::{ConnectHook, Passthrough};

/// Predicate over an inbound request head.
pub type RequestPredicate = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Configuration of the graphql-ws endpoint.
///
/// Every field has a permissive default: all origins and all requests are
/// accepted, `connection_init` passes the context through, and every `start`
/// is rejected because no engine is installed.
#[derive(Clone)]
pub struct Config {
    pub(crate) check_origin: RequestPredicate,
    pub(crate) upgrade_rule: RequestPredicate,
    pub(crate) subscriber: Arc<dyn Subscriber>,
    pub(crate) on_connect: Arc<dyn ConnectHook>,
    pub(crate) protocol: ProtocolSettings,
    pub(crate) max_message_size: usize,
}

impl Config {
    /// Defaults for everything.
    pub fn new() -> Self {
        Self {
            check_origin: Arc::new(|_: &Parts| true),
            upgrade_rule: Arc::new(|_: &Parts| true),
            subscriber: Arc::new(NoSubscriber),
            on_connect: Arc::new(Passthrough),
            protocol: ProtocolSettings::default(),
            max_message_size: ServerSettings::default().max_message_size,
        }
    }

    /// Defaults with protocol policy and message limit taken from settings.
    pub fn from_settings(settings: &GqlWsSettings) -> Self {
        Self::new()
            .with_protocol(settings.protocol.clone())
            .with_max_message_size(settings.server.max_message_size)
    }

    /// Reject upgrades (with `403`) whose request fails `check`.
    #[must_use]
    pub fn with_check_origin(
        mut self,
        check: impl Fn(&Parts) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.check_origin = Arc::new(check);
        self
    }

    /// Send requests failing `rule` to the fallback handler instead of upgrading.
    #[must_use]
    pub fn with_upgrade_rule(
        mut self,
        rule: impl Fn(&Parts) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.upgrade_rule = Arc::new(rule);
        self
    }

    /// Install the query engine.
    #[must_use]
    pub fn with_subscriber(mut self, subscriber: impl Subscriber) -> Self {
        self.subscriber = Arc::new(subscriber);
        self
    }

    /// Install the bootstrap hook.
    #[must_use]
    pub fn with_on_connect(mut self, hook: impl ConnectHook) -> Self {
        self.on_connect = Arc::new(hook);
        self
    }

    /// Replace the protocol policy.
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolSettings) -> Self {
        self.protocol = protocol;
        self
    }

    /// Largest accepted WebSocket message.
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Current protocol policy.
    pub fn protocol(&self) -> &ProtocolSettings {
        &self.protocol
    }

    /// Current message limit.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("protocol", &self.protocol)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}
