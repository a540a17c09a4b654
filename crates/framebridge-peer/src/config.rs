use std::time::Duration;

use framebridge_frame::{FrameConfig, WireFormat};

use crate::error::{PeerError, Result};

/// Flush interval used when none is configured.
pub const DEFAULT_GATHER: Duration = Duration::from_millis(50);

/// Lowest flush interval an endpoint will honor.
pub const MIN_GATHER: Duration = Duration::from_millis(10);

/// Highest flush interval an endpoint will honor.
pub const MAX_GATHER: Duration = Duration::from_secs(3600);

/// How send targets are discovered from the root context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Discovery {
    /// Every context in the tree, root first, breadth-first.
    #[default]
    BroadcastAll,
    /// The root plus the contexts tagged as relays of their parent.
    RelayOnly,
}

/// What happens when a second handler is registered for a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerPolicy {
    /// The newest registration replaces the previous ones.
    #[default]
    Replace,
    /// All registrations are kept and invoked in registration order.
    Multicast,
}

/// Endpoint construction options.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Debugging identifier stamped on outgoing requests.
    pub tag: Option<String>,
    /// Scoping domain; batches from other domains are ignored.
    pub domain: String,
    /// Minimum batch flush interval. Clamped to [`MIN_GATHER`]..=[`MAX_GATHER`].
    pub gather: Duration,
    pub discovery: Discovery,
    pub wire: WireFormat,
    pub handlers: HandlerPolicy,
    /// Client only: fail requests still pending after this long. `None` waits forever.
    pub request_timeout: Option<Duration>,
    pub frame: FrameConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            tag: None,
            domain: String::new(),
            gather: DEFAULT_GATHER,
            discovery: Discovery::default(),
            wire: WireFormat::default(),
            handlers: HandlerPolicy::default(),
            request_timeout: None,
            frame: FrameConfig::default(),
        }
    }
}

impl EndpointConfig {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the flush interval, clamped to [`MIN_GATHER`]..=[`MAX_GATHER`].
    pub fn with_gather(mut self, gather: Duration) -> Self {
        self.gather = clamp_gather(gather);
        self
    }

    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_wire(mut self, wire: WireFormat) -> Self {
        self.wire = wire;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerPolicy) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_domain(self.wire, &self.domain)
    }
}

/// Keep `gather` within [`MIN_GATHER`]..=[`MAX_GATHER`].
pub fn clamp_gather(gather: Duration) -> Duration {
    gather.clamp(MIN_GATHER, MAX_GATHER)
}

pub(crate) fn check_domain(wire: WireFormat, domain: &str) -> Result<()> {
    if wire == WireFormat::Legacy && !domain.is_empty() {
        return Err(PeerError::Config(format!(
            "legacy wire format cannot carry domain '{domain}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_is_floored() {
        let cfg = EndpointConfig::default().with_gather(Duration::from_millis(1));
        assert_eq!(cfg.gather, MIN_GATHER);

        let cfg = EndpointConfig::default().with_gather(Duration::from_secs(2));
        assert_eq!(cfg.gather, Duration::from_secs(2));

        let cfg = EndpointConfig::default().with_gather(Duration::MAX);
        assert_eq!(cfg.gather, MAX_GATHER);
    }

    #[test]
    fn legacy_wire_rejects_domain() {
        let cfg = EndpointConfig::default()
            .with_wire(WireFormat::Legacy)
            .with_domain("a");
        assert!(matches!(cfg.validate(), Err(PeerError::Config(_))));

        let cfg = EndpointConfig::default().with_wire(WireFormat::Legacy);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn defaults_match_protocol() {
        let cfg = EndpointConfig::default();
        assert_eq!(cfg.gather, DEFAULT_GATHER);
        assert_eq!(cfg.discovery, Discovery::BroadcastAll);
        assert_eq!(cfg.handlers, HandlerPolicy::Replace);
        assert!(cfg.request_timeout.is_none());
        assert!(cfg.domain.is_empty());
    }
}
