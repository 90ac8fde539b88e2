use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use mesh_transport::SocketConfig;

use crate::error::MeshError;
use crate::types::{DEFAULT_HISTORY_CAPACITY, DEFAULT_HUB_PORT};

/// Default wait for the first ready event in each loop iteration.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a [`MeshHub`](crate::MeshHub).
///
/// ```rust
/// use mesh_protocol::HubConfig;
///
/// let config = HubConfig::new()
///     .bind_addr("127.0.0.1:0")
///     .history_capacity(500)
///     .seed("claude_code", "core");
/// ```
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub(crate) bind_addr: String,
    pub(crate) history_capacity: usize,
    pub(crate) poll_interval: Duration,
    /// Static `(agent, group_name)` routes.
    pub(crate) seeds: Vec<(String, String)>,
    /// Record `from` → sending proxy on every message.
    pub(crate) learn_senders: bool,
    pub(crate) socket: SocketConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HubConfig {
    /// Defaults, with `MESH_HUB_ADDR` and `MESH_HISTORY_CAPACITY` applied
    /// when set. Explicit setters override both.
    pub fn new() -> Self {
        let bind_addr = std::env::var("MESH_HUB_ADDR")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("0.0.0.0:{DEFAULT_HUB_PORT}"));
        let history_capacity = std::env::var("MESH_HISTORY_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HISTORY_CAPACITY);

        Self {
            bind_addr,
            history_capacity,
            poll_interval: DEFAULT_POLL_INTERVAL,
            seeds: Vec::new(),
            learn_senders: false,
            socket: SocketConfig::new(),
        }
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Listen on all interfaces at `port`.
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr = format!("0.0.0.0:{port}");
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Pre-route `agent` to the proxy of `group`.
    pub fn seed(mut self, agent: impl Into<String>, group: impl Into<String>) -> Self {
        self.seeds.push((agent.into(), group.into()));
        self
    }

    /// Also learn routes from each message's `from` field. Off by default.
    pub fn learn_senders(mut self, enabled: bool) -> Self {
        self.learn_senders = enabled;
        self
    }

    pub fn socket(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    pub fn get_bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn get_history_capacity(&self) -> usize {
        self.history_capacity
    }
}

/// Parse an `agent=group` seed.
pub fn parse_seed(s: &str) -> Result<(String, String), MeshError> {
    let (agent, group) = s
        .split_once('=')
        .ok_or_else(|| MeshError::Config(format!("seed {s:?} is not agent=group")))?;
    let (agent, group) = (agent.trim(), group.trim());
    if agent.is_empty() || group.is_empty() {
        return Err(MeshError::Config(format!("seed {s:?} has an empty side")));
    }
    Ok((agent.to_string(), group.to_string()))
}

/// Configuration for a [`GroupProxy`](crate::GroupProxy).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub(crate) name: String,
    pub(crate) listen_addr: String,
    pub(crate) hub_addr: String,
    pub(crate) poll_interval: Duration,
    pub(crate) socket: SocketConfig,
}

impl ProxyConfig {
    /// Proxy for group `name` listening on all interfaces at `port`, with
    /// the hub on loopback at the default port.
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            listen_addr: format!("0.0.0.0:{port}"),
            hub_addr: format!("127.0.0.1:{DEFAULT_HUB_PORT}"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            socket: SocketConfig::new(),
        }
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn hub(mut self, host: &str, port: u16) -> Self {
        self.hub_addr = format!("{host}:{port}");
        self
    }

    pub fn hub_addr(mut self, addr: impl Into<String>) -> Self {
        self.hub_addr = addr.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn socket(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_hub_addr(&self) -> &str {
        &self.hub_addr
    }

    /// Reject configurations that cannot produce a usable proxy.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.name.is_empty() {
            return Err(MeshError::Config("proxy name must not be empty".into()));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(MeshError::Config(format!(
                "proxy name {:?} must not contain whitespace",
                self.name
            )));
        }
        if listens_on(&self.listen_addr, &self.hub_addr) {
            return Err(MeshError::Config(format!(
                "proxy listen address {} is the hub address",
                self.listen_addr
            )));
        }
        Ok(())
    }
}

/// True if a listener bound to `listen` would accept connections made to `target`.
/// Hostnames other than `localhost` compare as text.
fn listens_on(listen: &str, target: &str) -> bool {
    match (socket_addr(listen), socket_addr(target)) {
        (Some(listen), Some(target)) => {
            let (l, t) = (listen.ip(), target.ip());
            listen.port() == target.port()
                && (l == t
                    || (l.is_unspecified() && (t.is_loopback() || t.is_unspecified()))
                    || (l.is_loopback() && t.is_loopback()))
        }
        _ => listen == target,
    }
}

fn socket_addr(addr: &str) -> Option<SocketAddr> {
    if let Ok(parsed) = addr.parse() {
        return Some(parsed);
    }
    let (host, port) = addr.rsplit_once(':')?;
    if !host.eq_ignore_ascii_case("localhost") {
        return None;
    }
    Some(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_setters_override() {
        let config = HubConfig::new()
            .bind_addr("127.0.0.1:0")
            .history_capacity(0)
            .seed("claude_code", "core")
            .learn_senders(true);
        assert_eq!(config.get_bind_addr(), "127.0.0.1:0");
        assert_eq!(config.get_history_capacity(), 1);
        assert_eq!(config.seeds, vec![("claude_code".into(), "core".into())]);
        assert!(config.learn_senders);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn hub_port_binds_all_interfaces() {
        let config = HubConfig::new().port(7000);
        assert_eq!(config.get_bind_addr(), "0.0.0.0:7000");
    }

    #[test]
    fn proxy_defaults() {
        let config = ProxyConfig::new("core", 6001);
        assert_eq!(config.listen_addr, "0.0.0.0:6001");
        assert_eq!(config.get_hub_addr(), "127.0.0.1:5550");
        assert!(config.validate().is_ok());

        let config = config.hub("10.0.0.2", 6000);
        assert_eq!(config.get_hub_addr(), "10.0.0.2:6000");
    }

    #[test]
    fn proxy_validation() {
        assert!(ProxyConfig::new("", 6001).validate().is_err());
        assert!(ProxyConfig::new("my group", 6001).validate().is_err());
        let clash = ProxyConfig::new("core", 5550).listen_addr("127.0.0.1:5550");
        assert!(clash.validate().is_err());
    }

    #[test]
    fn wildcard_listener_on_the_hub_port_clashes() {
        // Default listen address is 0.0.0.0, default hub is 127.0.0.1:5550
        assert!(ProxyConfig::new("core", 5550).validate().is_err());
        assert!(ProxyConfig::new("core", 5550).hub("localhost", 5550).validate().is_err());
        assert!(ProxyConfig::new("core", 6001).hub("localhost", 6001).validate().is_err());

        assert!(ProxyConfig::new("core", 5550).hub("10.0.0.2", 5550).validate().is_ok());
        assert!(ProxyConfig::new("core", 6001).validate().is_ok());
        assert!(ProxyConfig::new("core", 5550).hub("hub.internal", 5550).validate().is_ok());
    }

    #[test]
    fn seeds_parse() {
        assert_eq!(
            parse_seed("claude_code=core").unwrap(),
            ("claude_code".to_string(), "core".to_string())
        );
        assert_eq!(parse_seed(" a = b ").unwrap(), ("a".to_string(), "b".to_string()));
        assert!(parse_seed("claude_code").is_err());
        assert!(parse_seed("=core").is_err());
        assert!(parse_seed("claude_code=").is_err());
    }
}
