pub use mesh_transport::Identity;

use std::time::{SystemTime, UNIX_EPOCH};

/// Envelope `type` that marks a connection handshake. Never routed.
pub const HANDSHAKE_TYPE: &str = "handshake";

/// Well-known hub port.
pub const DEFAULT_HUB_PORT: u16 = 5550;

/// Default hub history size.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Default envelope priority.
pub const DEFAULT_PRIORITY: &str = "NORMAL";

/// Group Proxy Identity for a group name: `group_<name>`.
///
/// Stable for a proxy's lifetime; the hub routes to it.
pub fn group_identity(group_name: &str) -> Identity {
    Identity::from(format!("group_{group_name}"))
}

/// Current time in milliseconds since UNIX epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_identity_is_prefixed() {
        assert_eq!(group_identity("core"), Identity::from("group_core"));
        assert_ne!(group_identity("core"), group_identity("field"));
    }
}
