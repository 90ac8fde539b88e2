/// Central hub decision engine.
///
/// Takes one upstream frame `[proxy, destination, sender, payload]` and
/// returns a `HubAction` telling the runtime what to send. Owns the routing
/// table and history buffer. No I/O.
use bytes::Bytes;
use mesh_transport::{Multipart, SendOutcome};
use serde::Serialize;
use serde_json::Value;

use crate::history::HistoryBuffer;
use crate::table::RoutingTable;
use crate::types::Identity;

/// Frames in an upstream message as the hub's router socket delivers it.
pub const HUB_FRAME_PARTS: usize = 4;

/// What to do with an upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubAction {
    /// Send `frames` (`[target, destination, sender, payload]`) through the
    /// router socket.
    Forward {
        target: Identity,
        frames: Multipart,
        /// The destination's route was created by this message.
        learned: bool,
    },
    /// Malformed; nothing was recorded.
    Drop { reason: String },
}

/// Hub traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub received: u64,
    pub routed: u64,
    pub malformed: u64,
    pub learned: u64,
    pub delivered: u64,
    pub undeliverable: u64,
    pub queue_full: u64,
}

impl HubStats {
    /// Count what the transport did with a forwarded message.
    pub fn record_send(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Queued => self.delivered += 1,
            SendOutcome::UnknownPeer => self.undeliverable += 1,
            SendOutcome::QueueFull => self.queue_full += 1,
        }
    }
}

/// Everything the hub loop owns.
#[derive(Debug)]
pub struct HubState {
    table: RoutingTable,
    history: HistoryBuffer,
    learn_senders: bool,
    stats: HubStats,
}

impl HubState {
    pub fn new(table: RoutingTable, history_capacity: usize, learn_senders: bool) -> Self {
        Self {
            table,
            history: HistoryBuffer::new(history_capacity),
            learn_senders,
            stats: HubStats::default(),
        }
    }

    /// Process one upstream frame.
    ///
    /// Parsing happens before anything is recorded, and the payload is
    /// appended to history before the destination is resolved.
    pub fn handle_frame(&mut self, frames: Multipart) -> HubAction {
        self.stats.received += 1;

        if frames.len() != HUB_FRAME_PARTS {
            return self.malformed(format!(
                "expected {HUB_FRAME_PARTS} frames, got {}",
                frames.len()
            ));
        }
        let proxy = Identity::from(frames[0].clone());
        let destination = match std::str::from_utf8(&frames[1]) {
            Ok(d) if !d.is_empty() => d.to_string(),
            Ok(_) => return self.malformed("empty destination".into()),
            Err(_) => return self.malformed("destination is not UTF-8".into()),
        };

        let payload: Value = match serde_json::from_slice(&frames[3]) {
            Ok(v) => v,
            Err(e) => return self.malformed(format!("payload is not JSON: {e}")),
        };

        if self.learn_senders {
            if let Some(from) = payload.get("from").and_then(Value::as_str) {
                if self.table.learn_sender(from, &proxy) {
                    self.stats.learned += 1;
                }
            }
        }
        self.history.push(payload);

        let resolution = self.table.resolve(&destination, &proxy);
        if resolution.learned {
            self.stats.learned += 1;
        }
        self.stats.routed += 1;

        let mut out = frames;
        out[0] = resolution.target.to_frame();
        HubAction::Forward {
            target: resolution.target,
            frames: out,
            learned: resolution.learned,
        }
    }

    fn malformed(&mut self, reason: String) -> HubAction {
        self.stats.malformed += 1;
        HubAction::Drop { reason }
    }

    pub fn record_send(&mut self, outcome: SendOutcome) {
        self.stats.record_send(outcome);
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn stats(&self) -> HubStats {
        self.stats
    }
}

/// Build an upstream frame the way the hub's router socket presents it.
pub fn upstream_frame(proxy: &Identity, destination: &str, sender: &Identity, payload: &[u8]) -> Multipart {
    vec![
        proxy.to_frame(),
        Bytes::copy_from_slice(destination.as_bytes()),
        sender.to_frame(),
        Bytes::copy_from_slice(payload),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::group_identity;
    use serde_json::json;

    fn hub() -> HubState {
        HubState::new(RoutingTable::new(), 10_000, false)
    }

    fn ping(from: &str, to: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({"from": from, "to": to, "type": "request", "content": {"msg": "ping"}}))
            .unwrap()
    }

    #[test]
    fn unknown_destination_goes_back_to_sender_proxy() {
        let mut hub = hub();
        let core = group_identity("core");
        let frame = upstream_frame(&core, "bob", &Identity::from("alice"), &ping("alice", "bob"));

        match hub.handle_frame(frame) {
            HubAction::Forward { target, frames, learned } => {
                assert_eq!(target, core);
                assert!(learned);
                assert_eq!(&frames[0][..], b"group_core");
                assert_eq!(&frames[1][..], b"bob");
                assert_eq!(&frames[2][..], b"alice");
            }
            other => panic!("expected forward, got {other:?}"),
        }
        assert_eq!(hub.table().lookup("bob"), Some(&core));
        assert_eq!(hub.history().len(), 1);
        assert_eq!(hub.stats().learned, 1);
    }

    #[test]
    fn learned_route_is_authoritative() {
        let mut hub = hub();
        let core = group_identity("core");
        let field = group_identity("field");
        hub.handle_frame(upstream_frame(&core, "bob", &Identity::from("alice"), &ping("alice", "bob")));

        let action = hub.handle_frame(upstream_frame(&field, "bob", &Identity::from("carol"), &ping("carol", "bob")));
        assert!(matches!(action, HubAction::Forward { ref target, learned: false, .. } if *target == core));
    }

    #[test]
    fn invalid_json_has_no_side_effects() {
        let mut hub = hub();
        let core = group_identity("core");
        let action = hub.handle_frame(upstream_frame(&core, "bob", &Identity::from("alice"), b"{not json"));
        assert!(matches!(action, HubAction::Drop { .. }));
        assert_eq!(hub.history().len(), 0);
        assert!(hub.table().is_empty());
        assert_eq!(hub.stats().malformed, 1);

        let action = hub.handle_frame(upstream_frame(&core, "bob", &Identity::from("alice"), &ping("alice", "bob")));
        assert!(matches!(action, HubAction::Forward { .. }));
        assert_eq!(hub.history().len(), 1);
        assert_eq!(hub.stats().routed, 1);
    }

    #[test]
    fn wrong_frame_count_is_dropped() {
        let mut hub = hub();
        let action = hub.handle_frame(vec![Bytes::from_static(b"group_core"), Bytes::from_static(b"{}")]);
        assert!(matches!(action, HubAction::Drop { .. }));
        assert_eq!(hub.history().len(), 0);
    }

    #[test]
    fn empty_destination_is_dropped() {
        let mut hub = hub();
        let core = group_identity("core");
        let action = hub.handle_frame(upstream_frame(&core, "", &Identity::from("alice"), &ping("alice", "")));
        assert!(matches!(action, HubAction::Drop { .. }));
        assert!(hub.table().is_empty());
    }

    #[test]
    fn history_keeps_latest_ten_thousand() {
        let mut hub = hub();
        let core = group_identity("core");
        let sender = Identity::from("alice");
        for i in 0..10_001 {
            let payload = serde_json::to_vec(&json!({"from": "alice", "to": "bob", "n": i})).unwrap();
            hub.handle_frame(upstream_frame(&core, "bob", &sender, &payload));
        }
        assert_eq!(hub.history().len(), 10_000);
        assert_eq!(hub.history().iter().next().unwrap()["n"], 1);
        assert_eq!(hub.history().iter().last().unwrap()["n"], 10_000);
    }

    #[test]
    fn sender_learning_is_opt_in() {
        let core = group_identity("core");
        let field = group_identity("field");

        let mut literal = hub();
        literal.handle_frame(upstream_frame(&field, "carol", &Identity::from("bob"), &ping("bob", "carol")));
        assert_eq!(literal.table().lookup("bob"), None);

        let mut learning = HubState::new(RoutingTable::new(), 16, true);
        learning.handle_frame(upstream_frame(&field, "carol", &Identity::from("bob"), &ping("bob", "carol")));
        assert_eq!(learning.table().lookup("bob"), Some(&field));

        let action =
            learning.handle_frame(upstream_frame(&core, "bob", &Identity::from("alice"), &ping("alice", "bob")));
        assert!(matches!(action, HubAction::Forward { ref target, .. } if *target == field));
    }

    #[test]
    fn send_outcomes_are_counted() {
        let mut stats = HubStats::default();
        stats.record_send(SendOutcome::Queued);
        stats.record_send(SendOutcome::UnknownPeer);
        stats.record_send(SendOutcome::QueueFull);
        assert_eq!((stats.delivered, stats.undeliverable, stats.queue_full), (1, 1, 1));
    }
}
