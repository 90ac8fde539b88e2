use std::collections::HashMap;

use crate::types::{group_identity, Identity};

/// Where the hub decided to send a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Group Proxy Identity to forward to.
    pub target: Identity,
    /// True when this lookup created the table entry.
    pub learned: bool,
}

/// Agent name → Group Proxy Identity.
///
/// A best-effort cache: an entry reflects the first group that traffic for
/// the agent was seen from and may be stale. At most one entry per agent.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Identity>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with static `(agent, group_name)` assignments.
    pub fn with_seeds<I, A, G>(seeds: I) -> Self
    where
        I: IntoIterator<Item = (A, G)>,
        A: Into<String>,
        G: AsRef<str>,
    {
        let routes = seeds
            .into_iter()
            .map(|(agent, group)| (agent.into(), group_identity(group.as_ref())))
            .collect();
        Self { routes }
    }

    pub fn lookup(&self, agent: &str) -> Option<&Identity> {
        self.routes.get(agent)
    }

    /// Resolve a destination, falling back to the sender's own proxy.
    ///
    /// An unknown destination is assumed to live behind `sender` and that
    /// guess is recorded. Existing entries are never overwritten here.
    pub fn resolve(&mut self, destination: &str, sender: &Identity) -> Resolution {
        if let Some(target) = self.routes.get(destination) {
            return Resolution {
                target: target.clone(),
                learned: false,
            };
        }
        self.routes.insert(destination.to_string(), sender.clone());
        Resolution {
            target: sender.clone(),
            learned: true,
        }
    }

    /// Record that `agent` sent traffic through `proxy`.
    ///
    /// Overwrites any existing entry. Returns true if the table changed.
    pub fn learn_sender(&mut self, agent: &str, proxy: &Identity) -> bool {
        if agent.is_empty() {
            return false;
        }
        match self.routes.get(agent) {
            Some(current) if current == proxy => false,
            _ => {
                self.routes.insert(agent.to_string(), proxy.clone());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// All entries, sorted by agent name.
    pub fn routes(&self) -> Vec<(String, Identity)> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(agent, proxy)| (agent.clone(), proxy.clone()))
            .collect();
        routes.sort();
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Identity {
        group_identity("core")
    }

    fn field() -> Identity {
        group_identity("field")
    }

    #[test]
    fn unknown_destination_learns_sender_group() {
        let mut table = RoutingTable::new();
        let res = table.resolve("bob", &core());
        assert_eq!(res.target, core());
        assert!(res.learned);
        assert_eq!(table.lookup("bob"), Some(&core()));
    }

    #[test]
    fn known_destination_is_not_overwritten() {
        let mut table = RoutingTable::new();
        table.resolve("bob", &core());

        let res = table.resolve("bob", &field());
        assert_eq!(res.target, core());
        assert!(!res.learned);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn seeds_use_group_identity() {
        let table = RoutingTable::with_seeds([("claude_code", "core"), ("gemini_cli", "core")]);
        assert_eq!(table.lookup("claude_code"), Some(&core()));
        assert_eq!(table.lookup("gemini_cli"), Some(&core()));
        assert_eq!(table.lookup("bob"), None);
    }

    #[test]
    fn seeded_entry_wins_over_heuristic() {
        let mut table = RoutingTable::with_seeds([("bob", "field")]);
        let res = table.resolve("bob", &core());
        assert_eq!(res.target, field());
        assert!(!res.learned);
    }

    #[test]
    fn learn_sender_overwrites() {
        let mut table = RoutingTable::new();
        table.resolve("bob", &core());
        assert!(table.learn_sender("bob", &field()));
        assert!(!table.learn_sender("bob", &field()));
        assert_eq!(table.lookup("bob"), Some(&field()));
        assert!(!table.learn_sender("", &field()));
    }

    #[test]
    fn routes_are_sorted() {
        let mut table = RoutingTable::new();
        table.resolve("zed", &core());
        table.resolve("amy", &field());
        let names: Vec<_> = table.routes().into_iter().map(|(agent, _)| agent).collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }
}
