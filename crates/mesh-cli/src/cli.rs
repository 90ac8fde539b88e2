//! Command-line arguments for the three binaries.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mesh_protocol::{HubConfig, ProxyConfig, DEFAULT_HUB_PORT};

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Directory for the component log file.
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Log to stderr only.
    #[arg(long)]
    pub no_log_file: bool,
}

impl LogArgs {
    pub fn dir(&self) -> Option<&std::path::Path> {
        (!self.no_log_file).then_some(self.log_dir.as_path())
    }
}

#[derive(Parser, Debug)]
#[command(name = "mesh-hub", about = "Central hub of the synaptic mesh")]
pub struct HubArgs {
    /// Listening port (all interfaces). Defaults to MESH_HUB_ADDR or 5550.
    #[arg(long)]
    pub port: Option<u16>,

    /// Number of forwarded payloads kept for diagnostics.
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Static route, as agent=group. Repeatable.
    #[arg(long = "seed", value_parser = parse_seed_arg)]
    pub seeds: Vec<(String, String)>,

    /// Also learn each sender's group from its `from` field.
    #[arg(long)]
    pub learn_senders: bool,

    #[command(flatten)]
    pub log: LogArgs,
}

impl HubArgs {
    pub fn config(&self) -> HubConfig {
        let mut config = HubConfig::new().learn_senders(self.learn_senders);
        if let Some(port) = self.port {
            config = config.port(port);
        }
        if let Some(capacity) = self.history_capacity {
            config = config.history_capacity(capacity);
        }
        for (agent, group) in &self.seeds {
            config = config.seed(agent.clone(), group.clone());
        }
        config
    }
}

fn parse_seed_arg(s: &str) -> Result<(String, String), String> {
    mesh_protocol::parse_seed(s).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "mesh-proxy", about = "Group proxy bridging local agents to the hub")]
pub struct ProxyArgs {
    /// Group name.
    #[arg(long)]
    pub name: String,

    /// Local port agents connect to.
    #[arg(long)]
    pub port: u16,

    /// Hub host.
    #[arg(long, default_value = "127.0.0.1")]
    pub root_host: String,

    /// Hub port.
    #[arg(long, default_value_t = DEFAULT_HUB_PORT)]
    pub root_port: u16,

    #[command(flatten)]
    pub log: LogArgs,
}

impl ProxyArgs {
    pub fn config(&self) -> ProxyConfig {
        ProxyConfig::new(self.name.clone(), self.port).hub(&self.root_host, self.root_port)
    }

    pub fn log_file(&self) -> String {
        format!("mesh-proxy-{}.log", self.name)
    }
}

#[derive(Parser, Debug)]
#[command(name = "mesh-agent", about = "Minimal agent: send one message or print deliveries")]
pub struct AgentArgs {
    /// Agent name, also used as the connection identity.
    #[arg(long)]
    pub name: String,

    /// Group proxy port.
    #[arg(long)]
    pub port: u16,

    /// Group proxy host.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[command(subcommand)]
    pub command: AgentCommand,
}

impl AgentArgs {
    pub fn proxy_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Send one message.
    Send {
        /// Destination agent.
        #[arg(long)]
        to: String,

        /// Message type.
        #[arg(long = "type", default_value = "request")]
        msg_type: String,

        /// Content as JSON. Text that is not JSON is sent as a string.
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,

        /// Read content from a JSON file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Wait this long for a reply before exiting (ms).
        #[arg(long, default_value = "500")]
        wait_ms: u64,
    },

    /// Print every delivery until interrupted.
    Listen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_requires_name_and_port() {
        assert!(ProxyArgs::try_parse_from(["mesh-proxy", "--name", "core"]).is_err());

        let args = ProxyArgs::try_parse_from(["mesh-proxy", "--name", "core", "--port", "6001"]).unwrap();
        assert_eq!(args.root_host, "127.0.0.1");
        assert_eq!(args.root_port, 5550);
        assert_eq!(args.log_file(), "mesh-proxy-core.log");
        assert_eq!(args.config().get_hub_addr(), "127.0.0.1:5550");
    }

    #[test]
    fn proxy_root_override() {
        let args = ProxyArgs::try_parse_from([
            "mesh-proxy",
            "--name",
            "field",
            "--port",
            "6002",
            "--root-host",
            "10.1.1.1",
            "--root-port",
            "7000",
        ])
        .unwrap();
        assert_eq!(args.config().get_hub_addr(), "10.1.1.1:7000");
    }

    #[test]
    fn hub_needs_no_flags() {
        let args = HubArgs::try_parse_from(["mesh-hub"]).unwrap();
        assert!(args.seeds.is_empty());
        assert!(!args.learn_senders);
        assert_eq!(args.log.dir(), Some(std::path::Path::new("logs")));
    }

    #[test]
    fn hub_seeds_and_port() {
        let args = HubArgs::try_parse_from([
            "mesh-hub",
            "--port",
            "6000",
            "--seed",
            "claude_code=core",
            "--seed",
            "gemini_cli=core",
            "--no-log-file",
        ])
        .unwrap();
        assert_eq!(args.seeds.len(), 2);
        assert_eq!(args.config().get_bind_addr(), "0.0.0.0:6000");
        assert_eq!(args.log.dir(), None);

        assert!(HubArgs::try_parse_from(["mesh-hub", "--seed", "nogroup"]).is_err());
    }

    #[test]
    fn agent_send_parses() {
        let args = AgentArgs::try_parse_from([
            "mesh-agent", "--name", "alice", "--port", "6001", "send", "--to", "bob", "--content",
            r#"{"msg":"ping"}"#,
        ])
        .unwrap();
        assert_eq!(args.proxy_addr(), "127.0.0.1:6001");
        match args.command {
            AgentCommand::Send { to, msg_type, content, .. } => {
                assert_eq!(to, "bob");
                assert_eq!(msg_type, "request");
                assert_eq!(content.as_deref(), Some(r#"{"msg":"ping"}"#));
            }
            AgentCommand::Listen => panic!("expected send"),
        }
    }
}
