//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Talk to an XRPL server over a persistent WebSocket", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// WebSocket endpoint, overrides the configuration file
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Connection and response timeout in seconds
    #[arg(short, long, global = true)]
    pub timeout: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the server's `server_info` response
    ServerInfo,
    /// Send one JSON request and print the response
    Send {
        /// Request object, e.g. '{"command": "fee"}'
        json: String,
    },
    /// Stream ledger closes and transactions until interrupted
    Watch {
        /// Streams to subscribe to
        #[arg(long, value_delimiter = ',')]
        streams: Option<Vec<String>>,
        /// Accounts whose transactions should be streamed
        #[arg(long, value_delimiter = ',')]
        accounts: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from(["xrpl-ws", "server-info", "--server", "ws://localhost:6006", "-t", "2.5"]);
        assert!(matches!(cli.command, Commands::ServerInfo));
        assert_eq!(cli.server.as_deref(), Some("ws://localhost:6006"));
        assert_eq!(cli.timeout, Some(2.5));
    }

    #[test]
    fn test_watch_splits_comma_lists() {
        let cli = Cli::parse_from([
            "xrpl-ws",
            "watch",
            "--streams",
            "ledger,transactions",
            "--accounts",
            "rA,rB",
        ]);
        match cli.command {
            Commands::Watch { streams, accounts } => {
                assert_eq!(streams, Some(vec!["ledger".to_string(), "transactions".to_string()]));
                assert_eq!(accounts, vec!["rA".to_string(), "rB".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_send_takes_raw_json() {
        let cli = Cli::parse_from(["xrpl-ws", "send", r#"{"command":"fee"}"#]);
        match cli.command {
            Commands::Send { json } => assert_eq!(json, r#"{"command":"fee"}"#),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
