//! Command-line interface of the demo driver.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use loop_bridge::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "loop-bridge",
    version,
    about = "Tick-driven TCP server and client driven from stdin commands"
)]
pub struct Cli {
    /// Configuration file; created with defaults if missing
    #[arg(short, long, value_name = "FILE", default_value = "loop-bridge.toml")]
    pub config: PathBuf,

    /// Force JSON log output
    #[arg(long)]
    pub json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server role
    Server {
        #[arg(short, long)]
        port: Option<u16>,
        /// Listen immediately instead of waiting for `activate`
        #[arg(long)]
        activate: bool,
        /// Shut down automatically after this many seconds
        #[arg(long, value_name = "SECS")]
        session_limit: Option<u64>,
    },
    /// Run the client role
    Client {
        /// IP literal of the server
        #[arg(short, long)]
        address: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl Cli {
    /// Folds command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        match &self.command {
            Command::Server {
                port,
                activate,
                session_limit,
            } => {
                if let Some(port) = port {
                    config.transport.port = *port;
                }
                if *activate {
                    config.host.activate_on_start = true;
                }
                if session_limit.is_some() {
                    config.host.session_limit_secs = *session_limit;
                }
            }
            Command::Client { address, port } => {
                if let Some(address) = address {
                    config.client.address = address.clone();
                }
                if let Some(port) = port {
                    config.transport.port = *port;
                }
            }
        }
    }
}

/// Parses whitespace separated hex bytes such as `01 02` or `0xff`.
pub fn parse_bytes(input: &str) -> Result<Vec<u8>, std::num::ParseIntError> {
    input
        .split_whitespace()
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u8::from_str_radix(digits, 16)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_overrides_apply() {
        let cli = Cli::parse_from([
            "loop-bridge",
            "--log-level",
            "debug",
            "server",
            "--port",
            "9000",
            "--activate",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.transport.port, 9000);
        assert!(config.host.activate_on_start);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn client_overrides_apply() {
        let cli = Cli::parse_from(["loop-bridge", "client", "--address", "10.0.0.2"]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.client.address, "10.0.0.2");
        assert_eq!(config.transport.port, 7777);
    }

    #[test]
    fn hex_bytes() {
        assert_eq!(parse_bytes("01 02").unwrap(), vec![1, 2]);
        assert_eq!(parse_bytes("0xff 0X10 a").unwrap(), vec![255, 16, 10]);
        assert!(parse_bytes("").unwrap().is_empty());
        assert!(parse_bytes("zz").is_err());
    }
}
