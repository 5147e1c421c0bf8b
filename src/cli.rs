use anstyle::AnsiColor;
use clap::builder::styling::Styles;
use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Cyan.on_default())
    .placeholder(AnsiColor::Red.on_default());

#[derive(Parser, Debug)]
#[command(name = "tftp")]
#[command(about = "A TFTP client/server with credential handshake", long_about = None)]
#[command(styles = STYLES)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Timeout (ms)
    #[arg(short, long, global = true, default_value_t = 10000)]
    pub timeout: u64,

    /// Max retries
    #[arg(short, long, global = true, default_value_t = 5)]
    pub retry: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve files from a directory
    Server(ServerArgs),
    /// Download a file from the server
    Get(TransferArgs),
    /// Upload a file to the server
    Put(TransferArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Listen ip
    #[arg(short, long, default_value = "0.0.0.0")]
    pub ip: IpAddr,

    /// Listen port
    #[arg(short, long, default_value_t = crate::DEF_PORT)]
    pub port: u16,

    /// Work directory
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Credentials file, one `username:password` per line
    #[arg(short, long, default_value = "credentials.txt")]
    pub credentials: PathBuf,

    /// Re-send a block when its ACK carries another block number
    #[arg(long)]
    pub strict_ack: bool,
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Server host
    pub server: String,

    /// File name
    pub filename: String,

    /// Server port
    #[arg(short, long, default_value_t = crate::DEF_PORT)]
    pub port: u16,

    /// Local directory
    #[arg(short, long, default_value = "client_files")]
    pub directory: PathBuf,

    /// Username, prompted when absent
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password, prompted when absent
    #[arg(long)]
    pub password: Option<String>,
}

impl Cli {
    pub fn config(&self) -> Config {
        let config = Config::new(Duration::from_millis(self.timeout), self.retry);
        match &self.command {
            Command::Server(args) => config.with_strict_ack(args.strict_ack),
            _ => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["tftp", "server"]);
        let Command::Server(args) = &cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.port, 1069);
        assert_eq!(args.credentials, PathBuf::from("credentials.txt"));

        let config = cli.config();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 5);
        assert!(!config.strict_ack);
    }

    #[test]
    fn transfer_args() {
        let cli = Cli::parse_from([
            "tftp", "get", "localhost", "a.bin", "-u", "alice", "--password", "secret", "-t", "500",
        ]);
        assert_eq!(cli.timeout, 500);
        let Command::Get(args) = cli.command else {
            panic!("expected get command");
        };
        assert_eq!(args.server, "localhost");
        assert_eq!(args.filename, "a.bin");
        assert_eq!(args.user.as_deref(), Some("alice"));
        assert_eq!(args.password.as_deref(), Some("secret"));
        assert_eq!(args.directory, PathBuf::from("client_files"));
    }

    #[test]
    fn strict_ack_flag() {
        let cli = Cli::parse_from(["tftp", "server", "--strict-ack"]);
        assert!(cli.config().strict_ack);
    }
}
