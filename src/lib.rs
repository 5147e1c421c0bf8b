mod auth;
mod cli;
mod client;
mod config;
mod error;
mod packet;
mod server;
mod session;
mod transport;

pub use crate::auth::{AuthStatus, Authenticator, Credentials};
pub use crate::cli::{Cli, Command, ServerArgs, TransferArgs};
pub use crate::client::Client;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::packet::{is_final_block, DecodeError, TftpPacket};
pub use crate::server::{Served, Server};
pub use crate::session::{resolve_path, segment, Session, SessionState, TransferReport};
pub use crate::transport::{recv_timeout, send_with_retry, Datagram};

pub const DEF_PORT: u16 = 1069; // registered TFTP port is 69
pub const BLOCK_SIZE: usize = 512; // RFC 1350
pub const MAX_PACKET_SIZE: usize = 4 + BLOCK_SIZE;

pub const DEF_MODE: &str = "octet";
pub const DEF_TIMEOUT_SEC: u64 = 10;
pub const MAX_RETRY_COUNT: u8 = 5;
