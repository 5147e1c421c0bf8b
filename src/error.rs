use std::path::PathBuf;

use thiserror::Error;

use crate::packet::DecodeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Decode(#[from] DecodeError),

    #[error("send failed after {attempts} attempts")]
    TransportExhausted { attempts: u8 },

    #[error("no reply after {attempts} timeouts")]
    ReceiveTimeout { attempts: u8 },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("transfer needs more than 65535 blocks")]
    BlockOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;
