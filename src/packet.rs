use std::str;

use thiserror::Error;

use crate::BLOCK_SIZE;

const AUTH_PREFIX: &str = "AUTH:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TftpPacket {
    RRQ { filename: String, mode: String },
    WRQ { filename: String, mode: String },
    DATA { block: u16, data: Vec<u8> },
    ACK(u16),
    AUTH { username: String, password: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet too short: {len} bytes")]
    TooShort { len: usize },

    #[error("invalid opcode: {0}")]
    InvalidOpcode(u16),

    #[error("missing cstr terminator")]
    MissingTerminator,

    #[error("invalid text encoding")]
    InvalidEncoding,

    #[error("payload of {0} bytes exceeds block size")]
    PayloadTooLarge(usize),

    #[error("malformed auth request")]
    MalformedAuth,
}

/// A data block shorter than the block size ends the transfer.
pub fn is_final_block(payload_len: usize) -> bool {
    payload_len < BLOCK_SIZE
}

impl TftpPacket {
    pub fn opcode(&self) -> u16 {
        match self {
            TftpPacket::RRQ { .. } => 1,
            TftpPacket::WRQ { .. } => 2,
            TftpPacket::DATA { .. } => 3,
            TftpPacket::ACK(_) => 4,
            TftpPacket::AUTH { .. } => 5,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.opcode().to_be_bytes().to_vec();

        match self {
            TftpPacket::RRQ { filename, mode } | TftpPacket::WRQ { filename, mode } => {
                bytes.extend(filename.as_bytes());
                bytes.push(0);
                bytes.extend(mode.as_bytes());
                bytes.push(0);
            }
            TftpPacket::DATA { block, data } => {
                bytes.extend_from_slice(&block.to_be_bytes());
                bytes.extend_from_slice(data);
            }
            TftpPacket::ACK(block) => {
                bytes.extend_from_slice(&block.to_be_bytes());
            }
            TftpPacket::AUTH { username, password } => {
                bytes.extend_from_slice(AUTH_PREFIX.as_bytes());
                bytes.extend_from_slice(username.as_bytes());
                bytes.push(b':');
                bytes.extend_from_slice(password.as_bytes());
            }
        }
        bytes
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < 2 {
            return Err(DecodeError::TooShort { len: buf.len() });
        }

        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let min_len = match opcode {
            1..=4 => 4,
            5 => 2 + AUTH_PREFIX.len(),
            _ => return Err(DecodeError::InvalidOpcode(opcode)),
        };
        if buf.len() < min_len {
            return Err(DecodeError::TooShort { len: buf.len() });
        }

        let pkt = match opcode {
            1 | 2 => {
                let filename = read_cstr(&buf[2..])?;
                let mode = read_cstr(&buf[2 + filename.len() + 1..])?;
                if opcode == 1 {
                    TftpPacket::RRQ { filename, mode }
                } else {
                    TftpPacket::WRQ { filename, mode }
                }
            }
            3 => {
                let block = u16::from_be_bytes([buf[2], buf[3]]);
                let data = &buf[4..];
                if data.len() > BLOCK_SIZE {
                    return Err(DecodeError::PayloadTooLarge(data.len()));
                }
                TftpPacket::DATA {
                    block,
                    data: data.to_vec(),
                }
            }
            4 => TftpPacket::ACK(u16::from_be_bytes([buf[2], buf[3]])),
            _ => read_auth(&buf[2..])?,
        };

        Ok(pkt)
    }
}

// NUL-terminated string at the start of buf
fn read_cstr(buf: &[u8]) -> Result<String, DecodeError> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::MissingTerminator)?;
    let s = str::from_utf8(&buf[..pos])
        .map_err(|_| DecodeError::InvalidEncoding)?
        .to_string();
    Ok(s)
}

// "AUTH:<username>:<password>", password may itself contain ':'
fn read_auth(buf: &[u8]) -> Result<TftpPacket, DecodeError> {
    let text = str::from_utf8(buf).map_err(|_| DecodeError::InvalidEncoding)?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let (username, password) = text
        .strip_prefix(AUTH_PREFIX)
        .and_then(|creds| creds.split_once(':'))
        .ok_or(DecodeError::MalformedAuth)?;

    Ok(TftpPacket::AUTH {
        username: username.to_string(),
        password: password.to_string(),
    })
}
