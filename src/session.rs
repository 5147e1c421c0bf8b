use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::packet::is_final_block;
use crate::BLOCK_SIZE;

/// Receiving side of one transfer, advanced one block at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingBlock(u16),
    Writing(u16),
    Done,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    peer: Option<SocketAddr>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Peer is pinned by the first accepted block.
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingBlock(1),
            peer: None,
        }
    }

    pub fn with_peer(peer: SocketAddr) -> Self {
        Self {
            state: SessionState::AwaitingBlock(1),
            peer: Some(peer),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn expected(&self) -> Option<u16> {
        match self.state {
            SessionState::AwaitingBlock(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Done | SessionState::Aborted)
    }

    /// Returns false, leaving the state untouched, for a block that is not
    /// the expected one or that comes from another peer.
    pub fn accept(&mut self, block: u16, from: SocketAddr) -> bool {
        let SessionState::AwaitingBlock(expected) = self.state else {
            return false;
        };
        if block != expected || self.peer.is_some_and(|peer| peer != from) {
            return false;
        }
        self.peer = Some(from);
        self.state = SessionState::Writing(block);
        true
    }

    /// Marks the accepted block as stored.
    pub fn written(&mut self, payload_len: usize) -> Result<SessionState> {
        let SessionState::Writing(block) = self.state else {
            return Ok(self.state);
        };
        self.state = if is_final_block(payload_len) {
            SessionState::Done
        } else {
            SessionState::AwaitingBlock(block.checked_add(1).ok_or(Error::BlockOverflow)?)
        };
        Ok(self.state)
    }

    pub fn abort(&mut self) {
        self.state = SessionState::Aborted;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub blocks: u32,
    pub bytes: u64,
    pub acks: u32,
}

/// Splits `data` into blocks. The last block is always shorter than
/// `BLOCK_SIZE`, so an exact multiple ends with an empty block.
pub fn segment(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let tail = (data.len() % BLOCK_SIZE == 0).then_some(&data[data.len()..]);
    data.chunks(BLOCK_SIZE).chain(tail)
}

/// Joins the last component of `filename` onto `root`.
pub fn resolve_path(root: &Path, filename: &str) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| Error::InvalidFilename(filename.to_string()))?;
    Ok(root.join(name))
}
