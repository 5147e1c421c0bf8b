//! Credential lookup for the auth handshake.
//!
//! Credentials travel in plain text and are compared with plain equality.
//! This is not a security boundary. The handshake only talks to the
//! [`Authenticator`] trait, so a hashed store can replace [`Credentials`]
//! without touching the wire format.

use std::collections::HashMap;
use std::io;
use std::path::Path;

const AUTH_SUCCESS: &str = "AUTH_SUCCESS";
const AUTH_FAILED: &str = "AUTH_FAILED";

pub trait Authenticator: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Username to password map, built once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    entries: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a `username:password` per line file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Lines that do not split into exactly two fields are skipped.
    /// Trailing empty fields are dropped first, so `bob:` is one field and
    /// `alice:secret:` is two.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let mut parts: Vec<&str> = line.split(':').collect();
                while parts.last().is_some_and(|part| part.is_empty()) {
                    parts.pop();
                }
                match parts.as_slice() {
                    [user, pass] => Some((user.trim().to_string(), pass.trim().to_string())),
                    _ => None,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<U: Into<String>, P: Into<String>> FromIterator<(U, P)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (U, P)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(user, pass)| (user.into(), pass.into()))
                .collect(),
        }
    }
}

impl Authenticator for Credentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.entries
            .get(username)
            .is_some_and(|expected| expected == password)
    }
}

/// Reply to an auth request. Sent as bare ASCII, without an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Success,
    Failed,
}

impl AuthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStatus::Success => AUTH_SUCCESS,
            AuthStatus::Failed => AUTH_FAILED,
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Anything but an exact `AUTH_SUCCESS` after trimming is a failure.
    pub fn from_reply(buf: &[u8]) -> Self {
        match std::str::from_utf8(buf) {
            Ok(text) if text.trim() == AUTH_SUCCESS => AuthStatus::Success,
            _ => AuthStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == AuthStatus::Success
    }
}

impl From<bool> for AuthStatus {
    fn from(ok: bool) -> Self {
        if ok {
            AuthStatus::Success
        } else {
            AuthStatus::Failed
        }
    }
}
