// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

//! Master server packets.
//!
//! The exchange runs over TCP:
//!
//! 1. master sends `\basic\\secure\CHALLENGE`;
//! 2. client answers with [`Validate`];
//! 3. client sends [`ListRequest`];
//! 4. master streams `\ip\A.B.C.D:PORT` entries terminated by `\final\`.

use crate::cursor::CursorMut;
use crate::validate;
use crate::Error;

/// Master server challenge packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge<'a> {
    /// The secure challenge.
    pub secure: &'a [u8],
}

impl<'a> Challenge<'a> {
    /// Decode packet from `src`.
    pub fn decode(src: &'a [u8]) -> Result<Self, Error> {
        let secure = validate::extract_challenge(src);
        if secure.is_empty() {
            return Err(Error::MissingChallenge);
        }
        Ok(Self { secure })
    }

    /// Computes the answer to the challenge.
    pub fn validate(&self, handoff: &[u8]) -> String {
        validate::scramble(self.secure, handoff)
    }
}

/// Client answer to a [`Challenge`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validate<'a> {
    /// Game name.
    pub game: &'a str,
    /// Validation token computed from the challenge.
    pub token: &'a str,
}

impl<'a> Validate<'a> {
    /// Creates a new `Validate`.
    pub fn new(game: &'a str, token: &'a str) -> Self {
        Self { game, token }
    }

    /// Encode packet to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        CursorMut::new(buf)
            .put_key("gamename", self.game)
            .put_key("location", 0_u8)
            .put_key("validate", self.token)
            .put_final()
            .pos()
    }
}

/// Request for the game server addresses list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListRequest<'a> {
    /// Game name.
    pub game: &'a str,
}

impl<'a> ListRequest<'a> {
    /// Creates a new `ListRequest`.
    pub fn new(game: &'a str) -> Self {
        Self { game }
    }

    /// Encode packet to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        CursorMut::new(buf)
            .put_verb("list")
            .put_key("gamename", self.game)
            .put_final()
            .pos()
    }
}

/// Accumulates the game server list received in chunks.
#[derive(Clone, Debug, Default)]
pub struct ServerList {
    raw: Vec<u8>,
}

impl ServerList {
    /// Separator before each address.
    pub const IP: &'static [u8] = b"\\ip\\";
    /// End of the list.
    pub const FINAL: &'static [u8] = b"\\final\\";

    /// Creates a new empty `ServerList`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.raw.extend_from_slice(chunk);
    }

    /// Returns `true` if the terminator was received.
    pub fn is_complete(&self) -> bool {
        find(&self.raw, Self::FINAL).is_some()
    }

    /// Returns the number of received bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns received `ip:port` strings.
    ///
    /// Addresses are not validated.
    pub fn addresses(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = &self.raw[..];
        while !rest.is_empty() {
            let (n, skip) = match (find(rest, Self::IP), find(rest, Self::FINAL)) {
                (Some(a), Some(b)) if b < a => (b, Self::FINAL.len()),
                (Some(a), _) => (a, Self::IP.len()),
                (None, Some(b)) => (b, Self::FINAL.len()),
                (None, None) => (rest.len(), 0),
            };
            if n > 0 {
                out.push(String::from_utf8_lossy(&rest[..n]).into_owned());
            }
            rest = &rest[n + skip..];
        }
        out
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
