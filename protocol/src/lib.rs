// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

#![deny(missing_docs)]

//! Tactical Ops protocol between clients, game servers and masters.
//!
//! Both the master server list exchange and the game server status queries
//! use the Unreal flavour of the GameSpy key/value format: `\key\value` pairs
//! terminated by a `\final\` key.

mod cursor;

pub mod game;
pub mod master;
pub mod server;
pub mod types;
pub mod validate;

pub use cursor::{decode, encode, Cursor, CursorMut, Decoded, GetKeyValue, PutKeyValue};
pub use game::Query;
pub use server::{GameVariant, Player, ServerAddress, ServerRecord};

use thiserror::Error;

/// Game name sent to master servers.
pub const GAME_NAME: &str = "ut";

/// Secret key shared with master servers used to answer the `secure` challenge.
pub const HANDOFF_KEY: &[u8] = b"Z5Nfb0";

/// Sentinel round trip time for servers that did not answer.
pub const UNKNOWN_PING: u32 = 999;

/// The error type for decoding and encoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Failed to decode a packet.
    #[error("Invalid packet")]
    InvalidPacket,
    /// Master server did not send a usable challenge.
    #[error("Invalid secure challenge")]
    MissingChallenge,
    /// Server answered but is not one of the supported game variants.
    #[error("Unsupported game type \"{0}\"")]
    UnsupportedGame(String),
    /// Server address is not `host:port`.
    #[error("Invalid server address \"{0}\"")]
    InvalidAddress(String),
    /// Port is not a number or out of the allowed range.
    #[error("Invalid port number \"{0}\"")]
    InvalidPort(String),
}
