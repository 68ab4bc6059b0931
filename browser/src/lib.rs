// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

//! Tactical Ops server discovery.
//!
//! Game server addresses are downloaded from master servers over TCP and
//! every address is queried over UDP with a bounded number of queries in
//! flight. Recognized servers are handed to a callback as they answer.

#![deny(unsafe_code)]

mod discovery;
mod launch;
mod master;
mod query;
mod settings;

pub mod maps;

use std::{io, path::PathBuf};

use thiserror::Error;
use tacops_protocol::Error as ProtocolError;

pub use crate::{
    discovery::{Discovery, DiscoveryBuilder, Summary, MAX_CONCURRENT},
    launch::{GameLauncher, LaunchError, ProcessLauncher},
    master::{download_server_list, MasterEndpoint, State, MASTER_TIMEOUT},
    maps::{MapCatalog, MapCatalogEntry},
    query::{Details, ServerQuery, UdpQuery, DETAILS_TIMEOUT, INFO_TIMEOUT, PACKET_GAP},
    settings::{
        parse_master_endpoints, validate_refresh_interval, Bookmarks, MemorySettings,
        SettingsProvider, MAX_REFRESH_INTERVAL, MIN_REFRESH_INTERVAL,
    },
};

pub use tacops_protocol as protocol;

/// The error type for discovery operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No answer within the time budget.
    #[error("Timed out")]
    Timeout,
    /// Socket level failure.
    #[error(transparent)]
    Transport(#[from] io::Error),
    /// Peer answered with something unexpected.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Settings value is out of range.
    #[error("Invalid settings: {0}")]
    Settings(String),
    /// Failed to start the game.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// Failed to parse the map catalog.
    #[error("Invalid map catalog: {0}")]
    Catalog(#[from] serde_json::Error),
    /// Failed to read the map catalog.
    #[error("Failed to read map catalog \"{}\": {source}", path.display())]
    CatalogFile {
        /// Catalog file path.
        path: PathBuf,
        /// The reason.
        source: io::Error,
    },
    /// A query task panicked.
    #[error("Query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Returns `true` if the operation timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
