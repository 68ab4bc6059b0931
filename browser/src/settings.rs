// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::{collections::BTreeSet, path::PathBuf};

use log::warn;
use tacops_protocol::GameVariant;

use crate::{master::MasterEndpoint, Error};

/// Shortest automatic refresh interval in seconds.
pub const MIN_REFRESH_INTERVAL: u32 = 30;
/// Longest automatic refresh interval in seconds.
pub const MAX_REFRESH_INTERVAL: u32 = 600;

/// Persistent user settings.
pub trait SettingsProvider {
    /// Master servers, one `host:port` per line.
    fn master_servers(&self) -> String;
    fn set_master_servers(&mut self, value: String);

    fn close_on_join(&self) -> bool;
    fn set_close_on_join(&mut self, value: bool);

    /// Automatic refresh interval in seconds, zero disables it.
    fn auto_refresh_interval(&self) -> u32;
    /// Fails if `secs` is not zero and out of the allowed range.
    fn set_auto_refresh_interval(&mut self, secs: u32) -> Result<(), Error>;

    fn dark_mode(&self) -> bool;
    fn set_dark_mode(&mut self, value: bool);

    /// Path to the game executable of a variant.
    fn game_path(&self, variant: GameVariant) -> Option<PathBuf>;
    /// Fails for [`GameVariant::Unsupported`].
    fn set_game_path(&mut self, variant: GameVariant, path: PathBuf) -> Result<(), Error>;

    /// Favorite servers, comma separated `ip:port` keys.
    fn favorite_servers(&self) -> String;
    fn set_favorite_servers(&mut self, value: String);

    /// Ignored servers, comma separated `ip:port` keys.
    fn ignored_servers(&self) -> String;
    fn set_ignored_servers(&mut self, value: String);

    /// Writes settings to the storage.
    fn save(&mut self) -> Result<(), Error>;

    /// Returns parsed master servers.
    fn master_endpoints(&self) -> Vec<MasterEndpoint> {
        parse_master_endpoints(&self.master_servers())
    }
}

/// Parses newline separated `host:port` lines.
///
/// Empty and malformed lines are skipped.
pub fn parse_master_endpoints(text: &str) -> Vec<MasterEndpoint> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                warn!("skip master server \"{line}\": {e}");
                None
            }
        })
        .collect()
}

/// Checks the automatic refresh interval.
pub fn validate_refresh_interval(secs: u32) -> Result<u32, Error> {
    if secs == 0 || (MIN_REFRESH_INTERVAL..=MAX_REFRESH_INTERVAL).contains(&secs) {
        Ok(secs)
    } else {
        Err(Error::Settings(format!(
            "refresh interval must be 0 or {MIN_REFRESH_INTERVAL}..{MAX_REFRESH_INTERVAL} seconds, got {secs}"
        )))
    }
}

/// Settings kept in memory only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySettings {
    pub master_servers: String,
    pub close_on_join: bool,
    pub auto_refresh_interval: u32,
    pub dark_mode: bool,
    pub to220: Option<PathBuf>,
    pub to340: Option<PathBuf>,
    pub to350: Option<PathBuf>,
    pub favorite_servers: String,
    pub ignored_servers: String,
    /// Number of [`save`](SettingsProvider::save) calls.
    pub saved: usize,
}

impl SettingsProvider for MemorySettings {
    fn master_servers(&self) -> String {
        self.master_servers.clone()
    }

    fn set_master_servers(&mut self, value: String) {
        self.master_servers = value;
    }

    fn close_on_join(&self) -> bool {
        self.close_on_join
    }

    fn set_close_on_join(&mut self, value: bool) {
        self.close_on_join = value;
    }

    fn auto_refresh_interval(&self) -> u32 {
        self.auto_refresh_interval
    }

    fn set_auto_refresh_interval(&mut self, secs: u32) -> Result<(), Error> {
        self.auto_refresh_interval = validate_refresh_interval(secs)?;
        Ok(())
    }

    fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    fn set_dark_mode(&mut self, value: bool) {
        self.dark_mode = value;
    }

    fn game_path(&self, variant: GameVariant) -> Option<PathBuf> {
        match variant {
            GameVariant::TO220 => self.to220.clone(),
            GameVariant::TO340 => self.to340.clone(),
            GameVariant::TO350 => self.to350.clone(),
            GameVariant::Unsupported => None,
        }
    }

    fn set_game_path(&mut self, variant: GameVariant, path: PathBuf) -> Result<(), Error> {
        let slot = match variant {
            GameVariant::TO220 => &mut self.to220,
            GameVariant::TO340 => &mut self.to340,
            GameVariant::TO350 => &mut self.to350,
            GameVariant::Unsupported => {
                return Err(Error::Settings("unknown game version".to_owned()))
            }
        };
        *slot = Some(path);
        Ok(())
    }

    fn favorite_servers(&self) -> String {
        self.favorite_servers.clone()
    }

    fn set_favorite_servers(&mut self, value: String) {
        self.favorite_servers = value;
    }

    fn ignored_servers(&self) -> String {
        self.ignored_servers.clone()
    }

    fn set_ignored_servers(&mut self, value: String) {
        self.ignored_servers = value;
    }

    fn save(&mut self) -> Result<(), Error> {
        self.saved += 1;
        Ok(())
    }
}

fn split_list(s: &str) -> BTreeSet<String> {
    s.split(',')
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .map(str::to_owned)
        .collect()
}

fn join_list(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Favorite and ignored servers stored in settings.
pub struct Bookmarks<S> {
    settings: S,
    favorites: BTreeSet<String>,
    ignored: BTreeSet<String>,
}

impl<S: SettingsProvider> Bookmarks<S> {
    pub fn new(settings: S) -> Self {
        let favorites = split_list(&settings.favorite_servers());
        let ignored = split_list(&settings.ignored_servers());
        Self {
            settings,
            favorites,
            ignored,
        }
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    pub fn into_inner(self) -> S {
        self.settings
    }

    pub fn favorites(&self) -> impl Iterator<Item = &str> {
        self.favorites.iter().map(String::as_str)
    }

    pub fn ignored(&self) -> impl Iterator<Item = &str> {
        self.ignored.iter().map(String::as_str)
    }

    pub fn is_favorite(&self, key: &str) -> bool {
        self.favorites.contains(key)
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignored.contains(key)
    }

    /// Adds or removes a favorite server and saves settings.
    ///
    /// Returns `true` if the server is a favorite now.
    pub fn toggle_favorite(&mut self, key: &str) -> Result<bool, Error> {
        let added = toggle(&mut self.favorites, key);
        self.settings.set_favorite_servers(join_list(&self.favorites));
        self.settings.save()?;
        Ok(added)
    }

    /// Adds or removes an ignored server and saves settings.
    ///
    /// Returns `true` if the server is ignored now.
    pub fn toggle_ignored(&mut self, key: &str) -> Result<bool, Error> {
        let added = toggle(&mut self.ignored, key);
        self.settings.set_ignored_servers(join_list(&self.ignored));
        self.settings.save()?;
        Ok(added)
    }
}

fn toggle(set: &mut BTreeSet<String>, key: &str) -> bool {
    if set.remove(key) {
        false
    } else {
        set.insert(key.to_owned());
        true
    }
}
