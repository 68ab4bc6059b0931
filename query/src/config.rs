// SPDX-License-Identifier: GPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, LevelFilter};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use tacops_browser::{
    protocol::GameVariant, validate_refresh_interval, Error as BrowserError, SettingsProvider,
};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/tacops.toml";

pub const DEFAULT_MASTERS: &[&str] = &["master.333networks.com:28900", "master.openspy.net:28900"];
pub const DEFAULT_MASTER_TIMEOUT: u64 = 2000;
pub const DEFAULT_SERVER_TIMEOUT: u64 = 1500;
pub const DEFAULT_PACKET_GAP: u64 = 500;
pub const DEFAULT_DETAILS_TIMEOUT: u64 = 3000;
pub const DEFAULT_MAX_CONCURRENT: usize = tacops_browser::MAX_CONCURRENT;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    TomlWrite(#[from] toml::ser::Error),
    #[error("Failed to read \"{}\": {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub lists: ListsConfig,
}

#[derive(Deserialize, Serialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    #[serde(deserialize_with = "deserialize_log_level")]
    #[serde(serialize_with = "serialize_log_level")]
    pub level: LevelFilter,
    #[serde(default)]
    pub time: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            time: false,
        }
    }
}

/// Timeouts are in milliseconds.
#[derive(Deserialize, Serialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    #[serde(default = "default_masters")]
    pub masters: Vec<String>,
    #[serde(default = "default_master_timeout")]
    pub master_timeout: u64,
    #[serde(default = "default_server_timeout")]
    pub server_timeout: u64,
    #[serde(default = "default_packet_gap")]
    pub packet_gap: u64,
    #[serde(default = "default_details_timeout")]
    pub details_timeout: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Seconds, zero disables automatic refresh.
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_refresh_interval")]
    pub auto_refresh: u32,
    #[serde(default)]
    pub close_on_join: bool,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            masters: default_masters(),
            master_timeout: default_master_timeout(),
            server_timeout: default_server_timeout(),
            packet_gap: default_packet_gap(),
            details_timeout: default_details_timeout(),
            max_concurrent: default_max_concurrent(),
            auto_refresh: 0,
            close_on_join: false,
            dark_mode: false,
            maps: None,
        }
    }
}

/// Game executables.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to220: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to340: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to350: Option<PathBuf>,
}

/// Server keys in `ip:port` form.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ListsConfig {
    #[serde(default)]
    pub favorites: Vec<String>,
    #[serde(default)]
    pub ignored: Vec<String>,
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Warn
}

fn default_masters() -> Vec<String> {
    DEFAULT_MASTERS.iter().map(|s| s.to_string()).collect()
}

fn default_master_timeout() -> u64 {
    DEFAULT_MASTER_TIMEOUT
}

fn default_server_timeout() -> u64 {
    DEFAULT_SERVER_TIMEOUT
}

fn default_packet_gap() -> u64 {
    DEFAULT_PACKET_GAP
}

fn default_details_timeout() -> u64 {
    DEFAULT_DETAILS_TIMEOUT
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn deserialize_log_level<'de, D>(de: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    parse_log_level(&s).ok_or_else(|| D::Error::custom(format!("Invalid log level: \"{}\"", s)))
}

fn serialize_log_level<S>(level: &LevelFilter, ser: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    ser.serialize_str(&level.as_str().to_lowercase())
}

fn deserialize_refresh_interval<'de, D>(de: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u32::deserialize(de)?;
    validate_refresh_interval(secs).map_err(D::Error::custom)
}

pub fn parse_log_level(s: &str) -> Option<LevelFilter> {
    use LevelFilter as E;

    if s.is_empty() {
        return None;
    }

    let level_filter = match s {
        _ if "off".starts_with(s) => E::Off,
        _ if "error".starts_with(s) => E::Error,
        _ if "warn".starts_with(s) => E::Warn,
        _ if "info".starts_with(s) => E::Info,
        _ if "debug".starts_with(s) => E::Debug,
        _ if "trace".starts_with(s) => E::Trace,
        _ => match s.parse::<u8>() {
            Ok(0) => E::Off,
            Ok(1) => E::Error,
            Ok(2) => E::Warn,
            Ok(3) => E::Info,
            Ok(4) => E::Debug,
            Ok(5) => E::Trace,
            _ => return None,
        },
    };
    Some(level_filter)
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(toml::from_str(&data)?)
}

/// Config bound to the file it is saved to.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    pub config: Config,
}

impl FileSettings {
    /// Loads the config file, it must exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let config = load(&path)?;
        Ok(Self { path, config })
    }

    /// Loads the config file or uses defaults if it does not exist.
    pub fn open_or_default(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        match load(&path) {
            Ok(config) => Ok(Self { path, config }),
            Err(Error::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("config \"{}\" not found, use defaults", path.display());
                Ok(Self {
                    path,
                    config: Config::default(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the file the config is saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> Result<(), Error> {
        let data = toml::to_string(&self.config)?;
        let io_err = |source| Error::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|i| !i.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(&self.path, data).map_err(io_err)
    }
}

fn split_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

fn split_keys(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

impl SettingsProvider for FileSettings {
    fn master_servers(&self) -> String {
        self.config.browser.masters.join("\n")
    }

    fn set_master_servers(&mut self, value: String) {
        self.config.browser.masters = split_lines(&value);
    }

    fn close_on_join(&self) -> bool {
        self.config.browser.close_on_join
    }

    fn set_close_on_join(&mut self, value: bool) {
        self.config.browser.close_on_join = value;
    }

    fn auto_refresh_interval(&self) -> u32 {
        self.config.browser.auto_refresh
    }

    fn set_auto_refresh_interval(&mut self, secs: u32) -> Result<(), BrowserError> {
        self.config.browser.auto_refresh = validate_refresh_interval(secs)?;
        Ok(())
    }

    fn dark_mode(&self) -> bool {
        self.config.browser.dark_mode
    }

    fn set_dark_mode(&mut self, value: bool) {
        self.config.browser.dark_mode = value;
    }

    fn game_path(&self, variant: GameVariant) -> Option<PathBuf> {
        let paths = &self.config.paths;
        match variant {
            GameVariant::TO220 => paths.to220.clone(),
            GameVariant::TO340 => paths.to340.clone(),
            GameVariant::TO350 => paths.to350.clone(),
            GameVariant::Unsupported => None,
        }
    }

    fn set_game_path(&mut self, variant: GameVariant, path: PathBuf) -> Result<(), BrowserError> {
        let paths = &mut self.config.paths;
        let slot = match variant {
            GameVariant::TO220 => &mut paths.to220,
            GameVariant::TO340 => &mut paths.to340,
            GameVariant::TO350 => &mut paths.to350,
            GameVariant::Unsupported => {
                return Err(BrowserError::Settings("unknown game version".to_owned()))
            }
        };
        *slot = Some(path);
        Ok(())
    }

    fn favorite_servers(&self) -> String {
        self.config.lists.favorites.join(",")
    }

    fn set_favorite_servers(&mut self, value: String) {
        self.config.lists.favorites = split_keys(&value);
    }

    fn ignored_servers(&self) -> String {
        self.config.lists.ignored.join(",")
    }

    fn set_ignored_servers(&mut self, value: String) {
        self.config.lists.ignored = split_keys(&value);
    }

    fn save(&mut self) -> Result<(), BrowserError> {
        self.write()
            .map_err(|e| BrowserError::Settings(e.to_string()))?;
        debug!("saved config \"{}\"", self.path.display());
        Ok(())
    }
}
