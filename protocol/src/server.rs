// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

//! Game server state built from query answers.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use log::trace;

use crate::cursor::{Decoded, GetKeyValue};
use crate::{Error, UNKNOWN_PING};

/// Lowest accepted server port.
pub const MIN_PORT: u16 = 1024;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Team number of a player without a team.
pub const NO_TEAM: u8 = 255;

/// Prefixes of per player keys.
const PLAYER_KEYS: [&str; 6] = ["player_", "score_", "frags_", "deaths_", "ping_", "team_"];

/// Validated `host:port` of a game server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Creates a new address, validating both parts.
    pub fn new(host: &str, port: u16) -> Result<Self, Error> {
        if !is_valid_host(host) {
            return Err(Error::InvalidAddress(host.to_owned()));
        }
        if port < MIN_PORT {
            return Err(Error::InvalidPort(port.to_string()));
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }

    /// Returns the host name or IPv4 literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the query port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidAddress(s.to_owned()))?;
        if port.contains(':') {
            return Err(Error::InvalidAddress(s.to_owned()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::InvalidPort(port.to_owned()))?;
        Self::new(host, port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    // dotted numbers must be a real IPv4 address
    if host.bytes().all(|c| c.is_ascii_digit() || c == b'.') {
        return host.parse::<Ipv4Addr>().is_ok();
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-')
    })
}

/// Supported game versions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum GameVariant {
    /// Tactical Ops 2.2.
    TO220,
    /// Tactical Ops 3.4.
    TO340,
    /// Tactical Ops 3.5.
    TO350,
    /// Any other game type.
    #[default]
    Unsupported,
}

impl GameVariant {
    /// Recognizes the `gametype` value, the comparison is case-sensitive.
    pub fn from_game_type(s: &str) -> Self {
        match s {
            "TO220" => Self::TO220,
            "TO340" => Self::TO340,
            "TO350" => Self::TO350,
            _ => Self::Unsupported,
        }
    }

    /// Returns `true` for the supported variants.
    pub fn is_supported(&self) -> bool {
        *self != Self::Unsupported
    }

    /// Returns the short version tag used to pick the game executable.
    pub fn version(&self) -> Option<&'static str> {
        match self {
            Self::TO220 => Some("2.2"),
            Self::TO340 => Some("3.4"),
            Self::TO350 => Some("3.5"),
            Self::Unsupported => None,
        }
    }

    /// Parses a version tag returned by [`version`](Self::version).
    pub fn from_version(s: &str) -> Self {
        match s {
            "2.2" => Self::TO220,
            "3.4" => Self::TO340,
            "3.5" => Self::TO350,
            _ => Self::Unsupported,
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::TO220 => "TO220",
            Self::TO340 => "TO340",
            Self::TO350 => "TO350",
            Self::Unsupported => "unsupported",
        };
        fmt.write_str(s)
    }
}

/// Player slot reported by a game server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    /// Slot index from the `player_N` key.
    pub slot: u32,
    /// Player name.
    pub name: String,
    /// Score.
    pub score: i32,
    /// Kills, the `frags_N` key.
    pub kills: i32,
    /// Deaths.
    pub deaths: i32,
    /// Ping in milliseconds.
    pub ping: u32,
    /// Team number, [`NO_TEAM`] if unknown.
    pub team: u8,
}

impl Player {
    /// Bots always report zero ping.
    pub fn is_bot(&self) -> bool {
        self.ping == 0
    }
}

/// Returns the value of a missing server property.
pub fn default_value(key: &str) -> &'static str {
    let key = key.to_ascii_lowercase();
    for prefix in ["frags_", "deaths_", "score_", "team_"] {
        if key.starts_with(prefix) {
            return "0";
        }
    }
    if key.starts_with("ping_") {
        return "999";
    }
    match key.as_str() {
        "tostversion" | "protection" | "esemode" => "-",
        "frags" | "deaths" | "team" | "score" => "0",
        "ping" => "999",
        _ => "",
    }
}

/// Game server state.
///
/// Derived fields are recomputed from the property table after every change.
#[derive(Clone, Debug)]
pub struct ServerRecord {
    id: u32,
    address: ServerAddress,
    round_trip: u32,
    properties: HashMap<String, String>,

    host_name: String,
    map_title: String,
    game_type: String,
    game_variant: GameVariant,
    num_players: u32,
    max_players: u32,
    password: bool,
    host_port: u16,
    players: Vec<Player>,
    bot_count: u32,
}

impl ServerRecord {
    /// Creates a record from an `info` answer.
    ///
    /// Fails if the server runs an unsupported game type.
    pub fn new(
        id: u32,
        address: ServerAddress,
        round_trip: u32,
        info: &Decoded,
    ) -> Result<Self, Error> {
        let mut ret = Self {
            id,
            host_port: address.port.saturating_sub(1),
            address,
            round_trip: UNKNOWN_PING,
            properties: HashMap::new(),
            host_name: String::new(),
            map_title: String::new(),
            game_type: String::new(),
            game_variant: GameVariant::Unsupported,
            num_players: 0,
            max_players: 0,
            password: false,
            players: Vec::new(),
            bot_count: 0,
        };
        ret.set_round_trip(round_trip);
        ret.update(info);

        if !ret.game_variant.is_supported() {
            return Err(Error::UnsupportedGame(ret.game_type));
        }
        Ok(ret)
    }

    /// Merges decoded pairs into the property table.
    ///
    /// Returns `true` if the message was terminated.
    pub fn update(&mut self, decoded: &Decoded) -> bool {
        for (key, value) in &decoded.entries {
            self.properties
                .insert(key.to_ascii_lowercase(), value.clone());
        }
        self.recompute();
        decoded.terminated
    }

    /// Removes all per player keys.
    pub fn clear_players(&mut self) {
        self.properties
            .retain(|key, _| !PLAYER_KEYS.iter().any(|p| key.starts_with(p)));
        self.recompute();
    }

    /// Sets the measured round trip time, [`UNKNOWN_PING`] is kept as is.
    pub fn set_round_trip(&mut self, ms: u32) {
        self.round_trip = match ms {
            UNKNOWN_PING => UNKNOWN_PING,
            ms => ms.max(1),
        };
    }

    fn recompute(&mut self) {
        let prop = |key: &str| self.properties.get(key).map(String::as_str);

        if let Some(s) = prop("gametype") {
            self.game_type = s.to_owned();
            self.game_variant = GameVariant::from_game_type(s);
        }
        if let Some(s) = prop("hostname") {
            self.host_name = s.to_owned();
        }
        self.map_title = prop("maptitle")
            .or_else(|| prop("mapname"))
            .unwrap_or_default()
            .to_owned();
        self.host_port = self
            .get("hostport")
            .unwrap_or(self.address.port.saturating_sub(1));
        self.max_players = self.get("maxplayers").unwrap_or(0);
        self.password = self.get("password").unwrap_or(false);

        if self.round_trip == UNKNOWN_PING {
            if let Some(ping) = self.get::<u32>("ping").filter(|&i| i > 0) {
                self.round_trip = ping;
            }
        }

        self.players = self.collect_players();
        self.bot_count = self.players.iter().filter(|i| i.is_bot()).count() as u32;

        let reported = self.get("numplayers").unwrap_or(0);
        self.num_players = reported.max(self.players.len() as u32);

        trace!(
            "{}: {} players ({} bots), variant {}",
            self.address,
            self.num_players,
            self.bot_count,
            self.game_variant
        );
    }

    fn collect_players(&self) -> Vec<Player> {
        let mut slots: Vec<u32> = self
            .properties
            .keys()
            .filter_map(|key| key.strip_prefix("player_")?.parse().ok())
            .collect();
        slots.sort_unstable();
        slots.dedup();

        slots
            .into_iter()
            .map(|slot| Player {
                slot,
                name: self.property(&format!("player_{slot}")).to_owned(),
                score: self.get(&format!("score_{slot}")).unwrap_or(0),
                kills: self.get(&format!("frags_{slot}")).unwrap_or(0),
                deaths: self.get(&format!("deaths_{slot}")).unwrap_or(0),
                ping: self.get(&format!("ping_{slot}")).unwrap_or(UNKNOWN_PING),
                team: self.get(&format!("team_{slot}")).unwrap_or(NO_TEAM),
            })
            .collect()
    }

    /// Returns the property value or its default.
    pub fn property(&self, key: &str) -> &str {
        match self.properties.get(&key.to_ascii_lowercase()) {
            Some(value) => value,
            None => default_value(key),
        }
    }

    /// Returns the property parsed as `T`.
    ///
    /// Missing properties are parsed from their default value.
    pub fn get<'a, T: GetKeyValue<'a>>(&'a self, key: &str) -> Option<T> {
        T::get_key_value(self.property(key))
    }

    /// Returns all received properties.
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Returns the identifier assigned by the discovery run.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the query address.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Returns the round trip time in milliseconds, [`UNKNOWN_PING`] if unknown.
    pub fn round_trip(&self) -> u32 {
        self.round_trip
    }

    /// Returns the server name.
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Returns the map title, the map file name if the title is missing.
    pub fn map_title(&self) -> &str {
        &self.map_title
    }

    /// Returns the raw `gametype` value.
    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    /// Returns the game version.
    pub fn game_variant(&self) -> GameVariant {
        self.game_variant
    }

    /// Returns the number of players, never less than the observed slots.
    pub fn num_players(&self) -> u32 {
        self.num_players
    }

    /// Returns the maximum number of players.
    pub fn max_players(&self) -> u32 {
        self.max_players
    }

    /// Returns `true` if the server requires a password.
    pub fn password(&self) -> bool {
        self.password
    }

    /// Returns the number of bots.
    pub fn bot_count(&self) -> u32 {
        self.bot_count
    }

    /// Returns the number of human players.
    pub fn human_count(&self) -> u32 {
        self.num_players.saturating_sub(self.bot_count)
    }

    /// Returns players ordered by slot.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Returns the game port.
    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    /// Returns the address players connect to.
    pub fn join_address(&self) -> String {
        format!("{}:{}", self.address.host, self.host_port)
    }

    /// Returns the key used in favorite and ignored lists.
    pub fn key(&self) -> String {
        self.address.to_string()
    }

    /// Returns the admin name.
    pub fn admin_name(&self) -> &str {
        self.property("adminname")
    }

    /// Returns the admin e-mail.
    pub fn admin_email(&self) -> &str {
        self.property("adminemail")
    }

    /// Returns the Tactical Ops version string.
    pub fn tost_version(&self) -> &str {
        self.property("tostversion")
    }

    /// Returns the anti cheat protection name.
    pub fn protection(&self) -> &str {
        self.property("protection")
    }

    /// Returns the ESE mode.
    pub fn ese_mode(&self) -> &str {
        self.property("esemode")
    }

    /// Returns the time limit in minutes.
    pub fn time_limit(&self) -> &str {
        self.property("timelimit")
    }

    /// Returns the minimal number of players.
    pub fn min_players(&self) -> &str {
        self.property("minplayers")
    }

    /// Returns the friendly fire scale.
    pub fn friendly_fire(&self) -> &str {
        self.property("friendlyfire")
    }

    /// Returns the explosion friendly fire scale.
    pub fn explosion_ff(&self) -> &str {
        self.property("explosionff")
    }
}
