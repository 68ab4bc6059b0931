// SPDX-License-Identifier: GPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

mod cli;
mod config;
mod logger;

use std::cmp;
use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddrV4;
use std::process;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use tacops_browser::{
    download_server_list,
    protocol::{server::ServerAddress, Player, ServerRecord},
    parse_master_endpoints, Bookmarks, Discovery, DiscoveryBuilder, GameLauncher, MapCatalog,
    MasterEndpoint, ProcessLauncher, ServerQuery, SettingsProvider, Summary, UdpQuery,
};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::cli::Cli;
use crate::config::FileSettings;

#[derive(Error, Debug)]
enum Error {
    #[error("Undefined command \"{0}\"")]
    UndefinedCommand(String),
    #[error("Command \"{0}\" expects a server address")]
    MissingAddress(&'static str),
    #[error("Map catalog is not configured, use --maps or [browser] maps")]
    NoCatalog,
    #[error("Server {0} did not answer")]
    NoAnswer(String),
    #[error("Discovery is already running")]
    Busy,
    #[error(transparent)]
    Cli(#[from] cli::Error),
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Browser(#[from] tacops_browser::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, Serialize)]
struct PlayerResult<'a> {
    name: &'a str,
    score: i32,
    kills: i32,
    deaths: i32,
    ping: u32,
    team: u8,
    bot: bool,
}

impl<'a> From<&'a Player> for PlayerResult<'a> {
    fn from(player: &'a Player) -> Self {
        Self {
            name: &player.name,
            score: player.score,
            kills: player.kills,
            deaths: player.deaths,
            ping: player.ping,
            team: player.team,
            bot: player.is_bot(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct ServerResult<'a> {
    address: String,
    join: String,
    ping: u32,
    host: &'a str,
    map: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    map_name: Option<&'a str>,
    gametype: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'static str>,
    numplayers: u32,
    maxplayers: u32,
    bots: u32,
    password: bool,
    favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    players: Option<Vec<PlayerResult<'a>>>,
}

impl<'a> ServerResult<'a> {
    fn new(record: &'a ServerRecord, catalog: Option<&'a MapCatalog>, favorite: bool) -> Self {
        Self {
            address: record.key(),
            join: record.join_address(),
            ping: record.round_trip(),
            host: record.host_name(),
            map: record.map_title(),
            map_name: catalog
                .and_then(|c| c.find_best_match(record.map_title()))
                .map(|e| e.name.as_str()),
            gametype: record.game_type(),
            version: record.game_variant().version(),
            numplayers: record.num_players(),
            maxplayers: record.max_players(),
            bots: record.bot_count(),
            password: record.password(),
            favorite,
            players: None,
        }
    }

    fn with_players(mut self, record: &'a ServerRecord) -> Self {
        self.players = Some(record.players().iter().map(PlayerResult::from).collect());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize)]
struct SummaryResult {
    masters: usize,
    masters_failed: usize,
    candidates: usize,
    rejected: usize,
    queried: usize,
    found: usize,
    timeouts: usize,
    failures: usize,
}

impl From<Summary> for SummaryResult {
    fn from(s: Summary) -> Self {
        Self {
            masters: s.masters,
            masters_failed: s.masters_failed,
            candidates: s.candidates,
            rejected: s.rejected,
            queried: s.queried,
            found: s.found,
            timeouts: s.timeouts,
            failures: s.failures,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct InfoResult<'a> {
    master_timeout: u64,
    server_timeout: u64,
    masters: &'a [String],
    summary: SummaryResult,
    servers: &'a [ServerResult<'a>],
}

#[derive(Clone, Debug, Serialize)]
struct ListResult<'a> {
    master_timeout: u64,
    masters: &'a [String],
    servers: &'a [String],
}

#[derive(Clone, Debug, Serialize)]
struct MapResult<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_small: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_large: Option<&'a str>,
}

fn cmp_address(a: &str, b: &str) -> cmp::Ordering {
    match (a.parse::<SocketAddrV4>(), b.parse::<SocketAddrV4>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Favorites first, then by address.
fn sort_servers(servers: &mut [ServerResult]) {
    servers.sort_by(|a, b| {
        b.favorite
            .cmp(&a.favorite)
            .then_with(|| cmp_address(&a.address, &b.address))
    });
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Command line options merged over the config file.
struct App {
    cli: Cli,
    bookmarks: Bookmarks<FileSettings>,
}

impl App {
    fn settings(&self) -> &FileSettings {
        self.bookmarks.settings()
    }

    fn masters(&self) -> Vec<MasterEndpoint> {
        match &self.cli.masters {
            Some(list) => parse_master_endpoints(&list.join("\n")),
            None => self.settings().master_endpoints(),
        }
    }

    fn master_names(&self) -> Vec<String> {
        self.masters().iter().map(|i| i.to_string()).collect()
    }

    fn master_timeout(&self) -> u64 {
        let browser = &self.settings().config.browser;
        self.cli.master_timeout.unwrap_or(browser.master_timeout)
    }

    fn server_timeout(&self) -> u64 {
        let browser = &self.settings().config.browser;
        self.cli.server_timeout.unwrap_or(browser.server_timeout)
    }

    fn discovery(&self) -> Discovery<UdpQuery> {
        let browser = &self.settings().config.browser;
        let query = UdpQuery::new()
            .info_timeout(Duration::from_millis(self.server_timeout()))
            .packet_gap(Duration::from_millis(browser.packet_gap))
            .details_timeout(Duration::from_millis(browser.details_timeout));
        DiscoveryBuilder::new()
            .master_timeout(Duration::from_millis(self.master_timeout()))
            .max_concurrent(self.cli.max_concurrent.unwrap_or(browser.max_concurrent))
            .build(query)
    }

    fn catalog(&self) -> Result<Option<MapCatalog>, Error> {
        let path = self
            .cli
            .maps
            .as_ref()
            .or(self.settings().config.browser.maps.as_ref());
        match path {
            Some(path) => Ok(Some(MapCatalog::load(path)?)),
            None => Ok(None),
        }
    }

    fn print_servers(
        &self,
        servers: &[ServerResult],
        summary: Summary,
    ) -> Result<(), Error> {
        if self.cli.json || self.cli.debug {
            let masters = self.master_names();
            let result = InfoResult {
                master_timeout: self.master_timeout(),
                server_timeout: self.server_timeout(),
                masters: &masters,
                summary: summary.into(),
                servers,
            };
            if self.cli.json {
                print_json(&result)?;
            } else {
                println!("{:#?}", result);
            }
            return Ok(());
        }

        for i in servers {
            let mark = if i.favorite { " *" } else { "" };
            println!("server: {} [{} ms]{}", i.address, i.ping, mark);

            macro_rules! p {
                ($($key:ident: $value:expr),+ $(,)?) => {
                    $(println!("    {}: \"{}\"", stringify!($key), $value);)+
                };
            }

            p! {
                host: i.host,
                map: i.map,
                gametype: i.gametype,
                version: i.version.unwrap_or("unknown"),
                players: format_args!("{}/{}", i.numplayers, i.maxplayers),
                bots: i.bots,
                password: i.password,
                join: i.join,
            }
            if let Some(name) = i.map_name {
                p! { map_name: name }
            }
            for player in i.players.iter().flatten() {
                println!(
                    "    player: \"{}\" score {} kills {} deaths {} ping {}{}",
                    player.name,
                    player.score,
                    player.kills,
                    player.deaths,
                    player.ping,
                    if player.bot { " (bot)" } else { "" },
                );
            }
        }
        Ok(())
    }
}

async fn list_servers(app: &App) -> Result<(), Error> {
    let timeout = Duration::from_millis(app.master_timeout());
    let mut tasks = JoinSet::new();
    for master in app.masters() {
        tasks.spawn(async move {
            let result = download_server_list(&master, timeout).await;
            (master, result)
        });
    }

    let mut servers = BTreeSet::new();
    while let Some(res) = tasks.join_next().await {
        match res.map_err(tacops_browser::Error::from)? {
            (_, Ok(list)) => servers.extend(list),
            (master, Err(e)) => eprintln!("master({}) error: {}", master, e),
        }
    }

    let mut servers: Vec<_> = servers.into_iter().collect();
    servers.sort_by(|a, b| cmp_address(a, b));

    if app.cli.json || app.cli.debug {
        let masters = app.master_names();
        let result = ListResult {
            master_timeout: app.master_timeout(),
            masters: &masters,
            servers: &servers,
        };
        if app.cli.json {
            print_json(&result)?;
        } else {
            println!("{:#?}", result);
        }
    } else {
        for i in servers {
            println!("{}", i);
        }
    }

    Ok(())
}

async fn query_server_info(app: App, hosts: &[String], details: bool) -> Result<(), Error> {
    let discovery = app.discovery();
    let catalog = app.catalog()?;
    let bookmarks = &app.bookmarks;

    let mut records = Vec::new();
    let on_found = |record: ServerRecord| {
        if bookmarks.is_ignored(&record.key()) {
            debug!("skip ignored server {}", record.key());
        } else {
            records.push(record);
        }
    };
    let summary = if hosts.is_empty() {
        discovery.run(&app.masters(), on_found).await?
    } else {
        discovery.query_addresses(hosts.iter().cloned(), on_found).await?
    };
    let summary = summary.ok_or(Error::Busy)?;

    if details {
        for record in &mut records {
            if let Err(e) = discovery.refresh_one(record).await {
                warn!("{}: failed to read details: {}", record.key(), e);
            }
        }
    }

    let mut servers: Vec<_> = records
        .iter()
        .map(|record| {
            let favorite = bookmarks.is_favorite(&record.key());
            let result = ServerResult::new(record, catalog.as_ref(), favorite);
            if details {
                result.with_players(record)
            } else {
                result
            }
        })
        .collect();
    sort_servers(&mut servers);

    app.print_servers(&servers, summary)
}

fn match_maps(app: &App, names: &[String]) -> Result<(), Error> {
    let catalog = app.catalog()?.ok_or(Error::NoCatalog)?;
    let results: Vec<_> = names
        .iter()
        .map(|input| {
            let entry = catalog.find_best_match(input);
            MapResult {
                input,
                name: entry.map(|e| e.name.as_str()),
                url: entry.and_then(|e| e.url.as_deref()),
                preview_small: entry.and_then(|e| e.preview_url_small()),
                preview_large: entry.and_then(|e| e.preview_url_large()),
            }
        })
        .collect();

    if app.cli.json {
        return print_json(&results);
    } else if app.cli.debug {
        println!("{:#?}", results);
        return Ok(());
    }

    for i in results {
        match i.name {
            Some(name) => println!("{}: {}", i.input, name),
            None => println!("{}: no match", i.input),
        }
    }
    Ok(())
}

fn toggle_bookmark(mut app: App, cmd: &'static str, key: &str) -> Result<(), Error> {
    let address: ServerAddress = key.parse().map_err(tacops_browser::Error::from)?;
    let key = address.to_string();
    let added = match cmd {
        "favorite" => app.bookmarks.toggle_favorite(&key)?,
        _ => app.bookmarks.toggle_ignored(&key)?,
    };
    let action = if added { "added to" } else { "removed from" };
    println!("{} {} {} list", key, action, cmd);
    Ok(())
}

async fn join_server(app: App, host: &str) -> Result<(), Error> {
    let address: ServerAddress = host.parse().map_err(tacops_browser::Error::from)?;
    let discovery = app.discovery();
    let record = match discovery.query().query_info(0, &address).await {
        Ok(record) => record,
        Err(e) if e.is_timeout() => return Err(Error::NoAnswer(address.to_string())),
        Err(e) => return Err(e.into()),
    };
    let launcher = ProcessLauncher::new(app.bookmarks.into_inner());
    launcher.launch(record.game_variant(), &record.join_address())?;
    Ok(())
}

fn first_arg<'a>(args: &'a [String], cmd: &'static str) -> Result<&'a str, Error> {
    args.first()
        .map(String::as_str)
        .ok_or(Error::MissingAddress(cmd))
}

async fn execute(app: App) -> Result<(), Error> {
    let (cmd, args) = app.cli.command();
    let (cmd, args) = (cmd.to_owned(), args.to_vec());
    match cmd.as_str() {
        "all" | "" => query_server_info(app, &[], false).await?,
        "info" => query_server_info(app, &args, false).await?,
        "details" => query_server_info(app, &args, true).await?,
        "list" => list_servers(&app).await?,
        "map" => match_maps(&app, &args)?,
        "favorite" => toggle_bookmark(app, "favorite", first_arg(&args, "favorite")?)?,
        "ignore" => toggle_bookmark(app, "ignore", first_arg(&args, "ignore")?)?,
        "join" => join_server(app, first_arg(&args, "join")?).await?,
        _ => return Err(Error::UndefinedCommand(cmd)),
    }

    Ok(())
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut settings = match &cli.config_path {
        Some(path) => FileSettings::open(path)?,
        None => FileSettings::open_or_default(config::DEFAULT_CONFIG_PATH)?,
    };

    if let Some(level) = cli.log_level {
        settings.config.log.level = level;
    }

    logger::init(&settings.config.log);
    debug!("config \"{}\"", settings.path().display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let bookmarks = Bookmarks::new(settings);
    runtime.block_on(execute(App { cli, bookmarks }))
}

fn main() {
    let result = cli::parse().map_err(Error::from).and_then(run);

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
