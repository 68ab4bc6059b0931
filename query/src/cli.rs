// SPDX-License-Identifier: GPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::path::PathBuf;
use std::process;

use getopts::Options;
use log::LevelFilter;
use thiserror::Error;

use crate::config;

const BIN_NAME: &str = env!("CARGO_BIN_NAME");
const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid log level \"{0}\"")]
    InvalidLogLevel(String),
    #[error("Invalid {name} \"{value}\"")]
    InvalidNumber { name: &'static str, value: String },
    #[error(transparent)]
    Options(#[from] getopts::Fail),
}

#[derive(Debug, Default)]
pub struct Cli {
    pub config_path: Option<PathBuf>,
    pub log_level: Option<LevelFilter>,
    pub masters: Option<Vec<String>>,
    /// Milliseconds.
    pub master_timeout: Option<u64>,
    /// Milliseconds.
    pub server_timeout: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub maps: Option<PathBuf>,
    pub json: bool,
    pub debug: bool,
    pub args: Vec<String>,
}

impl Cli {
    /// Returns the command and its arguments.
    pub fn command(&self) -> (&str, &[String]) {
        match self.args.split_first() {
            Some((cmd, args)) => (cmd.as_str(), args),
            None => ("", &[]),
        }
    }
}

fn print_usage(opts: Options) {
    let brief = format!(
        "\
Usage: {} [options] <COMMAND> [ARGS]

COMMANDS:
    all                 fetch servers from all masters and fetch info for each server
    list                fetch servers from all masters and print server addresses
    info hosts...       fetch info for each server
    details hosts...    fetch info, status and players for each server
    map names...        find map names in the map catalog
    favorite host       add or remove a favorite server
    ignore host         add or remove an ignored server
    join host           start the game connected to the server\
        ",
        BIN_NAME
    );
    print!("{}", opts.usage(&brief));
}

fn print_version() {
    println!("{} v{}", PKG_NAME, PKG_VERSION);
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optflag("h", "help", "print usage help");
    opts.optflag("v", "version", "print program version");
    let help = format!("config path [default: {}]", config::DEFAULT_CONFIG_PATH);
    opts.optopt("c", "config", &help, "PATH");
    let log_help =
        "logging level [default: warn(2)]\nLEVEL: 0-5, off, error, warn, info, debug, trace";
    opts.optopt("l", "log", log_help, "LEVEL");
    let help = format!(
        "comma separated master servers [default: {}]",
        config::DEFAULT_MASTERS.join(",")
    );
    opts.optopt("m", "master", &help, "LIST");
    let help = format!(
        "time to wait results from masters [default: {}]",
        config::DEFAULT_MASTER_TIMEOUT
    );
    opts.optopt("T", "master-timeout", &help, "MS");
    let help = format!(
        "time to wait results from servers [default: {}]",
        config::DEFAULT_SERVER_TIMEOUT
    );
    opts.optopt("t", "server-timeout", &help, "MS");
    let help = format!(
        "queries in flight [default: {}]",
        config::DEFAULT_MAX_CONCURRENT
    );
    opts.optopt("n", "max-concurrent", &help, "NUM");
    opts.optopt("M", "maps", "map catalog JSON file", "PATH");
    opts.optflag("j", "json", "output JSON");
    opts.optflag("d", "debug", "output debug");
    opts
}

fn number<T: std::str::FromStr>(
    matches: &getopts::Matches,
    name: &'static str,
) -> Result<Option<T>, Error> {
    match matches.opt_str(name) {
        Some(value) => match value.parse() {
            Ok(n) => Ok(Some(n)),
            Err(_) => Err(Error::InvalidNumber { name, value }),
        },
        None => Ok(None),
    }
}

fn parse_from(opts: &Options, args: &[String]) -> Result<(Cli, getopts::Matches), Error> {
    let matches = opts.parse(args)?;
    let mut cli = Cli::default();

    if let Some(s) = matches.opt_str("log") {
        match config::parse_log_level(&s) {
            Some(level) => cli.log_level = Some(level),
            None => return Err(Error::InvalidLogLevel(s)),
        }
    }

    if let Some(s) = matches.opt_str("master") {
        let list = s
            .split(',')
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(String::from)
            .collect();
        cli.masters = Some(list);
    }

    cli.config_path = matches.opt_str("config").map(PathBuf::from);
    cli.master_timeout = number(&matches, "master-timeout")?;
    cli.server_timeout = number(&matches, "server-timeout")?;
    cli.max_concurrent = number(&matches, "max-concurrent")?;
    cli.maps = matches.opt_str("maps").map(PathBuf::from);
    cli.json = matches.opt_present("json");
    cli.debug = matches.opt_present("debug");
    cli.args = matches.free.clone();

    Ok((cli, matches))
}

pub fn parse() -> Result<Cli, Error> {
    let args: Vec<_> = std::env::args().collect();
    let opts = options();
    let (cli, matches) = parse_from(&opts, &args[1..])?;

    if matches.opt_present("help") {
        print_usage(opts);
        process::exit(0);
    }

    if matches.opt_present("version") {
        print_version();
        process::exit(0);
    }

    Ok(cli)
}
