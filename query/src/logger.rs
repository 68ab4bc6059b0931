// SPDX-License-Identifier: GPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{Level, Metadata, Record};

use crate::config::LogConfig;

/// Writes to stderr, stdout is reserved for command output.
struct Logger {
    print_time: AtomicBool,
}

static LOGGER: Logger = Logger {
    print_time: AtomicBool::new(false),
};

/// Prefix of a log line.
struct Prefix<'a>(&'a Record<'a>);

impl fmt::Display for Prefix<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let record = self.0;
        match record.level() {
            Level::Debug | Level::Trace => {
                // include the module path
                write!(fmt, "{} {}", record.level(), record.target())
            }
            level => write!(fmt, "{}", level),
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        #[cfg(feature = "logtime")]
        if self.print_time.load(Ordering::Relaxed) {
            let dt = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            eprintln!("[{}] {} - {}", dt, Prefix(record), record.args());
            return;
        }

        eprintln!("{} - {}", Prefix(record), record.args());
    }

    fn flush(&self) {}
}

pub fn init(cfg: &LogConfig) {
    if let Err(e) = log::set_logger(&LOGGER) {
        eprintln!("Failed to initialize logger: {}", e);
        return;
    }
    update_config(cfg);
}

fn update_config(cfg: &LogConfig) {
    log::set_max_level(cfg.level);
    LOGGER.print_time.store(cfg.time, Ordering::Relaxed);
}
