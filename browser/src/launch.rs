// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
};

use log::info;
use tacops_protocol::GameVariant;

use crate::{settings::SettingsProvider, Error};

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("Unsupported game version")]
    Unsupported,
    #[error("Path to Tactical Ops {0} is not configured")]
    NotConfigured(&'static str),
    #[error("Game executable \"{}\" not found", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to start \"{}\": {source}", path.display())]
    Spawn { path: PathBuf, source: io::Error },
}

/// Starts the game connected to a server.
pub trait GameLauncher {
    fn launch(&self, variant: GameVariant, join_address: &str) -> Result<(), Error>;
}

/// Spawns the game executable configured in settings.
pub struct ProcessLauncher<S> {
    settings: S,
}

impl<S: SettingsProvider> ProcessLauncher<S> {
    pub fn new(settings: S) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Returns the existing executable for `variant`.
    pub fn resolve(&self, variant: GameVariant) -> Result<PathBuf, LaunchError> {
        let version = variant.version().ok_or(LaunchError::Unsupported)?;
        let path = self
            .settings
            .game_path(variant)
            .filter(|i| !i.as_os_str().is_empty())
            .ok_or(LaunchError::NotConfigured(version))?;
        if !path.is_file() {
            return Err(LaunchError::NotFound(path));
        }
        Ok(path)
    }
}

fn spawn(path: &Path, join_address: &str) -> Result<(), LaunchError> {
    let mut cmd = Command::new(path);
    if let Some(dir) = path.parent() {
        cmd.current_dir(dir);
    }
    cmd.arg(join_address)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            path: path.to_owned(),
            source,
        })?;
    Ok(())
}

impl<S: SettingsProvider> GameLauncher for ProcessLauncher<S> {
    fn launch(&self, variant: GameVariant, join_address: &str) -> Result<(), Error> {
        let path = self.resolve(variant)?;
        info!("start {} {join_address}", path.display());
        spawn(&path, join_address)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::settings::MemorySettings;

    #[test]
    fn not_configured() {
        let launcher = ProcessLauncher::new(MemorySettings::default());
        assert!(matches!(
            launcher.resolve(GameVariant::TO350),
            Err(LaunchError::NotConfigured("3.5"))
        ));
        assert!(matches!(
            launcher.resolve(GameVariant::Unsupported),
            Err(LaunchError::Unsupported)
        ));
    }

    #[test]
    fn not_found() {
        let settings = MemorySettings {
            to220: Some("/nonexistent/TacticalOps.exe".into()),
            ..MemorySettings::default()
        };
        let launcher = ProcessLauncher::new(settings);
        let err = launcher.launch(GameVariant::TO220, "1.2.3.4:7777").unwrap_err();
        assert!(matches!(err, Error::Launch(LaunchError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_process() {
        let settings = MemorySettings {
            to340: Some("/bin/sh".into()),
            ..MemorySettings::default()
        };
        let launcher = ProcessLauncher::new(settings);
        // the shell exits right away, only spawning is checked
        launcher.launch(GameVariant::TO340, "1.2.3.4:7777").unwrap();
    }
}
