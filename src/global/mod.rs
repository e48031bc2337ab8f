use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "teams-helper";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn token_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("token.json"))
}

/// Default recording folder: `~/Downloads/Recordings`.
pub fn default_recordings_dir() -> PathBuf {
    if let Some(dir) = dirs::download_dir() {
        return dir.join("Recordings");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join("Downloads").join("Recordings");
    }
    PathBuf::from("Recordings")
}

pub const LOG_FILE_NAME: &str = "app.log";
