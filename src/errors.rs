use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Game {0} is not installed")]
    NotInstalled(String),
    #[error("Manifest for game {0} is missing or unreadable")]
    ManifestMissing(String),
    #[error("Profile for game {0} is missing or unreadable")]
    ProfileMissing(String),
    #[error("Game {0} has no startup path, select an executable first")]
    NoStartupPath(String),
    #[error("Game {0} is already being downloaded, cancel it first")]
    AlreadyDownloading(String),
    #[error("Invalid game id: {0}")]
    InvalidGameId(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Launch error: {0}")]
    Launch(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LauncherError>;
