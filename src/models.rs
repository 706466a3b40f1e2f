use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-game manifest, stored as `iwapps/iwmanifest_<id>.json` inside a
/// library root. Regenerated by install and repair, never hand-edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FangameManifest {
    pub id: String,
    pub name: String,
    pub installed_at: DateTime<Utc>,
    /// Startup executable relative to the game directory. Empty when zero or
    /// more than one candidate was found and the user has not picked one yet.
    pub startup_path: String,
    pub size_on_disk: u64,
    pub resize: bool,
}

/// Per-game play profile under the user-data area. A missing profile is
/// equivalent to zero play time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FangameProfile {
    /// Cumulative play time in seconds. Monotonically non-decreasing.
    #[serde(default)]
    pub play_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub library_paths: Vec<String>,
    #[serde(default)]
    pub language: Language,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Succeed,
    Failed,
}

/// One tracked game download. Lives for the duration of the transfer; kept
/// in the table afterwards so the UI can show history.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    pub url: String,
    pub received: u64,
    pub size: u64,
    pub status: DownloadStatus,
    pub library_path: String,
    #[serde(rename = "gameID")]
    pub game_id: String,
    pub game_name: String,
    pub file_path: String,
}

/// Readme found in a game directory, content included so the UI can render
/// it without a second round-trip.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameReadme {
    pub name: String,
    pub content: String,
    pub path: String,
}

/// Raw catalog entry as scraped from DelFruit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
}

/// On-disk shape of the catalog cache file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogCache {
    pub fetchdate: DateTime<Utc>,
    pub list: Vec<CatalogEntry>,
}

/// Per-user flags from the authenticated DelFruit profile page.
#[derive(Clone, Debug, Default)]
pub struct CatalogUserFlags {
    pub favorites: HashSet<String>,
    pub cleared: HashSet<String>,
    pub bookmarks: HashSet<String>,
}

/// UI-facing view model: one catalog entry merged with local state. Rebuilt
/// wholesale on refresh, patched in place by broadcast events in between.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FangameItem {
    pub id: String,
    pub name: String,
    pub is_installed: bool,
    pub is_running: bool,
    pub is_favorite: bool,
    pub is_cleared: bool,
    pub is_bookmarked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<String>,
}

impl FangameItem {
    pub fn from_entry(entry: CatalogEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            is_installed: false,
            is_running: false,
            is_favorite: false,
            is_cleared: false,
            is_bookmarked: false,
            library_path: None,
        }
    }
}
