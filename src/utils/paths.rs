//! Canonical on-disk layout.
//!
//! ```text
//! <library root>/
//!   iwapps/
//!     common/<game-id>/...
//!     downloading/<game-id>/...
//!     backup/<game-id>/...
//!     iwmanifest_<game-id>.json
//!
//! <app data root>/
//!   userdata/<user-id>/<game-id>/profile.json
//!   appcache/delfruit-fangamelist.json
//!   iwplay-settings.json
//! ```
//!
//! Pure path joining only. No I/O, no case normalization; callers that need
//! case-insensitive comparison must resolve at the comparison site.

use std::path::{Path, PathBuf};

pub fn apps_dir(library_root: &Path) -> PathBuf {
    library_root.join("iwapps")
}

pub fn common_dir(library_root: &Path) -> PathBuf {
    apps_dir(library_root).join("common")
}

pub fn game_dir(library_root: &Path, game_id: &str) -> PathBuf {
    common_dir(library_root).join(game_id)
}

pub fn downloading_dir(library_root: &Path) -> PathBuf {
    apps_dir(library_root).join("downloading")
}

pub fn game_downloading_dir(library_root: &Path, game_id: &str) -> PathBuf {
    downloading_dir(library_root).join(game_id)
}

pub fn backup_dir(library_root: &Path) -> PathBuf {
    apps_dir(library_root).join("backup")
}

pub fn game_backup_dir(library_root: &Path, game_id: &str) -> PathBuf {
    backup_dir(library_root).join(game_id)
}

pub fn manifest_path(library_root: &Path, game_id: &str) -> PathBuf {
    apps_dir(library_root).join(format!("iwmanifest_{game_id}.json"))
}

pub fn profile_path(data_root: &Path, user_id: &str, game_id: &str) -> PathBuf {
    data_root
        .join("userdata")
        .join(user_id)
        .join(game_id)
        .join("profile.json")
}

pub fn user_profiles_dir(data_root: &Path, user_id: &str) -> PathBuf {
    data_root.join("userdata").join(user_id)
}

pub fn settings_path(data_root: &Path) -> PathBuf {
    data_root.join("iwplay-settings.json")
}

pub fn catalog_cache_path(data_root: &Path) -> PathBuf {
    data_root.join("appcache").join("delfruit-fangamelist.json")
}
