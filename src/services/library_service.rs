use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{LauncherError, Result};
use crate::events::{EventBus, GameInstalledPayload, GamePayload, LauncherEvent};
use crate::models::FangameManifest;
use crate::services::manifest_service::is_valid_game_id;
use crate::services::{ManifestService, ProcessService};
use crate::utils::{fs as fsu, paths};

/// How long a replaced instance gets to finish exit bookkeeping before a
/// relaunch gives up.
const RELAUNCH_WAIT: Duration = Duration::from_secs(5);

/// Orchestrates installs, uninstalls, backups and launches within library
/// roots. Owns no state of its own; everything lives on disk or in the
/// process table.
#[derive(Clone)]
pub struct LibraryService {
    manifests: ManifestService,
    processes: ProcessService,
    events: EventBus,
}

impl LibraryService {
    pub fn new(manifests: ManifestService, processes: ProcessService, events: EventBus) -> Self {
        Self {
            manifests,
            processes,
            events,
        }
    }

    pub fn installed_ids(&self, library_root: &Path) -> Result<Vec<String>> {
        self.manifests.installed_ids(library_root)
    }

    /// Installs a game from an archive, a bare executable or a directory.
    /// An existing install of the same id is backed up and removed first, so
    /// a re-download never merges old and new files. Emits `game-installed`.
    pub fn install_game(
        &self,
        library_root: &Path,
        game_id: &str,
        game_name: &str,
        source: &Path,
    ) -> Result<FangameManifest> {
        if !is_valid_game_id(game_id) {
            return Err(LauncherError::InvalidGameId(game_id.to_string()));
        }
        self.manifests.ensure_layout(library_root)?;

        let game_dir = paths::game_dir(library_root, game_id);
        if game_dir.is_dir() {
            self.backup_game(library_root, game_id)?;
            self.uninstall_game(library_root, game_id)?;
        }
        fs::create_dir_all(&game_dir)?;

        // A directory is copied wholesale, a bare executable is copied as-is,
        // anything else is assumed to be an archive.
        if source.is_dir() {
            fsu::copy_dir_recursive(source, &game_dir)?;
        } else if source
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("exe"))
            .unwrap_or(false)
        {
            let file_name = source.file_name().ok_or_else(|| {
                LauncherError::Config(format!("bad source path {}", source.display()))
            })?;
            fs::copy(source, game_dir.join(file_name))?;
        } else {
            fsu::extract_zip(source, &game_dir)?;
        }

        let manifest = self.manifests.create(library_root, game_id, game_name)?;
        tracing::info!(
            "installed game {game_id} ({game_name}) into {}",
            library_root.display()
        );
        self.events.emit(LauncherEvent::GameInstalled(GameInstalledPayload {
            game_id: game_id.to_string(),
            library_path: library_root.to_string_lossy().into_owned(),
        }));
        Ok(manifest)
    }

    /// Removes the game directory and its manifest. Idempotent; emits
    /// `game-uninstalled` either way so stale UI state gets corrected.
    pub fn uninstall_game(&self, library_root: &Path, game_id: &str) -> Result<()> {
        let game_dir = paths::game_dir(library_root, game_id);
        if game_dir.is_dir() {
            fs::remove_dir_all(&game_dir)?;
        }
        self.manifests.remove(library_root, game_id)?;
        self.events.emit(LauncherEvent::GameUninstalled(GamePayload {
            game_id: game_id.to_string(),
        }));
        Ok(())
    }

    /// Copies the installed game directory into `backup/<id>`, replacing any
    /// prior backup. Save files inside the game directory travel with it.
    /// No-op when the game is not installed.
    pub fn backup_game(&self, library_root: &Path, game_id: &str) -> Result<()> {
        let game_dir = paths::game_dir(library_root, game_id);
        if !game_dir.is_dir() {
            tracing::debug!("nothing to back up for game {game_id}");
            return Ok(());
        }
        let backup_dir = paths::game_backup_dir(library_root, game_id);
        if backup_dir.is_dir() {
            fs::remove_dir_all(&backup_dir)?;
        }
        fs::create_dir_all(&backup_dir)?;
        fsu::copy_dir_recursive(&game_dir, &backup_dir)
    }

    /// Launches a game by its manifest startup path. A still-running prior
    /// instance is terminated and fully reaped before the new one starts, so
    /// its play time lands in the profile first.
    pub fn run_game(&self, library_root: &Path, game_id: &str) -> Result<u32> {
        let manifest = self.manifests.get(library_root, game_id)?;
        if manifest.startup_path.is_empty() {
            return Err(LauncherError::NoStartupPath(game_id.to_string()));
        }
        let executable = paths::game_dir(library_root, game_id).join(&manifest.startup_path);
        if !executable.is_file() {
            return Err(LauncherError::Launch(format!(
                "startup executable missing: {}",
                executable.display()
            )));
        }

        if !self.processes.stop_and_wait(game_id, RELAUNCH_WAIT) {
            return Err(LauncherError::Launch(format!(
                "previous instance of game {game_id} would not exit"
            )));
        }

        let pid = self.processes.spawn_game(game_id, &executable)?;
        if manifest.resize {
            self.processes.request_resize(pid);
        }
        Ok(pid)
    }

    /// Terminates a running game. Not an error when it is not running.
    pub fn stop_game(&self, game_id: &str) {
        self.processes.stop(game_id);
    }

    /// Drops any partial transfers left in `downloading/` from a previous
    /// session and recreates the directory empty.
    pub fn clear_downloading(&self, library_root: &Path) -> Result<()> {
        let dir = paths::downloading_dir(library_root);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(())
    }
}
