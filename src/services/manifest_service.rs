use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::errors::{LauncherError, Result};
use crate::models::{FangameManifest, GameReadme};
use crate::utils::{fs as fsu, paths};

/// Reads and writes per-game manifests inside a library root, and owns the
/// canonical enumeration of installed game ids.
#[derive(Clone, Default)]
pub struct ManifestService;

/// Game ids are non-negative integer strings: digits only, no leading zeros,
/// must fit `u64`. Anything else in `common/` is treated as a stray
/// directory, not a game.
pub fn is_valid_game_id(id: &str) -> bool {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if id.len() > 1 && id.starts_with('0') {
        return false;
    }
    id.parse::<u64>().is_ok()
}

impl ManifestService {
    pub fn new() -> Self {
        Self
    }

    /// Idempotently creates `common/`, `downloading/` and `backup/` under the
    /// library's apps directory.
    pub fn ensure_layout(&self, library_root: &Path) -> Result<()> {
        fs::create_dir_all(paths::common_dir(library_root))?;
        fs::create_dir_all(paths::downloading_dir(library_root))?;
        fs::create_dir_all(paths::backup_dir(library_root))?;
        Ok(())
    }

    /// Enumerates game directories under `common/`, filtered to valid ids.
    pub fn installed_ids(&self, library_root: &Path) -> Result<Vec<String>> {
        self.ensure_layout(library_root)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(paths::common_dir(library_root))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_valid_game_id(&name) {
                ids.push(name);
            }
        }
        ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
        Ok(ids)
    }

    /// Regenerates the manifest for an installed game: scans the game
    /// directory for startup-executable candidates and computes the size on
    /// disk. The startup path is set only when exactly one candidate exists;
    /// otherwise it stays empty for the user to resolve. Any prior manifest
    /// is overwritten.
    pub fn create(
        &self,
        library_root: &Path,
        game_id: &str,
        game_name: &str,
    ) -> Result<FangameManifest> {
        self.ensure_layout(library_root)?;

        let game_dir = paths::game_dir(library_root, game_id);
        if !game_dir.is_dir() {
            return Err(LauncherError::NotInstalled(game_id.to_string()));
        }

        let executables = self.game_executables(library_root, game_id)?;
        let startup_path = if executables.len() == 1 {
            executables[0].clone()
        } else {
            String::new()
        };

        let manifest = FangameManifest {
            id: game_id.to_string(),
            name: game_name.to_string(),
            installed_at: Utc::now(),
            startup_path,
            size_on_disk: fsu::dir_size(&game_dir)?,
            resize: false,
        };
        self.save(library_root, game_id, &manifest)?;
        Ok(manifest)
    }

    /// Fails closed: a missing or unparsable manifest file is reported as
    /// `ManifestMissing`, never as a raw parse error.
    pub fn get(&self, library_root: &Path, game_id: &str) -> Result<FangameManifest> {
        fsu::read_json(&paths::manifest_path(library_root, game_id))
            .map_err(|_| LauncherError::ManifestMissing(game_id.to_string()))
    }

    pub fn save(
        &self,
        library_root: &Path,
        game_id: &str,
        manifest: &FangameManifest,
    ) -> Result<()> {
        fsu::write_json(&paths::manifest_path(library_root, game_id), manifest)
    }

    pub fn remove(&self, library_root: &Path, game_id: &str) -> Result<()> {
        let manifest_path = paths::manifest_path(library_root, game_id);
        if manifest_path.exists() {
            fs::remove_file(manifest_path)?;
        }
        Ok(())
    }

    /// All startup-executable candidates in a game directory, relative to it.
    pub fn game_executables(&self, library_root: &Path, game_id: &str) -> Result<Vec<String>> {
        let game_dir = paths::game_dir(library_root, game_id);
        let mut found = Vec::new();
        for rel in fsu::walk_relative_files(&game_dir)? {
            let is_exe = rel
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("exe"))
                .unwrap_or(false);
            if is_exe {
                found.push(rel.to_string_lossy().into_owned());
            }
        }
        found.sort();
        Ok(found)
    }

    /// All readme (.txt) files in a game directory, content included.
    /// Non-UTF-8 bytes are replaced rather than failing the listing.
    pub fn game_readmes(&self, library_root: &Path, game_id: &str) -> Result<Vec<GameReadme>> {
        let game_dir = paths::game_dir(library_root, game_id);
        let mut found = Vec::new();
        for rel in fsu::walk_relative_files(&game_dir)? {
            let is_txt = rel
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("txt"))
                .unwrap_or(false);
            if !is_txt {
                continue;
            }
            let full_path = game_dir.join(&rel);
            let content = String::from_utf8_lossy(&fs::read(&full_path)?).into_owned();
            found.push(GameReadme {
                name: rel
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                content,
                path: full_path.to_string_lossy().into_owned(),
            });
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }
}
