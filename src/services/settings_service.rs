use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::errors::Result;
use crate::events::{EventBus, LauncherEvent};
use crate::models::AppSettings;
use crate::utils::{fs as fsu, paths};

/// Owns the single authoritative in-memory copy of the app settings.
/// Mutations are persisted to disk and broadcast to every UI surface; the
/// instigating surface is responsible for ignoring its own echo. Concurrent
/// writers are last-writer-wins.
#[derive(Clone)]
pub struct SettingsService {
    file: PathBuf,
    current: Arc<RwLock<AppSettings>>,
    events: EventBus,
}

impl SettingsService {
    pub fn new(data_root: &Path, events: EventBus) -> Self {
        Self {
            file: paths::settings_path(data_root),
            current: Arc::new(Default::default()),
            events,
        }
    }

    /// Reads settings from disk, falling back to defaults if the file is
    /// absent or malformed. Defaults are written back so the file exists
    /// after first run.
    pub fn load(&self) -> Result<AppSettings> {
        let settings = match fsu::read_json::<AppSettings>(&self.file) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::info!("settings unreadable ({err}), writing defaults");
                let defaults = AppSettings::default();
                fsu::write_json(&self.file, &defaults)?;
                defaults
            }
        };
        *self.write_lock() = settings.clone();
        Ok(settings)
    }

    pub fn get(&self) -> AppSettings {
        self.read_lock().clone()
    }

    /// Replaces the in-memory settings, persists them and broadcasts
    /// `update-settings`.
    pub fn set(&self, settings: AppSettings) -> Result<()> {
        *self.write_lock() = settings.clone();
        fsu::write_json(&self.file, &settings)?;
        self.events.emit(LauncherEvent::UpdateSettings(settings));
        Ok(())
    }

    /// Appends a library root unless an equivalent path is already
    /// registered. Duplicates are compared case-insensitively on the
    /// resolved path; adding one is a silent no-op.
    pub fn add_library_path(&self, path: &str) -> Result<()> {
        let mut settings = self.get();
        let candidate = normalized_for_compare(path);
        for existing in &settings.library_paths {
            if normalized_for_compare(existing) == candidate {
                return Ok(());
            }
        }
        settings.library_paths.push(path.to_string());
        self.set(settings)
    }

    /// Removes the library root at `index` from the registry only; on-disk
    /// content is never touched. Out-of-range indices are a no-op.
    pub fn remove_library_path(&self, index: usize) -> Result<()> {
        let mut settings = self.get();
        if index >= settings.library_paths.len() {
            return Ok(());
        }
        settings.library_paths.remove(index);
        self.set(settings)
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, AppSettings> {
        match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, AppSettings> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Resolves a path for duplicate comparison. Canonicalizes when the path
/// exists, then compares case-insensitively, matching how Windows treats
/// library folders.
fn normalized_for_compare(path: &str) -> String {
    let p = Path::new(path);
    let resolved = fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    resolved.to_string_lossy().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use tempfile::tempdir;

    fn service(dir: &Path) -> SettingsService {
        SettingsService::new(dir, EventBus::new())
    }

    #[test]
    fn load_writes_defaults_when_file_absent() {
        let dir = tempdir().unwrap();
        let settings = service(dir.path()).load().unwrap();
        assert!(settings.library_paths.is_empty());
        assert_eq!(settings.language, Language::En);
        assert!(paths::settings_path(dir.path()).exists());
    }

    #[test]
    fn load_falls_back_on_malformed_file() {
        let dir = tempdir().unwrap();
        fs::write(paths::settings_path(dir.path()), "{not json").unwrap();
        let settings = service(dir.path()).load().unwrap();
        assert!(settings.library_paths.is_empty());
    }

    #[test]
    fn set_persists_and_round_trips() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.load().unwrap();
        svc.set(AppSettings {
            library_paths: vec!["/games".into()],
            language: Language::Zh,
        })
        .unwrap();

        let reloaded = service(dir.path()).load().unwrap();
        assert_eq!(reloaded.library_paths, vec!["/games"]);
        assert_eq!(reloaded.language, Language::Zh);
    }

    #[test]
    fn set_broadcasts_update() {
        let dir = tempdir().unwrap();
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let svc = SettingsService::new(dir.path(), events);
        svc.load().unwrap();
        svc.set(AppSettings::default()).unwrap();
        match rx.try_recv().unwrap() {
            LauncherEvent::UpdateSettings(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn add_library_path_dedupes_case_insensitively() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.load().unwrap();
        svc.add_library_path("/games/Fangames").unwrap();
        svc.add_library_path("/games/fangames").unwrap();
        svc.add_library_path("/games/Fangames").unwrap();
        assert_eq!(svc.get().library_paths, vec!["/games/Fangames"]);
    }

    #[test]
    fn remove_library_path_removes_one_element() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.load().unwrap();
        svc.add_library_path("/a").unwrap();
        svc.add_library_path("/b").unwrap();
        svc.add_library_path("/c").unwrap();

        svc.remove_library_path(1).unwrap();
        assert_eq!(svc.get().library_paths, vec!["/a", "/c"]);

        // Out of range is a no-op, not an error.
        svc.remove_library_path(99).unwrap();
        assert_eq!(svc.get().library_paths, vec!["/a", "/c"]);
    }
}
