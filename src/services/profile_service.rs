use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{LauncherError, Result};
use crate::events::{EventBus, GameProfileUpdatedPayload, LauncherEvent};
use crate::models::FangameProfile;
use crate::utils::{fs as fsu, paths};

/// Multi-user accounts never shipped; every profile lives under this scope.
const USER_ID: &str = "guest";

/// Reads and writes per-game play profiles under the user-data area.
#[derive(Clone)]
pub struct ProfileService {
    profiles_dir: PathBuf,
    events: EventBus,
}

impl ProfileService {
    pub fn new(data_root: &Path, events: EventBus) -> Self {
        Self {
            profiles_dir: paths::user_profiles_dir(data_root, USER_ID),
            events,
        }
    }

    fn profile_path(&self, game_id: &str) -> PathBuf {
        self.profiles_dir.join(game_id).join("profile.json")
    }

    /// Fails closed with `ProfileMissing` when the file is absent or
    /// unparsable. Callers treat that as zero play time, not as a
    /// user-visible error.
    pub fn get(&self, game_id: &str) -> Result<FangameProfile> {
        fsu::read_json(&self.profile_path(game_id))
            .map_err(|_| LauncherError::ProfileMissing(game_id.to_string()))
    }

    pub fn save(&self, game_id: &str, profile: &FangameProfile) -> Result<()> {
        fsu::write_json(&self.profile_path(game_id), profile)?;
        self.events
            .emit(LauncherEvent::GameProfileUpdated(GameProfileUpdatedPayload {
                game_id: game_id.to_string(),
                profile: profile.clone(),
            }));
        Ok(())
    }

    /// Every readable profile, keyed by game id. Corrupt or partially
    /// written files are skipped so one bad profile cannot abort the listing.
    pub fn all(&self) -> Result<HashMap<String, FangameProfile>> {
        fs::create_dir_all(&self.profiles_dir)?;

        let mut profiles = HashMap::new();
        for entry in fs::read_dir(&self.profiles_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let game_id = entry.file_name().to_string_lossy().into_owned();
            match fsu::read_json::<FangameProfile>(&self.profile_path(&game_id)) {
                Ok(profile) => {
                    profiles.insert(game_id, profile);
                }
                Err(err) => {
                    tracing::debug!("skipping unreadable profile for {game_id}: {err}");
                }
            }
        }
        Ok(profiles)
    }
}
