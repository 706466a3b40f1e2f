use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tauri::{AppHandle, State};
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_shell::ShellExt;

use crate::models::{FangameManifest, FangameProfile, GameReadme};
use crate::utils::paths;
use crate::AppState;

#[tauri::command]
pub async fn get_installed_fangame_ids(
    library_path: String,
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<String>, String> {
    state
        .library
        .installed_ids(Path::new(&library_path))
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn install_game(
    library_path: String,
    game_id: String,
    game_name: String,
    source_path: String,
    state: State<'_, Arc<AppState>>,
) -> Result<FangameManifest, String> {
    let library = state.library.clone();
    tauri::async_runtime::spawn_blocking(move || {
        library.install_game(
            Path::new(&library_path),
            &game_id,
            &game_name,
            Path::new(&source_path),
        )
    })
    .await
    .map_err(|err| err.to_string())?
    .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn uninstall_game(
    library_path: String,
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    let library = state.library.clone();
    tauri::async_runtime::spawn_blocking(move || {
        library.uninstall_game(Path::new(&library_path), &game_id)
    })
    .await
    .map_err(|err| err.to_string())?
    .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn backup_game(
    library_path: String,
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    let library = state.library.clone();
    tauri::async_runtime::spawn_blocking(move || {
        library.backup_game(Path::new(&library_path), &game_id)
    })
    .await
    .map_err(|err| err.to_string())?
    .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn run_game(
    library_path: String,
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<u32, String> {
    // Replacing a running instance waits for its exit bookkeeping, so this
    // must not occupy a runtime worker.
    let library = state.library.clone();
    tauri::async_runtime::spawn_blocking(move || {
        library.run_game(Path::new(&library_path), &game_id)
    })
    .await
    .map_err(|err| err.to_string())?
    .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn stop_game(game_id: String, state: State<'_, Arc<AppState>>) -> Result<(), String> {
    state.library.stop_game(&game_id);
    Ok(())
}

#[tauri::command]
pub async fn get_running_fangame_ids(
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<String>, String> {
    Ok(state.processes.running_ids())
}

#[tauri::command]
pub async fn create_manifest(
    library_path: String,
    game_id: String,
    game_name: String,
    state: State<'_, Arc<AppState>>,
) -> Result<FangameManifest, String> {
    state
        .manifests
        .create(Path::new(&library_path), &game_id, &game_name)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_manifest(
    library_path: String,
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<FangameManifest, String> {
    state
        .manifests
        .get(Path::new(&library_path), &game_id)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn save_manifest(
    library_path: String,
    game_id: String,
    manifest: FangameManifest,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .manifests
        .save(Path::new(&library_path), &game_id, &manifest)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_game_executables(
    library_path: String,
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<String>, String> {
    state
        .manifests
        .game_executables(Path::new(&library_path), &game_id)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_game_readmes(
    library_path: String,
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<GameReadme>, String> {
    state
        .manifests
        .game_readmes(Path::new(&library_path), &game_id)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_profile(
    game_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<FangameProfile, String> {
    state.profiles.get(&game_id).map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn save_profile(
    game_id: String,
    profile: FangameProfile,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .profiles
        .save(&game_id, &profile)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_all_profiles(
    state: State<'_, Arc<AppState>>,
) -> Result<HashMap<String, FangameProfile>, String> {
    state.profiles.all().map_err(|err| err.to_string())
}

/// Opens a native picker for a game package. Runs as a sync command so the
/// blocking dialog never parks the async runtime.
#[tauri::command]
pub fn select_install_package(app: AppHandle) -> Option<String> {
    app.dialog()
        .file()
        .add_filter("Game package", &["zip", "exe"])
        .blocking_pick_file()
        .map(|file| file.to_string())
}

#[tauri::command]
pub async fn open_game_directory(
    library_path: String,
    game_id: String,
    app: AppHandle,
) -> Result<(), String> {
    let dir = paths::game_dir(Path::new(&library_path), &game_id);
    app.shell()
        .open(dir.to_string_lossy(), None)
        .map_err(|err| err.to_string())
}
