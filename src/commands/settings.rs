use std::sync::Arc;

use tauri::State;

use crate::models::AppSettings;
use crate::AppState;

#[tauri::command]
pub async fn get_settings(state: State<'_, Arc<AppState>>) -> Result<AppSettings, String> {
    Ok(state.settings.get())
}

#[tauri::command]
pub async fn set_settings(
    settings: AppSettings,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state.settings.set(settings).map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn add_library(path: String, state: State<'_, Arc<AppState>>) -> Result<(), String> {
    state
        .settings
        .add_library_path(&path)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn remove_library(index: usize, state: State<'_, Arc<AppState>>) -> Result<(), String> {
    state
        .settings
        .remove_library_path(index)
        .map_err(|err| err.to_string())
}
