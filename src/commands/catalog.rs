use std::sync::Arc;

use tauri::State;

use crate::models::FangameItem;
use crate::AppState;

/// Refreshes the catalog view. The scrape uses blocking I/O, so it runs on
/// the blocking pool rather than the async runtime.
#[tauri::command]
pub async fn fetch_fangame_items(
    from_remote_first: bool,
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<FangameItem>, String> {
    let catalog = state.catalog.clone();
    tauri::async_runtime::spawn_blocking(move || catalog.fetch_fangame_items(from_remote_first))
        .await
        .map_err(|err| err.to_string())?
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_fangame_items(
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<FangameItem>, String> {
    Ok(state.catalog.items())
}
