use std::path::Path;
use std::sync::Arc;

use tauri::State;

use crate::models::DownloadItem;
use crate::AppState;

#[tauri::command]
pub async fn start_download(
    library_path: String,
    game_id: String,
    game_name: String,
    url: String,
    filename: String,
    filesize: u64,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .downloads
        .start_download(
            Path::new(&library_path),
            &game_id,
            &game_name,
            &url,
            &filename,
            filesize,
        )
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_download_items(
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<DownloadItem>, String> {
    Ok(state.downloads.list())
}

#[tauri::command]
pub async fn notify_webview_download(
    url: String,
    filename: String,
    filesize: u64,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .downloads
        .notify_webview_download(&url, &filename, filesize);
    Ok(())
}
