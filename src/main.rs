#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod commands;
mod errors;
mod events;
mod logging;
mod models;
mod services;
mod utils;

use std::path::Path;
use std::sync::Arc;

use tauri::Manager;
use tokio::sync::broadcast::error::RecvError;

use crate::events::EventBus;
use crate::services::{
    CatalogService, DelFruitClient, DownloadService, LibraryService, ManifestService,
    ProcessService, ProfileService, SettingsService,
};

#[derive(Clone)]
pub struct AppState {
    pub events: EventBus,
    pub settings: SettingsService,
    pub profiles: ProfileService,
    pub manifests: ManifestService,
    pub processes: ProcessService,
    pub library: LibraryService,
    pub downloads: DownloadService,
    pub catalog: CatalogService,
}

fn build_state(data_dir: &Path) -> AppState {
    let events = EventBus::new();
    let settings = SettingsService::new(data_dir, events.clone());
    let profiles = ProfileService::new(data_dir, events.clone());
    let manifests = ManifestService::new();
    let processes = ProcessService::new(profiles.clone(), events.clone());
    let library = LibraryService::new(manifests.clone(), processes.clone(), events.clone());
    let downloads = DownloadService::new(library.clone(), events.clone());
    let catalog = CatalogService::new(
        data_dir,
        Arc::new(DelFruitClient::new()),
        settings.clone(),
        manifests.clone(),
        processes.clone(),
    );

    AppState {
        events,
        settings,
        profiles,
        manifests,
        processes,
        library,
        downloads,
        catalog,
    }
}

fn show_main_window(app: &tauri::AppHandle) {
    if let Some(main_window) = app.get_webview_window("main") {
        let _ = main_window.show();
        let _ = main_window.unminimize();
        let _ = main_window.set_focus();
    }
}

fn main() {
    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            show_main_window(app);
        }))
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            let data_dir = app.path().app_data_dir()?;
            logging::init(&data_dir.join("logs"))?;
            tracing::info!("starting IWPlay {}", env!("CARGO_PKG_VERSION"));

            let state = Arc::new(build_state(&data_dir));
            state.events.attach(app.handle().clone());
            state.settings.load()?;

            // Partial transfers from a crashed session are useless, drop them.
            for root in state.settings.get().library_paths {
                if let Err(err) = state.library.clear_downloading(Path::new(&root)) {
                    tracing::warn!("could not clear downloading dir in {root}: {err}");
                }
            }

            // Keep the catalog view patched from broadcasts between refreshes.
            let catalog = state.catalog.clone();
            let mut receiver = state.events.subscribe();
            tauri::async_runtime::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => catalog.apply_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("catalog event listener lagged by {skipped} events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::settings::get_settings,
            commands::settings::set_settings,
            commands::settings::add_library,
            commands::settings::remove_library,
            commands::library::get_installed_fangame_ids,
            commands::library::install_game,
            commands::library::uninstall_game,
            commands::library::backup_game,
            commands::library::run_game,
            commands::library::stop_game,
            commands::library::get_running_fangame_ids,
            commands::library::create_manifest,
            commands::library::get_manifest,
            commands::library::save_manifest,
            commands::library::get_game_executables,
            commands::library::get_game_readmes,
            commands::library::get_profile,
            commands::library::save_profile,
            commands::library::get_all_profiles,
            commands::library::select_install_package,
            commands::library::open_game_directory,
            commands::download::start_download,
            commands::download::get_download_items,
            commands::download::notify_webview_download,
            commands::catalog::fetch_fangame_items,
            commands::catalog::get_fangame_items,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
