use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tokio::sync::broadcast;

use crate::models::{AppSettings, DownloadItem, FangameProfile};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInstalledPayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
    pub library_path: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GamePayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameProfileUpdatedPayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
    pub profile: FangameProfile,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadChangedPayload {
    pub items: Vec<DownloadItem>,
    pub item: DownloadItem,
}

#[derive(Clone, Debug, Serialize)]
pub struct WebviewDownloadPayload {
    pub url: String,
    pub filename: String,
    pub filesize: u64,
}

/// Every broadcast the host process can emit. The string names are the wire
/// names the UI listens on.
#[derive(Clone, Debug)]
pub enum LauncherEvent {
    GameInstalled(GameInstalledPayload),
    GameUninstalled(GamePayload),
    GameRun(GamePayload),
    GameClose(GamePayload),
    GameProfileUpdated(GameProfileUpdatedPayload),
    DownloadUpdated(DownloadChangedPayload),
    DownloadSuccessfully(DownloadChangedPayload),
    DownloadFailed(DownloadChangedPayload),
    WebviewDownload(WebviewDownloadPayload),
    UpdateSettings(AppSettings),
}

impl LauncherEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LauncherEvent::GameInstalled(_) => "game-installed",
            LauncherEvent::GameUninstalled(_) => "game-uninstalled",
            LauncherEvent::GameRun(_) => "game-run",
            LauncherEvent::GameClose(_) => "game-close",
            LauncherEvent::GameProfileUpdated(_) => "game-profile-updated",
            LauncherEvent::DownloadUpdated(_) => "download-updated",
            LauncherEvent::DownloadSuccessfully(_) => "download-successfully",
            LauncherEvent::DownloadFailed(_) => "download-failed",
            LauncherEvent::WebviewDownload(_) => "webview-download",
            LauncherEvent::UpdateSettings(_) => "update-settings",
        }
    }
}

/// Fire-and-forget event broadcast. Events go to every connected UI surface
/// through the Tauri emitter once a handle is attached, and always to
/// in-process subscribers, so the services never depend on a window existing.
#[derive(Clone)]
pub struct EventBus {
    app: Arc<OnceCell<AppHandle>>,
    channel: broadcast::Sender<LauncherEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            app: Arc::new(OnceCell::new()),
            channel: tx,
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the Tauri handle. Events emitted before this are delivered to
    /// in-process subscribers only.
    pub fn attach(&self, handle: AppHandle) {
        let _ = self.app.set(handle);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.channel.subscribe()
    }

    pub fn emit(&self, event: LauncherEvent) {
        if let Some(app) = self.app.get() {
            let result = match &event {
                LauncherEvent::GameInstalled(p) => app.emit(event.name(), p),
                LauncherEvent::GameUninstalled(p) => app.emit(event.name(), p),
                LauncherEvent::GameRun(p) => app.emit(event.name(), p),
                LauncherEvent::GameClose(p) => app.emit(event.name(), p),
                LauncherEvent::GameProfileUpdated(p) => app.emit(event.name(), p),
                LauncherEvent::DownloadUpdated(p) => app.emit(event.name(), p),
                LauncherEvent::DownloadSuccessfully(p) => app.emit(event.name(), p),
                LauncherEvent::DownloadFailed(p) => app.emit(event.name(), p),
                LauncherEvent::WebviewDownload(p) => app.emit(event.name(), p),
                LauncherEvent::UpdateSettings(p) => app.emit(event.name(), p),
            };
            if let Err(err) = result {
                tracing::warn!("failed to emit {}: {}", event.name(), err);
            }
        }
        // No subscribers is fine, the broadcast is a side effect.
        let _ = self.channel.send(event);
    }
}
