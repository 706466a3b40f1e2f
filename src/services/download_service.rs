use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::errors::{LauncherError, Result};
use crate::events::{DownloadChangedPayload, EventBus, LauncherEvent, WebviewDownloadPayload};
use crate::models::{DownloadItem, DownloadStatus};
use crate::services::LibraryService;
use crate::utils::paths;

/// Tracks game downloads and installs them on completion. One transfer per
/// game id at a time; finished items stay in the table as history for the UI.
#[derive(Clone)]
pub struct DownloadService {
    items: Arc<Mutex<Vec<DownloadItem>>>,
    client: reqwest::Client,
    library: LibraryService,
    events: EventBus,
}

impl DownloadService {
    pub fn new(library: LibraryService, events: EventBus) -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            client: reqwest::Client::new(),
            library,
            events,
        }
    }

    pub fn list(&self) -> Vec<DownloadItem> {
        self.lock().clone()
    }

    /// Registers a download and starts the transfer in the background. Fails
    /// fast with `AlreadyDownloading` when a transfer for the same game is in
    /// flight; the check and the insert happen under one lock so two callers
    /// cannot both pass. Must be called from within the async runtime.
    pub fn start_download(
        &self,
        library_root: &Path,
        game_id: &str,
        game_name: &str,
        url: &str,
        filename: &str,
        declared_size: u64,
    ) -> Result<()> {
        // A broken downloading area should fail the request itself, not the
        // background transfer.
        let staging_dir = paths::game_downloading_dir(library_root, game_id);
        std::fs::create_dir_all(&staging_dir)?;
        let file_path = staging_dir.join(filename);
        let item = DownloadItem {
            url: url.to_string(),
            received: 0,
            size: declared_size,
            status: DownloadStatus::Downloading,
            library_path: library_root.to_string_lossy().into_owned(),
            game_id: game_id.to_string(),
            game_name: game_name.to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
        };
        {
            let mut items = self.lock();
            let in_flight = items
                .iter()
                .any(|i| i.game_id == game_id && i.status == DownloadStatus::Downloading);
            if in_flight {
                return Err(LauncherError::AlreadyDownloading(game_id.to_string()));
            }
            // A finished prior attempt for the same game is superseded.
            items.retain(|i| i.game_id != game_id);
            items.push(item.clone());
        }
        self.emit_changed(LauncherEvent::DownloadUpdated, &item);

        let service = self.clone();
        let root = library_root.to_path_buf();
        tokio::spawn(async move {
            service.run_transfer(root, item, file_path).await;
        });
        Ok(())
    }

    async fn run_transfer(&self, library_root: PathBuf, item: DownloadItem, file_path: PathBuf) {
        match self.transfer(&item, &file_path).await {
            Ok(()) => {
                let done = self.update_item(&item.game_id, |i| {
                    i.status = DownloadStatus::Succeed;
                });
                tracing::info!("download finished for game {}: {}", item.game_id, item.url);
                if let Some(done) = done {
                    self.emit_changed(LauncherEvent::DownloadSuccessfully, &done);
                }
                self.install_downloaded(&library_root, &item, &file_path).await;
            }
            Err(err) => {
                tracing::warn!("download failed for game {}: {err}", item.game_id);
                let failed = self.update_item(&item.game_id, |i| {
                    i.status = DownloadStatus::Failed;
                });
                if let Some(failed) = failed {
                    self.emit_changed(LauncherEvent::DownloadFailed, &failed);
                }
            }
        }
    }

    async fn transfer(&self, item: &DownloadItem, file_path: &Path) -> Result<()> {
        let response = self.client.get(&item.url).send().await?.error_for_status()?;
        // Prefer the server's length over the declared one when present.
        if let Some(total) = response.content_length() {
            if let Some(updated) = self.update_item(&item.game_id, |i| i.size = total) {
                self.emit_changed(LauncherEvent::DownloadUpdated, &updated);
            }
        }

        let mut file = tokio::fs::File::create(file_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            let updated = self.update_item(&item.game_id, |i| {
                i.received += chunk.len() as u64;
            });
            if let Some(updated) = updated {
                self.emit_changed(LauncherEvent::DownloadUpdated, &updated);
            }
        }
        file.flush().await?;
        Ok(())
    }

    /// Hands the finished archive to the library. Install runs on the
    /// blocking pool; a failed install downgrades the item to failed so the
    /// UI does not show a phantom success.
    async fn install_downloaded(&self, library_root: &Path, item: &DownloadItem, file_path: &Path) {
        let library = self.library.clone();
        let root = library_root.to_path_buf();
        let game_id = item.game_id.clone();
        let game_name = item.game_name.clone();
        let source = file_path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            library.install_game(&root, &game_id, &game_name, &source)
        })
        .await;

        let failed = match result {
            Ok(Ok(_)) => false,
            Ok(Err(err)) => {
                tracing::error!("install after download failed for game {}: {err}", item.game_id);
                true
            }
            Err(err) => {
                tracing::error!("install task for game {} panicked: {err}", item.game_id);
                true
            }
        };
        if failed {
            if let Some(item) = self.update_item(&item.game_id, |i| {
                i.status = DownloadStatus::Failed;
            }) {
                self.emit_changed(LauncherEvent::DownloadFailed, &item);
            }
        }
    }

    /// Relays a download the embedded browser intercepted, so the UI can ask
    /// which library to install into before anything is transferred.
    pub fn notify_webview_download(&self, url: &str, filename: &str, filesize: u64) {
        self.events.emit(LauncherEvent::WebviewDownload(WebviewDownloadPayload {
            url: url.to_string(),
            filename: filename.to_string(),
            filesize,
        }));
    }

    fn update_item<F: FnOnce(&mut DownloadItem)>(
        &self,
        game_id: &str,
        apply: F,
    ) -> Option<DownloadItem> {
        let mut items = self.lock();
        let item = items.iter_mut().find(|i| i.game_id == game_id)?;
        apply(item);
        Some(item.clone())
    }

    fn emit_changed(
        &self,
        wrap: fn(DownloadChangedPayload) -> LauncherEvent,
        item: &DownloadItem,
    ) {
        let payload = DownloadChangedPayload {
            items: self.lock().clone(),
            item: item.clone(),
        };
        self.events.emit(wrap(payload));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DownloadItem>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ManifestService, ProcessService, ProfileService};
    use std::time::Duration;
    use tempfile::tempdir;

    fn service(data_root: &Path) -> (DownloadService, EventBus) {
        let events = EventBus::new();
        let profiles = ProfileService::new(data_root, events.clone());
        let processes = ProcessService::new(profiles, events.clone());
        let library = LibraryService::new(ManifestService::new(), processes, events.clone());
        (DownloadService::new(library, events.clone()), events)
    }

    #[tokio::test]
    async fn duplicate_download_fails_fast() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(dir.path());

        // Simulate an in-flight transfer.
        svc.lock().push(DownloadItem {
            url: "http://example.invalid/game.zip".into(),
            received: 10,
            size: 100,
            status: DownloadStatus::Downloading,
            library_path: dir.path().to_string_lossy().into_owned(),
            game_id: "42".into(),
            game_name: "Busy".into(),
            file_path: String::new(),
        });

        match svc.start_download(dir.path(), "42", "Busy", "http://example.invalid/z", "z.zip", 0) {
            Err(LauncherError::AlreadyDownloading(id)) => assert_eq!(id, "42"),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(svc.list().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_host_marks_item_failed() {
        let dir = tempdir().unwrap();
        let (svc, events) = service(dir.path());
        let mut rx = events.subscribe();

        // Nothing listens on port 1.
        svc.start_download(dir.path(), "7", "Refused", "http://127.0.0.1:1/game.zip", "game.zip", 0)
            .unwrap();

        let mut status = None;
        for _ in 0..200 {
            status = svc.list().iter().find(|i| i.game_id == "7").map(|i| i.status);
            if status == Some(DownloadStatus::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(status, Some(DownloadStatus::Failed));

        // The broadcast trails the table update slightly.
        let mut saw_failed = false;
        for _ in 0..200 {
            if let Ok(event) = rx.try_recv() {
                if matches!(event, LauncherEvent::DownloadFailed(_)) {
                    saw_failed = true;
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn finished_attempt_is_superseded_by_retry() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(dir.path());

        svc.lock().push(DownloadItem {
            url: "http://example.invalid/old.zip".into(),
            received: 0,
            size: 0,
            status: DownloadStatus::Failed,
            library_path: dir.path().to_string_lossy().into_owned(),
            game_id: "9".into(),
            game_name: "Retry".into(),
            file_path: String::new(),
        });

        svc.start_download(dir.path(), "9", "Retry", "http://127.0.0.1:1/new.zip", "new.zip", 0)
            .unwrap();
        let items = svc.list();
        let for_game: Vec<_> = items.iter().filter(|i| i.game_id == "9").collect();
        assert_eq!(for_game.len(), 1);
        assert!(for_game[0].url.ends_with("new.zip"));
    }

    #[tokio::test]
    async fn staging_dir_is_created_at_registration_and_failure_is_immediate() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(dir.path());

        svc.start_download(dir.path(), "4", "Staged", "http://127.0.0.1:1/g.zip", "g.zip", 0)
            .unwrap();
        assert!(paths::game_downloading_dir(dir.path(), "4").is_dir());

        // A file squatting on the downloading path makes registration fail
        // outright; no item is left behind.
        let blocked = tempdir().unwrap();
        std::fs::create_dir_all(paths::apps_dir(blocked.path())).unwrap();
        std::fs::write(paths::downloading_dir(blocked.path()), "not a dir").unwrap();
        match svc.start_download(blocked.path(), "5", "Blocked", "http://x/g.zip", "g.zip", 0) {
            Err(LauncherError::Io(_)) => {}
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!svc.list().iter().any(|i| i.game_id == "5"));
    }

    #[test]
    fn webview_download_is_relayed() {
        let dir = tempdir().unwrap();
        let (svc, events) = service(dir.path());
        let mut rx = events.subscribe();

        svc.notify_webview_download("https://delicious-fruit.com/dl/1", "game.zip", 1024);
        match rx.try_recv().unwrap() {
            LauncherEvent::WebviewDownload(p) => {
                assert_eq!(p.filename, "game.zip");
                assert_eq!(p.filesize, 1024);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
