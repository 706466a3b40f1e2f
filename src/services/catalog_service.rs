use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use scraper::{Html, Selector};

use crate::errors::{LauncherError, Result};
use crate::events::LauncherEvent;
use crate::models::{CatalogCache, CatalogEntry, CatalogUserFlags, FangameItem};
use crate::services::{ManifestService, ProcessService, SettingsService};
use crate::utils::{fs as fsu, paths};

const DELFRUIT_BASE: &str = "https://delicious-fruit.com";

/// Cache entries older than this are rejected in cache-first mode.
fn cache_max_age() -> Duration {
    Duration::days(1)
}

/// The remote catalog as the reconciler sees it. Implemented against
/// DelFruit in production, mocked in tests.
pub trait CatalogRemote: Send + Sync {
    fn fetch_fangame_list(&self) -> Result<Vec<CatalogEntry>>;
    fn fetch_user_flags(&self) -> Result<CatalogUserFlags>;
    fn is_authenticated(&self) -> bool;
}

/// Scrapes the DelFruit rating pages. All requests are blocking; callers run
/// on a command thread, never inside the async runtime.
pub struct DelFruitClient {
    client: reqwest::blocking::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl DelFruitClient {
    pub fn new() -> Self {
        Self::with_base_url(DELFRUIT_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: None,
        }
    }

    pub fn set_session_cookie(&mut self, cookie: Option<String>) {
        self.session_cookie = cookie;
    }

    fn get(&self, path: &str) -> Result<String> {
        let mut request = self.client.get(format!("{}{path}", self.base_url));
        if let Some(cookie) = &self.session_cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        Ok(request.send()?.error_for_status()?.text()?)
    }
}

impl Default for DelFruitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogRemote for DelFruitClient {
    fn fetch_fangame_list(&self) -> Result<Vec<CatalogEntry>> {
        let html = self.get("/ratings/full.php?q=ALL")?;
        parse_fangame_list(&html)
    }

    fn fetch_user_flags(&self) -> Result<CatalogUserFlags> {
        let html = self.get("/profile.php")?;
        parse_user_flags(&html)
    }

    fn is_authenticated(&self) -> bool {
        self.session_cookie.is_some()
    }
}

/// Parses the full ratings table: every anchor inside the table body is one
/// game, its id carried in the href query string.
fn parse_fangame_list(html: &str) -> Result<Vec<CatalogEntry>> {
    let doc = Html::parse_document(html);
    let anchors = selector("tbody a")?;

    let mut entries = Vec::new();
    for element in doc.select(&anchors) {
        let id = element
            .value()
            .attr("href")
            .and_then(|href| href.split('=').nth(1))
            .map(str::to_string);
        let name = element.text().collect::<String>().trim().to_string();
        if let Some(id) = id {
            if !id.is_empty() && !name.is_empty() {
                entries.push(CatalogEntry { id, name });
            }
        }
    }
    if entries.is_empty() {
        return Err(LauncherError::Fetch(
            "catalog page contained no games".to_string(),
        ));
    }
    Ok(entries)
}

/// Parses the per-user profile page. Each flag list is a table with a known
/// element id; game ids are carried in the anchor hrefs like the main list.
fn parse_user_flags(html: &str) -> Result<CatalogUserFlags> {
    let doc = Html::parse_document(html);
    let mut flags = CatalogUserFlags::default();
    for (table_id, set) in [
        ("favorites", &mut flags.favorites),
        ("cleared", &mut flags.cleared),
        ("bookmarks", &mut flags.bookmarks),
    ] {
        let anchors = selector(&format!("#{table_id} a"))?;
        for element in doc.select(&anchors) {
            if let Some(id) = element
                .value()
                .attr("href")
                .and_then(|href| href.split('=').nth(1))
            {
                set.insert(id.to_string());
            }
        }
    }
    Ok(flags)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| LauncherError::Fetch(format!("bad selector {css}: {err}")))
}

/// Merges the remote catalog with local installed/running/user-flag state
/// into the UI-facing item list. The list is rebuilt wholesale on refresh and
/// patched in place by broadcast events in between.
#[derive(Clone)]
pub struct CatalogService {
    cache_file: PathBuf,
    remote: Arc<dyn CatalogRemote>,
    view: Arc<Mutex<Vec<FangameItem>>>,
    settings: SettingsService,
    manifests: ManifestService,
    processes: ProcessService,
}

impl CatalogService {
    pub fn new(
        data_root: &Path,
        remote: Arc<dyn CatalogRemote>,
        settings: SettingsService,
        manifests: ManifestService,
        processes: ProcessService,
    ) -> Self {
        Self {
            cache_file: paths::catalog_cache_path(data_root),
            remote,
            view: Arc::new(Mutex::new(Vec::new())),
            settings,
            manifests,
            processes,
        }
    }

    pub fn items(&self) -> Vec<FangameItem> {
        self.lock().clone()
    }

    /// Fetches the raw catalog with the two-path fallback, then reconciles it
    /// with local state. On failure the previous view is left untouched.
    pub fn fetch_fangame_items(&self, from_remote_first: bool) -> Result<Vec<FangameItem>> {
        let entries = if from_remote_first {
            match self.fetch_remote_and_persist() {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("remote catalog fetch failed ({err}), trying cache");
                    // Any cache is better than nothing here.
                    self.load_cache(None)?
                }
            }
        } else {
            match self.load_cache(Some(cache_max_age())) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::info!("catalog cache unusable ({err}), fetching remote");
                    self.fetch_remote_and_persist()?
                }
            }
        };

        let mut items: Vec<FangameItem> = entries.into_iter().map(FangameItem::from_entry).collect();

        for root in self.settings.get().library_paths {
            let root_path = Path::new(&root);
            // A missing drive should not take the whole catalog down.
            let installed = match self.manifests.installed_ids(root_path) {
                Ok(ids) => ids,
                Err(err) => {
                    tracing::warn!("cannot enumerate library {root}: {err}");
                    continue;
                }
            };
            for id in installed {
                if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                    item.is_installed = true;
                    item.library_path = Some(root.clone());
                    self.repair_manifest(root_path, &id, &item.name);
                }
            }
        }

        for id in self.processes.running_ids() {
            if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                item.is_running = true;
            }
        }

        if self.remote.is_authenticated() {
            match self.remote.fetch_user_flags() {
                Ok(flags) => {
                    for item in &mut items {
                        item.is_favorite = flags.favorites.contains(&item.id);
                        item.is_cleared = flags.cleared.contains(&item.id);
                        item.is_bookmarked = flags.bookmarks.contains(&item.id);
                    }
                }
                Err(err) => tracing::debug!("skipping user flags: {err}"),
            }
        }

        *self.lock() = items.clone();
        Ok(items)
    }

    /// Regenerates a missing or unreadable manifest for an installed game.
    fn repair_manifest(&self, root: &Path, game_id: &str, game_name: &str) {
        if self.manifests.get(root, game_id).is_ok() {
            return;
        }
        if let Err(err) = self.manifests.create(root, game_id, game_name) {
            tracing::warn!("manifest repair failed for game {game_id}: {err}");
        }
    }

    /// Patches the current view from a broadcast event, between refreshes.
    pub fn apply_event(&self, event: &LauncherEvent) {
        let mut view = self.lock();
        match event {
            LauncherEvent::GameInstalled(p) => {
                for item in view.iter_mut().filter(|i| i.id == p.game_id) {
                    item.is_installed = true;
                    item.library_path = Some(p.library_path.clone());
                }
            }
            LauncherEvent::GameUninstalled(p) => {
                for item in view.iter_mut().filter(|i| i.id == p.game_id) {
                    item.is_installed = false;
                    item.library_path = None;
                }
            }
            LauncherEvent::GameRun(p) => {
                for item in view.iter_mut().filter(|i| i.id == p.game_id) {
                    item.is_running = true;
                }
            }
            LauncherEvent::GameClose(p) => {
                for item in view.iter_mut().filter(|i| i.id == p.game_id) {
                    item.is_running = false;
                }
            }
            LauncherEvent::GameProfileUpdated(p) => {
                if let Some(cleared) = p.profile.cleared {
                    for item in view.iter_mut().filter(|i| i.id == p.game_id) {
                        item.is_cleared = cleared;
                    }
                }
            }
            _ => {}
        }
    }

    fn fetch_remote_and_persist(&self) -> Result<Vec<CatalogEntry>> {
        let list = self.remote.fetch_fangame_list()?;
        let cache = CatalogCache {
            fetchdate: Utc::now(),
            list: list.clone(),
        };
        if let Err(err) = fsu::write_json(&self.cache_file, &cache) {
            tracing::warn!("failed to persist catalog cache: {err}");
        }
        Ok(list)
    }

    fn load_cache(&self, max_age: Option<Duration>) -> Result<Vec<CatalogEntry>> {
        let cache: CatalogCache = fsu::read_json(&self.cache_file)
            .map_err(|_| LauncherError::Fetch("no usable catalog cache".to_string()))?;
        if let Some(max_age) = max_age {
            if Utc::now() - cache.fetchdate >= max_age {
                return Err(LauncherError::Fetch("catalog cache is stale".to_string()));
            }
        }
        Ok(cache.list)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FangameItem>> {
        match self.view.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, GamePayload};
    use crate::services::ProfileService;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct MockRemote {
        list: Mutex<Option<Vec<CatalogEntry>>>,
        flags: CatalogUserFlags,
        authenticated: bool,
        list_calls: AtomicUsize,
    }

    fn entries_of(entries: &[(&str, &str)]) -> Vec<CatalogEntry> {
        entries
            .iter()
            .map(|(id, name)| CatalogEntry {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    impl MockRemote {
        fn new(entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                list: Mutex::new(Some(entries_of(entries))),
                flags: CatalogUserFlags::default(),
                authenticated: false,
                list_calls: AtomicUsize::new(0),
            })
        }

        fn authenticated(entries: &[(&str, &str)], flags: CatalogUserFlags) -> Arc<Self> {
            Arc::new(Self {
                list: Mutex::new(Some(entries_of(entries))),
                flags,
                authenticated: true,
                list_calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            let remote = Self::new(&[]);
            remote.set_list(None);
            remote
        }

        fn set_list(&self, list: Option<Vec<CatalogEntry>>) {
            *self.list.lock().unwrap() = list;
        }
    }

    impl CatalogRemote for MockRemote {
        fn fetch_fangame_list(&self) -> Result<Vec<CatalogEntry>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.list
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LauncherError::Fetch("remote down".to_string()))
        }

        fn fetch_user_flags(&self) -> Result<CatalogUserFlags> {
            Ok(self.flags.clone())
        }

        fn is_authenticated(&self) -> bool {
            self.authenticated
        }
    }

    fn build(data_root: &Path, remote: Arc<MockRemote>) -> (CatalogService, SettingsService) {
        let events = EventBus::new();
        let settings = SettingsService::new(data_root, events.clone());
        settings.load().unwrap();
        let profiles = ProfileService::new(data_root, events.clone());
        let processes = ProcessService::new(profiles, events);
        let svc = CatalogService::new(
            data_root,
            remote,
            settings.clone(),
            ManifestService::new(),
            processes,
        );
        (svc, settings)
    }

    fn write_cache(data_root: &Path, age_days: i64, entries: &[(&str, &str)]) {
        let cache = CatalogCache {
            fetchdate: Utc::now() - Duration::days(age_days),
            list: entries
                .iter()
                .map(|(id, name)| CatalogEntry {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        };
        fsu::write_json(&paths::catalog_cache_path(data_root), &cache).unwrap();
    }

    #[test]
    fn parses_ratings_table_anchors() {
        let html = r#"
            <table><tbody>
              <tr><td><a href="game_details.php?id=42">I Wanna Test</a></td></tr>
              <tr><td><a href="game_details.php?id=7">I Wanna Seven</a></td></tr>
            </tbody></table>"#;
        let entries = parse_fangame_list(html).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], CatalogEntry { id: "42".into(), name: "I Wanna Test".into() });
    }

    #[test]
    fn empty_catalog_page_is_a_fetch_error() {
        match parse_fangame_list("<html><body>maintenance</body></html>") {
            Err(LauncherError::Fetch(_)) => {}
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn network_first_persists_cache_and_marks_installed() {
        let dir = tempdir().unwrap();
        let remote = MockRemote::new(&[("42", "I Wanna Test"), ("7", "I Wanna Seven")]);
        let (svc, settings) = build(dir.path(), remote);

        let library = dir.path().join("library");
        fs::create_dir_all(paths::game_dir(&library, "42")).unwrap();
        fs::write(paths::game_dir(&library, "42").join("game.exe"), [0u8; 4]).unwrap();
        settings
            .add_library_path(&library.to_string_lossy())
            .unwrap();

        let items = svc.fetch_fangame_items(true).unwrap();
        let installed = items.iter().find(|i| i.id == "42").unwrap();
        assert!(installed.is_installed);
        assert_eq!(installed.library_path.as_deref(), Some(&*library.to_string_lossy()));
        assert!(!items.iter().find(|i| i.id == "7").unwrap().is_installed);
        // Cache file was written, and the missing manifest was repaired.
        assert!(paths::catalog_cache_path(dir.path()).exists());
        assert!(paths::manifest_path(&library, "42").exists());
    }

    #[test]
    fn network_failure_falls_back_to_stale_cache() {
        let dir = tempdir().unwrap();
        write_cache(dir.path(), 10, &[("5", "Old But Gold")]);
        let (svc, _) = build(dir.path(), MockRemote::failing());

        let items = svc.fetch_fangame_items(true).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "5");
    }

    #[test]
    fn cache_first_rejects_two_day_old_cache() {
        let dir = tempdir().unwrap();
        write_cache(dir.path(), 2, &[("5", "Stale")]);
        let remote = MockRemote::new(&[("9", "Fresh")]);
        let (svc, _) = build(dir.path(), remote.clone());

        let items = svc.fetch_fangame_items(false).unwrap();
        assert_eq!(items[0].id, "9");
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_first_uses_fresh_cache_without_network() {
        let dir = tempdir().unwrap();
        write_cache(dir.path(), 0, &[("5", "Fresh Enough")]);
        let remote = MockRemote::new(&[("9", "Unwanted")]);
        let (svc, _) = build(dir.path(), remote.clone());

        let items = svc.fetch_fangame_items(false).unwrap();
        assert_eq!(items[0].id, "5");
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn both_sources_failing_keeps_prior_view() {
        let dir = tempdir().unwrap();
        let remote = MockRemote::new(&[("42", "I Wanna Test")]);
        let (svc, _) = build(dir.path(), remote.clone());

        svc.fetch_fangame_items(true).unwrap();
        assert_eq!(svc.items().len(), 1);

        // Kill the remote and the cache.
        remote.set_list(None);
        fs::remove_file(paths::catalog_cache_path(dir.path())).unwrap();

        match svc.fetch_fangame_items(true) {
            Err(LauncherError::Fetch(_)) => {}
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(svc.items().len(), 1);
    }

    #[test]
    fn user_flags_merge_when_authenticated() {
        let dir = tempdir().unwrap();
        let mut flags = CatalogUserFlags::default();
        flags.favorites.insert("42".to_string());
        flags.cleared.insert("7".to_string());
        let remote = MockRemote::authenticated(&[("42", "Fav"), ("7", "Done")], flags);
        let (svc, _) = build(dir.path(), remote);

        let items = svc.fetch_fangame_items(true).unwrap();
        assert!(items.iter().find(|i| i.id == "42").unwrap().is_favorite);
        assert!(items.iter().find(|i| i.id == "7").unwrap().is_cleared);
        assert!(!items.iter().find(|i| i.id == "7").unwrap().is_bookmarked);
    }

    #[test]
    fn events_patch_view_in_place() {
        let dir = tempdir().unwrap();
        let remote = MockRemote::new(&[("42", "I Wanna Test")]);
        let (svc, _) = build(dir.path(), remote);
        svc.fetch_fangame_items(true).unwrap();

        svc.apply_event(&LauncherEvent::GameRun(GamePayload { game_id: "42".into() }));
        assert!(svc.items()[0].is_running);

        svc.apply_event(&LauncherEvent::GameClose(GamePayload { game_id: "42".into() }));
        assert!(!svc.items()[0].is_running);
    }
}
