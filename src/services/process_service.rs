use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{LauncherError, Result};
use crate::events::{EventBus, GamePayload, LauncherEvent};
use crate::services::ProfileService;

/// Fangames are GameMaker-era 800x608 windows; the resize helper restores
/// that size for games that misbehave on modern DPI settings.
const RESIZE_WIDTH: u32 = 800;
const RESIZE_HEIGHT: u32 = 608;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningFangame {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Supervises running game processes: at most one per game id, forceful
/// whole-tree termination, wall-clock play-time accounting persisted to the
/// profile before `game-close` is broadcast.
#[derive(Clone)]
pub struct ProcessService {
    running: Arc<Mutex<HashMap<String, RunningFangame>>>,
    profiles: ProfileService,
    events: EventBus,
}

impl ProcessService {
    pub fn new(profiles: ProfileService, events: EventBus) -> Self {
        Self {
            running: Arc::new(Mutex::new(HashMap::new())),
            profiles,
            events,
        }
    }

    /// Launches the executable with its own directory as working directory
    /// and registers the running entry. The caller must have ensured no
    /// entry exists for `game_id`; the check-insert pair here is synchronous
    /// so concurrent launches cannot both pass.
    pub fn spawn_game(&self, game_id: &str, executable: &Path) -> Result<u32> {
        let workdir = executable.parent().ok_or_else(|| {
            LauncherError::Launch(format!("no parent directory for {}", executable.display()))
        })?;

        let mut command = Command::new(executable);
        command.current_dir(workdir);
        #[cfg(unix)]
        {
            // Own process group, so termination can take the whole tree.
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|err| {
            LauncherError::Launch(format!("failed to start {}: {err}", executable.display()))
        })?;

        let pid = child.id();
        let started_at = Utc::now();
        {
            let mut running = self.lock();
            if running.contains_key(game_id) {
                // Should have been terminated by the caller; refuse to
                // shadow the existing entry. Reap the fresh child so it
                // does not linger as a zombie.
                drop(running);
                kill_process_tree(pid);
                let _ = child.wait();
                return Err(LauncherError::Launch(format!(
                    "game {game_id} is already running"
                )));
            }
            running.insert(game_id.to_string(), RunningFangame { pid, started_at });
        }

        self.events.emit(LauncherEvent::GameRun(GamePayload {
            game_id: game_id.to_string(),
        }));

        let supervisor = self.clone();
        let id = game_id.to_string();
        thread::spawn(move || supervisor.supervise_exit(&id, child, started_at));

        Ok(pid)
    }

    /// Blocks until the child exits, then performs exit bookkeeping. The
    /// profile is persisted before the entry is removed and `game-close` is
    /// emitted, so listeners always observe a saved profile.
    fn supervise_exit(&self, game_id: &str, mut child: Child, started_at: DateTime<Utc>) {
        let pid = child.id();
        if let Err(err) = child.wait() {
            tracing::warn!("wait for game {game_id} (pid {pid}) failed: {err}");
        }

        let ended_at = Utc::now();
        let elapsed_secs =
            ((ended_at - started_at).num_milliseconds().max(0) as f64) / 1000.0;

        let mut profile = self.profiles.get(game_id).unwrap_or_default();
        profile.play_time += elapsed_secs;
        profile.last_played = Some(ended_at);
        if let Err(err) = self.profiles.save(game_id, &profile) {
            tracing::error!("failed to save profile for game {game_id}: {err}");
        }

        {
            let mut running = self.lock();
            // A replacement instance may already own the slot.
            if running.get(game_id).map(|r| r.pid) == Some(pid) {
                running.remove(game_id);
            }
        }

        self.events.emit(LauncherEvent::GameClose(GamePayload {
            game_id: game_id.to_string(),
        }));
    }

    /// Forcefully terminates the process tree of a running game. No-op when
    /// the game is not running. Exit bookkeeping happens on the supervisor
    /// thread once the process is gone.
    pub fn stop(&self, game_id: &str) {
        let pid = self.lock().get(game_id).map(|r| r.pid);
        if let Some(pid) = pid {
            kill_process_tree(pid);
        }
    }

    /// Terminates a running game and waits for its exit bookkeeping to
    /// finish (entry removed, profile saved). Returns false on timeout.
    pub fn stop_and_wait(&self, game_id: &str, timeout: Duration) -> bool {
        let pid = match self.lock().get(game_id).map(|r| r.pid) {
            Some(pid) => pid,
            None => return true,
        };
        kill_process_tree(pid);

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let still_there = self.lock().get(game_id).map(|r| r.pid) == Some(pid);
            if !still_there {
                return true;
            }
            thread::sleep(Duration::from_millis(25));
        }
        false
    }

    pub fn is_running(&self, game_id: &str) -> bool {
        self.lock().contains_key(game_id)
    }

    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Asks the external resize helper to restore the game window size,
    /// best-effort. A missing or failing helper never fails the launch.
    pub fn request_resize(&self, pid: u32) {
        #[cfg(windows)]
        {
            let helper = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join("resizer.exe")));
            if let Some(helper) = helper {
                match Command::new(&helper)
                    .args([pid.to_string(), RESIZE_WIDTH.to_string(), RESIZE_HEIGHT.to_string()])
                    .spawn()
                {
                    Ok(_) => {}
                    Err(err) => tracing::warn!("resize helper failed for pid {pid}: {err}"),
                }
            }
        }
        #[cfg(not(windows))]
        {
            tracing::debug!(
                "no resize helper on this platform (pid {pid}, {RESIZE_WIDTH}x{RESIZE_HEIGHT})"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunningFangame>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Kills the full process tree, not just the top-level process: fangames
/// routinely fork helper processes.
fn kill_process_tree(pid: u32) {
    #[cfg(windows)]
    {
        let result = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status();
        if let Err(err) = result {
            tracing::warn!("taskkill for pid {pid} failed: {err}");
        }
    }
    #[cfg(unix)]
    {
        // The game was spawned as its own process group leader; signal the
        // group and the pid itself.
        let result = Command::new("kill")
            .args(["-9", "--", &format!("-{pid}"), &pid.to_string()])
            .status();
        if let Err(err) = result {
            tracing::warn!("kill for pid {pid} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn service(data_root: &Path) -> (ProcessService, EventBus) {
        let events = EventBus::new();
        let profiles = ProfileService::new(data_root, events.clone());
        (ProcessService::new(profiles, events.clone()), events)
    }

    #[test]
    fn stop_without_running_entry_is_noop() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(dir.path());
        svc.stop("42");
        assert!(svc.stop_and_wait("42", Duration::from_millis(10)));
        assert!(svc.running_ids().is_empty());
    }

    #[cfg(unix)]
    fn write_fake_game(dir: &Path, name: &str, sleep_secs: u32) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\nsleep {sleep_secs}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn wait_until_idle(svc: &ProcessService, game_id: &str, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while svc.is_running(game_id) {
            assert!(Instant::now() < deadline, "game {game_id} never went idle");
            thread::sleep(Duration::from_millis(25));
        }
    }

    #[cfg(unix)]
    #[test]
    fn spawn_registers_entry_and_stop_terminates_tree() {
        let dir = tempdir().unwrap();
        let (svc, events) = service(dir.path());
        let mut rx = events.subscribe();

        let exe = write_fake_game(dir.path(), "game.exe", 30);
        svc.spawn_game("42", &exe).unwrap();
        assert_eq!(svc.running_ids(), vec!["42"]);

        assert!(svc.stop_and_wait("42", Duration::from_secs(5)));
        assert!(!svc.is_running("42"));

        // Run, profile update, then close, in that order. The close broadcast
        // trails the table removal slightly, so poll for it.
        let mut names = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while names.last() != Some(&"game-close") && Instant::now() < deadline {
            match rx.try_recv() {
                Ok(event) => names.push(event.name()),
                Err(_) => thread::sleep(Duration::from_millis(10)),
            }
        }
        assert_eq!(names, vec!["game-run", "game-profile-updated", "game-close"]);
    }

    #[cfg(unix)]
    #[test]
    fn colliding_spawn_is_rejected_and_reaped() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(dir.path());

        let exe = write_fake_game(dir.path(), "game.exe", 30);
        let first_pid = svc.spawn_game("3", &exe).unwrap();

        // A second direct spawn for the same id must not shadow the entry,
        // and the rejected child must be fully reaped before the error
        // returns (wait() has already collected it).
        match svc.spawn_game("3", &exe) {
            Err(LauncherError::Launch(_)) => {}
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(svc.running_ids(), vec!["3"]);
        assert_eq!(svc.lock().get("3").map(|r| r.pid), Some(first_pid));

        assert!(svc.stop_and_wait("3", Duration::from_secs(5)));
    }

    #[cfg(unix)]
    #[test]
    fn natural_exit_accumulates_play_time() {
        let dir = tempdir().unwrap();
        let (svc, events) = service(dir.path());
        let profiles = ProfileService::new(dir.path(), events);

        let exe = write_fake_game(dir.path(), "game.exe", 1);
        svc.spawn_game("7", &exe).unwrap();
        wait_until_idle(&svc, "7", Duration::from_secs(10));

        let profile = profiles.get("7").unwrap();
        assert!(profile.play_time >= 0.9, "play_time = {}", profile.play_time);
        assert!(profile.last_played.is_some());

        // A second session adds to the total.
        let before = profile.play_time;
        svc.spawn_game("7", &exe).unwrap();
        wait_until_idle(&svc, "7", Duration::from_secs(10));
        assert!(profiles.get("7").unwrap().play_time > before);
    }

    #[cfg(unix)]
    #[test]
    fn profile_is_saved_before_close_event_fires() {
        let dir = tempdir().unwrap();
        let (svc, events) = service(dir.path());
        let profiles = ProfileService::new(dir.path(), events.clone());
        let mut rx = events.subscribe();

        let exe = write_fake_game(dir.path(), "game.exe", 1);
        svc.spawn_game("9", &exe).unwrap();
        wait_until_idle(&svc, "9", Duration::from_secs(10));

        let mut saw_close = false;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !saw_close && Instant::now() < deadline {
            match rx.try_recv() {
                Ok(LauncherEvent::GameClose(p)) => {
                    assert_eq!(p.game_id, "9");
                    // By the time game-close is observable, the profile exists.
                    assert!(profiles.get("9").is_ok());
                    saw_close = true;
                }
                Ok(_) => {}
                Err(_) => thread::sleep(Duration::from_millis(10)),
            }
        }
        assert!(saw_close);
    }
}
