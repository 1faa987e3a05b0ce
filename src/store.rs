//! Persisted state: profiles, measurement history and reminder settings
//!
//! Every mutation writes the whole [`Snapshot`] back through a [`StateStore`].
//! The JSON file store writes to a temp file in the same directory and renames
//! it over the target, so a crash never leaves a half-written document.

use crate::error::{Error, Result};
use crate::model::{
    MeasurementEntry, ProfileUpdate, ReminderConfig, Snapshot, TimeOfDay, UserId, UserProfile,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Backend that loads and saves the full snapshot
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Snapshot>;
    fn save_all(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Single JSON document on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Snapshot::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save_all(&self, snapshot: &Snapshot) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        let json = serde_json::to_string_pretty(snapshot)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// In-memory store with switchable save failures
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Snapshot>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Snapshot> {
        let saved = self.saved.lock().unwrap_or_else(|e| e.into_inner());
        Ok(saved.clone())
    }

    fn save_all(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Store("simulated save failure".to_string()));
        }
        let mut saved = self.saved.lock().unwrap_or_else(|e| e.into_inner());
        *saved = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn load(&self) -> Result<Snapshot> {
        (**self).load()
    }

    fn save_all(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).save_all(snapshot)
    }
}

/// Shared access to the current snapshot.
///
/// Readers get an `Arc` to an immutable snapshot. Writers are serialized: each
/// update clones the snapshot, applies the change, saves it, and only then
/// publishes it. A failed save leaves the published snapshot untouched.
pub struct Repository {
    store: Box<dyn StateStore>,
    current: Mutex<Arc<Snapshot>>,
}

impl Repository {
    pub fn open(store: impl StateStore + 'static) -> Result<Self> {
        let snapshot = store.load()?;
        tracing::debug!(
            "Loaded state: {} users, {} entries",
            snapshot.users.len(),
            snapshot.entry_count()
        );
        Ok(Self {
            store: Box::new(store),
            current: Mutex::new(Arc::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&current)
    }

    /// Apply `change` to a copy of the snapshot and persist it
    pub fn update<T>(&self, change: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = Snapshot::clone(&current);
        let value = change(&mut next)?;
        self.store.save_all(&next)?;
        *current = Arc::new(next);
        Ok(value)
    }

    pub fn create_profile(&self, profile: UserProfile) -> Result<()> {
        self.update(|s| {
            s.users.insert(profile.id, profile);
            Ok(())
        })
    }

    /// Apply a single-field edit and return the updated profile
    pub fn apply_update(&self, user_id: UserId, update: &ProfileUpdate) -> Result<UserProfile> {
        self.update(|s| {
            let profile = s
                .users
                .get_mut(&user_id)
                .ok_or(Error::NotRegistered(user_id))?;
            update.apply(profile);
            Ok(profile.clone())
        })
    }

    pub fn record_measurement(&self, user_id: UserId, entry: MeasurementEntry) -> Result<()> {
        self.update(|s| {
            s.measurements.entry(user_id).or_default().push(entry);
            Ok(())
        })
    }

    /// Empty the user's history; returns how many entries were dropped
    pub fn clear_history(&self, user_id: UserId) -> Result<usize> {
        self.update(|s| {
            let history = s.measurements.entry(user_id).or_default();
            let dropped = history.len();
            history.clear();
            Ok(dropped)
        })
    }

    pub fn set_reminders(&self, user_id: UserId, times: &[TimeOfDay]) -> Result<ReminderConfig> {
        self.update(|s| {
            let config = ReminderConfig::scheduled(times.iter().copied());
            s.reminder_settings.insert(user_id, config.clone());
            Ok(config)
        })
    }

    /// Deactivate reminders, creating an inactive config when none exists
    pub fn disable_reminders(&self, user_id: UserId) -> Result<()> {
        self.update(|s| {
            s.reminder_settings.entry(user_id).or_default().active = false;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, Reading};
    use chrono::{FixedOffset, TimeZone};
    use tempfile::TempDir;

    fn profile(id: UserId) -> UserProfile {
        UserProfile {
            id,
            name: "Ivan".to_string(),
            age: 45,
            gender: Gender::Male,
            height_cm: 180,
            weight_kg: 90,
        }
    }

    fn entry(sys: u16, dia: u16) -> MeasurementEntry {
        MeasurementEntry {
            timestamp: FixedOffset::east_opt(3 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
                .unwrap(),
            first: Reading::new(sys, dia),
            second: Reading::new(sys, dia),
        }
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_json_store_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");

        let repo = Repository::open(JsonFileStore::new(&path)).unwrap();
        repo.create_profile(profile(1)).unwrap();
        repo.record_measurement(1, entry(120, 80)).unwrap();
        repo.set_reminders(1, &[TimeOfDay::new(9, 0).unwrap()])
            .unwrap();

        let reopened = Repository::open(JsonFileStore::new(&path)).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.profile(1), Some(&profile(1)));
        assert_eq!(snapshot.history(1).len(), 1);
        assert!(snapshot.reminders(1).unwrap().active);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Repository::open(JsonFileStore::new(&path)),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_failed_save_keeps_previous_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let repo = Repository::open(Arc::clone(&store)).unwrap();
        repo.create_profile(profile(1)).unwrap();

        store.fail_saves(true);
        assert!(repo.record_measurement(1, entry(120, 80)).is_err());
        assert!(repo.snapshot().history(1).is_empty());
        assert_eq!(store.load().unwrap().history(1).len(), 0);
    }

    #[test]
    fn test_snapshot_readers_unaffected_by_later_writes() {
        let repo = Repository::open(MemoryStore::new()).unwrap();
        let before = repo.snapshot();
        repo.create_profile(profile(1)).unwrap();
        assert!(!before.is_registered(1));
        assert!(repo.snapshot().is_registered(1));
    }

    #[test]
    fn test_apply_update_unregistered() {
        let repo = Repository::open(MemoryStore::new()).unwrap();
        let err = repo
            .apply_update(9, &ProfileUpdate::Age(30))
            .unwrap_err();
        assert!(matches!(err, Error::NotRegistered(9)));
    }

    #[test]
    fn test_clear_history_idempotent() {
        let repo = Repository::open(MemoryStore::new()).unwrap();
        repo.create_profile(profile(1)).unwrap();
        repo.record_measurement(1, entry(120, 80)).unwrap();
        repo.record_measurement(1, entry(125, 82)).unwrap();

        assert_eq!(repo.clear_history(1).unwrap(), 2);
        let once = repo.snapshot();
        assert_eq!(repo.clear_history(1).unwrap(), 0);
        assert_eq!(*repo.snapshot(), *once);
        assert!(once.history(1).is_empty());
    }

    #[test]
    fn test_disable_without_config_creates_inactive() {
        let repo = Repository::open(MemoryStore::new()).unwrap();
        repo.disable_reminders(3).unwrap();
        let snapshot = repo.snapshot();
        let config = snapshot.reminders(3).unwrap();
        assert!(!config.active);
        assert!(config.times.is_empty());
    }

    #[test]
    fn test_set_reminders_replaces_and_reactivates() {
        let repo = Repository::open(MemoryStore::new()).unwrap();
        let nine = TimeOfDay::new(9, 0).unwrap();
        let six = TimeOfDay::new(18, 0).unwrap();
        repo.set_reminders(3, &[nine]).unwrap();
        repo.disable_reminders(3).unwrap();
        repo.set_reminders(3, &[six, six]).unwrap();

        let snapshot = repo.snapshot();
        let config = snapshot.reminders(3).unwrap();
        assert!(config.active);
        assert_eq!(config.times.iter().copied().collect::<Vec<_>>(), vec![six]);
    }
}
