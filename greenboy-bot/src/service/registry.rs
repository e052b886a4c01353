//! Job registry
//!
//! The set of jobs someone asked to be notified about, keyed by base job
//! id. Every mutation is written through to disk before it returns, so the
//! file always matches memory after a successful call. The registry is
//! owned by the event loop and handed out as `&mut`; there is no locking.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::RegistryError;
use greenboy_core::domain::job::JobState;
use greenboy_core::domain::monitor::MonitorEntry;

#[derive(Debug)]
pub struct JobRegistry {
    path: PathBuf,
    entries: BTreeMap<String, MonitorEntry>,
}

impl JobRegistry {
    /// Empty registry that will be persisted to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads the registry from `path`
    ///
    /// A missing file is an empty registry. A file that cannot be parsed is
    /// moved aside to `<path>.corrupt` and the registry starts empty, so a
    /// damaged file never blocks startup and is never silently overwritten.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No registry at {}, starting empty", path.display());
                return Ok(Self::new(path));
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        let entries: BTreeMap<String, MonitorEntry> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(source) => {
                let aside = corrupt_path(&path);
                error!(
                    "Registry {} is not valid ({}), moving it to {}",
                    path.display(),
                    source,
                    aside.display()
                );
                fs::rename(&path, &aside).map_err(|source| RegistryError::Io {
                    path: path.clone(),
                    source,
                })?;
                return Ok(Self::new(path));
            }
        };

        let entries = entries
            .into_iter()
            .map(|(job_id, mut entry)| {
                entry.job_id = job_id.clone();
                (job_id, entry)
            })
            .collect::<BTreeMap<_, _>>();

        info!(
            "Loaded {} monitored job(s) from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, job_id: &str) -> Option<&MonitorEntry> {
        self.entries.get(job_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MonitorEntry> {
        self.entries.values()
    }

    /// Copy of all entries, safe to iterate while mutating the registry
    pub fn snapshot(&self) -> Vec<MonitorEntry> {
        self.entries.values().cloned().collect()
    }

    /// Inserts or replaces the entry for `entry.job_id` and persists
    ///
    /// Mutators stage a copy of the mapping and keep it only once it is on
    /// disk, so a failed write leaves the registry unchanged.
    pub fn upsert(&mut self, entry: MonitorEntry) -> Result<(), RegistryError> {
        let mut staged = self.entries.clone();
        staged.insert(entry.job_id.clone(), entry);
        self.commit(staged)
    }

    /// Removes an entry and persists; `None` when it was not present
    pub fn remove(&mut self, job_id: &str) -> Result<Option<MonitorEntry>, RegistryError> {
        let mut staged = self.entries.clone();
        let removed = staged.remove(job_id);
        if removed.is_some() {
            self.commit(staged)?;
        }
        Ok(removed)
    }

    /// Records a newly observed state and persists
    ///
    /// Returns `false` when the job is not registered.
    pub fn update_state(&mut self, job_id: &str, state: JobState) -> Result<bool, RegistryError> {
        let mut staged = self.entries.clone();
        let Some(entry) = staged.get_mut(job_id) else {
            return Ok(false);
        };
        entry.last_observed_state = state;
        self.commit(staged)?;
        Ok(true)
    }

    fn commit(&mut self, staged: BTreeMap<String, MonitorEntry>) -> Result<(), RegistryError> {
        self.save(&staged)?;
        self.entries = staged;
        Ok(())
    }

    /// Writes the whole mapping atomically (temp file + rename)
    fn save(&self, entries: &BTreeMap<String, MonitorEntry>) -> Result<(), RegistryError> {
        let json =
            serde_json::to_string_pretty(entries).map_err(|source| RegistryError::Format {
                path: self.path.clone(),
                source,
            })?;

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|source| RegistryError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            "Saved {} monitored job(s) to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> JobRegistry {
        JobRegistry::load(dir.path().join("monitored_jobs-test.json")).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        assert!(registry.is_empty());
        assert!(!registry.path().exists());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry_in(&dir);

        registry
            .upsert(MonitorEntry::new("111", 10, 20, JobState::Pending))
            .unwrap();
        registry
            .upsert(MonitorEntry::new("222", 11, 21, JobState::Running))
            .unwrap();

        let reloaded = registry_in(&dir);
        assert_eq!(reloaded.snapshot(), registry.snapshot());
        assert_eq!(reloaded.get("111").unwrap().job_id, "111");
        assert_eq!(reloaded.get("222").unwrap().delivery_target, 21);
    }

    #[test]
    fn test_upsert_overwrites_same_job() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry_in(&dir);

        registry
            .upsert(MonitorEntry::new("111", 10, 20, JobState::Pending))
            .unwrap();
        registry
            .upsert(MonitorEntry::new("111", 99, 98, JobState::Running))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("111").unwrap().subscriber_id, 99);
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry_in(&dir);

        registry
            .upsert(MonitorEntry::new("111", 10, 20, JobState::Pending))
            .unwrap();
        assert!(registry.update_state("111", JobState::Running).unwrap());
        assert_eq!(
            registry_in(&dir).get("111").unwrap().last_observed_state,
            JobState::Running
        );

        assert!(registry.remove("111").unwrap().is_some());
        assert!(registry_in(&dir).is_empty());
        assert!(registry.remove("111").unwrap().is_none());
        assert!(!registry.update_state("111", JobState::Running).unwrap());
    }

    #[test]
    fn test_reads_legacy_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitored_jobs-test.json");
        fs::write(
            &path,
            r#"{"60489632": {"user_id": 1, "chat_id": 2, "last_state": "PENDING", "added_time": "2024-05-01 08:00:00"}}"#,
        )
        .unwrap();

        let registry = JobRegistry::load(&path).unwrap();
        let entry = registry.get("60489632").unwrap();
        assert_eq!(entry.job_id, "60489632");
        assert_eq!(entry.last_observed_state, JobState::Pending);
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitored_jobs-test.json");
        fs::write(&path, "{not json").unwrap();

        let registry = JobRegistry::load(&path).unwrap();
        assert!(registry.is_empty());
        assert!(corrupt_path(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry_in(&dir);
        registry
            .upsert(MonitorEntry::new("1", 1, 1, JobState::Running))
            .unwrap();

        for entry in registry.snapshot() {
            registry.remove(&entry.job_id).unwrap();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_write_leaves_registry_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut orphan = JobRegistry::new(dir.path().join("missing-dir").join("jobs.json"));
        assert!(orphan
            .upsert(MonitorEntry::new("111", 1, 1, JobState::Pending))
            .is_err());
        assert!(orphan.get("111").is_none());

        let state_dir = dir.path().join("state");
        fs::create_dir(&state_dir).unwrap();
        let mut registry = JobRegistry::load(state_dir.join("jobs.json")).unwrap();
        registry
            .upsert(MonitorEntry::new("222", 1, 1, JobState::Pending))
            .unwrap();
        fs::remove_dir_all(&state_dir).unwrap();

        assert!(registry.update_state("222", JobState::Running).is_err());
        assert_eq!(
            registry.get("222").unwrap().last_observed_state,
            JobState::Pending
        );
        assert!(registry.remove("222").is_err());
        assert!(registry.get("222").is_some());
    }
}
