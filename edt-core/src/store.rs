//! Persistence of the timetable document and its display settings.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::model::{DisplaySettings, TimeTableData};

pub const DATA_KEY: &str = "timetable-data";
pub const SETTINGS_KEY: &str = "timetable-settings";

const CHANGE_CAPACITY: usize = 16;

/// Durable string slots addressed by key.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
  entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
    let entries = self
      .entries
      .read()
      .map_err(|_| anyhow!("memory store lock poisoned"))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
    let mut entries = self
      .entries
      .write()
      .map_err(|_| anyhow!("memory store lock poisoned"))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

/// One `<key>.json` file per slot inside a directory.
pub struct FileStore {
  dir: PathBuf,
}

impl FileStore {
  pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(Self { dir })
  }

  fn path(&self, key: &str) -> PathBuf {
    self.dir.join(format!("{key}.json"))
  }
}

impl KeyValueStore for FileStore {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
    let path = self.path(key);
    match fs::read_to_string(&path) {
      Ok(value) => Ok(Some(value)),
      Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
      Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
  }

  /// Every write goes through its own temporary file, so concurrent saves
  /// of one key never share a staging path.
  fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
    let path = self.path(key);

    let mut tmp = NamedTempFile::new_in(&self.dir)
      .with_context(|| format!("creating temporary file in {}", self.dir.display()))?;
    tmp
      .write_all(value.as_bytes())
      .with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp
      .persist(&path)
      .map_err(|err| err.error)
      .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeScope {
  Timetable,
  Settings,
}

/// Sent once per successful save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
  pub scope: ChangeScope,
  pub revision: u64,
}

/// Reads and writes whole documents; concurrent writers follow last write wins.
///
/// Every successful save bumps the revision and notifies subscribers, so a
/// writer comparing revisions can tell that someone else saved in between.
pub struct PersistenceGateway {
  store: Box<dyn KeyValueStore>,
  revision: AtomicU64,
  changes: broadcast::Sender<ChangeEvent>,
}

impl PersistenceGateway {
  pub fn new(store: impl KeyValueStore + 'static) -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);

    Self {
      store: Box::new(store),
      revision: AtomicU64::new(0),
      changes,
    }
  }

  pub fn revision(&self) -> u64 {
    self.revision.load(Ordering::SeqCst)
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
    self.changes.subscribe()
  }

  /// The stored timetable, or the default one when nothing usable is stored.
  pub fn load(&self) -> TimeTableData {
    self.read(DATA_KEY).unwrap_or_default()
  }

  pub fn save(&self, data: &TimeTableData) -> bool {
    self.write(DATA_KEY, data, ChangeScope::Timetable)
  }

  /// Stores and returns the default timetable.
  pub fn reset(&self) -> TimeTableData {
    let data = TimeTableData::default();
    self.save(&data);
    info!("Timetable reset to defaults");
    data
  }

  pub fn load_settings(&self) -> DisplaySettings {
    self.read(SETTINGS_KEY).unwrap_or_default()
  }

  pub fn save_settings(&self, settings: &DisplaySettings) -> bool {
    self.write(SETTINGS_KEY, settings, ChangeScope::Settings)
  }

  fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.store.get(key) {
      Ok(raw) => raw?,
      Err(err) => {
        warn!("Unable to read {}: {:#}", key, err);
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(err) => {
        warn!("Discarding unreadable {}: {}", key, err);
        None
      }
    }
  }

  fn write<T: Serialize>(&self, key: &str, value: &T, scope: ChangeScope) -> bool {
    let result = serde_json::to_string(value)
      .map_err(anyhow::Error::from)
      .and_then(|raw| self.store.set(key, &raw));

    if let Err(err) = result {
      warn!("Unable to save {}: {:#}", key, err);
      return false;
    }

    let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
    // no subscribers is fine
    let _ = self.changes.send(ChangeEvent { scope, revision });
    true
  }
}
