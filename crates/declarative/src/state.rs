//! State store
//!
//! The state snapshot records the last-applied attributes of every managed
//! resource. It is the "current state" side of every diff.

use crate::address::ResourceAddress;
use crate::error::{Error, Result};
use crate::value::Attributes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Current state format version
pub const STATE_VERSION: u32 = 1;

/// Default state file name
pub const DEFAULT_STATE_FILE: &str = "terrace.tfstate";

/// Last-applied record of one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    #[serde(default)]
    pub attributes: Attributes,
    /// Resources this one depended on when it was last applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ResourceAddress>,
    /// Marked for replacement on the next apply
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

/// A stored output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
}

/// Versioned record of all managed resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    /// Incremented every time the snapshot is persisted
    pub serial: u64,
    /// Identity of this state's history, fixed at creation
    pub lineage: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resources: BTreeMap<ResourceAddress, ResourceInstance>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputValue>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSnapshot {
    /// Create an empty snapshot with a fresh lineage
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            serial: 0,
            lineage: new_id(&format!("lineage:{}", std::process::id())),
            updated_at: now,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Parse a snapshot, rejecting newer format versions
    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(content)?;
        if snapshot.version > STATE_VERSION {
            return Err(Error::UnsupportedStateVersion {
                found: snapshot.version,
                supported: STATE_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceInstance> {
        self.resources.get(address)
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.resources.contains_key(address)
    }

    pub fn insert(&mut self, address: ResourceAddress, instance: ResourceInstance) {
        self.resources.insert(address, instance);
    }

    pub fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceInstance> {
        self.resources.remove(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &ResourceAddress> {
        self.resources.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Mark a resource for replacement
    pub fn taint(&mut self, address: &ResourceAddress) -> Result<()> {
        self.set_tainted(address, true)
    }

    /// Clear a replacement mark
    pub fn untaint(&mut self, address: &ResourceAddress) -> Result<()> {
        self.set_tainted(address, false)
    }

    fn set_tainted(&mut self, address: &ResourceAddress, tainted: bool) -> Result<()> {
        let instance = self
            .resources
            .get_mut(address)
            .ok_or_else(|| Error::NotInState(address.clone()))?;
        instance.tainted = tainted;
        Ok(())
    }

    /// Rename a resource, rewriting dependency records that point at it
    pub fn move_resource(&mut self, from: &ResourceAddress, to: &ResourceAddress) -> Result<()> {
        if self.resources.contains_key(to) {
            return Err(Error::AlreadyInState(to.clone()));
        }
        let instance = self
            .resources
            .remove(from)
            .ok_or_else(|| Error::NotInState(from.clone()))?;
        self.resources.insert(to.clone(), instance);
        for other in self.resources.values_mut() {
            for dep in &mut other.dependencies {
                if dep == from {
                    *dep = to.clone();
                }
            }
        }
        Ok(())
    }

    /// Resources that recorded a dependency on `address`, transitively
    pub fn recorded_dependents(&self, address: &ResourceAddress) -> Vec<ResourceAddress> {
        let mut found: Vec<ResourceAddress> = Vec::new();
        let mut frontier = vec![address.clone()];
        while let Some(current) = frontier.pop() {
            for (candidate, instance) in &self.resources {
                if instance.dependencies.contains(&current) && !found.contains(candidate) {
                    found.push(candidate.clone());
                    frontier.push(candidate.clone());
                }
            }
        }
        found.sort();
        found
    }
}

/// Information recorded in a held lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    pub operation: String,
    pub who: String,
    pub created: DateTime<Utc>,
}

impl LockInfo {
    fn new(operation: &str) -> Self {
        let who = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            id: new_id(&format!("lock:{operation}:{who}:{}", std::process::id())),
            operation: operation.to_string(),
            who,
            created: Utc::now(),
        }
    }

    fn into_error(self) -> Error {
        Error::StateLocked {
            id: self.id,
            operation: self.operation,
            who: self.who,
            created: self.created.to_rfc3339(),
        }
    }
}

/// Guard for a held state lock, released on drop
pub struct StateLock {
    info: LockInfo,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StateLock {
    fn new(info: LockInfo, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            info,
            release: Some(Box::new(release)),
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for StateLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLock").field("info", &self.info).finish()
    }
}

/// Persistence backend for state snapshots
pub trait StateStore: Send + Sync {
    /// Load the stored snapshot, or a fresh one if nothing is stored
    fn load(&self) -> Result<StateSnapshot>;

    /// Store a snapshot, bumping its serial and timestamp
    fn persist(&self, snapshot: &mut StateSnapshot) -> Result<()>;

    /// Acquire an exclusive lock for an operation
    fn lock(&self, operation: &str) -> Result<StateLock>;

    /// Remove a lock left behind by another process
    fn force_unlock(&self, id: &str) -> Result<()>;
}

/// State stored as a JSON file on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, ".backup")
    }

    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, ".lock")
    }

    fn read_lock(&self) -> Result<LockInfo> {
        let path = self.lock_path();
        let content = fs::read_to_string(&path).map_err(|source| Error::File {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl StateStore for LocalStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            log::debug!(
                "State file {} does not exist, starting empty",
                self.path.display()
            );
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| Error::File {
            path: self.path.clone(),
            source,
        })?;
        let snapshot = StateSnapshot::from_json(&content)?;
        log::debug!(
            "Loaded state serial {} ({} resources) from {}",
            snapshot.serial,
            snapshot.resources.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    fn persist(&self, snapshot: &mut StateSnapshot) -> Result<()> {
        snapshot.serial += 1;
        snapshot.updated_at = Utc::now();
        let content = snapshot.to_json()?;

        let file_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| Error::File { path, source }
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(file_err(parent))?;
        }

        if self.path.exists() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(file_err(&backup))?;
        }

        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, content).map_err(file_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(file_err(&self.path))?;

        log::debug!(
            "Saved state serial {} to {}",
            snapshot.serial,
            self.path.display()
        );
        Ok(())
    }

    fn lock(&self, operation: &str) -> Result<StateLock> {
        let path = self.lock_path();
        let info = LockInfo::new(operation);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(self.read_lock()?.into_error());
            }
            Err(source) => return Err(Error::File { path, source }),
        };
        write_lock_file(&path, &mut file, &info)?;

        log::debug!("Acquired state lock {} at {}", info.id, path.display());
        Ok(StateLock::new(info, move || {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Failed to release state lock {}: {}", path.display(), e);
            }
        }))
    }

    fn force_unlock(&self, id: &str) -> Result<()> {
        if !self.lock_path().exists() {
            return Err(Error::NotLocked);
        }
        let held = self.read_lock()?;
        if held.id != id {
            return Err(Error::LockMismatch {
                given: id.to_string(),
                held: held.id,
            });
        }
        let path = self.lock_path();
        fs::remove_file(&path).map_err(|source| Error::File { path, source })?;
        Ok(())
    }
}

/// Write lock info into a freshly created lock file
///
/// On failure the file is removed again, so a half-written lock never blocks
/// later runs.
fn write_lock_file(path: &Path, file: &mut impl Write, info: &LockInfo) -> Result<()> {
    let written = serde_json::to_vec_pretty(info)
        .map_err(Error::from)
        .and_then(|bytes| {
            file.write_all(&bytes).map_err(|source| Error::File {
                path: path.to_path_buf(),
                source,
            })
        });
    if written.is_err()
        && let Err(e) = fs::remove_file(path)
    {
        log::warn!("Failed to remove partial lock {}: {}", path.display(), e);
    }
    written
}

/// State kept in memory
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<StateSnapshot>>,
    lock: std::sync::Arc<Mutex<Option<LockInfo>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn lock_poisoned<T>(guard: std::sync::LockResult<T>) -> T {
    guard.unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        Ok(lock_poisoned(self.snapshot.lock())
            .clone()
            .unwrap_or_default())
    }

    fn persist(&self, snapshot: &mut StateSnapshot) -> Result<()> {
        snapshot.serial += 1;
        snapshot.updated_at = Utc::now();
        *lock_poisoned(self.snapshot.lock()) = Some(snapshot.clone());
        Ok(())
    }

    fn lock(&self, operation: &str) -> Result<StateLock> {
        let mut held = lock_poisoned(self.lock.lock());
        if let Some(existing) = held.as_ref() {
            return Err(existing.clone().into_error());
        }
        let info = LockInfo::new(operation);
        *held = Some(info.clone());

        let slot = std::sync::Arc::clone(&self.lock);
        Ok(StateLock::new(info, move || {
            *lock_poisoned(slot.lock()) = None;
        }))
    }

    fn force_unlock(&self, id: &str) -> Result<()> {
        let mut held = lock_poisoned(self.lock.lock());
        match held.as_ref() {
            None => Err(Error::NotLocked),
            Some(info) if info.id != id => Err(Error::LockMismatch {
                given: id.to_string(),
                held: info.id.clone(),
            }),
            Some(_) => {
                *held = None;
                Ok(())
            }
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Short unique identifier derived from a seed and the current time
fn new_id(seed: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let hash = blake3::hash(format!("{seed}:{nanos}").as_bytes());
    hash.to_hex()[..16].to_string()
}
