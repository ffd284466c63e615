//! Main Store struct tying the persister, id allocation and transactions
//! together.

use crate::error::{Result, StoreError};
use crate::ids::IdGenerator;
use crate::persist::Persister;
use crate::transaction::{Resource, Transaction};
use crate::types::{validate_name, CommitReport, RecordId};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Suffix of staging files in the store root.
const STAGING_SUFFIX: &str = ".staging";

/// Longest slice of the type or id copied into a staging file name.
const STAGING_NAME_PART: usize = 64;

/// Name of the advisory lock file in the store root.
const LOCK_FILE: &str = ".lock";

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Root directory for the store.
    pub path: PathBuf,

    /// Whether to create the root directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync staging files before they are registered.
    pub sync_writes: bool,

    /// Whether to hold an exclusive lock on the root for the store's
    /// lifetime.
    pub exclusive: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store"),
            create_if_missing: true,
            sync_writes: true,
            exclusive: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Counts describing what is on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of type directories.
    pub record_types: usize,
    /// Number of committed records across all types.
    pub records: usize,
    /// Staging files currently in the root, whether owned by an open
    /// transaction or orphaned.
    pub staging_files: usize,
}

/// The file-backed record store.
///
/// Each record of type `t` with id `i` is the file `root/t/i`, written by the
/// persister `P`. Writes go through a [`Transaction`]: content is staged as a
/// file in the root and only renamed into the type directory on commit, so
/// readers never observe a partially written record.
pub struct Store<P: Persister> {
    /// Store configuration.
    config: StoreConfig,

    /// Canonical root directory.
    root: PathBuf,

    /// Record serializer.
    persister: P,

    /// Per-type id allocation.
    ids: IdGenerator,

    /// Lock file, held when opened exclusive.
    _lock_file: Option<File>,
}

impl<P: Persister> Store<P> {
    /// Open the store rooted at `config.path`.
    ///
    /// The root is created when missing (unless `create_if_missing` is off)
    /// and must be writable.
    pub fn open(config: StoreConfig, persister: P) -> Result<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized);
            }
            fs::create_dir_all(&config.path)?;
        } else if !config.path.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("store root is not a directory: {}", config.path.display()),
            )));
        }

        let root = fs::canonicalize(&config.path)?;
        Self::check_writable(&root)?;

        let lock_file = if config.exclusive {
            Some(Self::acquire_lock(&root)?)
        } else {
            None
        };

        debug!(root = %root.display(), exclusive = config.exclusive, "store opened");

        Ok(Self {
            config,
            root,
            persister,
            ids: IdGenerator::new(),
            _lock_file: lock_file,
        })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }

    // --- Transactions ---

    /// Start a new, empty transaction. The store keeps no reference to it.
    pub fn begin_transaction(&self) -> Transaction {
        Transaction::new()
    }

    /// Commit `txn`. See [`Transaction::commit`].
    pub fn commit_transaction(&self, txn: &mut Transaction) -> Result<CommitReport> {
        txn.commit()
    }

    /// Abort `txn`. See [`Transaction::abort`].
    pub fn abort_transaction(&self, txn: &mut Transaction) -> Result<()> {
        txn.abort()
    }

    // --- Reads ---

    /// Read the committed record `record_type/id`.
    ///
    /// Returns `None` when no such record exists.
    pub fn get(&self, record_type: &str, id: impl AsRef<str>) -> Result<Option<P::Record>> {
        let id = RecordId::from(id.as_ref());
        validate_name("record type", record_type)?;
        validate_name("record id", id.as_str())?;

        let path = self.record_path(record_type, &id);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(StoreError::NotAFile(path));
        }

        self.read_record(record_type, &id, &path)
    }

    /// Read every committed record of `record_type`.
    ///
    /// Records come back in directory enumeration order, which is not
    /// sorted. A type that was never written yields an empty list.
    pub fn get_all(&self, record_type: &str) -> Result<Vec<P::Record>> {
        let mut records = Vec::new();

        for (id, path) in self.record_files(record_type)? {
            if let Some(record) = self.read_record(record_type, &id, &path)? {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Check whether the committed record `record_type/id` exists.
    pub fn exists(&self, record_type: &str, id: impl AsRef<str>) -> Result<bool> {
        let id = RecordId::from(id.as_ref());
        validate_name("record type", record_type)?;
        validate_name("record id", id.as_str())?;

        Ok(self.record_path(record_type, &id).is_file())
    }

    /// Ids of every committed record of `record_type`, in directory order.
    pub fn list_ids(&self, record_type: &str) -> Result<Vec<RecordId>> {
        Ok(self
            .record_files(record_type)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Names of every type directory in the root.
    pub fn list_types(&self) -> Result<Vec<String>> {
        let mut types = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str() {
                Some(name) if validate_name("record type", name).is_ok() => {
                    types.push(name.to_string())
                }
                _ => debug!(name = ?name, "ignoring foreign directory in store root"),
            }
        }

        Ok(types)
    }

    /// Count types, records and staging files on disk.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        for record_type in self.list_types()? {
            stats.record_types += 1;
            stats.records += self.record_files(&record_type)?.len();
        }
        stats.staging_files = self.staging_files()?.len();

        Ok(stats)
    }

    // --- Writes ---

    /// Stage `record` under a freshly allocated id.
    ///
    /// The id is returned right away but the record stays invisible to
    /// readers until `txn` commits. If staging fails the id is burned.
    pub fn insert(
        &self,
        txn: &mut Transaction,
        record_type: &str,
        record: &P::Record,
    ) -> Result<RecordId> {
        validate_name("record type", record_type)?;
        txn.ensure_open()?;

        let id = self.ids.allocate(record_type, &self.type_dir(record_type))?;
        self.stage_write(txn, record_type, &id, record)?;

        Ok(id)
    }

    /// Stage `record` as the new content of `record_type/id`, creating the
    /// record if it does not exist yet.
    pub fn update(
        &self,
        txn: &mut Transaction,
        record_type: &str,
        id: impl AsRef<str>,
        record: &P::Record,
    ) -> Result<()> {
        let id = RecordId::from(id.as_ref());
        validate_name("record type", record_type)?;
        validate_name("record id", id.as_str())?;
        txn.ensure_open()?;

        self.stage_write(txn, record_type, &id, record)
    }

    /// Register the deletion of `record_type/id`.
    ///
    /// The record is not checked for existence; deleting a missing record
    /// is a no-op at commit.
    pub fn remove(
        &self,
        txn: &mut Transaction,
        record_type: &str,
        id: impl AsRef<str>,
    ) -> Result<()> {
        let id = RecordId::from(id.as_ref());
        validate_name("record type", record_type)?;
        validate_name("record id", id.as_str())?;

        txn.add_resource(Resource::Delete {
            target: self.record_path(record_type, &id),
        })
    }

    // --- Maintenance ---

    /// Remove staging files last modified more than `older_than` ago.
    ///
    /// Staging files of transactions that are still open are removed too if
    /// they are old enough, so pick an age well beyond any transaction's
    /// lifetime. Returns the number of files removed.
    pub fn sweep_staging(&self, older_than: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for path in self.staging_files()? {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if now.duration_since(modified).unwrap_or_default() < older_than {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if removed > 0 {
            debug!(removed, "swept staging files");
        }

        Ok(removed)
    }

    // --- Internal ---

    fn type_dir(&self, record_type: &str) -> PathBuf {
        self.root.join(record_type)
    }

    fn record_path(&self, record_type: &str, id: &RecordId) -> PathBuf {
        self.type_dir(record_type).join(id.as_str())
    }

    /// Serialize `record` into a new staging file and register it with
    /// `txn`. The staging file is removed again on any failure.
    fn stage_write(
        &self,
        txn: &mut Transaction,
        record_type: &str,
        id: &RecordId,
        record: &P::Record,
    ) -> Result<()> {
        let type_dir = self.type_dir(record_type);
        fs::create_dir_all(&type_dir)?;

        // Staging files live in the root so get_all never enumerates them.
        let prefix = format!(
            ".{}.{}.",
            truncate_name(record_type, STAGING_NAME_PART),
            truncate_name(id.as_str(), STAGING_NAME_PART)
        );
        let mut staging = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&self.root)?;

        {
            let mut writer = BufWriter::new(staging.as_file_mut());
            self.persister.store(record, &mut writer)?;
            writer.flush()?;
        }
        if self.config.sync_writes {
            staging.as_file().sync_all()?;
        }

        let staging_path = staging
            .into_temp_path()
            .keep()
            .map_err(|e| StoreError::Io(e.error))?;

        debug!(
            record_type,
            id = %id,
            staging = %staging_path.display(),
            "record staged"
        );

        let resource = Resource::Write {
            staging: staging_path.clone(),
            target: type_dir.join(id.as_str()),
        };
        if let Err(e) = txn.add_resource(resource) {
            if let Err(cleanup) = fs::remove_file(&staging_path) {
                debug!(
                    staging = %staging_path.display(),
                    error = %cleanup,
                    "could not remove staging file"
                );
            }
            return Err(e);
        }

        Ok(())
    }

    fn read_record(
        &self,
        record_type: &str,
        id: &RecordId,
        path: &Path,
    ) -> Result<Option<P::Record>> {
        // A concurrent commit may delete the file between listing and open.
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        self.persister
            .retrieve(record_type, id, &mut reader)
            .map(Some)
    }

    /// Regular files in the type directory, as `(id, path)` pairs.
    fn record_files(&self, record_type: &str) -> Result<Vec<(RecordId, PathBuf)>> {
        validate_name("record type", record_type)?;

        let entries = match fs::read_dir(self.type_dir(record_type)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            match fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }

            match entry.file_name().into_string() {
                Ok(name) => files.push((RecordId(name), path)),
                Err(name) => debug!(name = ?name, "ignoring non UTF-8 file name"),
            }
        }

        Ok(files)
    }

    /// Staging files currently in the root.
    fn staging_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let is_staging = name
                .to_str()
                .map(|n| n.starts_with('.') && n.ends_with(STAGING_SUFFIX))
                .unwrap_or(false);
            if is_staging {
                files.push(entry.path());
            }
        }

        Ok(files)
    }

    /// Check that files can be created in `root`.
    fn check_writable(root: &Path) -> Result<()> {
        tempfile::Builder::new()
            .prefix(".writable.")
            .tempfile_in(root)?;
        Ok(())
    }

    /// Acquire an exclusive lock on the store.
    fn acquire_lock(root: &Path) -> Result<File> {
        let lock_path = root.join(LOCK_FILE);
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

/// Cut `name` to at most `max` bytes on a char boundary.
fn truncate_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
