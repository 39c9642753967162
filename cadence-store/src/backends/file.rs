//! File-based backing store.
//!
//! Job records are stored as `{ulid}.bin` bincode files under `jobs/`, and
//! sequence states as `{recipient}_{campaign}.bin` under `sequences/`. ULID
//! filenames are lexicographically sortable by creation time and are
//! validated on read to prevent path traversal.
//!
//! # Atomicity
//! All writes go to a `.tmp_` file first and are renamed into place; deletes
//! rename to a `.deleted` suffix before removal. A crash mid-operation
//! leaves only `.tmp_`/`.deleted` files, which are ignored by reads and
//! cleaned up on the next `init()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cadence_common::{
    internal,
    types::{CampaignId, RecipientId},
};
use serde::Deserialize;
use tokio::fs;

use crate::{
    Result, StoreError,
    job::{Job, JobStatus},
    sequence::SequenceState,
    traits::{JobStore, SequenceStore},
    types::JobId,
};

const JOBS_DIR: &str = "jobs";
const SEQUENCES_DIR: &str = "sequences";

/// File-backed store implementing both [`JobStore`] and [`SequenceStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes claim sweeps so two local workers cannot both mark the
    /// same job in-flight. Single-process only; a multi-process deployment
    /// needs a store with its own claim primitive.
    claim_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Default for FileStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/cadence"),
            claim_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

impl<'de> Deserialize<'de> for FileStore {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileStoreHelper {
            path: PathBuf,
        }

        let helper = FileStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self {
            path: helper.path,
            claim_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }
}

impl FileStore {
    /// Create a store rooted at `path`.
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous.
    pub fn open(path: PathBuf) -> Result<Self> {
        Self::validate_path(&path).map_err(|e| StoreError::Validation(e.to_string()))?;
        Ok(Self {
            path,
            claim_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// The store's root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate a store path for security
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Rejects paths to sensitive system directories
    /// - Ensures the path is absolute
    fn validate_path(path: &Path) -> anyhow::Result<()> {
        for component in path.components() {
            if component == std::path::Component::ParentDir {
                return Err(anyhow::anyhow!(
                    "Store path cannot contain '..' components: {}",
                    path.display()
                ));
            }
        }

        if !path.is_absolute() {
            return Err(anyhow::anyhow!(
                "Store path must be absolute: {}",
                path.display()
            ));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(anyhow::anyhow!(
                    "Store path cannot be in system directory {}: {}",
                    prefix,
                    path.display()
                ));
            }
        }

        Ok(())
    }

    /// Initialize the store directories.
    ///
    /// Creates the `jobs/` and `sequences/` subdirectories if missing and
    /// cleans up `.tmp_`/`.deleted` leftovers from previous crashes. Call
    /// during startup to fail fast on permission problems.
    ///
    /// # Errors
    /// Returns an error if directories cannot be created or the path exists
    /// but is not a directory.
    pub fn init(&self) -> Result<()> {
        internal!("Initialising store at {:?} ...", self.path);

        for sub in [JOBS_DIR, SEQUENCES_DIR] {
            let dir = self.path.join(sub);
            if !dir.try_exists()? {
                std::fs::create_dir_all(&dir)?;
            } else if !dir.is_dir() {
                return Err(StoreError::Validation(format!(
                    "Expected {} to be a directory, but it is not",
                    dir.display()
                )));
            }
            Self::cleanup_orphans(&dir)?;
        }

        Ok(())
    }

    /// Remove orphaned `.tmp_` and `.deleted` files from incomplete
    /// operations.
    fn cleanup_orphans(dir: &Path) -> Result<()> {
        let entries = std::fs::read_dir(dir)?;
        let mut cleaned = 0;

        for entry in entries {
            let entry = entry?;
            let filename = entry.file_name();
            let filename_str = filename.to_string_lossy();

            if filename_str.ends_with(".deleted") || filename_str.starts_with(".tmp_") {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from {}",
                dir.display()
            );
        }

        Ok(())
    }

    fn jobs_dir(&self) -> PathBuf {
        self.path.join(JOBS_DIR)
    }

    fn sequences_dir(&self) -> PathBuf {
        self.path.join(SEQUENCES_DIR)
    }

    fn job_path(&self, id: &JobId) -> PathBuf {
        self.jobs_dir().join(format!("{id}.bin"))
    }

    /// Filename stem for a sequence key.
    ///
    /// Campaign slugs are expected to be `[a-z0-9-]`; anything else is
    /// mapped to `_` so the key always yields a safe filename.
    fn sequence_stem(recipient: RecipientId, campaign: &CampaignId) -> String {
        let slug: String = campaign
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}_{}", recipient.0, slug)
    }

    fn sequence_path(&self, recipient: RecipientId, campaign: &CampaignId) -> PathBuf {
        self.sequences_dir()
            .join(format!("{}.bin", Self::sequence_stem(recipient, campaign)))
    }

    /// Write a record atomically: temp file, then rename into place.
    async fn write_record<T: serde::Serialize + Sync>(dir: &Path, filename: &str, value: &T) -> Result<()> {
        let encoded = bincode::serde::encode_to_vec(value, bincode::config::standard())?;

        let temp_path = dir.join(format!(".tmp_{filename}"));
        let final_path = dir.join(filename);

        fs::write(&temp_path, &encoded).await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    async fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => {
                let (value, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Two-phase delete: rename to `.deleted`, then remove.
    async fn delete_record(path: &Path) -> Result<bool> {
        let Some(filename) = path.file_name().map(|f| f.to_string_lossy().to_string()) else {
            return Ok(false);
        };
        let deleted_path = path.with_file_name(format!("{filename}.deleted"));

        match fs::rename(path, &deleted_path).await {
            Ok(()) => {
                fs::remove_file(&deleted_path).await?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All job ids currently on disk, oldest first.
    async fn list_job_ids(&self) -> Result<Vec<JobId>> {
        let mut entries = fs::read_dir(self.jobs_dir()).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename_str = filename.to_string_lossy();

            if filename_str.ends_with(".bin")
                && !filename_str.starts_with(".tmp_")
                && let Some(id) = JobId::from_filename(&filename_str)
            {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let path = self.job_path(&job.id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        Self::write_record(&self.jobs_dir(), &format!("{}.bin", job.id), job).await
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Self::read_record(&self.job_path(id)).await
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let path = self.job_path(&job.id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::JobNotFound(job.id.clone()));
        }
        Self::write_record(&self.jobs_dir(), &format!("{}.bin", job.id), job).await
    }

    async fn remove(&self, id: &JobId) -> Result<Option<Job>> {
        let path = self.job_path(id);
        let job = Self::read_record(&path).await?;
        if job.is_some() {
            Self::delete_record(&path).await?;
        }
        Ok(job)
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for id in self.list_job_ids().await? {
            if let Some(job) = Self::read_record(&self.job_path(&id)).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn claim_due(&self, now: u64) -> Result<Option<Job>> {
        let _guard = self.claim_lock.lock().await;

        let mut best: Option<Job> = None;
        for id in self.list_job_ids().await? {
            let Some(job) = Self::read_record::<Job>(&self.job_path(&id)).await? else {
                continue;
            };
            if !job.is_due(now) {
                continue;
            }
            let better = best.as_ref().is_none_or(|current| {
                (job.effective_priority(now), job.not_before)
                    < (current.effective_priority(now), current.not_before)
            });
            if better {
                best = Some(job);
            }
        }

        let Some(mut job) = best else {
            return Ok(None);
        };

        job.status = JobStatus::InFlight { claimed_at: now };
        Self::write_record(&self.jobs_dir(), &format!("{}.bin", job.id), &job).await?;

        Ok(Some(job))
    }

    async fn release_stalled(&self, now: u64, claim_timeout_secs: u64) -> Result<Vec<JobId>> {
        let _guard = self.claim_lock.lock().await;

        let mut released = Vec::new();
        for id in self.list_job_ids().await? {
            let Some(mut job) = Self::read_record::<Job>(&self.job_path(&id)).await? else {
                continue;
            };
            if let JobStatus::InFlight { claimed_at } = job.status
                && now.saturating_sub(claimed_at) >= claim_timeout_secs
            {
                job.status = JobStatus::Pending;
                Self::write_record(&self.jobs_dir(), &format!("{}.bin", job.id), &job).await?;
                released.push(id);
            }
        }

        Ok(released)
    }
}

#[async_trait]
impl SequenceStore for FileStore {
    async fn put(&self, state: &SequenceState) -> Result<()> {
        let filename = format!(
            "{}.bin",
            Self::sequence_stem(state.recipient, &state.campaign)
        );
        Self::write_record(&self.sequences_dir(), &filename, state).await
    }

    async fn get(
        &self,
        recipient: RecipientId,
        campaign: &CampaignId,
    ) -> Result<Option<SequenceState>> {
        Self::read_record(&self.sequence_path(recipient, campaign)).await
    }

    async fn list_active(&self) -> Result<Vec<SequenceState>> {
        let mut entries = fs::read_dir(self.sequences_dir()).await?;
        let mut states = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename_str = filename.to_string_lossy();
            if !filename_str.ends_with(".bin") || filename_str.starts_with(".tmp_") {
                continue;
            }
            if let Some(state) = Self::read_record::<SequenceState>(&entry.path()).await?
                && state.active
            {
                states.push(state);
            }
        }

        Ok(states)
    }
}
