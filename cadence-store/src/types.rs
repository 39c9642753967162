/// Identifier for a queued job
///
/// This is a globally unique identifier (ULID) that serves as both the job's
/// handle and its filename in the file-backed store. ULIDs are
/// lexicographically sortable by creation time and collision-resistant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
    id: ulid::Ulid,
}

impl JobId {
    /// Parse a job ID from a filename like `01ARYZ6S41.bin`
    ///
    /// Validates that the filename is a valid ULID to prevent path traversal
    /// attacks.
    ///
    /// # Security
    /// This function explicitly rejects:
    /// - Path separators (/ and \)
    /// - Directory traversal patterns (..)
    /// - Invalid ULID format
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') {
            return None;
        }

        if filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".bin")?;
        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    /// Create a new job ID from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique job ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Get the timestamp (milliseconds since Unix epoch) encoded in this ULID
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_filename_validation() {
        // Valid ULIDs (26 characters)
        assert!(JobId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").is_some());

        // Invalid IDs (security)
        assert!(JobId::from_filename("../etc/passwd.bin").is_none());
        assert!(JobId::from_filename("foo/bar.bin").is_none());
        assert!(JobId::from_filename("..\\windows\\system32.bin").is_none());

        // Invalid IDs (format)
        assert!(JobId::from_filename("not_a_valid_ulid.bin").is_none());
        assert!(JobId::from_filename("1234567890.bin").is_none());

        // Wrong extension
        assert!(JobId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.json").is_none());
    }

    #[test]
    fn test_job_id_roundtrip() {
        let id = JobId::generate();
        let filename = format!("{id}.bin");
        assert_eq!(JobId::from_filename(&filename), Some(id));
    }
}
