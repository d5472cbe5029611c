// Per-launch bookkeeping objects
//
// The launcher writes one small text object per fact under `<job>/`; the
// completion handler reads them back when the property job finishes.

use crate::errors::StorageError;
use crate::models::Bookkeeping;
use crate::storage::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const REPO_ID_FILE: &str = "repo_id.txt";
pub const SHA_FILE: &str = "sha.txt";
pub const IS_DRAFT_FILE: &str = "is_draft.txt";
pub const EXPECTED_FILE: &str = "expected.txt";
pub const CORRELATION_LIST_FILE: &str = "correlation_list.txt";
pub const CBMC_OUTPUT_FILE: &str = "out/cbmc.txt";

/// Commit coordinates of a launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub repo_id: String,
    pub sha: String,
    pub is_draft: bool,
}

#[derive(Clone)]
pub struct BookkeepingStore {
    store: Arc<dyn ObjectStore>,
}

fn key(job_name: &str, file: &str) -> String {
    format!("{}/{}", job_name, file)
}

impl BookkeepingStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn bucket_name(&self) -> &str {
        self.store.bucket_name()
    }

    #[instrument(skip(self, bookkeeping), fields(job = %job_name))]
    pub async fn write(&self, job_name: &str, bookkeeping: &Bookkeeping) -> Result<(), StorageError> {
        let correlation_list = serde_json::to_string(&bookkeeping.correlation_list).map_err(|e| {
            StorageError::InvalidValue {
                key: key(job_name, CORRELATION_LIST_FILE),
                reason: e.to_string(),
            }
        })?;
        let is_draft = bookkeeping.is_draft.to_string();
        let entries = [
            (REPO_ID_FILE, bookkeeping.repo_id.as_str()),
            (SHA_FILE, bookkeeping.sha.as_str()),
            (IS_DRAFT_FILE, is_draft.as_str()),
            (EXPECTED_FILE, bookkeeping.expected.as_str()),
            (CORRELATION_LIST_FILE, correlation_list.as_str()),
        ];
        for (file, value) in entries {
            self.store
                .put_object(&key(job_name, file), value.as_bytes())
                .await?;
        }
        debug!("Bookkeeping written");
        Ok(())
    }

    async fn read_text(&self, job_name: &str, file: &str) -> Result<String, StorageError> {
        let key = key(job_name, file);
        let data = self.store.get_object(&key).await?;
        String::from_utf8(data).map_err(|e| StorageError::InvalidValue {
            key,
            reason: e.to_string(),
        })
    }

    async fn read_optional(&self, job_name: &str, file: &str) -> Result<Option<String>, StorageError> {
        match self.read_text(job_name, file).await {
            Ok(value) => Ok(Some(value)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Repo id, sha and draft flag. A launch without `is_draft.txt` is not a draft.
    #[instrument(skip(self), fields(job = %job_name))]
    pub async fn read_commit(&self, job_name: &str) -> Result<CommitRef, StorageError> {
        let repo_id = self.read_text(job_name, REPO_ID_FILE).await?.trim().to_string();
        if repo_id.parse::<u64>().is_err() {
            return Err(StorageError::InvalidValue {
                key: key(job_name, REPO_ID_FILE),
                reason: format!("not a repository id: {:?}", repo_id),
            });
        }
        let sha = self.read_text(job_name, SHA_FILE).await?.trim().to_string();
        let is_draft = self
            .read_optional(job_name, IS_DRAFT_FILE)
            .await?
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(CommitRef {
            repo_id,
            sha,
            is_draft,
        })
    }

    pub async fn read_expected(&self, job_name: &str) -> Result<String, StorageError> {
        self.read_text(job_name, EXPECTED_FILE).await
    }

    /// `<job>/out/cbmc.txt`, written by the property stage
    pub async fn read_cbmc_output(&self, job_name: &str) -> Result<String, StorageError> {
        let key = key(job_name, CBMC_OUTPUT_FILE);
        let data = self.store.get_object(&key).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Everything written by `write`
    #[instrument(skip(self), fields(job = %job_name))]
    pub async fn read(&self, job_name: &str) -> Result<Bookkeeping, StorageError> {
        let commit = self.read_commit(job_name).await?;
        let expected = self.read_expected(job_name).await?;
        let correlation_list = match self.read_optional(job_name, CORRELATION_LIST_FILE).await? {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(&raw).map_err(|e| StorageError::InvalidValue {
                    key: key(job_name, CORRELATION_LIST_FILE),
                    reason: e.to_string(),
                })?
            }
            _ => Vec::new(),
        };
        Ok(Bookkeeping {
            repo_id: commit.repo_id,
            sha: commit.sha,
            is_draft: commit.is_draft,
            expected,
            correlation_list,
        })
    }

    /// Upload a source tarball under `key`
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload_tarball(&self, path: &Path, key: &str) -> Result<(), StorageError> {
        info!(
            "Uploading {} to {}/{}",
            path.display(),
            self.store.bucket_name(),
            key
        );
        self.store.upload_file(path, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;

    fn sample() -> Bookkeeping {
        Bookkeeping {
            repo_id: "12345".to_string(),
            sha: "abcdef".to_string(),
            is_draft: true,
            expected: "VERIFICATION SUCCESSFUL".to_string(),
            correlation_list: vec!["build-1".to_string()],
        }
    }

    fn stores() -> (InMemoryObjectStore, BookkeepingStore) {
        let memory = InMemoryObjectStore::new("bkt");
        let bookkeeping = BookkeepingStore::new(Arc::new(memory.clone()));
        (memory, bookkeeping)
    }

    #[tokio::test]
    async fn test_write_layout() {
        let (memory, store) = stores();
        store.write("job-20200101-000000", &sample()).await.unwrap();
        assert_eq!(
            memory.keys(),
            vec![
                "job-20200101-000000/correlation_list.txt",
                "job-20200101-000000/expected.txt",
                "job-20200101-000000/is_draft.txt",
                "job-20200101-000000/repo_id.txt",
                "job-20200101-000000/sha.txt",
            ]
        );
        assert_eq!(
            memory.get_string("job-20200101-000000/correlation_list.txt").as_deref(),
            Some("[\"build-1\"]")
        );
    }

    #[tokio::test]
    async fn test_read_back() {
        let (_, store) = stores();
        store.write("job", &sample()).await.unwrap();
        assert_eq!(store.read("job").await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_missing_optional_objects() {
        let (memory, store) = stores();
        memory.put_object("job/repo_id.txt", b"42\n").await.unwrap();
        memory.put_object("job/sha.txt", b"abc").await.unwrap();
        memory.put_object("job/expected.txt", b"").await.unwrap();
        let read = store.read("job").await.unwrap();
        assert_eq!(read.repo_id, "42");
        assert!(!read.is_draft);
        assert!(read.correlation_list.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_draft_flag() {
        let (memory, store) = stores();
        memory.put_object("job/repo_id.txt", b"42").await.unwrap();
        memory.put_object("job/sha.txt", b"abc").await.unwrap();
        memory.put_object("job/is_draft.txt", b"True").await.unwrap();
        assert!(store.read_commit("job").await.unwrap().is_draft);
    }

    #[tokio::test]
    async fn test_invalid_repo_id() {
        let (memory, store) = stores();
        memory.put_object("job/repo_id.txt", b"owner/repo").await.unwrap();
        memory.put_object("job/sha.txt", b"abc").await.unwrap();
        assert!(matches!(
            store.read_commit("job").await,
            Err(StorageError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_output() {
        let (_, store) = stores();
        assert!(matches!(
            store.read_cbmc_output("job").await,
            Err(StorageError::NotFound(ref key)) if key == "job/out/cbmc.txt"
        ));
    }
}
