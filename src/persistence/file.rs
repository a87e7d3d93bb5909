use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::mastery::LearnerProfile;
use crate::persistence::{validate_learner_id, PersistenceError, ProfileStore};

const HEADER_PREFIX: &str = "quantcoach-profile v1 sha256=";
const EXTENSION: &str = "profile";
const MAX_PLAIN_STEM: usize = 64;

/// Stores each learner in `<root>/<stem>.profile`.
///
/// The file is a header line carrying the SHA-256 of the JSON payload that
/// follows it. Saves go to a temp file which is synced and renamed over the
/// previous version, whose copy is kept as `.profile.bak`.
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    root: PathBuf,
}

impl FileProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_path(&self, learner_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.{EXTENSION}", file_stem(learner_id)))
    }

    fn backup_path(&self, learner_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.{EXTENSION}.bak", file_stem(learner_id)))
    }

    fn temp_path(&self, learner_id: &str) -> PathBuf {
        self.root.join(format!(
            "{}.{EXTENSION}.{}.tmp",
            file_stem(learner_id),
            uuid::Uuid::new_v4().simple()
        ))
    }

    fn quarantine_path(&self, learner_id: &str, now_ms: i64) -> PathBuf {
        self.root.join(format!(
            "{}.{EXTENSION}.corrupt-{now_ms}",
            file_stem(learner_id)
        ))
    }

    async fn read_verified(
        &self,
        path: &Path,
        learner_id: &str,
    ) -> Result<Option<LearnerProfile>, PersistenceError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => decode(learner_id, &bytes).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistenceError::Io(err)),
        }
    }

    async fn load_inner(
        &self,
        learner_id: &str,
        now_ms: i64,
    ) -> Result<LearnerProfile, PersistenceError> {
        validate_learner_id(learner_id)?;
        let path = self.profile_path(learner_id);

        let primary_err = match self.read_verified(&path, learner_id).await {
            Ok(Some(profile)) => return Ok(profile),
            Ok(None) => return Ok(LearnerProfile::new(learner_id, now_ms)),
            Err(err @ PersistenceError::Corrupted { .. }) => err,
            Err(err) => return Err(err),
        };

        warn!(learner_id, error = %primary_err, "profile failed verification, trying backup");
        let backup = self
            .read_verified(&self.backup_path(learner_id), learner_id)
            .await;
        if let Ok(Some(profile)) = backup {
            warn!(learner_id, "profile restored from backup");
            return Ok(profile);
        }

        let quarantine = self.quarantine_path(learner_id, now_ms);
        match tokio::fs::rename(&path, &quarantine).await {
            Ok(()) => warn!(learner_id, path = %quarantine.display(), "corrupt profile quarantined"),
            Err(err) => warn!(learner_id, error = %err, "failed to quarantine corrupt profile"),
        }
        Err(primary_err)
    }

    async fn save_inner(
        &self,
        learner_id: &str,
        profile: &LearnerProfile,
    ) -> Result<(), PersistenceError> {
        validate_learner_id(learner_id)?;
        let bytes = encode(profile)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.profile_path(learner_id);
        let tmp = self.temp_path(learner_id);
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(err) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        match tokio::fs::copy(&path, self.backup_path(learner_id)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(learner_id, error = %err, "failed to refresh profile backup"),
        }

        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        debug!(learner_id, bytes = bytes.len(), "profile saved");
        Ok(())
    }
}

impl ProfileStore for FileProfileStore {
    fn load<'a>(
        &'a self,
        learner_id: &'a str,
        now_ms: i64,
    ) -> BoxFuture<'a, Result<LearnerProfile, PersistenceError>> {
        Box::pin(self.load_inner(learner_id, now_ms))
    }

    fn save<'a>(
        &'a self,
        learner_id: &'a str,
        profile: &'a LearnerProfile,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(self.save_inner(learner_id, profile))
    }
}

/// Plain lowercase ids are used as-is; anything else is hashed so that no
/// id can escape the store directory and ids differing only in case never
/// share a file on case-insensitive filesystems.
pub fn file_stem(learner_id: &str) -> String {
    let plain = !learner_id.is_empty()
        && learner_id.len() <= MAX_PLAIN_STEM
        && learner_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if plain {
        learner_id.to_string()
    } else {
        let digest = Sha256::digest(learner_id.as_bytes());
        format!("~{}", &hex::encode(digest)[..32])
    }
}

pub fn encode(profile: &LearnerProfile) -> Result<Vec<u8>, PersistenceError> {
    let payload = serde_json::to_vec_pretty(profile)?;
    let checksum = hex::encode(Sha256::digest(&payload));
    let mut out = Vec::with_capacity(HEADER_PREFIX.len() + checksum.len() + 1 + payload.len());
    out.extend_from_slice(HEADER_PREFIX.as_bytes());
    out.extend_from_slice(checksum.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode(learner_id: &str, bytes: &[u8]) -> Result<LearnerProfile, PersistenceError> {
    let corrupted = |reason: &str| PersistenceError::Corrupted {
        learner_id: learner_id.to_string(),
        reason: reason.to_string(),
    };

    let newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupted("missing header"))?;
    let header =
        std::str::from_utf8(&bytes[..newline]).map_err(|_| corrupted("header is not utf-8"))?;
    let expected = header
        .strip_prefix(HEADER_PREFIX)
        .ok_or_else(|| corrupted("unrecognised header"))?;
    let payload = &bytes[newline + 1..];

    let actual = hex::encode(Sha256::digest(payload));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(corrupted("checksum mismatch"));
    }

    let profile: LearnerProfile = serde_json::from_slice(payload)
        .map_err(|e| corrupted(&format!("payload unreadable: {e}")))?;
    if profile.learner_id != learner_id {
        return Err(corrupted("profile belongs to another learner"));
    }
    Ok(profile)
}
