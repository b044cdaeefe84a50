//! Recovery log of the teacher onboarding saga.
//!
//! Every completed step is written here before the next one starts, so an
//! interrupted onboarding can be compensated later by
//! [`OnboardingSaga::recover`](super::OnboardingSaga::recover).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use super::onboarding::SagaStep;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    InProgress,
    Completed,
    Compensated,
    CompensationFailed,
}

impl SagaState {
    /// Records in these states still hold remote rows that may need undoing.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, SagaState::InProgress | SagaState::CompensationFailed)
    }
}

/// Progress of one onboarding, keyed by its idempotency key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub key: String,
    pub saga_id: Uuid,
    pub email: String,
    pub state: SagaState,
    pub username: Option<String>,
    pub account_id: Option<i64>,
    pub profile_id: Option<i64>,
    pub role_assigned: bool,
    pub teacher_id: Option<i64>,
    pub failed_step: Option<SagaStep>,
    pub error: Option<String>,
    /// Hash of the submitted teacher details; a replay must match it
    #[serde(default)]
    pub payload_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    pub fn start(key: String, email: String) -> Self {
        Self {
            key,
            saga_id: Uuid::new_v4(),
            email,
            state: SagaState::InProgress,
            username: None,
            account_id: None,
            profile_id: None,
            role_assigned: false,
            teacher_id: None,
            failed_step: None,
            error: None,
            payload_hash: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_payload_hash(mut self, hash: impl Into<String>) -> Self {
        self.payload_hash = Some(hash.into());
        self
    }

    /// Whether any remote row created by this saga may still exist.
    pub fn has_remote_effects(&self) -> bool {
        self.account_id.is_some() || self.role_assigned || self.teacher_id.is_some()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Result of [`SagaLog::claim`]
#[derive(Debug, Clone, PartialEq)]
pub enum SagaClaim {
    /// The key now belongs to the claiming saga
    Claimed,
    /// Another saga holds the key; its record is returned untouched
    Held(SagaRecord),
}

/// Durable store of saga records
#[async_trait]
pub trait SagaLog: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<SagaRecord>>;

    /// Store `record` unless another saga holds its key.
    ///
    /// A key whose saga was compensated is free again. Check and insert happen
    /// under one lock.
    async fn claim(&self, record: &SagaRecord) -> Result<SagaClaim>;

    /// Replace the record of the same saga. Fails with
    /// [`Error::SagaInProgress`] when the key is held by another saga.
    async fn save(&self, record: &SagaRecord) -> Result<()>;

    /// Records left in progress or with a failed compensation.
    async fn pending(&self) -> Result<Vec<SagaRecord>>;

    /// Forget a record. Returns whether one existed.
    async fn remove(&self, key: &str) -> Result<bool>;
}

fn claim_key(records: &mut BTreeMap<String, SagaRecord>, record: &SagaRecord) -> SagaClaim {
    match records.get(&record.key) {
        Some(held) if held.saga_id != record.saga_id && held.state != SagaState::Compensated => {
            SagaClaim::Held(held.clone())
        }
        _ => {
            records.insert(record.key.clone(), record.clone());
            SagaClaim::Claimed
        }
    }
}

fn ensure_owner(records: &BTreeMap<String, SagaRecord>, record: &SagaRecord) -> Result<()> {
    match records.get(&record.key) {
        Some(held) if held.saga_id != record.saga_id => {
            Err(Error::SagaInProgress(record.email.clone()))
        }
        _ => Ok(()),
    }
}

/// Process-local log, used when no log file is configured
#[derive(Debug, Default)]
pub struct MemorySagaLog {
    records: Mutex<BTreeMap<String, SagaRecord>>,
}

impl MemorySagaLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, SagaRecord>>> {
        self.records
            .lock()
            .map_err(|_| Error::config("saga log lock poisoned"))
    }
}

#[async_trait]
impl SagaLog for MemorySagaLog {
    async fn load(&self, key: &str) -> Result<Option<SagaRecord>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn claim(&self, record: &SagaRecord) -> Result<SagaClaim> {
        Ok(claim_key(&mut *self.lock()?, record))
    }

    async fn save(&self, record: &SagaRecord) -> Result<()> {
        let mut records = self.lock()?;
        ensure_owner(&records, record)?;
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<SagaRecord>> {
        Ok(self
            .lock()?
            .values()
            .filter(|r| r.state.needs_recovery())
            .cloned()
            .collect())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

/// Log kept as a JSON object (key -> record) in a single file
#[derive(Debug)]
pub struct JsonFileSagaLog {
    path: PathBuf,
    guard: tokio::sync::Mutex<()>,
}

impl JsonFileSagaLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, SagaRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &BTreeMap<String, SagaRecord>) -> Result<()> {
        // write-then-rename keeps the previous log intact if we die mid-write
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SagaLog for JsonFileSagaLog {
    async fn load(&self, key: &str) -> Result<Option<SagaRecord>> {
        let _guard = self.guard.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn claim(&self, record: &SagaRecord) -> Result<SagaClaim> {
        let _guard = self.guard.lock().await;
        let mut records = self.read_all().await?;
        let claim = claim_key(&mut records, record);
        if claim == SagaClaim::Claimed {
            self.write_all(&records).await?;
        }
        Ok(claim)
    }

    async fn save(&self, record: &SagaRecord) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut records = self.read_all().await?;
        ensure_owner(&records, record)?;
        records.insert(record.key.clone(), record.clone());
        self.write_all(&records).await
    }

    async fn pending(&self) -> Result<Vec<SagaRecord>> {
        let _guard = self.guard.lock().await;
        Ok(self
            .read_all()
            .await?
            .into_values()
            .filter(|r| r.state.needs_recovery())
            .collect())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut records = self.read_all().await?;
        if records.remove(key).is_none() {
            return Ok(false);
        }
        self.write_all(&records).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, state: SagaState) -> SagaRecord {
        let mut record = SagaRecord::start(key.to_string(), format!("{}@example.com", key));
        record.state = state;
        record
    }

    #[test]
    fn memory_log_tracks_pending() {
        tokio_test::block_on(async {
            let log = MemorySagaLog::new();
            log.save(&record("ana", SagaState::InProgress)).await.unwrap();
            log.save(&record("beto", SagaState::Completed)).await.unwrap();
            log.save(&record("caro", SagaState::CompensationFailed))
                .await
                .unwrap();

            let pending: Vec<String> = log
                .pending()
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.key)
                .collect();
            assert_eq!(pending, vec!["ana".to_string(), "caro".to_string()]);

            let mut done = log.load("ana").await.unwrap().unwrap();
            done.state = SagaState::Compensated;
            done.touch();
            log.save(&done).await.unwrap();
            assert_eq!(log.pending().await.unwrap().len(), 1);
            assert_eq!(
                log.load("ana").await.unwrap().map(|r| r.state),
                Some(SagaState::Compensated)
            );
        });
    }

    #[tokio::test]
    async fn file_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saga.json");

        let log = JsonFileSagaLog::new(&path);
        assert!(log.load("ana").await.unwrap().is_none());

        let mut started = record("ana", SagaState::InProgress);
        started.account_id = Some(41);
        log.save(&started).await.unwrap();

        let reopened = JsonFileSagaLog::new(&path);
        let loaded = reopened.load("ana").await.unwrap().unwrap();
        assert_eq!(loaded.account_id, Some(41));
        assert!(loaded.has_remote_effects());
        assert_eq!(reopened.pending().await.unwrap().len(), 1);

        assert!(reopened.remove("ana").await.unwrap());
        assert!(!log.remove("ana").await.unwrap());
        assert!(log.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_is_refused_while_another_saga_holds_the_key() {
        let log = MemorySagaLog::new();
        let first = record("ana", SagaState::InProgress);
        assert_eq!(log.claim(&first).await.unwrap(), SagaClaim::Claimed);

        let second = record("ana", SagaState::InProgress);
        match log.claim(&second).await.unwrap() {
            SagaClaim::Held(held) => assert_eq!(held.saga_id, first.saga_id),
            other => panic!("expected the key to be held, got {:?}", other),
        }
        assert!(matches!(
            log.save(&second).await,
            Err(Error::SagaInProgress(_))
        ));
        assert_eq!(
            log.load("ana").await.unwrap().map(|r| r.saga_id),
            Some(first.saga_id)
        );

        // the holder may keep writing its own record
        let mut progressed = first.clone();
        progressed.account_id = Some(40);
        log.save(&progressed).await.unwrap();
    }

    #[tokio::test]
    async fn compensated_key_can_be_claimed_again() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonFileSagaLog::new(dir.path().join("saga.json"));

        let mut first = record("ana", SagaState::InProgress);
        assert_eq!(log.claim(&first).await.unwrap(), SagaClaim::Claimed);
        let completed = {
            let mut done = first.clone();
            done.state = SagaState::Completed;
            done
        };
        log.save(&completed).await.unwrap();

        let retry = record("ana", SagaState::InProgress);
        assert!(matches!(log.claim(&retry).await.unwrap(), SagaClaim::Held(_)));

        first.state = SagaState::Compensated;
        log.save(&first).await.unwrap();
        assert_eq!(log.claim(&retry).await.unwrap(), SagaClaim::Claimed);

        // the old saga can no longer overwrite the new one
        assert!(matches!(log.save(&first).await, Err(Error::SagaInProgress(_))));
        assert_eq!(
            log.load("ana").await.unwrap().map(|r| r.saga_id),
            Some(retry.saga_id)
        );
    }
}
