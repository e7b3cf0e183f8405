use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::{AuthResult, OtpRecord, OtpStore};

/// In-memory OTP record store.
#[derive(Debug, Default)]
pub struct InMemoryOtpStore {
    records: DashMap<Uuid, OtpRecord>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn save(&self, record: &OtpRecord) -> AuthResult<()> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_pending(&self, key: &str, now: OffsetDateTime) -> AuthResult<Option<OtpRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.key == key && r.is_pending_at(now))
            .max_by_key(|r| r.expires_at)
            .map(|r| r.value().clone()))
    }

    async fn mark_verified(&self, id: Uuid) -> AuthResult<bool> {
        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(false);
        };
        if record.verified {
            return Ok(false);
        }
        record.verified = true;
        Ok(true)
    }

    async fn purge_settled(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let before = self.records.len();
        self.records.retain(|_, r| r.is_pending_at(now));
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}
