use grader_protocol::Verdict;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Where verdicts go once a grading call is finished. Implemented by the
/// caller; the engine never reads verdicts back.
#[async_trait]
pub trait VerdictStore: Send + Sync {
    async fn record(&self, verdict: &Verdict, challenge_id: &str, attempt_id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt_id: Uuid,
    pub challenge_id: String,
    pub verdict: Verdict,
}

/// Keeps every attempt in memory, keyed by attempt id.
#[derive(Debug, Default)]
pub struct MemoryVerdictStore {
    records: DashMap<Uuid, AttemptRecord>,
}

impl MemoryVerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attempt_id: &Uuid) -> Option<AttemptRecord> {
        self.records.get(attempt_id).map(|r| r.value().clone())
    }

    pub fn attempts_for(&self, challenge_id: &str) -> Vec<AttemptRecord> {
        self.records
            .iter()
            .filter(|r| r.challenge_id == challenge_id)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VerdictStore for MemoryVerdictStore {
    async fn record(&self, verdict: &Verdict, challenge_id: &str, attempt_id: Uuid) -> Result<()> {
        let record = AttemptRecord {
            attempt_id,
            challenge_id: challenge_id.to_owned(),
            verdict: verdict.clone(),
        };
        if self.records.insert(attempt_id, record).is_some() {
            anyhow::bail!("duplicate attempt id: {}", attempt_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use grader_protocol::Outcome;

    #[tokio::test]
    async fn records_by_attempt() {
        let store = MemoryVerdictStore::new();
        let solved = Verdict::new(Outcome::Solved, "ok");
        let wrong = Verdict::new(Outcome::Incorrect, "no");

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.record(&wrong, "level-1", a).await.unwrap();
        store.record(&solved, "level-1", b).await.unwrap();
        store.record(&solved, "level-2", Uuid::new_v4()).await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(&a).unwrap().verdict, wrong);
        assert_eq!(store.attempts_for("level-1").len(), 2);
        assert!(store.record(&solved, "level-1", a).await.is_err());
    }
}
