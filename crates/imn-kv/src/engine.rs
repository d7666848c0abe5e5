use std::time::Duration;

use async_trait::async_trait;

use crate::KvError;

/// Member of a sorted set together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

/// One mutation inside a [`Batch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    Delete {
        key: String,
    },
    ZAdd {
        set: String,
        member: String,
        score: i64,
    },
    ZRem {
        set: String,
        member: String,
    },
    LPush {
        list: String,
        value: Vec<u8>,
    },
}

/// Optimistic precondition of a [`Batch`].
///
/// The batch applies only if `key` currently holds exactly `expected`
/// (`None` means the key must be absent). Failure maps to
/// [`KvError::VersionConflict`] and no op in the batch is applied.
#[derive(Debug, Clone)]
pub struct Guard {
    pub key: String,
    pub expected: Option<Vec<u8>>,
}

/// Atomic multi-key write.
///
/// Logical updates that span several keys (primary record, secondary index,
/// idempotency mark) are issued as one batch so a crash can never expose a
/// secondary index without its primary record.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub guard: Option<Guard>,
    pub ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guarded(key: impl Into<String>, expected: Option<Vec<u8>>) -> Self {
        Self {
            guard: Some(Guard {
                key: key.into(),
                expected,
            }),
            ops: Vec::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value,
            ttl: None,
        });
        self
    }

    pub fn set_ttl(mut self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) -> Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value,
            ttl: Some(ttl),
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn zadd(mut self, set: impl Into<String>, member: impl Into<String>, score: i64) -> Self {
        self.ops.push(WriteOp::ZAdd {
            set: set.into(),
            member: member.into(),
            score,
        });
        self
    }

    pub fn zrem(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::ZRem {
            set: set.into(),
            member: member.into(),
        });
        self
    }

    pub fn lpush(mut self, list: impl Into<String>, value: Vec<u8>) -> Self {
        self.ops.push(WriteOp::LPush {
            list: list.into(),
            value,
        });
        self
    }
}

/// Backing engine contract.
///
/// Cancellation is carried by the caller's future: dropping an in-flight
/// call abandons it, and multi-key consistency is preserved because every
/// multi-key update goes through the atomic [`KvEngine::apply`].
#[async_trait]
pub trait KvEngine: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    async fn zadd(&self, set: &str, member: &str, score: i64) -> Result<(), KvError>;

    /// Members with `min <= score <= max`, ordered by ascending score.
    async fn zrange_by_score(
        &self,
        set: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<ScoredMember>, KvError>;

    /// Returns whether the member was present.
    async fn zrem(&self, set: &str, member: &str) -> Result<bool, KvError>;

    /// All members ordered by ascending score.
    async fn zmembers(&self, set: &str) -> Result<Vec<ScoredMember>, KvError>;

    async fn lpush(&self, list: &str, value: &[u8]) -> Result<(), KvError>;

    /// First `limit` entries, newest first.
    async fn lrange(&self, list: &str, limit: usize) -> Result<Vec<Vec<u8>>, KvError>;

    /// All live keys with the given prefix and their values.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KvError>;

    /// Apply a conditional multi-key batch atomically.
    async fn apply(&self, batch: Batch) -> Result<(), KvError>;
}
