use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::engine::{Batch, KvEngine, ScoredMember, WriteOp};
use crate::journal::{Journal, JournalRecord};
use crate::KvError;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<i64>,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|t| t > now)
    }
}

#[derive(Default)]
struct ZSet {
    by_member: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl ZSet {
    fn add(&mut self, member: String, score: i64) {
        if let Some(old) = self.by_member.insert(member.clone(), score) {
            self.ordered.remove(&(old, member.clone()));
        }
        self.ordered.insert((score, member));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.by_member.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct State {
    kv: HashMap<String, Entry>,
    zsets: HashMap<String, ZSet>,
    lists: HashMap<String, VecDeque<Vec<u8>>>,
}

impl State {
    fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Set {
                key,
                value,
                expires_at,
            } => {
                self.kv.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        expires_at: *expires_at,
                    },
                );
            }
            JournalRecord::Delete { key } => {
                self.kv.remove(key);
            }
            JournalRecord::ZAdd { set, member, score } => {
                self.zsets
                    .entry(set.clone())
                    .or_default()
                    .add(member.clone(), *score);
            }
            JournalRecord::ZRem { set, member } => {
                if let Some(zset) = self.zsets.get_mut(set) {
                    zset.remove(member);
                }
            }
            JournalRecord::LPush { list, value } => {
                self.lists
                    .entry(list.clone())
                    .or_default()
                    .push_front(value.clone());
            }
        }
    }

    fn live_value(&self, key: &str, now: i64) -> Option<&Entry> {
        self.kv.get(key).filter(|entry| entry.is_live(now))
    }

    /// Full snapshot as journal records; expired entries are dropped.
    fn snapshot(&self, now: i64) -> Vec<JournalRecord> {
        let mut records = Vec::new();
        for (key, entry) in &self.kv {
            if entry.is_live(now) {
                records.push(JournalRecord::Set {
                    key: key.clone(),
                    value: entry.value.clone(),
                    expires_at: entry.expires_at,
                });
            }
        }
        for (set, zset) in &self.zsets {
            for (score, member) in &zset.ordered {
                records.push(JournalRecord::ZAdd {
                    set: set.clone(),
                    member: member.clone(),
                    score: *score,
                });
            }
        }
        for (list, items) in &self.lists {
            // Lists hold the newest entry at the front; replaying prepends,
            // so the snapshot emits them oldest-first.
            for value in items.iter().rev() {
                records.push(JournalRecord::LPush {
                    list: list.clone(),
                    value: value.clone(),
                });
            }
        }
        records
    }
}

struct Inner {
    state: State,
    journal: Option<Journal>,
}

impl Inner {
    /// Persist and apply the records of one atomic unit. The journal is
    /// written first so in-memory state never runs ahead of disk.
    fn commit(&mut self, records: Vec<JournalRecord>) -> Result<(), KvError> {
        if let Some(journal) = &mut self.journal {
            journal.append(&records)?;
        }
        for record in &records {
            self.state.apply(record);
        }
        Ok(())
    }
}

/// In-memory primary store, durable through an append-only journal.
///
/// All mutations go through [`Inner::commit`] under a single lock, which is
/// what makes [`KvEngine::apply`] batches atomic. Expired entries are
/// filtered on read and physically dropped at the next compaction.
pub struct MemoryEngine {
    inner: Mutex<Inner>,
}

impl MemoryEngine {
    /// Ephemeral engine with no durability. Used by tests and embedded runs.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::default(),
                journal: None,
            }),
        }
    }

    /// Durable engine: replay the journal at `path`, then compact it so a
    /// long-running deployment does not accumulate unbounded history.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref();
        let mut state = State::default();
        for record in Journal::replay(path)? {
            state.apply(&record);
        }

        let snapshot = state.snapshot(now_unix());
        let journal = Journal::compact(path, &snapshot)?;
        tracing::info!(path = %journal.path().display(), records = snapshot.len(), "journal replayed and compacted");

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                journal: Some(journal),
            }),
        })
    }

    fn record_for(op: &WriteOp, now: i64) -> JournalRecord {
        match op {
            WriteOp::Set { key, value, ttl } => JournalRecord::Set {
                key: key.clone(),
                value: value.clone(),
                expires_at: ttl.map(|d| now + d.as_secs() as i64),
            },
            WriteOp::Delete { key } => JournalRecord::Delete { key: key.clone() },
            WriteOp::ZAdd { set, member, score } => JournalRecord::ZAdd {
                set: set.clone(),
                member: member.clone(),
                score: *score,
            },
            WriteOp::ZRem { set, member } => JournalRecord::ZRem {
                set: set.clone(),
                member: member.clone(),
            },
            WriteOp::LPush { list, value } => JournalRecord::LPush {
                list: list.clone(),
                value: value.clone(),
            },
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvEngine for MemoryEngine {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .state
            .live_value(key, now_unix())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError> {
        self.apply(Batch {
            guard: None,
            ops: vec![WriteOp::Set {
                key: key.to_string(),
                value: value.to_vec(),
                ttl,
            }],
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.state.live_value(key, now_unix()).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.state.live_value(key, now_unix()).is_some();
        inner.commit(vec![JournalRecord::Delete {
            key: key.to_string(),
        }])?;
        Ok(existed)
    }

    async fn zadd(&self, set: &str, member: &str, score: i64) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        inner.commit(vec![JournalRecord::ZAdd {
            set: set.to_string(),
            member: member.to_string(),
            score,
        }])
    }

    async fn zrange_by_score(
        &self,
        set: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<ScoredMember>, KvError> {
        let inner = self.inner.lock().unwrap();
        let Some(zset) = inner.state.zsets.get(set) else {
            return Ok(Vec::new());
        };
        Ok(zset
            .ordered
            .iter()
            .filter(|(score, _)| *score >= min && *score <= max)
            .map(|(score, member)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect())
    }

    async fn zrem(&self, set: &str, member: &str) -> Result<bool, KvError> {
        let mut inner = self.inner.lock().unwrap();
        let present = inner
            .state
            .zsets
            .get(set)
            .is_some_and(|zset| zset.by_member.contains_key(member));
        inner.commit(vec![JournalRecord::ZRem {
            set: set.to_string(),
            member: member.to_string(),
        }])?;
        Ok(present)
    }

    async fn zmembers(&self, set: &str) -> Result<Vec<ScoredMember>, KvError> {
        self.zrange_by_score(set, i64::MIN, i64::MAX).await
    }

    async fn lpush(&self, list: &str, value: &[u8]) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        inner.commit(vec![JournalRecord::LPush {
            list: list.to_string(),
            value: value.to_vec(),
        }])
    }

    async fn lrange(&self, list: &str, limit: usize) -> Result<Vec<Vec<u8>>, KvError> {
        let inner = self.inner.lock().unwrap();
        let Some(items) = inner.state.lists.get(list) else {
            return Ok(Vec::new());
        };
        Ok(items.iter().take(limit).cloned().collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KvError> {
        let inner = self.inner.lock().unwrap();
        let now = now_unix();
        let mut entries: Vec<(String, Vec<u8>)> = inner
            .state
            .kv
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn apply(&self, batch: Batch) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        let now = now_unix();

        if let Some(guard) = &batch.guard {
            let current = inner
                .state
                .live_value(&guard.key, now)
                .map(|entry| entry.value.as_slice());
            if current != guard.expected.as_deref() {
                return Err(KvError::VersionConflict(guard.key.clone()));
            }
        }

        let records = batch
            .ops
            .iter()
            .map(|op| Self::record_for(op, now))
            .collect();
        inner.commit(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn set_get_delete() {
        let engine = MemoryEngine::new();
        engine.set("k1", b"v1", None).await.unwrap();

        assert_eq!(engine.get("k1").await.unwrap(), Some(b"v1".to_vec()));
        assert!(engine.exists("k1").await.unwrap());

        assert!(engine.delete("k1").await.unwrap());
        assert_eq!(engine.get("k1").await.unwrap(), None);
        assert!(!engine.delete("k1").await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let engine = MemoryEngine::new();
        engine
            .set("mark", b"1", Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(engine.get("mark").await.unwrap(), None);
        assert!(!engine.exists("mark").await.unwrap());
    }

    #[tokio::test]
    async fn long_ttl_stays_live() {
        let engine = MemoryEngine::new();
        engine
            .set("mark", b"1", Some(Duration::from_secs(86_400)))
            .await
            .unwrap();
        assert!(engine.exists("mark").await.unwrap());
    }

    #[tokio::test]
    async fn zset_orders_by_score() {
        let engine = MemoryEngine::new();
        engine.zadd("s", "late", 30).await.unwrap();
        engine.zadd("s", "early", 10).await.unwrap();
        engine.zadd("s", "mid", 20).await.unwrap();

        let members = engine.zmembers("s").await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(names, vec!["early", "mid", "late"]);

        let due = engine.zrange_by_score("s", i64::MIN, 20).await.unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn zadd_updates_score_in_place() {
        let engine = MemoryEngine::new();
        engine.zadd("s", "m", 10).await.unwrap();
        engine.zadd("s", "m", 99).await.unwrap();

        let members = engine.zmembers("s").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].score, 99);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let engine = MemoryEngine::new();
        engine.lpush("log", b"first").await.unwrap();
        engine.lpush("log", b"second").await.unwrap();

        let items = engine.lrange("log", 10).await.unwrap();
        assert_eq!(items, vec![b"second".to_vec(), b"first".to_vec()]);

        let limited = engine.lrange("log", 1).await.unwrap();
        assert_eq!(limited, vec![b"second".to_vec()]);
    }

    #[tokio::test]
    async fn scan_prefix_filters_and_sorts() {
        let engine = MemoryEngine::new();
        engine.set("agent:b", b"2", None).await.unwrap();
        engine.set("agent:a", b"1", None).await.unwrap();
        engine.set("task:x", b"3", None).await.unwrap();

        let agents = engine.scan_prefix("agent:").await.unwrap();
        let keys: Vec<_> = agents.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["agent:a", "agent:b"]);
    }

    #[tokio::test]
    async fn guard_mismatch_applies_nothing() {
        let engine = MemoryEngine::new();
        engine.set("k", b"v1", None).await.unwrap();

        let batch = Batch::guarded("k", Some(b"other".to_vec()))
            .set("k", b"v2".to_vec())
            .zadd("idx", "k", 1);
        let err = engine.apply(batch).await.unwrap_err();
        assert!(matches!(err, KvError::VersionConflict(_)));

        assert_eq!(engine.get("k").await.unwrap(), Some(b"v1".to_vec()));
        assert!(engine.zmembers("idx").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn guard_on_absent_key() {
        let engine = MemoryEngine::new();
        let batch = Batch::guarded("fresh", None).set("fresh", b"v".to_vec());
        engine.apply(batch).await.unwrap();

        // Second guarded-absent write must now conflict.
        let batch = Batch::guarded("fresh", None).set("fresh", b"w".to_vec());
        assert!(matches!(
            engine.apply(batch).await.unwrap_err(),
            KvError::VersionConflict(_)
        ));
    }

    #[tokio::test]
    async fn journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");

        {
            let engine = MemoryEngine::open(&path).unwrap();
            engine.set("k", b"v", None).await.unwrap();
            engine.zadd("s", "m", 7).await.unwrap();
            engine.lpush("l", b"a").await.unwrap();
            engine.lpush("l", b"b").await.unwrap();
        }

        let engine = MemoryEngine::open(&path).unwrap();
        assert_eq!(engine.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(engine.zmembers("s").await.unwrap()[0].score, 7);
        assert_eq!(
            engine.lrange("l", 10).await.unwrap(),
            vec![b"b".to_vec(), b"a".to_vec()]
        );
    }

    #[tokio::test]
    async fn torn_journal_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");

        {
            let engine = MemoryEngine::open(&path).unwrap();
            engine.set("intact", b"1", None).await.unwrap();
        }
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .unwrap();
            file.write_all(b"{\"op\":\"set\",\"key\":\"torn").unwrap();
        }

        let engine = MemoryEngine::open(&path).unwrap();
        assert_eq!(engine.get("intact").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get("torn").await.unwrap(), None);
    }
}
