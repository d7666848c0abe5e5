use std::sync::Arc;
use std::time::Duration;

use imn_kv::{Batch, KvEngine, KvError};
use imn_model::{Task, TaskStatus};

use crate::{StoreError, keys};

/// Visibility-timeout task queue over two sorted sets.
///
/// `tasks:pending` is scored by scheduled-at, `tasks:inflight` by the
/// visibility deadline; a task is a member of at most one of them (I4).
/// Claims are guarded on the primary record bytes so two pumps racing for
/// the same task cannot both win.
#[derive(Clone)]
pub struct TaskQueue {
    engine: Arc<dyn KvEngine>,
    max_retries: i32,
    requeue_jitter: Duration,
}

impl TaskQueue {
    pub fn new(engine: Arc<dyn KvEngine>, max_retries: i32, requeue_jitter: Duration) -> Self {
        Self {
            engine,
            max_retries,
            requeue_jitter,
        }
    }

    pub async fn schedule(&self, task: &Task) -> Result<(), StoreError> {
        let batch = Batch::new()
            .set(keys::task(&task.id), serde_json::to_vec(task)?)
            .zadd(keys::TASKS_PENDING, task.id.clone(), task.scheduled_at);
        self.engine.apply(batch).await?;
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, StoreError> {
        let bytes = self
            .engine
            .get(&keys::task(task_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("task {task_id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Claim every task due at `now`, moving it to the in-flight set with a
    /// visibility deadline of `now + visibility_timeout`.
    pub async fn claim_due(
        &self,
        now: i64,
        visibility_timeout: Duration,
    ) -> Result<Vec<Task>, StoreError> {
        let due = self
            .engine
            .zrange_by_score(keys::TASKS_PENDING, i64::MIN, now)
            .await?;

        let mut claimed = Vec::new();
        for member in due {
            let key = keys::task(&member.member);
            let Some(bytes) = self.engine.get(&key).await? else {
                // Orphaned index entry, prune it.
                self.engine.zrem(keys::TASKS_PENDING, &member.member).await?;
                continue;
            };
            let mut task: Task = serde_json::from_slice(&bytes)?;
            task.status = TaskStatus::InFlight;
            task.visible_at = now + visibility_timeout.as_secs() as i64;

            let batch = Batch::guarded(key.clone(), Some(bytes))
                .zrem(keys::TASKS_PENDING, task.id.clone())
                .zadd(keys::TASKS_INFLIGHT, task.id.clone(), task.visible_at)
                .set(key, serde_json::to_vec(&task)?);
            match self.engine.apply(batch).await {
                Ok(()) => claimed.push(task),
                // Another claimer won the race; leave the task to them.
                Err(KvError::VersionConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(claimed)
    }

    /// Acknowledge completion: the task leaves the in-flight set and its
    /// primary record is deleted.
    pub async fn ack(&self, task_id: &str) -> Result<(), StoreError> {
        // Existence check keeps acks of unknown ids a typed error.
        self.get(task_id).await?;

        let batch = Batch::new()
            .zrem(keys::TASKS_INFLIGHT, task_id.to_string())
            .delete(keys::task(task_id));
        self.engine.apply(batch).await?;
        Ok(())
    }

    /// Negative acknowledgement: return the task to pending after
    /// `retry_delay`, or dead-letter it once the retry ceiling is passed.
    pub async fn nack(
        &self,
        task_id: &str,
        retry_delay: Duration,
        now: i64,
    ) -> Result<Task, StoreError> {
        let mut task = self.get(task_id).await?;
        task.retry_count += 1;

        if task.retry_count > self.max_retries {
            return self.dead_letter(task).await;
        }

        task.status = TaskStatus::Pending;
        task.visible_at = 0;
        let score = now + retry_delay.as_secs() as i64;
        let batch = Batch::new()
            .zrem(keys::TASKS_INFLIGHT, task.id.clone())
            .zadd(keys::TASKS_PENDING, task.id.clone(), score)
            .set(keys::task(&task.id), serde_json::to_vec(&task)?);
        self.engine.apply(batch).await?;
        Ok(task)
    }

    /// Recovery sweep: move in-flight tasks whose visibility deadline has
    /// passed back to pending, delayed by a small jitter so they are not
    /// reprocessed in the same tick. Returns how many were moved.
    pub async fn requeue_expired(&self, now: i64) -> Result<usize, StoreError> {
        let expired = self
            .engine
            .zrange_by_score(keys::TASKS_INFLIGHT, i64::MIN, now)
            .await?;

        let mut moved = 0;
        for member in expired {
            let key = keys::task(&member.member);
            let Some(bytes) = self.engine.get(&key).await? else {
                self.engine.zrem(keys::TASKS_INFLIGHT, &member.member).await?;
                continue;
            };
            let mut task: Task = serde_json::from_slice(&bytes)?;
            task.retry_count += 1;

            if task.retry_count > self.max_retries {
                self.dead_letter(task).await?;
                moved += 1;
                continue;
            }

            task.status = TaskStatus::Pending;
            task.visible_at = 0;
            let score = now + self.requeue_jitter.as_secs() as i64;
            let batch = Batch::guarded(key.clone(), Some(bytes))
                .zrem(keys::TASKS_INFLIGHT, task.id.clone())
                .zadd(keys::TASKS_PENDING, task.id.clone(), score)
                .set(key, serde_json::to_vec(&task)?);
            match self.engine.apply(batch).await {
                Ok(()) => moved += 1,
                Err(KvError::VersionConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(moved)
    }

    /// Dead-lettered tasks, newest first.
    pub async fn list_dead(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let entries = self.engine.lrange(keys::TASKS_DEAD, limit).await?;
        let mut tasks = Vec::with_capacity(entries.len());
        for bytes in entries {
            match serde_json::from_slice(&bytes) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable dead-letter task"),
            }
        }
        Ok(tasks)
    }

    async fn dead_letter(&self, mut task: Task) -> Result<Task, StoreError> {
        tracing::warn!(task_id = %task.id, retries = task.retry_count, "task exceeded retry ceiling, dead-lettering");
        task.status = TaskStatus::Failed;
        task.visible_at = 0;
        let bytes = serde_json::to_vec(&task)?;
        let batch = Batch::new()
            .zrem(keys::TASKS_INFLIGHT, task.id.clone())
            .zrem(keys::TASKS_PENDING, task.id.clone())
            .lpush(keys::TASKS_DEAD, bytes.clone())
            .set(keys::task(&task.id), bytes);
        self.engine.apply(batch).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imn_kv::MemoryEngine;

    const VIS: Duration = Duration::from_secs(60);

    fn queue() -> TaskQueue {
        TaskQueue::new(Arc::new(MemoryEngine::new()), 5, Duration::from_secs(5))
    }

    fn task(id: &str, scheduled_at: i64) -> Task {
        Task::new(id, "a1", "ping_module", b"{}".to_vec(), scheduled_at, scheduled_at)
    }

    #[tokio::test]
    async fn claim_moves_task_to_inflight() {
        let queue = queue();
        queue.schedule(&task("t1", 100)).await.unwrap();

        let claimed = queue.claim_due(100, VIS).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, TaskStatus::InFlight);
        assert_eq!(claimed[0].visible_at, 160);

        // Hidden while in flight.
        assert!(queue.claim_due(130, VIS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_task_is_not_due() {
        let queue = queue();
        queue.schedule(&task("t1", 200)).await.unwrap();
        assert!(queue.claim_due(100, VIS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn visibility_cycle_requeues_once() {
        let queue = queue();
        queue.schedule(&task("t1", 100)).await.unwrap();

        assert_eq!(queue.claim_due(100, VIS).await.unwrap().len(), 1);
        assert!(queue.claim_due(130, VIS).await.unwrap().is_empty());

        // Deadline passed: the sweep returns it to pending with jitter.
        assert_eq!(queue.requeue_expired(170).await.unwrap(), 1);
        let reclaimed = queue.claim_due(180, VIS).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].retry_count, 1, "one increment per cycle");
    }

    #[tokio::test]
    async fn ack_removes_task() {
        let queue = queue();
        queue.schedule(&task("t1", 100)).await.unwrap();
        queue.claim_due(100, VIS).await.unwrap();

        queue.ack("t1").await.unwrap();
        assert!(matches!(queue.get("t1").await.unwrap_err(), StoreError::NotFound(_)));
        assert_eq!(queue.requeue_expired(1_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_unknown_task_is_not_found() {
        let err = queue().ack("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn nack_delays_retry() {
        let queue = queue();
        queue.schedule(&task("t1", 100)).await.unwrap();
        queue.claim_due(100, VIS).await.unwrap();

        let task = queue.nack("t1", Duration::from_secs(30), 110).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);

        assert!(queue.claim_due(120, VIS).await.unwrap().is_empty());
        assert_eq!(queue.claim_due(140, VIS).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_ceiling_dead_letters() {
        let queue = TaskQueue::new(Arc::new(MemoryEngine::new()), 1, Duration::from_secs(5));
        queue.schedule(&task("t1", 100)).await.unwrap();

        queue.claim_due(100, VIS).await.unwrap();
        queue.nack("t1", Duration::ZERO, 100).await.unwrap();

        queue.claim_due(105, VIS).await.unwrap();
        let dead = queue.nack("t1", Duration::ZERO, 105).await.unwrap();
        assert_eq!(dead.status, TaskStatus::Failed);

        assert!(queue.claim_due(1_000, VIS).await.unwrap().is_empty());
        let listed = queue.list_dead(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "t1");
    }
}
