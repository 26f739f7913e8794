//! Non-blocking, auto-expiring named locks.
//!
//! Acquisition never waits: a caller that loses the race gets `None` and is
//! expected to give up. Every lock carries a TTL so a crashed holder cannot
//! wedge the key forever.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::RedisError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum LockError {
    #[error("lock service is not connected")]
    Unavailable,
    #[error(transparent)]
    Redis(#[from] RedisError),
}

/// Proof of ownership; release only succeeds while the stored value still matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LockToken {
    key: String,
    value: String,
}

impl LockToken {
    pub(crate) fn new(key: &str, value: String) -> Self {
        Self { key: key.to_string(), value }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn value(&self) -> &str {
        &self.value
    }
}

#[async_trait]
pub(crate) trait LockService: Send + Sync {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    async fn release(&self, token: &LockToken) -> Result<bool, LockError>;
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Exclusive<T> {
    Ran(T),
    Contended,
}

pub(crate) fn finalize_lock_key(exam_id: &str) -> String {
    format!("finalize-exam-lock:{exam_id}")
}

/// Runs `task` only if `key` can be taken right now.
pub(crate) async fn run_exclusive<L, F, T>(
    locks: &L,
    key: &str,
    ttl: Duration,
    task: F,
) -> Result<Exclusive<T>, LockError>
where
    L: LockService + ?Sized,
    F: Future<Output = T>,
{
    let Some(token) = locks.try_acquire(key, ttl).await? else {
        tracing::debug!(key, "Lock held elsewhere; skipping run");
        return Ok(Exclusive::Contended);
    };

    let output = task.await;

    match locks.release(&token).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(key, "Lock expired before the run finished"),
        Err(err) => tracing::warn!(key, error = %err, "Failed to release lock; TTL will clear it"),
    }

    Ok(Exclusive::Ran(output))
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::memory::InMemoryLocks;
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let locks = InMemoryLocks::default();

        let first = locks.try_acquire("exam", TTL).await.expect("acquire");
        let second = locks.try_acquire("exam", TTL).await.expect("acquire");

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn release_frees_the_key() {
        let locks = InMemoryLocks::default();

        let token = locks.try_acquire("exam", TTL).await.expect("acquire").expect("token");
        assert!(locks.release(&token).await.expect("release"));

        assert!(locks.try_acquire("exam", TTL).await.expect("acquire").is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let locks = InMemoryLocks::default();

        let stale = locks
            .try_acquire("exam", Duration::from_millis(10))
            .await
            .expect("acquire")
            .expect("token");
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = locks.try_acquire("exam", TTL).await.expect("acquire");
        assert!(fresh.is_some());
        assert!(!locks.release(&stale).await.expect("release"), "stale token must not unlock");
        assert!(locks.try_acquire("exam", TTL).await.expect("acquire").is_none());
    }

    #[tokio::test]
    async fn different_exams_do_not_contend() {
        let locks = InMemoryLocks::default();

        let a = locks.try_acquire(&finalize_lock_key("a"), TTL).await.expect("acquire");
        let b = locks.try_acquire(&finalize_lock_key("b"), TTL).await.expect("acquire");

        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn concurrent_runs_for_same_key_execute_once() {
        let locks = Arc::new(InMemoryLocks::default());
        let key = finalize_lock_key("exam-1");
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (finish_tx, finish_rx) = oneshot::channel::<()>();

        let holder = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                run_exclusive(locks.as_ref(), &key, TTL, async move {
                    let _ = started_tx.send(());
                    let _ = finish_rx.await;
                    "ranked"
                })
                .await
            })
        };

        started_rx.await.expect("holder started");
        let duplicate = run_exclusive(locks.as_ref(), &key, TTL, async { "ranked twice" })
            .await
            .expect("duplicate run");
        assert_eq!(duplicate, Exclusive::Contended);

        finish_tx.send(()).expect("finish holder");
        let first = holder.await.expect("join").expect("holder run");
        assert_eq!(first, Exclusive::Ran("ranked"));

        let later = run_exclusive(locks.as_ref(), &key, TTL, async { 7 }).await.expect("later run");
        assert_eq!(later, Exclusive::Ran(7));
    }
}
