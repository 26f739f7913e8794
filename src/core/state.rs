use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::finalize_schedule::FinalizeScheduler;
use crate::services::locks::LockService;
use crate::tasks::finalize::PgFinalizeQueue;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    locks: Arc<dyn LockService>,
    scheduler: Arc<dyn FinalizeScheduler>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, redis: RedisHandle) -> Self {
        let locks: Arc<dyn LockService> = Arc::new(redis.clone());
        let scheduler: Arc<dyn FinalizeScheduler> = Arc::new(PgFinalizeQueue);
        Self::with_collaborators(settings, db, redis, locks, scheduler)
    }

    pub(crate) fn with_collaborators(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        locks: Arc<dyn LockService>,
        scheduler: Arc<dyn FinalizeScheduler>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, locks, scheduler }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn locks(&self) -> &dyn LockService {
        self.inner.locks.as_ref()
    }

    pub(crate) fn scheduler(&self) -> &dyn FinalizeScheduler {
        self.inner.scheduler.as_ref()
    }
}
