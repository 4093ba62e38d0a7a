//! Shared wiring for the pipeline integration tests

#![allow(dead_code)]

use smartsearch_core::application::{
    shutdown_channel, ConnectPolicy, ShutdownSender, StageConsumer, StageHandler,
};
use smartsearch_core::error::Result;
use smartsearch_core::port::broker::mocks::InMemoryBroker;
use smartsearch_core::port::SystemTimeProvider;
use smartsearch_infra_sqlite::{create_pool, run_migrations, SqliteProfileRepository};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(10);

pub fn fast_policy() -> ConnectPolicy {
    ConnectPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(5),
    }
}

/// In-memory SQLite store with the schema applied
pub async fn sqlite_store() -> (SqlitePool, Arc<SqliteProfileRepository>) {
    let pool = create_pool("sqlite::memory:", 1, 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteProfileRepository::new(
        pool.clone(),
        Arc::new(SystemTimeProvider),
    ));
    (pool, repo)
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A stage consumer running against the in-memory broker
pub struct RunningStage {
    shutdown: ShutdownSender,
    handle: JoinHandle<Result<()>>,
}

impl RunningStage {
    pub fn spawn<H: StageHandler>(handler: H, broker: &InMemoryBroker) -> Self {
        let (shutdown, token) = shutdown_channel();
        let consumer = StageConsumer::new(handler, Arc::new(broker.clone()), fast_policy())
            .with_cooldown(Duration::from_millis(20));
        let handle = tokio::spawn(async move { consumer.run(token).await });
        Self { shutdown, handle }
    }

    pub async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("stage did not stop in time")
            .expect("stage task panicked")
            .expect("stage returned an error");
    }
}
