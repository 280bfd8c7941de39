//! 리스 락 — distlock 테이블을 이용한 클러스터 전역 상호 배제
//!
//! [`LeaseLock`]은 스토어와 같은 데이터베이스의 `distlock` 테이블에
//! 만료 시각이 달린 리스 행을 원자적으로 삽입/갱신하여 락을 실현합니다.
//! 보유자가 비정상 종료해도 리스가 만료되면 다른 레플리카가
//! 락을 회수할 수 있습니다.

use std::time::Duration;

use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use vulnpost_core::error::LockError;
use vulnpost_core::lock::{DistLock, LockGuard};

/// 기본 리스 유효 기간
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

/// 블로킹 획득의 재시도 간격
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 만료된 리스는 빼앗고, 유효한 리스는 건드리지 않는 원자적 획득문.
/// 행이 삽입되거나 갱신되면 획득 성공입니다.
const TRY_ACQUIRE: &str = "INSERT INTO distlock (key, holder, expires_at) VALUES (?, ?, ?) \
     ON CONFLICT(key) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at \
     WHERE distlock.expires_at < ?";

/// 해제는 보유자가 일치할 때만 수행됩니다. 만료 후 다른 보유자가
/// 리스를 가져갔다면 이 DELETE는 아무 행도 지우지 않습니다.
const RELEASE: &str = "DELETE FROM distlock WHERE key = ? AND holder = ?";

/// 리스 기반 분산 락
#[derive(Clone)]
pub struct LeaseLock {
    pool: SqlitePool,
    ttl: Duration,
}

impl LeaseLock {
    /// 기본 TTL(5분)의 리스 락을 생성합니다.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_ttl(pool, DEFAULT_LEASE_TTL)
    }

    /// 지정한 TTL의 리스 락을 생성합니다.
    pub fn with_ttl(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    fn guard(&self, key: &str, holder: String) -> LockGuard {
        let pool = self.pool.clone();
        let lease_key = key.to_owned();
        LockGuard::new(key, move || {
            Box::pin(async move {
                sqlx::query(RELEASE)
                    .bind(&lease_key)
                    .bind(&holder)
                    .execute(&pool)
                    .await
                    .map_err(|e| LockError::Backend(e.to_string()))?;
                Ok(())
            })
        })
    }
}

impl DistLock for LeaseLock {
    async fn lock(&self, key: &str) -> Result<LockGuard, LockError> {
        loop {
            if let Some(guard) = self.try_lock(key).await? {
                return Ok(guard);
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn try_lock(&self, key: &str) -> Result<Option<LockGuard>, LockError> {
        let holder = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now + self.ttl.as_millis() as i64;

        let result = sqlx::query(TRY_ACQUIRE)
            .bind(key)
            .bind(&holder)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            // 유효한 리스를 다른 보유자가 쥐고 있습니다
            return Ok(None);
        }
        Ok(Some(self.guard(key, holder)))
    }
}
