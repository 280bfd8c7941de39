//! 분산 락 — 클러스터 전역의 키 기반 상호 배제
//!
//! [`DistLock`]은 같은 업데이터를 여러 레플리카가 동시에 구동하지
//! 않도록 보장하는 advisory 락의 계약입니다. 비재진입식이며,
//! 같은 키에 대한 두 번째 획득은 첫 번째가 해제될 때까지 직렬화됩니다.
//!
//! 획득 결과는 [`LockGuard`]로 반환되어 모든 종료 경로에서 해제가
//! 보장됩니다. 블로킹 `lock`의 취소는 future를 drop하는 것으로
//! 이루어지며, 취소된 시도는 에러로 보고되지 않습니다.

use std::future::Future;

use crate::driver::BoxFuture;
use crate::error::LockError;

/// 락 해제 동작
type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), LockError>> + Send>;

/// 클러스터 전역 advisory 락 trait
///
/// 구현은 관계형 advisory 락, 리스 기반 key-value 엔트리 등 어떤
/// 메커니즘이든 사용할 수 있지만, 두 프로세스가 동시에 같은 키를
/// 보유했다고 믿는 일은 없어야 합니다.
pub trait DistLock: Send + Sync {
    /// 키에 대한 락을 획득할 때까지 대기합니다.
    ///
    /// 취소하려면 반환된 future를 drop하십시오. 획득 시도는 즉시
    /// 중단되며 에러는 보고되지 않습니다.
    fn lock(&self, key: &str) -> impl Future<Output = Result<LockGuard, LockError>> + Send;

    /// 락 획득을 시도하고 즉시 반환합니다.
    ///
    /// 획득했으면 `Some(guard)`, 다른 보유자가 있으면 `None`입니다.
    /// `None`은 에러가 아니라 보유자에게 양보하라는 신호입니다.
    fn try_lock(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<LockGuard>, LockError>> + Send;
}

/// 획득된 락의 RAII 가드
///
/// [`LockGuard::unlock`]으로 명시적으로 해제하는 것이 정상 경로입니다.
/// 해제 없이 drop되면 백그라운드 태스크로 해제를 예약하므로,
/// 에러·패닉·취소 경로에서도 락이 남지 않습니다.
pub struct LockGuard {
    key: String,
    release: Option<ReleaseFn>,
}

impl LockGuard {
    /// 해제 동작을 가진 가드를 생성합니다.
    pub fn new(
        key: impl Into<String>,
        release: impl FnOnce() -> BoxFuture<'static, Result<(), LockError>> + Send + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            release: Some(Box::new(release)),
        }
    }

    /// 해제 동작이 없는 가드를 생성합니다. (passthrough 구현용)
    pub fn noop(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            release: None,
        }
    }

    /// 가드가 보호하는 키를 반환합니다.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 락을 명시적으로 해제합니다.
    pub async fn unlock(mut self) -> Result<(), LockError> {
        match self.release.take() {
            Some(release) => release().await,
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            // unlock 없이 drop된 가드는 백그라운드에서 해제합니다.
            // 런타임 밖이라면 리스 만료가 최종 안전망입니다.
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let key = std::mem::take(&mut self.key);
                    handle.spawn(async move {
                        if let Err(e) = release().await {
                            tracing::warn!(key = %key, error = %e, "failed to release dropped lock");
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(key = %self.key, "lock guard dropped outside a runtime");
                }
            }
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// 항상 성공하는 passthrough 락
///
/// 단일 프로세스 배포와 테스트를 위한 구현입니다. 상호 배제를
/// 제공하지 않으므로 레플리카가 하나임이 보장될 때만 사용하십시오.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

impl NoopLock {
    /// 새 passthrough 락을 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl DistLock for NoopLock {
    async fn lock(&self, key: &str) -> Result<LockGuard, LockError> {
        Ok(LockGuard::noop(key))
    }

    async fn try_lock(&self, key: &str) -> Result<Option<LockGuard>, LockError> {
        Ok(Some(LockGuard::noop(key)))
    }
}
