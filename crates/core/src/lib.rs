#![doc = include_str!("../README.md")]

pub mod config;
pub mod driver;
pub mod error;
pub mod lock;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    ConfigError, LockError, StoreError, UpdateError, UpdaterError, VulnpostError,
};

// 설정
pub use config::VulnpostConfig;

// 드라이버 trait
pub use driver::{
    BoxFuture, Configurable, DynUpdater, DynUpdaterSetFactory, Matcher, StaticSetFactory, Updater,
    UpdaterSet, UpdaterSetFactory, VulnStore,
};

// 분산 락
pub use lock::{DistLock, LockGuard, NoopLock};

// 도메인 타입
pub use types::{
    Distribution, Fingerprint, IndexRecord, MatchFacet, MatchSelector, Package, Repository,
    Severity, UpdateOperation, Vulnerability,
};
