//! 업데이트 매니저 — 주기 실행, 워커 제한 배치, 분산 락 조율
//!
//! [`Manager`]는 팩토리에서 업데이터를 조립하고, `workers` 크기의
//! 청크로 동시 실행하며, 업데이터마다 분산 락을 잡아 여러 레플리카가
//! 같은 작업을 중복 수행하지 않도록 합니다.
//!
//! # 실행 흐름
//! ```text
//! ticker -> run -> [updater 조립/재설정]
//!                  -> 청크 단위 동시 실행 (청크 간 배리어)
//!                     -> try_lock -> fetch -> parse -> store 인제스트 -> unlock
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use vulnpost_core::driver::{DynUpdater, DynUpdaterSetFactory, StaticSetFactory, UpdaterSet, VulnStore};
use vulnpost_core::error::{ConfigError, UpdateError, UpdaterError, VulnpostError};
use vulnpost_core::lock::DistLock;
use vulnpost_core::types::Fingerprint;

use crate::registry::{Configs, Registry, configure_factories};

/// out-of-tree 업데이터가 편입되는 예약 팩토리 키
pub const OUT_OF_TREE_KEY: &str = "out-of-tree";

/// 기본 동시 업데이트 워커 수
const DEFAULT_WORKERS: usize = 10;

/// 업데이트 매니저
///
/// [`ManagerBuilder`]로 생성합니다. 저장소와 락 구현에 대해
/// 제네릭이므로 테스트에서는 mock 스토어와 passthrough 락을
/// 그대로 끼워 넣을 수 있습니다.
impl<S, L> std::fmt::Debug for Manager<S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("workers", &self.workers)
            .field("interval", &self.interval)
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct Manager<S, L> {
    /// 취약점 스토어
    store: Arc<S>,
    /// 클러스터 전역 분산 락
    lock: Arc<L>,
    /// 계열 이름 → 팩토리 (필터링/설정 완료 상태)
    factories: BTreeMap<String, Box<dyn DynUpdaterSetFactory>>,
    /// 청크 하나에서 동시에 실행할 업데이터 수
    workers: usize,
    /// 주기 실행 간격 (0이면 `run` 수동 호출 전용)
    interval: Duration,
    /// 업데이터 이름으로 키잉된 설정 blob
    configs: Configs,
    /// 모든 업데이터가 공유하는 HTTP 클라이언트
    client: reqwest::Client,
}

impl<S, L> Manager<S, L>
where
    S: VulnStore + 'static,
    L: DistLock + 'static,
{
    /// 주기마다 `run`을 호출하는 루프를 실행합니다.
    ///
    /// 자체 태스크에서 실행되도록 설계되었으며, 취소 토큰이 발화하면
    /// [`UpdateError::Cancelled`]로 종료합니다. 개별 실행의 실패는
    /// 로그로만 남기고 루프를 계속합니다.
    pub async fn start(&self, token: &CancellationToken) -> Result<(), VulnpostError> {
        if self.interval.is_zero() {
            return Err(UpdateError::NoInterval.into());
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval의 첫 tick은 즉시 발화하므로 소비하고 시작합니다
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("update manager shutting down");
                    return Err(UpdateError::Cancelled.into());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run(token).await {
                        tracing::error!(error = %e, "update run failed");
                    }
                }
            }
        }
    }

    /// 한 번의 업데이트 패스를 수행합니다.
    ///
    /// 팩토리에서 업데이터 목록을 새로 조립하고, 설정 blob이 있는
    /// 업데이터를 재설정한 뒤, `workers` 크기의 청크로 나누어
    /// 동시에 구동합니다. 다음 청크는 현재 청크가 모두 끝난 뒤에
    /// 시작됩니다. 업데이터별 실패는 수집되어 마지막에 집계 에러로
    /// 반환되지만 다른 업데이터의 실행을 막지 않습니다.
    pub async fn run(&self, token: &CancellationToken) -> Result<(), VulnpostError> {
        // 업데이터 조립. 목록은 매 실행마다 새로 만들어집니다.
        let mut updaters: Vec<Arc<dyn DynUpdater>> = Vec::new();
        for (name, factory) in &self.factories {
            let set = factory.updater_set().await.map_err(|e| {
                tracing::error!(factory = %name, error = %e, "factory failed to produce updater set");
                VulnpostError::from(e)
            })?;
            updaters.extend(set.into_updaters());
        }

        // 설정 blob이 있는 업데이터 재설정. 실패는 건너뛰며 치명적이지 않습니다.
        for updater in &updaters {
            let Some(configurable) = updater.configurable() else {
                continue;
            };
            if let Some(config) = self.configs.get(updater.name()) {
                if let Err(e) = configurable.configure(config, &self.client).await {
                    tracing::warn!(
                        updater = updater.name(),
                        error = %e,
                        "failed to reconfigure updater, skipping"
                    );
                }
            }
        }

        tracing::debug!(updaters = updaters.len(), "batching running updaters");

        let (err_tx, mut err_rx) = mpsc::channel::<String>(updaters.len() + 1);

        let mut remaining = updaters;
        while !remaining.is_empty() {
            if token.is_cancelled() {
                let _ = err_tx.try_send(UpdateError::Cancelled.to_string());
                break;
            }

            let take = self.workers.min(remaining.len());
            let chunk: Vec<Arc<dyn DynUpdater>> = remaining.drain(..take).collect();

            let mut tasks = JoinSet::new();
            for updater in chunk {
                let store = Arc::clone(&self.store);
                let lock = Arc::clone(&self.lock);
                let token = token.clone();
                let err_tx = err_tx.clone();

                tasks.spawn(async move {
                    let name = updater.name().to_owned();

                    let guard = match lock.try_lock(&name).await {
                        Ok(Some(guard)) => guard,
                        Ok(None) => {
                            // 다른 레플리카가 이번 주기의 이 업데이터를 담당합니다
                            tracing::debug!(updater = %name, "lock held elsewhere, yielding");
                            return;
                        }
                        Err(e) => {
                            let _ = err_tx.try_send(format!("{name}: {e}"));
                            return;
                        }
                    };

                    tracing::debug!(updater = %name, "driving update");
                    let result = tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!(updater = %name, "update cancelled mid-drive");
                            Ok(())
                        }
                        result = drive_updater(store.as_ref(), updater.as_ref()) => result,
                    };
                    tracing::debug!(updater = %name, "finished driving update");

                    if let Err(e) = result {
                        let _ = err_tx.try_send(format!("{name}: {e}"));
                    }
                    if let Err(e) = guard.unlock().await {
                        tracing::warn!(updater = %name, error = %e, "failed to release updater lock");
                    }
                });
            }

            // 청크 배리어: 전부 끝나야 다음 청크가 시작됩니다
            while tasks.join_next().await.is_some() {}
        }

        drop(err_tx);
        let mut errors = Vec::new();
        while let Some(error) = err_rx.recv().await {
            errors.push(error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(UpdateError::Failed { errors }.into())
        }
    }

    /// 설정된 워커 수를 반환합니다.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 설정된 실행 간격을 반환합니다.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 현재 팩토리 맵의 계열 이름을 이름 순으로 반환합니다.
    pub fn factory_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

/// 업데이터 하나를 fetch → parse → 인제스트로 구동합니다.
async fn drive_updater<S: VulnStore>(
    store: &S,
    updater: &dyn DynUpdater,
) -> Result<(), VulnpostError> {
    let name = updater.name();

    // 직전 연산의 핑거프린트 복구 (이력이 없으면 빈 값)
    let operations = store.get_update_operations(name).await?;
    let previous = operations
        .get(name)
        .and_then(|history| history.first())
        .map(|op| op.fingerprint.clone())
        .unwrap_or_else(Fingerprint::default);

    // 페이로드는 이 함수가 소유하며 모든 종료 경로에서 drop으로 해제됩니다
    let (payload, fingerprint) = match updater.fetch(&previous).await {
        Ok(fetched) => fetched,
        Err(UpdaterError::Unchanged) => {
            tracing::info!(updater = %name, "vulnerability database unchanged");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let vulnerabilities = updater.parse(payload).await?;

    store
        .update_vulnerabilities(name, fingerprint, vulnerabilities)
        .await?;

    Ok(())
}

// ─── ManagerBuilder ──────────────────────────────────────────────────

/// [`Manager`] 빌더
///
/// 레지스트리 필터링, 팩토리 설정, out-of-tree 업데이터 편입은
/// `build`에서 수행됩니다.
pub struct ManagerBuilder<S, L> {
    store: Option<Arc<S>>,
    lock: Option<Arc<L>>,
    registry: Registry,
    workers: usize,
    interval: Duration,
    enabled: Option<Vec<String>>,
    configs: Configs,
    client: Option<reqwest::Client>,
    out_of_tree: Vec<Arc<dyn DynUpdater>>,
}

impl<S, L> ManagerBuilder<S, L>
where
    S: VulnStore + 'static,
    L: DistLock + 'static,
{
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            store: None,
            lock: None,
            registry: Registry::new(),
            workers: DEFAULT_WORKERS,
            interval: Duration::ZERO,
            enabled: None,
            configs: Configs::new(),
            client: None,
            out_of_tree: Vec::new(),
        }
    }

    /// 취약점 스토어를 지정합니다. (필수)
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 분산 락을 지정합니다. (필수)
    pub fn lock(mut self, lock: Arc<L>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// 팩토리 레지스트리를 지정합니다.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// 동시 워커 수를 지정합니다. 0이면 기본값(10)을 사용합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// 주기 실행 간격을 지정합니다. 0이면 `run` 수동 호출 전용입니다.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 활성화할 계열 이름을 지정합니다.
    ///
    /// `None`이면 모든 팩토리를 유지하고, 빈 목록이면 전부 제외합니다.
    pub fn enabled(mut self, enabled: Option<Vec<String>>) -> Self {
        self.enabled = enabled;
        self
    }

    /// 업데이터 설정 blob 맵을 지정합니다.
    pub fn configs(mut self, configs: Configs) -> Self {
        self.configs = configs;
        self
    }

    /// 공유 HTTP 클라이언트를 지정합니다. 생략하면 기본 클라이언트를 만듭니다.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// 레지스트리 밖에서 만들어진 업데이터를 편입합니다.
    ///
    /// [`OUT_OF_TREE_KEY`] 예약 키 아래의 정적 팩토리로 추가됩니다.
    pub fn out_of_tree(mut self, updaters: Vec<Arc<dyn DynUpdater>>) -> Self {
        self.out_of_tree = updaters;
        self
    }

    /// 매니저를 조립합니다.
    ///
    /// 활성화 목록으로 팩토리를 필터링하고, 팩토리 설정을 적용하며,
    /// out-of-tree 업데이터를 예약 키로 편입합니다. 팩토리 설정
    /// 실패는 치명적입니다.
    pub async fn build(self) -> Result<Manager<S, L>, VulnpostError> {
        let store = self.store.ok_or_else(|| ConfigError::InvalidValue {
            field: "store".to_owned(),
            reason: "manager requires a vulnerability store".to_owned(),
        })?;
        let lock = self.lock.ok_or_else(|| ConfigError::InvalidValue {
            field: "lock".to_owned(),
            reason: "manager requires a distributed lock".to_owned(),
        })?;
        let client = self.client.unwrap_or_default();

        // 활성화 목록에 없는 팩토리를 제거합니다.
        // None은 전체 유지, 빈 목록은 전체 제외를 뜻합니다.
        let mut registry = self.registry;
        if let Some(enabled) = &self.enabled {
            let mut filtered = Registry::new();
            for (name, factory) in registry.into_factories() {
                if enabled.iter().any(|wanted| wanted == &name) {
                    // 원본 레지스트리에서 왔으므로 중복일 수 없습니다
                    let _ = filtered.register(name, factory);
                }
            }
            registry = filtered;
        }

        configure_factories(&registry, &self.configs, &client).await?;

        let mut factories = registry.into_factories();

        if !self.out_of_tree.is_empty() {
            let mut set = UpdaterSet::new();
            for updater in self.out_of_tree {
                if let Err(e) = set.add(updater) {
                    tracing::warn!(error = %e, "duplicate updater, skipping");
                }
            }
            factories.insert(
                OUT_OF_TREE_KEY.to_owned(),
                Box::new(StaticSetFactory::new(set)),
            );
        }

        let workers = if self.workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.workers
        };

        Ok(Manager {
            store,
            lock,
            factories,
            workers,
            interval: self.interval,
            configs: self.configs,
            client,
        })
    }
}

impl<S, L> Default for ManagerBuilder<S, L>
where
    S: VulnStore + 'static,
    L: DistLock + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
