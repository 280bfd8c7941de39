//! 드라이버 trait — 업데이터, 팩토리, 매처, 스토어 확장 포인트 정의
//!
//! [`Updater`] trait은 업스트림 보안 데이터베이스 하나를 담당하는
//! 플러그인 컴포넌트가 구현합니다. [`UpdaterSetFactory`]는 설정에 따라
//! 업데이터 묶음을 생산하고, [`VulnStore`]는 영속화 계층의 계약을,
//! [`Matcher`]는 질의 패싯 선택 계약을 정의합니다.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{StoreError, UpdaterError};
use crate::types::{
    Fingerprint, IndexRecord, MatchFacet, MatchSelector, UpdateOperation, Vulnerability,
};

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── Configurable ────────────────────────────────────────────────────

/// 런타임 재설정 capability
///
/// 업데이터와 팩토리가 선택적으로 구현합니다. 설정 blob은 업데이터
/// 이름으로 키잉된 JSON 값이며, 각 구현체가 스스로 역직렬화합니다.
/// 업데이터 인스턴스는 실행 간에 공유되므로 구현체는 내부 가변성으로
/// 상태를 갱신해야 합니다.
pub trait Configurable: Send + Sync {
    /// 설정 blob과 공유 HTTP 클라이언트를 적용합니다.
    fn configure<'a>(
        &'a self,
        config: &'a serde_json::Value,
        client: &'a reqwest::Client,
    ) -> BoxFuture<'a, Result<(), UpdaterError>>;
}

// ─── Updater ─────────────────────────────────────────────────────────

/// 업스트림 보안 데이터베이스 하나를 담당하는 업데이터 trait
///
/// 매니저가 주기마다 `fetch` → `parse` 순으로 구동하며, 결과는
/// 스토어의 스냅샷 교체 인제스트로 전달됩니다.
///
/// # 구현 예시
/// ```ignore
/// struct AlpineUpdater { /* ... */ }
///
/// impl Updater for AlpineUpdater {
///     fn name(&self) -> &str { "alpine-community-v3.20" }
///
///     async fn fetch(&self, prev: &Fingerprint) -> Result<(Bytes, Fingerprint), UpdaterError> {
///         // 업스트림 ETag가 prev와 같으면 Err(UpdaterError::Unchanged)
///         todo!()
///     }
///
///     async fn parse(&self, payload: Bytes) -> Result<Vec<Vulnerability>, UpdaterError> {
///         todo!()
///     }
/// }
/// ```
pub trait Updater: Send + Sync {
    /// 업데이터의 안정적인 고유 이름
    fn name(&self) -> &str;

    /// 업스트림에서 어드바이저리 페이로드를 가져옵니다.
    ///
    /// `prev`는 직전 성공 연산의 핑거프린트입니다 (최초 실행이면 빈 값).
    /// 업스트림이 변하지 않았으면 [`UpdaterError::Unchanged`]를 반환합니다.
    /// 반환된 페이로드의 소유권은 호출자에게 넘어가며, 모든 종료 경로에서
    /// drop으로 해제됩니다.
    fn fetch(
        &self,
        prev: &Fingerprint,
    ) -> impl Future<Output = Result<(Bytes, Fingerprint), UpdaterError>> + Send;

    /// 페이로드를 취약점 목록으로 파싱합니다.
    fn parse(
        &self,
        payload: Bytes,
    ) -> impl Future<Output = Result<Vec<Vulnerability>, UpdaterError>> + Send;

    /// 재설정 capability를 노출합니다. 기본은 미지원(`None`)입니다.
    fn configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

/// dyn-compatible 업데이터 trait
///
/// `Updater` trait은 RPITIT를 사용하므로 `dyn Updater`가 불가합니다.
/// `DynUpdater`는 `BoxFuture`를 반환하여 `Vec<Arc<dyn DynUpdater>>`로
/// 이질적인 업데이터를 동적 관리할 수 있게 합니다.
pub trait DynUpdater: Send + Sync {
    /// 업데이터의 안정적인 고유 이름
    fn name(&self) -> &str;

    /// 업스트림에서 어드바이저리 페이로드를 가져옵니다.
    fn fetch<'a>(
        &'a self,
        prev: &'a Fingerprint,
    ) -> BoxFuture<'a, Result<(Bytes, Fingerprint), UpdaterError>>;

    /// 페이로드를 취약점 목록으로 파싱합니다.
    fn parse(&self, payload: Bytes) -> BoxFuture<'_, Result<Vec<Vulnerability>, UpdaterError>>;

    /// 재설정 capability를 노출합니다.
    fn configurable(&self) -> Option<&dyn Configurable>;
}

/// Updater를 구현한 타입은 자동으로 DynUpdater도 구현됩니다.
impl<T: Updater> DynUpdater for T {
    fn name(&self) -> &str {
        Updater::name(self)
    }

    fn fetch<'a>(
        &'a self,
        prev: &'a Fingerprint,
    ) -> BoxFuture<'a, Result<(Bytes, Fingerprint), UpdaterError>> {
        Box::pin(Updater::fetch(self, prev))
    }

    fn parse(&self, payload: Bytes) -> BoxFuture<'_, Result<Vec<Vulnerability>, UpdaterError>> {
        Box::pin(Updater::parse(self, payload))
    }

    fn configurable(&self) -> Option<&dyn Configurable> {
        Updater::configurable(self)
    }
}

// ─── UpdaterSet ──────────────────────────────────────────────────────

/// 업데이터 세트 — 이름이 고유한 업데이터의 삽입 순서 보존 모음
///
/// 인스턴스는 `Arc`로 공유되며 매 실행마다 팩토리에서 다시 조회됩니다.
#[derive(Clone, Default)]
pub struct UpdaterSet {
    updaters: Vec<Arc<dyn DynUpdater>>,
}

impl UpdaterSet {
    /// 빈 세트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 업데이터를 세트에 추가합니다.
    ///
    /// 동일한 이름이 이미 존재하면 [`UpdaterError::Duplicate`]를 반환합니다.
    /// 호출자는 이를 경고로 기록하고 건너뛰는 것이 관례이며, 치명적
    /// 에러로 취급하지 않습니다.
    pub fn add(&mut self, updater: Arc<dyn DynUpdater>) -> Result<(), UpdaterError> {
        let name = updater.name();
        if self.updaters.iter().any(|u| u.name() == name) {
            return Err(UpdaterError::Duplicate {
                name: name.to_owned(),
            });
        }
        self.updaters.push(updater);
        Ok(())
    }

    /// 세트에 담긴 업데이터를 삽입 순서대로 반환합니다.
    pub fn updaters(&self) -> &[Arc<dyn DynUpdater>] {
        &self.updaters
    }

    /// 세트를 소비하여 업데이터 목록을 반환합니다.
    pub fn into_updaters(self) -> Vec<Arc<dyn DynUpdater>> {
        self.updaters
    }

    /// 세트에 담긴 업데이터 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.updaters.len()
    }

    /// 세트가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.updaters.is_empty()
    }
}

// ─── UpdaterSetFactory ───────────────────────────────────────────────

/// 업데이터 세트 팩토리 trait
///
/// 한 업데이터 계열(예: 배포판 하나)의 업데이터들을 요청 시점에
/// 생산합니다. 매니저는 매 실행마다 팩토리에 세트를 다시 요청하므로,
/// 팩토리는 업스트림 릴리스 목록 변화를 반영할 수 있습니다.
pub trait UpdaterSetFactory: Send + Sync {
    /// 현재 설정 아래의 업데이터 세트를 생산합니다.
    fn updater_set(&self) -> impl Future<Output = Result<UpdaterSet, UpdaterError>> + Send;

    /// 재설정 capability를 노출합니다. 기본은 미지원(`None`)입니다.
    fn configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

/// dyn-compatible 업데이터 세트 팩토리 trait
pub trait DynUpdaterSetFactory: Send + Sync {
    /// 현재 설정 아래의 업데이터 세트를 생산합니다.
    fn updater_set(&self) -> BoxFuture<'_, Result<UpdaterSet, UpdaterError>>;

    /// 재설정 capability를 노출합니다.
    fn configurable(&self) -> Option<&dyn Configurable>;
}

/// UpdaterSetFactory를 구현한 타입은 자동으로 DynUpdaterSetFactory도 구현됩니다.
impl<T: UpdaterSetFactory> DynUpdaterSetFactory for T {
    fn updater_set(&self) -> BoxFuture<'_, Result<UpdaterSet, UpdaterError>> {
        Box::pin(UpdaterSetFactory::updater_set(self))
    }

    fn configurable(&self) -> Option<&dyn Configurable> {
        UpdaterSetFactory::configurable(self)
    }
}

/// 사전 구성된 세트를 그대로 반환하는 정적 팩토리
///
/// 호출자가 직접 만든 out-of-tree 업데이터를 팩토리 맵에 편입할 때
/// 사용됩니다. 매 호출마다 동일한 공유 인스턴스들을 반환합니다.
pub struct StaticSetFactory {
    set: UpdaterSet,
}

impl StaticSetFactory {
    /// 주어진 세트를 감싸는 정적 팩토리를 생성합니다.
    pub fn new(set: UpdaterSet) -> Self {
        Self { set }
    }
}

impl UpdaterSetFactory for StaticSetFactory {
    async fn updater_set(&self) -> Result<UpdaterSet, UpdaterError> {
        Ok(self.set.clone())
    }
}

// ─── Matcher ─────────────────────────────────────────────────────────

/// 질의 패싯 선택 trait
///
/// 외부 매처 구현이 레코드마다 어떤 배포판 패싯을 매칭에 사용할지
/// 결정합니다. `query`의 출력이 스토어 질의의 선택자가 됩니다.
pub trait Matcher: Send + Sync {
    /// 매처 이름
    fn name(&self) -> &str;

    /// 이 매처가 해당 레코드를 담당하는지 확인합니다.
    fn filter(&self, record: &IndexRecord) -> bool;

    /// 레코드 매칭에 사용할 패싯 목록을 반환합니다.
    fn query(&self) -> Vec<MatchFacet>;

    /// 후보 취약점이 실제로 레코드에 적용되는지 최종 판정합니다.
    ///
    /// 스토어 질의가 돌려준 후보에 대해 버전 범위 비교 등
    /// 매처 고유의 정밀 검사를 수행합니다.
    fn vulnerable(&self, record: &IndexRecord, vulnerability: &Vulnerability) -> bool;
}

// ─── VulnStore ───────────────────────────────────────────────────────

/// 취약점 영속화 계층 trait
///
/// 매니저는 이 trait을 통해서만 저장소에 접근합니다.
pub trait VulnStore: Send + Sync {
    /// 업데이터의 전체 스냅샷을 교체합니다.
    ///
    /// 새 톰스톤 세대로 취약점을 기록하고 이전 세대를 원자적으로
    /// 회수합니다. 실패 시 이전 스냅샷과 커서는 그대로 유지됩니다.
    fn update_vulnerabilities(
        &self,
        updater: &str,
        fingerprint: Fingerprint,
        vulnerabilities: Vec<Vulnerability>,
    ) -> impl Future<Output = Result<UpdateOperation, StoreError>> + Send;

    /// 업데이터의 인제스트 이력을 최신순으로 반환합니다.
    fn get_update_operations(
        &self,
        updater: &str,
    ) -> impl Future<Output = Result<HashMap<String, Vec<UpdateOperation>>, StoreError>> + Send;

    /// 레코드 목록에 대한 취약점 매칭 질의를 수행합니다.
    ///
    /// 결과 맵의 키는 각 레코드의 `package.id`입니다. `package.name`이
    /// 빈 레코드는 질의 없이 건너뛰며 결과에 나타나지 않습니다.
    fn get(
        &self,
        records: &[IndexRecord],
        selector: &MatchSelector,
    ) -> impl Future<Output = Result<HashMap<String, Vec<Vulnerability>>, StoreError>> + Send;
}
