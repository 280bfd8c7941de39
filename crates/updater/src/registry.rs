//! 팩토리 레지스트리 — 업데이터 계열 이름과 팩토리의 명시적 맵
//!
//! 레지스트리는 전역 상태가 아니라 호출자가 시작 시점에 채워
//! 매니저 생성자에 넘기는 값입니다. 이터레이션 순서는 이름 순으로
//! 결정적입니다.

use std::collections::{BTreeMap, HashMap};

use vulnpost_core::driver::DynUpdaterSetFactory;
use vulnpost_core::error::UpdaterError;

/// 업데이터 이름으로 키잉된 설정 blob 맵
///
/// 팩토리와 업데이터의 `Configurable` capability에 전달됩니다.
pub type Configs = HashMap<String, serde_json::Value>;

/// 업데이터 팩토리 레지스트리
///
/// # 사용 예시
/// ```ignore
/// let mut registry = Registry::new();
/// registry.register("alpine", Box::new(alpine_factory))?;
/// registry.register("debian", Box::new(debian_factory))?;
///
/// let manager = ManagerBuilder::new()
///     .registry(registry)
///     /* ... */
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, Box<dyn DynUpdaterSetFactory>>,
}

impl Registry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 팩토리를 계열 이름으로 등록합니다.
    ///
    /// 동일한 이름이 이미 등록되어 있으면
    /// [`UpdaterError::DuplicateFactory`]를 반환합니다.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn DynUpdaterSetFactory>,
    ) -> Result<(), UpdaterError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(UpdaterError::DuplicateFactory { name });
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// 이름으로 팩토리가 등록되어 있는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 등록된 팩토리 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// 레지스트리가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 이름 순으로 팩토리를 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Box<dyn DynUpdaterSetFactory>)> {
        self.factories.iter()
    }

    /// 레지스트리를 소비하여 내부 맵을 반환합니다.
    pub fn into_factories(self) -> BTreeMap<String, Box<dyn DynUpdaterSetFactory>> {
        self.factories
    }
}

/// 레지스트리의 모든 팩토리에 설정을 적용합니다.
///
/// `Configurable` capability를 노출하는 팩토리는 자신의 이름으로
/// 키잉된 설정 blob을 받습니다. 팩토리 설정 실패는 치명적이며
/// 즉시 전파됩니다. capability가 없는 팩토리는 건드리지 않습니다.
pub async fn configure_factories(
    registry: &Registry,
    configs: &Configs,
    client: &reqwest::Client,
) -> Result<(), UpdaterError> {
    for (name, factory) in registry.iter() {
        let Some(configurable) = factory.configurable() else {
            continue;
        };
        if let Some(config) = configs.get(name) {
            configurable.configure(config, client).await?;
            tracing::debug!(factory = %name, "updater set factory configured");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use vulnpost_core::driver::{
        BoxFuture, Configurable, StaticSetFactory, UpdaterSet, UpdaterSetFactory,
    };

    /// Configurable capability를 노출하는 테스트용 팩토리
    struct ConfigurableFactory {
        configured: std::sync::Arc<AtomicBool>,
        fail: bool,
    }

    impl ConfigurableFactory {
        fn new(fail: bool) -> (Self, std::sync::Arc<AtomicBool>) {
            let configured = std::sync::Arc::new(AtomicBool::new(false));
            (
                Self {
                    configured: std::sync::Arc::clone(&configured),
                    fail,
                },
                configured,
            )
        }
    }

    impl UpdaterSetFactory for ConfigurableFactory {
        async fn updater_set(&self) -> Result<UpdaterSet, UpdaterError> {
            Ok(UpdaterSet::new())
        }

        fn configurable(&self) -> Option<&dyn Configurable> {
            Some(self)
        }
    }

    impl Configurable for ConfigurableFactory {
        fn configure<'a>(
            &'a self,
            _config: &'a serde_json::Value,
            _client: &'a reqwest::Client,
        ) -> BoxFuture<'a, Result<(), UpdaterError>> {
            Box::pin(async move {
                if self.fail {
                    return Err(UpdaterError::Configure("bad config".to_owned()));
                }
                self.configured.store(true, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        registry
            .register("alpine", Box::new(StaticSetFactory::new(UpdaterSet::new())))
            .unwrap();
        assert!(registry.contains("alpine"));
        assert!(!registry.contains("debian"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_duplicate_name_fails() {
        let mut registry = Registry::new();
        registry
            .register("dup", Box::new(StaticSetFactory::new(UpdaterSet::new())))
            .unwrap();

        let err = registry
            .register("dup", Box::new(StaticSetFactory::new(UpdaterSet::new())))
            .unwrap_err();
        assert!(matches!(err, UpdaterError::DuplicateFactory { ref name } if name == "dup"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn iteration_is_name_ordered() {
        let mut registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(name, Box::new(StaticSetFactory::new(UpdaterSet::new())))
                .unwrap();
        }
        let names: Vec<&str> = registry.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn configure_applies_keyed_blobs() {
        let (factory, configured) = ConfigurableFactory::new(false);
        let mut registry = Registry::new();
        registry.register("tunable", Box::new(factory)).unwrap();
        registry
            .register("plain", Box::new(StaticSetFactory::new(UpdaterSet::new())))
            .unwrap();

        let mut configs = Configs::new();
        configs.insert("tunable".to_owned(), serde_json::json!({"mirror": "https://example.invalid"}));

        let client = reqwest::Client::new();
        configure_factories(&registry, &configs, &client)
            .await
            .unwrap();
        assert!(configured.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn configure_failure_is_fatal() {
        let (factory, _) = ConfigurableFactory::new(true);
        let mut registry = Registry::new();
        registry.register("broken", Box::new(factory)).unwrap();

        let mut configs = Configs::new();
        configs.insert("broken".to_owned(), serde_json::json!({}));

        let client = reqwest::Client::new();
        let err = configure_factories(&registry, &configs, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Configure(_)));
    }

    #[tokio::test]
    async fn configure_skips_factories_without_blob() {
        let (factory, configured) = ConfigurableFactory::new(true);
        let mut registry = Registry::new();
        registry.register("broken", Box::new(factory)).unwrap();

        // blob이 없으면 실패하는 팩토리도 건드리지 않습니다
        let client = reqwest::Client::new();
        configure_factories(&registry, &Configs::new(), &client)
            .await
            .unwrap();
        assert!(!configured.load(Ordering::SeqCst));
    }
}
