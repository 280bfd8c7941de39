//! 설정 관리 — vulnpost.toml 파싱 및 런타임 설정

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 기본 업데이트 주기 (30분)
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 1800;
/// 최소 업데이트 주기 (1분) — 이보다 짧으면 기본값으로 되돌립니다
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 60;
/// 최대 업데이트 주기 (1년)
pub const MAX_UPDATE_INTERVAL_SECS: u64 = 31_536_000;
/// 기본 동시 업데이트 워커 수
pub const DEFAULT_UPDATE_WORKERS: usize = 10;
/// 기본 데이터베이스 커넥션 풀 상한
pub const DEFAULT_MAX_POOL_SIZE: u32 = 50;

/// Vulnpost 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnpostConfig {
    /// 일반 설정
    pub general: GeneralConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 업데이트 매니저 설정
    pub updates: UpdatesConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 데이터베이스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 데이터베이스 연결 문자열 (필수)
    pub conn_string: String,
    /// 커넥션 풀 상한
    pub max_pool_size: u32,
    /// 시작 시 스키마 구성 수행 여부
    pub migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            conn_string: String::new(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            migrate: false,
        }
    }
}

/// 업데이트 매니저 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatesConfig {
    /// 업데이트 주기 (초)
    pub interval_secs: u64,
    /// 동시 업데이트 워커 수 (0이면 기본값 사용)
    pub workers: usize,
    /// 활성화할 업데이터 세트 이름 목록 (생략하면 전체 활성화)
    pub enabled_sets: Option<Vec<String>>,
    /// 백그라운드 주기 업데이트 비활성화
    pub disable_background: bool,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            workers: DEFAULT_UPDATE_WORKERS,
            enabled_sets: None,
            disable_background: false,
        }
    }
}

impl VulnpostConfig {
    /// TOML 설정 파일을 로드하고 환경 변수 오버라이드를 적용합니다.
    ///
    /// # 환경 변수
    ///
    /// - `VULNPOST_DB_CONN`: 데이터베이스 연결 문자열
    /// - `VULNPOST_LOG_LEVEL`: 로그 레벨
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::ParseFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// 환경 변수 오버라이드를 적용합니다.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(conn) = std::env::var("VULNPOST_DB_CONN") {
            self.database.conn_string = conn;
        }
        if let Ok(level) = std::env::var("VULNPOST_LOG_LEVEL") {
            self.general.log_level = level;
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `conn_string`: 비어있으면 안 됨
    /// - `max_pool_size`: 1 이상
    /// - `log_format`: "json" 또는 "pretty"
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.conn_string.is_empty() {
            return Err(ConfigError::MissingConnString);
        }

        if self.database.max_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.max_pool_size".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if self.updates.interval_secs > MAX_UPDATE_INTERVAL_SECS {
            return Err(ConfigError::InvalidValue {
                field: "updates.interval_secs".to_owned(),
                reason: format!("must be at most {MAX_UPDATE_INTERVAL_SECS}"),
            });
        }

        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "general.log_format".to_owned(),
                    reason: format!("unknown log format '{other}', expected 'json' or 'pretty'"),
                });
            }
        }

        Ok(())
    }

    /// 지터가 적용된 실효 업데이트 주기를 반환합니다.
    ///
    /// 1분 미만으로 설정된 주기는 기본값(30분)으로 되돌리고,
    /// 설치 전반의 부하 분산을 위해 ±60초 범위의 지터를
    /// 0.1초 단위로 반올림하여 더합니다.
    pub fn update_interval(&self) -> Duration {
        let base_secs = if self.updates.interval_secs < MIN_UPDATE_INTERVAL_SECS {
            DEFAULT_UPDATE_INTERVAL_SECS
        } else {
            self.updates.interval_secs
        };

        // 지터는 0.1초 단위 (±600 tenths = ±60초)
        let jitter_tenths: i64 = rand::thread_rng().gen_range(-600..=600);
        let ms = (base_secs as i64 * 1000 + jitter_tenths * 100).max(1000);
        Duration::from_millis(ms as u64)
    }

    /// 실효 워커 수를 반환합니다. 0이면 기본값을 사용합니다.
    pub fn effective_workers(&self) -> usize {
        if self.updates.workers == 0 {
            DEFAULT_UPDATE_WORKERS
        } else {
            self.updates.workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> VulnpostConfig {
        VulnpostConfig {
            database: DatabaseConfig {
                conn_string: "sqlite::memory:".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn default_config_has_documented_defaults() {
        let config = VulnpostConfig::default();
        assert_eq!(config.updates.interval_secs, 1800);
        assert_eq!(config.updates.workers, 10);
        assert_eq!(config.database.max_pool_size, 50);
        assert!(config.updates.enabled_sets.is_none());
        assert!(!config.updates.disable_background);
        assert!(!config.database.migrate);
    }

    #[test]
    fn validate_requires_conn_string() {
        let config = VulnpostConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingConnString));

        valid_config().validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let mut config = valid_config();
        config.database.max_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_interval() {
        let mut config = valid_config();
        config.updates.interval_secs = MAX_UPDATE_INTERVAL_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = valid_config();
        config.general.log_format = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn update_interval_clamps_short_intervals() {
        let mut config = valid_config();
        config.updates.interval_secs = 5;

        // 1분 미만은 기본값(30분) ± 60초 범위로 되돌아갑니다
        let interval = config.update_interval();
        assert!(interval >= Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS - 60));
        assert!(interval <= Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS + 60));
    }

    #[test]
    fn update_interval_jitter_stays_in_range() {
        let mut config = valid_config();
        config.updates.interval_secs = 600;

        for _ in 0..32 {
            let interval = config.update_interval();
            assert!(interval >= Duration::from_secs(540));
            assert!(interval <= Duration::from_secs(660));
            // 0.1초 단위 반올림
            assert_eq!(interval.as_millis() % 100, 0);
        }
    }

    #[test]
    fn effective_workers_defaults_on_zero() {
        let mut config = valid_config();
        config.updates.workers = 0;
        assert_eq!(config.effective_workers(), DEFAULT_UPDATE_WORKERS);

        config.updates.workers = 4;
        assert_eq!(config.effective_workers(), 4);
    }

    #[tokio::test]
    async fn load_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vulnpost.toml");
        tokio::fs::write(
            &path,
            r#"
[general]
log_level = "debug"

[database]
conn_string = "sqlite:/var/lib/vulnpost/vulnpost.db?mode=rwc"
max_pool_size = 8

[updates]
interval_secs = 3600
workers = 4
enabled_sets = ["alpine", "debian"]
"#,
        )
        .await
        .unwrap();

        let config = VulnpostConfig::load(&path).await.unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.database.max_pool_size, 8);
        assert_eq!(config.updates.interval_secs, 3600);
        assert_eq!(
            config.updates.enabled_sets,
            Some(vec!["alpine".to_owned(), "debian".to_owned()])
        );
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let err = VulnpostConfig::load(Path::new("/nonexistent/vulnpost.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_invalid_toml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vulnpost.toml");
        tokio::fs::write(&path, "not [valid toml").await.unwrap();

        let err = VulnpostConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }
}
