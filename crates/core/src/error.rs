//! 에러 타입 — 도메인별 에러 정의

/// Vulnpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum VulnpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 업데이터 에러
    #[error("updater error: {0}")]
    Updater(#[from] UpdaterError),

    /// 분산 락 에러
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// 업데이트 매니저 에러
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound {
        /// 설정 파일 경로
        path: String,
    },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed {
        /// 파싱 실패 사유
        reason: String,
    },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 데이터베이스 연결 문자열 누락
    #[error("no connection string provided")]
    MissingConnString,
}

/// 스토어 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 질의 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 취약점 직렬화/역직렬화 실패
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// 질의 배치 타임아웃
    #[error("query batch timed out after {secs}s")]
    Timeout {
        /// 타임아웃 (초)
        secs: u64,
    },

    /// 인식 불가 매처 패싯 — 질의 전 호출자 에러로 거부됩니다
    #[error("unknown matcher: {facet}")]
    UnknownMatcher {
        /// 거부된 패싯 문자열
        facet: String,
    },
}

/// 업데이터 에러
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// 업스트림 데이터베이스 미변경 센티널
    ///
    /// fetch가 이전 핑거프린트와 동일한 상태를 확인했음을 의미합니다.
    /// 드라이브 루프에서만 인식되어 no-op 성공으로 변환됩니다.
    #[error("vulnerability database unchanged")]
    Unchanged,

    /// 업스트림 페치 실패
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// 페이로드 파싱 실패
    #[error("failed to parse the fetched vulnerability database: {0}")]
    Parse(String),

    /// 업데이터/팩토리 설정 실패
    #[error("configuration failed: {0}")]
    Configure(String),

    /// 중복 업데이터 이름 — 세트 삽입 시 거부됩니다
    #[error("duplicate updater: {name}")]
    Duplicate {
        /// 중복된 업데이터 이름
        name: String,
    },

    /// 중복 팩토리 이름 — 레지스트리 등록 시 거부됩니다
    #[error("duplicate updater set factory: {name}")]
    DuplicateFactory {
        /// 중복된 팩토리 이름
        name: String,
    },
}

/// 분산 락 에러
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// 락 백엔드 실패
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// 업데이트 매니저 에러
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// 주기 미설정 상태에서 start 호출
    #[error("manager must be configured with an interval")]
    NoInterval,

    /// 실행 취소됨
    #[error("update run cancelled")]
    Cancelled,

    /// 실행 중 수집된 업데이터별 실패 집계
    #[error("updating errors:\n{}", .errors.join("\n"))]
    Failed {
        /// `"<업데이터 이름>: <에러>"` 형식의 실패 목록
        errors: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "workers".to_owned(),
            reason: "must be positive".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("workers"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn missing_conn_string_display() {
        assert_eq!(
            ConfigError::MissingConnString.to_string(),
            "no connection string provided"
        );
    }

    #[test]
    fn unknown_matcher_display() {
        let err = StoreError::UnknownMatcher {
            facet: "dist.bogus".to_owned(),
        };
        assert_eq!(err.to_string(), "unknown matcher: dist.bogus");
    }

    #[test]
    fn unchanged_sentinel_display() {
        assert_eq!(
            UpdaterError::Unchanged.to_string(),
            "vulnerability database unchanged"
        );
    }

    #[test]
    fn duplicate_updater_display() {
        let err = UpdaterError::Duplicate {
            name: "alpine".to_owned(),
        };
        assert!(err.to_string().contains("alpine"));
    }

    #[test]
    fn update_failed_aggregate_display() {
        let err = UpdateError::Failed {
            errors: vec![
                "alpine: fetch failed: 503".to_owned(),
                "debian: parse failed".to_owned(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("updating errors:"));
        assert!(msg.contains("alpine: fetch failed: 503"));
        assert!(msg.contains("debian: parse failed"));
    }

    #[test]
    fn no_interval_display() {
        assert_eq!(
            UpdateError::NoInterval.to_string(),
            "manager must be configured with an interval"
        );
    }

    #[test]
    fn errors_convert_to_vulnpost_error() {
        let err: VulnpostError = StoreError::Query("boom".to_owned()).into();
        assert!(matches!(err, VulnpostError::Store(_)));
        assert!(err.to_string().contains("boom"));

        let err: VulnpostError = UpdateError::Cancelled.into();
        assert!(matches!(err, VulnpostError::Update(_)));

        let err: VulnpostError = LockError::Backend("down".to_owned()).into();
        assert!(matches!(err, VulnpostError::Lock(_)));
    }
}
