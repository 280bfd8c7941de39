//! 도메인 타입 — 취약점 지식 베이스 전역에서 사용되는 공통 타입
//!
//! 업데이터가 생산하고 스토어가 보존하는 취약점 레코드와,
//! 질의 경로에서 사용되는 입력/선택자 타입을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// 업스트림 보안 데이터베이스가 보고한 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다
/// (`Unknown < Negligible < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 심각도 미상 (업스트림이 심각도를 제공하지 않음)
    #[default]
    Unknown,
    /// 무시 가능
    Negligible,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 알 수 없는 값은 `None`을 반환합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Some(Self::Unknown),
            "negligible" => Some(Self::Negligible),
            "low" => Some(Self::Low),
            "medium" | "moderate" | "med" => Some(Self::Medium),
            "high" | "important" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Negligible => write!(f, "Negligible"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 패키지 정보
///
/// 취약점의 영향 패키지 묶음과 질의 입력 레코드 양쪽에서 사용됩니다.
/// 질의 입력에서 `id`는 호출자가 부여한 불투명 식별자이며,
/// 스토어는 이를 해석하지 않고 결과 맵의 키로 그대로 되돌려줍니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// 호출자 부여 식별자 (질의 입력에서만 의미를 가짐)
    #[serde(default)]
    pub id: String,
    /// 패키지 이름
    #[serde(default)]
    pub name: String,
    /// 패키지 버전
    #[serde(default)]
    pub version: String,
    /// 패키지 종류 (예: "binary", "source")
    #[serde(default)]
    pub kind: String,
    /// 소스 패키지 (바이너리 패키지가 빌드된 원본)
    #[serde(default)]
    pub source: Option<Box<Package>>,
}

impl Package {
    /// 소스 패키지 이름을 반환합니다. 소스 패키지가 없으면 빈 문자열입니다.
    pub fn source_name(&self) -> &str {
        self.source.as_deref().map_or("", |s| s.name.as_str())
    }
}

/// 배포판 정보
///
/// 취약점이 적용되는 배포판을 기술하는 묶음입니다.
/// 모든 필드는 문자열이며, 알 수 없는 값은 빈 문자열로 표현합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// 배포판 식별자 (os-release의 ID, 예: "alpine", "debian")
    #[serde(default)]
    pub did: String,
    /// 배포판 이름
    #[serde(default)]
    pub name: String,
    /// 배포판 버전
    #[serde(default)]
    pub version: String,
    /// 배포판 버전 ID (os-release의 VERSION_ID)
    #[serde(default)]
    pub version_id: String,
    /// 배포판 버전 코드네임 (예: "buster")
    #[serde(default)]
    pub version_code_name: String,
    /// 아키텍처 (예: "x86_64")
    #[serde(default)]
    pub arch: String,
    /// CPE 식별자
    #[serde(default)]
    pub cpe: String,
    /// 표시용 이름 (os-release의 PRETTY_NAME)
    #[serde(default)]
    pub pretty_name: String,
}

/// 패키지 저장소 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// 저장소 이름
    #[serde(default)]
    pub name: String,
    /// 저장소 키
    #[serde(default)]
    pub key: String,
    /// 저장소 URI
    #[serde(default)]
    pub uri: String,
}

/// 취약점 레코드
///
/// 업데이터가 업스트림 보안 데이터베이스에서 파싱한 단일 취약점입니다.
/// `id`는 스토어가 영속화 시점에 부여하며, 한 번 부여된 id는
/// 톰스톤 세대가 바뀌어도 재사용되지 않습니다.
///
/// 영향 패키지/배포판/저장소 묶음은 없을 수 있으며(`None`),
/// 스토어는 영속화 시 이를 빈 값 구조체로 실체화합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// 스토어가 부여한 고유 id (영속화 전에는 0)
    #[serde(default, skip_serializing)]
    pub id: i64,
    /// 취약점 이름 (예: "CVE-2024-1234")
    #[serde(default)]
    pub name: String,
    /// 취약점 설명
    #[serde(default)]
    pub description: String,
    /// 참고 링크 (공백으로 구분된 URL 목록)
    #[serde(default)]
    pub links: String,
    /// 심각도
    #[serde(default)]
    pub severity: Severity,
    /// 영향 패키지
    #[serde(default)]
    pub package: Option<Package>,
    /// 영향 배포판
    #[serde(default)]
    pub dist: Option<Distribution>,
    /// 영향 저장소
    #[serde(default)]
    pub repo: Option<Repository>,
    /// 수정된 버전 (빈 문자열이면 미수정)
    #[serde(default)]
    pub fixed_in_version: String,
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let package = self.package.as_ref().map_or("", |p| p.name.as_str());
        write!(
            f,
            "{} [{}] {} (fixed: {})",
            self.name,
            self.severity,
            package,
            if self.fixed_in_version.is_empty() {
                "N/A"
            } else {
                &self.fixed_in_version
            },
        )
    }
}

/// 질의 입력 레코드
///
/// 스캔 대상에서 발견된 설치 패키지 하나를 기술합니다.
/// 인덱싱 파이프라인이 생산하며, 스토어 질의 경로가 소비합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// 발견된 패키지 (`package.id`는 결과 맵의 키로 되돌아갑니다)
    #[serde(default)]
    pub package: Package,
    /// 패키지가 발견된 배포판
    #[serde(default)]
    pub distribution: Distribution,
    /// 패키지가 발견된 저장소
    #[serde(default)]
    pub repository: Repository,
}

// ─── MatchFacet ──────────────────────────────────────────────────────

/// 매칭 패싯 — 질의를 좁히는 배포판 속성
///
/// 질의 경로는 선택된 패싯마다 레코드의 배포판 값과 저장된 취약점의
/// 배포판 묶음을 등치 비교합니다. 닫힌 열거형이며, 문자열에서 파싱된
/// 인식 불가 값은 [`MatchFacet::Unknown`]으로 보존되었다가 질의 경계에서
/// 하드 에러로 거부됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchFacet {
    /// 배포판 식별자 (`dist.did`)
    DistDid,
    /// 배포판 이름 (`dist.name`)
    DistName,
    /// 배포판 버전 (`dist.version`)
    DistVersion,
    /// 배포판 버전 ID (`dist.version_id`)
    DistVersionId,
    /// 배포판 버전 코드네임 (`dist.version_code_name`)
    DistVersionCodeName,
    /// 아키텍처 (`dist.arch`)
    DistArch,
    /// CPE 식별자 (`dist.cpe`)
    DistCpe,
    /// 표시용 이름 (`dist.pretty_name`)
    DistPrettyName,
    /// 인식 불가 패싯 — 역직렬화 시 보존되며 질의 경계에서 거부됩니다
    Unknown(String),
}

impl MatchFacet {
    /// 패싯의 정규 문자열 표현을 반환합니다.
    pub fn as_str(&self) -> &str {
        match self {
            Self::DistDid => "dist.did",
            Self::DistName => "dist.name",
            Self::DistVersion => "dist.version",
            Self::DistVersionId => "dist.version_id",
            Self::DistVersionCodeName => "dist.version_code_name",
            Self::DistArch => "dist.arch",
            Self::DistCpe => "dist.cpe",
            Self::DistPrettyName => "dist.pretty_name",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

impl From<String> for MatchFacet {
    fn from(s: String) -> Self {
        match s.as_str() {
            "dist.did" => Self::DistDid,
            "dist.name" => Self::DistName,
            "dist.version" => Self::DistVersion,
            "dist.version_id" => Self::DistVersionId,
            "dist.version_code_name" => Self::DistVersionCodeName,
            "dist.arch" => Self::DistArch,
            "dist.cpe" => Self::DistCpe,
            "dist.pretty_name" => Self::DistPrettyName,
            _ => Self::Unknown(s),
        }
    }
}

impl From<MatchFacet> for String {
    fn from(f: MatchFacet) -> Self {
        f.as_str().to_owned()
    }
}

impl fmt::Display for MatchFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 매칭 선택자
///
/// 외부 매처가 결정한 패싯 집합을 질의 경로로 전달합니다.
/// 패싯은 첫 등장 순서를 보존하며 질의 시 중복이 제거됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSelector {
    /// 적용할 패싯 목록
    pub facets: Vec<MatchFacet>,
}

impl MatchSelector {
    /// 주어진 패싯 목록으로 선택자를 생성합니다.
    pub fn new(facets: Vec<MatchFacet>) -> Self {
        Self { facets }
    }
}

// ─── Fingerprint ─────────────────────────────────────────────────────

/// 업데이터 핑거프린트
///
/// 업데이터가 업스트림 상태를 기술하기 위해 계산한 불투명 바이트입니다.
/// 스토어와 매니저는 내용을 해석하거나 정규화하지 않으며,
/// 변경 감지를 위한 등치 비교만 수행합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 새 핑거프린트를 생성합니다.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 핑거프린트 내용을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 핑거프린트가 비어 있는지 확인합니다. (이전 연산 기록 없음)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 업데이트 연산 기록
///
/// 업데이터 하나의 성공한 인제스트를 기술합니다.
/// `tombstone`은 해당 스냅샷 세대를 표시하는 UUID이며,
/// 현재 커서의 톰스톤과 다른 행은 가비지로 간주됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOperation {
    /// 연산을 수행한 업데이터 이름
    pub updater: String,
    /// 인제스트 시점의 핑거프린트
    pub fingerprint: Fingerprint,
    /// 스냅샷 세대 식별자
    pub tombstone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Unknown < Severity::Negligible);
        assert!(Severity::Negligible < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_default_is_unknown() {
        assert_eq!(Severity::default(), Severity::Unknown);
    }

    #[test]
    fn severity_from_str_loose() {
        assert_eq!(Severity::from_str_loose("low"), Some(Severity::Low));
        assert_eq!(
            Severity::from_str_loose("CRITICAL"),
            Some(Severity::Critical)
        );
        assert_eq!(
            Severity::from_str_loose("negligible"),
            Some(Severity::Negligible)
        );
        assert_eq!(Severity::from_str_loose("Important"), Some(Severity::High));
        assert_eq!(Severity::from_str_loose("moderate"), Some(Severity::Medium));
        assert_eq!(Severity::from_str_loose("bogus"), None);
    }

    #[test]
    fn package_source_name() {
        let mut pkg = Package {
            name: "openssl-libs".to_owned(),
            ..Default::default()
        };
        assert_eq!(pkg.source_name(), "");

        pkg.source = Some(Box::new(Package {
            name: "openssl".to_owned(),
            ..Default::default()
        }));
        assert_eq!(pkg.source_name(), "openssl");
    }

    #[test]
    fn vulnerability_display() {
        let vuln = Vulnerability {
            name: "CVE-2024-1234".to_owned(),
            severity: Severity::Critical,
            package: Some(Package {
                name: "openssl".to_owned(),
                ..Default::default()
            }),
            fixed_in_version: "1.1.1t".to_owned(),
            ..Default::default()
        };
        let display = vuln.to_string();
        assert!(display.contains("CVE-2024-1234"));
        assert!(display.contains("Critical"));
        assert!(display.contains("openssl"));
        assert!(display.contains("1.1.1t"));
    }

    #[test]
    fn vulnerability_display_no_fix() {
        let vuln = Vulnerability {
            name: "CVE-2024-5678".to_owned(),
            ..Default::default()
        };
        assert!(vuln.to_string().contains("N/A"));
    }

    #[test]
    fn vulnerability_serialization_omits_id() {
        let vuln = Vulnerability {
            id: 42,
            name: "CVE-2024-0001".to_owned(),
            ..Default::default()
        };
        let json = serde_json::to_string(&vuln).unwrap();
        assert!(!json.contains("\"id\""));

        // id는 역직렬화 시 기본값으로 복원됩니다
        let parsed: Vulnerability = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 0);
        assert_eq!(parsed.name, "CVE-2024-0001");
    }

    #[test]
    fn vulnerability_envelopes_deserialize_when_absent() {
        let parsed: Vulnerability = serde_json::from_str(r#"{"name": "CVE-2024-0001"}"#).unwrap();
        assert!(parsed.package.is_none());
        assert!(parsed.dist.is_none());
        assert!(parsed.repo.is_none());
    }

    #[test]
    fn match_facet_roundtrip() {
        let facets = [
            MatchFacet::DistDid,
            MatchFacet::DistName,
            MatchFacet::DistVersion,
            MatchFacet::DistVersionId,
            MatchFacet::DistVersionCodeName,
            MatchFacet::DistArch,
            MatchFacet::DistCpe,
            MatchFacet::DistPrettyName,
        ];
        for facet in facets {
            let parsed = MatchFacet::from(facet.as_str().to_owned());
            assert_eq!(parsed, facet);
        }
    }

    #[test]
    fn match_facet_unknown_is_preserved() {
        let facet = MatchFacet::from("dist.nonsense".to_owned());
        assert_eq!(facet, MatchFacet::Unknown("dist.nonsense".to_owned()));
        assert_eq!(facet.as_str(), "dist.nonsense");
    }

    #[test]
    fn match_facet_serde_uses_string_form() {
        let json = serde_json::to_string(&MatchFacet::DistVersionId).unwrap();
        assert_eq!(json, "\"dist.version_id\"");

        let parsed: MatchFacet = serde_json::from_str("\"dist.arch\"").unwrap();
        assert_eq!(parsed, MatchFacet::DistArch);

        let unknown: MatchFacet = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(unknown, MatchFacet::Unknown("whatever".to_owned()));
    }

    #[test]
    fn fingerprint_is_opaque() {
        // 내용이 정규화되지 않고 그대로 보존되어야 합니다
        let fp = Fingerprint::new("  ETag: \"AbC\"  ");
        assert_eq!(fp.as_str(), "  ETag: \"AbC\"  ");
        assert_ne!(fp, Fingerprint::new("etag: \"abc\""));
    }

    #[test]
    fn fingerprint_empty_default() {
        let fp = Fingerprint::default();
        assert!(fp.is_empty());
        assert!(!Fingerprint::new("f1").is_empty());
    }

    #[test]
    fn update_operation_serialize_roundtrip() {
        let op = UpdateOperation {
            updater: "alpine".to_owned(),
            fingerprint: Fingerprint::new("f1"),
            tombstone: "t1".to_owned(),
        };
        let json = serde_json::to_string(&op).unwrap();
        let parsed: UpdateOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }

    #[test]
    fn index_record_default_is_empty() {
        let record = IndexRecord::default();
        assert!(record.package.name.is_empty());
        assert!(record.distribution.did.is_empty());
        assert!(record.repository.uri.is_empty());
    }
}
