//! 질의 빌더 — 레코드와 패싯 선택자를 SQL 술어로 변환
//!
//! 저장된 취약점 묶음에 대한 "봉투 포함" 질의를 `json_extract` 등치
//! 비교로 실현합니다. 패키지 이름 술어는 항상 적용되며, 레코드에
//! 소스 패키지 이름이 있으면 OR로 함께 매칭합니다. 선택된 패싯은
//! 첫 등장 순서를 보존하며 중복이 제거되고, 인식 불가 패싯은
//! 질의를 보내기 전에 하드 에러로 거부됩니다.

use vulnpost_core::error::StoreError;
use vulnpost_core::types::{IndexRecord, MatchFacet};

/// 레코드 하나에 대한 질의문과 바인드 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordQuery {
    /// 플레이스홀더가 포함된 SELECT 문
    pub sql: String,
    /// 플레이스홀더 순서대로의 바인드 값
    pub binds: Vec<String>,
}

/// 레코드와 선택자 패싯으로 질의를 구성합니다.
///
/// [`MatchFacet::Unknown`]이 섞여 있으면 [`StoreError::UnknownMatcher`]를
/// 반환합니다. 호출자는 어떤 질의도 실행하기 전에 전체 배치를
/// 먼저 구성해야 합니다.
pub(crate) fn build_record_query(
    record: &IndexRecord,
    facets: &[MatchFacet],
) -> Result<RecordQuery, StoreError> {
    let mut clauses = Vec::with_capacity(facets.len() + 1);
    let mut binds = Vec::with_capacity(facets.len() + 2);

    // 항상 적용되는 패키지 이름 술어. 소스 패키지가 있으면
    // 소스 이름으로 매칭되는 취약점도 함께 반환합니다.
    let source_name = record.package.source_name();
    if source_name.is_empty() {
        clauses.push("(json_extract(vulnerability, '$.package.name') = ?)".to_owned());
        binds.push(record.package.name.clone());
    } else {
        clauses.push(
            "(json_extract(vulnerability, '$.package.name') = ? \
             OR json_extract(vulnerability, '$.package.name') = ?)"
                .to_owned(),
        );
        binds.push(record.package.name.clone());
        binds.push(source_name.to_owned());
    }

    // 중복 제거 (첫 등장 순서 보존)
    let mut seen: Vec<&MatchFacet> = Vec::new();
    for facet in facets {
        if seen.contains(&facet) {
            continue;
        }
        seen.push(facet);

        let dist = &record.distribution;
        let (path, value) = match facet {
            MatchFacet::DistDid => ("$.dist.did", &dist.did),
            MatchFacet::DistName => ("$.dist.name", &dist.name),
            MatchFacet::DistVersion => ("$.dist.version", &dist.version),
            MatchFacet::DistVersionId => ("$.dist.version_id", &dist.version_id),
            MatchFacet::DistVersionCodeName => {
                ("$.dist.version_code_name", &dist.version_code_name)
            }
            MatchFacet::DistArch => ("$.dist.arch", &dist.arch),
            MatchFacet::DistCpe => ("$.dist.cpe", &dist.cpe),
            MatchFacet::DistPrettyName => ("$.dist.pretty_name", &dist.pretty_name),
            MatchFacet::Unknown(name) => {
                return Err(StoreError::UnknownMatcher {
                    facet: name.clone(),
                });
            }
        };
        clauses.push(format!("json_extract(vulnerability, '{path}') = ?"));
        binds.push(value.clone());
    }

    Ok(RecordQuery {
        sql: format!(
            "SELECT id, vulnerability FROM vuln WHERE {}",
            clauses.join(" AND ")
        ),
        binds,
    })
}
