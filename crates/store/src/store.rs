//! SQLite 스토어 — 톰스톤 세대 교체와 봉투 포함 질의
//!
//! [`SqliteStore`]는 [`VulnStore`] 계약의 SQLite 구현입니다.
//!
//! # 인제스트 규율
//!
//! 업데이터의 스냅샷 교체는 단일 트랜잭션 안에서 이루어집니다.
//! 새 행은 모두 새 톰스톤(UUID)을 달고 들어가고, 이전 톰스톤의 행은
//! 같은 트랜잭션에서 삭제되며, 마지막으로 커서 upsert와 이력 기록이
//! 이어집니다.
//! 어느 단계든 실패하면 트랜잭션이 롤백되어 이전 스냅샷과 커서가
//! 그대로 남습니다. 동시 질의는 이전 스냅샷 전체 또는 새 스냅샷
//! 전체만 관찰합니다.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use vulnpost_core::driver::VulnStore;
use vulnpost_core::error::StoreError;
use vulnpost_core::types::{
    Fingerprint, IndexRecord, MatchSelector, UpdateOperation, Vulnerability,
};

use crate::batch::Batcher;
use crate::query::build_record_query;

/// 스토어 스키마 (임베드)
const SCHEMA: &str = include_str!("schema.sql");

/// 질의 배치 전체에 적용되는 타임아웃
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

const SELECT_TOMBSTONE: &str = "SELECT tombstone FROM updatecursor WHERE updater = ?";
const SELECT_OPERATIONS: &str =
    "SELECT hash, tombstone FROM updateoperation WHERE updater = ? ORDER BY id DESC";
const INSERT_VULN_PREFIX: &str =
    "INSERT OR IGNORE INTO vuln (updater, vulnerability, tombstone) VALUES ";
const DELETE_TOMBSTONED: &str = "DELETE FROM vuln WHERE tombstone = ?";
const UPSERT_CURSOR: &str = "INSERT INTO updatecursor (updater, hash, tombstone) \
     VALUES (?, ?, ?) \
     ON CONFLICT(updater) DO UPDATE SET hash = excluded.hash, tombstone = excluded.tombstone";
const APPEND_OPERATION: &str =
    "INSERT INTO updateoperation (updater, hash, tombstone) VALUES (?, ?, ?)";

/// SQLite 기반 취약점 스토어
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 연결 문자열로 스토어를 생성합니다.
    ///
    /// 예: `sqlite:/var/lib/vulnpost/vulnpost.db?mode=rwc`
    pub async fn connect(conn_string: &str, max_pool_size: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(conn_string)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// 이미 구성된 풀로 스토어를 생성합니다.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 내부 커넥션 풀을 반환합니다.
    ///
    /// 같은 데이터베이스를 공유하는 협력자(리스 락 등)에 전달합니다.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 스토어 스키마를 구성합니다.
    ///
    /// 멱등 연산입니다. 스키마 소유권을 외부 마이그레이션 드라이버에
    /// 넘기는 배포에서는 호출하지 않습니다.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in schema_statements(SCHEMA) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }
        Ok(())
    }
}

/// 임베드된 스키마를 개별 실행 가능한 문장으로 분리합니다.
fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// 배치 하나를 트랜잭션 안에서 단일 multi-value INSERT로 삽입합니다.
///
/// 기본 배치 상한(2,000행)에서 바인드 수는 6,000개로, SQLite의 바인드
/// 변수 한도 안에 들어갑니다. `INSERT OR IGNORE`가 (updater, tombstone,
/// vulnerability) 고유 제약과 결합하여 스냅샷 내 중복을 제거합니다.
async fn insert_batch(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    updater: &str,
    tombstone: &str,
    batch: Vec<String>,
) -> Result<(), StoreError> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut sql = String::from(INSERT_VULN_PREFIX);
    sql.push_str(&vec!["(?, ?, ?)"; batch.len()].join(", "));

    let mut query = sqlx::query(&sql);
    for serialized in &batch {
        query = query.bind(updater).bind(serialized).bind(tombstone);
    }
    query
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
    Ok(())
}

impl VulnStore for SqliteStore {
    async fn update_vulnerabilities(
        &self,
        updater: &str,
        fingerprint: Fingerprint,
        vulnerabilities: Vec<Vulnerability>,
    ) -> Result<UpdateOperation, StoreError> {
        // 이전 톰스톤 조회 (없으면 첫 인제스트)
        let old_tombstone = sqlx::query(SELECT_TOMBSTONE)
            .bind(updater)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .map(|row| row.get::<String, _>(0))
            .unwrap_or_default();

        let new_tombstone = Uuid::new_v4().to_string();
        let total = vulnerabilities.len();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut batcher = Batcher::with_defaults();
        for mut vuln in vulnerabilities {
            // 없는 묶음은 빈 값 구조체로 실체화합니다 (null 금지)
            vuln.package.get_or_insert_with(Default::default);
            vuln.dist.get_or_insert_with(Default::default);
            vuln.repo.get_or_insert_with(Default::default);

            let serialized = serde_json::to_string(&vuln)
                .map_err(|e| StoreError::Serialize(e.to_string()))?;
            if let Some(batch) = batcher.queue(serialized) {
                insert_batch(&mut tx, updater, &new_tombstone, batch).await?;
            }
        }
        let remainder = batcher.drain();
        if !remainder.is_empty() {
            insert_batch(&mut tx, updater, &new_tombstone, remainder).await?;
        }

        // 이전 세대 회수. 빈 톰스톤은 첫 인제스트이므로 삭제할 것이 없습니다.
        if !old_tombstone.is_empty() {
            sqlx::query(DELETE_TOMBSTONED)
                .bind(&old_tombstone)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        sqlx::query(UPSERT_CURSOR)
            .bind(updater)
            .bind(fingerprint.as_str())
            .bind(&new_tombstone)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query(APPEND_OPERATION)
            .bind(updater)
            .bind(fingerprint.as_str())
            .bind(&new_tombstone)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tracing::debug!(
            updater,
            vulnerabilities = total,
            tombstone = %new_tombstone,
            "vulnerability snapshot replaced"
        );

        Ok(UpdateOperation {
            updater: updater.to_owned(),
            fingerprint,
            tombstone: new_tombstone,
        })
    }

    async fn get_update_operations(
        &self,
        updater: &str,
    ) -> Result<HashMap<String, Vec<UpdateOperation>>, StoreError> {
        let rows = sqlx::query(SELECT_OPERATIONS)
            .bind(updater)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut operations = HashMap::new();
        if !rows.is_empty() {
            let history: Vec<UpdateOperation> = rows
                .into_iter()
                .map(|row| UpdateOperation {
                    updater: updater.to_owned(),
                    fingerprint: Fingerprint::new(row.get::<String, _>(0)),
                    tombstone: row.get(1),
                })
                .collect();
            operations.insert(updater.to_owned(), history);
        }

        Ok(operations)
    }

    async fn get(
        &self,
        records: &[IndexRecord],
        selector: &MatchSelector,
    ) -> Result<HashMap<String, Vec<Vulnerability>>, StoreError> {
        // 질의 실행 전에 배치 전체를 구성합니다.
        // 인식 불가 패싯은 여기서 거부되어 어떤 질의도 나가지 않습니다.
        let mut queries = Vec::new();
        for record in records {
            if record.package.name.is_empty() {
                continue;
            }
            let query = build_record_query(record, &selector.facets)?;
            queries.push((record.package.id.clone(), query));
        }

        let run = async {
            let mut results: HashMap<String, Vec<Vulnerability>> = HashMap::new();
            for (key, query) in &queries {
                let mut prepared = sqlx::query(&query.sql);
                for bind in &query.binds {
                    prepared = prepared.bind(bind);
                }
                let rows = prepared
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::Query(e.to_string()))?;

                for row in rows {
                    let id: i64 = row.get(0);
                    let raw: String = row.get(1);
                    let mut vuln: Vulnerability = serde_json::from_str(&raw)
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                    vuln.id = id;
                    results.entry(key.clone()).or_default().push(vuln);
                }
            }
            Ok(results)
        };

        match tokio::time::timeout(QUERY_TIMEOUT, run).await {
            Ok(results) => results,
            Err(_) => Err(StoreError::Timeout {
                secs: QUERY_TIMEOUT.as_secs(),
            }),
        }
    }
}
