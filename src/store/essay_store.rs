//! Essay 持久化仓储 - 基础设施层
//!
//! 唯一接触 SQL 的模块。负责：
//! - Essay / Version / Result / Score / Note 五张表的读写
//! - 状态列上的原子条件更新（`UPDATE … WHERE status IN (…)`），
//!   `processing` 状态即互斥锁，claim 成功等于拿到锁
//! - 一次批改尝试的全部写入（版本追加、结果指针、指标替换、状态翻转）
//!   在单个事务里完成，失败整体回滚
//!
//! 仓储不含业务逻辑；允许哪些转换由 workflow 层决定，
//! 这里只保证条件更新的原子性。

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Essay, EssayNote, EssayResult, EssayStatus, IndicatorScore, NewEssay, StatusReport, Version,
};
use crate::store::error::{StoreError, StoreResult};

/// claim_start / claim_regenerate 的结果
#[derive(Debug)]
pub enum ClaimOutcome {
    /// 成功将 Essay 置为 processing，持有批改任务所需的全部数据
    Claimed(CorrectionClaim),
    /// 当前状态不允许该转换（返回竞争时看到的状态）
    Rejected(EssayStatus),
    /// Essay 不存在
    Missing,
}

/// 拿到 processing 锁后，构建批改任务所需的数据快照
#[derive(Debug)]
pub struct CorrectionClaim {
    pub essay: Essay,
    /// 本次批改要写入的版本号
    pub version_number: i64,
    /// claim 之前 Essay 是否处于定稿状态（决定 prompt 模式）
    pub was_finalized: bool,
    /// 定稿批改本的全文（仅 was_finalized 时存在）
    pub prior_html: Option<String>,
    /// 批改前注意事项（多条 Note 以换行拼接）
    pub notes: Option<String>,
}

/// finalize 的结果
#[derive(Debug)]
pub enum FinalizeOutcome {
    Done(Essay),
    Rejected(EssayStatus),
    Missing,
}

/// Essay 仓储
pub struct EssayStore {
    conn: Arc<Mutex<Connection>>,
}

impl EssayStore {
    /// 打开（或创建）数据库文件并初始化表结构
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// 内存数据库，测试用
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 获取数据库连接
    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    // ========== Essay 创建/查询 ==========

    /// 创建 Essay（状态 draft，版本号 1），可附带首条注意事项 Note
    pub fn create_essay(&self, new: &NewEssay) -> StoreResult<Essay> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let essay_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        tx.execute(
            r#"
            INSERT INTO essays (
                essay_id, student_id, user_id, student_name, teacher_name,
                title, original_text, grade, status, current_version,
                is_finalized, attachment_path, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'draft', 1, 0, ?9, ?10)
            "#,
            params![
                essay_id,
                new.student_id,
                new.user_id,
                new.student_name,
                new.teacher_name,
                new.title,
                new.original_text,
                new.grade,
                new.attachment_path,
                now,
            ],
        )?;

        if let Some(notes) = &new.notes {
            insert_note(&tx, &essay_id, "주의사항", notes)?;
        }

        tx.commit()?;
        debug!("Essay 已创建: {} ({})", essay_id, new.student_name);

        drop(conn);
        self.get_essay(&essay_id)?.ok_or(StoreError::NotFound {
            essay_id: essay_id.clone(),
        })
    }

    /// 追加一条 Note（创建后不可变）
    pub fn add_note(&self, essay_id: &str, note_type: &str, content: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_note(&conn, essay_id, note_type, content)?;
        Ok(())
    }

    pub fn get_essay(&self, essay_id: &str) -> StoreResult<Option<Essay>> {
        let conn = self.conn()?;
        let essay = conn
            .query_row(
                &format!("{} WHERE essay_id = ?1", SELECT_ESSAY),
                params![essay_id],
                row_to_essay,
            )
            .optional()?;
        Ok(essay)
    }

    /// 状态查询响应：{status, current_version, is_finalized}
    pub fn status_report(&self, essay_id: &str) -> StoreResult<Option<StatusReport>> {
        let conn = self.conn()?;
        let report = conn
            .query_row(
                "SELECT status, current_version, is_finalized FROM essays WHERE essay_id = ?1",
                params![essay_id],
                |row| {
                    Ok(StatusReport {
                        status: parse_status(row.get::<_, String>(0)?)?,
                        current_version: row.get(1)?,
                        is_finalized: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(report)
    }

    // ========== 状态转换（条件更新 = 互斥锁） ==========

    /// 尝试将 Essay 从 {draft, failed} 置为 processing
    ///
    /// 条件更新保证并发的两次 start 只有一次成功。
    pub fn claim_start(&self, essay_id: &str) -> StoreResult<ClaimOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE essays SET status = 'processing'
             WHERE essay_id = ?1 AND status IN ('draft', 'failed')",
            params![essay_id],
        )?;

        if changed == 0 {
            let outcome = rejected_outcome(&tx, essay_id)?;
            tx.commit()?;
            return Ok(outcome);
        }

        let essay = select_essay(&tx, essay_id)?.ok_or(StoreError::NotFound {
            essay_id: essay_id.to_string(),
        })?;
        let notes = select_notes_text(&tx, essay_id)?;
        let version_number = essay.current_version;

        tx.commit()?;

        Ok(ClaimOutcome::Claimed(CorrectionClaim {
            essay,
            version_number,
            was_finalized: false,
            prior_html: None,
            notes,
        }))
    }

    /// 尝试从 {reviewing, completed} 重新进入 processing
    ///
    /// 同一事务内：版本号 +1、清除定稿标记、置 processing，
    /// 并读出构建任务所需的上一版批改本/注意事项。
    pub fn claim_regenerate(&self, essay_id: &str) -> StoreResult<ClaimOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // 先记录 claim 前的定稿标记，它决定 prompt 模式
        let was_finalized: Option<bool> = tx
            .query_row(
                "SELECT is_finalized FROM essays
                 WHERE essay_id = ?1 AND status IN ('reviewing', 'completed')",
                params![essay_id],
                |row| row.get(0),
            )
            .optional()?;

        let changed = tx.execute(
            "UPDATE essays SET
                 status = 'processing',
                 current_version = current_version + 1,
                 is_finalized = 0,
                 finalized_at = NULL
             WHERE essay_id = ?1 AND status IN ('reviewing', 'completed')",
            params![essay_id],
        )?;

        if changed == 0 {
            let outcome = rejected_outcome(&tx, essay_id)?;
            tx.commit()?;
            return Ok(outcome);
        }

        let was_finalized = was_finalized.unwrap_or(false);
        let essay = select_essay(&tx, essay_id)?.ok_or(StoreError::NotFound {
            essay_id: essay_id.to_string(),
        })?;
        let version_number = essay.current_version;

        let prior_html = if was_finalized {
            tx.query_row(
                "SELECT html_content FROM essay_versions
                 WHERE essay_id = ?1 ORDER BY version_number DESC LIMIT 1",
                params![essay_id],
                |row| row.get(0),
            )
            .optional()?
        } else {
            None
        };
        let notes = select_notes_text(&tx, essay_id)?;

        tx.commit()?;

        Ok(ClaimOutcome::Claimed(CorrectionClaim {
            essay,
            version_number,
            was_finalized,
            prior_html,
            notes,
        }))
    }

    /// 批改任务失败回调：processing → failed
    ///
    /// Essay 已不在 processing 时返回 false（过期回调，调用方记日志即可）。
    pub fn mark_failed(&self, essay_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE essays SET status = 'failed'
             WHERE essay_id = ?1 AND status = 'processing'",
            params![essay_id],
        )?;
        Ok(changed == 1)
    }

    /// 定稿：{reviewing, completed} → completed，写入定稿时间
    pub fn finalize(&self, essay_id: &str) -> StoreResult<FinalizeOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE essays SET
                 is_finalized = 1,
                 finalized_at = ?2,
                 status = 'completed'
             WHERE essay_id = ?1 AND status IN ('reviewing', 'completed')",
            params![essay_id, Utc::now()],
        )?;

        let outcome = if changed == 1 {
            let essay = select_essay(&tx, essay_id)?.ok_or(StoreError::NotFound {
                essay_id: essay_id.to_string(),
            })?;
            FinalizeOutcome::Done(essay)
        } else {
            match rejected_outcome(&tx, essay_id)? {
                ClaimOutcome::Rejected(status) => FinalizeOutcome::Rejected(status),
                _ => FinalizeOutcome::Missing,
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    // ========== 批改成果写入（单事务） ==========

    /// 一次成功批改的全部写入：
    /// 状态翻转 processing → reviewing、版本追加、结果指针更新、指标替换。
    ///
    /// 任何一步失败整体回滚；Essay 不再处于 processing 时返回
    /// `StoreError::Stale`（重复回调保护），不产生任何写入。
    pub fn apply_correction_success(
        &self,
        essay_id: &str,
        version_number: i64,
        html_content: &str,
        html_path: &str,
        revision_note: Option<&str>,
        total_score: Option<f64>,
        final_grade: Option<&str>,
        indicators: &[IndicatorScore],
    ) -> StoreResult<Version> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let changed = tx.execute(
            "UPDATE essays SET status = 'reviewing', completed_at = ?2
             WHERE essay_id = ?1 AND status = 'processing'",
            params![essay_id, now],
        )?;
        if changed == 0 {
            return Err(StoreError::Stale {
                essay_id: essay_id.to_string(),
                expected: "processing",
            });
        }

        let version_id = Uuid::new_v4().to_string();
        tx.execute(
            r#"
            INSERT INTO essay_versions (
                version_id, essay_id, version_number,
                html_content, html_path, revision_note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                version_id,
                essay_id,
                version_number,
                html_content,
                html_path,
                revision_note,
                now,
            ],
        )
        .map_err(|e| map_unique_violation(e, essay_id, version_number))?;

        // Result 每个 Essay 只有一行，regenerate 时替换版本指针
        tx.execute(
            r#"
            INSERT INTO essay_results (
                result_id, essay_id, version_id, html_path,
                total_score, final_grade, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(essay_id) DO UPDATE SET
                version_id = excluded.version_id,
                html_path = excluded.html_path,
                total_score = excluded.total_score,
                final_grade = excluded.final_grade
            "#,
            params![
                Uuid::new_v4().to_string(),
                essay_id,
                version_id,
                html_path,
                total_score,
                final_grade,
                now,
            ],
        )?;

        replace_indicators_tx(&tx, essay_id, &version_id, indicators)?;

        tx.commit()?;
        debug!(
            "批改成果已写入: essay={} v{} ({} 个指标)",
            essay_id,
            version_number,
            indicators.len()
        );

        Ok(Version {
            version_id,
            essay_id: essay_id.to_string(),
            version_number,
            html_content: html_content.to_string(),
            html_path: html_path.to_string(),
            revision_note: revision_note.map(|s| s.to_string()),
            created_at: now,
        })
    }

    /// 替换某个版本的全部指标行（事务内先删后插，重复执行幂等）
    pub fn replace_indicators(
        &self,
        essay_id: &str,
        version_id: &str,
        indicators: &[IndicatorScore],
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        replace_indicators_tx(&tx, essay_id, version_id, indicators)?;
        tx.commit()?;
        Ok(())
    }

    // ========== 读取接口 ==========

    pub fn get_version(
        &self,
        essay_id: &str,
        version_number: i64,
    ) -> StoreResult<Option<Version>> {
        let conn = self.conn()?;
        let version = conn
            .query_row(
                &format!(
                    "{} WHERE essay_id = ?1 AND version_number = ?2",
                    SELECT_VERSION
                ),
                params![essay_id, version_number],
                row_to_version,
            )
            .optional()?;
        Ok(version)
    }

    pub fn version_count(&self, essay_id: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM essay_versions WHERE essay_id = ?1",
            params![essay_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_result(&self, essay_id: &str) -> StoreResult<Option<EssayResult>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                r#"
                SELECT result_id, essay_id, version_id, html_path,
                       total_score, final_grade, created_at
                FROM essay_results WHERE essay_id = ?1
                "#,
                params![essay_id],
                |row| {
                    Ok(EssayResult {
                        result_id: row.get(0)?,
                        essay_id: row.get(1)?,
                        version_id: row.get(2)?,
                        html_path: row.get(3)?,
                        total_score: row.get(4)?,
                        final_grade: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn indicators_for_version(&self, version_id: &str) -> StoreResult<Vec<IndicatorScore>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, indicator_name, score FROM essay_scores
             WHERE version_id = ?1 ORDER BY score_id",
        )?;
        let rows = stmt.query_map(params![version_id], |row| {
            Ok(IndicatorScore {
                category: row.get(0)?,
                indicator_name: row.get(1)?,
                score: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn notes_for(&self, essay_id: &str) -> StoreResult<Vec<EssayNote>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT note_id, essay_id, note_type, content, created_at
             FROM essay_notes WHERE essay_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![essay_id], |row| {
            Ok(EssayNote {
                note_id: row.get(0)?,
                essay_id: row.get(1)?,
                note_type: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ========== 内部辅助 ==========

const SELECT_ESSAY: &str = r#"
    SELECT essay_id, student_id, user_id, student_name, teacher_name,
           title, original_text, grade, status, current_version,
           is_finalized, finalized_at, attachment_path, created_at, completed_at
    FROM essays
"#;

const SELECT_VERSION: &str = r#"
    SELECT version_id, essay_id, version_number,
           html_content, html_path, revision_note, created_at
    FROM essay_versions
"#;

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS essays (
            essay_id        TEXT PRIMARY KEY,
            student_id      TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            student_name    TEXT NOT NULL,
            teacher_name    TEXT,
            title           TEXT,
            original_text   TEXT NOT NULL,
            grade           TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'draft',
            current_version INTEGER NOT NULL DEFAULT 1,
            is_finalized    INTEGER NOT NULL DEFAULT 0,
            finalized_at    TEXT,
            attachment_path TEXT,
            created_at      TEXT NOT NULL,
            completed_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_essays_status ON essays(status);

        CREATE TABLE IF NOT EXISTS essay_versions (
            version_id     TEXT PRIMARY KEY,
            essay_id       TEXT NOT NULL REFERENCES essays(essay_id) ON DELETE CASCADE,
            version_number INTEGER NOT NULL,
            html_content   TEXT NOT NULL,
            html_path      TEXT NOT NULL,
            revision_note  TEXT,
            created_at     TEXT NOT NULL,
            UNIQUE (essay_id, version_number)
        );

        CREATE TABLE IF NOT EXISTS essay_results (
            result_id   TEXT PRIMARY KEY,
            essay_id    TEXT NOT NULL UNIQUE REFERENCES essays(essay_id) ON DELETE CASCADE,
            version_id  TEXT NOT NULL REFERENCES essay_versions(version_id) ON DELETE CASCADE,
            html_path   TEXT NOT NULL,
            total_score REAL,
            final_grade TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS essay_scores (
            score_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            essay_id       TEXT NOT NULL,
            version_id     TEXT NOT NULL,
            category       TEXT NOT NULL,
            indicator_name TEXT NOT NULL,
            score          REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_scores_version ON essay_scores(version_id);

        CREATE TABLE IF NOT EXISTS essay_notes (
            note_id    TEXT PRIMARY KEY,
            essay_id   TEXT NOT NULL REFERENCES essays(essay_id) ON DELETE CASCADE,
            note_type  TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn insert_note(
    conn: &Connection,
    essay_id: &str,
    note_type: &str,
    content: &str,
) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO essay_notes (note_id, essay_id, note_type, content, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            Uuid::new_v4().to_string(),
            essay_id,
            note_type,
            content,
            Utc::now(),
        ],
    )?;
    Ok(())
}

fn select_essay(conn: &Connection, essay_id: &str) -> StoreResult<Option<Essay>> {
    let essay = conn
        .query_row(
            &format!("{} WHERE essay_id = ?1", SELECT_ESSAY),
            params![essay_id],
            row_to_essay,
        )
        .optional()?;
    Ok(essay)
}

fn select_notes_text(conn: &Connection, essay_id: &str) -> StoreResult<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT content FROM essay_notes WHERE essay_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map(params![essay_id], |row| row.get::<_, String>(0))?;
    let contents = rows.collect::<Result<Vec<_>, _>>()?;
    if contents.is_empty() {
        Ok(None)
    } else {
        Ok(Some(contents.join("\n")))
    }
}

/// 条件更新失败后查明原因：不存在还是状态不符
fn rejected_outcome(conn: &Connection, essay_id: &str) -> StoreResult<ClaimOutcome> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM essays WHERE essay_id = ?1",
            params![essay_id],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        Some(s) => {
            let status = EssayStatus::parse(&s).ok_or_else(|| {
                StoreError::Sqlite(rusqlite::Error::InvalidColumnType(
                    0,
                    format!("未知状态: {}", s),
                    rusqlite::types::Type::Text,
                ))
            })?;
            Ok(ClaimOutcome::Rejected(status))
        }
        None => Ok(ClaimOutcome::Missing),
    }
}

fn replace_indicators_tx(
    conn: &Connection,
    essay_id: &str,
    version_id: &str,
    indicators: &[IndicatorScore],
) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM essay_scores WHERE version_id = ?1",
        params![version_id],
    )?;
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO essay_scores (essay_id, version_id, category, indicator_name, score)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;
    for indicator in indicators {
        stmt.execute(params![
            essay_id,
            version_id,
            indicator.category,
            indicator.indicator_name,
            indicator.score,
        ])?;
    }
    Ok(())
}

fn map_unique_violation(err: rusqlite::Error, essay_id: &str, version_number: i64) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::DuplicateVersion {
                essay_id: essay_id.to_string(),
                version_number,
            };
        }
    }
    StoreError::Sqlite(err)
}

fn parse_status(s: String) -> Result<EssayStatus, rusqlite::Error> {
    EssayStatus::parse(&s).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, format!("未知状态: {}", s), rusqlite::types::Type::Text)
    })
}

fn row_to_essay(row: &Row<'_>) -> Result<Essay, rusqlite::Error> {
    Ok(Essay {
        essay_id: row.get(0)?,
        student_id: row.get(1)?,
        user_id: row.get(2)?,
        student_name: row.get(3)?,
        teacher_name: row.get(4)?,
        title: row.get(5)?,
        original_text: row.get(6)?,
        grade: row.get(7)?,
        status: parse_status(row.get::<_, String>(8)?)?,
        current_version: row.get(9)?,
        is_finalized: row.get(10)?,
        finalized_at: row.get::<_, Option<DateTime<Utc>>>(11)?,
        attachment_path: row.get(12)?,
        created_at: row.get(13)?,
        completed_at: row.get::<_, Option<DateTime<Utc>>>(14)?,
    })
}

fn row_to_version(row: &Row<'_>) -> Result<Version, rusqlite::Error> {
    Ok(Version {
        version_id: row.get(0)?,
        essay_id: row.get(1)?,
        version_number: row.get(2)?,
        html_content: row.get(3)?,
        html_path: row.get(4)?,
        revision_note: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new_essay() -> NewEssay {
        NewEssay {
            student_id: "student-1".to_string(),
            user_id: "teacher-1".to_string(),
            student_name: "김민준".to_string(),
            teacher_name: Some("이선생".to_string()),
            title: Some("환경 보호".to_string()),
            original_text: "환경 보호는 더 이상 미룰 수 없는 과제이다.".to_string(),
            grade: "중등".to_string(),
            notes: Some("수동태 사용에 주의".to_string()),
            attachment_path: None,
        }
    }

    fn sample_indicators() -> Vec<IndicatorScore> {
        vec![
            IndicatorScore {
                category: "사고유형".to_string(),
                indicator_name: "요약".to_string(),
                score: 8.5,
            },
            IndicatorScore {
                category: "통합지표".to_string(),
                indicator_name: "구조/논리성".to_string(),
                score: 7.0,
            },
        ]
    }

    #[test]
    fn test_create_essay_with_note() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();

        assert_eq!(essay.status, EssayStatus::Draft);
        assert_eq!(essay.current_version, 1);
        assert!(!essay.is_finalized);

        let notes = store.notes_for(&essay.essay_id).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note_type, "주의사항");
    }

    #[test]
    fn test_claim_start_cas() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();

        // 第一次 claim 成功
        match store.claim_start(&essay.essay_id).unwrap() {
            ClaimOutcome::Claimed(claim) => {
                assert_eq!(claim.version_number, 1);
                assert!(!claim.was_finalized);
                assert!(claim.prior_html.is_none());
                assert_eq!(claim.notes.as_deref(), Some("수동태 사용에 주의"));
            }
            other => panic!("预期 Claimed，实际: {:?}", other),
        }

        // 第二次 claim 被拒绝（已在 processing）
        match store.claim_start(&essay.essay_id).unwrap() {
            ClaimOutcome::Rejected(status) => assert_eq!(status, EssayStatus::Processing),
            other => panic!("预期 Rejected，实际: {:?}", other),
        }
    }

    #[test]
    fn test_notes_joined_in_claim() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();
        store
            .add_note(&essay.essay_id, "추가", "결론 문단을 중점적으로 봐주세요")
            .unwrap();

        // 多条 Note 按创建顺序换行拼接
        match store.claim_start(&essay.essay_id).unwrap() {
            ClaimOutcome::Claimed(claim) => {
                assert_eq!(
                    claim.notes.as_deref(),
                    Some("수동태 사용에 주의\n결론 문단을 중점적으로 봐주세요")
                );
            }
            other => panic!("预期 Claimed，实际: {:?}", other),
        }

        assert_eq!(store.notes_for(&essay.essay_id).unwrap().len(), 2);
    }

    #[test]
    fn test_claim_start_missing() {
        let store = EssayStore::open_in_memory().unwrap();
        match store.claim_start("no-such-essay").unwrap() {
            ClaimOutcome::Missing => {}
            other => panic!("预期 Missing，实际: {:?}", other),
        }
    }

    fn run_success(store: &EssayStore, essay_id: &str, version_number: i64) -> Version {
        store
            .apply_correction_success(
                essay_id,
                version_number,
                "<html><body>첨삭본</body></html>",
                "output_html/v.html",
                None,
                Some(87.5),
                Some("B+"),
                &sample_indicators(),
            )
            .unwrap()
    }

    #[test]
    fn test_apply_success_writes_unit() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();
        store.claim_start(&essay.essay_id).unwrap();

        let version = run_success(&store, &essay.essay_id, 1);

        let essay = store.get_essay(&essay.essay_id).unwrap().unwrap();
        assert_eq!(essay.status, EssayStatus::Reviewing);
        assert!(essay.completed_at.is_some());

        let result = store.get_result(&essay.essay_id).unwrap().unwrap();
        assert_eq!(result.version_id, version.version_id);
        assert_eq!(result.total_score, Some(87.5));
        assert_eq!(result.final_grade.as_deref(), Some("B+"));

        let indicators = store.indicators_for_version(&version.version_id).unwrap();
        assert_eq!(indicators.len(), 2);
    }

    #[test]
    fn test_apply_success_stale_without_claim() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();

        // 未 claim（状态 draft），重复/过期回调被拒绝且无写入
        let err = store
            .apply_correction_success(
                &essay.essay_id,
                1,
                "<html></html>",
                "p.html",
                None,
                None,
                None,
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Stale { .. }));
        assert_eq!(store.version_count(&essay.essay_id).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_version_unique_constraint() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();
        store.claim_start(&essay.essay_id).unwrap();
        run_success(&store, &essay.essay_id, 1);

        // 回到 processing 后重复写入版本 1
        let conn_changed = {
            // finalize 后 regenerate 会得到版本 2，这里强行复用版本 1 验证唯一约束
            store.finalize(&essay.essay_id).unwrap();
            store.claim_regenerate(&essay.essay_id).unwrap()
        };
        match conn_changed {
            ClaimOutcome::Claimed(_) => {}
            other => panic!("预期 Claimed，实际: {:?}", other),
        }

        let err = store
            .apply_correction_success(
                &essay.essay_id,
                1, // 与已有版本冲突
                "<html></html>",
                "p.html",
                None,
                None,
                None,
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateVersion { .. }));

        // 回滚后 Essay 仍在 processing，版本数不变
        let essay = store.get_essay(&essay.essay_id).unwrap().unwrap();
        assert_eq!(essay.status, EssayStatus::Processing);
        assert_eq!(store.version_count(&essay.essay_id).unwrap(), 1);
    }

    #[test]
    fn test_regenerate_after_finalize() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();
        store.claim_start(&essay.essay_id).unwrap();
        run_success(&store, &essay.essay_id, 1);

        match store.finalize(&essay.essay_id).unwrap() {
            FinalizeOutcome::Done(essay) => {
                assert!(essay.is_finalized);
                assert!(essay.finalized_at.is_some());
                assert_eq!(essay.status, EssayStatus::Completed);
            }
            other => panic!("预期 Done，实际: {:?}", other),
        }

        match store.claim_regenerate(&essay.essay_id).unwrap() {
            ClaimOutcome::Claimed(claim) => {
                assert_eq!(claim.version_number, 2);
                assert!(claim.was_finalized);
                assert!(claim.prior_html.is_some());
            }
            other => panic!("预期 Claimed，实际: {:?}", other),
        }

        // 定稿标记被清除
        let essay = store.get_essay(&essay.essay_id).unwrap().unwrap();
        assert!(!essay.is_finalized);
        assert!(essay.finalized_at.is_none());
        assert_eq!(essay.current_version, 2);
    }

    #[test]
    fn test_regenerate_rejected_from_failed() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();
        store.claim_start(&essay.essay_id).unwrap();
        store.mark_failed(&essay.essay_id).unwrap();

        match store.claim_regenerate(&essay.essay_id).unwrap() {
            ClaimOutcome::Rejected(status) => assert_eq!(status, EssayStatus::Failed),
            other => panic!("预期 Rejected，实际: {:?}", other),
        }
    }

    #[test]
    fn test_mark_failed_stale() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();

        // draft 状态下的失败回调是过期回调
        assert!(!store.mark_failed(&essay.essay_id).unwrap());
    }

    #[test]
    fn test_replace_indicators_idempotent() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();
        store.claim_start(&essay.essay_id).unwrap();
        let version = run_success(&store, &essay.essay_id, 1);

        let indicators = sample_indicators();
        store
            .replace_indicators(&essay.essay_id, &version.version_id, &indicators)
            .unwrap();
        store
            .replace_indicators(&essay.essay_id, &version.version_id, &indicators)
            .unwrap();

        // 两次重跑后没有重复行
        let stored = store.indicators_for_version(&version.version_id).unwrap();
        assert_eq!(stored.len(), indicators.len());
    }

    #[test]
    fn test_status_report() {
        let store = EssayStore::open_in_memory().unwrap();
        let essay = store.create_essay(&sample_new_essay()).unwrap();

        let report = store.status_report(&essay.essay_id).unwrap().unwrap();
        assert_eq!(report.status, EssayStatus::Draft);
        assert_eq!(report.current_version, 1);
        assert!(!report.is_finalized);

        assert!(store.status_report("no-such").unwrap().is_none());
    }
}
