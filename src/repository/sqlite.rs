//! `rusqlite`-backed `Repository`, a bundled-sqlite connection opened once
//! and shared, covering the full entity set.

use super::{schema::CREATE_TABLES, Repository};
use crate::error::{PipelineError, Result};
use crate::ids::{ClaimId, PaperId, SessionId, SpanId};
use crate::model::{Claim, EvidenceSpan, Report, ScreeningRecord, Session, StudyCard};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| PipelineError::Repository(e.to_string()))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PipelineError::Repository(e.to_string()))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_repo_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Repository(e.to_string())
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn put_session(&self, session: &Session) -> Result<()> {
        let data = serde_json::to_string(session).map_err(to_repo_err)?;
        self.lock()
            .execute(
                "INSERT INTO sessions (id, data) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                (session.id.as_str(), data),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM sessions WHERE id = ?1")
            .map_err(to_repo_err)?;
        let mut rows = stmt.query([id.as_str()]).map_err(to_repo_err)?;
        match rows.next().map_err(to_repo_err)? {
            Some(row) => {
                let data: String = row.get(0).map_err(to_repo_err)?;
                Ok(Some(serde_json::from_str(&data).map_err(to_repo_err)?))
            }
            None => Ok(None),
        }
    }

    async fn put_paper_ref(&self, session: &SessionId, paper: &PaperId) -> Result<()> {
        self.lock()
            .execute(
                "INSERT OR IGNORE INTO session_papers (session_id, paper_id) VALUES (?1, ?2)",
                (session.as_str(), paper.as_str()),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn list_papers(&self, session: &SessionId) -> Result<Vec<PaperId>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT paper_id FROM session_papers WHERE session_id = ?1")
            .map_err(to_repo_err)?;
        let ids = stmt
            .query_map([session.as_str()], |row| row.get::<_, String>(0))
            .map_err(to_repo_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_repo_err)?;
        Ok(ids.into_iter().map(PaperId::from_raw).collect())
    }

    async fn put_screening_record(&self, session: &SessionId, record: &ScreeningRecord) -> Result<()> {
        let data = serde_json::to_string(record).map_err(to_repo_err)?;
        self.lock()
            .execute(
                "INSERT INTO screening_records (session_id, paper_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, paper_id) DO UPDATE SET data = excluded.data",
                (session.as_str(), record.paper_id.as_str(), data),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn list_screening_records(&self, session: &SessionId) -> Result<Vec<ScreeningRecord>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM screening_records WHERE session_id = ?1")
            .map_err(to_repo_err)?;
        let rows = stmt
            .query_map([session.as_str()], |row| row.get::<_, String>(0))
            .map_err(to_repo_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_repo_err)?;
        rows.into_iter()
            .map(|data| serde_json::from_str(&data).map_err(to_repo_err))
            .collect()
    }

    async fn put_evidence_span(&self, session: &SessionId, span: &EvidenceSpan) -> Result<()> {
        let data = serde_json::to_string(span).map_err(to_repo_err)?;
        self.lock()
            .execute(
                "INSERT INTO evidence_spans (session_id, span_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, span_id) DO UPDATE SET data = excluded.data",
                (session.as_str(), span.span_id.as_str(), data),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn get_evidence_span(&self, id: &SpanId) -> Result<Option<EvidenceSpan>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM evidence_spans WHERE span_id = ?1")
            .map_err(to_repo_err)?;
        let mut rows = stmt.query([id.as_str()]).map_err(to_repo_err)?;
        match rows.next().map_err(to_repo_err)? {
            Some(row) => {
                let data: String = row.get(0).map_err(to_repo_err)?;
                Ok(Some(serde_json::from_str(&data).map_err(to_repo_err)?))
            }
            None => Ok(None),
        }
    }

    async fn list_evidence_spans(&self, session: &SessionId) -> Result<Vec<EvidenceSpan>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM evidence_spans WHERE session_id = ?1")
            .map_err(to_repo_err)?;
        let rows = stmt
            .query_map([session.as_str()], |row| row.get::<_, String>(0))
            .map_err(to_repo_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_repo_err)?;
        rows.into_iter()
            .map(|data| serde_json::from_str(&data).map_err(to_repo_err))
            .collect()
    }

    async fn put_study_card(&self, session: &SessionId, card: &StudyCard) -> Result<()> {
        let data = serde_json::to_string(card).map_err(to_repo_err)?;
        self.lock()
            .execute(
                "INSERT INTO study_cards (session_id, paper_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, paper_id) DO UPDATE SET data = excluded.data",
                (session.as_str(), card.paper_id.as_str(), data),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn list_study_cards(&self, session: &SessionId) -> Result<Vec<StudyCard>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM study_cards WHERE session_id = ?1")
            .map_err(to_repo_err)?;
        let rows = stmt
            .query_map([session.as_str()], |row| row.get::<_, String>(0))
            .map_err(to_repo_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_repo_err)?;
        rows.into_iter()
            .map(|data| serde_json::from_str(&data).map_err(to_repo_err))
            .collect()
    }

    async fn put_claim(&self, session: &SessionId, claim: &Claim) -> Result<()> {
        let data = serde_json::to_string(claim).map_err(to_repo_err)?;
        self.lock()
            .execute(
                "INSERT INTO claims (session_id, claim_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, claim_id) DO UPDATE SET data = excluded.data",
                (session.as_str(), claim.id.as_str(), data),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM claims WHERE claim_id = ?1")
            .map_err(to_repo_err)?;
        let mut rows = stmt.query([id.as_str()]).map_err(to_repo_err)?;
        match rows.next().map_err(to_repo_err)? {
            Some(row) => {
                let data: String = row.get(0).map_err(to_repo_err)?;
                Ok(Some(serde_json::from_str(&data).map_err(to_repo_err)?))
            }
            None => Ok(None),
        }
    }

    async fn list_claims(&self, session: &SessionId) -> Result<Vec<Claim>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM claims WHERE session_id = ?1")
            .map_err(to_repo_err)?;
        let rows = stmt
            .query_map([session.as_str()], |row| row.get::<_, String>(0))
            .map_err(to_repo_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_repo_err)?;
        rows.into_iter()
            .map(|data| serde_json::from_str(&data).map_err(to_repo_err))
            .collect()
    }

    async fn put_report(&self, session: &SessionId, report: &Report) -> Result<()> {
        let data = serde_json::to_string(report).map_err(to_repo_err)?;
        self.lock()
            .execute(
                "INSERT INTO reports (session_id, data) VALUES (?1, ?2)
                 ON CONFLICT(session_id) DO UPDATE SET data = excluded.data",
                (session.as_str(), data),
            )
            .map_err(to_repo_err)?;
        Ok(())
    }

    async fn get_report(&self, session: &SessionId) -> Result<Option<Report>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM reports WHERE session_id = ?1")
            .map_err(to_repo_err)?;
        let mut rows = stmt.query([session.as_str()]).map_err(to_repo_err)?;
        match rows.next().map_err(to_repo_err)? {
            Some(row) => {
                let data: String = row.get(0).map_err(to_repo_err)?;
                Ok(Some(serde_json::from_str(&data).map_err(to_repo_err)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    #[tokio::test]
    async fn session_round_trips() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let session = Session::new(
            SessionId::new(),
            "topic".into(),
            "en".into(),
            Mode::Quick,
            chrono::Utc::now(),
        );
        repo.put_session(&session).await.unwrap();
        let loaded = repo.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.topic, session.topic);
    }

    #[tokio::test]
    async fn referential_integrity_catches_a_dangling_span() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let session_id = SessionId::new();
        let claim = Claim::new(
            "unsupported".into(),
            vec![SpanId("paper_1#deadbeef".into())],
        );
        repo.put_claim(&session_id, &claim).await.unwrap();
        let result = repo.check_referential_integrity(&session_id).await;
        assert!(result.is_err());
    }
}
