//! SQL schema for the sqlite-backed repository. One table per collection
//! (§6 "stored as separate logical collections keyed by id"), entities
//! kept as JSON blobs rather than a binary encoding since they are
//! already `serde`-tagged for the event bus and need no binary-only
//! fields (embeddings live in the clustering layer, not the repository).

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_papers (
    session_id TEXT NOT NULL,
    paper_id TEXT NOT NULL,
    PRIMARY KEY (session_id, paper_id)
);

CREATE TABLE IF NOT EXISTS screening_records (
    session_id TEXT NOT NULL,
    paper_id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (session_id, paper_id)
);

CREATE TABLE IF NOT EXISTS evidence_spans (
    session_id TEXT NOT NULL,
    span_id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (session_id, span_id)
);

CREATE TABLE IF NOT EXISTS study_cards (
    session_id TEXT NOT NULL,
    paper_id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (session_id, paper_id)
);

CREATE TABLE IF NOT EXISTS claims (
    session_id TEXT NOT NULL,
    claim_id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (session_id, claim_id)
);

CREATE TABLE IF NOT EXISTS reports (
    session_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
"#;
