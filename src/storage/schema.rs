//! Database schema management.

use rusqlite::Connection;

/// Create tables and indexes if they do not exist yet.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

const SCHEMA: &str = r#"
-- Append-only probe outcomes
CREATE TABLE IF NOT EXISTS health_checks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('UP', 'DOWN')),
    response_time INTEGER,
    checked_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'resolved')),
    triggered_at TEXT NOT NULL,
    resolved_at TEXT,
    last_alert_sent TEXT,
    alert_count INTEGER NOT NULL DEFAULT 1 CHECK (alert_count >= 1)
);

-- At most one active alert per target
CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_one_active
    ON alerts(target_id) WHERE status = 'active';

CREATE INDEX IF NOT EXISTS idx_health_checks_target ON health_checks(target_id, checked_at);
CREATE INDEX IF NOT EXISTS idx_alerts_triggered ON alerts(triggered_at);
"#;
