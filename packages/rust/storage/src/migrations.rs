//! SQL migration definitions for the Leadpipe lead database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: leads keyed by domain",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per practice domain; re-processing a domain updates in place
CREATE TABLE IF NOT EXISTS leads (
    id                   TEXT PRIMARY KEY,
    practice_id          TEXT NOT NULL,
    company              TEXT NOT NULL,
    domain               TEXT NOT NULL,
    source_url           TEXT NOT NULL,
    location             TEXT NOT NULL DEFAULT '',
    phone                TEXT NOT NULL DEFAULT '',
    email                TEXT NOT NULL DEFAULT '',
    services             TEXT NOT NULL DEFAULT '',
    treatments           TEXT NOT NULL DEFAULT '',
    specializations      TEXT NOT NULL DEFAULT '',
    practice_type        TEXT NOT NULL,
    lead_score           INTEGER NOT NULL,
    enrichment_succeeded INTEGER NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    UNIQUE(domain)
);

CREATE INDEX IF NOT EXISTS idx_leads_practice_id ON leads(practice_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index leads by score for list queries",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_leads_score ON leads(lead_score DESC);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
