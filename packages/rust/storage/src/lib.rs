//! Structured store capability for Leadpipe, backed by Turso Embedded / libSQL.
//!
//! [`StructuredStore`] is the interface the persistence phase calls.
//! [`LeadStore`] implements it over a local libSQL file with one row per
//! practice domain: upserting a lead for a known domain updates the existing
//! row and returns its original record id, so duplicate detection lives here
//! and not in the pipeline.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadpipe_shared::{LeadpipeError, NormalizedRecord, PracticeId, Result};
use libsql::{Connection, Database, Row, params};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

/// The external store the persistence phase writes to.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Insert or update `record`, returning the store's record id.
    async fn upsert(&self, record: &NormalizedRecord) -> Result<String>;

    /// The lead last written under `practice_id`, if any.
    async fn find_by_practice_id(&self, practice_id: &PracticeId) -> Result<Option<StoredLead>>;

    /// Up to `limit` leads, best score first.
    async fn list(&self, limit: u32) -> Result<Vec<StoredLead>>;

    async fn count(&self) -> Result<u64>;
}

/// A lead row as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLead {
    pub record_id: String,
    pub lead: NormalizedRecord,
    pub updated_at: DateTime<Utc>,
}

/// libSQL-backed lead store.
pub struct LeadStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes upserts so the returned id always matches the row written.
    write_lock: Mutex<()>,
}

const LEAD_COLUMNS: &str = "id, practice_id, company, domain, source_url, location, phone, email,
     services, treatments, specializations, practice_type, lead_score,
     enrichment_succeeded, created_at, updated_at";

impl LeadStore {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadpipeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadpipeError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadpipeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Lead operations
    // -----------------------------------------------------------------------

    /// Upsert a lead (insert, or update in place on conflict by `domain`).
    #[instrument(skip_all, fields(domain = %record.domain))]
    pub async fn upsert_lead(&self, record: &NormalizedRecord) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let new_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        let mut rows = self
            .conn
            .query(
                "INSERT INTO leads (id, practice_id, company, domain, source_url, location, phone, email,
                                    services, treatments, specializations, practice_type, lead_score,
                                    enrichment_succeeded, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(domain) DO UPDATE SET
                   practice_id = excluded.practice_id,
                   company = excluded.company,
                   source_url = excluded.source_url,
                   location = excluded.location,
                   phone = excluded.phone,
                   email = excluded.email,
                   services = excluded.services,
                   treatments = excluded.treatments,
                   specializations = excluded.specializations,
                   practice_type = excluded.practice_type,
                   lead_score = excluded.lead_score,
                   enrichment_succeeded = excluded.enrichment_succeeded,
                   updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    new_id.as_str(),
                    record.practice_id.as_str(),
                    record.company.as_str(),
                    record.domain.as_str(),
                    record.source_url.as_str(),
                    record.location.as_str(),
                    record.phone.as_str(),
                    record.email.as_str(),
                    record.services.as_str(),
                    record.treatments.as_str(),
                    record.specializations.as_str(),
                    record.practice_type.as_str(),
                    i64::from(record.lead_score),
                    i64::from(record.enrichment_succeeded),
                    record.created_at.to_rfc3339(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| LeadpipeError::Storage(e.to_string()))?;

        let id = match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map_err(|e| LeadpipeError::Storage(e.to_string()))?,
            Ok(None) => return Err(LeadpipeError::Storage("upsert returned no id".into())),
            Err(e) => return Err(LeadpipeError::Storage(e.to_string())),
        };

        debug!(record_id = %id, updated = id != new_id, "lead stored");
        Ok(id)
    }

    /// Get the lead most recently written under `practice_id`.
    pub async fn get_by_practice_id(&self, practice_id: &PracticeId) -> Result<Option<StoredLead>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE practice_id = ?1"),
                params![practice_id.as_str()],
            )
            .await
            .map_err(|e| LeadpipeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadpipeError::Storage(e.to_string())),
        }
    }

    /// List leads, best score first.
    pub async fn list_leads(&self, limit: u32) -> Result<Vec<StoredLead>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads ORDER BY lead_score DESC, updated_at DESC LIMIT ?1"
                ),
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| LeadpipeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Count stored leads.
    pub async fn count_leads(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM leads", params![])
            .await
            .map_err(|e| LeadpipeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map(|n| u64::try_from(n).unwrap_or(0))
                .unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(LeadpipeError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl StructuredStore for LeadStore {
    async fn upsert(&self, record: &NormalizedRecord) -> Result<String> {
        self.upsert_lead(record).await
    }

    async fn find_by_practice_id(&self, practice_id: &PracticeId) -> Result<Option<StoredLead>> {
        self.get_by_practice_id(practice_id).await
    }

    async fn list(&self, limit: u32) -> Result<Vec<StoredLead>> {
        self.list_leads(limit).await
    }

    async fn count(&self) -> Result<u64> {
        self.count_leads().await
    }
}

/// Convert a database row to a [`StoredLead`].
fn row_to_lead(row: &Row) -> Result<StoredLead> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| LeadpipeError::Storage(e.to_string()))
    };
    let int = |idx: i32| -> Result<i64> {
        row.get::<i64>(idx)
            .map_err(|e| LeadpipeError::Storage(e.to_string()))
    };

    let lead = NormalizedRecord {
        practice_id: PracticeId::from_raw(text(1)?),
        company: text(2)?,
        domain: text(3)?,
        source_url: text(4)?,
        location: text(5)?,
        phone: text(6)?,
        email: text(7)?,
        services: text(8)?,
        treatments: text(9)?,
        specializations: text(10)?,
        practice_type: text(11)?,
        lead_score: u8::try_from(int(12)?.clamp(0, 100)).unwrap_or(0),
        enrichment_succeeded: int(13)? != 0,
        created_at: parse_timestamp(&text(14)?)?,
    };

    Ok(StoredLead {
        record_id: text(0)?,
        lead,
        updated_at: parse_timestamp(&text(15)?)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadpipeError::Storage(format!("bad timestamp '{s}': {e}")))
}
