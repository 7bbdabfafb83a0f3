//! Postgres-backed event store, enabled with the `postgres` feature.
//!
//! Schema lives in `migrations/0001_events.sql`. The unique index on
//! `(tenant_id, aggregate_id, sequence_number)` is the last line of defence
//! against concurrent appends: a racing insert fails with `23505`, which maps
//! to [`EventStoreError::Concurrency`].
//!
//! The [`EventStore`] trait is synchronous. Calls bridge into the async pool
//! with `block_in_place`, so they must run on a multi-threaded tokio runtime.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use quickdrop_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `events` table and its indexes if they are missing.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(include_str!("../../migrations/0001_events.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(row_to_event).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn load_all_async(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1
            ORDER BY global_position ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(row_to_event).collect()
    }

    pub async fn tenants_async(&self) -> Result<Vec<TenantId>, EventStoreError> {
        let rows = sqlx::query("SELECT DISTINCT tenant_id FROM events")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenants", e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("tenant_id")
                    .map(TenantId::from_uuid)
                    .map_err(|e| map_sqlx_error("tenants", e))
            })
            .collect()
    }

    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_async(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (tenant_id, aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let (current, existing_type) = stream_head(&mut tx, tenant_id, aggregate_id).await?;
        if let Some(existing) = existing_type.filter(|t| t != &aggregate_type) {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
            )));
        }
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(to_i64(next)?)
            .bind(&event.event_type)
            .bind(i32::try_from(event.event_version).unwrap_or(i32::MAX))
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                tenant_id: event.tenant_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next += 1;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(committed)
    }
}

async fn stream_head(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence_number), 0) AS current_version,
               MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("stream_head", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("stream_head", e))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| map_sqlx_error("stream_head", e))?;
    Ok((u64::try_from(current).unwrap_or(0), aggregate_type))
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_row", e);
    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;
    let tenant_id: uuid::Uuid = row.try_get("tenant_id").map_err(read)?;
    let aggregate_id: uuid::Uuid = row.try_get("aggregate_id").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        tenant_id: TenantId::from_uuid(tenant_id),
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: u64::try_from(sequence_number).unwrap_or(0),
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: u32::try_from(event_version).unwrap_or(0),
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}

fn to_i64(n: u64) -> Result<i64, EventStoreError> {
    i64::try_from(n).map_err(|_| EventStoreError::InvalidAppend("sequence overflow".to_string()))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn block_on<F: std::future::Future>(fut: F) -> Result<F::Output, EventStoreError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::Backend("PostgresEventStore needs a tokio runtime".to_string())
    })?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.append_async(events, expected_version))?
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_stream_async(tenant_id, aggregate_id))?
    }

    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_all_async(tenant_id))?
    }

    fn tenants(&self) -> Result<Vec<TenantId>, EventStoreError> {
        block_on(self.tenants_async())?
    }
}
