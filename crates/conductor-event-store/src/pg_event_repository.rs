//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use conductor_core::error::DomainError;
use conductor_core::repository::{EventRepository, StoredEvent, StreamId};

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: serde_json::Value,
    sequence_number: i64,
    logical_timestamp: i64,
    correlation_id: Uuid,
    causation_id: Option<Uuid>,
    command_fingerprint: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload,
            sequence_number: row.sequence_number,
            timestamp: row.logical_timestamp,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            command_fingerprint: row.command_fingerprint,
            occurred_at: row.occurred_at,
        }
    }
}

pub(crate) fn infrastructure(operation: &str, err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("{operation} failed: {err}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip(self), fields(stream = %stream))]
    async fn load_events(&self, stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r"
            SELECT event_id, aggregate_type, aggregate_id, event_type, payload,
                   sequence_number, logical_timestamp, correlation_id, causation_id,
                   command_fingerprint, occurred_at
            FROM domain_events
            WHERE aggregate_type = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            ",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| infrastructure("load_events", &e))?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[instrument(skip(self, events), fields(stream = %stream, events_len = events.len()))]
    async fn append_events(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| infrastructure("begin", &e))?;

        let current: i64 = sqlx::query_scalar(
            r"
            SELECT COALESCE(MAX(sequence_number), 0)
            FROM domain_events
            WHERE aggregate_type = $1 AND aggregate_id = $2
            ",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| infrastructure("version check", &e))?;

        let conflict = |actual| DomainError::ConcurrencyConflict {
            key: stream.to_string(),
            expected: expected_version,
            actual,
        };
        if current != expected_version {
            return Err(conflict(current));
        }

        for event in events {
            let inserted = sqlx::query(
                r"
                INSERT INTO domain_events (
                    event_id, aggregate_type, aggregate_id, event_type, payload,
                    sequence_number, logical_timestamp, correlation_id, causation_id,
                    command_fingerprint, occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ",
            )
            .bind(event.event_id)
            .bind(&stream.aggregate_type)
            .bind(&stream.aggregate_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.sequence_number)
            .bind(event.timestamp)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(&event.command_fingerprint)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                // A concurrent writer committed the same version first.
                Err(e) if is_unique_violation(&e) => return Err(conflict(expected_version + 1)),
                Err(e) => return Err(infrastructure("append_events", &e)),
            }
        }

        tx.commit()
            .await
            .map_err(|e| infrastructure("commit", &e))?;
        Ok(())
    }
}
