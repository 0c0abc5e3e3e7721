//! `PostgreSQL` implementation of the `SagaStore` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use tracing::instrument;

use conductor_core::command::CommandEnvelope;
use conductor_core::error::DomainError;
use conductor_core::saga_store::{SagaSnapshot, SagaStatus, SagaStore};

use crate::pg_event_repository::infrastructure;

/// PostgreSQL-backed saga store.
///
/// Each instance is one row; the revision column carries optimistic
/// concurrency.
#[derive(Debug, Clone)]
pub struct PgSagaStore {
    pool: PgPool,
}

impl PgSagaStore {
    /// Creates a new `PgSagaStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_revision(&self, saga_type: &str, saga_id: &str) -> Result<i64, DomainError> {
        let revision: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM saga_instances WHERE saga_type = $1 AND saga_id = $2",
        )
        .bind(saga_type)
        .bind(saga_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infrastructure("revision check", &e))?;
        Ok(revision.unwrap_or(0))
    }
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Binds `$1..$8`, the columns shared by insert and update.
fn bind_snapshot<'q>(query: PgQuery<'q>, snapshot: &'q SagaSnapshot, revision: i64) -> PgQuery<'q> {
    query
        .bind(&snapshot.saga_type)
        .bind(&snapshot.saga_id)
        .bind(revision)
        .bind(snapshot.version)
        .bind(snapshot.status.as_str())
        .bind(Json(&snapshot.stream_positions))
        .bind(&snapshot.state)
        .bind(Json(&snapshot.uncommitted_commands))
}

#[derive(sqlx::FromRow)]
struct SagaRow {
    saga_type: String,
    saga_id: String,
    revision: i64,
    version: i64,
    status: String,
    stream_positions: Json<BTreeMap<String, i64>>,
    state: serde_json::Value,
    uncommitted_commands: Json<Vec<CommandEnvelope>>,
}

impl TryFrom<SagaRow> for SagaSnapshot {
    type Error = DomainError;

    fn try_from(row: SagaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            saga_type: row.saga_type,
            saga_id: row.saga_id,
            revision: row.revision,
            version: row.version,
            status: row.status.parse::<SagaStatus>()?,
            stream_positions: row.stream_positions.0,
            state: row.state,
            uncommitted_commands: row.uncommitted_commands.0,
        })
    }
}

#[async_trait]
impl SagaStore for PgSagaStore {
    #[instrument(skip(self))]
    async fn load(
        &self,
        saga_type: &str,
        saga_id: &str,
    ) -> Result<Option<SagaSnapshot>, DomainError> {
        let row: Option<SagaRow> = sqlx::query_as(
            r"
            SELECT saga_type, saga_id, revision, version, status,
                   stream_positions, state, uncommitted_commands
            FROM saga_instances
            WHERE saga_type = $1 AND saga_id = $2
            ",
        )
        .bind(saga_type)
        .bind(saga_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infrastructure("load saga", &e))?;

        row.map(SagaSnapshot::try_from).transpose()
    }

    #[instrument(skip(self, snapshot), fields(saga_type = %snapshot.saga_type, saga_id = %snapshot.saga_id))]
    async fn save(
        &self,
        snapshot: &SagaSnapshot,
        expected_revision: i64,
    ) -> Result<i64, DomainError> {
        let revision = expected_revision + 1;
        let result = if expected_revision == 0 {
            bind_snapshot(
                sqlx::query(
                    r"
                    INSERT INTO saga_instances (
                        saga_type, saga_id, revision, version, status,
                        stream_positions, state, uncommitted_commands, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                    ON CONFLICT (saga_type, saga_id) DO NOTHING
                    ",
                ),
                snapshot,
                revision,
            )
            .execute(&self.pool)
            .await
        } else {
            bind_snapshot(
                sqlx::query(
                    r"
                    UPDATE saga_instances
                    SET revision = $3, version = $4, status = $5, stream_positions = $6,
                        state = $7, uncommitted_commands = $8, updated_at = NOW()
                    WHERE saga_type = $1 AND saga_id = $2 AND revision = $9
                    ",
                ),
                snapshot,
                revision,
            )
            .bind(expected_revision)
            .execute(&self.pool)
            .await
        }
        .map_err(|e| infrastructure("save saga", &e))?;

        if result.rows_affected() == 0 {
            let actual = self
                .current_revision(&snapshot.saga_type, &snapshot.saga_id)
                .await?;
            return Err(DomainError::ConcurrencyConflict {
                key: format!("{}/{}", snapshot.saga_type, snapshot.saga_id),
                expected: expected_revision,
                actual,
            });
        }
        Ok(revision)
    }

    #[instrument(skip(self))]
    async fn queued(&self, saga_type: &str) -> Result<Vec<String>, DomainError> {
        sqlx::query_scalar(
            r"
            SELECT saga_id
            FROM saga_instances
            WHERE saga_type = $1 AND jsonb_array_length(uncommitted_commands) > 0
            ORDER BY saga_id
            ",
        )
        .bind(saga_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| infrastructure("list queued sagas", &e))
    }
}
