//! Event store database schema.
//!
//! Mirrors `migrations/`; `apply` lets a process create the tables without
//! the sqlx CLI.

use conductor_core::error::DomainError;
use sqlx::PgPool;

/// SQL to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    event_id            UUID PRIMARY KEY,
    aggregate_type      VARCHAR(255) NOT NULL,
    aggregate_id        VARCHAR(255) NOT NULL,
    event_type          VARCHAR(255) NOT NULL,
    payload             JSONB NOT NULL,
    sequence_number     BIGINT NOT NULL,
    logical_timestamp   BIGINT NOT NULL,
    correlation_id      UUID NOT NULL,
    causation_id        UUID,
    command_fingerprint VARCHAR(64),
    occurred_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (aggregate_type, aggregate_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_domain_events_correlation_id
    ON domain_events (correlation_id);
";

/// SQL to create the saga instances table.
pub const CREATE_SAGAS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS saga_instances (
    saga_type            VARCHAR(255) NOT NULL,
    saga_id              VARCHAR(255) NOT NULL,
    revision             BIGINT NOT NULL,
    version              BIGINT NOT NULL,
    status               VARCHAR(32) NOT NULL,
    stream_positions     JSONB NOT NULL,
    state                JSONB NOT NULL,
    uncommitted_commands JSONB NOT NULL,
    updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (saga_type, saga_id)
);
";

/// Creates both tables if they do not exist.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if a statement fails.
pub async fn apply(pool: &PgPool) -> Result<(), DomainError> {
    for statement in [CREATE_EVENTS_TABLE, CREATE_SAGAS_TABLE] {
        sqlx::raw_sql(statement)
            .execute(pool)
            .await
            .map_err(|e| DomainError::Infrastructure(format!("schema setup failed: {e}")))?;
    }
    Ok(())
}
