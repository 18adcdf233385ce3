use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Jobs carry a resource_version used for conditional status updates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            name VARCHAR(253) PRIMARY KEY,
            uid UUID NOT NULL,
            resource_version BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            spec JSONB NOT NULL,
            phase VARCHAR(20) NOT NULL,
            retries INTEGER NOT NULL DEFAULT 0,
            worker_ref VARCHAR(253),
            start_time TIMESTAMPTZ,
            completion_time TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Workers are owned by a job and go away with it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            name VARCHAR(253) PRIMARY KEY,
            owner_name VARCHAR(253) NOT NULL REFERENCES jobs(name) ON DELETE CASCADE,
            owner_uid UUID NOT NULL,
            spec JSONB NOT NULL,
            phase VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_phase ON jobs(phase)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workers_owner_name ON workers(owner_name)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
