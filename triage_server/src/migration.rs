//! Database migration for the triage tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for report triage tables.
///
/// Idempotent. Entry and hit rows cascade with their bucket.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Report triage tables
-- ================================================================

CREATE TABLE IF NOT EXISTS apps (
    id              BIGSERIAL PRIMARY KEY,
    channel         VARCHAR(63),
    name            VARCHAR(63) NOT NULL,
    version         VARCHAR(127) NOT NULL,
    CONSTRAINT unique_app UNIQUE NULLS NOT DISTINCT (channel, name, version)
);

CREATE TABLE IF NOT EXISTS breakage_categories (
    id              BIGSERIAL PRIMARY KEY,
    value           VARCHAR(63) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS operating_systems (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(63) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS bug_providers (
    id              BIGSERIAL PRIMARY KEY,
    classname       VARCHAR(255) NOT NULL,
    hostname        VARCHAR(255) NOT NULL,
    url_template    VARCHAR(1023) NOT NULL
);

CREATE TABLE IF NOT EXISTS bugs (
    id              BIGSERIAL PRIMARY KEY,
    external_id     VARCHAR(255) NOT NULL DEFAULT '',
    provider_id     BIGINT NOT NULL REFERENCES bug_providers(id) ON DELETE CASCADE,
    closed          TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS buckets (
    id                   BIGSERIAL PRIMARY KEY,
    bug_id               BIGINT REFERENCES bugs(id) ON DELETE CASCADE,
    description          TEXT NOT NULL,
    domain               VARCHAR(255),
    hide_until           TIMESTAMPTZ,
    priority             INTEGER NOT NULL DEFAULT 0,
    signature            TEXT NOT NULL,
    reassign_in_progress BOOLEAN NOT NULL DEFAULT FALSE,
    create_date          TIMESTAMPTZ DEFAULT NOW(),
    write_date           TIMESTAMPTZ DEFAULT NOW(),
    CONSTRAINT priority_range CHECK (priority >= -2 AND priority <= 2)
);

CREATE INDEX IF NOT EXISTS idx_buckets_domain ON buckets (domain);
CREATE INDEX IF NOT EXISTS idx_buckets_priority ON buckets (priority);

CREATE TABLE IF NOT EXISTS report_entries (
    id                         BIGSERIAL PRIMARY KEY,
    app_id                     BIGINT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    breakage_category_id       BIGINT REFERENCES breakage_categories(id) ON DELETE CASCADE,
    bucket_id                  BIGINT REFERENCES buckets(id) ON DELETE CASCADE,
    comments                   TEXT NOT NULL,
    comments_translated        TEXT,
    comments_original_language TEXT,
    details                    JSONB NOT NULL,
    os_id                      BIGINT NOT NULL REFERENCES operating_systems(id) ON DELETE CASCADE,
    reported_at                TIMESTAMPTZ NOT NULL,
    url                        VARCHAR(8192) NOT NULL,
    uuid                       UUID NOT NULL UNIQUE,
    ml_valid_probability       DOUBLE PRECISION,
    create_date                TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_report_entries_bucket ON report_entries (bucket_id);
CREATE INDEX IF NOT EXISTS idx_report_entries_reported ON report_entries (reported_at);

CREATE TABLE IF NOT EXISTS bucket_hits (
    id              BIGSERIAL PRIMARY KEY,
    bucket_id       BIGINT NOT NULL REFERENCES buckets(id) ON DELETE CASCADE,
    begin_at        TIMESTAMPTZ NOT NULL,
    count           INTEGER NOT NULL DEFAULT 0,
    CONSTRAINT unique_buckethits UNIQUE (bucket_id, begin_at),
    CONSTRAINT count_not_negative CHECK (count >= 0)
);
"#;

/// Run the triage migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("triage migration failed: {e}"))?;
    Ok(())
}
