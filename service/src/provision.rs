//! One-time, idempotent setup of the watched table and its change trigger.
//!
//! Every statement is safe to re-run, so this executes on each start-up. The
//! trigger publishes each row change as a JSON document on the configured
//! `NOTIFY` channel:
//!
//! ```json
//! {"op": "insert", "new_val": {"id": 42, ...}, "old_val": null}
//! ```
//!
//! `NOTIFY` payloads are capped by PostgreSQL, and an error raised inside the
//! trigger would abort the writer's own statement. Rows too large to publish
//! are sent as an envelope carrying only their ids and `"truncated": true`, and
//! the database logs a warning. The write itself always goes through.

use crate::config::{validate_identifier, Config, ConfigError};
use log::*;
use sqlx::{Connection, PgConnection};
use std::error::Error as StdError;
use std::fmt;

/// PostgreSQL rejects `NOTIFY` payloads of this many bytes or more.
const NOTIFY_PAYLOAD_LIMIT: usize = 8000;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Config,
    Timeout,
    Database,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Provisioning failed ({:?}): {source}", self.error_kind),
            None => write!(f, "Provisioning failed ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Config,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Database,
        }
    }
}

/// Whether the watched table had to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExisted,
}

/// Create the schema, table, notify function and trigger if they are missing.
pub async fn provision_feed_table(config: &Config) -> Result<Provisioned, Error> {
    let schema = &config.feed_schema;
    let table = &config.feed_table;
    let channel = &config.feed_channel;
    validate_identifier("feed_schema", schema)?;
    validate_identifier("feed_table", table)?;
    validate_identifier("feed_channel", channel)?;

    let mut conn = tokio::time::timeout(
        config.db_connect_timeout(),
        PgConnection::connect(config.database_url()),
    )
    .await
    .map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Timeout,
    })??;

    let existed: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
        .bind(format!("{schema}.{table}"))
        .fetch_one(&mut conn)
        .await?;

    for statement in provision_statements(schema, table, channel) {
        sqlx::raw_sql(&statement).execute(&mut conn).await?;
    }
    conn.close().await?;

    let outcome = if existed {
        info!("Table {schema}.{table} already exists");
        Provisioned::AlreadyExisted
    } else {
        info!("Table {schema}.{table} created");
        Provisioned::Created
    };
    info!("Row changes on {schema}.{table} are published on channel {channel}");

    Ok(outcome)
}

/// DDL for the watched table and its trigger. Identifiers must already be validated.
fn provision_statements(schema: &str, table: &str, channel: &str) -> Vec<String> {
    let function = format!("{schema}.{table}_notify_change");
    let trigger = format!("{table}_notify_change");

    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.{table} (
                id BIGSERIAL PRIMARY KEY,
                body JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ),
        format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$
            DECLARE
                payload text;
            BEGIN
                payload := json_build_object(
                    'op', lower(TG_OP),
                    'new_val', CASE WHEN TG_OP = 'DELETE' THEN NULL ELSE row_to_json(NEW) END,
                    'old_val', CASE WHEN TG_OP = 'INSERT' THEN NULL ELSE row_to_json(OLD) END
                )::text;

                IF octet_length(payload) >= {NOTIFY_PAYLOAD_LIMIT} THEN
                    RAISE WARNING 'Change on %.% is % bytes, publishing row ids only',
                        TG_TABLE_SCHEMA, TG_TABLE_NAME, octet_length(payload);
                    payload := json_build_object(
                        'op', lower(TG_OP),
                        'new_val', CASE WHEN TG_OP = 'DELETE' THEN NULL
                            ELSE json_build_object('id', row_to_json(NEW)->'id') END,
                        'old_val', CASE WHEN TG_OP = 'INSERT' THEN NULL
                            ELSE json_build_object('id', row_to_json(OLD)->'id') END,
                        'truncated', true
                    )::text;
                END IF;

                IF octet_length(payload) >= {NOTIFY_PAYLOAD_LIMIT} THEN
                    RAISE WARNING 'Change on %.% not published: row id too large',
                        TG_TABLE_SCHEMA, TG_TABLE_NAME;
                ELSE
                    PERFORM pg_notify('{channel}', payload);
                END IF;
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql"
        ),
        format!("DROP TRIGGER IF EXISTS {trigger} ON {schema}.{table}"),
        format!(
            "CREATE TRIGGER {trigger}
                AFTER INSERT OR UPDATE OR DELETE ON {schema}.{table}
                FOR EACH ROW EXECUTE FUNCTION {function}()"
        ),
    ]
}
