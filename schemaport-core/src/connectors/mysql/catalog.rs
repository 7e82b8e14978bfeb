//! INFORMATION_SCHEMA queries.
//!
//! Names are cast to CHAR because MySQL 8 reports them as VARBINARY.

use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, FieldRef, RelationCandidate};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Databases never enumerated unless explicitly scoped.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

fn text(row: &MySqlRow, column: &str) -> Result<String> {
    row.try_get(column).map_err(|e| {
        SchemaportError::listing_failed(format!("Failed to read column '{}'", column), e)
    })
}

pub(super) async fn list_databases(pool: &MySqlPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT CAST(SCHEMA_NAME AS CHAR) AS SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA ORDER BY SCHEMA_NAME",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| SchemaportError::listing_failed("Failed to enumerate databases", e))?;

    let mut databases = Vec::new();
    for row in &rows {
        let name = text(row, "SCHEMA_NAME")?;
        if !SYSTEM_DATABASES.contains(&name.to_lowercase().as_str()) {
            databases.push(name);
        }
    }
    Ok(databases)
}

pub(super) async fn list_tables(pool: &MySqlPool, database: &str) -> Result<Vec<EntityRef>> {
    let tables_query = r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ?
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let rows = sqlx::query(tables_query)
        .bind(database)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            SchemaportError::listing_failed(
                format!("Failed to enumerate tables in '{}'", database),
                e,
            )
        })?;

    rows.iter()
        .map(|row| Ok(EntityRef::new(Some(database.to_string()), text(row, "TABLE_NAME")?)))
        .collect()
}

pub(super) async fn primary_key_columns(
    pool: &MySqlPool,
    database: &str,
    table: &str,
) -> Result<Vec<String>> {
    let pk_query = r#"
        SELECT CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
        AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
    "#;

    let rows = sqlx::query(pk_query)
        .bind(database)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            SchemaportError::sampling_failed(
                format!("{}.{}", database, table),
                "failed to detect primary key",
                e,
            )
        })?;

    rows.iter().map(|row| text(row, "COLUMN_NAME")).collect()
}

pub(super) async fn foreign_keys(
    pool: &MySqlPool,
    database: Option<&str>,
) -> Result<Vec<RelationCandidate>> {
    let fk_query = r#"
        SELECT
            CAST(kcu.TABLE_SCHEMA AS CHAR) AS TABLE_SCHEMA,
            CAST(kcu.TABLE_NAME AS CHAR) AS TABLE_NAME,
            CAST(kcu.COLUMN_NAME AS CHAR) AS COLUMN_NAME,
            CAST(kcu.REFERENCED_TABLE_SCHEMA AS CHAR) AS REFERENCED_TABLE_SCHEMA,
            CAST(kcu.REFERENCED_TABLE_NAME AS CHAR) AS REFERENCED_TABLE_NAME,
            CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR) AS REFERENCED_COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
        WHERE kcu.REFERENCED_TABLE_NAME IS NOT NULL
        AND kcu.TABLE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
        AND (? IS NULL OR kcu.TABLE_SCHEMA = ?)
        ORDER BY kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
    "#;

    let rows = sqlx::query(fk_query)
        .bind(database)
        .bind(database)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaportError::listing_failed("Failed to collect foreign keys", e))?;

    rows.iter()
        .map(|row| {
            let from = FieldRef::new(
                format!("{}.{}", text(row, "TABLE_SCHEMA")?, text(row, "TABLE_NAME")?),
                text(row, "COLUMN_NAME")?,
            );
            let to = FieldRef::new(
                format!(
                    "{}.{}",
                    text(row, "REFERENCED_TABLE_SCHEMA")?,
                    text(row, "REFERENCED_TABLE_NAME")?
                ),
                text(row, "REFERENCED_COLUMN_NAME")?,
            );
            Ok(RelationCandidate::declared(from, to))
        })
        .collect()
}
