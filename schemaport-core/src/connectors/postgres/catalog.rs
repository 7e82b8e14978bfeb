//! Catalog queries: tables, primary keys and foreign keys.

use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, FieldRef, RelationCandidate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

fn text(row: &PgRow, column: &str) -> Result<String> {
    row.try_get(column).map_err(|e| {
        SchemaportError::listing_failed(format!("Failed to read column '{}'", column), e)
    })
}

/// Base tables visible to the session, ordered by schema then name.
pub(super) async fn list_tables(pool: &PgPool, schema: Option<&str>) -> Result<Vec<EntityRef>> {
    let tables_query = r#"
        SELECT t.table_schema::text AS table_schema, t.table_name::text AS table_name
        FROM information_schema.tables t
        WHERE t.table_type = 'BASE TABLE'
        AND t.table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
        AND ($1::text IS NULL OR t.table_schema = $1)
        AND has_table_privilege(quote_ident(t.table_schema) || '.' || quote_ident(t.table_name), 'SELECT')
        ORDER BY t.table_schema, t.table_name
    "#;

    let rows = sqlx::query(tables_query)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to enumerate tables: {}", e);
            SchemaportError::listing_failed("Failed to enumerate database tables", e)
        })?;

    rows.iter()
        .map(|row| {
            Ok(EntityRef::new(
                Some(text(row, "table_schema")?),
                text(row, "table_name")?,
            ))
        })
        .collect()
}

/// Primary key columns in key order; empty when the table has none.
pub(super) async fn primary_key_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    let pk_query = r#"
        SELECT a.attname::text AS column_name
        FROM pg_index i
        JOIN pg_class c ON c.oid = i.indrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey)
        WHERE i.indisprimary = true
        AND c.relname = $1
        AND n.nspname = $2
        ORDER BY array_position(i.indkey, a.attnum)
    "#;

    let rows = sqlx::query(pk_query)
        .bind(table)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            SchemaportError::sampling_failed(
                format!("{}.{}", schema, table),
                "failed to detect primary key",
                e,
            )
        })?;

    rows.iter().map(|row| text(row, "column_name")).collect()
}

/// Foreign key column pairs, one candidate per column of each constraint.
pub(super) async fn foreign_keys(
    pool: &PgPool,
    schema: Option<&str>,
) -> Result<Vec<RelationCandidate>> {
    let fk_query = r#"
        SELECT
            ns.nspname::text AS table_schema,
            cl.relname::text AS table_name,
            a.attname::text AS column_name,
            fns.nspname::text AS referenced_schema,
            fcl.relname::text AS referenced_table,
            fa.attname::text AS referenced_column
        FROM pg_constraint con
        JOIN pg_class cl ON con.conrelid = cl.oid
        JOIN pg_namespace ns ON cl.relnamespace = ns.oid
        JOIN pg_class fcl ON con.confrelid = fcl.oid
        JOIN pg_namespace fns ON fcl.relnamespace = fns.oid
        JOIN pg_attribute a ON a.attrelid = con.conrelid
        JOIN pg_attribute fa ON fa.attrelid = con.confrelid
        WHERE con.contype = 'f'
        AND ns.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
        AND ($1::text IS NULL OR ns.nspname = $1)
        AND a.attnum = ANY(con.conkey)
        AND fa.attnum = ANY(con.confkey)
        AND array_position(con.conkey, a.attnum) = array_position(con.confkey, fa.attnum)
        ORDER BY ns.nspname, cl.relname, con.conname, array_position(con.conkey, a.attnum)
    "#;

    let rows = sqlx::query(fk_query)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaportError::listing_failed("Failed to collect foreign keys", e))?;

    rows.iter()
        .map(|row| {
            let from = FieldRef::new(
                format!("{}.{}", text(row, "table_schema")?, text(row, "table_name")?),
                text(row, "column_name")?,
            );
            let to = FieldRef::new(
                format!(
                    "{}.{}",
                    text(row, "referenced_schema")?,
                    text(row, "referenced_table")?
                ),
                text(row, "referenced_column")?,
            );
            Ok(RelationCandidate::declared(from, to))
        })
        .collect()
}
