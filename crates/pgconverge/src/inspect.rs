//! Live catalog inspection.
//!
//! Reads `pg_catalog` for one table: whether it exists, who owns it, its
//! columns in ordinal order and its primary key constraint.

use crate::traced::{Connection, ConnectionExt};
use crate::{Error, Result};

/// A table found in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTable {
    pub oid: u32,
    pub schema: String,
    pub name: String,
    pub owner: String,
}

/// A column as the catalog reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub name: String,
    /// `pg_catalog.format_type` output, e.g. `character varying(10)`.
    pub formatted_type: String,
    pub not_null: bool,
    pub ordinal: i16,
}

/// The primary key constraint of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct LivePrimaryKey {
    pub name: String,
    /// `pg_get_constraintdef` output, e.g. `PRIMARY KEY (id)`.
    pub definition: String,
}

/// Everything the differ needs about an existing table.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveState {
    pub table: LiveTable,
    pub columns: Vec<LiveColumn>,
    pub primary_key: Option<LivePrimaryKey>,
}

const FIND_TABLE_SQL: &str = r#"
SELECT c.oid,
       n.nspname,
       c.relname,
       pg_catalog.pg_get_userbyid(c.relowner) AS owner
FROM pg_catalog.pg_class c
     LEFT JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname ~ ('^(' || $1::text || ')$')
  AND c.relname ~ ('^(' || $2::text || ')$')
  AND c.relkind = 'r'
ORDER BY 1, 2
"#;

const COLUMNS_SQL: &str = r#"
SELECT a.attname,
       pg_catalog.format_type(a.atttypid, a.atttypmod) AS formatted_type,
       a.attnotnull,
       a.attnum
FROM pg_catalog.pg_attribute a
WHERE a.attrelid = $1
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY a.attnum
"#;

const PRIMARY_KEY_SQL: &str = r#"
SELECT con.conname,
       pg_catalog.pg_get_constraintdef(con.oid, true) AS definition
FROM pg_catalog.pg_index i
     JOIN pg_catalog.pg_constraint con
       ON con.conrelid = i.indrelid
      AND con.conindid = i.indexrelid
      AND con.contype = 'p'
WHERE i.indrelid = $1
  AND i.indisprimary
"#;

fn read<'a, T>(row: &'a tokio_postgres::Row, sql: &str, column: &str) -> Result<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column).map_err(|e| Error::statement(sql, e))
}

/// Find the ordinary table whose schema and name match the given patterns.
///
/// Patterns are anchored regular expressions, so literal names find exactly
/// that table. Callers must not pass untrusted regex metacharacters.
pub async fn find_table<C: Connection>(
    conn: &C,
    schema_pattern: &str,
    table_pattern: &str,
) -> Result<Option<LiveTable>> {
    let rows = conn
        .traced()
        .query(FIND_TABLE_SQL, &[&schema_pattern, &table_pattern])
        .await?;

    if rows.len() > 1 {
        return Err(Error::AmbiguousMatch {
            schema: schema_pattern.to_string(),
            table: table_pattern.to_string(),
            count: rows.len(),
        });
    }

    let Some(row) = rows.first() else {
        return Ok(None);
    };

    Ok(Some(LiveTable {
        oid: read(row, FIND_TABLE_SQL, "oid")?,
        schema: read(row, FIND_TABLE_SQL, "nspname")?,
        name: read(row, FIND_TABLE_SQL, "relname")?,
        owner: read(row, FIND_TABLE_SQL, "owner")?,
    }))
}

/// Columns of a table in ordinal order, dropped columns excluded.
pub async fn columns_of<C: Connection>(conn: &C, oid: u32) -> Result<Vec<LiveColumn>> {
    let rows = conn.traced().query(COLUMNS_SQL, &[&oid]).await?;
    rows.iter()
        .map(|row| {
            Ok(LiveColumn {
                name: read(row, COLUMNS_SQL, "attname")?,
                formatted_type: read(row, COLUMNS_SQL, "formatted_type")?,
                not_null: read(row, COLUMNS_SQL, "attnotnull")?,
                ordinal: read(row, COLUMNS_SQL, "attnum")?,
            })
        })
        .collect()
}

/// The table's primary key constraint.
///
/// Returns `None` when there is no primary key index, and also when there is
/// more than one: that case is indistinguishable from "no primary key" here.
pub async fn primary_key_of<C: Connection>(conn: &C, oid: u32) -> Result<Option<LivePrimaryKey>> {
    let rows = conn.traced().query(PRIMARY_KEY_SQL, &[&oid]).await?;
    if rows.len() != 1 {
        return Ok(None);
    }
    let row = &rows[0];
    let definition: Option<String> = read(row, PRIMARY_KEY_SQL, "definition")?;
    let Some(definition) = definition else {
        return Ok(None);
    };
    Ok(Some(LivePrimaryKey {
        name: read(row, PRIMARY_KEY_SQL, "conname")?,
        definition,
    }))
}

/// Inspect `schema.name`. `None` when the table does not exist; no further
/// queries are made in that case.
pub async fn inspect<C: Connection>(conn: &C, schema: &str, name: &str) -> Result<Option<LiveState>> {
    let Some(table) = find_table(conn, schema, name).await? else {
        tracing::debug!(schema, name, "table not found");
        return Ok(None);
    };
    let columns = columns_of(conn, table.oid).await?;
    let primary_key = primary_key_of(conn, table.oid).await?;
    tracing::debug!(
        schema,
        name,
        owner = %table.owner,
        columns = columns.len(),
        primary_key = primary_key.as_ref().map(|pk| pk.definition.as_str()),
        "inspected table"
    );
    Ok(Some(LiveState {
        table,
        columns,
        primary_key,
    }))
}
