//! Row mapping between Postgres and [`Value`]s.

use super::Value;
use postgres_types::Format;
use std::error::Error as StdError;
use tokio_postgres::types::{IsNull, ToSql, Type as PgTypeInfo};

/// A row of data as field name → value pairs, in column order.
pub type Row = Vec<(String, Value)>;

/// Convert a tokio_postgres Row to our Row type.
pub fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Result<Row, tokio_postgres::Error> {
    let mut row = Vec::with_capacity(pg_row.len());
    for (i, column) in pg_row.columns().iter().enumerate() {
        let value: Value = pg_row.try_get(i)?;
        row.push((column.name().to_string(), value));
    }
    Ok(row)
}

/// Wrapper to make our Value usable as a ToSql parameter.
///
/// Values are sent in Postgres text format, so the server parses them with
/// the input function of whatever type it inferred for the placeholder, the
/// same way it would parse a quoted literal.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        _ty: &PgTypeInfo,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Unsupported(ty) => {
                Err(format!("cannot send a value of unsupported type {} as a parameter", ty).into())
            }
            other => {
                out.extend_from_slice(other.to_text().unwrap_or_default().as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &PgTypeInfo) -> bool {
        true
    }

    fn encode_format(&self, _ty: &PgTypeInfo) -> Format {
        Format::Text
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Wrap every value of `values` as a text-format parameter.
pub fn sql_params<'a, I>(values: I) -> Vec<SqlParam<'a>>
where
    I: IntoIterator<Item = &'a Value>,
{
    values.into_iter().map(SqlParam).collect()
}

/// Borrow a parameter list the way tokio-postgres wants it.
pub fn param_refs<'a>(params: &'a [SqlParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Text forms of `values`, for [`pgconverge_sql::render_bound`].
pub fn audit_texts<'a, I>(values: I) -> Vec<Option<String>>
where
    I: IntoIterator<Item = &'a Value>,
{
    values.into_iter().map(Value::to_text).collect()
}

/// Render `sql` with `values` inlined, for display only.
pub fn render_executed(sql: &str, texts: &[Option<String>]) -> String {
    let borrowed: Vec<Option<&str>> = texts.iter().map(|t| t.as_deref()).collect();
    pgconverge_sql::render_bound(sql, &borrowed)
}
