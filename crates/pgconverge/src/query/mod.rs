//! Ad-hoc statements with bound parameters.

mod row;
mod value;

pub use row::{Row, SqlParam, audit_texts, param_refs, pg_row_to_row, render_executed, sql_params};
pub use value::Value;

use tokio_postgres::Client;

use crate::traced::{ConnectionExt, rollback_after_failure};
use crate::{Error, Result};

/// Result of [`run_query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// The statement with its parameters inlined, for display.
    pub executed_query: String,
    pub rows: Vec<Row>,
    /// Rows returned, or rows affected for statements that return none.
    pub row_count: u64,
    pub committed: bool,
}

/// Run one statement inside a transaction.
///
/// Parameters travel as `$1`, `$2`, ... in Postgres text format. The
/// transaction is rolled back afterwards unless `commit` is set.
pub async fn run_query(
    client: &mut Client,
    sql: &str,
    params: &[Value],
    commit: bool,
) -> Result<QueryOutcome> {
    let bound = sql_params(params);
    let refs = param_refs(&bound);
    let executed_query = render_executed(sql, &audit_texts(params));

    let tx = client
        .transaction()
        .await
        .map_err(|e| Error::statement("BEGIN", e))?;

    let result = async {
        let statement = tx.traced().prepare(sql).await?;
        if statement.columns().is_empty() {
            let affected = tx.traced().execute(sql, &refs).await?;
            return Ok::<_, Error>((Vec::new(), affected));
        }
        let pg_rows = tx.traced().query(sql, &refs).await?;
        let rows = pg_rows
            .iter()
            .map(pg_row_to_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::statement(sql, e))?;
        let count = rows.len() as u64;
        Ok((rows, count))
    }
    .await;

    let (rows, row_count) = match result {
        Ok(r) => r,
        Err(e) => {
            rollback_after_failure(tx, &e).await;
            return Err(e);
        }
    };

    if commit {
        tx.commit()
            .await
            .map_err(|e| Error::statement("COMMIT", e))?;
    } else {
        tx.rollback()
            .await
            .map_err(|e| Error::statement("ROLLBACK", e))?;
    }
    tracing::info!(rows = row_count, committed = commit, "query finished");

    Ok(QueryOutcome {
        executed_query,
        rows,
        row_count,
        committed: commit,
    })
}
