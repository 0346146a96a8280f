//! Row reconciliation: make sure exactly one row matches a predicate, or none.

use pgconverge_sql::{ident_list, Ident, Qualified};
use tokio_postgres::Client;

use crate::desired::{Presence, RowTarget};
use crate::query::{audit_texts, param_refs, render_executed, sql_params};
use crate::traced::{rollback_after_failure, ConnectionExt};
use crate::{Error, Result};

/// Result of reconciling one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub changed: bool,
    /// The selection query with its values inlined, for display.
    pub executed_query: String,
    /// The INSERT or DELETE that ran, for display. `None` when nothing ran.
    pub executed_command: Option<String>,
    /// Rows that matched the predicate before any change.
    pub matched: i64,
}

/// `"c1" = $1 AND "c2" = $2 ...`
fn where_clause(target: &RowTarget) -> String {
    target
        .row
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{} = ${}", Ident(col), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn select_count_sql(target: &RowTarget) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        Qualified(&target.schema, &target.table),
        where_clause(target)
    )
}

fn insert_sql(target: &RowTarget) -> String {
    let columns: Vec<&str> = target.row.iter().map(|(c, _)| c.as_str()).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        Qualified(&target.schema, &target.table),
        ident_list(&columns),
        placeholders.join(", ")
    )
}

fn delete_sql(target: &RowTarget) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        Qualified(&target.schema, &target.table),
        where_clause(target)
    )
}

fn lock_sql(target: &RowTarget) -> String {
    format!(
        "LOCK TABLE {} IN ACCESS EXCLUSIVE MODE",
        Qualified(&target.schema, &target.table)
    )
}

/// Whether a row with `matched` existing matches must change to reach `state`.
fn needs_change(state: Presence, matched: i64) -> bool {
    match state {
        Presence::Present => matched != 1,
        Presence::Absent => matched == 1,
    }
}

/// Insert the row described by `target` if it is missing, or delete it if it
/// should be absent.
///
/// The table is locked for the whole transaction, so two reconcilers on the
/// same table never both insert. More than one matching row is an
/// [`Error::Ambiguity`]. In check mode the transaction is always rolled back.
pub async fn reconcile_row(
    client: &mut Client,
    target: &RowTarget,
    check_only: bool,
) -> Result<RowOutcome> {
    target.validate()?;

    let values: Vec<_> = target.row.iter().map(|(_, v)| v).collect();
    let params = sql_params(values.iter().copied());
    let refs = param_refs(&params);
    let texts = audit_texts(values.iter().copied());

    let select = select_count_sql(target);
    let executed_query = render_executed(&select, &texts);

    let tx = client
        .transaction()
        .await
        .map_err(|e| Error::statement("BEGIN", e))?;

    let observed = async {
        tx.traced().execute(&lock_sql(target), &[]).await?;
        let row = tx.traced().query_one(&select, &refs).await?;
        let count: i64 = row.try_get(0).map_err(|e| Error::statement(&select, e))?;
        Ok::<_, Error>(count)
    }
    .await;

    let matched = match observed {
        Ok(count) if count > 1 => {
            let err = Error::Ambiguity {
                query: executed_query,
                count,
            };
            rollback_after_failure(tx, &err).await;
            return Err(err);
        }
        Ok(count) => count,
        Err(e) => {
            rollback_after_failure(tx, &e).await;
            return Err(e);
        }
    };

    let changed = needs_change(target.state, matched);
    tracing::info!(
        schema = %target.schema,
        table = %target.table,
        matched,
        changed,
        state = %target.state,
        "row observed"
    );

    if check_only || !changed {
        tx.rollback()
            .await
            .map_err(|e| Error::statement("ROLLBACK", e))?;
        return Ok(RowOutcome {
            changed,
            executed_query,
            executed_command: None,
            matched,
        });
    }

    let command = match target.state {
        Presence::Present => insert_sql(target),
        Presence::Absent => delete_sql(target),
    };
    if let Err(e) = tx.traced().execute(&command, &refs).await {
        rollback_after_failure(tx, &e).await;
        return Err(e);
    }
    tx.commit()
        .await
        .map_err(|e| Error::statement("COMMIT", e))?;

    Ok(RowOutcome {
        changed,
        executed_query,
        executed_command: Some(render_executed(&command, &texts)),
        matched,
    })
}
