//! Table reconciliation: diff, plan, apply.

use tokio_postgres::Client;

use crate::converge::{self, Action, ColumnStrategy};
use crate::desired::{DesiredTable, Presence};
use crate::diff::{self, SchemaDiff};
use crate::Result;

/// Knobs for [`reconcile_table`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Report what would change without touching the database.
    pub check_only: bool,
    pub column_strategy: ColumnStrategy,
}

/// Result of reconciling one table.
#[derive(Debug, Clone)]
pub struct TableOutcome {
    pub changed: bool,
    /// The difference observed before anything was applied.
    pub diff: SchemaDiff,
    /// Non-bookkeeping steps that ran (empty in check mode).
    pub actions_applied: Vec<String>,
}

/// Bring `desired.schema.desired.name` to the desired shape.
///
/// In check mode only the diff is computed. Otherwise every step runs inside
/// a single transaction that is rolled back on the first failure.
pub async fn reconcile_table(
    client: &mut Client,
    desired: &DesiredTable,
    options: &ReconcileOptions,
) -> Result<TableOutcome> {
    desired.validate()?;

    let diff = diff::diff(&*client, desired).await?;

    let changed = match desired.state {
        Presence::Absent => diff.exists,
        Presence::Present => !diff.is_converged(),
    };

    if options.check_only || !changed {
        tracing::info!(
            schema = %desired.schema,
            table = %desired.name,
            changed,
            check_only = options.check_only,
            "nothing applied"
        );
        return Ok(TableOutcome {
            changed,
            diff,
            actions_applied: Vec::new(),
        });
    }

    let actions = match desired.state {
        Presence::Absent => converge::plan_absent(&diff),
        Presence::Present => converge::plan(desired, &diff, options.column_strategy),
    };
    let changes: Vec<&Action> = actions.iter().filter(|a| !a.is_bookkeeping()).collect();

    converge::apply(client, &desired.schema, &desired.name, &actions).await?;
    tracing::info!(
        schema = %desired.schema,
        table = %desired.name,
        steps = changes.len(),
        "table converged"
    );

    let actions_applied = changes.iter().map(|a| a.to_string()).collect();
    Ok(TableOutcome {
        changed: !changes.is_empty(),
        diff,
        actions_applied,
    })
}
