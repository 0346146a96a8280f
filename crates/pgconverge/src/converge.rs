//! Turning a [`SchemaDiff`] into DDL and applying it.
//!
//! [`plan`] is pure and orders the actions; [`apply`] runs them inside one
//! transaction. A guard column keeps the table non-empty while its real
//! columns are dropped and re-added, and is removed last.

use std::fmt;

use pgconverge_sql::{ident_list, pkey_constraint_name, Ident, Qualified};
use tokio_postgres::Client;

use crate::desired::{DesiredColumn, DesiredTable, GUARD_COLUMN};
use crate::diff::{DesiredColumnStatus, LiveColumnStatus, PrimaryKeyStatus, SchemaDiff};
use crate::traced::{rollback_after_failure, ConnectionExt};
use crate::Result;

/// What to do with a column whose type or nullability is wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnStrategy {
    /// Drop the column and add it back. Its data is lost.
    #[default]
    Recreate,
    /// `ALTER COLUMN ... TYPE ... USING` and `SET/DROP NOT NULL`. Keeps data,
    /// fails when existing values do not cast.
    Alter,
}

/// One DDL step.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create the table with only the guard column.
    CreateTable,
    AddGuardColumn,
    DropGuardColumn,
    SetOwner(String),
    DropColumn(String),
    AddColumn(DesiredColumn),
    AlterColumnType { name: String, sql_type: String },
    AlterColumnNullable { name: String, nullable: bool },
    /// Drop the primary key constraint with this name, if it exists.
    DropPrimaryKey(String),
    AddPrimaryKey(Vec<String>),
    DropTable,
}

impl Action {
    /// Guard column steps do not count as changes.
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self, Action::AddGuardColumn | Action::DropGuardColumn)
    }

    /// SQL for this step against `schema.table`.
    ///
    /// Identifiers are quoted; column types are engine-native type names and
    /// are emitted as given.
    pub fn to_sql(&self, schema: &str, table: &str) -> String {
        let t = Qualified(schema, table);
        match self {
            Action::CreateTable => {
                format!("CREATE TABLE {} ({} TEXT)", t, Ident(GUARD_COLUMN))
            }
            Action::AddGuardColumn => {
                format!("ALTER TABLE {} ADD COLUMN {} TEXT", t, Ident(GUARD_COLUMN))
            }
            Action::DropGuardColumn => {
                format!(
                    "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
                    t,
                    Ident(GUARD_COLUMN)
                )
            }
            Action::SetOwner(owner) => format!("ALTER TABLE {} OWNER TO {}", t, Ident(owner)),
            Action::DropColumn(name) => format!("ALTER TABLE {} DROP COLUMN {}", t, Ident(name)),
            Action::AddColumn(col) => {
                let not_null = if col.nullable { "" } else { " NOT NULL" };
                format!(
                    "ALTER TABLE {} ADD COLUMN {} {}{}",
                    t,
                    Ident(&col.name),
                    col.sql_type,
                    not_null
                )
            }
            Action::AlterColumnType { name, sql_type } => format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                t,
                Ident(name),
                sql_type,
                Ident(name),
                sql_type
            ),
            Action::AlterColumnNullable { name, nullable } => {
                let op = if *nullable { "DROP" } else { "SET" };
                format!("ALTER TABLE {} ALTER COLUMN {} {} NOT NULL", t, Ident(name), op)
            }
            Action::DropPrimaryKey(name) => {
                format!("ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}", t, Ident(name))
            }
            Action::AddPrimaryKey(cols) => {
                format!("ALTER TABLE {} ADD PRIMARY KEY ({})", t, ident_list(cols))
            }
            Action::DropTable => format!("DROP TABLE {}", t),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateTable => write!(f, "+ table"),
            Action::AddGuardColumn => write!(f, "+ {}", GUARD_COLUMN),
            Action::DropGuardColumn => write!(f, "- {}", GUARD_COLUMN),
            Action::SetOwner(owner) => write!(f, "~ owner -> {}", owner),
            Action::DropColumn(name) => write!(f, "- {}", name),
            Action::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.sql_type, nullable)
            }
            Action::AlterColumnType { name, sql_type } => write!(f, "~ {}: -> {}", name, sql_type),
            Action::AlterColumnNullable { name, nullable } => {
                let to = if *nullable { "nullable" } else { "not null" };
                write!(f, "~ {}: -> {}", name, to)
            }
            Action::DropPrimaryKey(name) => write!(f, "- constraint {}", name),
            Action::AddPrimaryKey(cols) => write!(f, "+ PRIMARY KEY ({})", cols.join(", ")),
            Action::DropTable => write!(f, "- table"),
        }
    }
}

/// Order the steps that take the live table to `desired`.
///
/// Returns an empty plan for a converged diff.
pub fn plan(desired: &DesiredTable, diff: &SchemaDiff, strategy: ColumnStrategy) -> Vec<Action> {
    if diff.is_converged() {
        return Vec::new();
    }

    let mut actions = Vec::new();

    actions.push(if diff.exists {
        Action::AddGuardColumn
    } else {
        Action::CreateTable
    });

    if diff.owner_mismatch == Some(true) || (!diff.exists && !desired.owner.is_empty()) {
        actions.push(Action::SetOwner(desired.owner.clone()));
    }

    let recreate = strategy == ColumnStrategy::Recreate;

    for (name, status) in &diff.live_columns {
        let drop = match status {
            LiveColumnStatus::AbsentInDesired => true,
            LiveColumnStatus::NeedsChange(_) => recreate,
            LiveColumnStatus::Matched => false,
        };
        if drop {
            actions.push(Action::DropColumn(name.clone()));
        }
    }

    let mut recreated = Vec::new();
    let columns = desired.effective_columns();
    for col in &columns {
        match diff.desired_status(&col.name) {
            Some(DesiredColumnStatus::Pending) | None => {
                actions.push(Action::AddColumn(col.clone()));
            }
            Some(DesiredColumnStatus::NeedsChange(mismatch)) => {
                if recreate {
                    recreated.push(col.name.as_str());
                    actions.push(Action::AddColumn(col.clone()));
                } else {
                    if mismatch.type_differs() {
                        actions.push(Action::AlterColumnType {
                            name: col.name.clone(),
                            sql_type: col.sql_type.clone(),
                        });
                    }
                    if mismatch.nullability_differs() {
                        actions.push(Action::AlterColumnNullable {
                            name: col.name.clone(),
                            nullable: col.nullable,
                        });
                    }
                }
            }
            Some(DesiredColumnStatus::Matched) => {}
        }
    }

    // Dropping a column takes its primary key constraint with it.
    let pk_touched = desired
        .primary_key
        .iter()
        .any(|c| recreated.contains(&c.as_str()));
    let pk_matched = diff.primary_key == Some(PrimaryKeyStatus::Matched);
    let pk_absent_everywhere = !diff.exists && desired.primary_key.is_empty();
    if (!pk_matched || pk_touched) && !pk_absent_everywhere {
        let name = diff
            .primary_key_name
            .clone()
            .unwrap_or_else(|| pkey_constraint_name(&desired.name));
        if diff.exists {
            actions.push(Action::DropPrimaryKey(name));
        }
        if !desired.primary_key.is_empty() {
            actions.push(Action::AddPrimaryKey(desired.primary_key.clone()));
        }
    }

    actions.push(Action::DropGuardColumn);
    actions
}

/// Steps for a table that should not exist.
pub fn plan_absent(diff: &SchemaDiff) -> Vec<Action> {
    if diff.exists {
        vec![Action::DropTable]
    } else {
        Vec::new()
    }
}

/// Run `actions` against `schema.table` in one transaction.
///
/// Rolls back and returns the first failure; commits otherwise.
pub async fn apply(client: &mut Client, schema: &str, table: &str, actions: &[Action]) -> Result<()> {
    if actions.is_empty() {
        return Ok(());
    }

    let tx = client
        .transaction()
        .await
        .map_err(|e| crate::Error::statement("BEGIN", e))?;

    for action in actions {
        let sql = action.to_sql(schema, table);
        tracing::info!(schema, table, action = %action, "applying");
        if let Err(e) = tx.traced().execute(&sql, &[]).await {
            rollback_after_failure(tx, &e).await;
            return Err(e);
        }
    }

    tx.commit()
        .await
        .map_err(|e| crate::Error::statement("COMMIT", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{LiveColumn, LivePrimaryKey, LiveState, LiveTable};

    fn live_col(name: &str, ty: &str, not_null: bool, ordinal: i16) -> LiveColumn {
        LiveColumn {
            name: name.to_string(),
            formatted_type: ty.to_string(),
            not_null,
            ordinal,
        }
    }

    fn live_state(columns: Vec<LiveColumn>, pk: Option<&str>) -> LiveState {
        LiveState {
            table: LiveTable {
                oid: 1,
                schema: "public".to_string(),
                name: "config".to_string(),
                owner: "postgres".to_string(),
            },
            columns,
            primary_key: pk.map(|d| LivePrimaryKey {
                name: "config_pkey".to_string(),
                definition: d.to_string(),
            }),
        }
    }

    fn desired() -> DesiredTable {
        DesiredTable::new("config")
            .column(DesiredColumn::new("key", "text").not_null())
            .column(DesiredColumn::new("value", "text"))
            .primary_key(["key"])
    }

    fn render_one(actions: &[Action], idx: usize) -> String {
        actions[idx].to_sql("public", "config")
    }

    fn render(actions: &[Action]) -> String {
        actions
            .iter()
            .map(|a| a.to_sql("public", "config"))
            .collect::<Vec<_>>()
            .join(";\n")
    }

    #[test]
    fn test_plan_create() {
        let table = desired();
        let diff = SchemaDiff::compute(&table, None);
        let actions = plan(&table, &diff, ColumnStrategy::Recreate);
        insta::assert_snapshot!(render(&actions), @r#"
        CREATE TABLE "public"."config" ("__pgconverge_guard__" TEXT);
        ALTER TABLE "public"."config" ADD COLUMN "key" text NOT NULL;
        ALTER TABLE "public"."config" ADD COLUMN "value" text;
        ALTER TABLE "public"."config" ADD PRIMARY KEY ("key");
        ALTER TABLE "public"."config" DROP COLUMN IF EXISTS "__pgconverge_guard__"
        "#);
    }

    #[test]
    fn test_nullable_key_column_converges_after_create() {
        let table = DesiredTable::new("config")
            .column(DesiredColumn::new("id", "integer"))
            .primary_key(["id"]);

        let created = plan(&table, &SchemaDiff::compute(&table, None), ColumnStrategy::Recreate);
        assert!(render_one(&created, 1).ends_with("\"id\" integer NOT NULL"));

        // What Postgres reports once ADD PRIMARY KEY has run.
        let state = live_state(
            vec![live_col("id", "integer", true, 1)],
            Some("PRIMARY KEY (id)"),
        );
        let diff = SchemaDiff::compute(&table, Some(&state));
        assert!(diff.is_converged());
        assert!(plan(&table, &diff, ColumnStrategy::Alter).is_empty());
    }

    #[test]
    fn test_plan_converged_is_empty() {
        let table = desired();
        let state = live_state(
            vec![
                live_col("key", "text", true, 1),
                live_col("value", "text", false, 2),
            ],
            Some("PRIMARY KEY (key)"),
        );
        let diff = SchemaDiff::compute(&table, Some(&state));
        assert!(plan(&table, &diff, ColumnStrategy::Recreate).is_empty());
    }

    #[test]
    fn test_plan_recreate_drops_in_ordinal_order() {
        let table = desired().owned_by("app");
        let state = live_state(
            vec![
                live_col("old_b", "text", false, 1),
                live_col("value", "integer", false, 2),
                live_col("old_a", "text", false, 3),
                live_col("key", "text", true, 4),
            ],
            Some("PRIMARY KEY (key)"),
        );
        let diff = SchemaDiff::compute(&table, Some(&state));
        let actions = plan(&table, &diff, ColumnStrategy::Recreate);
        insta::assert_snapshot!(render(&actions), @r#"
        ALTER TABLE "public"."config" ADD COLUMN "__pgconverge_guard__" TEXT;
        ALTER TABLE "public"."config" OWNER TO "app";
        ALTER TABLE "public"."config" DROP COLUMN "old_b";
        ALTER TABLE "public"."config" DROP COLUMN "value";
        ALTER TABLE "public"."config" DROP COLUMN "old_a";
        ALTER TABLE "public"."config" ADD COLUMN "value" text;
        ALTER TABLE "public"."config" DROP COLUMN IF EXISTS "__pgconverge_guard__"
        "#);
    }

    #[test]
    fn test_plan_recreating_a_key_column_restores_the_primary_key() {
        let table = desired();
        let state = live_state(
            vec![
                live_col("key", "character varying(10)", true, 1),
                live_col("value", "text", false, 2),
            ],
            Some("PRIMARY KEY (key)"),
        );
        let diff = SchemaDiff::compute(&table, Some(&state));
        let actions = plan(&table, &diff, ColumnStrategy::Recreate);
        assert_eq!(
            actions,
            vec![
                Action::AddGuardColumn,
                Action::DropColumn("key".into()),
                Action::AddColumn(DesiredColumn::new("key", "text").not_null()),
                Action::DropPrimaryKey("config_pkey".into()),
                Action::AddPrimaryKey(vec!["key".into()]),
                Action::DropGuardColumn,
            ]
        );
    }

    #[test]
    fn test_plan_alter_strategy() {
        let table = desired();
        let state = live_state(
            vec![
                live_col("key", "text", false, 1),
                live_col("value", "character varying(10)", true, 2),
            ],
            Some("PRIMARY KEY (key)"),
        );
        let diff = SchemaDiff::compute(&table, Some(&state));
        let actions = plan(&table, &diff, ColumnStrategy::Alter);
        insta::assert_snapshot!(render(&actions), @r#"
        ALTER TABLE "public"."config" ADD COLUMN "__pgconverge_guard__" TEXT;
        ALTER TABLE "public"."config" ALTER COLUMN "key" SET NOT NULL;
        ALTER TABLE "public"."config" ALTER COLUMN "value" TYPE text USING "value"::text;
        ALTER TABLE "public"."config" ALTER COLUMN "value" DROP NOT NULL;
        ALTER TABLE "public"."config" DROP COLUMN IF EXISTS "__pgconverge_guard__"
        "#);
    }

    #[test]
    fn test_plan_drops_unwanted_primary_key_by_live_name() {
        let table = desired().primary_key(Vec::<String>::new());
        let mut state = live_state(
            vec![
                live_col("key", "text", true, 1),
                live_col("value", "text", false, 2),
            ],
            Some("PRIMARY KEY (key)"),
        );
        if let Some(pk) = state.primary_key.as_mut() {
            pk.name = "legacy_pk".to_string();
        }
        let diff = SchemaDiff::compute(&table, Some(&state));
        let actions = plan(&table, &diff, ColumnStrategy::Recreate);
        assert_eq!(
            actions,
            vec![
                Action::AddGuardColumn,
                Action::DropPrimaryKey("legacy_pk".into()),
                Action::DropGuardColumn,
            ]
        );
        let changes: Vec<_> = actions.iter().filter(|a| !a.is_bookkeeping()).collect();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_plan_absent() {
        let table = desired().absent();
        assert!(plan_absent(&SchemaDiff::compute(&table, None)).is_empty());

        let state = live_state(vec![live_col("key", "text", true, 1)], None);
        let actions = plan_absent(&SchemaDiff::compute(&table, Some(&state)));
        assert_eq!(render(&actions), r#"DROP TABLE "public"."config""#);
    }

    #[test]
    fn test_action_display() {
        assert_eq!(
            Action::AddColumn(DesiredColumn::new("value", "text")).to_string(),
            "+ value: text (nullable)"
        );
        assert_eq!(
            Action::AddPrimaryKey(vec!["a".into(), "b".into()]).to_string(),
            "+ PRIMARY KEY (a, b)"
        );
        assert_eq!(
            Action::DropPrimaryKey("config_pkey".into()).to_string(),
            "- constraint config_pkey"
        );
        assert!(Action::DropGuardColumn.is_bookkeeping());
        assert!(!Action::DropTable.is_bookkeeping());
    }
}
