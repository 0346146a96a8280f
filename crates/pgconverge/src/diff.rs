//! Schema diffing - compare a desired table against what the catalog reports.
//!
//! [`SchemaDiff::compute`] is pure: it takes the desired table and an optional
//! [`LiveState`] snapshot and classifies every column on both sides, the
//! owner and the primary key. The converger reads the result and never
//! changes it.
//!
//! ```text
//! public.config:
//!   ~ owner: postgres -> app
//!   - legacy
//!   ~ value: text -> integer
//!   + created_at: timestamp with time zone (not null)
//!   ~ PRIMARY KEY (id) -> PRIMARY KEY (key)
//! ```

use std::fmt;

use crate::desired::{DesiredColumn, DesiredTable};
use crate::inspect::{self, LiveColumn, LiveState};
use crate::traced::Connection;
use crate::Result;

/// How a live column compares with the desired columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnComparison {
    /// A desired column has the same name.
    pub found: bool,
    pub type_match: bool,
    pub null_match: bool,
}

impl ColumnComparison {
    pub fn is_match(&self) -> bool {
        self.found && self.type_match && self.null_match
    }
}

/// Compare one live column against the desired column list.
///
/// Types are compared case-insensitively as text: `int4` and `integer` are
/// different types here.
pub fn compare_column(live: &LiveColumn, desired: &[DesiredColumn]) -> ColumnComparison {
    match desired.iter().find(|d| d.name == live.name) {
        None => ColumnComparison {
            found: false,
            type_match: false,
            null_match: false,
        },
        Some(d) => ColumnComparison {
            found: true,
            type_match: types_equal(&live.formatted_type, &d.sql_type),
            null_match: live.not_null == !d.nullable,
        },
    }
}

fn types_equal(live: &str, desired: &str) -> bool {
    live.trim().to_lowercase() == desired.trim().to_lowercase()
}

/// What differs between a live column and its desired counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMismatch {
    pub live_type: String,
    pub desired_type: String,
    pub live_nullable: bool,
    pub desired_nullable: bool,
}

impl ColumnMismatch {
    fn new(live: &LiveColumn, desired: &DesiredColumn) -> Self {
        Self {
            live_type: live.formatted_type.clone(),
            desired_type: desired.sql_type.clone(),
            live_nullable: !live.not_null,
            desired_nullable: desired.nullable,
        }
    }

    pub fn type_differs(&self) -> bool {
        !types_equal(&self.live_type, &self.desired_type)
    }

    pub fn nullability_differs(&self) -> bool {
        self.live_nullable != self.desired_nullable
    }
}

/// Status of a column that exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveColumnStatus {
    Matched,
    NeedsChange(ColumnMismatch),
    /// Not part of the desired table; will be dropped.
    AbsentInDesired,
}

/// Status of a column the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredColumnStatus {
    Matched,
    NeedsChange(ColumnMismatch),
    /// Not in the database yet; will be created.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKeyStatus {
    Matched,
    Mismatched,
    AbsentWhenWanted,
    PresentWhenUnwanted,
}

/// Render the definition Postgres reports for a primary key on `columns`.
///
/// Returns `None` for an empty column list.
pub fn primary_key_definition(columns: &[String]) -> Option<String> {
    if columns.is_empty() {
        return None;
    }
    let cols: Vec<String> = columns
        .iter()
        .map(|c| pgconverge_sql::quote_ident_if_needed(c))
        .collect();
    Some(format!("PRIMARY KEY ({})", cols.join(", ")))
}

/// A snapshot of the difference between a desired table and the live one.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiff {
    pub schema: String,
    pub table: String,
    pub exists: bool,
    /// `None` while the table does not exist.
    pub owner_mismatch: Option<bool>,
    pub live_owner: Option<String>,
    pub desired_owner: String,
    /// Live columns in ordinal order.
    pub live_columns: Vec<(String, LiveColumnStatus)>,
    /// Desired columns in desired order.
    pub desired_columns: Vec<(String, DesiredColumnStatus)>,
    /// `None` while the table does not exist.
    pub primary_key: Option<PrimaryKeyStatus>,
    /// Live primary key constraint name, when there is one.
    pub primary_key_name: Option<String>,
    pub live_primary_key: Option<String>,
    pub desired_primary_key: Option<String>,
}

impl SchemaDiff {
    /// Classify `desired` against `live` (`None` = table does not exist).
    pub fn compute(desired: &DesiredTable, live: Option<&LiveState>) -> Self {
        let desired_primary_key = primary_key_definition(&desired.primary_key);
        let columns = desired.effective_columns();

        let Some(live) = live else {
            return Self {
                schema: desired.schema.clone(),
                table: desired.name.clone(),
                exists: false,
                owner_mismatch: None,
                live_owner: None,
                desired_owner: desired.owner.clone(),
                live_columns: Vec::new(),
                desired_columns: columns
                    .iter()
                    .map(|c| (c.name.clone(), DesiredColumnStatus::Pending))
                    .collect(),
                primary_key: None,
                primary_key_name: None,
                live_primary_key: None,
                desired_primary_key,
            };
        };

        let owner_mismatch = !desired.owner.is_empty() && live.table.owner != desired.owner;

        let mut desired_columns: Vec<(String, DesiredColumnStatus)> = columns
            .iter()
            .map(|c| (c.name.clone(), DesiredColumnStatus::Pending))
            .collect();

        let mut live_columns = Vec::with_capacity(live.columns.len());
        for live_col in &live.columns {
            let cmp = compare_column(live_col, &columns);
            let status = if !cmp.found {
                LiveColumnStatus::AbsentInDesired
            } else {
                let idx = columns.iter().position(|d| d.name == live_col.name);
                let Some(idx) = idx else {
                    continue;
                };
                if cmp.is_match() {
                    desired_columns[idx].1 = DesiredColumnStatus::Matched;
                    LiveColumnStatus::Matched
                } else {
                    let mismatch = ColumnMismatch::new(live_col, &columns[idx]);
                    desired_columns[idx].1 = DesiredColumnStatus::NeedsChange(mismatch.clone());
                    LiveColumnStatus::NeedsChange(mismatch)
                }
            };
            live_columns.push((live_col.name.clone(), status));
        }

        let live_primary_key = live.primary_key.as_ref().map(|pk| pk.definition.clone());
        let primary_key = match (&live_primary_key, &desired_primary_key) {
            (None, None) => PrimaryKeyStatus::Matched,
            (None, Some(_)) => PrimaryKeyStatus::AbsentWhenWanted,
            (Some(_), None) => PrimaryKeyStatus::PresentWhenUnwanted,
            (Some(l), Some(d)) if l == d => PrimaryKeyStatus::Matched,
            (Some(_), Some(_)) => PrimaryKeyStatus::Mismatched,
        };

        Self {
            schema: desired.schema.clone(),
            table: desired.name.clone(),
            exists: true,
            owner_mismatch: Some(owner_mismatch),
            live_owner: Some(live.table.owner.clone()),
            desired_owner: desired.owner.clone(),
            live_columns,
            desired_columns,
            primary_key: Some(primary_key),
            primary_key_name: live.primary_key.as_ref().map(|pk| pk.name.clone()),
            live_primary_key,
            desired_primary_key,
        }
    }

    /// True when the live table already is what the caller asked for.
    pub fn is_converged(&self) -> bool {
        self.exists
            && self.owner_mismatch != Some(true)
            && self
                .live_columns
                .iter()
                .all(|(_, s)| *s == LiveColumnStatus::Matched)
            && self
                .desired_columns
                .iter()
                .all(|(_, s)| *s == DesiredColumnStatus::Matched)
            && self.primary_key == Some(PrimaryKeyStatus::Matched)
    }

    pub fn desired_status(&self, name: &str) -> Option<&DesiredColumnStatus> {
        self.desired_columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn live_status(&self, name: &str) -> Option<&LiveColumnStatus> {
        self.live_columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }
}

/// Inspect the live table and diff it against `desired`.
pub async fn diff<C: Connection>(conn: &C, desired: &DesiredTable) -> Result<SchemaDiff> {
    let live = inspect::inspect(conn, &desired.schema, &desired.name).await?;
    Ok(SchemaDiff::compute(desired, live.as_ref()))
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "nullable" } else { "not null" }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}.{}:", self.schema, self.table)?;
        if !self.exists {
            writeln!(f, "  + table")?;
        }
        if self.owner_mismatch == Some(true) {
            writeln!(
                f,
                "  ~ owner: {} -> {}",
                self.live_owner.as_deref().unwrap_or("?"),
                self.desired_owner
            )?;
        }
        for (name, status) in &self.live_columns {
            match status {
                LiveColumnStatus::AbsentInDesired => writeln!(f, "  - {}", name)?,
                LiveColumnStatus::NeedsChange(m) => {
                    if m.type_differs() {
                        writeln!(f, "  ~ {}: {} -> {}", name, m.live_type, m.desired_type)?;
                    }
                    if m.nullability_differs() {
                        writeln!(
                            f,
                            "  ~ {}: {} -> {}",
                            name,
                            nullability(m.live_nullable),
                            nullability(m.desired_nullable)
                        )?;
                    }
                }
                LiveColumnStatus::Matched => {}
            }
        }
        for (name, status) in &self.desired_columns {
            if *status == DesiredColumnStatus::Pending {
                writeln!(f, "  + {}", name)?;
            }
        }
        match self.primary_key {
            Some(PrimaryKeyStatus::Mismatched) => writeln!(
                f,
                "  ~ {} -> {}",
                self.live_primary_key.as_deref().unwrap_or("?"),
                self.desired_primary_key.as_deref().unwrap_or("?")
            )?,
            Some(PrimaryKeyStatus::AbsentWhenWanted) => writeln!(
                f,
                "  + {}",
                self.desired_primary_key.as_deref().unwrap_or("?")
            )?,
            Some(PrimaryKeyStatus::PresentWhenUnwanted) => writeln!(
                f,
                "  - {}",
                self.live_primary_key.as_deref().unwrap_or("?")
            )?,
            Some(PrimaryKeyStatus::Matched) => {}
            None => {
                if let Some(pk) = &self.desired_primary_key {
                    writeln!(f, "  + {}", pk)?;
                }
            }
        }
        if self.is_converged() {
            writeln!(f, "  (no changes)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{LivePrimaryKey, LiveTable};

    fn live_col(name: &str, ty: &str, not_null: bool, ordinal: i16) -> LiveColumn {
        LiveColumn {
            name: name.to_string(),
            formatted_type: ty.to_string(),
            not_null,
            ordinal,
        }
    }

    fn live(columns: Vec<LiveColumn>, pk: Option<&str>) -> LiveState {
        LiveState {
            table: LiveTable {
                oid: 16384,
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

    #[test]
    fn test_column_classification() {
        let live = live_col("c", "text", true, 1);

        let exact = compare_column(&live, &[DesiredColumn::new("c", "TEXT").not_null()]);
        assert!(exact.is_match());

        let nullable = compare_column(&live, &[DesiredColumn::new("c", "text")]);
        assert_eq!(
            nullable,
            ColumnComparison {
                found: true,
                type_match: true,
                null_match: false
            }
        );

        let varchar = compare_column(&live, &[DesiredColumn::new("c", "varchar").not_null()]);
        assert!(varchar.found && !varchar.type_match && varchar.null_match);

        let missing = compare_column(&live, &[DesiredColumn::new("d", "text")]);
        assert!(!missing.found && !missing.is_match());
    }

    #[test]
    fn test_absent_table() {
        let diff = SchemaDiff::compute(&desired(), None);
        assert!(!diff.exists);
        assert_eq!(diff.owner_mismatch, None);
        assert!(diff.live_columns.is_empty());
        assert_eq!(diff.primary_key, None);
        assert!(diff
            .desired_columns
            .iter()
            .all(|(_, s)| *s == DesiredColumnStatus::Pending));
        assert!(!diff.is_converged());
        insta::assert_snapshot!(diff.to_string(), @r"
        public.config:
          + table
          + key
          + value
          + PRIMARY KEY (key)
        ");
    }

    #[test]
    fn test_converged_table() {
        let state = live(
            vec![
                live_col("key", "text", true, 1),
                live_col("value", "text", false, 2),
            ],
            Some("PRIMARY KEY (key)"),
        );
        let diff = SchemaDiff::compute(&desired(), Some(&state));
        assert!(diff.is_converged());
        assert_eq!(diff.owner_mismatch, Some(false));
        assert_eq!(diff.primary_key_name.as_deref(), Some("config_pkey"));
    }

    #[test]
    fn test_every_kind_of_difference() {
        let state = live(
            vec![
                live_col("id", "integer", true, 1),
                live_col("key", "text", false, 2),
                live_col("value", "character varying(10)", false, 3),
            ],
            Some("PRIMARY KEY (id)"),
        );
        let diff = SchemaDiff::compute(&desired().owned_by("app"), Some(&state));

        assert_eq!(diff.owner_mismatch, Some(true));
        assert_eq!(diff.live_status("id"), Some(&LiveColumnStatus::AbsentInDesired));
        assert!(matches!(
            diff.desired_status("key"),
            Some(DesiredColumnStatus::NeedsChange(m)) if m.nullability_differs() && !m.type_differs()
        ));
        assert!(matches!(
            diff.desired_status("value"),
            Some(DesiredColumnStatus::NeedsChange(m)) if m.type_differs() && !m.nullability_differs()
        ));
        assert_eq!(diff.primary_key, Some(PrimaryKeyStatus::Mismatched));
        assert!(!diff.is_converged());

        insta::assert_snapshot!(diff.to_string(), @r"
        public.config:
          ~ owner: postgres -> app
          - id
          ~ key: nullable -> not null
          ~ value: character varying(10) -> text
          ~ PRIMARY KEY (id) -> PRIMARY KEY (key)
        ");
    }

    #[test]
    fn test_primary_key_states() {
        let columns = vec![
            live_col("key", "text", true, 1),
            live_col("value", "text", false, 2),
        ];

        let without = SchemaDiff::compute(&desired(), Some(&live(columns.clone(), None)));
        assert_eq!(without.primary_key, Some(PrimaryKeyStatus::AbsentWhenWanted));

        let unwanted = SchemaDiff::compute(
            &desired().primary_key(Vec::<String>::new()),
            Some(&live(columns.clone(), Some("PRIMARY KEY (key)"))),
        );
        assert_eq!(unwanted.primary_key, Some(PrimaryKeyStatus::PresentWhenUnwanted));

        let neither = SchemaDiff::compute(
            &desired().primary_key(Vec::<String>::new()),
            Some(&live(columns, None)),
        );
        assert_eq!(neither.primary_key, Some(PrimaryKeyStatus::Matched));
        assert!(neither.is_converged());
    }

    #[test]
    fn test_primary_key_column_order_matters() {
        let table = DesiredTable::new("t")
            .column(DesiredColumn::new("a", "text").not_null())
            .column(DesiredColumn::new("b", "text").not_null())
            .primary_key(["b", "a"]);
        let state = live(
            vec![live_col("a", "text", true, 1), live_col("b", "text", true, 2)],
            Some("PRIMARY KEY (a, b)"),
        );
        let diff = SchemaDiff::compute(&table, Some(&state));
        assert_eq!(diff.primary_key, Some(PrimaryKeyStatus::Mismatched));
    }

    #[test]
    fn test_primary_key_definition_quotes_like_postgres() {
        let cols = vec!["tenant_id".to_string(), "User".to_string(), "order".to_string()];
        assert_eq!(
            primary_key_definition(&cols).as_deref(),
            Some(r#"PRIMARY KEY (tenant_id, "User", "order")"#)
        );
        assert_eq!(primary_key_definition(&[]), None);
    }
}
