//! Declarative convergence for Postgres tables and rows.
//!
//! Describe what a table (or a single row) should look like and pgconverge
//! inspects the catalog, works out the difference and applies the smallest
//! set of statements that removes it. Running the same description twice
//! changes nothing the second time.
//!
//! ```ignore
//! use pgconverge::{DesiredColumn, DesiredTable, ReconcileOptions, reconcile_table};
//!
//! let desired = DesiredTable::new("app_config")
//!     .column(DesiredColumn::new("key", "text").not_null())
//!     .column(DesiredColumn::new("value", "text"))
//!     .primary_key(["key"]);
//!
//! let outcome = reconcile_table(&mut client, &desired, &ReconcileOptions::default()).await?;
//! println!("{}", outcome.diff);
//! ```
//!
//! Three entry points:
//! - [`reconcile_table`] converges a table's columns, owner and primary key.
//! - [`reconcile_row`] makes sure exactly one row (or none) matches a predicate.
//! - [`run_query`] runs an ad-hoc statement with bound parameters.
//!
//! All of them work inside a single transaction and roll it back on failure.

mod connect;
pub mod converge;
mod desired;
pub mod diff;
mod error;
pub mod inspect;
pub mod query;
mod row;
mod table;
mod traced;

pub use connect::{ConnectionParams, connect, mask_password};
pub use converge::{Action, ColumnStrategy};
pub use desired::{DesiredColumn, DesiredTable, GUARD_COLUMN, Presence, RowTarget};
pub use diff::{
    ColumnComparison, ColumnMismatch, DesiredColumnStatus, LiveColumnStatus, PrimaryKeyStatus,
    SchemaDiff, compare_column,
};
pub use error::Error;
pub use inspect::{LiveColumn, LivePrimaryKey, LiveState, LiveTable};
pub use query::{QueryOutcome, Row, Value, run_query};
pub use row::{RowOutcome, reconcile_row};
pub use table::{ReconcileOptions, TableOutcome, reconcile_table};
pub use traced::{Connection, ConnectionExt, TracedConn};

/// Desired state of a table.
pub type TableState = Presence;

/// Desired state of a row.
pub type RowState = Presence;

pub type Result<T, E = Error> = std::result::Result<T, E>;
