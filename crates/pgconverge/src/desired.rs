//! Caller-supplied desired state.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result, Row};

/// Name of the transient placeholder column that keeps a table non-empty
/// while its real columns are being dropped and re-added.
pub const GUARD_COLUMN: &str = "__pgconverge_guard__";

/// A column as the caller wants it.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredColumn {
    pub name: String,
    /// Engine-native type name, e.g. `text` or `character varying(10)`.
    pub sql_type: String,
    pub nullable: bool,
}

impl DesiredColumn {
    /// A nullable column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
        }
    }

    /// Same column, `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Whether a table (or row) should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

impl FromStr for Presence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Presence::Present),
            "absent" => Ok(Presence::Absent),
            other => Err(Error::schema(format!(
                "invalid state [{}], expected present or absent",
                other
            ))),
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Present => write!(f, "present"),
            Presence::Absent => write!(f, "absent"),
        }
    }
}

/// A table as the caller wants it.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredTable {
    pub schema: String,
    pub name: String,
    /// Empty means "any owner".
    pub owner: String,
    pub columns: Vec<DesiredColumn>,
    /// Primary key columns in order. Empty means "no primary key".
    pub primary_key: Vec<String>,
    pub state: Presence,
}

impl DesiredTable {
    /// A present table in `public` with no columns yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: "public".to_string(),
            name: name.into(),
            owner: String::new(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            state: Presence::Present,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn column(mut self, column: DesiredColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn absent(mut self) -> Self {
        self.state = Presence::Absent;
        self
    }

    /// Look up a desired column by name.
    pub fn find_column(&self, name: &str) -> Option<&DesiredColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns as the database will hold them: primary key columns are
    /// always `NOT NULL`, whatever the caller wrote.
    pub fn effective_columns(&self) -> Vec<DesiredColumn> {
        self.columns
            .iter()
            .map(|col| {
                let mut col = col.clone();
                if self.primary_key.contains(&col.name) {
                    col.nullable = false;
                }
                col
            })
            .collect()
    }

    /// Reject malformed input before any connection is opened.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::schema("missing table name"));
        }
        if self.schema.is_empty() {
            return Err(Error::schema(format!(
                "missing schema for table [{}]",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for (idx, col) in self.columns.iter().enumerate() {
            if col.name.is_empty() {
                return Err(Error::schema(format!(
                    "missing name in column definition number {}",
                    idx + 1
                )));
            }
            if col.sql_type.trim().is_empty() {
                return Err(Error::schema(format!(
                    "missing type in column definition number {}",
                    idx + 1
                )));
            }
            if col.name == GUARD_COLUMN {
                return Err(Error::schema(format!(
                    "column name [{}] is reserved",
                    GUARD_COLUMN
                )));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(Error::schema(format!(
                    "column [{}] is defined more than once",
                    col.name
                )));
            }
        }

        if self.state == Presence::Present && self.columns.is_empty() {
            return Err(Error::schema(format!(
                "no columns given for table [{}.{}]",
                self.schema, self.name
            )));
        }

        let mut seen_pk = HashSet::new();
        for pk in &self.primary_key {
            if !seen.contains(pk.as_str()) && self.state == Presence::Present {
                return Err(Error::schema(format!(
                    "primary key column [{}] is not among the table's columns",
                    pk
                )));
            }
            if !seen_pk.insert(pk.as_str()) {
                return Err(Error::schema(format!(
                    "primary key column [{}] is listed more than once",
                    pk
                )));
            }
        }

        Ok(())
    }
}

/// A row as the caller wants it: an equality predicate plus a target state.
#[derive(Debug, Clone, PartialEq)]
pub struct RowTarget {
    pub schema: String,
    pub table: String,
    /// Column = value pairs, in the order statements list them.
    pub row: Row,
    pub state: Presence,
}

impl RowTarget {
    pub fn new(table: impl Into<String>, row: Row) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            row,
            state: Presence::Present,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn absent(mut self) -> Self {
        self.state = Presence::Absent;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(Error::schema("missing table name"));
        }
        if self.row.is_empty() {
            return Err(Error::schema(format!(
                "no columns given for row in [{}.{}]",
                self.schema, self.table
            )));
        }
        let mut seen = HashSet::new();
        for (name, value) in &self.row {
            if name.is_empty() {
                return Err(Error::schema("row has a column without a name"));
            }
            if value.is_null() {
                return Err(Error::schema(format!(
                    "row column [{}] is NULL, which equality can never match",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::schema(format!(
                    "row column [{}] is given more than once",
                    name
                )));
            }
        }
        Ok(())
    }
}
