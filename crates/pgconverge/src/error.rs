use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to database: {0}")]
    Connection(#[source] tokio_postgres::Error),

    #[error("pattern {schema}.{table} matches {count} tables, expected at most one")]
    AmbiguousMatch {
        schema: String,
        table: String,
        count: usize,
    },

    #[error("more than one row ({count}) returned by selection query {query}")]
    Ambiguity { query: String, count: i64 },

    #[error("{0}")]
    Schema(String),

    #[error("database error: {message}")]
    Statement {
        sql: String,
        message: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

impl Error {
    /// Wrap an error returned while running `sql`.
    pub(crate) fn statement(sql: impl Into<String>, source: tokio_postgres::Error) -> Self {
        Error::Statement {
            sql: sql.into(),
            message: diagnostic(&source),
            source,
        }
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }
}

/// The database's own diagnostic for `e`, with detail and hint when present.
fn diagnostic(e: &tokio_postgres::Error) -> String {
    let Some(db) = e.as_db_error() else {
        return e.to_string();
    };
    let mut msg = db.message().to_string();
    if let Some(detail) = db.detail() {
        msg.push_str("\nDETAIL: ");
        msg.push_str(detail);
    }
    if let Some(hint) = db.hint() {
        msg.push_str("\nHINT: ");
        msg.push_str(hint);
    }
    msg
}
