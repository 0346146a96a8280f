//! Traced database connection wrapper.
//!
//! Wraps a tokio-postgres client or open transaction and logs all statements
//! via tracing. Errors come back as [`Error::Statement`] carrying the SQL that
//! failed.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Row, Statement};
use tracing::Instrument;

use crate::{Error, Result};

type PgResult<T> = std::result::Result<T, tokio_postgres::Error>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = PgResult<T>> + Send + 'a>>;

/// A wrapper around a database connection that logs all statements via tracing.
///
/// # Example
///
/// ```ignore
/// use pgconverge::ConnectionExt;
///
/// let tx = client.transaction().await?;
/// tx.traced().execute("LOCK TABLE \"public\".\"config\"", &[]).await?;
/// ```
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> TracedConn<'a, C> {
    /// Create a new traced connection wrapper.
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
        );
        let affected = self
            .conn
            .execute(sql, params)
            .instrument(span.clone())
            .await
            .map_err(|e| Error::statement(sql, e))?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Execute a query, returning all rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await
            .map_err(|e| Error::statement(sql, e))?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Execute a query, returning exactly one row.
    ///
    /// Returns an error if the query returns zero or more than one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = 1u64,
        );
        self.conn
            .query_one(sql, params)
            .instrument(span)
            .await
            .map_err(|e| Error::statement(sql, e))
    }

    /// Prepare a statement without executing it.
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        let span = tracing::debug_span!("db.prepare", sql = %sql);
        self.conn
            .prepare(sql)
            .instrument(span)
            .await
            .map_err(|e| Error::statement(sql, e))
    }
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection + Sized {
    /// Wrap this connection in a `TracedConn` for query logging.
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}

/// Trait for database connections that can execute statements.
///
/// This is implemented for `tokio_postgres::Client` and for an open
/// `tokio_postgres::Transaction`, so inspection code runs the same way inside
/// and outside a transaction.
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, u64>;

    /// Execute a query, returning all rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>>;

    /// Execute a query, returning exactly one row.
    fn query_one<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Row>;

    /// Prepare a statement.
    fn prepare<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Statement>;
}

impl Connection for tokio_postgres::Client {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, u64> {
        Box::pin(tokio_postgres::Client::execute(self, sql, params))
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Client::query(self, sql, params))
    }

    fn query_one<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Row> {
        Box::pin(tokio_postgres::Client::query_one(self, sql, params))
    }

    fn prepare<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Statement> {
        Box::pin(tokio_postgres::Client::prepare(self, sql))
    }
}

impl Connection for tokio_postgres::Transaction<'_> {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, u64> {
        Box::pin(tokio_postgres::Transaction::execute(self, sql, params))
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Transaction::query(self, sql, params))
    }

    fn query_one<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Row> {
        Box::pin(tokio_postgres::Transaction::query_one(self, sql, params))
    }

    fn prepare<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Statement> {
        Box::pin(tokio_postgres::Transaction::prepare(self, sql))
    }
}

/// Roll back `tx` after a failure, logging (not returning) any rollback error.
pub(crate) async fn rollback_after_failure(tx: tokio_postgres::Transaction<'_>, cause: &Error) {
    tracing::warn!(error = %cause, "rolling back transaction");
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}
