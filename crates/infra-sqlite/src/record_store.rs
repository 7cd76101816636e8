// Record Store Operations
// Parameterized statement execution on pooled connections

use crate::pool::{ConnectionPool, PooledConnection};
use async_trait::async_trait;
use chrono::NaiveDate;
use couponsys_core::port::{classify, StoreError, StoreResult};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::Connection;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Statement argument
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Build an argument list from anything convertible to [`SqlValue`]
#[macro_export]
macro_rules! sql_args {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::SqlValue::from($value)),*]
    };
}

/// Route a driver failure through the classifier
///
/// Only database errors carry diagnostic text worth classifying; I/O,
/// protocol and decode failures are unclassified.
pub(crate) fn map_sqlx_error(query: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => classify(query, db_err.message()),
        _ => StoreError::Unclassified {
            query: query.to_string(),
            diagnostic: err.to_string(),
        },
    }
}

fn bind_all<'q>(query: &'q str, args: &'q [SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    args.iter().fold(sqlx::query(query), |q, arg| match arg {
        SqlValue::Null => q.bind(None::<i64>),
        SqlValue::Integer(v) => q.bind(*v),
        SqlValue::Real(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.as_str()),
        SqlValue::Date(v) => q.bind(*v),
    })
}

fn check_statement(query: &str) -> StoreResult<()> {
    if query.trim().is_empty() {
        return Err(StoreError::IllegalArgument(
            "statement text is empty".to_string(),
        ));
    }
    Ok(())
}

fn is_insert(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"))
}

/// Materialized result set
///
/// Rows are fully read before the call returns, so any number of them can
/// be held open while further statements run on the same session.
#[derive(Default)]
pub struct Rows {
    rows: Vec<SqliteRow>,
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows").field("len", &self.rows.len()).finish()
    }
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SqliteRow> {
        self.rows.iter()
    }

    pub fn first(&self) -> Option<&SqliteRow> {
        self.rows.first()
    }
}

impl IntoIterator for Rows {
    type Item = SqliteRow;
    type IntoIter = std::vec::IntoIter<SqliteRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a SqliteRow;
    type IntoIter = std::slice::Iter<'a, SqliteRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Releases the prepared statements behind a session's cursors
#[async_trait]
pub trait StatementReleaser: Send + Sync {
    async fn release(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}

/// Drops the connection's prepared-statement cache
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearStatementCache;

#[async_trait]
impl StatementReleaser for ClearStatementCache {
    async fn release(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        conn.clear_cached_statements().await
    }
}

/// One pooled connection held for one logical operation
pub struct StoreSession {
    conn: PooledConnection,
    pending_cursors: usize,
    releaser: Arc<dyn StatementReleaser>,
}

impl StoreSession {
    pub fn new(conn: PooledConnection) -> Self {
        Self::with_releaser(conn, Arc::new(ClearStatementCache))
    }

    pub fn with_releaser(conn: PooledConnection, releaser: Arc<dyn StatementReleaser>) -> Self {
        Self {
            conn,
            pending_cursors: 0,
            releaser,
        }
    }

    /// Result sets read on this session and not yet released
    pub fn pending_cursors(&self) -> usize {
        self.pending_cursors
    }

    /// Run a statement
    ///
    /// # Returns
    /// Rows affected (0 means nothing matched)
    pub async fn execute(&mut self, query: &str, args: &[SqlValue]) -> StoreResult<u64> {
        check_statement(query)?;

        match bind_all(query, args).execute(&mut *self.conn).await {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => Err(self.fail(query, e).await),
        }
    }

    /// Run a query and read every row
    pub async fn query_rows(&mut self, query: &str, args: &[SqlValue]) -> StoreResult<Rows> {
        check_statement(query)?;

        match bind_all(query, args).fetch_all(&mut *self.conn).await {
            Ok(rows) => {
                self.pending_cursors += 1;
                Ok(Rows { rows })
            }
            Err(e) => Err(self.fail(query, e).await),
        }
    }

    /// Run an INSERT and return the key it generated
    pub async fn insert_returning_key(
        &mut self,
        query: &str,
        args: &[SqlValue],
    ) -> StoreResult<i64> {
        check_statement(query)?;
        if !is_insert(query) {
            return Err(StoreError::IllegalArgument(format!(
                "not an INSERT statement: {}",
                query
            )));
        }

        match bind_all(query, args).execute(&mut *self.conn).await {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) => Err(self.fail(query, e).await),
        }
    }

    /// Release every pending cursor and the prepared statements behind them
    pub async fn release_cursors(&mut self) -> StoreResult<()> {
        self.pending_cursors = 0;
        self.releaser
            .release(&mut *self.conn)
            .await
            .map_err(|e| StoreError::StatementLifecycle {
                diagnostic: e.to_string(),
            })
    }

    /// Release pending cursors and hand the connection back to the pool
    ///
    /// Sessions with nothing pending keep their statement cache. A release
    /// failure is logged; the data already read stands.
    pub async fn finish(mut self) {
        if self.pending_cursors == 0 {
            return;
        }
        if let Err(e) = self.release_cursors().await {
            warn!(details = %e.details(), "Couldn't release statements");
        }
    }

    /// Classify a failed statement, then release its statements
    ///
    /// A release failure takes over as the reported error.
    async fn fail(&mut self, query: &str, err: sqlx::Error) -> StoreError {
        let classified = map_sqlx_error(query, err);
        match self.release_cursors().await {
            Ok(()) => classified,
            Err(lifecycle) => {
                warn!(
                    classification = classified.classification(),
                    details = %classified.details(),
                    "Statement failed and its resources could not be released"
                );
                lifecycle
            }
        }
    }
}

/// Record store over a connection pool
///
/// The one-shot helpers take a connection per call; use [`session`](Self::session)
/// to run several statements on the same connection.
#[derive(Clone)]
pub struct RecordStore {
    pool: ConnectionPool,
    releaser: Arc<dyn StatementReleaser>,
}

impl RecordStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self::with_releaser(pool, Arc::new(ClearStatementCache))
    }

    pub fn with_releaser(pool: ConnectionPool, releaser: Arc<dyn StatementReleaser>) -> Self {
        Self { pool, releaser }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub async fn session(&self) -> StoreResult<StoreSession> {
        let conn = self.pool.acquire().await?;
        Ok(StoreSession::with_releaser(conn, Arc::clone(&self.releaser)))
    }

    pub async fn execute(&self, query: &str, args: &[SqlValue]) -> StoreResult<u64> {
        let mut session = self.session().await?;
        let result = session.execute(query, args).await;
        session.finish().await;
        result
    }

    pub async fn query_rows(&self, query: &str, args: &[SqlValue]) -> StoreResult<Rows> {
        let mut session = self.session().await?;
        let result = session.query_rows(query, args).await;
        session.finish().await;
        result
    }

    pub async fn insert_returning_key(&self, query: &str, args: &[SqlValue]) -> StoreResult<i64> {
        let mut session = self.session().await?;
        let result = session.insert_returning_key(query, args).await;
        session.finish().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use couponsys_core::port::{ConstraintKey, PoolError};
    use sqlx::Row;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn store() -> RecordStore {
        let options = StoreConfig::default().connect_options().unwrap();
        let pool = ConnectionPool::connect(&options, 2).await.unwrap();
        let store = RecordStore::new(pool);
        store
            .execute(
                "CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, day TEXT)",
                &[],
            )
            .await
            .unwrap();
        store
    }

    /// Counts releases, optionally failing every one
    #[derive(Default)]
    struct RecordingReleaser {
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingReleaser {
        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatementReleaser for RecordingReleaser {
        async fn release(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(sqlx::Error::Protocol(
                    "statement finalize failed".to_string(),
                ));
            }
            conn.clear_cached_statements().await
        }
    }

    async fn single_connection_store(releaser: Arc<RecordingReleaser>) -> RecordStore {
        let options = StoreConfig::default().connect_options().unwrap();
        let pool = ConnectionPool::connect(&options, 1).await.unwrap();
        let store = RecordStore::with_releaser(pool, releaser);
        store
            .execute("CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[])
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_rows_debug_shows_row_count() {
        assert_eq!(format!("{:?}", Rows::default()), "Rows { len: 0 }");
    }

    #[tokio::test]
    async fn test_execute_reports_affected_rows() {
        let store = store().await;
        store
            .execute("INSERT INTO item (id, name) VALUES (?, ?)", &sql_args![1i64, "a"])
            .await
            .unwrap();

        let updated = store
            .execute("UPDATE item SET name = ? WHERE id = ?", &sql_args!["b", 1i64])
            .await
            .unwrap();
        let nothing = store
            .execute("DELETE FROM item WHERE id = ?", &sql_args![99i64])
            .await
            .unwrap();

        assert_eq!(updated, 1);
        assert_eq!(nothing, 0);
    }

    #[tokio::test]
    async fn test_insert_returning_key() {
        let store = store().await;
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let first = store
            .insert_returning_key(
                "INSERT INTO item (name, day) VALUES (?, ?)",
                &sql_args!["a", day],
            )
            .await
            .unwrap();
        let second = store
            .insert_returning_key(
                "  insert INTO item (name, day) VALUES (?, ?)",
                &sql_args!["b", None::<NaiveDate>],
            )
            .await
            .unwrap();

        assert_eq!(second, first + 1);
        let rows = store
            .query_rows("SELECT day FROM item WHERE id = ?", &sql_args![first])
            .await
            .unwrap();
        let stored: NaiveDate = rows.first().unwrap().get("day");
        assert_eq!(stored, day);
    }

    #[tokio::test]
    async fn test_insert_returning_key_rejects_other_statements() {
        let store = store().await;
        let err = store
            .insert_returning_key("UPDATE item SET name = 'x'", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn test_blank_statement_is_illegal() {
        let store = store().await;
        let err = store.execute("   ", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn test_unique_violation_is_duplicate_key() {
        let store = store().await;
        let insert = "INSERT INTO item (id, name) VALUES (?, ?)";
        store.execute(insert, &sql_args![1i64, "a"]).await.unwrap();

        let err = store
            .execute(insert, &sql_args![2i64, "a"])
            .await
            .unwrap_err();

        assert!(err.is_duplicate_key());
        assert_eq!(err.query(), Some(insert));
        assert!(err.diagnostic().contains("UNIQUE constraint failed"));
    }

    #[tokio::test]
    async fn test_broken_statement_is_unclassified() {
        let store = store().await;
        let err = store
            .query_rows("SELECT * FROM missing_table", &[])
            .await
            .unwrap_err();
        assert_eq!(err.classification(), "UNCLASSIFIED");
        assert!(err.diagnostic().contains("missing_table"));
    }

    #[tokio::test]
    async fn test_nested_reads_in_one_session() {
        let store = store().await;
        for (id, name) in [(1i64, "a"), (2, "b"), (3, "c")] {
            store
                .execute("INSERT INTO item (id, name) VALUES (?, ?)", &sql_args![id, name])
                .await
                .unwrap();
        }

        let mut session = store.session().await.unwrap();
        let outer = session
            .query_rows("SELECT id FROM item ORDER BY id", &[])
            .await
            .unwrap();
        let mut names = Vec::new();
        for row in &outer {
            let id: i64 = row.get("id");
            let inner = session
                .query_rows("SELECT name FROM item WHERE id = ?", &sql_args![id])
                .await
                .unwrap();
            names.push(inner.first().unwrap().get::<String, _>("name"));
        }

        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(session.pending_cursors(), 4);
        session.release_cursors().await.unwrap();
        assert_eq!(session.pending_cursors(), 0);
        session.finish().await;
        assert_eq!(store.pool().status().idle, 2);
    }

    #[tokio::test]
    async fn test_session_holds_one_connection() {
        let store = store().await;
        let first = store.session().await.unwrap();
        let _second = store.session().await.unwrap();

        let err = store
            .pool()
            .acquire_timeout(std::time::Duration::from_millis(20))
            .await
            .err();
        assert!(matches!(err, Some(PoolError::Timeout(_))));

        first.finish().await;
        assert_eq!(store.pool().status().idle, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_surfaces_as_pool_error() {
        let store = store().await;
        store.pool().close_all().await;

        let err = store.execute("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err, StoreError::Pool(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_native_foreign_key_violation_is_unnamed() {
        let store = store().await;
        store
            .execute(
                "CREATE TABLE item_tag (item_id INTEGER NOT NULL REFERENCES item(id))",
                &[],
            )
            .await
            .unwrap();

        let err = store
            .execute("INSERT INTO item_tag (item_id) VALUES (?)", &sql_args![42i64])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::ForeignKey {
                key: ConstraintKey::Unknown,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_release_failure_replaces_statement_error() {
        let releaser = Arc::new(RecordingReleaser::failing());
        let store = single_connection_store(releaser.clone()).await;

        let mut session = store.session().await.unwrap();
        let err = session
            .query_rows("SELECT * FROM missing_table", &[])
            .await
            .unwrap_err();

        match err {
            StoreError::StatementLifecycle { diagnostic } => {
                assert!(diagnostic.contains("statement finalize failed"));
            }
            other => panic!("expected StatementLifecycle, got {:?}", other),
        }
        assert_eq!(releaser.calls(), 1);
        assert_eq!(session.pending_cursors(), 0);
        session.finish().await;
    }

    #[tokio::test]
    async fn test_explicit_release_failure_is_lifecycle_error() {
        let releaser = Arc::new(RecordingReleaser::failing());
        let store = single_connection_store(releaser).await;

        let mut session = store.session().await.unwrap();
        session.query_rows("SELECT id FROM item", &[]).await.unwrap();
        let err = session.release_cursors().await.unwrap_err();

        assert_eq!(err.classification(), "STATEMENT_LIFECYCLE");
        session.finish().await;
    }

    #[tokio::test]
    async fn test_finish_never_fails_the_read() {
        let releaser = Arc::new(RecordingReleaser::failing());
        let store = single_connection_store(releaser.clone()).await;
        store
            .execute("INSERT INTO item (id, name) VALUES (?, ?)", &sql_args![1i64, "a"])
            .await
            .unwrap();

        let rows = store.query_rows("SELECT id FROM item", &[]).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(releaser.calls(), 1);
        assert_eq!(store.pool().status().idle, 1);
    }

    #[tokio::test]
    async fn test_one_shot_writes_keep_statement_cache() {
        let releaser = Arc::new(RecordingReleaser::default());
        let store = single_connection_store(releaser.clone()).await;

        store
            .execute("INSERT INTO item (id, name) VALUES (?, ?)", &sql_args![1i64, "a"])
            .await
            .unwrap();
        store
            .insert_returning_key("INSERT INTO item (name) VALUES (?)", &sql_args!["b"])
            .await
            .unwrap();

        assert_eq!(releaser.calls(), 0);
        {
            let conn = store.pool().acquire().await.unwrap();
            assert!(conn.cached_statements_size() > 0);
        }

        store.query_rows("SELECT id FROM item", &[]).await.unwrap();
        assert_eq!(releaser.calls(), 1);
    }
}
