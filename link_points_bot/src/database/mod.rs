mod ledger;
mod registry;
mod types;

pub use types::*;

use std::{collections::HashMap, str::FromStr, sync::Arc};

pub use sqlx::Error;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions},
    Executor, Sqlite, Transaction,
};
use teloxide::types::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Pool = sqlx::Pool<Sqlite>;

pub struct Database {
    pool: Pool,
    /// One lock per account that ever had a transition run against it.
    /// Accounts are never deleted, so neither are these.
    account_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

/// A transaction that nobody else can run against the same account
/// at the same time.
///
/// Rolls back on drop unless [`AccountScope::commit`] is called.
pub(crate) struct AccountScope {
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl AccountScope {
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub(crate) async fn commit(self) -> Result<(), Error> {
        let AccountScope { tx, _guard } = self;
        tx.commit().await
    }
}

impl Database {
    /// Open the database at `path` (like `sqlite:link_points.sqlite`),
    /// creating it and its tables if they don't exist.
    pub async fn new(path: &str) -> Result<Database, Error> {
        if !Sqlite::database_exists(path).await.unwrap_or(false) {
            log::info!("Creating a new database at {path}");
            Sqlite::create_database(path).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                SqliteConnectOptions::from_str(path)?
                    .pragma("cache_size", "-32768")
                    .foreign_keys(true)
                    .busy_timeout(std::time::Duration::from_secs(600)),
            )
            .await?;

        // ACCOUNTS:
        // id (key, i64)
        // user_id (telegram user ID; i64 because sqlite doesn't support u64)
        // display_name (@username or full name at the time of signup)
        // points (balance, never negative)
        // vip (0 for no, 1 for yes; never goes back to 0)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY NOT NULL,
                user_id INTEGER UNIQUE NOT NULL,
                display_name TEXT NOT NULL,
                points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
                vip INTEGER NOT NULL DEFAULT 0
            ) STRICT;",
        ))
        .await?;

        // POSTS:
        // id (key, i64)
        // account_id (owning account's id)
        // link (whatever the user sent, unvalidated)
        // created_at (date+time in UTC in RFC3339 format)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY NOT NULL,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                link TEXT NOT NULL,
                created_at TEXT NOT NULL
            ) STRICT;",
        ))
        .await?;

        pool.execute(sqlx::query(
            "CREATE INDEX IF NOT EXISTS posts_account_id ON posts(account_id);",
        ))
        .await?;
        pool.execute(sqlx::query(
            "CREATE INDEX IF NOT EXISTS posts_created_at ON posts(created_at);",
        ))
        .await?;

        Ok(Database {
            pool,
            account_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Start a transaction for a state transition on the account of `user`.
    ///
    /// Waits for any other transition on that account to finish first.
    /// Transitions on different accounts don't wait for each other,
    /// other than for SQLite's own write lock.
    pub(crate) async fn account_scope(&self, user: UserId) -> Result<AccountScope, Error> {
        let lock = {
            let mut locks = self.account_locks.lock().await;
            locks.entry(user).or_default().clone()
        };
        let guard = lock.lock_owned().await;

        let mut tx = self.pool.begin().await?;

        // Grab SQLite's write lock right away. Upgrading a read transaction
        // to a write one later fails instead of waiting if another writer
        // got in between.
        sqlx::query("UPDATE accounts SET points=points WHERE user_id=?;")
            .bind(user_id_to_sql(user))
            .execute(&mut *tx)
            .await?;

        Ok(AccountScope { tx, _guard: guard })
    }
}

/// SQLite has no unsigned 64 bit integers. Telegram IDs fit in 52 bits anyway.
#[allow(clippy::cast_possible_wrap)]
fn user_id_to_sql(user: UserId) -> i64 {
    user.0 as i64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A fresh database in a temporary directory.
    /// Keep the directory alive for as long as the database is used.
    pub(crate) async fn test_database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite:{}", dir.path().join("test.sqlite").display());
        let database = Database::new(&path).await.unwrap();
        (dir, database)
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite:{}", dir.path().join("test.sqlite").display());

        let database = Database::new(&path).await.unwrap();
        database
            .register(UserId(1), "@one")
            .await
            .unwrap()
            .unwrap();
        database.pool.close().await;

        let database = Database::new(&path).await.unwrap();
        let account = database.get_account(UserId(1)).await.unwrap().unwrap();
        assert_eq!(account.display_name(), "@one");
    }

    #[tokio::test]
    async fn dropped_scope_rolls_back() {
        let (_dir, database) = test_database().await;
        database
            .register(UserId(1), "@one")
            .await
            .unwrap()
            .unwrap();

        {
            let mut scope = database.account_scope(UserId(1)).await.unwrap();
            sqlx::query("UPDATE accounts SET vip=1 WHERE user_id=1;")
                .execute(scope.conn())
                .await
                .unwrap();
            // Dropped without committing.
        }

        let account = database.get_account(UserId(1)).await.unwrap().unwrap();
        assert!(!account.is_vip());
    }

    #[tokio::test]
    async fn negative_balance_is_refused_by_the_store() {
        let (_dir, database) = test_database().await;
        database
            .register(UserId(1), "@one")
            .await
            .unwrap()
            .unwrap();

        let result = sqlx::query("UPDATE accounts SET points=-1 WHERE user_id=1;")
            .execute(&database.pool)
            .await;
        assert!(result.is_err());
    }
}
