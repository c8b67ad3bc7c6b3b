//! Post registry: submitted links and who submitted them.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::UserId;

use super::{
    ledger::{debit_in, fetch_account},
    Database, Error, LedgerError, Post,
};
use crate::POST_COST;

impl Database {
    /// Submit `link` on behalf of `user`, taking [`POST_COST`] points for it.
    /// The debit and the insertion either both happen or neither does.
    pub async fn submit_post(
        &self,
        user: UserId,
        link: &str,
    ) -> Result<Result<Post, LedgerError>, Error> {
        let mut scope = self.account_scope(user).await?;

        let Some(account) = fetch_account(scope.conn(), user).await? else {
            return Ok(Err(LedgerError::NotRegistered));
        };

        if let Err(e) = debit_in(scope.conn(), &account, POST_COST).await? {
            return Ok(Err(e));
        }

        let created_at = Utc::now();
        let id: i64 = sqlx::query(
            "INSERT INTO posts(account_id, link, created_at)
            VALUES (?, ?, ?)
            RETURNING id;",
        )
        .bind(account.id)
        .bind(link)
        .bind(created_at)
        .fetch_one(scope.conn())
        .await?
        .get(0);

        scope.commit().await?;

        log::debug!(
            "{} (userid {}) posted {}",
            account.display_name,
            account.user_id,
            link
        );

        Ok(Ok(Post {
            id,
            account_id: account.id,
            link: link.to_string(),
            created_at,
        }))
    }

    /// All posts of `user`, newest first.
    pub async fn list_posts_by_account(
        &self,
        user: UserId,
    ) -> Result<Result<Vec<Post>, LedgerError>, Error> {
        let account = match self.get_account(user).await? {
            Ok(account) => account,
            Err(e) => return Ok(Err(e)),
        };

        sqlx::query(
            "SELECT id, account_id, link, created_at FROM posts
            WHERE account_id=?
            ORDER BY created_at DESC, id DESC;",
        )
        .bind(account.id)
        .map(|row: SqliteRow| Post::from_sqlite_row(&row))
        .fetch_all(&self.pool)
        .await
        .map(Ok)
    }

    /// Up to `limit` latest posts from everyone, newest first.
    pub async fn list_recent_posts(&self, limit: u32) -> Result<Vec<Post>, Error> {
        sqlx::query(
            "SELECT id, account_id, link, created_at FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT ?;",
        )
        .bind(limit)
        .map(|row: SqliteRow| Post::from_sqlite_row(&row))
        .fetch_all(&self.pool)
        .await
    }

    /// Backdate a post, since there's no waiting 12 hours in a test.
    #[cfg(test)]
    pub(crate) async fn set_post_created_at(
        &self,
        post_id: i64,
        created_at: chrono::DateTime<Utc>,
    ) {
        sqlx::query("UPDATE posts SET created_at=? WHERE id=?;")
            .bind(created_at)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .unwrap();
    }
}
