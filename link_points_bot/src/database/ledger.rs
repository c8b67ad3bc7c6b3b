//! Account ledger: signup, balances and VIP status.

use sqlx::{
    sqlite::{SqliteConnection, SqliteRow},
    Executor, Sqlite,
};
use teloxide::types::UserId;

use super::{user_id_to_sql, Account, Database, Error, LedgerError};
use crate::VIP_COST;

/// Look up the account of `user` through whatever executor is at hand,
/// be it the pool or an [`AccountScope`](super::AccountScope).
pub(super) async fn fetch_account<'e>(
    executor: impl Executor<'e, Database = Sqlite>,
    user: UserId,
) -> Result<Option<Account>, Error> {
    sqlx::query("SELECT id, user_id, display_name, points, vip FROM accounts WHERE user_id=?;")
        .bind(user_id_to_sql(user))
        .map(|row: SqliteRow| Account::from_sqlite_row(&row))
        .fetch_optional(executor)
        .await
}

/// Take `amount` points from `account`, if it has that many.
/// Returns the account as it is after the debit.
///
/// Must run inside the account's scope, with `account` fetched in it.
pub(super) async fn debit_in(
    conn: &mut SqliteConnection,
    account: &Account,
    amount: u32,
) -> Result<Result<Account, LedgerError>, Error> {
    let amount = i64::from(amount);
    if account.points < amount {
        return Ok(Err(LedgerError::InsufficientBalance {
            need: amount,
            have: account.points,
        }));
    }

    sqlx::query("UPDATE accounts SET points=points-? WHERE id=?;")
        .bind(amount)
        .bind(account.id)
        .execute(conn)
        .await?;

    log::debug!(
        "Debited {} points from {} (userid {}), {} left",
        amount,
        account.display_name,
        account.user_id,
        account.points - amount
    );

    Ok(Ok(Account {
        points: account.points - amount,
        ..account.clone()
    }))
}

impl Database {
    /// Sign up `user` with zero points and no VIP status.
    pub async fn register(
        &self,
        user: UserId,
        display_name: &str,
    ) -> Result<Result<Account, LedgerError>, Error> {
        let mut scope = self.account_scope(user).await?;

        let inserted = sqlx::query(
            "INSERT INTO accounts(user_id, display_name, points, vip)
            VALUES (?, ?, 0, 0)
            RETURNING id, user_id, display_name, points, vip;",
        )
        .bind(user_id_to_sql(user))
        .bind(display_name)
        .map(|row: SqliteRow| Account::from_sqlite_row(&row))
        .fetch_one(scope.conn())
        .await;

        let account = match inserted {
            Ok(account) => account,
            Err(Error::Database(e)) if e.is_unique_violation() => {
                return Ok(Err(LedgerError::AlreadyRegistered));
            }
            Err(e) => return Err(e),
        };

        scope.commit().await?;

        log::info!("Signed up {} (userid {})", display_name, user);
        Ok(Ok(account))
    }

    pub async fn get_account(&self, user: UserId) -> Result<Result<Account, LedgerError>, Error> {
        Ok(fetch_account(&self.pool, user)
            .await?
            .ok_or(LedgerError::NotRegistered))
    }

    /// Take `amount` points from the account of `user`.
    /// Returns the account as it is after the debit.
    #[allow(unused)]
    pub async fn debit(
        &self,
        user: UserId,
        amount: u32,
    ) -> Result<Result<Account, LedgerError>, Error> {
        let mut scope = self.account_scope(user).await?;

        let Some(account) = fetch_account(scope.conn(), user).await? else {
            return Ok(Err(LedgerError::NotRegistered));
        };

        let account = match debit_in(scope.conn(), &account, amount).await? {
            Ok(account) => account,
            Err(e) => return Ok(Err(e)),
        };

        scope.commit().await?;
        Ok(Ok(account))
    }

    /// Make `user` a VIP in exchange for [`VIP_COST`] points.
    pub async fn upgrade_to_vip(
        &self,
        user: UserId,
    ) -> Result<Result<Account, LedgerError>, Error> {
        let mut scope = self.account_scope(user).await?;

        let Some(account) = fetch_account(scope.conn(), user).await? else {
            return Ok(Err(LedgerError::NotRegistered));
        };

        if account.vip {
            return Ok(Err(LedgerError::AlreadyVip));
        }

        let mut account = match debit_in(scope.conn(), &account, VIP_COST).await? {
            Ok(account) => account,
            Err(e) => return Ok(Err(e)),
        };

        sqlx::query("UPDATE accounts SET vip=1 WHERE id=?;")
            .bind(account.id)
            .execute(scope.conn())
            .await?;
        account.vip = true;

        scope.commit().await?;

        log::info!(
            "{} (userid {}) is now a VIP",
            account.display_name,
            account.user_id
        );
        Ok(Ok(account))
    }

    /// Overwrite a balance directly, since nothing in the bot grants points.
    #[cfg(test)]
    pub(crate) async fn set_points(&self, user: UserId, points: i64) {
        sqlx::query("UPDATE accounts SET points=? WHERE user_id=?;")
            .bind(points)
            .bind(user_id_to_sql(user))
            .execute(&self.pool)
            .await
            .unwrap();
    }
}
