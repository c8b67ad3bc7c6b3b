use std::fmt::Display;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::UserId;

use crate::FRESHNESS_HOURS;

/// A registered user and their balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Row ID of the entry.
    pub(super) id: i64,
    /// Telegram user this account belongs to.
    pub(super) user_id: UserId,
    pub(super) display_name: String,
    pub(super) points: i64,
    pub(super) vip: bool,
}

impl Account {
    /// Expects columns `id, user_id, display_name, points, vip`.
    #[allow(clippy::cast_sign_loss)]
    pub(super) fn from_sqlite_row(row: &SqliteRow) -> Account {
        Account {
            id: row.get("id"),
            user_id: UserId(row.get::<i64, _>("user_id") as u64),
            display_name: row.get("display_name"),
            points: row.get("points"),
            vip: row.get("vip"),
        }
    }

    /// Returns the row ID of the entry.
    #[must_use]
    #[allow(unused)]
    pub fn id(&self) -> i64 {
        self.id
    }
    /// Returns the Telegram user this account belongs to.
    #[must_use]
    #[allow(unused)]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
    /// Returns `@username` or full name, as of signup.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
    #[must_use]
    pub fn points(&self) -> i64 {
        self.points
    }
    #[must_use]
    pub fn is_vip(&self) -> bool {
        self.vip
    }
}

/// A link submitted by an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub(crate) id: i64,
    /// Row ID of the owning account.
    pub(crate) account_id: i64,
    pub(crate) link: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl Post {
    /// Expects columns `id, account_id, link, created_at`.
    pub(super) fn from_sqlite_row(row: &SqliteRow) -> Post {
        Post {
            id: row.get("id"),
            account_id: row.get("account_id"),
            link: row.get("link"),
            created_at: row.get("created_at"),
        }
    }

    #[must_use]
    #[allow(unused)]
    pub fn id(&self) -> i64 {
        self.id
    }
    /// Returns the row ID of the account that submitted this.
    #[must_use]
    #[allow(unused)]
    pub fn account_id(&self) -> i64 {
        self.account_id
    }
    #[must_use]
    pub fn link(&self) -> &str {
        &self.link
    }
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    /// See [`Freshness::classify`].
    #[must_use]
    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        Freshness::classify(self, now)
    }
}

/// How old a post is, as shown to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    /// A post is fresh if it was created less than
    /// [`FRESHNESS_HOURS`] before `now`. Exactly on the mark is stale.
    #[must_use]
    pub fn classify(post: &Post, now: DateTime<Utc>) -> Freshness {
        if now - post.created_at < TimeDelta::hours(FRESHNESS_HOURS) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Freshness::Fresh => "🟢",
            Freshness::Stale => "🔴",
        }
    }
}

/// Expected, user-facing reasons for a ledger operation to not go through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerError {
    NotRegistered,
    AlreadyRegistered,
    InsufficientBalance { need: i64, have: i64 },
    AlreadyVip,
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "Please /signup first."),
            Self::AlreadyRegistered => write!(f, "You're already signed up."),
            Self::InsufficientBalance { need, have } => {
                write!(f, "Not enough points (need {need}, you have {have}).")
            }
            Self::AlreadyVip => write!(f, "You're already a VIP!"),
        }
    }
}

impl std::error::Error for LedgerError {}
