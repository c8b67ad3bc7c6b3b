//! Source code for the Link Points Bot: users sign up, spend points
//! to share links, and can buy a VIP status.

/// Startup configuration.
mod config;

/// The database, holding the account ledger and the post registry.
mod database;

/// Command table and transport-agnostic command implementations.
mod commands;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

/// Points it costs to submit a post.
pub const POST_COST: u32 = 20;

/// Points it costs to become a VIP.
pub const VIP_COST: u32 = 10;

/// Posts younger than this many hours are considered fresh.
pub const FRESHNESS_HOURS: i64 = 12;

/// How many posts `/all_posts` shows.
pub const RECENT_POSTS_LIMIT: u32 = 20;
