use std::{fmt::Write, future::Future, pin::Pin};

use chrono::{DateTime, Utc};
use html_escape::encode_text;
use teloxide::types::{BotCommand, User, UserId};

use crate::{
    database::{self, Database, LedgerError, Post},
    FRESHNESS_HOURS, POST_COST, RECENT_POSTS_LIMIT, VIP_COST,
};

pub const COMMANDS: &[Command] = &[
    START, HELP, MY_USER, SIGNUP, INFO, POST, MY_POSTS, ALL_POSTS, VIP,
];

/// Every command the bot knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Help,
    MyUser,
    Signup,
    Info,
    Post,
    MyPosts,
    AllPosts,
    Vip,
}

/// Whoever sent the command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub username: Option<String>,
    pub full_name: String,
}

impl Caller {
    pub fn from_user(user: &User) -> Caller {
        Caller {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name(),
        }
    }

    /// `@username` if there is one, full name otherwise.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => self.full_name.clone(),
        }
    }
}

/// What to send back, in HTML.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Text with the main menu keyboard attached.
    Menu(String),
}

/// Expected reasons for a command to not go through.
/// These are shown to the user as is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError {
    Ledger(LedgerError),
    /// Holds what to tell the user.
    MissingArgument(&'static str),
}

impl From<LedgerError> for CommandError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(e) => std::fmt::Display::fmt(e, f),
            Self::MissingArgument(help) => f.write_str(help),
        }
    }
}

pub type Ret = Result<Result<Reply, CommandError>, database::Error>;
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Ret> + Send + 'a>>;

pub struct CommandParams<'a> {
    pub database: &'a Database,
    pub caller: &'a Caller,
    /// Text after the command itself, trimmed.
    pub args: &'a str,
    /// Reference point for post freshness.
    pub now: DateTime<Utc>,
}

pub struct Command {
    pub kind: CommandKind,
    pub callname: &'static str,
    pub description: &'static str,
    /// Label of the button for this in the `/start` menu, if it has one.
    pub menu_label: Option<&'static str>,
    function: fn(CommandParams) -> CommandFuture,
    hidden: bool,
}

impl Command {
    /// Command name without the slash or parameters, like `post`.
    pub fn name(&self) -> &'static str {
        self.callname
            .split_ascii_whitespace()
            .next()
            .unwrap_or_default()
            .trim_start_matches('/')
    }

    /// Find a command by its name, without the slash. Ignores ASCII case.
    pub fn find(name: &str) -> Option<&'static Command> {
        COMMANDS.iter().find(|x| x.name().eq_ignore_ascii_case(name))
    }

    pub fn run<'a>(&self, params: CommandParams<'a>) -> CommandFuture<'a> {
        (self.function)(params)
    }

    pub fn generate_help() -> String {
        let mut response = String::from("<b>Bot commands:</b>\n\n");
        for command in COMMANDS {
            if command.hidden {
                continue;
            }
            let _ = writeln!(response, "{} - {}", command.callname, command.description);
        }

        let _ = write!(
            response,
            "\n<b>Point system:</b>\nAdd post = -{POST_COST} pts\nVIP upgrade = -{VIP_COST} pts"
        );
        let _ = write!(
            response,
            "\n\n🟢 posted less than {FRESHNESS_HOURS} hours ago, 🔴 older."
        );

        response
    }

    pub fn generate_bot_commands() -> Vec<BotCommand> {
        COMMANDS
            .iter()
            .filter(|command| !command.hidden)
            .map(|command| BotCommand {
                command: command.name().to_string(),
                description: command
                    .description
                    .replace("&lt;", "<")
                    .replace("&gt;", ">"),
            })
            .collect()
    }
}

/// Parse text like `/post@OurBot https://example.com` into a command and its
/// arguments. Returns `None` if it's not a command, if it's one we don't
/// know, or if it's addressed to some other bot.
pub fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<(&'static Command, &'a str)> {
    if !text.starts_with('/') {
        return None;
    }

    let invocation = text.split_whitespace().next()?;

    if !invocation.is_ascii() {
        // Telegram commands must be ASCII.
        // See https://core.telegram.org/bots/api#botcommand
        return None;
    }

    let args = text[invocation.len()..].trim();
    let invocation = &invocation[1..];

    // "/post@Some_Bot" is only for us if "Some_Bot" is us.
    let name = if let Some(at) = invocation.find('@') {
        if !invocation[at + 1..].eq_ignore_ascii_case(bot_username) {
            return None;
        }
        &invocation[..at]
    } else {
        invocation
    };

    Command::find(name).map(|command| (command, args))
}

/// Render posts one per line under `header`.
fn format_posts(header: &str, posts: &[Post], now: DateTime<Utc>) -> String {
    let mut response = String::from(header);
    for post in posts {
        let _ = write!(
            response,
            "\n{} {} ({} UTC)",
            post.freshness(now).glyph(),
            encode_text(post.link()),
            post.created_at().format("%Y-%m-%d %H:%M:%S"),
        );
    }
    response
}

///////////////////////////////////////
/////////////////COMMAND DEFINITIONS
///////////////////////////////////////

/// Wraps the function's return value in a pinning closure.
macro_rules! wrap {
    ($thing:expr) => {
        |params| Box::pin($thing(params))
    };
}

macro_rules! goodbye {
    ($err:expr) => {
        return Ok(Err($err.into()))
    };
}

macro_rules! unfail {
    ($item:expr) => {
        match $item {
            Ok(x) => x,
            Err(e) => {
                goodbye!(e);
            }
        }
    };
}

macro_rules! reply {
    ($text:expr) => {
        return Ok(Ok(Reply::Text($text.into())))
    };
}

pub const START: Command = Command {
    kind: CommandKind::Start,
    callname: "/start",
    description: "Begin using the bot.",
    menu_label: Some("Start"),
    function: wrap!(start),
    hidden: true,
};
async fn start(_: CommandParams<'_>) -> Ret {
    Ok(Ok(Reply::Menu(String::from(
        "Welcome! Share links for points here.

Send /signup to get an account, then /help to see what else you can do.

Choose an action:",
    ))))
}

pub const HELP: Command = Command {
    kind: CommandKind::Help,
    callname: "/help",
    description: "Show this guide.",
    menu_label: Some("Help"),
    function: wrap!(help),
    hidden: false,
};
async fn help(_: CommandParams<'_>) -> Ret {
    reply!(Command::generate_help());
}

pub const MY_USER: Command = Command {
    kind: CommandKind::MyUser,
    callname: "/my_user",
    description: "View your Telegram username.",
    menu_label: None,
    function: wrap!(my_user),
    hidden: false,
};
async fn my_user(params: CommandParams<'_>) -> Ret {
    match &params.caller.username {
        Some(username) => reply!(format!("Your username: @{}", encode_text(username))),
        None => reply!("You don't have a username."),
    }
}

pub const SIGNUP: Command = Command {
    kind: CommandKind::Signup,
    callname: "/signup",
    description: "Register a new account.",
    menu_label: Some("Signup"),
    function: wrap!(signup),
    hidden: false,
};
async fn signup(params: CommandParams<'_>) -> Ret {
    let caller = params.caller;
    unfail!(
        params
            .database
            .register(caller.id, &caller.display_name())
            .await?
    );
    reply!("Signup successful! Use /post to submit your link.");
}

pub const INFO: Command = Command {
    kind: CommandKind::Info,
    callname: "/info",
    description: "View your account info.",
    menu_label: Some("Info"),
    function: wrap!(info),
    hidden: false,
};
async fn info(params: CommandParams<'_>) -> Ret {
    let account = unfail!(params.database.get_account(params.caller.id).await?);
    let status = if account.is_vip() {
        "✅ VIP"
    } else {
        "❌ Regular"
    };
    reply!(format!(
        "Your points: {}\nStatus: {}",
        account.points(),
        status
    ));
}

pub const POST: Command = Command {
    kind: CommandKind::Post,
    callname: "/post &lt;link&gt;",
    description: "Submit a new post (costs 20 points).",
    menu_label: None,
    function: wrap!(post),
    hidden: false,
};
async fn post(params: CommandParams<'_>) -> Ret {
    let Some(link) = params.args.split_whitespace().next() else {
        goodbye!(CommandError::MissingArgument(
            "Please include your post link after /post"
        ));
    };
    unfail!(params.database.submit_post(params.caller.id, link).await?);
    reply!(format!(
        "Post submitted successfully. You spent {POST_COST} points."
    ));
}

pub const MY_POSTS: Command = Command {
    kind: CommandKind::MyPosts,
    callname: "/my_posts",
    description: "View your posts (🟢 under 12 hours old, 🔴 older).",
    menu_label: Some("My Posts"),
    function: wrap!(my_posts),
    hidden: false,
};
async fn my_posts(params: CommandParams<'_>) -> Ret {
    let posts = unfail!(
        params
            .database
            .list_posts_by_account(params.caller.id)
            .await?
    );
    if posts.is_empty() {
        reply!("You have no posts.");
    }
    reply!(format_posts("📝 Your Posts:", &posts, params.now));
}

pub const ALL_POSTS: Command = Command {
    kind: CommandKind::AllPosts,
    callname: "/all_posts",
    description: "View the latest submitted posts.",
    menu_label: Some("All Posts"),
    function: wrap!(all_posts),
    hidden: false,
};
async fn all_posts(params: CommandParams<'_>) -> Ret {
    let posts = params.database.list_recent_posts(RECENT_POSTS_LIMIT).await?;
    if posts.is_empty() {
        reply!("No posts found.");
    }
    reply!(format_posts("📢 All Posts:", &posts, params.now));
}

pub const VIP: Command = Command {
    kind: CommandKind::Vip,
    callname: "/vip",
    description: "Upgrade to VIP (costs 10 points).",
    menu_label: Some("VIP Upgrade"),
    function: wrap!(vip),
    hidden: false,
};
async fn vip(params: CommandParams<'_>) -> Ret {
    unfail!(params.database.upgrade_to_vip(params.caller.id).await?);
    reply!("You are now a VIP! 🎉");
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::database::tests::test_database;

    fn caller(id: u64, username: Option<&str>) -> Caller {
        Caller {
            id: UserId(id),
            username: username.map(str::to_string),
            full_name: "Some Person".to_string(),
        }
    }

    async fn run(
        database: &Database,
        caller: &Caller,
        text: &str,
    ) -> Result<Reply, CommandError> {
        let (command, args) = parse_command(text, "Link_Points_Bot").unwrap();
        command
            .run(CommandParams {
                database,
                caller,
                args,
                now: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn text(reply: Result<Reply, CommandError>) -> String {
        match reply.unwrap() {
            Reply::Text(t) | Reply::Menu(t) => t,
        }
    }

    #[test]
    fn parsing() {
        let (command, args) = parse_command("/post https://example.com", "Bot").unwrap();
        assert_eq!(command.kind, CommandKind::Post);
        assert_eq!(args, "https://example.com");

        let (command, args) = parse_command("/POST@bot  a b  ", "Bot").unwrap();
        assert_eq!(command.kind, CommandKind::Post);
        assert_eq!(args, "a b");

        let (command, args) = parse_command("/my_posts", "Bot").unwrap();
        assert_eq!(command.kind, CommandKind::MyPosts);
        assert_eq!(args, "");

        assert!(parse_command("/post@OtherBot x", "Bot").is_none());
        assert!(parse_command("/nonexistent", "Bot").is_none());
        assert!(parse_command("post x", "Bot").is_none());
        assert!(parse_command("/пост", "Bot").is_none());
        assert!(parse_command("/", "Bot").is_none());
    }

    #[test]
    fn table_is_consistent() {
        for command in COMMANDS {
            assert_eq!(Command::find(command.name()).unwrap().kind, command.kind);
        }
        let names = Command::generate_bot_commands()
            .into_iter()
            .map(|x| x.command)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            ["help", "my_user", "signup", "info", "post", "my_posts", "all_posts", "vip"]
        );

        let help = Command::generate_help();
        assert!(help.contains("/post &lt;link&gt; - Submit a new post"));
        assert!(!help.contains("/start"));
    }

    #[test]
    fn post_lines() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let fresh = Post {
            id: 2,
            account_id: 1,
            link: "https://a.example/?x=1&y=<2>".to_string(),
            created_at: now - TimeDelta::hours(1),
        };
        let stale = Post {
            id: 1,
            account_id: 1,
            link: "b".to_string(),
            created_at: now - TimeDelta::hours(12),
        };
        assert_eq!(
            format_posts("📢 All Posts:", &[fresh, stale], now),
            "📢 All Posts:\n\
            🟢 https://a.example/?x=1&amp;y=&lt;2&gt; (2024-05-02 11:00:00 UTC)\n\
            🔴 b (2024-05-02 00:00:00 UTC)"
        );
    }

    #[tokio::test]
    async fn signup_flow() {
        let (_dir, db) = test_database().await;
        let me = caller(1, Some("u1"));

        assert_eq!(
            run(&db, &me, "/info").await,
            Err(CommandError::Ledger(LedgerError::NotRegistered))
        );
        assert!(text(run(&db, &me, "/signup").await).starts_with("Signup successful!"));
        assert_eq!(
            run(&db, &me, "/signup").await,
            Err(CommandError::Ledger(LedgerError::AlreadyRegistered))
        );
        assert_eq!(
            text(run(&db, &me, "/info").await),
            "Your points: 0\nStatus: ❌ Regular"
        );

        let account = db.get_account(UserId(1)).await.unwrap().unwrap();
        assert_eq!(account.display_name(), "@u1");
    }

    #[tokio::test]
    async fn posting_flow() {
        let (_dir, db) = test_database().await;
        let me = caller(1, None);
        run(&db, &me, "/signup").await.unwrap();

        assert_eq!(
            run(&db, &me, "/post").await,
            Err(CommandError::MissingArgument(
                "Please include your post link after /post"
            ))
        );
        assert_eq!(
            run(&db, &me, "/post http://x").await,
            Err(CommandError::Ledger(LedgerError::InsufficientBalance {
                need: 20,
                have: 0
            }))
        );
        assert_eq!(text(run(&db, &me, "/my_posts").await), "You have no posts.");
        assert_eq!(text(run(&db, &me, "/all_posts").await), "No posts found.");

        db.set_points(UserId(1), 20).await;
        run(&db, &me, "/post http://x and some extra words").await.unwrap();

        let mine = text(run(&db, &me, "/my_posts").await);
        assert!(mine.starts_with("📝 Your Posts:\n🟢 http://x ("));
        assert_eq!(mine.lines().count(), 2);

        let all = text(run(&db, &me, "/all_posts").await);
        assert!(all.starts_with("📢 All Posts:\n🟢 http://x ("));

        let account = db.get_account(UserId(1)).await.unwrap().unwrap();
        assert_eq!(account.points(), 0);
        assert_eq!(account.display_name(), "Some Person");
    }

    #[tokio::test]
    async fn vip_flow() {
        let (_dir, db) = test_database().await;
        let me = caller(2, Some("u2"));

        assert_eq!(
            run(&db, &me, "/vip").await,
            Err(CommandError::Ledger(LedgerError::NotRegistered))
        );
        run(&db, &me, "/signup").await.unwrap();
        db.set_points(UserId(2), 10).await;

        assert_eq!(text(run(&db, &me, "/vip").await), "You are now a VIP! 🎉");
        assert_eq!(
            run(&db, &me, "/vip").await,
            Err(CommandError::Ledger(LedgerError::AlreadyVip))
        );
        assert_eq!(
            text(run(&db, &me, "/info").await),
            "Your points: 0\nStatus: ✅ VIP"
        );
    }

    #[tokio::test]
    async fn stateless_commands() {
        let (_dir, db) = test_database().await;

        assert_eq!(
            text(run(&db, &caller(1, Some("a_b")), "/my_user").await),
            "Your username: @a_b"
        );
        assert_eq!(
            text(run(&db, &caller(1, None), "/my_user").await),
            "You don't have a username."
        );
        assert!(matches!(
            run(&db, &caller(1, None), "/start").await,
            Ok(Reply::Menu(_))
        ));
        assert!(text(run(&db, &caller(1, None), "/help").await).contains("VIP upgrade = -10 pts"));
    }
}
