use std::{fmt::Display, fs, io, path::Path};

use serde::Deserialize;

/// Optional JSON config file. Takes priority over the key file.
const CONFIG_FILE: &str = "config.json";

/// Plain text file with nothing but the bot token in it.
const KEY_FILE: &str = if cfg!(debug_assertions) {
    "key_debug"
} else {
    "key"
};

pub const DEFAULT_DATABASE_PATH: &str = "sqlite:link_points.sqlite";

/// Everything the bot needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bot_token: String,
    pub database_path: String,
}

/// Shape of `config.json`.
#[derive(Deserialize)]
struct ConfigFile {
    bot_token: String,
    #[serde(default)]
    database_path: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    /// Neither config file nor key file could be read.
    Io(io::Error),
    /// `config.json` exists but is malformed.
    Json(serde_json::Error),
    /// The token is there but it's blank.
    EmptyToken,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read {CONFIG_FILE} or {KEY_FILE}: {e}"),
            Self::Json(e) => write!(f, "failed to parse {CONFIG_FILE}: {e}"),
            Self::EmptyToken => write!(f, "bot token is empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl Config {
    /// Load the config from the current working directory.
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from(Path::new("."))
    }

    /// Load the config from `dir`, preferring `config.json` and
    /// falling back to the key file.
    pub fn load_from(dir: &Path) -> Result<Config, ConfigError> {
        let config_path = dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            log::info!("Reading config from {}", config_path.display());
            Self::from_json(&fs::read_to_string(config_path)?)?
        } else {
            log::info!("No {CONFIG_FILE}, reading the token from {KEY_FILE}");
            Self::from_token(&fs::read_to_string(dir.join(KEY_FILE))?)
        };

        if config.bot_token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        Ok(config)
    }

    fn from_json(json: &str) -> Result<Config, serde_json::Error> {
        let file: ConfigFile = serde_json::from_str(json)?;
        Ok(Config {
            bot_token: file.bot_token.trim().to_string(),
            database_path: file
                .database_path
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
        })
    }

    fn from_token(token: &str) -> Config {
        Config {
            bot_token: token.trim().to_string(),
            database_path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_with_defaults() {
        let config = Config::from_json(r#"{"bot_token": " 123:abc\n"}"#).unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.database_path, DEFAULT_DATABASE_PATH);

        let config =
            Config::from_json(r#"{"bot_token": "123:abc", "database_path": "sqlite:x.sqlite"}"#)
                .unwrap();
        assert_eq!(config.database_path, "sqlite:x.sqlite");

        assert!(Config::from_json(r#"{"token": "123:abc"}"#).is_err());
    }

    #[test]
    fn config_file_wins_over_key_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(KEY_FILE), "from-key\n").unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.bot_token, "from-key");

        fs::write(dir.path().join(CONFIG_FILE), r#"{"bot_token": "from-json"}"#).unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.bot_token, "from-json");
    }

    #[test]
    fn missing_or_blank_token() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load_from(dir.path()),
            Err(ConfigError::Io(_))
        ));

        fs::write(dir.path().join(KEY_FILE), "  \n").unwrap();
        assert!(matches!(
            Config::load_from(dir.path()),
            Err(ConfigError::EmptyToken)
        ));
    }
}
