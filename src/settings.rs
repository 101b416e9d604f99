//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` next to the binary, then overridden by
//! `GROUPSPLIT__SECTION__KEY` environment variables.
//!
//! ```toml
//! [app]
//! level = "info"
//!
//! [server]
//! port = 4000
//! allowed_origin = "http://localhost:5173"
//!
//! [database.mongodb]
//! uri = "mongodb://localhost:27017"
//! name = "GroupSplit"
//!
//! [auth]
//! signing_secret = "..."
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::exchange::SettlementOrder;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        App {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub allowed_origin: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind: None,
            port: default_port(),
            allowed_origin: None,
        }
    }
}

fn default_port() -> u16 {
    4000
}

#[derive(Debug, Deserialize)]
pub struct MongoDb {
    pub uri: String,
    #[serde(default = "default_database_name")]
    pub name: String,
}

fn default_database_name() -> String {
    "GroupSplit".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    MongoDb(MongoDb),
}

#[derive(Debug, Deserialize)]
pub struct Identity {
    pub api_url: String,
    pub secret_key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    pub signing_secret: String,
    /// Assertions older than this are refused; 0 disables the check.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

fn default_max_age() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Default, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub order: SettlementOrder,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    pub identity: Option<Identity>,
    pub auth: Auth,
    #[serde(default)]
    pub balance: Balance,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("GROUPSPLIT").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = parse(
            r#"
            [auth]
            signing_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.server.port, 4000);
        assert!(settings.server.bind.is_none());
        assert!(matches!(settings.database, Database::Memory));
        assert!(settings.identity.is_none());
        assert_eq!(settings.auth.max_age_secs, 86_400);
        assert_eq!(settings.balance.order, SettlementOrder::Encounter);
    }

    #[test]
    fn full_settings() {
        let settings = parse(
            r#"
            [app]
            level = "debug"

            [server]
            bind = "0.0.0.0"
            port = 8080
            allowed_origin = "http://localhost:5173"

            [database.mongodb]
            uri = "mongodb://localhost:27017"

            [identity]
            api_url = "https://api.example.com/v1"
            secret_key = "sk_test"

            [auth]
            signing_secret = "secret"
            max_age_secs = 0

            [balance]
            order = "largest_first"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        match settings.database {
            Database::MongoDb(mongo) => {
                assert_eq!(mongo.uri, "mongodb://localhost:27017");
                assert_eq!(mongo.name, "GroupSplit");
            }
            other => panic!("unexpected database {other:?}"),
        }
        assert_eq!(settings.identity.unwrap().secret_key, "sk_test");
        assert_eq!(settings.auth.max_age_secs, 0);
        assert_eq!(settings.balance.order, SettlementOrder::LargestFirst);
    }

    #[test]
    fn signing_secret_is_required() {
        assert!(parse("[app]\nlevel = \"warn\"\n").is_err());
    }
}
