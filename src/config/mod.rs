//! The `config` module loads the application settings.
//!
//! Sources, later ones winning: built-in defaults, the optional
//! `config/default.{toml,json,yaml}` file, then `CHATLINK_`-prefixed
//! environment variables using `__` between section and key
//! (e.g. `CHATLINK_CLIENT__URL`, `CHATLINK_CLIENT__TIMEOUT_MS`).

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{ChatSettings, ClientSettings, LogSettings, Settings};


/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit file stem.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("CHATLINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        client: match partial.client {
            Some(client) => client.merge(default.client),
            None => default.client,
        },
        chat: ChatSettings {
            channel: partial
                .chat
                .and_then(|c| c.channel)
                .unwrap_or(default.chat.channel),
        },
        log: LogSettings {
            level: partial
                .log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
    })
}
