//! Station configuration.
//!
//! Layered with figment: built-in defaults, then the YAML file, then `ODO_`
//! environment variables (`ODO_MQTT__HOST=broker` sets `mqtt.host`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use odo_core::{
    Mode, Target,
    constants::{DEFAULT_DRIVER_TIMEOUT_SECS, DEFAULT_MQTT_PORT, DEFAULT_POLL_INTERVAL_SECS},
};
use odo_protocol::CredentialTopics;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config file: {}", .0.display())]
    Missing(PathBuf),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttSettings,
    pub cred_topics: CredentialTopics,
    pub modules: Modules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    /// Keep reconnecting to the broker instead of exiting.
    pub retry: bool,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_MQTT_PORT,
            retry: true,
        }
    }
}

/// Enabled adapters.
///
/// A present key enables the adapter, even with an empty value (`espkey:`);
/// an absent key disables it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modules {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "enabled")]
    pub espkey: Option<EspkeySettings>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "enabled")]
    pub proxmark3: Option<Proxmark3Settings>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "enabled")]
    pub lovense: Option<LovenseSettings>,
}

/// Deserialize a present module key, mapping an empty value to the defaults.
fn enabled<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?.unwrap_or_default()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EspkeySettings {
    /// Base URL of the reader's web interface.
    pub url: String,
    pub log: String,
    /// Seconds between two polls that found nothing new.
    pub poll_interval: u64,
}

impl Default for EspkeySettings {
    fn default() -> Self {
        Self {
            url: "http://espkey.local/".into(),
            log: "log.txt".into(),
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl EspkeySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxmark3Settings {
    /// Serial port of the device; the client autodetects it when unset.
    pub port: Option<String>,
    /// Seconds to wait for the client prompt.
    pub client_timeout: u64,
    /// Keep restarting the client instead of exiting.
    pub client_retry: bool,
    pub mode: Mode,
    pub target: Target,
}

impl Default for Proxmark3Settings {
    fn default() -> Self {
        Self {
            port: None,
            client_timeout: DEFAULT_DRIVER_TIMEOUT_SECS,
            client_retry: true,
            mode: Mode::default(),
            target: Target::default(),
        }
    }
}

impl Proxmark3Settings {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LovenseSettings {}

impl Config {
    fn defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    /// Load the file at `path` with environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let config = Self::defaults()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("ODO_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse a YAML document on top of the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(Self::defaults().merge(Yaml::string(yaml)).extract()?)
    }
}
