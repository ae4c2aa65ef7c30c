use std::collections::HashSet;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use infrastructure::MonitoringConfig;
use serde::Deserialize;

use crate::server::{DEFAULT_PORT, DEFAULT_SCAN_INTERVAL, DEFAULT_USERNAME, ServerConfig};
use crate::switch::SwitchConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    pub servers: Vec<ServerSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml"))
            .add_source(Environment::default().separator("_").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }

    /// The alias is the user-visible unique key of a server.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();

        for server in &self.servers {
            if !seen.insert(server.alias.as_str()) {
                anyhow::bail!("Duplicate server alias: {}", server.alias);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub alias: String,
    pub addon_url: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_turn_on_deadline_secs")]
    pub turn_on_deadline_secs: u64,
    #[serde(default = "default_turn_off_deadline_secs")]
    pub turn_off_deadline_secs: u64,
    #[serde(default = "default_forced_off_grace_secs")]
    pub forced_off_grace_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_owned()
}

fn default_scan_interval_secs() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_retries() -> u32 {
    2
}

fn default_turn_on_deadline_secs() -> u64 {
    60
}

fn default_turn_off_deadline_secs() -> u64 {
    120
}

fn default_forced_off_grace_secs() -> u64 {
    15
}

impl ServerSettings {
    pub fn to_config(&self) -> ServerConfig {
        ServerConfig {
            alias: self.alias.clone(),
            addon_url: self.addon_url.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            poll_interval: Duration::from_secs(self.scan_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_retries: self.connect_retries,
            switch: SwitchConfig {
                turn_on_deadline: Duration::from_secs(self.turn_on_deadline_secs),
                turn_off_deadline: Duration::from_secs(self.turn_off_deadline_secs),
                forced_off_grace: Duration::from_secs(self.forced_off_grace_secs),
            },
        }
    }
}
