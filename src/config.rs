use anyhow::Result;
use serde::Deserialize;

use crate::session::SessionTimeouts;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub session: SessionTimeouts,
    pub speech: SpeechConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct SpeechConfig {
    /// Address of the recognizer service ("host:port")
    pub backend_addr: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub recordings_path: String,

    /// How long a recording access reference stays valid, in seconds
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
}

fn default_access_ttl_secs() -> u64 {
    3600
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
