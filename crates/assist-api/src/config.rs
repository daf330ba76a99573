use anyhow::Context;
use std::{io::Read, path::PathBuf, time::Duration};

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bind_address: String,
    pub bind_port: u16,
    pub jwt: JwtConfig,
    pub database: assist_db::Config,
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub maker_checker: MakerCheckerConfig,
    pub tracing: TracingConfig,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JwtConfig {
    /// Base64 text as printed by `gen-jwt-secret`; used as raw HMAC key bytes.
    pub secret: String,
    #[serde(with = "humantime_serde", default = "default_expiry")]
    pub expiry: Duration,
}

fn default_expiry() -> Duration {
    Duration::from_secs(10 * 60 * 60)
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UploadsConfig {
    pub directory: PathBuf,
    pub max_bytes: usize,
}

#[derive(Clone, Copy, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MakerCheckerConfig {
    #[serde(default)]
    pub allow_self_confirm: bool,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TracingConfig {
    pub console: bool,
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_owned()
}

pub fn load() -> anyhow::Result<Config> {
    let mut configuration = String::with_capacity(4096);
    std::fs::File::open("./app-config.toml")
        .context("unable to open configuration file ./app-config.toml")?
        .read_to_string(&mut configuration)
        .context("unable to read configuration file ./app-config.toml")?;
    let mut config = parse(&configuration)?;
    if let Ok(secret) = std::env::var("ASSIST_JWT_SECRET") {
        config.jwt.secret = secret;
    }
    if let Ok(db_url) = std::env::var("ASSIST_DATABASE_URL") {
        config.database.db_url = db_url;
    }
    Ok(config)
}

fn parse(configuration: &str) -> anyhow::Result<Config> {
    toml::from_str::<Config>(configuration)
        .context("unable to parse configuration file ./app-config.toml")
}
