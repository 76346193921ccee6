use anyhow::{anyhow, Result};
use app_parser::DEFAULT_DENSITY;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG: &str = "ipapk.yaml";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Screen density used to pick Android launcher icons
    pub density: u16,

    /// App Store storefront the lookup link is rewritten to
    pub region: String,

    /// iTunes lookup endpoint
    pub lookup_url: String,

    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            density: DEFAULT_DENSITY,
            region: "cn".to_string(),
            lookup_url: "https://itunes.apple.com/lookup".to_string(),
            user_agent: format!("ipapk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Settings {
    /// Layer the YAML file and `IPAPK_*` environment variables over the defaults.
    ///
    /// An explicit `path` must exist, the default `ipapk.yaml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("IPAPK").try_parsing(true))
            .build()
            .map_err(|e| anyhow!("Failed to load config: {}", e))?
            .try_deserialize()
            .map_err(|e| anyhow!("Invalid config: {}", e))
    }
}
