use crate::error::{NeoError, Result};
use crate::wrapper::ConsumerContext;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "neo.toml";

/// Connection and branding settings for the Neo consumer service.
#[derive(Debug, Clone, Deserialize)]
pub struct NeoConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub version_id: String,
    /// Application password, only used to build the MCAL proxy header.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_promo_code")]
    pub promo_code: String,
    #[serde(default = "default_brand_id")]
    pub brand_id: u32,
    #[serde(default)]
    pub use_mcal: bool,
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Extra country code to Neo option id mappings.
    #[serde(default)]
    pub countries: BTreeMap<String, u32>,
}

fn default_promo_code() -> String {
    "testPromo".to_string()
}

fn default_brand_id() -> u32 {
    35
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_cache_ttl_seconds() -> u64 {
    1200
}

impl NeoConfig {
    /// Loads `neo.toml` from the working directory, overlaid with `NEO_*` env vars.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                NeoError::ImproperlyConfigured(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str::<NeoConfig>(&content)?
        } else {
            debug!("No config file at {}, using environment only", path.display());
            toml::from_str::<NeoConfig>("")?
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NeoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("NEO_URL") {
            self.url = v;
        }
        if let Some(v) = lookup("NEO_APP_ID") {
            self.app_id = v;
        }
        if let Some(v) = lookup("NEO_VERSION_ID") {
            self.version_id = v;
        }
        if let Some(v) = lookup("NEO_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = lookup("NEO_PROMO_CODE") {
            self.promo_code = v;
        }
        if let Some(v) = lookup("NEO_BRAND_ID") {
            self.brand_id = parse_env("NEO_BRAND_ID", &v)?;
        }
        if let Some(v) = lookup("NEO_USE_MCAL") {
            self.use_mcal = parse_env("NEO_USE_MCAL", &v)?;
        }
        if let Some(v) = lookup("NEO_VERIFY_CERT") {
            self.verify_cert = parse_env("NEO_VERIFY_CERT", &v)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("URL", &self.url),
            ("APP_ID", &self.app_id),
            ("VERSION_ID", &self.version_id),
        ] {
            if value.trim().is_empty() {
                return Err(NeoError::ImproperlyConfigured(format!(
                    "Neo setting {} is missing.",
                    key
                )));
            }
        }
        if self.use_mcal && self.password.is_none() {
            return Err(NeoError::ImproperlyConfigured(
                "Neo setting PASSWORD is missing.".to_string(),
            ));
        }
        Ok(())
    }

    /// Base url for all Neo services: `URL/APP_ID/VERSION_ID`.
    pub fn base_url(&self) -> String {
        [
            self.url.trim_end_matches('/'),
            self.app_id.as_str(),
            self.version_id.as_str(),
        ]
        .join("/")
    }

    /// Brand, promo code and country table used when building consumers.
    pub fn consumer_context(&self) -> ConsumerContext {
        ConsumerContext::new(self.brand_id, &self.promo_code).with_countries(
            self.countries.iter().map(|(code, id)| (code.clone(), *id)),
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        NeoError::ImproperlyConfigured(format!("Neo setting {} has invalid value '{}'", key, value))
    })
}
