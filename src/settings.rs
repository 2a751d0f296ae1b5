//! Runtime settings: an optional `curator.toml` overlaid with `CURATOR_*`
//! environment variables.
//!
//! ```toml
//! db_path = "data/curator.sqlite"
//! tracking_params = ["hsa_*", "campaign_id"]
//!
//! [domains]
//! news = ["diario.example"]
//! ignored = ["hubspot.com"]
//! ```
//!
//! Environment: `CURATOR_DB_PATH`, `CURATOR_TRACKING_PARAMS=a,b`,
//! `CURATOR_DOMAINS__NEWS=x.com,y.com`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::classifier::RoleRegistry;
use crate::domains::{DomainLists, DomainOverrides};
use crate::normalize::Normalizer;
use crate::store::DEFAULT_DB_PATH;

pub const DEFAULT_CONFIG_FILE: &str = "curator.toml";

const LIST_KEYS: &[&str] = &[
    "tracking_params",
    "domains.social_platforms",
    "domains.stores",
    "domains.regulators",
    "domains.news",
    "domains.directories",
    "domains.cdn_hosts",
    "domains.analytics_hosts",
    "domains.ignored",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Extra query parameters to strip, on top of the built-in set.
    pub tracking_params: Vec<String>,
    pub domains: DomainOverrides,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            tracking_params: Vec::new(),
            domains: DomainOverrides::default(),
        }
    }
}

impl Settings {
    /// Read `file` (or `curator.toml` if present) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut env = Environment::with_prefix("CURATOR")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        Config::builder()
            .add_source(file_source)
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    pub fn domain_lists(&self) -> Arc<DomainLists> {
        Arc::new(DomainLists::with_overrides(&self.domains))
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::with_extra_tracking_params(&self.tracking_params)
    }

    pub fn registry(&self, lists: Arc<DomainLists>) -> RoleRegistry {
        RoleRegistry::with_defaults(lists).with_normalizer(self.normalizer())
    }
}

// ── Tests ──
