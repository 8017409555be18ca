//! Configuration module
//!
//! TOML configuration covering the console identity, the schema-data paths
//! and the RSA key material. The config path comes from an explicit
//! argument, the `WIRESHIFT_CONFIG` environment variable, or the default,
//! in that order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::crypto::{KeyRing, RsaDecryptor};
use crate::inject::ConsoleProfile;

pub const DEFAULT_CONFIG_PATH: &str = "wireshift.toml";
pub const CONFIG_ENV: &str = "WIRESHIFT_CONFIG";

fn default_true() -> bool {
    true
}

fn default_new_catalog_path() -> PathBuf {
    PathBuf::from("data/schema_new.json")
}

fn default_old_catalog_path() -> PathBuf {
    PathBuf::from("data/schema_old.json")
}

fn default_tables_path() -> PathBuf {
    PathBuf::from("data/dispatch_tables.json")
}

fn default_public_exponent() -> u64 {
    65_537
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    pub keys: KeysConfig,
}

/// Administrative console settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub profile: ConsoleProfile,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profile: ConsoleProfile::default(),
        }
    }
}

/// Locations of the schema catalogs and dispatch tables
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_new_catalog_path")]
    pub new_catalog: PathBuf,
    #[serde(default = "default_old_catalog_path")]
    pub old_catalog: PathBuf,
    #[serde(default = "default_tables_path")]
    pub dispatch_tables: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            new_catalog: default_new_catalog_path(),
            old_catalog: default_old_catalog_path(),
            dispatch_tables: default_tables_path(),
        }
    }
}

/// One RSA private key, hex encoded
#[derive(Debug, Clone, Deserialize)]
pub struct RsaKeyConfig {
    pub modulus: String,
    pub private_exponent: String,
    #[serde(default = "default_public_exponent")]
    pub public_exponent: u64,
}

impl RsaKeyConfig {
    fn decryptor(&self) -> Result<RsaDecryptor> {
        RsaDecryptor::from_hex(&self.modulus, &self.private_exponent, self.public_exponent)
    }
}

/// A server key selected by the token response's key id
#[derive(Debug, Clone, Deserialize)]
pub struct ServerKeyConfig {
    pub id: u32,
    #[serde(flatten)]
    pub key: RsaKeyConfig,
}

/// Asymmetric key material
#[derive(Debug, Clone, Deserialize)]
pub struct KeysConfig {
    /// Fixed signing key the client encrypts its seed under
    pub signing: RsaKeyConfig,
    /// Key-id-indexed keys for server seeds
    #[serde(default)]
    pub server: Vec<ServerKeyConfig>,
}

impl Config {
    /// Load configuration, resolving the path from the argument, the
    /// environment, or the default location
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        info!(path = %path.display(), "Loading configuration");
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }

    /// Build the shared key ring from the configured key material
    pub fn build_key_ring(&self) -> Result<KeyRing> {
        let signing = self
            .keys
            .signing
            .decryptor()
            .context("Invalid signing key")?;
        let mut server = std::collections::HashMap::new();
        for entry in &self.keys.server {
            let decryptor = entry
                .key
                .decryptor()
                .with_context(|| format!("Invalid server key {}", entry.id))?;
            server.insert(entry.id, decryptor);
        }
        Ok(KeyRing::new(signing, server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_N: &str = "7d2be5742569abe235b6d2bdab82b610f5862282b9a1a75aac22f672cbf97c339a4af34718beb80c25953e352fe1e2db9283de56df4a1a7290c7f4e82761d45b";
    const TEST_D: &str = "26f20c7f79d08a2964fb1050f157471cb9b7d56f0520f5f8314ce38f4e45becdc3af6fea95dfca232e980ff56034caa50f8632f74af8a80a989b970498e416c1";

    fn minimal_toml() -> String {
        format!(
            r#"
            [keys.signing]
            modulus = "{TEST_N}"
            private_exponent = "{TEST_D}"
            "#
        )
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(&minimal_toml()).unwrap();

        assert!(config.console.enabled);
        assert_eq!(config.console.profile.uid, 99);
        assert_eq!(config.schema.new_catalog, PathBuf::from("data/schema_new.json"));
        assert_eq!(config.keys.signing.public_exponent, 65_537);
        assert!(config.keys.server.is_empty());
    }

    #[test]
    fn test_full_config() {
        let text = format!(
            r#"
            [console]
            enabled = false
            uid = 42
            nickname = "Ops"

            [schema]
            new_catalog = "sch/new.json"
            old_catalog = "sch/old.json"
            dispatch_tables = "sch/tables.json"

            [keys.signing]
            modulus = "{TEST_N}"
            private_exponent = "{TEST_D}"

            [[keys.server]]
            id = 2
            modulus = "{TEST_N}"
            private_exponent = "{TEST_D}"

            [[keys.server]]
            id = 3
            modulus = "{TEST_N}"
            private_exponent = "{TEST_D}"
            "#
        );
        let config = Config::from_toml(&text).unwrap();

        assert!(!config.console.enabled);
        assert_eq!(config.console.profile.uid, 42);
        assert_eq!(config.console.profile.nickname, "Ops");
        // Unspecified profile fields keep their defaults
        assert_eq!(config.console.profile.level, 60);
        assert_eq!(config.schema.old_catalog, PathBuf::from("sch/old.json"));

        let ring = config.build_key_ring().unwrap();
        assert_eq!(ring.server_key_count(), 2);
    }

    #[test]
    fn test_invalid_key_material_rejected() {
        let text = r#"
            [keys.signing]
            modulus = "zzzz"
            private_exponent = "yyyy"
        "#;
        let config = Config::from_toml(text).unwrap();
        assert!(config.build_key_ring().is_err());
    }

    #[test]
    fn test_missing_keys_section_rejected() {
        assert!(Config::from_toml("[console]\nenabled = true\n").is_err());
    }
}
