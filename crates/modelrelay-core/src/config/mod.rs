//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::TierRuleConfig;
use crate::credentials::{self, TOKEN_ENV_VARS};

/// Modelrelay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub upstream: UpstreamConfig,
    pub catalog: CatalogConfig,
    pub availability: AvailabilityConfig,
    pub dispatch: DispatchConfig,
}

/// Aggregator endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Never honoured; present only so a key written to the file is rejected
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub catalog_path: String,
    pub completions_path: String,
    pub api_version: String,
    pub timeout_secs: u64,
    /// Prefix accepted in front of model ids
    pub model_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub ttl_secs: u64,
    /// Evaluated before the built-in rules
    pub tier_rules: Vec<TierRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_attempts: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: crate::llm::DEFAULT_BASE_URL.to_string(),
            catalog_path: "/catalog/models".to_string(),
            completions_path: "/inference/chat/completions".to_string(),
            api_version: "2022-11-28".to_string(),
            timeout_secs: 120,
            model_prefix: "github/".to_string(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            tier_rules: Vec::new(),
        }
    }
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self { cooldown_secs: 300 }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl UpstreamConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(TOKEN_ENV_VARS
            .iter()
            .find_map(|var| env::var(var).ok().filter(|v| !v.trim().is_empty())))
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key()
            .map(|opt| opt.map(|key| credentials::redact(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Upstream API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl CatalogConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AvailabilityConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl RelayConfig {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("MODELRELAY_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("modelrelay")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            // Return default config without creating file
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RelayConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.upstream.enforce_env_only()?;

        if self.upstream.base_url.trim().is_empty() {
            return Err(anyhow!("upstream.base_url must not be empty"));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(anyhow!("upstream.timeout_secs must be greater than zero"));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(anyhow!("dispatch.max_attempts must be at least 1"));
        }
        if self.availability.cooldown_secs == 0 {
            return Err(anyhow!(
                "availability.cooldown_secs must be greater than zero"
            ));
        }

        crate::catalog::TierRules::from_config(&self.catalog.tier_rules)
            .context("Invalid catalog.tier_rules")?;

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Upstream settings
            "upstream.base_url" => Ok(self.upstream.base_url.clone()),
            "upstream.catalog_path" => Ok(self.upstream.catalog_path.clone()),
            "upstream.completions_path" => Ok(self.upstream.completions_path.clone()),
            "upstream.api_version" => Ok(self.upstream.api_version.clone()),
            "upstream.timeout_secs" => Ok(self.upstream.timeout_secs.to_string()),
            "upstream.model_prefix" => Ok(self.upstream.model_prefix.clone()),

            // Catalog settings
            "catalog.ttl_secs" => Ok(self.catalog.ttl_secs.to_string()),
            "catalog.tier_rules" => Ok(self
                .catalog
                .tier_rules
                .iter()
                .map(|rule| format!("{} => {}", rule.pattern, rule.tier))
                .collect::<Vec<_>>()
                .join(", ")),

            "availability.cooldown_secs" => Ok(self.availability.cooldown_secs.to_string()),
            "dispatch.max_attempts" => Ok(self.dispatch.max_attempts.to_string()),

            // API key (special handling - show redacted)
            "upstream.api_key" | "api_key" => match self.upstream.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(format!(
                    "(not set - use {} env var)",
                    TOKEN_ENV_VARS.join(" or ")
                )),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `modelrelay config show` to see available keys.",
                key
            )),
        }
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "upstream.base_url",
            "upstream.catalog_path",
            "upstream.completions_path",
            "upstream.api_version",
            "upstream.timeout_secs",
            "upstream.model_prefix",
            "upstream.api_key",
            "catalog.ttl_secs",
            "catalog.tier_rules",
            "availability.cooldown_secs",
            "dispatch.max_attempts",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Tier;

    #[test]
    fn test_config_default() {
        let config = RelayConfig::default();

        assert!(config.upstream.api_key.is_none());
        assert_eq!(config.upstream.base_url, "https://models.github.ai");
        assert_eq!(config.upstream.model_prefix, "github/");
        assert_eq!(config.catalog.ttl(), Duration::from_secs(300));
        assert_eq!(config.availability.cooldown(), Duration::from_secs(300));
        assert_eq!(config.dispatch.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.dispatch.max_attempts, 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RelayConfig::default();
        config.catalog.ttl_secs = 60;
        config.availability.cooldown_secs = 120;
        config.catalog.tier_rules.push(TierRuleConfig {
            pattern: "^acme/".to_string(),
            tier: Tier::Custom,
        });
        config.save_to(&path).unwrap();

        let loaded = RelayConfig::load_from(&path).unwrap();
        assert_eq!(loaded.catalog.ttl_secs, 60);
        assert_eq!(loaded.availability.cooldown_secs, 120);
        assert_eq!(loaded.catalog.tier_rules.len(), 1);
        assert_eq!(loaded.catalog.tier_rules[0].tier, Tier::Custom);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[dispatch]\nmax_attempts = 5\n").unwrap();

        let config = RelayConfig::load_from(&path).unwrap();
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.catalog.ttl_secs, 300);
        assert_eq!(config.upstream.api_version, "2022-11-28");
    }

    #[test]
    fn test_api_key_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[upstream]\napi_key = \"ghp_should_not_be_here\"\n").unwrap();

        let err = RelayConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("environment variables"));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = RelayConfig::default();
        config.upstream.api_key = Some("ghp_secret".to_string());

        let serialized = toml::to_string_pretty(&config).unwrap();
        assert!(!serialized.contains("ghp_secret"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts_and_bad_rules() {
        let mut config = RelayConfig::default();
        config.dispatch.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.catalog.tier_rules.push(TierRuleConfig {
            pattern: "[".to_string(),
            tier: Tier::High,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cooldown() {
        let mut config = RelayConfig::default();
        config.availability.cooldown_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("availability.cooldown_secs"));
    }

    #[test]
    fn test_get_and_list() {
        let config = RelayConfig::default();

        assert_eq!(config.get("catalog.ttl_secs").unwrap(), "300");
        assert_eq!(config.get("dispatch.max_attempts").unwrap(), "3");
        assert!(config.get("nope").is_err());

        let listed = config.list().unwrap();
        assert!(listed.iter().any(|(k, _)| k == "upstream.api_key"));
        assert_eq!(listed.len(), 11);
    }
}
