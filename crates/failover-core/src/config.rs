//! Orchestrator configuration — loaded from a TOML file and overlaid with
//! `FAILOVER_`-prefixed environment variables, mirroring the CLI's
//! existing env/profile layering.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::region::{Region, RegionMap};

/// Per-step budget overrides (spec §6, defaults from §5's timeout table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepBudgets {
    #[serde(default = "default_health_check_ms")]
    pub health_check_ms: u64,
    #[serde(default = "default_promote_relational_ms")]
    pub promote_relational_ms: u64,
    #[serde(default = "default_failover_cache_ms")]
    pub failover_cache_ms: u64,
    #[serde(default = "default_update_routing_ms")]
    pub update_routing_ms: u64,
    #[serde(default = "default_validate_ms")]
    pub validate_ms: u64,
}

fn default_health_check_ms() -> u64 {
    500
}
fn default_promote_relational_ms() -> u64 {
    2_000
}
fn default_failover_cache_ms() -> u64 {
    1_000
}
fn default_update_routing_ms() -> u64 {
    200
}
fn default_validate_ms() -> u64 {
    1_500
}

impl Default for StepBudgets {
    fn default() -> Self {
        Self {
            health_check_ms: default_health_check_ms(),
            promote_relational_ms: default_promote_relational_ms(),
            failover_cache_ms: default_failover_cache_ms(),
            update_routing_ms: default_update_routing_ms(),
            validate_ms: default_validate_ms(),
        }
    }
}

impl StepBudgets {
    pub fn health_check(&self) -> Duration {
        Duration::from_millis(self.health_check_ms)
    }
    pub fn promote_relational(&self) -> Duration {
        Duration::from_millis(self.promote_relational_ms)
    }
    pub fn failover_cache(&self) -> Duration {
        Duration::from_millis(self.failover_cache_ms)
    }
    pub fn update_routing(&self) -> Duration {
        Duration::from_millis(self.update_routing_ms)
    }
    pub fn validate(&self) -> Duration {
        Duration::from_millis(self.validate_ms)
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    pub regions: RegionMap,
    pub initial_active_region: String,
    pub sentinel_endpoints: Vec<String>,
    pub cache_service_name: String,
    #[serde(default = "default_overall_budget_ms")]
    pub overall_budget_ms: u64,
    #[serde(default = "default_max_lag_tolerated_ms")]
    pub max_lag_tolerated_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub step_budgets: StepBudgets,
}

fn default_overall_budget_ms() -> u64 {
    5_000
}
fn default_max_lag_tolerated_ms() -> u64 {
    1_000
}
fn default_history_capacity() -> usize {
    1_000
}

impl FailoverConfig {
    pub fn overall_budget(&self) -> Duration {
        Duration::from_millis(self.overall_budget_ms)
    }

    pub fn max_lag_tolerated(&self) -> Duration {
        Duration::from_millis(self.max_lag_tolerated_ms)
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    /// Load from an optional TOML file, then overlay scalar
    /// `FAILOVER_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p)?;
                toml::from_str::<FailoverConfig>(&contents)?
            }
            None => Self::minimal_two_region_default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn minimal_two_region_default() -> Self {
        let mut regions: RegionMap = HashMap::new();
        regions.insert(
            "a".into(),
            Region {
                id: "a".into(),
                relational_endpoint: "127.0.0.1:5432".into(),
                cache_endpoint: "127.0.0.1:6379".into(),
            },
        );
        regions.insert(
            "b".into(),
            Region {
                id: "b".into(),
                relational_endpoint: "127.0.0.1:5433".into(),
                cache_endpoint: "127.0.0.1:6380".into(),
            },
        );
        Self {
            regions,
            initial_active_region: "a".into(),
            sentinel_endpoints: vec!["127.0.0.1:26379".into()],
            cache_service_name: "primary-cache".into(),
            overall_budget_ms: default_overall_budget_ms(),
            max_lag_tolerated_ms: default_max_lag_tolerated_ms(),
            history_capacity: default_history_capacity(),
            step_budgets: StepBudgets::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FAILOVER_OVERALL_BUDGET_MS") {
            if let Ok(parsed) = v.parse() {
                self.overall_budget_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("FAILOVER_MAX_LAG_TOLERATED_MS") {
            if let Ok(parsed) = v.parse() {
                self.max_lag_tolerated_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("FAILOVER_HISTORY_CAPACITY") {
            if let Ok(parsed) = v.parse() {
                self.history_capacity = parsed;
            }
        }
        if let Ok(v) = std::env::var("FAILOVER_CACHE_SERVICE_NAME") {
            self.cache_service_name = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.regions.contains_key(&self.initial_active_region) {
            return Err(ConfigError::Invalid(format!(
                "initial_active_region {} is not in regions",
                self.initial_active_region
            )));
        }
        if self.sentinel_endpoints.is_empty() {
            return Err(ConfigError::Invalid("sentinel_endpoints must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FailoverConfig::minimal_two_region_default();
        assert!(config.validate().is_ok());
        assert_eq!(config.overall_budget(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_unknown_initial_region() {
        let mut config = FailoverConfig::minimal_two_region_default();
        config.initial_active_region = "c".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_from_toml() {
        let toml_str = r#"
            initial_active_region = "a"
            sentinel_endpoints = ["10.0.0.1:26379"]
            cache_service_name = "prod-cache"

            [regions.a]
            id = "a"
            relational_endpoint = "10.0.1.1:5432"
            cache_endpoint = "10.0.1.2:6379"

            [regions.b]
            id = "b"
            relational_endpoint = "10.0.2.1:5432"
            cache_endpoint = "10.0.2.2:6379"
        "#;
        let config: FailoverConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.overall_budget_ms, 5_000);
        assert_eq!(config.regions.len(), 2);
    }
}
