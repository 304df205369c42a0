use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub budgets: BudgetConfig,
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
}

/// Path handling for the matcher
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MappingConfig {
    /// Roots owned by the content-management side. Empty means every path
    /// counts as managed.
    #[serde(default)]
    pub managed_roots: Vec<String>,
    /// Prefix rewrites applied to indexer paths before canonicalization
    #[serde(default)]
    pub path_mappings: Vec<PathMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathMapping {
    pub from: String,
    pub to: String,
}

/// Traversal budgets for one operating profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileBudget {
    pub page_size: usize,
    pub run_row_budget: usize,
    /// Hard cap on metadata calls per integration run; `None` is unlimited
    #[serde(default)]
    pub recheck_call_budget: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetConfig {
    #[serde(default = "default_bootstrap_budget")]
    pub bootstrap: ProfileBudget,
    #[serde(default = "default_scheduled_budget")]
    pub scheduled: ProfileBudget,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap_budget(),
            scheduled: default_scheduled_budget(),
        }
    }
}

fn default_bootstrap_budget() -> ProfileBudget {
    ProfileBudget {
        page_size: 200,
        run_row_budget: 5000,
        recheck_call_budget: None,
    }
}

fn default_scheduled_budget() -> ProfileBudget {
    ProfileBudget {
        page_size: 50,
        run_row_budget: 1000,
        recheck_call_budget: Some(25),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    Plex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationConfig {
    pub name: String,
    #[serde(default = "default_integration_kind")]
    pub kind: IntegrationKind,
    pub server_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_integration_kind() -> IntegrationKind {
    IntegrationKind::Plex
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("integration name must not be empty")]
    EmptyIntegrationName,
    #[error("integration name '{0}' may only contain ASCII letters, digits, '-' and '_'")]
    InvalidIntegrationName(String),
    #[error("integration '{0}' is configured more than once")]
    DuplicateIntegration(String),
    #[error("integration '{0}' is enabled but has no server_url")]
    MissingServerUrl(String),
    #[error("{profile} budget: {field} must be greater than zero")]
    ZeroBudget { profile: &'static str, field: &'static str },
    #[error("path mapping 'from' prefix must not be empty")]
    EmptyPathMapping,
}

/// Integration names double as state file names, so they are restricted to
/// characters that map onto a file name one-to-one.
pub fn validate_integration_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyIntegrationName);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ConfigError::InvalidIntegrationName(name.to_string()));
    }
    Ok(())
}

impl Config {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for integration in &self.integrations {
            validate_integration_name(&integration.name)?;
            if !names.insert(integration.name.as_str()) {
                return Err(ConfigError::DuplicateIntegration(integration.name.clone()));
            }
            if integration.enabled && integration.server_url.trim().is_empty() {
                return Err(ConfigError::MissingServerUrl(integration.name.clone()));
            }
        }

        for (profile, budget) in [("bootstrap", &self.budgets.bootstrap), ("scheduled", &self.budgets.scheduled)] {
            if budget.page_size == 0 {
                return Err(ConfigError::ZeroBudget { profile, field: "page_size" });
            }
            if budget.run_row_budget == 0 {
                return Err(ConfigError::ZeroBudget { profile, field: "run_row_budget" });
            }
        }

        if self.mapping.path_mappings.iter().any(|m| m.from.trim().is_empty()) {
            return Err(ConfigError::EmptyPathMapping);
        }

        Ok(())
    }

    /// Enabled integrations, optionally narrowed to the given names
    pub fn enabled_integrations<'a>(&'a self, only: &[String]) -> Vec<&'a IntegrationConfig> {
        self.integrations
            .iter()
            .filter(|i| i.enabled)
            .filter(|i| only.is_empty() || only.iter().any(|name| name == &i.name))
            .collect()
    }
}
