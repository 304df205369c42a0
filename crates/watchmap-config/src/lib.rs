pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{
    validate_integration_name, BudgetConfig, Config, ConfigError, IntegrationConfig, IntegrationKind, MappingConfig,
    PathMapping, ProfileBudget,
};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
