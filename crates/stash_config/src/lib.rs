mod global;
mod stash;
mod validation;

pub use global::{LimitsConfig, OriginConfig, ServerConfig};
pub use stash::{CliOverrides, ConfigError, StashConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use validation::{validate, ConfigReport};
