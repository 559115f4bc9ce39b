//! Config file lookup and argument access for the demo binaries
//!
//! Each config has a path relative to the working directory that an
//! environment variable (usually set through `.env`) may override.

use std::path::PathBuf;

/// Which demo config file to locate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    /// Server configuration (config/server.yaml)
    Server,
    /// Client configuration (config/client.yaml)
    Client,
}

impl ConfigType {
    /// Path used when the variable is unset
    pub fn default_path(&self) -> &'static str {
        match self {
            ConfigType::Server => "config/server.yaml",
            ConfigType::Client => "config/client.yaml",
        }
    }

    /// Variable that overrides the default path
    pub fn env_var_name(&self) -> &'static str {
        match self {
            ConfigType::Server => "SERVER_CONFIG_PATH",
            ConfigType::Client => "CLIENT_CONFIG_PATH",
        }
    }
}

/// Path of `config_type`'s YAML file, from its variable or the default
///
/// # Examples
/// ```
/// use routesockets_demo::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Server);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Arguments after the program name, e.g. `--serve`
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_type_paths() {
        assert_eq!(ConfigType::Server.default_path(), "config/server.yaml");
        assert_eq!(ConfigType::Client.default_path(), "config/client.yaml");
    }

    #[test]
    fn test_config_type_env_vars() {
        assert_eq!(ConfigType::Server.env_var_name(), "SERVER_CONFIG_PATH");
        assert_eq!(ConfigType::Client.env_var_name(), "CLIENT_CONFIG_PATH");
    }
}
