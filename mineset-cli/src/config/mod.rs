use anyhow::{Context, Result};
use mineset_core::ServiceConfig;
use mineset_remote::RemoteConfig;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

static CONFIG_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Configuration of the mineset binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_service")]
    pub service: ServiceConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    /// External program writing plot files; miners cannot be created without one
    #[serde(default)]
    pub plotter: Option<PlotterConfig>,
}

/// External plot generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotterConfig {
    pub command: String,

    /// Arguments passed before the generated ones
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            remote: RemoteConfig::default(),
            plotter: None,
        }
    }
}

fn default_service() -> ServiceConfig {
    ServiceConfig::in_dir(data_dir())
}

/// Directory holding the registry file and the plots
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mineset")
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    CONFIG_PATH.get().cloned().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mineset")
            .join("config.toml")
    })
}

/// Set custom config path
pub fn set_config_path(path: &str) {
    let _ = CONFIG_PATH.set(PathBuf::from(path));
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

/// Load the configuration, falling back to defaults when there is no file
pub fn load_config() -> Result<CliConfig> {
    let config_path = get_config_path();

    if !config_path.exists() {
        debug!("No configuration at {}, using defaults", config_path.display());
        return Ok(CliConfig::default());
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    parse_config(&contents).with_context(|| format!("Invalid configuration in {}", config_path.display()))
}

pub fn parse_config(contents: &str) -> Result<CliConfig> {
    Ok(toml::from_str(contents)?)
}

/// Save configuration to file
pub fn save_config(config: &CliConfig) -> Result<()> {
    let config_path = get_config_path();

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    fs::write(&config_path, contents)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mineset_core::LoadPolicy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.service.store_path, data_dir().join("miners.json"));
        assert_eq!(config.service.reconcile_interval_secs, 600);
        assert!(config.plotter.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [service]
            store_path = "/var/lib/mineset/miners.json"
            load_policy = "strict"
            balance_interval_secs = 30

            [plotter]
            command = "mineset-plotter"
            args = ["--threads", "4"]
            "#,
        )
        .unwrap();

        assert_eq!(config.service.store_path, PathBuf::from("/var/lib/mineset/miners.json"));
        assert_eq!(config.service.load_policy, LoadPolicy::Strict);
        assert_eq!(config.service.balance_interval_secs, 30);
        assert_eq!(config.service.connect_timeout_secs, 30);
        assert_eq!(
            config.plotter,
            Some(PlotterConfig {
                command: "mineset-plotter".to_string(),
                args: vec!["--threads".to_string(), "4".to_string()],
            })
        );
    }

    #[test]
    fn test_round_trip() {
        let mut config = CliConfig::default();
        config.plotter = Some(PlotterConfig {
            command: "plot".to_string(),
            args: Vec::new(),
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed.plotter, config.plotter);
        assert_eq!(parsed.remote.user_agent, config.remote.user_agent);
    }
}
