use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::BodegaError;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024; // 64 KiB

// --- TOML deserialization structs (private, map 1:1 to TOML schema) ---

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    tools: ToolsSection,
    #[serde(default)]
    store: StoreSection,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolsSection {
    default_list_name: Option<String>,
    search_max_results: Option<usize>,
    comparison_limit: Option<usize>,
    store_max_results: Option<usize>,
    budget_warning_ratio: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    seed: Option<PathBuf>,
}

// --- Validated config ---

/// Tunables shared by the action tools.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    /// Name for the list ADD_TO_LIST creates when the user has none.
    pub default_list_name: String,
    pub search_max_results: usize,
    /// Extra listings shown per product next to the best price.
    pub comparison_limit: usize,
    pub store_max_results: usize,
    /// Remaining budget below this fraction of the limit triggers a warning.
    pub budget_warning_ratio: f64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_list_name: "Shopping List".to_owned(),
            search_max_results: 10,
            comparison_limit: 5,
            store_max_results: 10,
            budget_warning_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub tools: ToolsConfig,
    /// Catalogue file for the in-memory store.
    pub seed: Option<PathBuf>,
}

impl FromStr for Config {
    type Err = BodegaError;

    /// Parse and validate a config from a TOML string.
    fn from_str(content: &str) -> Result<Self, BodegaError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| BodegaError::Config(e.to_string()))?;

        let defaults = ToolsConfig::default();
        let t = file.tools;
        let tools = ToolsConfig {
            default_list_name: t.default_list_name.unwrap_or(defaults.default_list_name),
            search_max_results: t.search_max_results.unwrap_or(defaults.search_max_results),
            comparison_limit: t.comparison_limit.unwrap_or(defaults.comparison_limit),
            store_max_results: t.store_max_results.unwrap_or(defaults.store_max_results),
            budget_warning_ratio: t.budget_warning_ratio.unwrap_or(defaults.budget_warning_ratio),
        };
        validate(&tools)?;

        Ok(Self {
            tools,
            seed: file.store.seed,
        })
    }
}

impl Config {
    /// Load a config from a TOML file. Checks file size before reading.
    ///
    /// A relative `store.seed` path is resolved against the config file's directory.
    pub fn load(path: &Path) -> Result<Self, BodegaError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| BodegaError::Config(format!("cannot read {}: {e}", path.display())))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(BodegaError::Config(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BodegaError::Config(format!("cannot read {}: {e}", path.display())))?;

        let mut config: Config = content.parse()?;
        if let Some(dir) = path.parent() {
            config.seed = config
                .seed
                .take()
                .map(|seed| if seed.is_relative() { dir.join(seed) } else { seed });
        }
        Ok(config)
    }
}

fn validate(tools: &ToolsConfig) -> Result<(), BodegaError> {
    if tools.default_list_name.trim().is_empty() {
        return Err(BodegaError::ConfigValidation(
            "tools.default_list_name must not be empty".to_owned(),
        ));
    }
    for (key, value) in [
        ("search_max_results", tools.search_max_results),
        ("comparison_limit", tools.comparison_limit),
        ("store_max_results", tools.store_max_results),
    ] {
        if value == 0 {
            return Err(BodegaError::ConfigValidation(format!(
                "tools.{key} must be at least 1"
            )));
        }
    }
    let ratio = tools.budget_warning_ratio;
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(BodegaError::ConfigValidation(format!(
            "tools.budget_warning_ratio must be between 0 and 1, got {ratio}"
        )));
    }
    Ok(())
}
