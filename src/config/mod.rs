use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::agents::config::ModelConfig;
use crate::agents::domain::Manifest;
use crate::cli::Cli;

pub mod credentials;
pub mod validator;

pub use credentials::Credentials;

/// Application settings
///
/// Layered from `switchboard.toml` (optional), `SWITCHBOARD_*` environment
/// variables and CLI overrides. Manifests found in `<root>/manifests/` are
/// added on top of those declared in the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Print diagnostics and return loop errors after recovery
    #[serde(default)]
    pub verbose: bool,
    /// Name of the model used by sessions whose manifest names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Agent name to manifest
    #[serde(default)]
    pub manifests: HashMap<String, Manifest>,
    /// Directory for JSON transcripts; in-memory history when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_dir: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (includes config file and CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let root = cli
            .config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut settings = Self::load(File::from(cli.config.clone()).required(false))?;

        // CLI > env vars > config file
        settings.apply_cli_overrides(cli);

        settings.load_manifests_from_dir(&root.join("manifests"))?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn from_root(root: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let root = root.as_ref();
        let mut settings = Self::load(File::from(root.join("switchboard")).required(false))?;

        settings.load_manifests_from_dir(&root.join("manifests"))?;
        settings.validate()?;

        Ok(settings)
    }

    fn load<S>(file: S) -> Result<Self, anyhow::Error>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SWITCHBOARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("verbose", false)?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            self.verbose = true;
        }
        if let Some(model) = &cli.model {
            self.default_model = Some(model.clone());
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!("Configuration validation failed:\n{}", error_messages.join("\n"))
        })
    }

    /// Load `*.json`, `*.yaml`, `*.yml` and `*.toml` manifests; the file stem
    /// is the agent name
    fn load_manifests_from_dir(&mut self, path: &Path) -> Result<(), anyhow::Error> {
        let pattern = format!("{}/*", path.display());
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) => {
                    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                        continue;
                    };
                    if !matches!(ext, "json" | "yaml" | "yml" | "toml") {
                        continue;
                    }
                    let Some(agent) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                        continue;
                    };

                    let content = std::fs::read_to_string(&path)?;
                    let manifest: Manifest = match ext {
                        "json" => serde_json::from_str(&content)?,
                        "toml" => toml::from_str(&content)?,
                        _ => serde_yaml::from_str(&content)?,
                    };

                    if self.manifests.insert(agent.clone(), manifest).is_some() {
                        tracing::warn!(agent = %agent, "Manifest file overrides the one in the settings file");
                    }
                }
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
        Ok(())
    }

    /// Model used when a manifest names none
    ///
    /// The `default_model` setting wins, then a model marked `default`, then
    /// the first model; without any models the built-in default is used.
    pub fn default_model_config(&self) -> ModelConfig {
        self.default_model
            .as_deref()
            .and_then(|name| self.model_config(name))
            .or_else(|| self.models.iter().find(|m| m.default))
            .or_else(|| self.models.first())
            .cloned()
            .unwrap_or_else(ModelConfig::builtin_default)
    }

    pub fn model_config(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn manifest(&self, agent: &str) -> Option<&Manifest> {
        self.manifests.get(agent)
    }

    pub fn has_manifest(&self, agent: &str) -> bool {
        self.manifests.contains_key(agent)
    }

    /// Names of the credentials the configured models reference
    pub fn credential_names(&self) -> Vec<String> {
        let mut names: Vec<String> = if self.models.is_empty() {
            ModelConfig::builtin_default().api_key.into_iter().collect()
        } else {
            self.models.iter().filter_map(|m| m.api_key.clone()).collect()
        };
        names.sort();
        names.dedup();
        names
    }
}
