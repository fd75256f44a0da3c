use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Service configuration, read from YAML. Every section has defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskdeskConfig {
    pub query: QueryConfig,
    pub candidates: CandidateConfig,
    /// Process model files, relative to the config file.
    pub models: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Prefix marking a candidate entry as a group reference.
    pub group_prefix: String,
    /// Group name → member user ids.
    pub groups: HashMap<String, Vec<String>>,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            group_prefix: "group:".to_string(),
            groups: HashMap::new(),
        }
    }
}

impl TaskdeskConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: TaskdeskConfig =
            serde_yaml::from_str(yaml).context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file and rebases relative model paths onto its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        let mut config = Self::from_yaml_str(&yaml)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.models = config
                .models
                .into_iter()
                .map(|m| if m.is_relative() { base.join(m) } else { m })
                .collect();
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let q = &self.query;
        if q.max_page_size == 0 {
            return Err(anyhow!("query.max_page_size must be at least 1"));
        }
        if q.default_page_size == 0 || q.default_page_size > q.max_page_size {
            return Err(anyhow!(
                "query.default_page_size must be between 1 and {}, got {}",
                q.max_page_size,
                q.default_page_size
            ));
        }
        if self.candidates.group_prefix.is_empty() {
            return Err(anyhow!("candidates.group_prefix must not be empty"));
        }
        Ok(())
    }
}
