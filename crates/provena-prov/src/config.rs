//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden by `PROVENA_*`
//! environment variables. Binaries apply their own flags on top.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use provena_types::{ProvenaError, Result};

use crate::lineage::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvConfig {
    pub server: ServerConfig,
    pub graph: GraphConfig,
    pub registry: RegistryConfig,
    pub lineage: LineageConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Memory,
    Neo4j,
}

impl FromStr for GraphBackend {
    type Err = ProvenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(GraphBackend::Memory),
            "neo4j" => Ok(GraphBackend::Neo4j),
            other => Err(ProvenaError::Config(format!("unknown graph backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    /// Base URL of the Neo4j HTTP endpoint.
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            url: "http://localhost:7474".into(),
            database: "neo4j".into(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    #[default]
    Memory,
    Http,
}

impl FromStr for RegistryBackend {
    type Err = ProvenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(RegistryBackend::Memory),
            "http" => Ok(RegistryBackend::Http),
            other => Err(ProvenaError::Config(format!(
                "unknown registry backend '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    pub url: Option<String>,
    /// Bearer token sent to the registry API.
    pub token: Option<String>,
    /// JSON array of registry items loaded into the in-memory registry.
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub max_depth: u32,
    pub retain_parallel_relations: bool,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            retain_parallel_relations: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub root: PathBuf,
    pub queue_capacity: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./provena-jobs"),
            queue_capacity: 64,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ProvenaError::Config(format!("{key}: cannot parse '{value}'")))
}

impl ProvConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProvenaError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvenaError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `PROVENA_*` variables supplied by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("PROVENA_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }

        if let Some(v) = lookup("PROVENA_GRAPH_BACKEND") {
            self.graph.backend = v.parse()?;
        }
        if let Some(v) = lookup("PROVENA_GRAPH_URL") {
            self.graph.url = v;
        }
        if let Some(v) = lookup("PROVENA_GRAPH_DATABASE") {
            self.graph.database = v;
        }
        if let Some(v) = lookup("PROVENA_GRAPH_USERNAME") {
            self.graph.username = Some(v);
        }
        if let Some(v) = lookup("PROVENA_GRAPH_PASSWORD") {
            self.graph.password = Some(v);
        }

        if let Some(v) = lookup("PROVENA_REGISTRY_BACKEND") {
            self.registry.backend = v.parse()?;
        }
        if let Some(v) = lookup("PROVENA_REGISTRY_URL") {
            self.registry.url = Some(v);
        }
        if let Some(v) = lookup("PROVENA_REGISTRY_TOKEN") {
            self.registry.token = Some(v);
        }
        if let Some(v) = lookup("PROVENA_REGISTRY_FIXTURE") {
            self.registry.fixture = Some(PathBuf::from(v));
        }

        if let Some(v) = lookup("PROVENA_MAX_DEPTH") {
            self.lineage.max_depth = parse_env("PROVENA_MAX_DEPTH", &v)?;
        }
        if let Some(v) = lookup("PROVENA_RETAIN_PARALLEL_RELATIONS") {
            self.lineage.retain_parallel_relations =
                parse_env("PROVENA_RETAIN_PARALLEL_RELATIONS", &v)?;
        }

        if let Some(v) = lookup("PROVENA_JOBS_ROOT") {
            self.jobs.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROVENA_QUEUE_CAPACITY") {
            self.jobs.queue_capacity = parse_env("PROVENA_QUEUE_CAPACITY", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.lineage.max_depth == 0 {
            return Err(ProvenaError::Config(
                "lineage.max_depth must be at least 1".into(),
            ));
        }
        if self.jobs.queue_capacity == 0 {
            return Err(ProvenaError::Config(
                "jobs.queue_capacity must be at least 1".into(),
            ));
        }
        if self.registry.backend == RegistryBackend::Http && self.registry.url.is_none() {
            return Err(ProvenaError::Config(
                "registry.url is required for the http registry backend".into(),
            ));
        }
        if self.graph.backend == GraphBackend::Neo4j && self.graph.url.trim().is_empty() {
            return Err(ProvenaError::Config(
                "graph.url is required for the neo4j graph backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_in_memory() {
        let config = ProvConfig::default();
        assert_eq!(config.graph.backend, GraphBackend::Memory);
        assert_eq!(config.registry.backend, RegistryBackend::Memory);
        assert_eq!(config.lineage.max_depth, 10);
        assert!(!config.lineage.retain_parallel_relations);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ProvConfig::from_toml_str(
            r#"
            [graph]
            backend = "neo4j"
            url = "http://graph:7474"

            [lineage]
            retain_parallel_relations = true
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.graph.url, "http://graph:7474");
        assert_eq!(config.graph.database, "neo4j");
        assert!(config.lineage.retain_parallel_relations);
        assert_eq!(config.lineage.max_depth, 10);
        assert_eq!(config.jobs.queue_capacity, 64);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = ProvConfig::from_toml_str("[graph\nbackend=").unwrap_err();
        assert!(matches!(err, ProvenaError::Config(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("PROVENA_GRAPH_BACKEND", "NEO4J"),
            ("PROVENA_MAX_DEPTH", "4"),
            ("PROVENA_REGISTRY_BACKEND", "http"),
            ("PROVENA_REGISTRY_URL", "https://registry.example"),
            ("PROVENA_JOBS_ROOT", "/var/lib/provena/jobs"),
        ]
        .into_iter()
        .collect();
        let mut config = ProvConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.lineage.max_depth, 4);
        assert_eq!(config.registry.backend, RegistryBackend::Http);
        assert_eq!(config.jobs.root, PathBuf::from("/var/lib/provena/jobs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unparsable_env_value_is_rejected() {
        let mut config = ProvConfig::default();
        let err = config
            .apply_env(|k| (k == "PROVENA_MAX_DEPTH").then(|| "deep".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PROVENA_MAX_DEPTH"));
    }

    #[test]
    fn http_registry_requires_url() {
        let mut config = ProvConfig::default();
        config.registry.backend = RegistryBackend::Http;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_depth_is_invalid() {
        let mut config = ProvConfig::default();
        config.lineage.max_depth = 0;
        assert!(config.validate().is_err());
    }
}
