use std::sync::Arc;

use provena_prov::config::LineageConfig;
use provena_prov::{
    EntityResolver, GraphBackend, GraphDatabase, GraphStoreManager, InMemoryGraphDatabase,
    InMemoryRegistry, LifecycleOrchestrator, LineageQueryEngine, ModelRunRegistry, ProvConfig,
    RegistryBackend,
};
use provena_types::{ProvenaError, Result};

use crate::neo4j::Neo4jHttpDatabase;
use crate::registry::RegistryHttpClient;

/// The collaborators selected by a [`ProvConfig`].
#[derive(Clone)]
pub struct Backends {
    pub resolver: Arc<dyn EntityResolver>,
    pub registry: Arc<dyn ModelRunRegistry>,
    pub database: Arc<dyn GraphDatabase>,
}

impl Backends {
    pub async fn from_config(config: &ProvConfig) -> Result<Self> {
        let (resolver, registry): (Arc<dyn EntityResolver>, Arc<dyn ModelRunRegistry>) =
            match config.registry.backend {
                RegistryBackend::Memory => {
                    let memory = match &config.registry.fixture {
                        Some(path) => InMemoryRegistry::load_fixture(path).await?,
                        None => InMemoryRegistry::new(),
                    };
                    let memory = Arc::new(memory);
                    (memory.clone(), memory)
                }
                RegistryBackend::Http => {
                    let url = config.registry.url.clone().ok_or_else(|| {
                        ProvenaError::Config("registry.url is required".into())
                    })?;
                    let client =
                        Arc::new(RegistryHttpClient::new(url).with_token(config.registry.token.clone()));
                    (client.clone(), client)
                }
            };

        let database: Arc<dyn GraphDatabase> = match config.graph.backend {
            GraphBackend::Memory => Arc::new(InMemoryGraphDatabase::new()),
            GraphBackend::Neo4j => Arc::new(
                Neo4jHttpDatabase::new(&config.graph.url, &config.graph.database).with_credentials(
                    config.graph.username.clone(),
                    config.graph.password.clone(),
                ),
            ),
        };

        tracing::info!(
            registry = ?config.registry.backend,
            graph = ?config.graph.backend,
            "Backends configured"
        );
        Ok(Self {
            resolver,
            registry,
            database,
        })
    }

    pub fn store(&self) -> GraphStoreManager {
        GraphStoreManager::new(self.database.clone())
    }

    pub fn orchestrator(&self) -> LifecycleOrchestrator {
        LifecycleOrchestrator::new(self.resolver.clone(), self.registry.clone(), self.store())
    }

    pub fn lineage(&self, config: &LineageConfig) -> LineageQueryEngine {
        LineageQueryEngine::new(self.store())
            .with_max_depth(config.max_depth)
            .with_parallel_relations(config.retain_parallel_relations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_uses_memory_backends() {
        let backends = Backends::from_config(&ProvConfig::default()).await.unwrap();
        let lineage = backends.lineage(&LineageConfig {
            max_depth: 4,
            retain_parallel_relations: false,
        });
        assert_eq!(lineage.max_depth(), 4);

        let graph = lineage.upstream("10378.1/unknown", 2).await.unwrap();
        assert!(graph.nodes.is_empty());
    }

    #[tokio::test]
    async fn missing_fixture_fails() {
        let mut config = ProvConfig::default();
        config.registry.fixture = Some("/nonexistent/registry.json".into());
        assert!(Backends::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn http_backends_are_built_without_connecting() {
        let mut config = ProvConfig::default();
        config.registry.backend = RegistryBackend::Http;
        config.registry.url = Some("http://127.0.0.1:1".into());
        config.graph.backend = GraphBackend::Neo4j;
        assert!(Backends::from_config(&config).await.is_ok());
    }
}
