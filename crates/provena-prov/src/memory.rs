//! In-process registry used for tests, local development and CLI fixtures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use provena_types::{
    ItemSubtype, ModelRunItem, ModelRunRecord, ProvenaError, RegistryItem, Resolution, Result,
};

use crate::resolver::{EntityResolver, ModelRunRegistry};

const DEFAULT_HANDLE_PREFIX: &str = "10378.1";
const FIRST_HANDLE: u64 = 1_000_000;

#[derive(Debug, Clone)]
enum Entry {
    Seed(ItemSubtype),
    Complete(RegistryItem),
}

/// A registry held entirely in memory.
///
/// Cloning is not supported; share it behind an `Arc`.
pub struct InMemoryRegistry {
    items: RwLock<HashMap<String, Entry>>,
    prefix: String,
    next_handle: AtomicU64,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            prefix: DEFAULT_HANDLE_PREFIX.to_string(),
            next_handle: AtomicU64::new(FIRST_HANDLE),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Build a registry pre-populated with complete items.
    pub fn from_items(items: impl IntoIterator<Item = RegistryItem>) -> Self {
        let map = items
            .into_iter()
            .map(|item| (item.id().to_string(), Entry::Complete(item)))
            .collect();
        Self {
            items: RwLock::new(map),
            ..Self::new()
        }
    }

    /// Load complete items from a JSON array file.
    pub async fn load_fixture(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        let items: Vec<RegistryItem> = serde_json::from_str(&data)?;
        tracing::debug!(path = %path.display(), items = items.len(), "Registry fixture loaded");
        Ok(Self::from_items(items))
    }

    pub async fn insert(&self, item: RegistryItem) {
        self.items
            .write()
            .await
            .insert(item.id().to_string(), Entry::Complete(item));
    }

    pub async fn insert_seed(&self, id: impl Into<String>, subtype: ItemSubtype) {
        self.items.write().await.insert(id.into(), Entry::Seed(subtype));
    }

    /// The complete item at `id`, if any.
    pub async fn get(&self, id: &str) -> Option<RegistryItem> {
        match self.items.read().await.get(id) {
            Some(Entry::Complete(item)) => Some(item.clone()),
            _ => None,
        }
    }

    pub async fn is_seed(&self, id: &str) -> bool {
        matches!(self.items.read().await.get(id), Some(Entry::Seed(_)))
    }

    pub async fn model_run(&self, id: &str) -> Option<ModelRunItem> {
        match self.get(id).await {
            Some(RegistryItem::ModelRun(item)) => Some(item),
            _ => None,
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn registry_error(status: u16, message: String) -> ProvenaError {
    ProvenaError::UpstreamService {
        service: "registry".into(),
        status,
        message,
    }
}

#[async_trait]
impl EntityResolver for InMemoryRegistry {
    async fn resolve(&self, id: &str, expected: ItemSubtype) -> Result<Resolution> {
        let items = self.items.read().await;
        let resolution = match items.get(id) {
            None => Resolution::NotFound,
            Some(Entry::Seed(actual)) if *actual != expected => {
                Resolution::WrongType { actual: *actual }
            }
            Some(Entry::Seed(_)) => Resolution::Seed,
            Some(Entry::Complete(item)) if item.subtype() != expected => Resolution::WrongType {
                actual: item.subtype(),
            },
            Some(Entry::Complete(item)) => Resolution::Complete(item.clone()),
        };
        Ok(resolution)
    }
}

#[async_trait]
impl ModelRunRegistry for InMemoryRegistry {
    async fn mint_identity(&self) -> Result<String> {
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}/{}", self.prefix, n))
    }

    async fn seed_model_run(&self, id: &str) -> Result<()> {
        let mut items = self.items.write().await;
        if items.contains_key(id) {
            return Err(registry_error(409, format!("Item '{id}' already exists")));
        }
        items.insert(id.to_string(), Entry::Seed(ItemSubtype::ModelRun));
        Ok(())
    }

    async fn update_model_run(
        &self,
        id: &str,
        record: &ModelRunRecord,
        prov_document: &str,
    ) -> Result<()> {
        let mut items = self.items.write().await;
        let version = match items.get(id) {
            Some(Entry::Seed(ItemSubtype::ModelRun)) => 1,
            Some(Entry::Complete(RegistryItem::ModelRun(existing))) => existing.version + 1,
            Some(_) => {
                return Err(registry_error(400, format!("Item '{id}' is not a model run")));
            }
            None => return Err(registry_error(404, format!("Item '{id}' not found"))),
        };
        let item = ModelRunItem {
            id: id.to_string(),
            display_name: record.display_name.clone(),
            record: Some(record.clone()),
            prov_serialisation: Some(prov_document.to_string()),
            version,
        };
        items.insert(id.to_string(), Entry::Complete(RegistryItem::ModelRun(item)));
        Ok(())
    }
}
