//! Registry interfaces consumed by the provenance core.

use async_trait::async_trait;

use provena_types::{ItemSubtype, ModelRunRecord, Resolution, Result};

/// Looks up registry items by id.
///
/// `Err` is reserved for the registry itself failing; a missing, seeded or
/// mistyped item is a normal [`Resolution`].
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(&self, id: &str, expected: ItemSubtype) -> Result<Resolution>;
}

/// Registry writes performed while registering a model run.
#[async_trait]
pub trait ModelRunRegistry: Send + Sync {
    /// Mint a new persistent handle for a model run.
    async fn mint_identity(&self) -> Result<String>;

    /// Create an incomplete seed item at `id`.
    async fn seed_model_run(&self, id: &str) -> Result<()>;

    /// Lodge `record` and its PROV-JSON document as a new version of `id`.
    async fn update_model_run(
        &self,
        id: &str,
        record: &ModelRunRecord,
        prov_document: &str,
    ) -> Result<()>;
}
