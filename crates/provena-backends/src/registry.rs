use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use provena_prov::{EntityResolver, ModelRunRegistry};
use provena_types::{ItemSubtype, ModelRunRecord, ProvenaError, RegistryItem, Resolution, Result};

const SERVICE: &str = "registry";

// ---------------------------------------------------------------------------
// RegistryHttpClient
// ---------------------------------------------------------------------------

/// Client for the registry REST API.
///
/// The registry mints a handle when it seeds an item, so
/// [`mint_identity`](ModelRunRegistry::mint_identity) creates the seed and
/// [`seed_model_run`](ModelRunRegistry::seed_model_run) confirms it exists.
#[derive(Debug, Clone)]
pub struct RegistryHttpClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RegistryHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(u16, String)> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ProvenaError::transport(SERVICE, e))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ProvenaError::transport(SERVICE, e))?;
        Ok((status, body))
    }

    async fn fetch(&self, id: &str, expected: ItemSubtype) -> Result<Resolution> {
        let builder = self
            .request(reqwest::Method::GET, "/registry/general/fetch")
            .query(&[("id", id)]);
        let (status, body) = self.send(builder).await?;
        interpret_fetch(status, &body, id, expected)
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StatusBody {
    success: bool,
    #[serde(default)]
    details: String,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    status: StatusBody,
    #[serde(default)]
    item: Option<Value>,
    #[serde(default)]
    item_is_seed: bool,
}

#[derive(Debug, Deserialize)]
struct SeededItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SeedResponse {
    status: StatusBody,
    #[serde(default)]
    seeded_item: Option<SeededItem>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: StatusBody,
}

fn map_error(status: u16, body: &str) -> ProvenaError {
    ProvenaError::UpstreamService {
        service: SERVICE.into(),
        status,
        message: extract_error_message(body),
    }
}

fn extract_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v["detail"]
                .as_str()
                .or_else(|| v["status"]["details"].as_str())
        })
        .map(String::from)
        .unwrap_or_else(|| body.to_string())
}

fn parse<T: for<'de> Deserialize<'de>>(status: u16, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| ProvenaError::UpstreamService {
        service: SERVICE.into(),
        status,
        message: format!("Failed to parse response JSON: {e}"),
    })
}

fn interpret_fetch(status: u16, body: &str, id: &str, expected: ItemSubtype) -> Result<Resolution> {
    if status == 404 {
        return Ok(Resolution::NotFound);
    }
    if !(200..300).contains(&status) {
        return Err(map_error(status, body));
    }

    let response: FetchResponse = parse(status, body)?;
    if !response.status.success {
        if response.status.details.to_ascii_lowercase().contains("not found") {
            return Ok(Resolution::NotFound);
        }
        return Err(ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: response.status.details,
        });
    }

    let Some(item) = response.item else {
        return Ok(Resolution::NotFound);
    };
    let Some(actual) = item["item_subtype"].as_str().and_then(ItemSubtype::parse) else {
        tracing::debug!(id, subtype = ?item["item_subtype"], "Registry item has an unsupported subtype");
        return Ok(Resolution::NotFound);
    };
    if actual != expected {
        return Ok(Resolution::WrongType { actual });
    }
    if response.item_is_seed {
        return Ok(Resolution::Seed);
    }

    serde_json::from_value::<RegistryItem>(item)
        .map(Resolution::Complete)
        .map_err(|e| ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: format!("Item '{id}' could not be read as {expected}: {e}"),
        })
}

fn check_status(status: u16, body: &str) -> Result<()> {
    if !(200..300).contains(&status) {
        return Err(map_error(status, body));
    }
    let response: StatusResponse = parse(status, body)?;
    if !response.status.success {
        return Err(ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: response.status.details,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl EntityResolver for RegistryHttpClient {
    async fn resolve(&self, id: &str, expected: ItemSubtype) -> Result<Resolution> {
        let resolution = self.fetch(id, expected).await?;
        tracing::debug!(id, expected = %expected, ?resolution, "Registry lookup");
        Ok(resolution)
    }
}

#[async_trait]
impl ModelRunRegistry for RegistryHttpClient {
    async fn mint_identity(&self) -> Result<String> {
        let builder = self.request(reqwest::Method::POST, "/registry/activity/model_run/seed");
        let (status, body) = self.send(builder).await?;
        if !(200..300).contains(&status) {
            return Err(map_error(status, &body));
        }
        let response: SeedResponse = parse(status, &body)?;
        match response.seeded_item {
            Some(item) if response.status.success => Ok(item.id),
            _ => Err(ProvenaError::UpstreamService {
                service: SERVICE.into(),
                status,
                message: format!("Seeding a model run failed: {}", response.status.details),
            }),
        }
    }

    async fn seed_model_run(&self, id: &str) -> Result<()> {
        match self.fetch(id, ItemSubtype::ModelRun).await? {
            Resolution::Seed | Resolution::Complete(_) => Ok(()),
            other => Err(ProvenaError::UpstreamService {
                service: SERVICE.into(),
                status: 404,
                message: format!("Seeded model run '{id}' is not available: {other:?}"),
            }),
        }
    }

    async fn update_model_run(
        &self,
        id: &str,
        record: &ModelRunRecord,
        prov_document: &str,
    ) -> Result<()> {
        let body = json!({
            "display_name": record.display_name,
            "record_status": "COMPLETE",
            "record": record,
            "prov_serialisation": prov_document,
        });
        let builder = self
            .request(reqwest::Method::PUT, "/registry/activity/model_run/update")
            .query(&[("id", id)])
            .json(&body);
        let (status, body) = self.send(builder).await?;
        check_status(status, &body)?;
        tracing::debug!(id, "Registry model run updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_body(subtype: &str, seed: bool) -> String {
        json!({
            "status": {"success": true, "details": ""},
            "item_is_seed": seed,
            "item": {
                "id": "10378.1/5",
                "display_name": "Gauge data",
                "item_category": "ENTITY",
                "item_subtype": subtype
            }
        })
        .to_string()
    }

    #[test]
    fn complete_item_resolves() {
        let resolution =
            interpret_fetch(200, &fetch_body("DATASET", false), "10378.1/5", ItemSubtype::Dataset)
                .unwrap();
        match resolution {
            Resolution::Complete(RegistryItem::Dataset(d)) => assert_eq!(d.display_name, "Gauge data"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn seed_item_resolves_as_seed() {
        let resolution =
            interpret_fetch(200, &fetch_body("DATASET", true), "10378.1/5", ItemSubtype::Dataset)
                .unwrap();
        assert_eq!(resolution, Resolution::Seed);
    }

    #[test]
    fn wrong_subtype_is_reported_before_seed() {
        let resolution =
            interpret_fetch(200, &fetch_body("PERSON", true), "10378.1/5", ItemSubtype::Dataset)
                .unwrap();
        assert_eq!(
            resolution,
            Resolution::WrongType {
                actual: ItemSubtype::Person
            }
        );
    }

    #[test]
    fn not_found_variants() {
        assert_eq!(
            interpret_fetch(404, "{}", "x", ItemSubtype::Dataset).unwrap(),
            Resolution::NotFound
        );
        let body = json!({"status": {"success": false, "details": "Item not found"}}).to_string();
        assert_eq!(
            interpret_fetch(200, &body, "x", ItemSubtype::Dataset).unwrap(),
            Resolution::NotFound
        );
        assert_eq!(
            interpret_fetch(200, &fetch_body("CREATE", false), "x", ItemSubtype::Dataset).unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn server_errors_are_upstream_failures() {
        let err = interpret_fetch(503, r#"{"detail": "maintenance"}"#, "x", ItemSubtype::Dataset)
            .unwrap_err();
        match err {
            ProvenaError::UpstreamService { status, message, .. } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparsable_body_is_an_upstream_failure() {
        let err = interpret_fetch(200, "<html>", "x", ItemSubtype::Dataset).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn failed_update_status_is_an_error() {
        let body = json!({"status": {"success": false, "details": "locked"}}).to_string();
        let err = check_status(200, &body).unwrap_err();
        assert!(err.to_string().contains("locked"));
        assert!(check_status(200, r#"{"status": {"success": true}}"#).is_ok());
    }

    #[tokio::test]
    async fn unreachable_registry_is_a_transport_error() {
        let client = RegistryHttpClient::new("http://127.0.0.1:1/");
        let err = client
            .resolve("10378.1/5", ItemSubtype::Dataset)
            .await
            .unwrap_err();
        match err {
            ProvenaError::UpstreamService { service, status, .. } => {
                assert_eq!(service, "registry");
                assert_eq!(status, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
