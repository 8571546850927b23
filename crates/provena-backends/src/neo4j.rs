//! Neo4j over its transactional HTTP endpoint.
//!
//! A session begins an explicit transaction (`POST /db/{db}/tx`), runs its
//! statements against the commit URL in one request, and rolls back with a
//! `DELETE` on close if the commit never happened.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use provena_prov::{
    GraphDatabase, GraphSession, GraphStatement, RawNode, RawPath, RawRelationship,
    StatementResult,
};
use provena_types::{ProvenaError, Result};

const SERVICE: &str = "graph database";

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Neo4jHttpDatabase {
    client: reqwest::Client,
    base_url: String,
    database: String,
    credentials: Option<Credentials>,
}

impl Neo4jHttpDatabase {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.credentials = username.map(|username| Credentials { username, password });
        self
    }

    fn begin_url(&self) -> String {
        format!("{}/db/{}/tx", self.base_url, self.database)
    }
}

#[async_trait]
impl GraphDatabase for Neo4jHttpDatabase {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        let transport = Transport {
            client: self.client.clone(),
            credentials: self.credentials.clone(),
        };
        let (status, body) = transport
            .send(reqwest::Method::POST, &self.begin_url(), Some(json!({"statements": []})))
            .await?;
        let response = parse_response(status, &body)?;
        let commit_url = response.commit.ok_or_else(|| ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: "transaction response carried no commit URL".into(),
        })?;
        tracing::debug!(commit = %commit_url, "Graph transaction opened");
        Ok(Box::new(Neo4jSession {
            transport,
            transaction_url: transaction_url(&commit_url),
            commit_url,
            finished: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Transport {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl Transport {
    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<(u16, String)> {
        let mut builder = self
            .client
            .request(method, url)
            .header("accept", "application/json");
        if let Some(creds) = &self.credentials {
            builder = builder.basic_auth(&creds.username, creds.password.as_deref());
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ProvenaError::transport(SERVICE, e))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ProvenaError::transport(SERVICE, e))?;
        Ok((status, text))
    }
}

struct Neo4jSession {
    transport: Transport,
    commit_url: String,
    transaction_url: String,
    finished: bool,
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn run(&mut self, statements: &[GraphStatement]) -> Result<Vec<StatementResult>> {
        if self.finished {
            return Err(ProvenaError::transport(
                SERVICE,
                "session transaction already committed",
            ));
        }
        let (status, body) = self
            .transport
            .send(
                reqwest::Method::POST,
                &self.commit_url,
                Some(request_body(statements)),
            )
            .await?;
        // Neo4j rolls the transaction back itself once a commit request fails.
        self.finished = true;
        let response = parse_response(status, &body)?;
        collect_results(statements, response, status)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let (status, body) = self
            .transport
            .send(reqwest::Method::DELETE, &self.transaction_url, None)
            .await?;
        // An expired transaction is already gone.
        if status == 404 {
            return Ok(());
        }
        parse_response(status, &body)?;
        tracing::debug!(transaction = %self.transaction_url, "Graph transaction rolled back");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    commit: Option<String>,
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
    #[serde(default)]
    graph: Option<TxGraph>,
}

#[derive(Debug, Default, Deserialize)]
struct TxGraph {
    #[serde(default)]
    nodes: Vec<TxNode>,
    #[serde(default)]
    relationships: Vec<TxRelationship>,
}

#[derive(Debug, Deserialize)]
struct TxNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "elementId")]
    element_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TxRelationship {
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(rename = "startNode")]
    start_node: String,
    #[serde(rename = "endNode")]
    end_node: String,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

fn transaction_url(commit_url: &str) -> String {
    commit_url
        .strip_suffix("/commit")
        .unwrap_or(commit_url)
        .to_string()
}

fn request_body(statements: &[GraphStatement]) -> Value {
    let statements: Vec<Value> = statements
        .iter()
        .map(|statement| {
            let query = statement.to_cypher();
            let mut entry = json!({
                "statement": query.text,
                "parameters": query.parameters,
            });
            if statement.is_read() {
                entry["resultDataContents"] = json!(["row", "graph"]);
            }
            entry
        })
        .collect();
    json!({ "statements": statements })
}

fn map_error(status: u16, body: &str) -> ProvenaError {
    ProvenaError::UpstreamService {
        service: SERVICE.into(),
        status,
        message: extract_error_message(body),
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<TxResponse>(body)
        .ok()
        .and_then(|r| r.errors.into_iter().next())
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|| body.to_string())
}

fn parse_response(status: u16, body: &str) -> Result<TxResponse> {
    if !(200..300).contains(&status) {
        return Err(map_error(status, body));
    }
    let response: TxResponse =
        serde_json::from_str(body).map_err(|e| ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: format!("Failed to parse response JSON: {e}"),
        })?;
    if let Some(error) = response.errors.first() {
        return Err(ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: format!("{}: {}", error.code, error.message),
        });
    }
    Ok(response)
}

fn collect_results(
    statements: &[GraphStatement],
    response: TxResponse,
    status: u16,
) -> Result<Vec<StatementResult>> {
    if response.results.len() != statements.len() {
        return Err(ProvenaError::UpstreamService {
            service: SERVICE.into(),
            status,
            message: format!(
                "expected {} statement results, received {}",
                statements.len(),
                response.results.len()
            ),
        });
    }
    Ok(statements
        .iter()
        .zip(response.results)
        .map(|(statement, result)| {
            if !statement.is_read() {
                return StatementResult::empty();
            }
            StatementResult {
                paths: result.data.into_iter().map(row_path).collect(),
            }
        })
        .collect())
}

fn row_path(row: TxRow) -> Option<RawPath> {
    if row.row.first().map_or(true, Value::is_null) {
        return None;
    }
    let graph = row.graph.unwrap_or_default();
    Some(RawPath {
        nodes: graph
            .nodes
            .into_iter()
            .map(|n| RawNode {
                element_id: n.id.or(n.element_id).unwrap_or_default(),
                labels: n.labels,
                properties: n.properties,
            })
            .collect(),
        relationships: graph
            .relationships
            .into_iter()
            .map(|r| RawRelationship {
                rel_type: r.rel_type,
                start_node: r.start_node,
                end_node: r.end_node,
            })
            .collect(),
    })
}
