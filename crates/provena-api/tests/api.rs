//! Drives the router directly against in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use provena_api::{router, AppState};
use provena_prov::{
    FileJobStore, GraphStoreManager, InMemoryGraphDatabase, InMemoryRegistry, JobQueue,
    LifecycleOrchestrator, LineageQueryEngine,
};
use provena_types::RegistryItem;

const MODELLER: &str = "10378.1/1001";
const MODEL: &str = "10378.1/2001";
const WORKFLOW: &str = "10378.1/3001";
const INPUT_TEMPLATE: &str = "10378.1/4001";
const OUTPUT_TEMPLATE: &str = "10378.1/4002";
const INPUT_DATASET: &str = "10378.1/5001";
const OUTPUT_DATASET: &str = "10378.1/5002";

fn registry() -> InMemoryRegistry {
    let items: Vec<RegistryItem> = serde_json::from_value(json!([
        {"item_subtype": "PERSON", "id": MODELLER, "display_name": "Grace Hopper",
         "first_name": "Grace", "last_name": "Hopper"},
        {"item_subtype": "MODEL", "id": MODEL, "display_name": "Runoff model"},
        {
            "item_subtype": "MODEL_RUN_WORKFLOW_TEMPLATE",
            "id": WORKFLOW,
            "display_name": "Runoff workflow",
            "software_id": MODEL,
            "input_templates": [{"template_id": INPUT_TEMPLATE}],
            "output_templates": [{"template_id": OUTPUT_TEMPLATE}],
            "annotations": {"required": ["run_tag"]}
        },
        {
            "item_subtype": "DATASET_TEMPLATE",
            "id": INPUT_TEMPLATE,
            "display_name": "Runoff inputs",
            "deferred_resources": [{"key": "parameters", "usage_type": "PARAMETER_FILE"}]
        },
        {"item_subtype": "DATASET_TEMPLATE", "id": OUTPUT_TEMPLATE, "display_name": "Runoff outputs"},
        {"item_subtype": "DATASET", "id": INPUT_DATASET, "display_name": "Gauge data"},
        {"item_subtype": "DATASET", "id": OUTPUT_DATASET, "display_name": "Runoff series"}
    ]))
    .unwrap();
    InMemoryRegistry::from_items(items)
}

fn record() -> Value {
    json!({
        "workflow_template_id": WORKFLOW,
        "inputs": [{
            "dataset_template_id": INPUT_TEMPLATE,
            "dataset_id": INPUT_DATASET,
            "dataset_type": "DATA_STORE",
            "resources": {"parameters": "inputs/p.csv"}
        }],
        "outputs": [{
            "dataset_template_id": OUTPUT_TEMPLATE,
            "dataset_id": OUTPUT_DATASET,
            "resources": {}
        }],
        "annotations": {"run_tag": "v1"},
        "display_name": "Runoff run",
        "description": "Runoff model run",
        "associations": {"modeller_id": MODELLER},
        "start_time": 1_700_000_000,
        "end_time": 1_700_086_400
    })
}

struct TestApp {
    app: Router,
    _jobs_dir: tempfile::TempDir,
}

async fn app() -> TestApp {
    let registry = Arc::new(registry());
    let store = GraphStoreManager::new(Arc::new(InMemoryGraphDatabase::new()));
    let orchestrator = LifecycleOrchestrator::new(registry.clone(), registry, store.clone());

    let jobs_dir = tempfile::tempdir().unwrap();
    let (jobs, _worker) = JobQueue::start(
        orchestrator.clone(),
        Arc::new(FileJobStore::new(jobs_dir.path())),
        8,
    )
    .await
    .unwrap();

    let state = AppState {
        orchestrator,
        lineage: LineageQueryEngine::new(store),
        jobs,
    };
    TestApp {
        app: router(state),
        _jobs_dir: jobs_dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn wait_for_job(app: &Router, id: &str) -> Value {
    for _ in 0..100 {
        let (status, job) = send(app, get(&format!("/model_run/job?id={id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if job["status"] == "SUCCEEDED" || job["status"] == "FAILED" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} did not finish");
}

#[tokio::test]
async fn register_then_explore_downstream() {
    let test = app().await;
    let (status, outcome) = send(&test.app, post("/model_run/register", &record())).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    let record_id = outcome["record_id"].as_str().unwrap().to_string();
    assert!(outcome["prov_document"]["activity"][&record_id].is_object());

    let uri = format!("/explore/downstream?starting_id={INPUT_DATASET}&depth=2");
    let (status, graph) = send(&test.app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["id"].as_str())
        .collect();
    assert!(ids.contains(&record_id.as_str()));
    assert!(ids.contains(&OUTPUT_DATASET));
    assert_eq!(graph["directed"], true);
}

#[tokio::test]
async fn invalid_record_is_a_bad_request_with_reason() {
    let test = app().await;
    let mut body = record();
    body["annotations"] = json!({});
    let (status, error) = send(&test.app, post("/model_run/register", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("run_tag"));
}

#[tokio::test]
async fn bad_depth_is_unprocessable() {
    let test = app().await;
    for depth in ["0", "-1", "two", "11"] {
        let uri = format!("/explore/upstream?starting_id={INPUT_DATASET}&depth={depth}");
        let (status, _) = send(&test.app, get(&uri)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "depth={depth}");
    }
    let (status, _) = send(&test.app, get("/explore/upstream?depth=1")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_start_is_an_empty_graph() {
    let test = app().await;
    let (status, graph) = send(
        &test.app,
        get("/explore/special/contributing_datasets?starting_id=10378.1/none&depth=3"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["nodes"], json!([]));
    assert_eq!(graph["links"], json!([]));
}

#[tokio::test]
async fn async_registration_is_polled_to_success() {
    let test = app().await;
    let (status, job) = send(&test.app, post("/model_run/register_async", &record())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "PENDING");

    let done = wait_for_job(&test.app, job["id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "SUCCEEDED", "{done}");
    let record_id = done["result"]["record_id"].as_str().unwrap().to_string();

    let uri = format!("/explore/special/contributing_agents?starting_id={record_id}&depth=1");
    let (_, agents) = send(&test.app, get(&uri)).await;
    assert!(agents["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["id"] == MODELLER));
}

#[tokio::test]
async fn relodge_uses_the_lodged_record() {
    let test = app().await;
    let (_, outcome) = send(&test.app, post("/model_run/register", &record())).await;
    let record_id = outcome["record_id"].as_str().unwrap();

    let (status, job) = send(
        &test.app,
        post("/admin/model_run/relodge", &json!({"record_id": record_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{job}");
    assert_eq!(job["kind"], "RELODGE_MODEL_RUN");
    let done = wait_for_job(&test.app, job["id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "SUCCEEDED", "{done}");
}

#[tokio::test]
async fn relodge_of_unknown_record_is_rejected() {
    let test = app().await;
    let (status, _) = send(
        &test.app,
        post("/admin/model_run/relodge", &json!({"record_id": "10378.1/missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let test = app().await;
    let (status, error) = send(&test.app, get("/model_run/job?id=nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error["error"].as_str().unwrap().contains("nope"));
}
